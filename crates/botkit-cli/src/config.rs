//! Fleet file – reads/writes `~/.botkit/fleet.toml`.
//!
//! ```toml
//! heartbeat = "500ms"
//!
//! [[robot]]
//! name = "rover"
//! heartbeat = "2s"          # optional, overrides the fleet default
//!
//! [[robot.connection]]
//! name = "board"
//! port = "/dev/ttyACM0"
//!
//! [[robot.device]]
//! name = "thermometer"
//! connection = "board"
//! pin = "A0"
//! range = [-10.0, 40.0]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use botkit_kernel::parse_duration;
use botkit_kernel::scheduler::MIN_PERIOD;
use botkit_types::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a fleet file could not be turned into a [`FleetConfig`].
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("failed to read fleet file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse fleet file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write fleet file {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A fleet of simulated robots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// How often each robot samples its devices, e.g. `"1s"`.
    #[serde(default = "default_heartbeat")]
    pub heartbeat: String,

    /// `false` starts every robot and stops again straight away.
    #[serde(default = "default_auto_run")]
    pub auto_run: bool,

    #[serde(default, rename = "robot")]
    pub robots: Vec<RobotConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Empty means "generate one".
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<String>,

    #[serde(default, rename = "connection")]
    pub connections: Vec<ConnectionConfig>,

    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_port")]
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: String,
    pub connection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    /// Sample range `[min, max]`; `[0, 1]` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
}

fn default_heartbeat() -> String {
    "1s".to_string()
}
fn default_auto_run() -> bool {
    true
}
fn default_port() -> String {
    "/dev/sim0".to_string()
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            heartbeat: default_heartbeat(),
            auto_run: default_auto_run(),
            robots: Vec::new(),
        }
    }
}

impl FleetConfig {
    /// Built-in single-robot fleet used when no file exists.
    pub fn demo() -> Self {
        Self {
            robots: vec![RobotConfig {
                name: "rover".to_string(),
                heartbeat: None,
                connections: vec![ConnectionConfig {
                    name: "board".to_string(),
                    port: default_port(),
                }],
                devices: vec![
                    DeviceConfig {
                        name: "thermometer".to_string(),
                        connection: "board".to_string(),
                        pin: Some("A0".to_string()),
                        range: Some([-10.0, 40.0]),
                    },
                    DeviceConfig {
                        name: "light".to_string(),
                        connection: "board".to_string(),
                        pin: Some("A1".to_string()),
                        range: None,
                    },
                ],
            }],
            ..Self::default()
        }
    }

    /// Heartbeat for `robot`, falling back to the fleet default.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidDuration`] for malformed strings or periods
    /// below the scheduler's 1 ms floor.
    pub fn heartbeat_for(&self, robot: &RobotConfig) -> Result<Duration, ConfigError> {
        let raw = robot.heartbeat.as_deref().unwrap_or(&self.heartbeat);
        let period = parse_duration(raw)?;
        if period < MIN_PERIOD {
            return Err(ConfigError::InvalidDuration {
                input: raw.to_string(),
                reason: "must be at least 1ms".to_string(),
            });
        }
        Ok(period)
    }

    /// Check every interval without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for robot in &self.robots {
            self.heartbeat_for(robot)?;
        }
        Ok(())
    }
}

/// Return the path to `~/.botkit/fleet.toml`.
pub fn fleet_path() -> PathBuf {
    fleet_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn fleet_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".botkit").join("fleet.toml")
}

/// Load `path` (or the default location), apply environment overrides and
/// validate. A missing file yields [`FleetConfig::demo`].
pub fn load(path: Option<&Path>) -> Result<FleetConfig, FleetError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(fleet_path);
    let mut cfg = load_from(&path)?.unwrap_or_else(FleetConfig::demo);
    apply_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

/// Load the fleet from a specific path. `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<FleetConfig>, FleetError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| FleetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = toml::from_str(&raw).map_err(|source| FleetError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}

/// Apply `BOTKIT_*` overrides read through `lookup`.
///
/// | Variable | Field |
/// |---|---|
/// | `BOTKIT_HEARTBEAT` | `heartbeat` |
/// | `BOTKIT_AUTO_RUN` | `auto_run` (`true`/`false`/`1`/`0`) |
pub fn apply_overrides(cfg: &mut FleetConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BOTKIT_HEARTBEAT") {
        cfg.heartbeat = v;
    }
    if let Some(v) = lookup("BOTKIT_AUTO_RUN") {
        match v.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => cfg.auto_run = true,
            "false" | "0" | "no" => cfg.auto_run = false,
            _ => {}
        }
    }
}

/// Write `cfg` to `path`, creating the parent directory.
pub(crate) fn save_to(cfg: &FleetConfig, path: &Path) -> Result<(), FleetError> {
    let write_err = |reason: String| FleetError::Write {
        path: path.to_path_buf(),
        reason,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| write_err(e.to_string()))?;
    fs::write(path, raw).map_err(|e| write_err(e.to_string()))
}

/// Write the demo fleet to `path` unless a file is already there.
pub fn init(path: &Path) -> Result<bool, FleetError> {
    if path.exists() {
        return Ok(false);
    }
    save_to(&FleetConfig::demo(), path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn fleet_path_points_to_botkit_dir() {
        let p = fleet_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".botkit"));
        assert!(p.to_string_lossy().ends_with("fleet.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = fleet_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn missing_file_falls_back_to_demo() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = load(Some(&dir.path().join("absent.toml"))).expect("demo fleet");
        assert_eq!(cfg.robots.len(), 1);
        assert_eq!(cfg.robots[0].name, "rover");
    }

    #[test]
    fn parses_nested_tables() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fleet.toml");
        fs::write(
            &path,
            r#"
heartbeat = "250ms"
auto_run = false

[[robot]]
name = "arm"
heartbeat = "2s"

[[robot.connection]]
name = "serial"
port = "/dev/ttyUSB0"

[[robot.device]]
name = "elbow"
connection = "serial"
pin = "9"
range = [0.0, 180.0]

[[robot]]
name = "cart"
"#,
        )
        .expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.heartbeat, "250ms");
        assert!(!cfg.auto_run);
        assert_eq!(cfg.robots.len(), 2);
        let arm = &cfg.robots[0];
        assert_eq!(arm.connections[0].port, "/dev/ttyUSB0");
        assert_eq!(arm.devices[0].pin.as_deref(), Some("9"));
        assert_eq!(arm.devices[0].range, Some([0.0, 180.0]));
        assert_eq!(cfg.heartbeat_for(arm).unwrap(), Duration::from_secs(2));
        assert_eq!(cfg.heartbeat_for(&cfg.robots[1]).unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("fleet.toml");
        fs::write(&path, "heartbeat = [").expect("write");
        assert!(matches!(load_from(&path), Err(FleetError::Parse { .. })));
    }

    #[test]
    fn invalid_heartbeat_is_a_config_error() {
        let mut cfg = FleetConfig::demo();
        cfg.heartbeat = "soon".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidDuration { .. })));

        cfg.heartbeat = "0ms".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("at least 1ms"));
    }

    #[test]
    fn init_writes_demo_once() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = fleet_path_for_home(&dir.path().to_string_lossy());
        assert!(init(&path).expect("first init"));
        assert!(!init(&path).expect("second init"));
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, FleetConfig::demo());
    }

    #[test]
    fn overrides_replace_heartbeat_and_auto_run() {
        let mut cfg = FleetConfig::default();
        apply_overrides(&mut cfg, env(&[("BOTKIT_HEARTBEAT", "5s"), ("BOTKIT_AUTO_RUN", "false")]));
        assert_eq!(cfg.heartbeat, "5s");
        assert!(!cfg.auto_run);
    }

    #[test]
    fn unrecognised_auto_run_value_is_ignored() {
        let mut cfg = FleetConfig::default();
        apply_overrides(&mut cfg, env(&[("BOTKIT_AUTO_RUN", "maybe")]));
        assert!(cfg.auto_run);
    }
}
