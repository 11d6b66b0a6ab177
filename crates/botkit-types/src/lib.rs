//! `botkit-types` – shared vocabulary for every botkit crate.
//!
//! Holds the error taxonomy, the [`Event`] envelope routed by the event bus,
//! the loosely-typed [`Params`] map consumed by commands, the serialisable
//! introspection summaries, and the small numeric helpers in [`util`].

pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use serde_json::Value;

/// Loosely-typed command arguments, as they would arrive from a JSON body.
pub type Params = serde_json::Map<String, Value>;

/// A single value published on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Topic the value was published on, e.g. `"reading"`.
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Introspection summaries
// ─────────────────────────────────────────────────────────────────────────────

/// JSON view of a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub name: String,
    /// Short type name of the adaptor, e.g. `"SimConnection"`.
    pub adaptor: String,
}

/// JSON view of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    /// Short type name of the driver, e.g. `"SimDevice"`.
    pub driver: String,
    /// Name of the connection the device is bound to.
    pub connection: String,
    pub commands: Vec<String>,
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
}

/// JSON view of a robot and its topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSummary {
    pub name: String,
    pub commands: Vec<String>,
    pub events: Vec<String>,
    pub connections: Vec<ConnectionSummary>,
    pub devices: Vec<DeviceSummary>,
}

/// JSON view of a master and every robot it supervises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSummary {
    pub robots: Vec<RobotSummary>,
    pub commands: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Mistakes in how the system was put together. Raised before anything runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{what} is frozen while running")]
    Frozen { what: String },

    #[error("device '{device}' is bound to unknown connection '{connection}'")]
    UnknownConnection { device: String, connection: String },
}

/// Opaque failure reported by an adaptor or driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DriverError {
    message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Every halt/finalize failure observed while shutting down, in order.
#[derive(Error, Debug, Default)]
#[error("{} error(s) during shutdown: {}", .errors.len(), join(.errors))]
pub struct ShutdownError {
    pub errors: Vec<BotError>,
}

impl ShutdownError {
    pub fn push(&mut self, err: BotError) {
        match err {
            // Flatten nested aggregates so callers see one level.
            BotError::Shutdown(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), BotError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(BotError::Shutdown(self))
        }
    }
}

fn join(errors: &[BotError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Global error type spanning composition, lifecycle and lookup failures.
#[derive(Error, Debug)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection '{connection}' failed to connect: {source}")]
    Connect {
        connection: String,
        source: DriverError,
    },

    #[error("device '{device}' failed to start: {source}")]
    Start { device: String, source: DriverError },

    #[error("device '{device}' failed to halt: {source}")]
    Halt { device: String, source: DriverError },

    #[error("connection '{connection}' failed to finalize: {source}")]
    Finalize {
        connection: String,
        source: DriverError,
    },

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error("no such topic '{0}'")]
    NoSuchTopic(String),

    /// Raised from a robot's `work` callback.
    #[error("work failed: {0}")]
    Work(String),

    #[error("robot '{robot}': {source}")]
    Robot {
        robot: String,
        source: Box<BotError>,
    },
}

impl BotError {
    /// Attribute `self` to the named robot.
    pub fn in_robot(self, robot: impl Into<String>) -> Self {
        Self::Robot {
            robot: robot.into(),
            source: Box::new(self),
        }
    }

    /// `true` when the error only carries teardown failures.
    pub fn is_shutdown(&self) -> bool {
        match self {
            Self::Shutdown(_) => true,
            Self::Robot { source, .. } => source.is_shutdown(),
            _ => false,
        }
    }

    /// Process exit code for a CLI wrapper: 2 for aggregated shutdown
    /// errors, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        if self.is_shutdown() { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_roundtrip() {
        let event = Event::new("reading", serde_json::json!({"value": 42}));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn device_summary_omits_missing_pin() {
        let summary = DeviceSummary {
            name: "led".into(),
            driver: "SimDevice".into(),
            connection: "board".into(),
            commands: vec![],
            events: vec![],
            pin: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("pin").is_none());
    }

    #[test]
    fn start_error_display_carries_driver_message() {
        let err = BotError::Start {
            device: "Y".into(),
            source: DriverError::new("boom"),
        }
        .in_robot("bot");
        let msg = err.to_string();
        assert!(msg.contains("bot"));
        assert!(msg.contains("boom"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn shutdown_error_joins_and_flattens() {
        let mut inner = ShutdownError::default();
        inner.push(BotError::Halt {
            device: "X".into(),
            source: DriverError::new("stuck"),
        });

        let mut outer = ShutdownError::default();
        outer.push(BotError::Shutdown(inner));
        outer.push(BotError::Finalize {
            connection: "A".into(),
            source: DriverError::new("busy"),
        });
        assert_eq!(outer.errors.len(), 2);

        let err = outer.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("2 error(s)"));
        assert!(msg.contains("stuck; "));
        assert!(msg.contains("busy"));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.in_robot("bot").exit_code(), 2);
    }

    #[test]
    fn empty_shutdown_error_is_ok() {
        assert!(ShutdownError::default().into_result().is_ok());
    }

    #[test]
    fn config_error_display() {
        let err = ConfigError::DuplicateName {
            kind: "device",
            name: "led".into(),
        };
        assert_eq!(err.to_string(), "duplicate device name 'led'");
    }
}
