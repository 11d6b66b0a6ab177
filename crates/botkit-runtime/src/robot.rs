//! [`Robot`] – ordered composition of connections, devices and user work.
//!
//! # Lifecycle
//!
//! | Step | On failure |
//! |---|---|
//! | connect every connection, in declaration order | finalize the ones already connected (reverse), fail |
//! | start every device, in declaration order | halt the started ones (reverse), finalize all connections (reverse), fail |
//! | freeze command and event registries | – |
//! | call `work` once, synchronously | tear everything down, fail |
//! | publish `"started"` | – |
//!
//! [`Robot::stop`] cancels the robot's scheduled jobs and event listeners,
//! halts devices in reverse order, then finalizes connections in reverse
//! order. Halt and finalize errors are collected into a
//! [`ShutdownError`] and never interrupt the cascade.
//!
//! Lifecycle calls on one robot are serialized; concurrent `start`/`stop`
//! calls queue behind each other.
//!
//! # Example
//!
//! ```rust,no_run
//! use botkit_hal::{SimConnection, SimDevice};
//! use botkit_runtime::Robot;
//!
//! # async fn demo() -> Result<(), botkit_types::BotError> {
//! let robot = Robot::builder("rover")
//!     .connection(SimConnection::new("board"))
//!     .device(SimDevice::new("probe", "board"))
//!     .work(|robot| {
//!         robot.every("1s", || tracing::info!("tick"));
//!         Ok(())
//!     })
//!     .build()?;
//! robot.run().await
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use botkit_hal::{Connection, Device};
use botkit_kernel::{IntoInterval, JobHandle, JobInfo, Scheduler};
use botkit_middleware::{Commander, Eventer, Listener};
use botkit_types::util::rand;
use botkit_types::{BotError, ConfigError, RobotSummary, ShutdownError, Value};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Topic carrying runtime errors: panicking jobs and [`Robot::report_error`].
pub const ERROR_EVENT: &str = "error";
/// Published with the robot name once `work` has returned.
pub const STARTED_EVENT: &str = "started";
/// Published with the robot name after a stop completes.
pub const HALTED_EVENT: &str = "halted";

/// Built-in command returning every [`DeviceSummary`][botkit_types::DeviceSummary].
pub const DEVICES_COMMAND: &str = "robot.devices";
/// Built-in command returning every [`ConnectionSummary`][botkit_types::ConnectionSummary].
pub const CONNECTIONS_COMMAND: &str = "robot.connections";

/// User callback invoked once the robot's devices are up.
pub type Work = Arc<dyn Fn(&Robot) -> Result<(), BotError> + Send + Sync>;

/// Where a robot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RobotState {
    Composed,
    Connecting,
    Starting,
    Running,
    Halting,
    Stopped,
    Failed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Collects a robot's topology before validation.
#[derive(Default)]
pub struct RobotBuilder {
    name: String,
    connections: Vec<Box<dyn Connection>>,
    devices: Vec<Box<dyn Device>>,
    work: Option<Work>,
}

impl RobotBuilder {
    /// Append a connection. Connections connect in the order added.
    pub fn connection(mut self, connection: impl Connection + 'static) -> Self {
        self.connections.push(Box::new(connection));
        self
    }

    /// Append a device. Devices start in the order added.
    pub fn device(mut self, device: impl Device + 'static) -> Self {
        self.devices.push(Box::new(device));
        self
    }

    /// Set the callback run once the devices are up.
    pub fn work<F>(mut self, work: F) -> Self
    where
        F: Fn(&Robot) -> Result<(), BotError> + Send + Sync + 'static,
    {
        self.work = Some(Arc::new(work));
        self
    }

    /// Validate names and bindings and build the robot.
    ///
    /// # Errors
    ///
    /// See [`Robot::new`].
    pub fn build(self) -> Result<Robot, ConfigError> {
        Robot::new(self.name, self.connections, self.devices, self.work)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Robot
// ─────────────────────────────────────────────────────────────────────────────

pub struct Robot {
    name: String,
    connections: Vec<Arc<dyn Connection>>,
    devices: Vec<Arc<dyn Device>>,
    work: Option<Work>,
    commander: Commander,
    eventer: Eventer,
    scheduler: Scheduler,
    listeners: Mutex<Vec<Listener>>,
    state: RwLock<RobotState>,
    running: AtomicBool,
    lifecycle: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Robot")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("connections", &self.connections.len())
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl Robot {
    /// Start composing a robot named `name`.
    pub fn builder(name: impl Into<String>) -> RobotBuilder {
        RobotBuilder {
            name: name.into(),
            ..RobotBuilder::default()
        }
    }

    /// Compose a robot.
    ///
    /// Empty names are replaced with generated ones (`"Robot<n>"`,
    /// `"Connection<n>"`, `"Device<n>"`).
    ///
    /// # Errors
    ///
    /// * [`ConfigError::DuplicateName`] when two connections or two devices
    ///   share a name.
    /// * [`ConfigError::UnknownConnection`] when a device is bound to a
    ///   connection this robot does not own.
    pub fn new(
        name: impl Into<String>,
        mut connections: Vec<Box<dyn Connection>>,
        mut devices: Vec<Box<dyn Device>>,
        work: Option<Work>,
    ) -> Result<Self, ConfigError> {
        let mut name = name.into();
        if name.is_empty() {
            name = generated_name("Robot", &HashSet::new());
        }

        let mut connection_names = HashSet::new();
        for connection in &mut connections {
            if connection.name().is_empty() {
                connection.set_name(generated_name("Connection", &connection_names));
            }
            if !connection_names.insert(connection.name().to_string()) {
                return Err(ConfigError::DuplicateName {
                    kind: "connection",
                    name: connection.name().to_string(),
                });
            }
        }

        let mut device_names = HashSet::new();
        for device in &mut devices {
            if device.name().is_empty() {
                device.set_name(generated_name("Device", &device_names));
            }
            if !device_names.insert(device.name().to_string()) {
                return Err(ConfigError::DuplicateName {
                    kind: "device",
                    name: device.name().to_string(),
                });
            }
            if !connection_names.contains(device.connection()) {
                return Err(ConfigError::UnknownConnection {
                    device: device.name().to_string(),
                    connection: device.connection().to_string(),
                });
            }
        }

        let connections: Vec<Arc<dyn Connection>> = connections.into_iter().map(Arc::from).collect();
        let devices: Vec<Arc<dyn Device>> = devices.into_iter().map(Arc::from).collect();

        let eventer = Eventer::new();
        for topic in [ERROR_EVENT, STARTED_EVENT, HALTED_EVENT] {
            eventer.add_event(topic)?;
        }

        let commander = Commander::new();
        let summaries = devices.clone();
        commander.add_command(DEVICES_COMMAND, move |_| {
            let list: Vec<_> = summaries.iter().map(|d| d.summary()).collect();
            serde_json::to_value(list).unwrap_or(Value::Null)
        })?;
        let summaries = connections.clone();
        commander.add_command(CONNECTIONS_COMMAND, move |_| {
            let list: Vec<_> = summaries.iter().map(|c| c.summary()).collect();
            serde_json::to_value(list).unwrap_or(Value::Null)
        })?;

        let scheduler = Scheduler::new();
        let hook_eventer = eventer.clone();
        let hook_robot = name.clone();
        scheduler.set_panic_hook(Arc::new(move |job: &JobInfo, message: &str| {
            error!(robot = %hook_robot, job = %job.id, "robot job panicked");
            hook_eventer.publish(
                ERROR_EVENT,
                json!({ "job": job.id.to_string(), "kind": job.kind.to_string(), "message": message }),
            );
        }));

        debug!(
            robot = %name,
            connections = connections.len(),
            devices = devices.len(),
            "robot composed"
        );

        Ok(Self {
            name,
            connections,
            devices,
            work,
            commander,
            eventer,
            scheduler,
            listeners: Mutex::new(Vec::new()),
            state: RwLock::new(RobotState::Composed),
            running: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    // ── accessors ───────────────────────────────────────────────────────────

    /// The robot name, generated when composed with an empty one.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RobotState {
        *self.state.read()
    }

    /// `true` from the moment `work` is called until the next stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Robot-level commands, including the built-in listings.
    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    /// Robot-level topics: [`ERROR_EVENT`], [`STARTED_EVENT`], [`HALTED_EVENT`].
    pub fn eventer(&self) -> &Eventer {
        &self.eventer
    }

    /// The robot's own scheduler. Every job on it is cancelled on stop.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Connections in declaration order.
    pub fn connections(&self) -> &[Arc<dyn Connection>] {
        &self.connections
    }

    /// Devices in declaration order.
    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    /// The device named `name`.
    pub fn device(&self, name: &str) -> Option<Arc<dyn Device>> {
        self.devices.iter().find(|d| d.name() == name).cloned()
    }

    /// The connection named `name`.
    pub fn connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.connections.iter().find(|c| c.name() == name).cloned()
    }

    /// Resolve the connection `device` is bound to.
    pub fn connection_for(&self, device: &dyn Device) -> Option<Arc<dyn Connection>> {
        self.connection(device.connection())
    }

    /// JSON-ready view of the robot's topology and commands.
    pub fn summary(&self) -> RobotSummary {
        RobotSummary {
            name: self.name.clone(),
            commands: self.commander.commands(),
            events: self.eventer.events(),
            connections: self.connections.iter().map(|c| c.summary()).collect(),
            devices: self.devices.iter().map(|d| d.summary()).collect(),
        }
    }

    // ── work helpers ────────────────────────────────────────────────────────

    /// Run `callback` every `period` until the robot stops.
    pub fn every<D, F>(&self, period: D, callback: F) -> JobHandle
    where
        D: IntoInterval,
        F: Fn() + Send + 'static,
    {
        self.scheduler.every(period, callback)
    }

    /// Run `callback` once after `delay` unless the robot stops first.
    pub fn after<D, F>(&self, delay: D, callback: F) -> JobHandle
    where
        D: IntoInterval,
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.after(delay, callback)
    }

    /// Call `handler` for every value published on `topic` of `eventer`
    /// until the robot stops.
    ///
    /// # Errors
    ///
    /// [`BotError::NoSuchTopic`] when `eventer` has no such topic.
    pub fn on<F>(&self, eventer: &Eventer, topic: &str, handler: F) -> Result<(), BotError>
    where
        F: Fn(Value) + Send + 'static,
    {
        let listener = eventer.on(topic, handler)?;
        self.listeners.lock().push(listener);
        Ok(())
    }

    /// Surface a runtime error on the [`ERROR_EVENT`] topic.
    pub fn report_error(&self, message: impl fmt::Display) {
        let message = message.to_string();
        warn!(robot = %self.name, error = %message, "runtime error reported");
        self.eventer.publish(ERROR_EVENT, Value::String(message));
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    fn set_state(&self, state: RobotState) {
        *self.state.write() = state;
    }

    fn set_frozen(&self, frozen: bool) {
        let eventers = std::iter::once(&self.eventer)
            .chain(self.devices.iter().filter_map(|d| d.eventer()))
            .chain(self.connections.iter().filter_map(|c| c.eventer()));
        for eventer in eventers {
            if frozen {
                eventer.freeze();
            } else {
                eventer.thaw();
            }
        }
        let commanders = std::iter::once(&self.commander)
            .chain(self.devices.iter().filter_map(|d| d.commander()))
            .chain(self.connections.iter().filter_map(|c| c.commander()));
        for commander in commanders {
            if frozen {
                commander.freeze();
            } else {
                commander.thaw();
            }
        }
    }

    /// Connect, start, call `work`. Returns once the robot is running.
    ///
    /// Starting a running robot is a no-op. A stopped robot may be started
    /// again.
    ///
    /// # Errors
    ///
    /// The first connect, start or `work` failure, after compensating
    /// teardown.
    pub async fn start(&self) -> Result<(), BotError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            debug!(robot = %self.name, "robot already running");
            return Ok(());
        }
        info!(robot = %self.name, "starting robot");

        self.set_state(RobotState::Connecting);
        for (connected, connection) in self.connections.iter().enumerate() {
            debug!(robot = %self.name, connection = %connection.name(), "connecting");
            if let Err(source) = connection.connect().await {
                error!(robot = %self.name, connection = %connection.name(), error = %source, "connect failed");
                self.compensate(0, connected).await;
                return Err(BotError::Connect {
                    connection: connection.name().to_string(),
                    source,
                });
            }
        }

        self.set_state(RobotState::Starting);
        for (started, device) in self.devices.iter().enumerate() {
            debug!(robot = %self.name, device = %device.name(), "starting device");
            if let Err(source) = device.start().await {
                error!(robot = %self.name, device = %device.name(), error = %source, "device start failed");
                self.compensate(started, self.connections.len()).await;
                return Err(BotError::Start {
                    device: device.name().to_string(),
                    source,
                });
            }
        }

        self.set_frozen(true);
        self.running.store(true, Ordering::SeqCst);
        self.set_state(RobotState::Running);

        if let Some(work) = &self.work {
            debug!(robot = %self.name, "invoking work");
            if let Err(e) = work(self) {
                error!(robot = %self.name, error = %e, "work failed");
                self.running.store(false, Ordering::SeqCst);
                self.compensate(self.devices.len(), self.connections.len()).await;
                return Err(e);
            }
        }

        info!(robot = %self.name, "robot running");
        self.eventer.publish(STARTED_EVENT, Value::String(self.name.clone()));
        Ok(())
    }

    /// Halt devices and finalize connections, both in reverse order.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// [`BotError::Shutdown`] carrying every halt/finalize failure.
    pub async fn stop(&self) -> Result<(), BotError> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_running() {
            return Ok(());
        }
        info!(robot = %self.name, "stopping robot");
        self.set_state(RobotState::Halting);

        let errors = self.teardown(self.devices.len(), self.connections.len()).await;
        self.running.store(false, Ordering::SeqCst);
        self.set_state(RobotState::Stopped);
        self.eventer.publish(HALTED_EVENT, Value::String(self.name.clone()));

        if errors.is_empty() {
            info!(robot = %self.name, "robot stopped");
        } else {
            warn!(robot = %self.name, errors = errors.errors.len(), "robot stopped with errors");
        }
        errors.into_result()
    }

    /// Start, wait for Ctrl-C, stop.
    pub async fn run(&self) -> Result<(), BotError> {
        self.start().await?;
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(robot = %self.name, error = %e, "cannot listen for ctrl-c; stopping now");
        }
        self.stop().await
    }

    /// Undo a partial start. Errors are logged, not returned: the caller
    /// reports the failure that caused the rollback.
    async fn compensate(&self, started: usize, connected: usize) {
        let errors = self.teardown(started, connected).await;
        if !errors.is_empty() {
            warn!(robot = %self.name, error = %errors, "errors while rolling back start");
        }
        self.set_state(RobotState::Failed);
    }

    async fn teardown(&self, started: usize, connected: usize) -> ShutdownError {
        self.scheduler.cancel_all();
        let listeners = std::mem::take(&mut *self.listeners.lock());
        for listener in listeners {
            listener.cancel();
        }

        let mut errors = ShutdownError::default();
        for device in self.devices[..started].iter().rev() {
            debug!(robot = %self.name, device = %device.name(), "halting device");
            if let Err(source) = device.halt().await {
                warn!(robot = %self.name, device = %device.name(), error = %source, "device failed to halt");
                errors.push(BotError::Halt {
                    device: device.name().to_string(),
                    source,
                });
            }
        }
        for connection in self.connections[..connected].iter().rev() {
            debug!(robot = %self.name, connection = %connection.name(), "finalizing");
            if let Err(source) = connection.finalize().await {
                warn!(robot = %self.name, connection = %connection.name(), error = %source, "connection failed to finalize");
                errors.push(BotError::Finalize {
                    connection: connection.name().to_string(),
                    source,
                });
            }
        }

        self.set_frozen(false);
        errors
    }
}

fn generated_name(prefix: &str, taken: &HashSet<String>) -> String {
    loop {
        let candidate = format!("{prefix}{}", rand(u64::from(u32::MAX)));
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use botkit_hal::sim::{CallLog, READ_COMMAND, READING_EVENT, call_log};
    use botkit_hal::{SimConnection, SimDevice};
    use botkit_types::Params;

    fn logged(log: &CallLog) -> Vec<String> {
        log.lock().clone()
    }

    /// Connections `[A, B]`, devices `[X on A, Y on B]`.
    fn two_by_two(log: &CallLog, y_start_error: Option<&str>) -> RobotBuilder {
        let mut y = SimDevice::new("Y", "B").with_log(log.clone());
        if let Some(msg) = y_start_error {
            y = y.failing_start(msg);
        }
        let work_log = log.clone();
        Robot::builder("bot")
            .connection(SimConnection::new("A").with_log(log.clone()))
            .connection(SimConnection::new("B").with_log(log.clone()))
            .device(SimDevice::new("X", "A").with_log(log.clone()))
            .device(y)
            .work(move |_| {
                work_log.lock().push("work".into());
                Ok(())
            })
    }

    #[tokio::test]
    async fn lifecycle_follows_declaration_order() {
        let log = call_log();
        let robot = two_by_two(&log, None).build().unwrap();

        robot.start().await.unwrap();
        assert_eq!(robot.state(), RobotState::Running);
        assert!(robot.is_running());
        robot.stop().await.unwrap();
        assert_eq!(robot.state(), RobotState::Stopped);

        assert_eq!(
            logged(&log),
            vec![
                "A.Connect", "B.Connect", "X.Start", "Y.Start", "work", "Y.Halt", "X.Halt",
                "B.Finalize", "A.Finalize"
            ]
        );
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_devices() {
        let log = call_log();
        let robot = two_by_two(&log, Some("boom")).build().unwrap();

        let err = robot.start().await.unwrap_err();
        assert!(matches!(err, BotError::Start { ref device, .. } if device == "Y"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(robot.state(), RobotState::Failed);
        assert!(!robot.is_running());
        assert_eq!(
            logged(&log),
            vec!["A.Connect", "B.Connect", "X.Start", "Y.Start", "X.Halt", "B.Finalize", "A.Finalize"]
        );
    }

    #[tokio::test]
    async fn connect_failure_touches_no_device() {
        let log = call_log();
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A").with_log(log.clone()))
            .connection(SimConnection::new("B").with_log(log.clone()).failing_connect("no port"))
            .device(SimDevice::new("X", "A").with_log(log.clone()))
            .build()
            .unwrap();

        let err = robot.start().await.unwrap_err();
        assert!(matches!(err, BotError::Connect { ref connection, .. } if connection == "B"));
        assert_eq!(logged(&log), vec!["A.Connect", "B.Connect", "A.Finalize"]);
        assert_eq!(robot.state(), RobotState::Failed);
    }

    #[tokio::test]
    async fn work_error_tears_everything_down() {
        let log = call_log();
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A").with_log(log.clone()))
            .device(SimDevice::new("X", "A").with_log(log.clone()))
            .work(|_| Err(BotError::Work("bad setup".into())))
            .build()
            .unwrap();

        let err = robot.start().await.unwrap_err();
        assert_eq!(err.to_string(), "work failed: bad setup");
        assert!(!robot.is_running());
        assert_eq!(logged(&log), vec!["A.Connect", "X.Start", "X.Halt", "A.Finalize"]);
    }

    #[tokio::test]
    async fn shutdown_errors_are_collected_without_stopping_the_cascade() {
        let log = call_log();
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A").with_log(log.clone()).failing_finalize("stuck"))
            .connection(SimConnection::new("B").with_log(log.clone()))
            .device(SimDevice::new("X", "A").with_log(log.clone()).failing_halt("jammed"))
            .device(SimDevice::new("Y", "B").with_log(log.clone()))
            .build()
            .unwrap();

        robot.start().await.unwrap();
        let err = robot.stop().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let BotError::Shutdown(agg) = &err else {
            panic!("expected shutdown error, got {err:?}");
        };
        assert_eq!(agg.errors.len(), 2);
        assert!(matches!(agg.errors[0], BotError::Halt { ref device, .. } if device == "X"));
        assert!(matches!(agg.errors[1], BotError::Finalize { ref connection, .. } if connection == "A"));
        assert_eq!(
            logged(&log),
            vec!["A.Connect", "B.Connect", "X.Start", "Y.Start", "Y.Halt", "X.Halt", "B.Finalize", "A.Finalize"]
        );
        assert_eq!(robot.state(), RobotState::Stopped);
    }

    #[tokio::test]
    async fn every_connection_connects_before_any_device_and_halts_once() {
        let log = call_log();
        let mut builder = Robot::builder("bot");
        for c in 0..4 {
            builder = builder.connection(SimConnection::new(format!("c{c}")).with_log(log.clone()));
        }
        for d in 0..6 {
            builder = builder.device(SimDevice::new(format!("d{d}"), format!("c{}", d % 4)).with_log(log.clone()));
        }
        let robot = builder.build().unwrap();

        robot.start().await.unwrap();
        robot.stop().await.unwrap();
        // A second stop must not halt anything again.
        robot.stop().await.unwrap();

        let calls = logged(&log);
        let last_connect = calls.iter().rposition(|c| c.ends_with(".Connect")).unwrap();
        let first_start = calls.iter().position(|c| c.ends_with(".Start")).unwrap();
        assert!(last_connect < first_start);
        assert_eq!(calls.iter().filter(|c| c.ends_with(".Connect")).count(), 4);

        for d in 0..6 {
            let halt = format!("d{d}.Halt");
            let finalize = format!("c{}.Finalize", d % 4);
            assert_eq!(calls.iter().filter(|c| **c == halt).count(), 1);
            let halted_at = calls.iter().position(|c| *c == halt).unwrap();
            let finalized_at = calls.iter().position(|c| *c == finalize).unwrap();
            assert!(halted_at < finalized_at, "{halt} must precede {finalize}");
        }
    }

    #[tokio::test]
    async fn empty_robot_starts_and_stops() {
        let robot = Robot::builder("empty").build().unwrap();
        robot.start().await.unwrap();
        assert_eq!(robot.state(), RobotState::Running);
        robot.stop().await.unwrap();
        assert_eq!(robot.state(), RobotState::Stopped);
    }

    #[tokio::test]
    async fn robot_without_work_runs() {
        let robot = Robot::builder("idle")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "A"))
            .build()
            .unwrap();
        robot.start().await.unwrap();
        assert!(robot.is_running());
        assert!(robot.scheduler().is_empty());
        robot.stop().await.unwrap();
    }

    #[test]
    fn duplicate_device_name_is_rejected() {
        let err = Robot::builder("bot")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "A"))
            .device(SimDevice::new("X", "A"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateName {
                kind: "device",
                name: "X".into()
            }
        );
    }

    #[test]
    fn device_on_unknown_connection_is_rejected() {
        let err = Robot::builder("bot")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "Z"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownConnection { .. }));
    }

    #[test]
    fn empty_names_are_generated() {
        let robot = Robot::builder("")
            .connection(SimConnection::new(""))
            .connection(SimConnection::new(""))
            .build()
            .unwrap();
        assert!(robot.name().starts_with("Robot"));
        assert!(robot.name().len() > "Robot".len());
        let names: Vec<_> = robot.connections().iter().map(|c| c.name().to_string()).collect();
        assert!(names.iter().all(|n| n.starts_with("Connection")));
        assert_ne!(names[0], names[1]);
    }

    #[test]
    fn lookups_and_builtin_commands() {
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "A").with_pin("13"))
            .build()
            .unwrap();

        let x = robot.device("X").unwrap();
        assert_eq!(robot.connection_for(x.as_ref()).unwrap().name(), "A");
        assert!(robot.device("nope").is_none());
        assert!(robot.connection("nope").is_none());

        let devices = robot.commander().execute(DEVICES_COMMAND, &Params::new()).unwrap();
        assert_eq!(devices[0]["name"], "X");
        assert_eq!(devices[0]["driver"], "SimDevice");
        assert_eq!(devices[0]["pin"], "13");
        let connections = robot.commander().execute(CONNECTIONS_COMMAND, &Params::new()).unwrap();
        assert_eq!(connections[0]["adaptor"], "SimConnection");
        assert!(robot.commander().execute("robot.missing", &Params::new()).is_none());

        let summary = robot.summary();
        assert_eq!(summary.commands, vec![CONNECTIONS_COMMAND, DEVICES_COMMAND]);
        assert_eq!(summary.events, vec![ERROR_EVENT, HALTED_EVENT, STARTED_EVENT]);
    }

    #[tokio::test]
    async fn registries_are_frozen_while_running() {
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "A"))
            .build()
            .unwrap();
        robot.start().await.unwrap();
        assert!(matches!(robot.eventer().add_event("late"), Err(ConfigError::Frozen { .. })));
        let device_commander = robot.device("X").unwrap();
        assert!(device_commander.commander().unwrap().is_frozen());

        robot.stop().await.unwrap();
        robot.eventer().add_event("late").unwrap();
        assert!(!device_commander.commander().unwrap().is_frozen());
    }

    #[tokio::test]
    async fn lifecycle_events_are_published() {
        let robot = Robot::builder("bot").build().unwrap();
        let mut started = robot.eventer().subscribe(STARTED_EVENT).unwrap();
        let mut halted = robot.eventer().subscribe(HALTED_EVENT).unwrap();

        robot.start().await.unwrap();
        assert_eq!(started.recv().await.unwrap().data, "bot");
        robot.stop().await.unwrap();
        assert_eq!(halted.recv().await.unwrap().data, "bot");
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_jobs_stop_with_the_robot() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let robot = Robot::builder("bot")
            .work(move |robot| {
                let counter = counter.clone();
                robot.every(Duration::from_millis(10), move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
                Ok(())
            })
            .build()
            .unwrap();

        robot.start().await.unwrap();
        assert_eq!(robot.scheduler().len(), 1);
        tokio::time::sleep(Duration::from_millis(35)).await;
        robot.stop().await.unwrap();
        let seen = ticks.load(Ordering::SeqCst);
        assert_eq!(seen, 3);
        assert!(robot.scheduler().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_is_reported_on_error_topic() {
        let robot = Robot::builder("bot").build().unwrap();
        let mut errors = robot.eventer().subscribe(ERROR_EVENT).unwrap();
        robot.start().await.unwrap();

        robot.after(Duration::from_millis(5), || panic!("kaboom"));
        let event = errors.recv().await.unwrap();
        assert_eq!(event.data["message"], "kaboom");
        assert_eq!(event.data["kind"], "after");

        robot.report_error("sensor offline");
        let event = errors.recv().await.unwrap();
        assert_eq!(event.data, "sensor offline");
        robot.stop().await.unwrap();
    }

    #[tokio::test]
    async fn listeners_are_cancelled_on_stop() {
        let seen = Arc::new(AtomicUsize::new(0));
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A"))
            .device(SimDevice::new("X", "A"))
            .build()
            .unwrap();
        robot.start().await.unwrap();

        let device = robot.device("X").unwrap();
        let counter = seen.clone();
        robot
            .on(device.eventer().unwrap(), READING_EVENT, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert!(robot.on(robot.eventer(), "nope", |_| {}).is_err());

        device.commander().unwrap().execute(READ_COMMAND, &Params::new());
        tokio::time::timeout(Duration::from_secs(1), async {
            while seen.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        robot.stop().await.unwrap();
        // The aborted listener drops its subscription once the runtime reaps it.
        let eventer = device.eventer().unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while eventer.publish(READING_EVENT, Value::from(1)) > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn stopped_robot_can_restart() {
        let log = call_log();
        let robot = Robot::builder("bot")
            .connection(SimConnection::new("A").with_log(log.clone()))
            .build()
            .unwrap();
        robot.start().await.unwrap();
        robot.start().await.unwrap();
        robot.stop().await.unwrap();
        robot.start().await.unwrap();
        robot.stop().await.unwrap();
        assert_eq!(
            logged(&log),
            vec!["A.Connect", "A.Finalize", "A.Connect", "A.Finalize"]
        );
    }
}
