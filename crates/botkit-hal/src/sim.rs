//! In-process simulated adaptor and driver for tests and demos without
//! physical hardware.
//!
//! [`SimConnection`] and [`SimDevice`] count their lifecycle calls, can be
//! told to fail a specific call, and optionally append `"<name>.<Call>"`
//! entries to a shared [`CallLog`] so tests can assert the exact order in
//! which a robot drove them.
//!
//! # Example
//!
//! ```rust
//! use botkit_hal::sim::{SimConnection, SimDevice, call_log};
//!
//! let log = call_log();
//! let board = SimConnection::new("board").with_log(log.clone());
//! let probe = SimDevice::new("probe", "board")
//!     .with_pin("A0")
//!     .failing_start("sensor unplugged")
//!     .with_log(log);
//! # let _ = (board, probe);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use botkit_middleware::{Commander, Eventer};
use botkit_types::util::{rand, to_scale};
use botkit_types::{DriverError, Value};
use parking_lot::Mutex;
use tracing::debug;

use crate::capability::{Named, Pinner};
use crate::connection::Connection;
use crate::device::Device;

/// Shared, ordered record of lifecycle calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Fresh empty [`CallLog`].
pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Topic on which [`SimDevice`] publishes every sample.
pub const READING_EVENT: &str = "reading";
/// Command that takes a sample and returns it.
pub const READ_COMMAND: &str = "read";

fn record(log: &Option<CallLog>, name: &str, call: &str) {
    if let Some(log) = log {
        log.lock().push(format!("{name}.{call}"));
    }
}

fn injected(slot: &Option<String>) -> Result<(), DriverError> {
    match slot {
        Some(msg) => Err(DriverError::new(msg.clone())),
        None => Ok(()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated connection
// ────────────────────────────────────────────────────────────────────────────

/// A simulated platform adaptor. Succeeds unless told otherwise.
pub struct SimConnection {
    name: String,
    port: String,
    connects: AtomicUsize,
    finalizes: AtomicUsize,
    connected: AtomicBool,
    fail_connect: Option<String>,
    fail_finalize: Option<String>,
    log: Option<CallLog>,
}

impl SimConnection {
    /// Create a simulated connection. An empty `name` lets the robot assign
    /// a generated one.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: "/dev/sim0".to_string(),
            connects: AtomicUsize::new(0),
            finalizes: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            fail_connect: None,
            fail_finalize: None,
            log: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every `connect` fail with `message`.
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.fail_connect = Some(message.into());
        self
    }

    /// Make every `finalize` fail with `message`.
    pub fn failing_finalize(mut self, message: impl Into<String>) -> Self {
        self.fail_finalize = Some(message.into());
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn finalize_count(&self) -> usize {
        self.finalizes.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Named for SimConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

#[async_trait]
impl Connection for SimConnection {
    async fn connect(&self) -> Result<(), DriverError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        record(&self.log, &self.name, "Connect");
        injected(&self.fail_connect)?;
        self.connected.store(true, Ordering::SeqCst);
        debug!(connection = %self.name, port = %self.port, "sim connection opened");
        Ok(())
    }

    async fn finalize(&self) -> Result<(), DriverError> {
        self.finalizes.fetch_add(1, Ordering::SeqCst);
        record(&self.log, &self.name, "Finalize");
        self.connected.store(false, Ordering::SeqCst);
        injected(&self.fail_finalize)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated device
// ────────────────────────────────────────────────────────────────────────────

/// A simulated analog sensor.
///
/// Exposes a [`READ_COMMAND`] command that samples a random value scaled to
/// `[min, max]` and publishes it on the [`READING_EVENT`] topic.
pub struct SimDevice {
    name: String,
    connection: String,
    pin: Option<String>,
    range: (f64, f64),
    eventer: Eventer,
    commander: Commander,
    started: AtomicBool,
    starts: AtomicUsize,
    halts: AtomicUsize,
    fail_start: Option<String>,
    fail_halt: Option<String>,
    log: Option<CallLog>,
}

impl SimDevice {
    /// Create a simulated sensor bound to the connection named `connection`.
    pub fn new(name: impl Into<String>, connection: impl Into<String>) -> Self {
        let eventer = Eventer::new();
        let commander = Commander::new();
        let mut device = Self {
            name: name.into(),
            connection: connection.into(),
            pin: None,
            range: (0.0, 1.0),
            eventer,
            commander,
            started: AtomicBool::new(false),
            starts: AtomicUsize::new(0),
            halts: AtomicUsize::new(0),
            fail_start: None,
            fail_halt: None,
            log: None,
        };
        device.register_capabilities();
        device
    }

    // Fresh registries accept both names.
    fn register_capabilities(&mut self) {
        let _ = self.eventer.add_event(READING_EVENT);
        self.install_read_command();
    }

    fn install_read_command(&mut self) {
        self.commander = Commander::new();
        let eventer = self.eventer.clone();
        let (min, max) = self.range;
        let _ = self.commander.add_command(READ_COMMAND, move |_| {
            let value = Value::from(sample(min, max));
            eventer.publish(READING_EVENT, value.clone());
            value
        });
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    /// Scale samples to `[min, max]` instead of `[0, 1]`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = (min, max);
        self.install_read_command();
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Make every `start` fail with `message`.
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.fail_start = Some(message.into());
        self
    }

    /// Make every effective `halt` fail with `message`.
    pub fn failing_halt(mut self, message: impl Into<String>) -> Self {
        self.fail_halt = Some(message.into());
        self
    }

    /// Take a sample and publish it on [`READING_EVENT`].
    pub fn read(&self) -> f64 {
        let (min, max) = self.range;
        let value = sample(min, max);
        self.eventer.publish(READING_EVENT, Value::from(value));
        value
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Effective halts only; no-op halts are not counted.
    pub fn halt_count(&self) -> usize {
        self.halts.load(Ordering::SeqCst)
    }
}

fn sample(min: f64, max: f64) -> f64 {
    to_scale(rand(1000) as f64 / 1000.0, min, max)
}

impl Named for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Pinner for SimDevice {
    fn pin(&self) -> &str {
        self.pin.as_deref().unwrap_or_default()
    }
}

#[async_trait]
impl Device for SimDevice {
    async fn start(&self) -> Result<(), DriverError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        record(&self.log, &self.name, "Start");
        injected(&self.fail_start)?;
        self.started.store(true, Ordering::SeqCst);
        debug!(device = %self.name, connection = %self.connection, "sim device started");
        Ok(())
    }

    async fn halt(&self) -> Result<(), DriverError> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.halts.fetch_add(1, Ordering::SeqCst);
        record(&self.log, &self.name, "Halt");
        injected(&self.fail_halt)
    }

    fn connection(&self) -> &str {
        &self.connection
    }

    fn eventer(&self) -> Option<&Eventer> {
        Some(&self.eventer)
    }

    fn commander(&self) -> Option<&Commander> {
        Some(&self.commander)
    }

    fn pinner(&self) -> Option<&dyn Pinner> {
        self.pin.as_ref().map(|_| self as &dyn Pinner)
    }
}
