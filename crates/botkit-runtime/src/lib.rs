//! `botkit-runtime` – composition and lifecycle
//!
//! Where connections, devices and user code become a running system.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: an ordered set of connections and
//!   devices plus a `work` callback. Starts connections then devices in
//!   declaration order, rolls back on failure, and halts everything in
//!   reverse order on stop, collecting teardown errors. Each robot owns a
//!   [`Scheduler`][botkit_kernel::Scheduler] and an
//!   [`Eventer`][botkit_middleware::Eventer] whose `"error"` topic carries
//!   runtime failures.
//! - [`master`] – [`Master`][master::Master]: a fleet of robots behind a
//!   signal trap. `start` brings every robot up and, with `auto_run`, blocks
//!   until interrupted.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with optional OTLP span export.

pub mod master;
pub mod robot;
pub mod telemetry;

pub use master::{Master, ROBOTS_COMMAND, Trap, ctrl_c_trap};
pub use robot::{
    CONNECTIONS_COMMAND, DEVICES_COMMAND, ERROR_EVENT, HALTED_EVENT, Robot, RobotBuilder, RobotState,
    STARTED_EVENT, Work,
};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
