//! `Connection` contract for platform adaptors (serial ports, I²C buses,
//! network endpoints, …).
//!
//! Adaptors implement this trait and are handed to a robot, which owns them
//! for the robot's whole lifetime. The robot calls
//! [`connect`][Connection::connect] exactly once per run before any device
//! starts, and [`finalize`][Connection::finalize] exactly once after every
//! device has halted.

use async_trait::async_trait;
use botkit_middleware::{Commander, Eventer};
use botkit_types::{ConnectionSummary, DriverError};

use crate::capability::{Named, short_type_name};

/// A transport to a hardware platform.
///
/// Lifecycle methods take `&self`; adaptors keep their mutable state behind
/// interior mutability.
#[async_trait]
pub trait Connection: Named + Send + Sync {
    /// Open the transport.
    ///
    /// # Errors
    ///
    /// Any [`DriverError`] aborts the owning robot's start.
    async fn connect(&self) -> Result<(), DriverError>;

    /// Release the transport.
    ///
    /// # Errors
    ///
    /// Collected into the shutdown aggregate; never stops the teardown of
    /// other resources.
    async fn finalize(&self) -> Result<(), DriverError>;

    /// Short type name reported in summaries.
    fn adaptor(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Topics this adaptor publishes, if any.
    fn eventer(&self) -> Option<&Eventer> {
        None
    }

    /// Commands this adaptor exposes, if any.
    fn commander(&self) -> Option<&Commander> {
        None
    }

    fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            name: self.name().to_string(),
            adaptor: self.adaptor().to_string(),
        }
    }
}
