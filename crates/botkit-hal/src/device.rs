//! `Device` contract for drivers (LEDs, servos, sensors, …).
//!
//! A device talks to hardware through exactly one connection of the same
//! robot. It does not hold that connection: it names it, and the robot
//! resolves the name (see `Robot::connection_for`). The robot starts a
//! device only after its connection is connected and halts it before the
//! connection is finalized.

use async_trait::async_trait;
use botkit_middleware::{Commander, Eventer};
use botkit_types::{DeviceSummary, DriverError};

use crate::capability::{Named, Pinner, short_type_name};

/// A driver exposing device semantics on top of a [`Connection`][crate::Connection].
#[async_trait]
pub trait Device: Named + Send + Sync {
    /// Bring the device up.
    ///
    /// # Errors
    ///
    /// Any [`DriverError`] fails the robot's start and triggers a
    /// compensating halt of the devices already started.
    async fn start(&self) -> Result<(), DriverError>;

    /// Bring the device down. Must be idempotent: a second call after a
    /// successful halt returns `Ok(())` without touching hardware.
    async fn halt(&self) -> Result<(), DriverError>;

    /// Name of the connection this device is bound to.
    fn connection(&self) -> &str;

    /// Short type name reported in summaries.
    fn driver(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Topics this driver publishes, if any.
    fn eventer(&self) -> Option<&Eventer> {
        None
    }

    /// Commands this driver exposes, if any.
    fn commander(&self) -> Option<&Commander> {
        None
    }

    /// Pin information, if the driver is pin-based.
    fn pinner(&self) -> Option<&dyn Pinner> {
        None
    }

    fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.name().to_string(),
            driver: self.driver().to_string(),
            connection: self.connection().to_string(),
            commands: self.commander().map(Commander::commands).unwrap_or_default(),
            events: self.eventer().map(Eventer::events).unwrap_or_default(),
            pin: self.pinner().map(|p| p.pin().to_string()),
        }
    }
}
