//! `botkit-hal` – hardware abstraction
//!
//! The contracts every adaptor and driver plugs into. A robot only ever
//! talks to these traits, so drivers can be swapped without touching
//! `work` code.
//!
//! | Trait | Role |
//! |---|---|
//! | [`Connection`] | transport to a platform: `connect` / `finalize` |
//! | [`Device`] | driver on top of one connection: `start` / `halt` |
//! | [`Named`] | mutable display name, shared by both |
//! | [`Pinner`] | optional pin information for pin-based drivers |
//!
//! Optional capabilities (an [`Eventer`][botkit_middleware::Eventer] of
//! published topics, a [`Commander`][botkit_middleware::Commander] of
//! callable commands) are exposed through accessor methods that default to
//! `None`.
//!
//! [`sim`] provides headless implementations for tests and demos.

pub mod capability;
pub mod connection;
pub mod device;
pub mod sim;

pub use capability::{Named, Pinner, short_type_name};
pub use connection::Connection;
pub use device::Device;
pub use sim::{SimConnection, SimDevice};
