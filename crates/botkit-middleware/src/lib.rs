//! `botkit-middleware` – events and commands
//!
//! Routes values and requests between robots, devices and user code without
//! caring what they mean.
//!
//! # Modules
//!
//! - [`bus`] – per-object topic registry ([`Eventer`]) with bounded,
//!   drop-on-full subscriptions built on Tokio channels.
//! - [`commander`] – registry of named commands taking loosely-typed
//!   parameter maps ([`Commander`]).

pub mod bus;
pub mod commander;

pub use bus::{Eventer, Listener, Subscription, DEFAULT_CAPACITY, LISTENER_CAPACITY};
pub use commander::{CommandFn, Commander};
