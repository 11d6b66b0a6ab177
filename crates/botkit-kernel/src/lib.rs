//! `botkit-kernel` – timing
//!
//! The time driver every robot leans on. It does not know about devices; it
//! runs callbacks when they are due and stops them when asked.
//!
//! # Modules
//!
//! - [`scheduler`] – [`Scheduler`][scheduler::Scheduler]:
//!   one-shot ([`after`][scheduler::Scheduler::after]) and periodic
//!   ([`every`][scheduler::Scheduler::every]) callbacks on Tokio tasks,
//!   cancelable through a [`JobHandle`][scheduler::JobHandle] and tracked
//!   in a per-scheduler job registry. A process-wide default instance backs
//!   the free functions [`after`] and [`every`].
//! - [`interval`] – the `"500ms"` / `"1.5s"` duration-string parser and
//!   formatter, plus [`IntoInterval`] so the same entry points accept native
//!   [`Duration`][std::time::Duration] values.

pub mod interval;
pub mod scheduler;

pub use interval::{IntoInterval, format_duration, parse_duration};
pub use scheduler::{JobHandle, JobInfo, JobKind, PanicHook, Scheduler, after, every};
