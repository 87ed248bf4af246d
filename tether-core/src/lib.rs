//! Board-agnostic core of the Tether firmware
//!
//! The device accepts scripts from a host over a serial link and runs them
//! cooperatively alongside hardware interrupts, with no operating system
//! underneath. This crate holds everything that does not depend on a
//! particular board or script engine:
//!
//! - Wraparound-safe millisecond clock with rollover counting
//! - Routing labels and the label-prefixed serial console
//! - Cooperative task scheduler (wait queue, task table, tick loop)
//! - Script engine collaborator traits
//! - Command dispatch and the host-pumped runtime
//! - Runtime configuration
//!
//! The wire format itself lives in `tether-protocol`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

mod trace;

pub mod clock;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod engine;
pub mod label;
pub mod runtime;
pub mod scheduler;
pub mod task;

#[cfg(test)]
mod testing;

pub use clock::{Clock, MillisSource};
pub use config::{ConfigError, LoaderConfig, RuntimeConfig, SchedulerConfig};
pub use console::{Console, SerialConsole};
pub use dispatch::Dispatcher;
pub use engine::{Host, MessageHook, ScriptEngine, ScriptError, ScriptErrorKind, Spawner};
pub use label::{Label, LabelError};
pub use runtime::Runtime;
pub use scheduler::{Scheduler, SchedulerError};
pub use task::{Step, TaskId, TaskRunner, Wake};
