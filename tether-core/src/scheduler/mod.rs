//! Cooperative task scheduler
//!
//! Orders suspended tasks by wake time against the wrapping millisecond
//! clock and merges in interrupt bits once per host-driven tick.

pub mod executor;
pub mod queue;
pub mod table;

pub use executor::{Scheduler, SchedulerError, DEFAULT_IDLE_SLEEP_MS};
pub use queue::{WaitEntry, WaitQueue};
pub use table::{TaskRow, TaskTable, MAX_TASKS};
