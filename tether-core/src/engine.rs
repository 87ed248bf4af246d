//! Script engine collaborator
//!
//! The engine that actually runs scripts lives outside this crate. It sees
//! source and bytecode as opaque bytes and reaches back into the core only
//! through a [`Host`]: the console for output, the scheduler for task
//! lifecycle and the clock.

use alloc::vec::Vec;
use core::fmt;

use heapless::String;

use crate::console::{with_label, Console};
use crate::label::Label;
use crate::scheduler::SchedulerError;
use crate::task::{TaskId, TaskRunner};

/// Maximum length of a script error message
pub const MAX_SCRIPT_MESSAGE: usize = 96;

/// Category of a script failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScriptErrorKind {
    /// Source failed to compile
    Syntax,
    /// Error raised while running
    Runtime,
    /// Out of memory
    Memory,
    /// Anything else
    Other,
}

impl ScriptErrorKind {
    /// Short name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Runtime => "runtime",
            Self::Memory => "memory",
            Self::Other => "error",
        }
    }
}

/// Failure reported by the script engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String<MAX_SCRIPT_MESSAGE>,
}

impl ScriptError {
    /// Create an error, truncating the message to fit
    pub fn new(kind: ScriptErrorKind, message: &str) -> Self {
        let mut text = String::new();
        for c in message.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        Self {
            kind,
            message: text,
        }
    }

    pub fn syntax(message: &str) -> Self {
        Self::new(ScriptErrorKind::Syntax, message)
    }

    pub fn runtime(message: &str) -> Self {
        Self::new(ScriptErrorKind::Runtime, message)
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind.name(), self.message)
    }
}

/// Task lifecycle and clock services offered to collaborators
///
/// Object safe so a [`Host`] can carry it without knowing the clock source.
pub trait Spawner<T, A> {
    /// Schedule `task` to first run `delay_ms` from now with `args`
    fn start(&mut self, task: T, delay_ms: u32, args: A, label: Label)
        -> Result<TaskId, SchedulerError>;

    /// Move a scheduled task's wake time to `delay_ms` from now
    fn wake(&mut self, id: TaskId, delay_ms: u32) -> Result<(), SchedulerError>;

    /// Unschedule a task
    ///
    /// Returns the task handle unless the task is the one currently
    /// running, in which case it is released when it yields.
    fn cancel(&mut self, id: TaskId) -> Option<T>;

    /// Current counter reading (ms)
    fn now_ms(&mut self) -> u32;

    /// Milliseconds since boot, rollover-extended
    fn uptime_ms(&mut self) -> u64;

    /// Counter rollovers seen so far
    fn rollovers(&self) -> u32;

    /// Supply the current calendar time (ms since the epoch)
    fn set_calendar(&mut self, epoch_ms: u64);

    /// Calendar time, once supplied
    fn calendar_ms(&mut self) -> Option<u64>;
}

/// Services handed to the engine for the duration of one call
pub struct Host<'a, T, A> {
    spawner: &'a mut dyn Spawner<T, A>,
    console: &'a mut dyn Console,
}

impl<'a, T, A> Host<'a, T, A> {
    pub fn new(spawner: &'a mut dyn Spawner<T, A>, console: &'a mut dyn Console) -> Self {
        Self { spawner, console }
    }

    /// Start a task under the current routing label
    pub fn start(&mut self, task: T, delay_ms: u32, args: A) -> Result<TaskId, SchedulerError> {
        let label = self.console.label().clone();
        self.spawner.start(task, delay_ms, args, label)
    }

    /// See [`Spawner::wake`]
    pub fn wake(&mut self, id: TaskId, delay_ms: u32) -> Result<(), SchedulerError> {
        self.spawner.wake(id, delay_ms)
    }

    /// See [`Spawner::cancel`]
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        self.spawner.cancel(id)
    }

    pub fn now_ms(&mut self) -> u32 {
        self.spawner.now_ms()
    }

    pub fn uptime_ms(&mut self) -> u64 {
        self.spawner.uptime_ms()
    }

    pub fn rollovers(&self) -> u32 {
        self.spawner.rollovers()
    }

    pub fn set_calendar(&mut self, epoch_ms: u64) {
        self.spawner.set_calendar(epoch_ms);
    }

    pub fn calendar_ms(&mut self) -> Option<u64> {
        self.spawner.calendar_ms()
    }

    /// Output console, labeled for the current request or task
    pub fn console(&mut self) -> &mut (dyn Console + 'a) {
        &mut *self.console
    }

    /// Current routing label
    pub fn label(&self) -> &Label {
        self.console.label()
    }

    /// Replace the routing label until the current command or resume ends
    pub fn set_label(&mut self, label: Label) {
        self.console.set_label(label);
    }

    /// Run `f` under `label`, restoring the current label afterwards
    pub fn with_label<R>(&mut self, label: Label, f: impl FnOnce(&mut dyn Console) -> R) -> R {
        with_label(&mut *self.console, label, |console| f(console))
    }
}

/// Script engine driven by the dispatcher and the scheduler
pub trait ScriptEngine: TaskRunner {
    /// Discard all scripting state and start fresh
    ///
    /// Called after every scheduled task has been released.
    fn reset(&mut self, host: &mut Host<'_, Self::Task, Self::Args>);

    /// Compile and run `source`, printing results through the console
    fn eval(
        &mut self,
        source: &[u8],
        host: &mut Host<'_, Self::Task, Self::Args>,
    ) -> Result<(), ScriptError>;

    /// Compile and run `source`, keeping a non-nil result under `name`
    fn load(
        &mut self,
        name: &[u8],
        source: &[u8],
        host: &mut Host<'_, Self::Task, Self::Args>,
    ) -> Result<(), ScriptError>;

    /// Compile `source` without running it, returning its serialized form
    fn compile(&mut self, name: &[u8], source: &[u8]) -> Result<Vec<u8>, ScriptError>;
}

/// Handler for `msg` commands
pub type MessageHook<E> = fn(
    &mut E,
    &mut Host<'_, <E as TaskRunner>::Task, <E as TaskRunner>::Args>,
    &[u8],
    &[u8],
) -> Result<(), ScriptError>;
