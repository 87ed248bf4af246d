//! Suspendable task contract
//!
//! A task is an opaque unit of cooperative execution owned by the script
//! engine. The scheduler never looks inside it: it only asks the engine to
//! resume it and acts on the returned [`Step`].

use crate::engine::Host;

/// Identity of a scheduled task
///
/// The generation detects stale handles after a slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId {
    pub(crate) slot: u16,
    pub(crate) generation: u16,
}

impl TaskId {
    /// Table slot index
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

/// Arguments passed to a resumed task
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wake<A> {
    /// First resume, with the arguments given at start
    Start(A),
    /// Any later resume
    Resume {
        /// Tick timestamp (ms)
        now: u32,
        /// Interrupt bits that matched the task's listen mask
        interrupts: u32,
    },
}

/// What a task asks for after being resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Suspend again for `delay_ms`, waking early on any `listen` bit
    Suspend { delay_ms: u32, listen: u32 },
    /// Finished normally
    Done,
    /// Failed; the task is discarded
    Failed,
}

impl Step {
    /// Suspend without listening for interrupts
    pub const fn sleep(delay_ms: u32) -> Self {
        Step::Suspend {
            delay_ms,
            listen: 0,
        }
    }
}

/// Resumes tasks on behalf of the scheduler
///
/// Implemented by the script engine, which owns whatever state a task's
/// handle refers to.
pub trait TaskRunner {
    /// Task handle
    type Task;
    /// Arguments for a task's first resume
    type Args;

    /// Resume `task`
    ///
    /// Output goes through `host.console()`, already labeled with the
    /// routing label captured when the task was started. On
    /// [`Step::Failed`] the runner is expected to have emitted its own
    /// diagnostic.
    fn resume(
        &mut self,
        task: &mut Self::Task,
        wake: Wake<Self::Args>,
        host: &mut Host<'_, Self::Task, Self::Args>,
    ) -> Step;

    /// True if the task was terminated while suspended
    ///
    /// Checked before every resume; a terminated task is released without
    /// being resumed.
    fn is_terminated(&mut self, _task: &Self::Task) -> bool {
        false
    }

    /// Release a task that will never be resumed again
    fn release(&mut self, task: Self::Task) {
        drop(task);
    }
}
