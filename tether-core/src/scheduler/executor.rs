//! Cooperative task scheduler
//!
//! Runs suspended tasks on the caller's stack, one external tick at a time.
//! Each tick:
//!
//! 1. Reads the clock and fixes the wait queue's comparison anchor.
//! 2. Wakes every waiter whose listen mask intersects the incoming
//!    interrupt bits, recording which bits matched.
//! 3. Resumes every task whose wake time has been reached, in wake order.
//! 4. Returns how long the caller may sleep before the next tick.
//!
//! Interrupt bits with no matching waiter are dropped, not latched.
//! Tasks rescheduled while the tick is draining are picked up by the next
//! tick at the earliest, so a tick always terminates.

use alloc::vec::Vec;

use super::queue::WaitQueue;
use super::table::{TaskRow, TaskTable};
use crate::clock::{elapsed, is_due, Clock, MillisSource};
use crate::console::{with_label, Console};
use crate::engine::{Host, Spawner};
use crate::label::Label;
use crate::task::{Step, TaskId, TaskRunner, Wake};
use crate::trace::{debug, error, trace};

/// Sleep suggested when nothing is scheduled (ms)
pub const DEFAULT_IDLE_SLEEP_MS: u32 = 1000;

/// Errors from the task lifecycle API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    /// Task id is stale or was never issued
    UnknownTask,
    /// No free task slot
    TableFull,
}

/// Task scheduler
///
/// Owns the wait queue and the task table; collaborators reach them only
/// through [`Spawner`].
#[derive(Debug)]
pub struct Scheduler<T, A, S> {
    table: TaskTable<T, A>,
    queue: WaitQueue,
    clock: Clock<S>,
    idle_sleep_ms: u32,
    /// Slots due in the current tick
    ready: Vec<u16>,
}

impl<T, A, S: MillisSource> Scheduler<T, A, S> {
    /// Create a scheduler over a millisecond source
    pub fn new(source: S) -> Self {
        Self::with_idle_sleep(source, DEFAULT_IDLE_SLEEP_MS)
    }

    /// Create a scheduler with a custom idle sleep
    pub fn with_idle_sleep(source: S, idle_sleep_ms: u32) -> Self {
        Self {
            table: TaskTable::new(),
            queue: WaitQueue::new(),
            clock: Clock::new(source),
            idle_sleep_ms,
            ready: Vec::new(),
        }
    }

    /// Number of scheduled tasks
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// True if `id` refers to a scheduled task
    pub fn contains(&self, id: TaskId) -> bool {
        self.table.get(id).is_some()
    }

    /// Listen mask registered for `id`
    pub fn listen_mask(&self, id: TaskId) -> Option<u32> {
        self.table.get(id).map(|row| row.listen)
    }

    /// Wake time of `id`, if queued
    pub fn wake_time(&self, id: TaskId) -> Option<u32> {
        self.table.get(id)?;
        self.queue.wake_time(id.slot)
    }

    /// Routing label captured when `id` was started
    pub fn label_of(&self, id: TaskId) -> Option<&Label> {
        self.table.get(id).map(|row| &row.label)
    }

    /// Access the clock
    pub fn clock(&mut self) -> &mut Clock<S> {
        &mut self.clock
    }

    /// Drop every task, releasing each through `runner`
    pub fn clear<R>(&mut self, runner: &mut R)
    where
        R: TaskRunner<Task = T, Args = A> + ?Sized,
    {
        self.queue.clear();
        for task in self.table.drain() {
            runner.release(task);
        }
        trace!("scheduler cleared");
    }

    /// Run one tick
    ///
    /// `interrupts` holds the interrupt bits observed since the previous
    /// tick. Returns the suggested sleep before the next tick (ms).
    pub fn tick<R>(&mut self, runner: &mut R, console: &mut dyn Console, interrupts: u32) -> u32
    where
        R: TaskRunner<Task = T, Args = A> + ?Sized,
    {
        let now = self.clock.now();
        self.queue.set_anchor(now);

        if interrupts != 0 {
            self.deliver_interrupts(now, interrupts);
        }

        let mut ready = core::mem::take(&mut self.ready);
        while let Some(entry) = self.queue.peek() {
            if !is_due(entry.wake, now) {
                break;
            }
            if let Some(entry) = self.queue.dequeue() {
                ready.push(entry.slot);
            }
        }
        for slot in ready.drain(..) {
            self.run_slot(slot, now, &mut *runner, &mut *console);
        }
        self.ready = ready;

        match self.queue.peek() {
            Some(next) => elapsed(next.wake, now).max(0) as u32,
            None => self.idle_sleep_ms,
        }
    }

    fn deliver_interrupts(&mut self, now: u32, interrupts: u32) {
        let queue = &mut self.queue;
        for (id, row) in self.table.iter_mut() {
            let hit = row.listen & interrupts;
            if hit != 0 && queue.contains(id.slot) {
                row.matched |= hit;
                queue.enqueue(id.slot, now);
                trace!("interrupt {=u32:#x} wakes slot {}", hit, id.slot);
            }
        }
    }

    fn run_slot<R>(&mut self, slot: u16, now: u32, runner: &mut R, console: &mut dyn Console)
    where
        R: TaskRunner<Task = T, Args = A> + ?Sized,
    {
        let Some(id) = self.table.id_at(slot) else {
            return;
        };
        // Rescheduled by an earlier task in this tick
        if self.queue.contains(slot) {
            return;
        }
        let Some(row) = self.table.get_mut(id) else {
            return;
        };
        let Some(mut task) = row.task.take() else {
            return;
        };

        let matched = row.matched;
        row.listen = 0;
        row.matched = 0;

        if runner.is_terminated(&task) {
            self.table.remove(id);
            runner.release(task);
            debug!("dropped terminated task in slot {}", slot);
            return;
        }

        let wake = match row.initial.take() {
            Some(args) => Wake::Start(args),
            None => Wake::Resume {
                now,
                interrupts: matched,
            },
        };
        let label = row.label.clone();

        let step = with_label(console, label, |console| {
            let mut host = Host::new(&mut *self, console);
            runner.resume(&mut task, wake, &mut host)
        });

        let Some(row) = self.table.get_mut(id) else {
            // Cancelled while running
            runner.release(task);
            return;
        };

        match step {
            Step::Suspend { delay_ms, listen } => {
                row.task = Some(task);
                row.listen = listen;
                self.queue.enqueue(slot, now.wrapping_add(delay_ms));
            }
            Step::Done => {
                self.remove(id);
                runner.release(task);
            }
            Step::Failed => {
                error!("task in slot {} failed, discarding", slot);
                self.remove(id);
                runner.release(task);
            }
        }
    }

    fn remove(&mut self, id: TaskId) -> Option<TaskRow<T, A>> {
        let row = self.table.remove(id)?;
        self.queue.remove(id.slot);
        Some(row)
    }
}

impl<T, A, S: MillisSource> Spawner<T, A> for Scheduler<T, A, S> {
    fn start(
        &mut self,
        task: T,
        delay_ms: u32,
        args: A,
        label: Label,
    ) -> Result<TaskId, SchedulerError> {
        let now = self.clock.now();
        let id = self
            .table
            .insert(TaskRow {
                task: Some(task),
                listen: 0,
                matched: 0,
                initial: Some(args),
                label,
            })
            .ok_or(SchedulerError::TableFull)?;
        self.queue.enqueue(id.slot, now.wrapping_add(delay_ms));
        trace!("start slot {} in {=u32}ms", id.slot, delay_ms);
        Ok(id)
    }

    fn wake(&mut self, id: TaskId, delay_ms: u32) -> Result<(), SchedulerError> {
        self.table.get(id).ok_or(SchedulerError::UnknownTask)?;
        let now = self.clock.now();
        self.queue.enqueue(id.slot, now.wrapping_add(delay_ms));
        trace!("wake slot {} in {=u32}ms", id.slot, delay_ms);
        Ok(())
    }

    fn cancel(&mut self, id: TaskId) -> Option<T> {
        let row = self.remove(id)?;
        trace!("cancel slot {}", id.slot);
        row.task
    }

    fn now_ms(&mut self) -> u32 {
        self.clock.now()
    }

    fn uptime_ms(&mut self) -> u64 {
        self.clock.uptime_ms()
    }

    fn rollovers(&self) -> u32 {
        self.clock.rollovers()
    }

    fn set_calendar(&mut self, epoch_ms: u64) {
        self.clock.set_calendar(epoch_ms);
    }

    fn calendar_ms(&mut self) -> Option<u64> {
        self.clock.calendar_ms()
    }
}
