//! Task table
//!
//! Per-task bookkeeping for suspended tasks: the listen mask, interrupt bits
//! matched since the last resume, arguments for the first resume and the
//! routing label captured at start. Rows live in a slab; freed slots are
//! reused with a bumped generation so stale [`TaskId`]s are rejected.

use alloc::vec::Vec;

use crate::label::Label;
use crate::task::TaskId;

/// Maximum number of simultaneously scheduled tasks
pub const MAX_TASKS: usize = u16::MAX as usize;

/// One scheduled task
#[derive(Debug)]
pub struct TaskRow<T, A> {
    /// Task handle; `None` while the task is being resumed
    pub task: Option<T>,
    /// Interrupt bits that wake the task early
    pub listen: u32,
    /// Listened bits seen since the last resume
    pub matched: u32,
    /// Arguments for the first resume
    pub initial: Option<A>,
    /// Routing label captured at start
    pub label: Label,
}

#[derive(Debug)]
struct Slot<T, A> {
    generation: u16,
    row: Option<TaskRow<T, A>>,
}

/// Slab of task rows keyed by [`TaskId`]
#[derive(Debug)]
pub struct TaskTable<T, A> {
    slots: Vec<Slot<T, A>>,
    free: Vec<u16>,
    len: usize,
}

impl<T, A> Default for TaskTable<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> TaskTable<T, A> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no task is scheduled
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a row, returning its identity
    pub fn insert(&mut self, row: TaskRow<T, A>) -> Option<TaskId> {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                if self.slots.len() >= MAX_TASKS {
                    return None;
                }
                self.slots.push(Slot {
                    generation: 0,
                    row: None,
                });
                (self.slots.len() - 1) as u16
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.row = Some(row);
        self.len += 1;
        Some(TaskId {
            slot,
            generation: entry.generation,
        })
    }

    /// Row for `id`, if still live
    pub fn get(&self, id: TaskId) -> Option<&TaskRow<T, A>> {
        self.slots
            .get(id.slot())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.row.as_ref())
    }

    /// Mutable row for `id`, if still live
    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRow<T, A>> {
        self.slots
            .get_mut(id.slot())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.row.as_mut())
    }

    /// Identity of the live row in `slot`
    pub fn id_at(&self, slot: u16) -> Option<TaskId> {
        let entry = self.slots.get(slot as usize)?;
        entry.row.as_ref()?;
        Some(TaskId {
            slot,
            generation: entry.generation,
        })
    }

    /// Remove the row for `id`
    pub fn remove(&mut self, id: TaskId) -> Option<TaskRow<T, A>> {
        let entry = self
            .slots
            .get_mut(id.slot())
            .filter(|s| s.generation == id.generation)?;
        let row = entry.row.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.len -= 1;
        Some(row)
    }

    /// Iterate live rows
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TaskId, &mut TaskRow<T, A>)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.row.as_mut().map(|row| {
                (
                    TaskId {
                        slot: i as u16,
                        generation,
                    },
                    row,
                )
            })
        })
    }

    /// Remove every row, yielding the task handles
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.free.clear();
        self.len = 0;
        let slots = &mut self.slots;
        let free = &mut self.free;
        slots.iter_mut().enumerate().filter_map(move |(i, s)| {
            let row = s.row.take()?;
            s.generation = s.generation.wrapping_add(1);
            free.push(i as u16);
            row.task
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(task: u32) -> TaskRow<u32, ()> {
        TaskRow {
            task: Some(task),
            listen: 0,
            matched: 0,
            initial: None,
            label: Label::idle(),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = TaskTable::new();
        let a = table.insert(row(1)).unwrap();
        let b = table.insert(row(2)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).and_then(|r| r.task), Some(1));

        let removed = table.remove(a).unwrap();
        assert_eq!(removed.task, Some(1));
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).and_then(|r| r.task), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_stale_id_rejected_after_slot_reuse() {
        let mut table = TaskTable::new();
        let old = table.insert(row(1)).unwrap();
        table.remove(old);
        let new = table.insert(row(2)).unwrap();
        assert_eq!(old.slot(), new.slot());
        assert!(table.get(old).is_none());
        assert!(table.remove(old).is_none());
        assert_eq!(table.get(new).and_then(|r| r.task), Some(2));
    }

    #[test]
    fn test_drain_releases_all() {
        let mut table = TaskTable::new();
        let ids: std::vec::Vec<_> = (0..3).map(|t| table.insert(row(t)).unwrap()).collect();
        let mut tasks: std::vec::Vec<u32> = table.drain().collect();
        tasks.sort();
        assert_eq!(tasks, [0, 1, 2]);
        assert!(table.is_empty());
        assert!(ids.iter().all(|id| table.get(*id).is_none()));
        // Slots are reusable after a drain
        assert!(table.insert(row(9)).is_some());
    }

    #[test]
    fn test_id_at_and_iter() {
        let mut table = TaskTable::new();
        let a = table.insert(row(1)).unwrap();
        assert_eq!(table.id_at(a.slot), Some(a));
        assert_eq!(table.id_at(5), None);
        for (_, r) in table.iter_mut() {
            r.listen = 0x2;
        }
        assert_eq!(table.get(a).map(|r| r.listen), Some(0x2));
    }
}
