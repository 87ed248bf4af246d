//! Priority wait queue
//!
//! Binary min-heap of table slots keyed by wake time. Keys are compared by
//! their signed distance from a per-tick anchor ("recent time"), never by
//! raw value, so ordering stays correct across counter wraparound.
//!
//! A position index makes repositioning an already queued slot O(log n).

use alloc::vec::Vec;

use crate::clock::elapsed;

/// Heap entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitEntry {
    /// Task table slot
    pub slot: u16,
    /// Wake timestamp (ms)
    pub wake: u32,
}

/// Min-heap over wake times
#[derive(Debug, Default)]
pub struct WaitQueue {
    heap: Vec<WaitEntry>,
    /// Heap index of each slot, if queued
    position: Vec<Option<usize>>,
    anchor: u32,
}

impl WaitQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the comparison anchor; call once per tick
    pub fn set_anchor(&mut self, now: u32) {
        self.anchor = now;
    }

    /// Current comparison anchor
    pub fn anchor(&self) -> u32 {
        self.anchor
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// True if `slot` is queued
    pub fn contains(&self, slot: u16) -> bool {
        self.index_of(slot).is_some()
    }

    /// Earliest entry without removing it
    pub fn peek(&self) -> Option<&WaitEntry> {
        self.heap.first()
    }

    /// Wake time of `slot`, if queued
    pub fn wake_time(&self, slot: u16) -> Option<u32> {
        self.index_of(slot).map(|i| self.heap[i].wake)
    }

    /// Insert `slot`, or move it if already queued
    pub fn enqueue(&mut self, slot: u16, wake: u32) {
        match self.index_of(slot) {
            Some(i) => {
                self.heap[i].wake = wake;
                let i = self.sift_up(i);
                self.sift_down(i);
            }
            None => {
                let s = slot as usize;
                if self.position.len() <= s {
                    self.position.resize(s + 1, None);
                }
                self.heap.push(WaitEntry { slot, wake });
                let i = self.heap.len() - 1;
                self.position[s] = Some(i);
                self.sift_up(i);
            }
        }
    }

    /// Remove and return the earliest entry
    pub fn dequeue(&mut self) -> Option<WaitEntry> {
        self.remove_at(0)
    }

    /// Remove `slot` if queued
    pub fn remove(&mut self, slot: u16) -> Option<WaitEntry> {
        let i = self.index_of(slot)?;
        self.remove_at(i)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.heap.clear();
        self.position.clear();
    }

    fn index_of(&self, slot: u16) -> Option<usize> {
        self.position.get(slot as usize).copied().flatten()
    }

    fn key(&self, i: usize) -> i32 {
        elapsed(self.heap[i].wake, self.anchor)
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.position[self.heap[a].slot as usize] = Some(a);
        self.position[self.heap[b].slot as usize] = Some(b);
    }

    fn remove_at(&mut self, i: usize) -> Option<WaitEntry> {
        if i >= self.heap.len() {
            return None;
        }
        let last = self.heap.len() - 1;
        if i != last {
            self.swap(i, last);
        }
        let entry = self.heap.pop()?;
        self.position[entry.slot as usize] = None;
        if i < self.heap.len() {
            let i = self.sift_up(i);
            self.sift_down(i);
        }
        Some(entry)
    }

    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.key(i) >= self.key(parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i
    }

    fn sift_down(&mut self, mut i: usize) -> usize {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.key(left) < self.key(smallest) {
                smallest = left;
            }
            if right < len && self.key(right) < self.key(smallest) {
                smallest = right;
            }
            if smallest == i {
                return i;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(queue: &mut WaitQueue) -> std::vec::Vec<u16> {
        core::iter::from_fn(|| queue.dequeue().map(|e| e.slot)).collect()
    }

    #[test]
    fn test_dequeue_in_wake_order() {
        let mut q = WaitQueue::new();
        q.enqueue(0, 50);
        q.enqueue(1, 10);
        q.enqueue(2, 30);
        assert_eq!(q.peek().map(|e| e.slot), Some(1));
        assert_eq!(drain(&mut q), [1, 2, 0]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_enqueue_repositions_existing() {
        let mut q = WaitQueue::new();
        q.enqueue(0, 10);
        q.enqueue(1, 20);
        q.enqueue(2, 30);

        q.enqueue(2, 5);
        assert_eq!(q.len(), 3);
        assert_eq!(q.peek(), Some(&WaitEntry { slot: 2, wake: 5 }));

        q.enqueue(2, 100);
        assert_eq!(drain(&mut q), [0, 1, 2]);
    }

    #[test]
    fn test_remove_middle_entry() {
        let mut q = WaitQueue::new();
        for (slot, wake) in [(0, 40), (1, 10), (2, 30), (3, 20)] {
            q.enqueue(slot, wake);
        }
        assert_eq!(q.remove(2), Some(WaitEntry { slot: 2, wake: 30 }));
        assert!(!q.contains(2));
        assert_eq!(q.remove(2), None);
        assert_eq!(drain(&mut q), [1, 3, 0]);
    }

    #[test]
    fn test_order_across_wraparound() {
        let mut q = WaitQueue::new();
        q.set_anchor(0xffff_fff0);
        // After the wrap, numerically small
        q.enqueue(0, 0x0000_0004);
        // Before the wrap, numerically large
        q.enqueue(1, 0xffff_fffe);
        assert_eq!(drain(&mut q), [1, 0]);
    }

    #[test]
    fn test_order_across_signed_rollover() {
        let mut q = WaitQueue::new();
        q.set_anchor(0x7fff_fff0);
        q.enqueue(0, 0x8000_0002);
        q.enqueue(1, 0x7fff_fffe);
        assert_eq!(q.wake_time(0), Some(0x8000_0002));
        assert_eq!(drain(&mut q), [1, 0]);
    }

    proptest! {
        #[test]
        fn prop_drains_sorted_relative_to_anchor(
            anchor in any::<u32>(),
            offsets in proptest::collection::vec(-1_000_000i32..1_000_000, 1..40),
        ) {
            let mut q = WaitQueue::new();
            q.set_anchor(anchor);
            for (slot, off) in offsets.iter().enumerate() {
                q.enqueue(slot as u16, anchor.wrapping_add(*off as u32));
            }
            let mut last = i32::MIN;
            while let Some(entry) = q.dequeue() {
                let key = elapsed(entry.wake, anchor);
                prop_assert!(key >= last);
                last = key;
            }
        }
    }
}
