//! Millisecond clock
//!
//! Wraps a free-running hardware millisecond counter. The counter is read
//! as a signed 32-bit value; a *rollover* is any decrease between two
//! consecutive reads (`0x7fffffff -> 0x80000000`). Counting rollovers
//! extends the counter into a 64-bit uptime.
//!
//! Timestamps are compared with [`elapsed`], the signed difference in the
//! counter's native width. The result is correct across a wrap as long as
//! the true distance between the two timestamps is less than half the
//! counter range (about 24.8 days).

/// Source of raw millisecond counter readings
pub trait MillisSource {
    /// Read the counter
    fn millis(&mut self) -> u32;
}

impl<F: FnMut() -> u32> MillisSource for F {
    fn millis(&mut self) -> u32 {
        self()
    }
}

/// Millisecond source backed by the embassy time driver
#[cfg(feature = "embassy")]
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyMillis;

#[cfg(feature = "embassy")]
impl MillisSource for EmbassyMillis {
    fn millis(&mut self) -> u32 {
        // Truncation is the point: the scheduler works on the wrapping counter
        embassy_time::Instant::now().as_millis() as u32
    }
}

/// Signed distance from `earlier` to `later`, wraparound-safe
#[inline]
pub fn elapsed(later: u32, earlier: u32) -> i32 {
    later.wrapping_sub(earlier) as i32
}

/// True when `deadline` is at or before `now`
#[inline]
pub fn is_due(deadline: u32, now: u32) -> bool {
    elapsed(now, deadline) >= 0
}

/// Rollover-counting clock
#[derive(Debug)]
pub struct Clock<S> {
    source: S,
    last: i32,
    rollovers: u32,
    /// Calendar milliseconds minus uptime milliseconds
    calendar_offset: Option<i64>,
}

impl<S: MillisSource> Clock<S> {
    /// Create a clock over a counter source
    pub fn new(source: S) -> Self {
        Self {
            source,
            last: 0,
            rollovers: 0,
            calendar_offset: None,
        }
    }

    /// Read the counter, counting a rollover if it went backwards
    pub fn now(&mut self) -> u32 {
        let ms = self.source.millis();
        if (ms as i32) < self.last {
            self.rollovers = self.rollovers.wrapping_add(1);
        }
        self.last = ms as i32;
        ms
    }

    /// Number of rollovers seen so far
    pub fn rollovers(&self) -> u32 {
        self.rollovers
    }

    /// Milliseconds since boot, extended past the counter width
    pub fn uptime_ms(&mut self) -> u64 {
        let ms = self.now() as i32 as i64;
        (((self.rollovers as i64) << 32) + ms) as u64
    }

    /// Record an externally supplied calendar time (ms since the epoch)
    pub fn set_calendar(&mut self, epoch_ms: u64) {
        let uptime = self.uptime_ms() as i64;
        self.calendar_offset = Some(epoch_ms as i64 - uptime);
    }

    /// Current calendar time, once a reference has been supplied
    pub fn calendar_ms(&mut self) -> Option<u64> {
        let offset = self.calendar_offset?;
        let uptime = self.uptime_ms() as i64;
        Some((uptime + offset) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMillis;
    use proptest::prelude::*;

    #[test]
    fn test_elapsed_across_signed_rollover() {
        // 0x7ffffffe, then 4ms later just past the signed rollover
        assert_eq!(elapsed(0x8000_0002, 0x7fff_fffe), 4);
        assert_eq!(elapsed(0x7fff_fffe, 0x8000_0002), -4);
    }

    #[test]
    fn test_elapsed_across_unsigned_wrap() {
        assert_eq!(elapsed(0x0000_0002, 0xffff_fffe), 4);
        assert!(is_due(0xffff_fffe, 0x0000_0002));
        assert!(!is_due(0x0000_0002, 0xffff_fffe));
    }

    #[test]
    fn test_is_due_at_deadline() {
        assert!(is_due(100, 100));
        assert!(is_due(99, 100));
        assert!(!is_due(101, 100));
    }

    #[test]
    fn test_rollover_counting() {
        let fake = FakeMillis::new(0x7fff_fff0);
        let mut clock = Clock::new(fake.clone());

        clock.now();
        assert_eq!(clock.rollovers(), 0);

        fake.set(0x8000_0010);
        clock.now();
        assert_eq!(clock.rollovers(), 1);

        // Unsigned wrap is a signed increase (-1 -> 0), not a rollover
        fake.set(0xffff_ffff);
        clock.now();
        fake.set(0x0000_0001);
        clock.now();
        assert_eq!(clock.rollovers(), 1);
    }

    #[test]
    fn test_uptime_is_continuous_across_rollover() {
        let fake = FakeMillis::new(0x7fff_ffff);
        let mut clock = Clock::new(fake.clone());
        let before = clock.uptime_ms();

        fake.set(0x8000_0000);
        let after = clock.uptime_ms();
        assert_eq!(after - before, 1);
        assert_eq!(after, 0x8000_0000);
    }

    #[test]
    fn test_calendar_follows_uptime() {
        let fake = FakeMillis::new(1_000);
        let mut clock = Clock::new(fake.clone());
        assert_eq!(clock.calendar_ms(), None);

        clock.set_calendar(1_700_000_000_000);
        fake.advance(250);
        assert_eq!(clock.calendar_ms(), Some(1_700_000_000_250));
    }

    proptest! {
        #[test]
        fn prop_elapsed_matches_true_distance(start in any::<u32>(), delta in 0u32..0x7fff_ffff) {
            let later = start.wrapping_add(delta);
            prop_assert_eq!(elapsed(later, start), delta as i32);
            prop_assert!(is_due(start, later));
        }
    }
}
