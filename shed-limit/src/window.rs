use std::time::Duration;

use quanta::Instant;

/// Number of buckets a counter divides its window into.
pub(crate) const BUCKETS: usize = 10;

/// A time-bucketed counter over a sliding window.
///
/// The window is split into [`BUCKETS`] buckets of equal width. Adds land in
/// the bucket covering the supplied timestamp; reads sum every bucket still
/// inside the window. Rotation is lazy: both [`add`](Self::add) and
/// [`get`](Self::get) advance the head past whatever buckets have expired
/// since the previous call, so the counter needs no timer and its memory stays
/// O(BUCKETS) regardless of traffic rate.
#[derive(Debug)]
pub(crate) struct WindowedCounter {
    buckets: [u64; BUCKETS],
    width: Duration,
    head: usize,
    /// Start of the bucket at `head`.
    head_start: Instant,
}

impl WindowedCounter {
    pub(crate) fn new(start: Instant, width: Duration) -> Self {
        debug_assert!(!width.is_zero());
        Self {
            buckets: [0; BUCKETS],
            width,
            head: 0,
            head_start: start,
        }
    }

    /// Attribute `n` to the bucket covering `now`.
    pub(crate) fn add(&mut self, now: Instant, n: u64) {
        self.rotate(now);
        self.buckets[self.head] += n;
    }

    /// Sum over every bucket inside the window ending at `now`.
    pub(crate) fn get(&mut self, now: Instant) -> u64 {
        self.rotate(now);
        self.buckets.iter().sum()
    }

    /// Advance the head past buckets that expired since the last call.
    ///
    /// `quanta::Instant::duration_since` saturates to zero, so a timestamp
    /// older than the current head (a stale sample taken before a lock, or a
    /// clock regression) lands in the current bucket; the head never moves
    /// backwards.
    fn rotate(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.head_start);
        let steps = elapsed.as_nanos() / self.width.as_nanos();
        if steps == 0 {
            return;
        }
        if steps >= BUCKETS as u128 {
            // Idle for longer than the whole window: forget everything and
            // re-anchor at the present.
            self.buckets = [0; BUCKETS];
            self.head = 0;
            self.head_start = now;
            return;
        }
        for _ in 0..steps {
            self.head = (self.head + 1) % BUCKETS;
            self.buckets[self.head] = 0;
        }
        self.head_start += self.width * steps as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quanta::Clock;

    #[test]
    fn sums_adds_within_the_window() {
        let (clock, mock) = Clock::mock();
        let mut counter = WindowedCounter::new(clock.now(), Duration::from_secs(1));

        counter.add(clock.now(), 3);
        mock.increment(Duration::from_secs(4));
        counter.add(clock.now(), 4);
        mock.increment(Duration::from_secs(4));

        assert_eq!(counter.get(clock.now()), 7);
    }

    #[test]
    fn expires_buckets_as_the_window_slides() {
        let (clock, mock) = Clock::mock();
        let mut counter = WindowedCounter::new(clock.now(), Duration::from_secs(1));

        counter.add(clock.now(), 5);
        mock.increment(Duration::from_secs(9));
        counter.add(clock.now(), 2);
        // The first bucket is nine widths old: still inside the window.
        assert_eq!(counter.get(clock.now()), 7);

        // One more width pushes the first bucket out but keeps the second.
        mock.increment(Duration::from_secs(1));
        assert_eq!(counter.get(clock.now()), 2);
    }

    #[test]
    fn resets_after_a_full_window_of_idleness() {
        let (clock, mock) = Clock::mock();
        let mut counter = WindowedCounter::new(clock.now(), Duration::from_secs(1));

        counter.add(clock.now(), 100);
        mock.increment(Duration::from_secs(25));

        assert_eq!(counter.get(clock.now()), 0);
        counter.add(clock.now(), 1);
        assert_eq!(counter.get(clock.now()), 1);
    }

    #[test]
    fn stale_timestamps_land_in_the_current_bucket() {
        let (clock, mock) = Clock::mock();
        let mut counter = WindowedCounter::new(clock.now(), Duration::from_secs(1));

        let stale = clock.now();
        mock.increment(Duration::from_secs(3));
        counter.add(clock.now(), 1);

        // A sample taken three widths ago must not regress the head.
        counter.add(stale, 1);
        assert_eq!(counter.get(clock.now()), 2);

        // The stale increment expires together with the current bucket.
        mock.increment(Duration::from_secs(10));
        assert_eq!(counter.get(clock.now()), 0);
    }

    #[test]
    fn sub_width_steps_stay_in_one_bucket() {
        let (clock, mock) = Clock::mock();
        let mut counter = WindowedCounter::new(clock.now(), Duration::from_secs(1));

        for _ in 0..10 {
            mock.increment(Duration::from_millis(50));
            counter.add(clock.now(), 1);
        }
        assert_eq!(counter.get(clock.now()), 10);
    }
}
