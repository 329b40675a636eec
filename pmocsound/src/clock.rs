//! Sample-accurate timing for the pull-based live source.
//!
//! Timestamps are always derived from the sample cursor by integer scaling,
//! so no rounding error accumulates however many chunks are produced.

/// Pipeline time, in nanoseconds.
pub type ClockTime = u64;

/// Signed pipeline time difference, in nanoseconds.
pub type ClockTimeDiff = i64;

pub const SECOND: ClockTime = 1_000_000_000;
pub const USECOND: ClockTime = 1_000;

/// Default number of samples per generated chunk.
pub const DEFAULT_SAMPLES_PER_BUFFER: u64 = 1024;

/// Largest chunk a source accepts to produce, in samples per channel.
pub const MAX_SAMPLES_PER_BUFFER: u64 = 1 << 24;

/// `value × num / denom` without intermediate overflow, rounded down.
#[inline]
pub fn scale_u64(value: u64, num: u64, denom: u64) -> u64 {
    debug_assert!(denom != 0);
    let scaled = (value as u128 * num as u128) / denom as u128;
    scaled.min(u64::MAX as u128) as u64
}

/// Timing of one chunk, computed before the chunk is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Number of samples (per channel) to generate.
    pub samples: u64,
    /// Cursor position of the first sample.
    pub start_sample: u64,
    /// Presentation timestamp, offset included.
    pub timestamp: ClockTime,
    /// End time of this chunk minus end time of the previous one.
    pub duration: ClockTime,
}

impl ChunkPlan {
    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.samples
    }
}

#[derive(Debug, Clone)]
pub struct LiveSourceClock {
    sample_rate: u32,
    default_samples: u64,
    timestamp_offset: ClockTimeDiff,
    next_sample: u64,
    // Stream time at `next_sample`, offset excluded.
    next_time: ClockTime,
}

impl LiveSourceClock {
    /// # Panics
    ///
    /// If `sample_rate` is zero; the engine geometry is validated before a
    /// clock is built.
    pub fn new(sample_rate: u32, default_samples: u64, timestamp_offset: ClockTimeDiff) -> Self {
        assert!(sample_rate > 0, "sample rate must be greater than 0");
        Self {
            sample_rate,
            default_samples,
            timestamp_offset,
            next_sample: 0,
            next_time: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn default_samples(&self) -> u64 {
        self.default_samples
    }

    pub fn timestamp_offset(&self) -> ClockTimeDiff {
        self.timestamp_offset
    }

    /// Index of the next sample to be produced.
    pub fn position(&self) -> u64 {
        self.next_sample
    }

    /// Stream time of sample `index`, offset excluded.
    pub fn time_of_sample(&self, index: u64) -> ClockTime {
        scale_u64(index, SECOND, self.sample_rate as u64)
    }

    /// Plans the next chunk. Nothing is mutated until [`commit`](Self::commit).
    pub fn next_chunk(&self, requested: Option<u64>) -> ChunkPlan {
        let samples = requested.unwrap_or(self.default_samples);
        let end_time = self.time_of_sample(self.next_sample + samples);
        ChunkPlan {
            samples,
            start_sample: self.next_sample,
            timestamp: self.next_time.saturating_add_signed(self.timestamp_offset),
            duration: end_time - self.next_time,
        }
    }

    /// Advances the cursor past a chunk that was actually produced.
    pub fn commit(&mut self, plan: &ChunkPlan) {
        debug_assert_eq!(plan.start_sample, self.next_sample, "stale chunk plan");
        self.next_sample = plan.end_sample();
        self.next_time = self.time_of_sample(self.next_sample);
    }

    pub fn reset(&mut self) {
        self.next_sample = 0;
        self.next_time = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_two_chunks() {
        let mut clock = LiveSourceClock::new(48_000, DEFAULT_SAMPLES_PER_BUFFER, 0);

        let first = clock.next_chunk(None);
        assert_eq!(first.samples, 1024);
        assert_eq!(first.timestamp, 0);
        assert_eq!(first.duration, scale_u64(1024, SECOND, 48_000));
        assert_eq!(first.duration, 21_333_333);
        clock.commit(&first);

        let second = clock.next_chunk(None);
        assert_eq!(second.timestamp, first.timestamp + first.duration);
    }

    #[test]
    fn test_no_drift_over_thousand_chunks() {
        let mut clock = LiveSourceClock::new(48_000, 1024, 0);
        let mut expected_end = 0;
        for k in 0..1000u64 {
            let plan = clock.next_chunk(None);
            assert_eq!(plan.timestamp, expected_end, "chunk {k} is not contiguous");
            assert_eq!(plan.timestamp, k * 1024 * SECOND / 48_000);
            expected_end = plan.timestamp + plan.duration;
            clock.commit(&plan);
        }
        assert_eq!(clock.position(), 1_024_000);
        assert_eq!(expected_end, 1_024_000 * SECOND / 48_000);
    }

    #[test]
    fn test_planning_is_side_effect_free() {
        let clock = LiveSourceClock::new(44_100, 512, 0);
        assert_eq!(clock.next_chunk(Some(100)), clock.next_chunk(Some(100)));
        assert_eq!(clock.position(), 0);
    }

    #[test]
    fn test_requested_sizes_and_offset() {
        let mut clock = LiveSourceClock::new(44_100, 512, 5_000);
        let a = clock.next_chunk(Some(441));
        assert_eq!(a.timestamp, 5_000);
        assert_eq!(a.duration, 10_000_000);
        clock.commit(&a);

        let b = clock.next_chunk(Some(44_100 - 441));
        assert_eq!(b.timestamp, 5_000 + 10_000_000);
        assert_eq!(b.timestamp + b.duration, 5_000 + SECOND);
    }

    #[test]
    fn test_negative_offset_saturates_at_zero() {
        let mut clock = LiveSourceClock::new(1_000, 10, -15_000_000);
        let a = clock.next_chunk(None);
        assert_eq!(a.timestamp, 0);
        clock.commit(&a);
        let b = clock.next_chunk(None);
        assert_eq!(b.timestamp, 0);
        clock.commit(&b);
        let c = clock.next_chunk(None);
        assert_eq!(c.timestamp, 5_000_000);
    }

    #[test]
    fn test_reset() {
        let mut clock = LiveSourceClock::new(48_000, 1024, 0);
        let plan = clock.next_chunk(None);
        clock.commit(&plan);
        clock.reset();
        assert_eq!(clock.position(), 0);
        assert_eq!(clock.next_chunk(None).timestamp, 0);
    }
}
