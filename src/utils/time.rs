use std::time::Duration;

// -------------------------------------------------------------------------------------------------

/// Absolute time in sample frames.
pub type SampleTime = u64;

// -------------------------------------------------------------------------------------------------

/// A sample accurate clock which counts output frames at a fixed sample rate.
///
/// The clock only moves when it gets advanced by the processed frame count, so it's
/// independent from wall-clock time and from any host's update cycle.
#[derive(Debug, Clone)]
pub struct DspClock {
    sample_rate: u32,
    current_time: SampleTime,
}

impl DspClock {
    /// Create a new clock with the given sample rate, starting at sample time 0.
    pub fn new(sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "Invalid sample rate");
        Self {
            sample_rate,
            current_time: 0,
        }
    }

    /// Convert a duration to sample frames with the given sample rate.
    pub fn duration_to_sample_time(duration: Duration, sample_rate: u32) -> SampleTime {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        (duration.as_secs_f64() * sample_rate as f64).round() as SampleTime
    }

    /// Convert sample frames to a duration with the given sample rate.
    pub fn sample_time_to_duration(sample_time: SampleTime, sample_rate: u32) -> Duration {
        debug_assert!(sample_rate > 0, "Invalid sample rate");
        Duration::from_secs_f64(sample_time as f64 / sample_rate as f64)
    }

    /// The clock's sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current time in sample frames.
    #[inline]
    pub fn now(&self) -> SampleTime {
        self.current_time
    }

    /// Current time as duration since the clock's start.
    pub fn now_duration(&self) -> Duration {
        Self::sample_time_to_duration(self.current_time, self.sample_rate)
    }

    /// Move the clock forward by the given number of processed frames.
    #[inline]
    pub fn advance(&mut self, frames: u64) {
        self.current_time = self.current_time.saturating_add(frames);
    }

    /// Reset the clock to start counting from the given sample time.
    pub fn reset(&mut self, current_time: SampleTime) {
        self.current_time = current_time;
    }
}

// -------------------------------------------------------------------------------------------------
