use std::time::Duration;

use crate::{
    grain::{
        builder::{Interpolation, WrapMode},
        window::{GrainWindowMode, WindowTable},
    },
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Options to configure a [`GrainEngine`](crate::GrainEngine).
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// By default 64. Max number of concurrently playing grains.
    pub voice_count: usize,
    /// By default [`GrainWindowMode::Hann`]. Window shape applied to all grains.
    pub window_mode: GrainWindowMode,
    /// By default 512. Number of points in the precomputed window table.
    pub window_size: usize,
    /// By default [`WrapMode::Wrap`]. How grains which run past the source's end are read.
    pub wrap_mode: WrapMode,
    /// By default [`Interpolation::None`]. How fractional source positions are read.
    pub interpolation: Interpolation,
    /// By default 1 second. Longest possible grain: voice buffers are preallocated
    /// with this length, longer grains are rejected.
    pub max_grain_duration: Duration,
    /// By default 1024. Max number of grains waiting for their start time.
    pub pending_capacity: usize,
    /// By default 4096. Size of the queue which transfers control messages to the
    /// audio thread.
    pub message_queue_size: usize,
    /// By default 1.0. Linear gain applied to the mixed grains.
    pub master_gain: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voice_count: 64,
            window_mode: GrainWindowMode::Hann,
            window_size: WindowTable::DEFAULT_SIZE,
            wrap_mode: WrapMode::Wrap,
            interpolation: Interpolation::None,
            max_grain_duration: Duration::from_secs(1),
            pending_capacity: 1024,
            message_queue_size: 4096,
            master_gain: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn voice_count(mut self, voice_count: usize) -> Self {
        self.voice_count = voice_count;
        self
    }

    pub fn window_mode(mut self, window_mode: GrainWindowMode) -> Self {
        self.window_mode = window_mode;
        self
    }

    pub fn window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn wrap_mode(mut self, wrap_mode: WrapMode) -> Self {
        self.wrap_mode = wrap_mode;
        self
    }

    pub fn interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn max_grain_duration(mut self, duration: Duration) -> Self {
        self.max_grain_duration = duration;
        self
    }

    pub fn pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    pub fn message_queue_size(mut self, size: usize) -> Self {
        self.message_queue_size = size;
        self
    }

    pub fn master_gain(mut self, gain: f32) -> Self {
        self.master_gain = gain;
        self
    }

    /// Max grain length in sample frames at the given output sample rate.
    pub fn max_grain_samples(&self, sample_rate: u32) -> usize {
        (self.max_grain_duration.as_secs_f64() * sample_rate as f64).ceil() as usize
    }

    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.voice_count == 0 || self.voice_count > 4096 {
            return Err(Error::ParameterError(format!(
                "engine config 'voice_count' must be in range 1..=4096, but is '{}'",
                self.voice_count
            )));
        }
        if !(2..=65536).contains(&self.window_size) {
            return Err(Error::ParameterError(format!(
                "engine config 'window_size' must be in range 2..=65536, but is '{}'",
                self.window_size
            )));
        }
        if self.max_grain_duration.is_zero() || self.max_grain_duration > Duration::from_secs(10)
        {
            return Err(Error::ParameterError(format!(
                "engine config 'max_grain_duration' must be in range (0, 10s], but is '{:?}'",
                self.max_grain_duration
            )));
        }
        if self.pending_capacity == 0 {
            return Err(Error::ParameterError(
                "engine config 'pending_capacity' must be > 0".to_string(),
            ));
        }
        if self.message_queue_size == 0 {
            return Err(Error::ParameterError(
                "engine config 'message_queue_size' must be > 0".to_string(),
            ));
        }
        if self.master_gain < 0.0 || !self.master_gain.is_finite() {
            return Err(Error::ParameterError(format!(
                "engine config 'master_gain' value is '{}'",
                self.master_gain
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
