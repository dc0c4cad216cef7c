//! Grain parameters, windows, synthesis and playback voices.

use crate::Error;

// -------------------------------------------------------------------------------------------------

pub mod builder;
pub mod voice;
pub mod window;

// -------------------------------------------------------------------------------------------------

/// Parameters of a single grain, as created by an emitter or host for each scheduled grain.
///
/// Grain data is a plain value: once created, it's never modified. A grain's synthesized
/// content depends on its data and source only, never on when the grain gets scheduled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainData {
    /// Normalized start position in the source (0.0 = start, 1.0 = end).
    pub playhead_pos: f32,
    /// Duration of the grain in milliseconds.
    pub duration: f32,
    /// Playback rate multiplier (1.0 = original pitch, 2.0 = one octave up).
    pub pitch: f32,
    /// Linear gain applied to the grain.
    pub volume: f32,
    /// Number of output frames to wait before the grain's first sample plays.
    pub sample_offset: u32,
}

impl Default for GrainData {
    fn default() -> Self {
        Self {
            playhead_pos: 0.0,
            duration: 100.0,
            pitch: 1.0,
            volume: 1.0,
            sample_offset: 0,
        }
    }
}

impl GrainData {
    /// Create a new grain with the given position, duration, pitch and volume and no offset.
    pub fn new(playhead_pos: f32, duration: f32, pitch: f32, volume: f32) -> Self {
        Self {
            playhead_pos,
            duration,
            pitch,
            volume,
            sample_offset: 0,
        }
    }

    /// Return a copy of the grain with the given sample offset.
    pub fn with_sample_offset(self, sample_offset: u32) -> Self {
        Self {
            sample_offset,
            ..self
        }
    }

    /// Number of output frames the grain lasts at the given output sample rate.
    pub fn duration_in_samples(&self, output_sample_rate: u32) -> usize {
        let samples = (output_sample_rate as f64 / 1000.0 * self.duration as f64).round();
        if samples.is_finite() && samples > 0.0 {
            samples as usize
        } else {
            0
        }
    }

    /// Validate all parameters.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.playhead_pos.is_finite() || !(0.0..=1.0).contains(&self.playhead_pos) {
            return Err(Error::InvalidGrainParameters(format!(
                "Playhead position must be between 0.0 and 1.0, but is {}",
                self.playhead_pos
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(Error::InvalidGrainParameters(format!(
                "Grain duration must be > 0 ms, but is {}",
                self.duration
            )));
        }
        if !self.pitch.is_finite() || self.pitch <= 0.0 {
            return Err(Error::InvalidGrainParameters(format!(
                "Grain pitch must be > 0, but is {}",
                self.pitch
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(Error::InvalidGrainParameters(format!(
                "Grain volume must be >= 0, but is {}",
                self.volume
            )));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------
