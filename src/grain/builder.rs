//! Synthesis of a grain's sample array from source audio.

use std::sync::Arc;

use assume::assume;

use crate::{grain::window::WindowTable, Error, GrainData, SourceAudio};

// -------------------------------------------------------------------------------------------------

/// How source reads which run past the end of the source are folded back into the source.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
#[repr(u8)]
pub enum WrapMode {
    /// Jump back to the start of the source.
    #[default]
    Wrap,
    /// Play backwards from the end of the source (ping-pong).
    Mirror,
    /// Hold the source's last sample.
    Clamp,
}

impl WrapMode {
    /// Fold the given, possibly out of range, source index into `[0, len)`.
    #[inline]
    pub fn apply(&self, index: i64, len: usize) -> usize {
        debug_assert!(len > 0, "Need a non empty source");
        let len = len as i64;
        let folded = match self {
            WrapMode::Wrap => index.rem_euclid(len),
            WrapMode::Mirror => {
                if len == 1 {
                    0
                } else {
                    let period = 2 * (len - 1);
                    let pos = index.rem_euclid(period);
                    if pos < len {
                        pos
                    } else {
                        period - pos
                    }
                }
            }
            WrapMode::Clamp => index.clamp(0, len - 1),
        };
        folded as usize
    }
}

// -------------------------------------------------------------------------------------------------

/// Source read interpolation for grains with a fractional read increment (pitched grains or
/// sources with a sample rate different from the output's).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display, strum::VariantNames,
)]
#[repr(u8)]
pub enum Interpolation {
    /// Truncate the read position to the previous source sample.
    #[default]
    None,
    /// 4-point Catmull-Rom cubic interpolation.
    Cubic,
}

// -------------------------------------------------------------------------------------------------

/// Synthesizes grain sample arrays: resamples a slice of the source, applies the window and
/// the grain's volume.
///
/// Builders are cheap to clone: the window table is shared.
#[derive(Debug, Clone)]
pub struct GrainBuilder {
    window: Arc<WindowTable>,
    wrap_mode: WrapMode,
    interpolation: Interpolation,
    max_grain_samples: usize,
}

impl GrainBuilder {
    /// Create a new builder with the given shared window and max grain length in samples.
    pub fn new(window: Arc<WindowTable>, max_grain_samples: usize) -> Self {
        Self {
            window,
            wrap_mode: WrapMode::default(),
            interpolation: Interpolation::default(),
            max_grain_samples,
        }
    }

    /// Builder function to set the wrap mode for source overruns.
    pub fn with_wrap_mode(mut self, wrap_mode: WrapMode) -> Self {
        self.wrap_mode = wrap_mode;
        self
    }

    /// Builder function to set the source read interpolation.
    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// The window table which shapes the grains.
    pub fn window(&self) -> &Arc<WindowTable> {
        &self.window
    }

    /// How reads past the source's end are folded back.
    pub fn wrap_mode(&self) -> WrapMode {
        self.wrap_mode
    }

    /// Source read interpolation.
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Max length of a grain in samples.
    pub fn max_grain_samples(&self) -> usize {
        self.max_grain_samples
    }

    /// Synthesize the given grain into `output` and return the grain's length in samples.
    ///
    /// `output` is cleared first and is left empty when the grain can't be synthesized.
    /// It won't reallocate when its capacity is at least [`Self::max_grain_samples`].
    pub fn synthesize(
        &self,
        source: &SourceAudio,
        grain: &GrainData,
        output_sample_rate: u32,
        output: &mut Vec<f32>,
    ) -> Result<usize, Error> {
        output.clear();

        if source.is_empty() {
            return Err(Error::InvalidGrainParameters(
                "Source audio is empty".to_string(),
            ));
        }
        let grain_length = grain.duration_in_samples(output_sample_rate);
        if grain_length == 0 {
            return Err(Error::InvalidGrainParameters(
                "Grain duration is too short".to_string(),
            ));
        }
        if grain_length > self.max_grain_samples {
            return Err(Error::InvalidGrainParameters(
                "Grain duration exceeds the max grain length".to_string(),
            ));
        }

        let samples = source.samples();
        let source_length = samples.len();
        let playhead = (grain.playhead_pos as f64 * source_length as f64).round();
        let increment =
            grain.pitch as f64 * source.sample_rate() as f64 / output_sample_rate as f64;

        let window = &*self.window;
        let wrap_mode = self.wrap_mode;
        let volume = grain.volume;

        match self.interpolation {
            Interpolation::None => {
                output.extend((0..grain_length).map(|index| {
                    let position = playhead + index as f64 * increment;
                    let source_index = wrap_mode.apply(position as i64, source_length);
                    assume!(unsafe: source_index < source_length);
                    samples[source_index] * window.value_for(index, grain_length) * volume
                }));
            }
            Interpolation::Cubic => {
                output.extend((0..grain_length).map(|index| {
                    let position = playhead + index as f64 * increment;
                    Self::cubic_sample(samples, position, wrap_mode)
                        * window.value_for(index, grain_length)
                        * volume
                }));
            }
        }

        Ok(grain_length)
    }

    /// Allocating version of [`Self::synthesize`].
    pub fn synthesize_to_vec(
        &self,
        source: &SourceAudio,
        grain: &GrainData,
        output_sample_rate: u32,
    ) -> Result<Vec<f32>, Error> {
        let mut output = Vec::with_capacity(grain.duration_in_samples(output_sample_rate));
        self.synthesize(source, grain, output_sample_rate, &mut output)?;
        Ok(output)
    }

    /// Read the source at a fractional position using Catmull-Rom interpolation.
    #[inline]
    fn cubic_sample(samples: &[f32], position: f64, wrap_mode: WrapMode) -> f32 {
        let len = samples.len();
        // saturates for huge read positions of extremely pitched grains
        let index = position.floor() as i64;
        let fraction = (position - position.floor()) as f32;

        let i0 = wrap_mode.apply(index.saturating_sub(1), len);
        let i1 = wrap_mode.apply(index, len);
        let i2 = wrap_mode.apply(index.saturating_add(1), len);
        let i3 = wrap_mode.apply(index.saturating_add(2), len);

        assume!(unsafe: i0 < len && i1 < len && i2 < len && i3 < len);
        let (y0, y1, y2, y3) = (samples[i0], samples[i1], samples[i2], samples[i3]);

        let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
        let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
        let c = -0.5 * y0 + 0.5 * y2;
        let d = y1;

        a * fraction * fraction * fraction + b * fraction * fraction + c * fraction + d
    }
}

// -------------------------------------------------------------------------------------------------
