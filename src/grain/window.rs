//! Precomputed grain window lookup tables.

use std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------

/// Grain window (amplitude envelope) shapes.
/// Ordered by smoothness: smooth → balanced → sharp → rhythmic
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::EnumString,
    strum::Display,
    strum::VariantNames,
    strum::EnumCount,
)]
#[repr(u8)]
pub enum GrainWindowMode {
    #[default]
    Hann = 0,
    Blackman = 1,
    Triangle = 2,
    Tukey = 3,
    Trapezoid = 4,
    Exponential = 5,
    RampUp = 6,
    RampDown = 7,
}

impl GrainWindowMode {
    /// True for windows which look the same when played backwards.
    pub fn is_symmetric(&self) -> bool {
        !matches!(self, GrainWindowMode::RampUp | GrainWindowMode::RampDown)
    }

    /// Evaluate the window function at the given normalized phase [0.0, 1.0].
    fn evaluate(&self, phase: f64) -> f64 {
        match self {
            // Hann: cosine-squared window, the standard for granular synthesis
            GrainWindowMode::Hann => 0.5 * (1.0 - (2.0 * PI * phase).cos()),
            // Blackman: a0=0.42, a1=0.5, a2=0.08 (standard coefficients)
            GrainWindowMode::Blackman => {
                0.42 - 0.5 * (2.0 * PI * phase).cos() + 0.08 * (4.0 * PI * phase).cos()
            }
            GrainWindowMode::Triangle => {
                if phase < 0.5 {
                    2.0 * phase
                } else {
                    2.0 * (1.0 - phase)
                }
            }
            // Tukey: tapered cosine with α = 0.5
            GrainWindowMode::Tukey => {
                let width = 0.25;
                if phase < width {
                    0.5 * (1.0 - (PI * phase / width).cos())
                } else if phase > 1.0 - width {
                    0.5 * (1.0 - (PI * (1.0 - phase) / width).cos())
                } else {
                    1.0
                }
            }
            // Trapezoid: linear ramps with ~80% flat sustain
            GrainWindowMode::Trapezoid => {
                let ramp_width = 0.1;
                if phase < ramp_width {
                    phase / ramp_width
                } else if phase > 1.0 - ramp_width {
                    (1.0 - phase) / ramp_width
                } else {
                    1.0
                }
            }
            // Exponential: Poisson window, pointed towards the center
            GrainWindowMode::Exponential => (-6.0 * (phase - 0.5).abs()).exp(),
            // Ramp Up: 90% linear rise, 10% quick cosine fade
            GrainWindowMode::RampUp => {
                if phase < 0.9 {
                    phase / 0.9
                } else {
                    0.5 * (1.0 + (PI * (phase - 0.9) / 0.1).cos())
                }
            }
            // Ramp Down: 10% quick cosine rise, 90% linear fall
            GrainWindowMode::RampDown => {
                if phase < 0.1 {
                    0.5 * (1.0 - (PI * phase / 0.1).cos())
                } else {
                    1.0 - ((phase - 0.1) / 0.9)
                }
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A precomputed, immutable grain window.
///
/// Windows are sampled over `[0, size - 1]`, so the first and last entries are the window's
/// edges. Symmetric windows are computed for the first half only and mirrored, which makes
/// `table[i] == table[size - 1 - i]` hold exactly.
///
/// A table is shared between all voices of an engine via `Arc<WindowTable>`.
#[derive(Debug, Clone)]
pub struct WindowTable {
    mode: GrainWindowMode,
    table: Box<[f32]>,
}

impl WindowTable {
    /// Default table size, used when no custom size is configured.
    pub const DEFAULT_SIZE: usize = 512;

    /// Build a symmetric Hann window with the given number of points.
    ///
    /// Point `i` is `0.5 - 0.5 * cos(2π * i / (size - 1))`. Dividing by `size - 1` instead of
    /// `size` makes the table exactly symmetric, with zeros at both ends, rather than the
    /// periodic variant which never reaches zero at its last point.
    pub fn hann(size: usize) -> Self {
        Self::new(GrainWindowMode::Hann, size)
    }

    /// Build a window of the given shape with the given number of points (at least 2).
    pub fn new(mode: GrainWindowMode, size: usize) -> Self {
        let size = size.max(2);
        let last = (size - 1) as f64;
        let mut table = vec![0.0f32; size].into_boxed_slice();
        if mode.is_symmetric() {
            for i in 0..size.div_ceil(2) {
                let value = mode.evaluate(i as f64 / last).clamp(0.0, 1.0) as f32;
                table[i] = value;
                table[size - 1 - i] = value;
            }
        } else {
            for (i, value) in table.iter_mut().enumerate() {
                *value = mode.evaluate(i as f64 / last).clamp(0.0, 1.0) as f32;
            }
        }
        Self { mode, table }
    }

    /// The window's shape.
    pub fn mode(&self) -> GrainWindowMode {
        self.mode
    }

    /// Number of points in the table.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Raw table values.
    pub fn as_slice(&self) -> &[f32] {
        &self.table
    }

    /// Map a grain local sample index in `[0, grain_length)` to a table index in
    /// `[0, self.len())`. This stretches the window to the grain's length.
    #[inline]
    pub fn index_for(&self, grain_index: usize, grain_length: usize) -> usize {
        debug_assert!(grain_length > 0, "Invalid grain length");
        let index = (grain_index as u64 * self.table.len() as u64) / grain_length.max(1) as u64;
        (index as usize).min(self.table.len() - 1)
    }

    /// Window value for the given grain local sample index.
    #[inline]
    pub fn value_for(&self, grain_index: usize, grain_length: usize) -> f32 {
        self.table[self.index_for(grain_index, grain_length)]
    }
}

impl Default for WindowTable {
    fn default() -> Self {
        Self::hann(Self::DEFAULT_SIZE)
    }
}

impl std::ops::Index<usize> for WindowTable {
    type Output = f32;

    fn index(&self, index: usize) -> &Self::Output {
        &self.table[index]
    }
}

// -------------------------------------------------------------------------------------------------
