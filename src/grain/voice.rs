//! Playback state of a single grain.

use crate::{grain::builder::GrainBuilder, Error, GrainData, SourceAudio};

// -------------------------------------------------------------------------------------------------

/// Playback state of a [`GrainVoice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum VoiceState {
    /// No grain assigned. The voice is free for reuse.
    Idle,
    /// A grain got assigned, but its first sample is not yet due: emits silence.
    PreRoll,
    /// Emitting the grain's samples.
    Playing,
    /// The grain played through: emits silence until the voice gets reset.
    Finished,
}

// -------------------------------------------------------------------------------------------------

/// A single in-flight grain: owns the grain's synthesized samples and its playback cursor.
///
/// Voices are created once with a sample buffer which can hold the longest possible grain,
/// so (re)initialising a voice never allocates.
#[derive(Debug, Clone)]
pub struct GrainVoice {
    samples: Vec<f32>,
    cursor: i64,
    state: VoiceState,
}

impl GrainVoice {
    /// Create a new idle voice which can play grains of up to `max_grain_samples` length.
    pub fn new(max_grain_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_grain_samples),
            cursor: 0,
            state: VoiceState::Idle,
        }
    }

    /// Current playback state.
    #[inline]
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// True while a grain is assigned which has not yet finished playing.
    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self.state, VoiceState::PreRoll | VoiceState::Playing)
    }

    /// True when the voice can be claimed for a new grain.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.state == VoiceState::Idle
    }

    /// Length of the assigned grain in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no grain samples are assigned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Current playback cursor. Negative values are pre-roll frames.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// The assigned grain's synthesized samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Synthesize the given grain and start playing it after `grain.sample_offset + delay`
    /// frames of silence.
    ///
    /// When the grain can't be synthesized the voice goes idle and the error is returned.
    pub fn initialise(
        &mut self,
        builder: &GrainBuilder,
        grain: &GrainData,
        source: &SourceAudio,
        output_sample_rate: u32,
        delay: u64,
    ) -> Result<(), Error> {
        if let Err(err) = builder.synthesize(source, grain, output_sample_rate, &mut self.samples)
        {
            self.reset();
            return Err(err);
        }
        self.cursor = -(grain.sample_offset as i64 + delay as i64);
        self.state = if self.cursor < 0 {
            VoiceState::PreRoll
        } else {
            VoiceState::Playing
        };
        Ok(())
    }

    /// Emit the next sample and advance the cursor by one frame.
    #[inline]
    pub fn next_sample(&mut self) -> f32 {
        let sample = match self.state {
            VoiceState::Idle => return 0.0,
            VoiceState::Finished => 0.0,
            VoiceState::PreRoll => {
                if self.cursor == -1 {
                    self.state = VoiceState::Playing;
                }
                0.0
            }
            VoiceState::Playing => self.samples[self.cursor as usize],
        };
        self.cursor += 1;
        if self.state == VoiceState::Playing && self.cursor >= self.samples.len() as i64 {
            self.state = VoiceState::Finished;
        }
        sample
    }

    /// Release the assigned grain. Keeps the voice's sample buffer allocation.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.cursor = 0;
        self.state = VoiceState::Idle;
    }
}

// -------------------------------------------------------------------------------------------------
