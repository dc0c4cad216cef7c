//! Fixed capacity grain voice pool and the output stage which mixes all active voices.

use crate::{
    grain::voice::GrainVoice,
    utils::buffer::{clear_buffer, fill_frames},
    Error,
};

// -------------------------------------------------------------------------------------------------

/// A fixed capacity pool of reusable [`GrainVoice`]s.
///
/// All voices and their sample buffers are allocated up front. Starting, playing and
/// retiring voices never allocates.
pub struct VoicePool {
    voices: Vec<GrainVoice>,
    active_voice_indices: Vec<usize>,
}

impl VoicePool {
    /// Create a new pool with `voice_count` idle voices, each able to hold grains of up to
    /// `max_grain_samples` length.
    pub fn new(voice_count: usize, max_grain_samples: usize) -> Self {
        let voices = (0..voice_count)
            .map(|_| GrainVoice::new(max_grain_samples))
            .collect();
        let active_voice_indices = Vec::with_capacity(voice_count);
        Self {
            voices,
            active_voice_indices,
        }
    }

    /// Total number of voices in the pool.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Number of voices which currently have a grain assigned.
    pub fn active_count(&self) -> usize {
        self.active_voice_indices.len()
    }

    /// True when no voice can be claimed.
    pub fn is_exhausted(&self) -> bool {
        self.active_voice_indices.len() >= self.voices.len()
    }

    /// Access all voices, active or not.
    pub fn voices(&self) -> &[GrainVoice] {
        &self.voices
    }

    /// Claim an idle voice and initialise it with the given function. When initialisation
    /// succeeds, the voice gets mixed from now on and its index is returned.
    pub fn start_voice<F>(&mut self, initialise: F) -> Result<usize, Error>
    where
        F: FnOnce(&mut GrainVoice) -> Result<(), Error>,
    {
        let index = self
            .voices
            .iter()
            .position(|voice| voice.is_idle())
            .ok_or(Error::VoicePoolExhausted)?;
        initialise(&mut self.voices[index])?;
        self.active_voice_indices.push(index);
        Ok(index)
    }

    /// Reset all voices to idle, dropping all playing grains.
    pub fn reset(&mut self) {
        for &index in &self.active_voice_indices {
            self.voices[index].reset();
        }
        self.active_voice_indices.clear();
    }

    /// Release voices which finished playing, so they can be claimed again.
    fn retire_finished(&mut self) {
        let voices = &mut self.voices;
        self.active_voice_indices.retain(|&index| {
            let voice = &mut voices[index];
            if voice.is_playing() {
                true
            } else {
                voice.reset();
                false
            }
        });
    }
}

// -------------------------------------------------------------------------------------------------

/// The output stage: sums all active grain voices into interleaved output buffers.
///
/// Processing runs on the real-time audio thread: it never allocates, locks or blocks.
pub struct GrainMixer {
    pool: VoicePool,
    master_gain: f32,
}

impl GrainMixer {
    /// Create a new mixer which plays the voices of the given pool.
    pub fn new(pool: VoicePool) -> Self {
        Self {
            pool,
            master_gain: 1.0,
        }
    }

    /// The voice pool which gets mixed.
    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    /// Mutable access to the voice pool, e.g. to start new voices.
    pub fn pool_mut(&mut self) -> &mut VoicePool {
        &mut self.pool
    }

    /// Current linear gain applied to the summed voices.
    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Set a new linear gain which is applied to the summed voices.
    pub fn set_master_gain(&mut self, gain: f32) {
        debug_assert!(gain.is_finite() && gain >= 0.0, "Invalid master gain");
        self.master_gain = gain;
    }

    /// Mix one sample of each active voice per frame into the given interleaved `output`
    /// buffer, overwriting its content. Each frame's sum is written to all channels.
    /// Returns the number of processed frames.
    pub fn process(&mut self, output: &mut [f32], channel_count: usize) -> usize {
        let frame_count = output.len() / channel_count;
        if self.pool.active_voice_indices.is_empty() {
            clear_buffer(output);
            return frame_count;
        }

        let gain = self.master_gain;
        let VoicePool {
            voices,
            active_voice_indices,
        } = &mut self.pool;
        fill_frames(output, channel_count, || {
            let mut sum = 0.0;
            for &index in active_voice_indices.iter() {
                sum += voices[index].next_sample();
            }
            sum * gain
        });

        self.pool.retire_finished();
        frame_count
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        grain::{builder::GrainBuilder, voice::VoiceState, window::WindowTable},
        GrainData, SourceAudio,
    };

    fn start_grain(pool: &mut VoicePool, grain: GrainData, source: &SourceAudio) -> usize {
        let builder = GrainBuilder::new(Arc::new(WindowTable::hann(512)), 1024);
        pool.start_voice(|voice| voice.initialise(&builder, &grain, source, 1000, 0))
            .unwrap()
    }

    #[test]
    fn silence() {
        let mut mixer = GrainMixer::new(VoicePool::new(4, 1024));
        let mut output = vec![f32::NAN; 64];
        assert_eq!(mixer.process(&mut output, 2), 32);
        assert!(output.iter().all(|s| *s == 0.0 && s.is_sign_positive()));
    }

    #[test]
    fn exact_sum() {
        // trapezoid windows have a flat top
        let builder = GrainBuilder::new(
            Arc::new(WindowTable::new(
                crate::grain::window::GrainWindowMode::Trapezoid,
                512,
            )),
            1024,
        );
        let source = SourceAudio::new(vec![0.3; 1000], 1000).unwrap();
        let grain = GrainData::new(0.0, 100.0, 1.0, 1.0);

        let mut mixer = GrainMixer::new(VoicePool::new(4, 1024));
        for _ in 0..2 {
            mixer
                .pool_mut()
                .start_voice(|voice| voice.initialise(&builder, &grain, &source, 1000, 0))
                .unwrap();
        }
        let mut output = vec![0.0; 100];
        mixer.process(&mut output, 1);
        // frame 50 is in the trapezoid's flat sustain part
        assert_eq!(output[50], 0.3 + 0.3);
        assert!(output.iter().all(|s| *s <= 0.6 + f32::EPSILON));
    }

    #[test]
    fn retire_voices() {
        let source = SourceAudio::new(vec![1.0; 1000], 1000).unwrap();
        let mut mixer = GrainMixer::new(VoicePool::new(2, 1024));
        start_grain(
            mixer.pool_mut(),
            GrainData::new(0.0, 10.0, 1.0, 1.0),
            &source,
        );
        start_grain(
            mixer.pool_mut(),
            GrainData::new(0.0, 10.0, 1.0, 1.0).with_sample_offset(20),
            &source,
        );
        assert!(mixer.pool().is_exhausted());
        assert!(matches!(
            mixer.pool_mut().start_voice(|_| Ok(())),
            Err(Error::VoicePoolExhausted)
        ));

        // stereo: 16 frames - first grain finishes, second one is pre-rolling
        let mut output = vec![0.0; 32];
        mixer.process(&mut output, 2);
        assert_eq!(mixer.pool().active_count(), 1);
        assert!(output[..20].iter().any(|s| *s > 0.0));
        assert!(output[20..].iter().all(|s| *s == 0.0));
        for frame in output.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
        let states = mixer
            .pool()
            .voices()
            .iter()
            .map(|v| v.state())
            .collect::<Vec<_>>();
        assert_eq!(states, vec![VoiceState::Idle, VoiceState::PreRoll]);

        // finish the second one
        let mut output = vec![0.0; 64];
        mixer.process(&mut output, 2);
        assert!(output.iter().any(|s| *s > 0.0));
        assert_eq!(mixer.pool().active_count(), 0);
    }

    #[test]
    fn master_gain() {
        let source = SourceAudio::new(vec![1.0; 1000], 1000).unwrap();
        let grain = GrainData::new(0.0, 10.0, 1.0, 1.0);

        let mut mixer = GrainMixer::new(VoicePool::new(1, 1024));
        start_grain(mixer.pool_mut(), grain, &source);
        let mut full = vec![0.0; 10];
        mixer.process(&mut full, 1);

        mixer.set_master_gain(0.5);
        start_grain(mixer.pool_mut(), grain, &source);
        let mut half = vec![0.0; 10];
        mixer.process(&mut half, 1);

        for (full, half) in full.iter().zip(half.iter()) {
            assert_eq!(full * 0.5, *half);
        }

        mixer.pool_mut().reset();
        assert_eq!(mixer.pool().active_count(), 0);
    }
}
