use std::time::Instant;

#[cfg(feature = "wav-output")]
pub(crate) mod empty;

// -------------------------------------------------------------------------------------------------

/// Timing info for [`Source`] impls.
#[derive(Clone, Copy, Debug)]
pub struct SourceTime {
    /// Output stream's current playback position in sample frames.
    pub pos_in_frames: u64,
    /// Wall clock time that corresponds to the stream's playback position.
    pub pos_instant: Instant,
}

impl Default for SourceTime {
    fn default() -> Self {
        Self {
            pos_in_frames: 0,
            pos_instant: Instant::now(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Something that produces interleaved `f32` audio samples for an output device.
/// `Send`able across threads, so it can be moved into the audio thread.
pub trait Source: Send + 'static {
    /// Write at most `output.len()` samples into the interleaved `output` and return the
    /// number of written samples. Should always write whole frames and must _never_ block.
    fn write(&mut self, output: &mut [f32], time: &SourceTime) -> usize;

    /// The source's output channel layout.
    fn channel_count(&self) -> usize;
    /// The source's output sample rate.
    fn sample_rate(&self) -> u32;
    /// True when the source no longer produces any output.
    fn is_exhausted(&self) -> bool;
}
