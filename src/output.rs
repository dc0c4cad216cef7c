//! Audio output devices which play a [`Source`], usually a [`GrainEngine`](crate::GrainEngine).

#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;

/// The enabled real-time audio output type.
#[cfg(feature = "cpal-output")]
pub type DefaultOutputDevice = cpal::CpalOutput;

/// The enabled real-time audio output sink type.
#[cfg(feature = "cpal-output")]
pub type DefaultOutputSink = <DefaultOutputDevice as OutputDevice>::Sink;

/// Available audio hosts for cpal output (platform specific).
#[cfg(feature = "cpal-output")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioHostId {
    /// System default.
    #[default]
    Default,
    #[cfg(target_os = "windows")]
    Wasapi,
    #[cfg(target_os = "linux")]
    Alsa,
    #[cfg(target_os = "macos")]
    CoreAudio,
}

use crate::{source::Source, Error};

// -------------------------------------------------------------------------------------------------

/// Controls an output device's playback.
pub trait OutputSink {
    /// Actual device's output sample buffer channel count.
    fn channel_count(&self) -> usize;
    /// Actual device's output sample rate.
    fn sample_rate(&self) -> u32;
    /// Actual device's output playhead position in **samples** (NOT frames).
    fn sample_position(&self) -> u64;

    /// Get actual output volume.
    fn volume(&self) -> f32;
    /// Set a new output volume.
    fn set_volume(&mut self, volume: f32);

    /// True while the output is running, false when it's paused or closed.
    fn is_running(&self) -> bool;

    /// Play the given source as main output source. The source's channel layout and sample
    /// rate must match the device's ones.
    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error>;
    /// Drop actual source, replacing it with silence.
    fn stop(&mut self);
    /// Pause playback without dropping the output source.
    fn pause(&mut self);
    /// Resume from paused playback.
    fn resume(&mut self);

    /// Release audio device.
    fn close(&mut self);
}

// -------------------------------------------------------------------------------------------------

/// OutputDevice implementation: provides a sink controller.
pub trait OutputDevice {
    type Sink: OutputSink;
    fn sink(&self) -> Self::Sink;
}

// -------------------------------------------------------------------------------------------------

/// Ensure a source can be played by an output with the given signal specs.
pub(crate) fn check_source_specs(
    source: &dyn Source,
    channel_count: usize,
    sample_rate: u32,
) -> Result<(), Error> {
    if source.channel_count() != channel_count || source.sample_rate() != sample_rate {
        return Err(Error::ParameterError(format!(
            "source specs ({} channels, {} Hz) don't match the output's specs ({} channels, {} Hz)",
            source.channel_count(),
            source.sample_rate(),
            channel_count,
            sample_rate
        )));
    }
    Ok(())
}
