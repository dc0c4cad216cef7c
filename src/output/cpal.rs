use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

#[cfg(feature = "assert-allocs")]
use assert_no_alloc::*;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_queue::ArrayQueue;

use crate::{
    error::Error,
    output::{check_source_specs, AudioHostId, OutputDevice, OutputSink},
    source::{Source, SourceTime},
    utils::buffer::{clear_buffer, scale_buffer},
};

// -------------------------------------------------------------------------------------------------

/// Sample rates we try to open the device with, in order of preference.
const PREFERRED_SAMPLE_RATES: [cpal::SampleRate; 2] =
    [cpal::SampleRate(48000), cpal::SampleRate(44100)];
const PREFERRED_CHANNEL_COUNT: cpal::ChannelCount = 2;
const PREFERRED_BUFFER_FRAMES: cpal::FrameCount = 512;

/// Number of sources which can be queued for or handed back from the audio callback.
const SOURCE_QUEUE_SIZE: usize = 8;

/// How often the stream thread drops sources which the callback replaced.
const RETIRED_SOURCES_INTERVAL: Duration = Duration::from_millis(100);

// -------------------------------------------------------------------------------------------------

/// Real-time audio output via the system's default audio device.
///
/// The device's stream lives in a dedicated thread. Sources get moved into the stream's
/// callback, which runs in the system's real-time audio thread. Sources which the callback
/// replaces are handed back and get dropped in the stream thread, never in the callback.
pub struct CpalOutput {
    sink: CpalSink,
}

impl CpalOutput {
    /// Open the default output device of the system's default audio host.
    pub fn open() -> Result<Self, Error> {
        Self::open_with_host(AudioHostId::Default)
    }

    /// Open the default output device of the given audio host.
    pub fn open_with_host(host_id: AudioHostId) -> Result<Self, Error> {
        let host = Self::host(host_id)?;
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::OutputDeviceError("no default output device".into()))?;
        if let Ok(name) = device.name() {
            log::info!("using audio device: {name}");
        }

        let supported = Self::output_config(&device)?;
        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (*min..=*max).contains(&PREFERRED_BUFFER_FRAMES) =>
            {
                cpal::BufferSize::Fixed(PREFERRED_BUFFER_FRAMES)
            }
            _ => cpal::BufferSize::Default,
        };
        let config = cpal::StreamConfig {
            buffer_size,
            ..supported.config()
        };

        let state = Arc::new(OutputState::new(
            config.channels as usize,
            config.sample_rate.0,
            SOURCE_QUEUE_SIZE,
        ));
        let (stream_send, stream_recv) = bounded(16);
        let (opened_send, opened_recv) = bounded(1);

        // cpal streams are not Send on all platforms: create and drive them in their own thread
        thread::Builder::new().name("grain_output".to_string()).spawn({
            let state = Arc::clone(&state);
            move || match Stream::open(&device, &config, Arc::clone(&state)) {
                Ok(stream) => {
                    let _ = opened_send.send(Ok(()));
                    stream.run(&stream_recv, &state);
                }
                Err(err) => {
                    let _ = opened_send.send(Err(err));
                }
            }
        })?;
        opened_recv
            .recv()
            .map_err(|_| Error::OutputDeviceError("output stream thread died".into()))??;

        Ok(Self {
            sink: CpalSink { state, stream_send },
        })
    }

    fn host(host_id: AudioHostId) -> Result<cpal::Host, Error> {
        let cpal_host_id = match host_id {
            AudioHostId::Default => return Ok(cpal::default_host()),
            #[cfg(target_os = "windows")]
            AudioHostId::Wasapi => cpal::HostId::Wasapi,
            #[cfg(target_os = "linux")]
            AudioHostId::Alsa => cpal::HostId::Alsa,
            #[cfg(target_os = "macos")]
            AudioHostId::CoreAudio => cpal::HostId::CoreAudio,
        };
        cpal::host_from_id(cpal_host_id).map_err(|err| Error::OutputDeviceError(Box::new(err)))
    }

    /// Pick a f32 output config: stereo at one of the preferred rates when available, else the
    /// device's default config or its first f32 config.
    fn output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig, Error> {
        let f32_configs = device
            .supported_output_configs()?
            .filter(|range| range.sample_format() == cpal::SampleFormat::F32)
            .collect::<Vec<_>>();
        for sample_rate in PREFERRED_SAMPLE_RATES {
            let stereo = f32_configs.iter().find(|range| {
                range.channels() == PREFERRED_CHANNEL_COUNT
                    && (range.min_sample_rate()..=range.max_sample_rate()).contains(&sample_rate)
            });
            if let Some(range) = stereo {
                return Ok(range.clone().with_sample_rate(sample_rate));
            }
        }
        let default = device.default_output_config()?;
        if default.sample_format() == cpal::SampleFormat::F32 {
            return Ok(default);
        }
        f32_configs
            .into_iter()
            .next()
            .map(|range| range.with_max_sample_rate())
            .ok_or_else(|| Error::OutputDeviceError("device has no f32 output config".into()))
    }
}

impl OutputDevice for CpalOutput {
    type Sink = CpalSink;

    fn sink(&self) -> Self::Sink {
        self.sink.clone()
    }
}

// -------------------------------------------------------------------------------------------------

/// State shared between [`CpalSink`]s, the stream thread and the stream's audio callback.
struct OutputState {
    channel_count: usize,
    sample_rate: u32,
    sample_position: AtomicU64,
    volume: AtomicU32,
    running: AtomicBool,
    /// New sources for the callback. `None` replaces the playing source with silence.
    pending_sources: ArrayQueue<Option<Box<dyn Source>>>,
    /// Sources the callback no longer plays, to be dropped outside of the callback.
    retired_sources: ArrayQueue<Box<dyn Source>>,
}

impl OutputState {
    fn new(channel_count: usize, sample_rate: u32, queue_size: usize) -> Self {
        Self {
            channel_count,
            sample_rate,
            sample_position: AtomicU64::new(0),
            volume: AtomicU32::new(1.0f32.to_bits()),
            running: AtomicBool::new(false),
            pending_sources: ArrayQueue::new(queue_size),
            retired_sources: ArrayQueue::new(queue_size),
        }
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    fn drop_retired_sources(&self) {
        while self.retired_sources.pop().is_some() {}
    }
}

// -------------------------------------------------------------------------------------------------

/// [`OutputSink`] of a [`CpalOutput`].
#[derive(Clone)]
pub struct CpalSink {
    state: Arc<OutputState>,
    stream_send: Sender<StreamCommand>,
}

impl CpalSink {
    fn send_to_stream(&self, command: StreamCommand) {
        if self.stream_send.send(command).is_err() {
            log::error!("output stream thread is dead");
        }
    }
}

impl OutputSink for CpalSink {
    fn channel_count(&self) -> usize {
        self.state.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }

    fn sample_position(&self) -> u64 {
        self.state.sample_position.load(Ordering::Relaxed)
    }

    fn volume(&self) -> f32 {
        self.state.volume()
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Relaxed)
    }

    fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error> {
        check_source_specs(source.as_ref(), self.channel_count(), self.sample_rate())?;
        self.state.drop_retired_sources();
        self.state
            .pending_sources
            .push(Some(source))
            .map_err(|_| Error::SendError("output source queue is full".to_string()))
    }

    fn stop(&mut self) {
        self.state.drop_retired_sources();
        if self.state.pending_sources.push(None).is_err() {
            log::warn!("output source queue is full, can't stop the playing source");
        }
    }

    fn pause(&mut self) {
        self.state.running.store(false, Ordering::Relaxed);
        self.send_to_stream(StreamCommand::Pause);
    }

    fn resume(&mut self) {
        self.state.running.store(true, Ordering::Relaxed);
        self.send_to_stream(StreamCommand::Resume);
    }

    fn close(&mut self) {
        self.state.running.store(false, Ordering::Relaxed);
        self.send_to_stream(StreamCommand::Close);
    }
}

// -------------------------------------------------------------------------------------------------

enum StreamCommand {
    Pause,
    Resume,
    Close,
}

/// A running cpal stream. Dropping it drops the callback along with its source.
struct Stream {
    stream: cpal::Stream,
}

impl Stream {
    fn open(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        state: Arc<OutputState>,
    ) -> Result<Self, Error> {
        log::info!("opening output stream: {config:?}");
        let mut callback = OutputCallback::new(state);
        let stream = device.build_output_stream(
            config,
            move |output: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback.write_samples(output);
            },
            |err| log::error!("audio output error: {err}"),
            None,
        )?;
        Ok(Self { stream })
    }

    /// Handle stream commands and drop retired sources until the stream got closed or all
    /// sinks are gone.
    fn run(self, commands: &Receiver<StreamCommand>, state: &OutputState) {
        loop {
            match commands.recv_timeout(RETIRED_SOURCES_INTERVAL) {
                Ok(StreamCommand::Pause) => {
                    log::debug!("pausing audio output stream");
                    if let Err(err) = self.stream.pause() {
                        log::error!("failed to pause output stream: {err}");
                    }
                }
                Ok(StreamCommand::Resume) => {
                    log::debug!("resuming audio output stream");
                    if let Err(err) = self.stream.play() {
                        log::error!("failed to start output stream: {err}");
                    }
                }
                Ok(StreamCommand::Close) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("closing audio output stream");
                    let _ = self.stream.pause();
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            state.drop_retired_sources();
        }
        drop(self);
        state.drop_retired_sources();
    }
}

// -------------------------------------------------------------------------------------------------

/// Device independent part of the stream callback: swaps in new sources, writes the playing
/// source with the output volume applied and hands replaced sources back.
struct OutputCallback {
    state: Arc<OutputState>,
    source: Option<Box<dyn Source>>,
}

impl OutputCallback {
    fn new(state: Arc<OutputState>) -> Self {
        Self {
            state,
            source: None,
        }
    }

    fn write_samples(&mut self, output: &mut [f32]) {
        self.swap_sources();

        let running = self.state.running.load(Ordering::Relaxed);
        let written = match self.source.as_mut() {
            Some(source) if running => {
                let sample_position = self.state.sample_position.load(Ordering::Relaxed);
                let time = SourceTime {
                    pos_in_frames: sample_position / self.state.channel_count.max(1) as u64,
                    pos_instant: Instant::now(),
                };

                #[cfg(not(feature = "assert-allocs"))]
                let written = source.write(output, &time);
                #[cfg(feature = "assert-allocs")]
                let written = assert_no_alloc(|| source.write(output, &time));

                scale_buffer(&mut output[..written], self.state.volume());
                written
            }
            _ => 0,
        };
        if running {
            self.state
                .sample_position
                .fetch_add(output.len() as u64, Ordering::Relaxed);
        }

        clear_buffer(&mut output[written..]);
    }

    /// Apply queued source changes, as long as the replaced sources can be handed back.
    fn swap_sources(&mut self) {
        while !self.state.retired_sources.is_full() {
            let Some(next) = self.state.pending_sources.pop() else {
                break;
            };
            if let Some(previous) = std::mem::replace(&mut self.source, next) {
                // the callback is the only producer, so there is room
                let pushed = self.state.retired_sources.push(previous);
                debug_assert!(pushed.is_ok(), "Retired sources queue overflow");
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(err: cpal::DefaultStreamConfigError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(err: cpal::SupportedStreamConfigsError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(err: cpal::BuildStreamError) -> Error {
        Error::OutputDeviceError(Box::new(err))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantSource(f32);

    impl Source for ConstantSource {
        fn write(&mut self, output: &mut [f32], _time: &SourceTime) -> usize {
            output.fill(self.0);
            output.len()
        }
        fn channel_count(&self) -> usize {
            2
        }
        fn sample_rate(&self) -> u32 {
            1000
        }
        fn is_exhausted(&self) -> bool {
            false
        }
    }

    fn constant(value: f32) -> Option<Box<dyn Source>> {
        Some(Box::new(ConstantSource(value)))
    }

    fn callback(queue_size: usize) -> OutputCallback {
        OutputCallback::new(Arc::new(OutputState::new(2, 1000, queue_size)))
    }

    #[test]
    fn paused_output_is_silent() {
        let mut callback = callback(4);
        let state = Arc::clone(&callback.state);
        assert!(state.pending_sources.push(constant(1.0)).is_ok());

        let mut output = vec![1.0; 64];
        callback.write_samples(&mut output);
        assert!(callback.source.is_some());
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(state.sample_position.load(Ordering::Relaxed), 0);

        state.running.store(true, Ordering::Relaxed);
        state.volume.store(0.5f32.to_bits(), Ordering::Relaxed);
        callback.write_samples(&mut output);
        assert!(output.iter().all(|s| *s == 0.5));
        assert_eq!(state.sample_position.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn replaced_sources_are_handed_back() {
        let mut callback = callback(4);
        let state = Arc::clone(&callback.state);
        state.running.store(true, Ordering::Relaxed);

        let mut output = vec![0.0; 64];
        for value in [0.25, 0.75] {
            assert!(state.pending_sources.push(constant(value)).is_ok());
            callback.write_samples(&mut output);
            assert!(output.iter().all(|s| *s == value));
        }
        assert_eq!(state.retired_sources.len(), 1);

        // stopping retires the playing source too
        assert!(state.pending_sources.push(None).is_ok());
        callback.write_samples(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert!(callback.source.is_none());
        assert_eq!(state.retired_sources.len(), 2);

        state.drop_retired_sources();
        assert!(state.retired_sources.is_empty());
    }

    #[test]
    fn full_retired_queue_keeps_source() {
        let mut callback = callback(1);
        let state = Arc::clone(&callback.state);
        state.running.store(true, Ordering::Relaxed);

        let mut output = vec![0.0; 64];
        assert!(state.pending_sources.push(constant(0.25)).is_ok());
        callback.write_samples(&mut output);
        assert!(state.pending_sources.push(constant(0.5)).is_ok());
        callback.write_samples(&mut output);
        assert_eq!(state.retired_sources.len(), 1);

        // nothing can be handed back: keep playing the current source
        assert!(state.pending_sources.push(constant(1.0)).is_ok());
        callback.write_samples(&mut output);
        assert!(output.iter().all(|s| *s == 0.5));

        state.drop_retired_sources();
        callback.write_samples(&mut output);
        assert!(output.iter().all(|s| *s == 1.0));
    }
}
