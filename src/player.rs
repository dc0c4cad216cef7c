use std::time::Duration;

use crate::{
    output::OutputSink,
    utils::time::SampleTime,
    EngineConfig, EngineStatistics, Error, GrainData, GrainEmitter, GrainEngine,
    GrainEngineHandle, SourceAudio,
};

#[cfg(feature = "cpal-output")]
use crate::output::{DefaultOutputDevice, DefaultOutputSink, OutputDevice};

// -------------------------------------------------------------------------------------------------

/// Plays grains on an audio output.
///
/// Creates a [`GrainEngine`] with the output's signal specs, moves it into the output sink
/// and keeps a [`GrainEngineHandle`] to schedule grains from the calling thread.
pub struct GrainPlayer<Sink: OutputSink> {
    sink: Sink,
    handle: GrainEngineHandle,
}

#[cfg(feature = "cpal-output")]
impl GrainPlayer<DefaultOutputSink> {
    /// Open the default audio output device and start playing.
    pub fn open_default(config: EngineConfig) -> Result<Self, Error> {
        let device = DefaultOutputDevice::open()?;
        Self::new(device.sink(), config)
    }
}

impl<Sink: OutputSink> GrainPlayer<Sink> {
    /// Create a new player which plays a new engine with the given config on the given sink.
    /// The sink gets resumed: use [`stop`](Self::stop) to pause it.
    pub fn new(mut sink: Sink, config: EngineConfig) -> Result<Self, Error> {
        let engine = GrainEngine::new(sink.channel_count(), sink.sample_rate(), config)?;
        let handle = engine.handle();
        sink.play(Box::new(engine))?;
        sink.resume();
        log::info!(
            "started grain player: {} channels, {} Hz",
            sink.channel_count(),
            sink.sample_rate()
        );
        Ok(Self { sink, handle })
    }

    /// The output sink the engine plays on.
    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// The engine's control handle. Can be cloned and moved to other threads.
    pub fn handle(&self) -> &GrainEngineHandle {
        &self.handle
    }

    pub fn channel_count(&self) -> usize {
        self.sink.channel_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sink.sample_rate()
    }

    /// The engine's current sample time.
    pub fn current_time(&self) -> SampleTime {
        self.handle.current_time()
    }

    /// Output volume, applied after the engine's master gain.
    pub fn output_volume(&self) -> f32 {
        self.sink.volume()
    }

    pub fn set_output_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume)
    }

    /// Start or resume audio output.
    pub fn start(&mut self) {
        self.sink.resume()
    }

    /// Pause audio output. Playing and pending grains are kept. Use
    /// [`stop_all_grains`](Self::stop_all_grains) to drop them.
    pub fn stop(&mut self) {
        self.sink.pause()
    }

    pub fn is_running(&self) -> bool {
        self.sink.is_running()
    }

    /// Schedule a grain to start as soon as possible.
    pub fn play_grain(&self, grain: GrainData, source: &SourceAudio) -> Result<(), Error> {
        self.handle.schedule(grain, source)
    }

    /// Schedule a grain to start after the given delay.
    pub fn play_grain_in(
        &self,
        grain: GrainData,
        source: &SourceAudio,
        delay: Duration,
    ) -> Result<(), Error> {
        self.handle.schedule_in(grain, source, delay)
    }

    /// Schedule a grain to start at the given absolute sample time.
    pub fn play_grain_at(
        &self,
        grain: GrainData,
        source: &SourceAudio,
        start_time: SampleTime,
    ) -> Result<(), Error> {
        self.handle.schedule_at(grain, source, start_time)
    }

    /// Schedule the grains of the given emitter for the given time span.
    pub fn play_emitter(
        &self,
        emitter: &mut GrainEmitter,
        source: &SourceAudio,
        duration: Duration,
    ) -> usize {
        let frame_count = (duration.as_secs_f64() * self.sample_rate() as f64).round() as usize;
        self.handle.schedule_emitter(emitter, source, frame_count)
    }

    pub fn set_master_gain(&self, gain: f32) -> Result<(), Error> {
        self.handle.set_master_gain(gain)
    }

    /// Stop all playing and drop all pending grains.
    pub fn stop_all_grains(&self) -> Result<(), Error> {
        self.handle.clear_all()
    }

    /// Release unused sources and log grain drops. Should be called regularly.
    pub fn update(&self) -> EngineStatistics {
        self.handle.update()
    }

    /// Stop playback and release the output device.
    pub fn close(mut self) {
        self.sink.stop();
        self.sink.close();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{Source, SourceTime};

    #[derive(Clone)]
    struct TestSink {
        source: Arc<Mutex<Option<Box<dyn Source>>>>,
        running: bool,
        closed: bool,
        volume: f32,
    }

    impl TestSink {
        fn new() -> Self {
            Self {
                source: Arc::new(Mutex::new(None)),
                running: false,
                closed: false,
                volume: 1.0,
            }
        }

        fn render(&self, frame_count: usize) -> Vec<f32> {
            let mut output = vec![0.0; frame_count * self.channel_count()];
            if let Some(source) = self.source.lock().unwrap().as_mut() {
                let written = source.write(&mut output, &SourceTime::default());
                assert_eq!(written, output.len());
            }
            output
        }
    }

    impl OutputSink for TestSink {
        fn channel_count(&self) -> usize {
            2
        }
        fn sample_rate(&self) -> u32 {
            1000
        }
        fn sample_position(&self) -> u64 {
            0
        }
        fn volume(&self) -> f32 {
            self.volume
        }
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
        fn is_running(&self) -> bool {
            self.running
        }
        fn play(&mut self, source: Box<dyn Source>) -> Result<(), Error> {
            *self.source.lock().unwrap() = Some(source);
            Ok(())
        }
        fn stop(&mut self) {
            *self.source.lock().unwrap() = None;
        }
        fn pause(&mut self) {
            self.running = false;
        }
        fn resume(&mut self) {
            self.running = true;
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn play_grains() {
        let sink = TestSink::new();
        let mut player = GrainPlayer::new(sink.clone(), EngineConfig::default()).unwrap();
        assert!(player.is_running());
        assert_eq!(player.channel_count(), 2);

        let source = SourceAudio::new(vec![0.5; 1000], 1000).unwrap();
        player
            .play_grain(GrainData::new(0.5, 20.0, 1.0, 1.0), &source)
            .unwrap();
        player
            .play_grain_in(
                GrainData::new(0.5, 20.0, 1.0, 1.0),
                &source,
                Duration::from_millis(50),
            )
            .unwrap();
        assert!(player
            .play_grain(GrainData::new(0.5, 20.0, 0.0, 1.0), &source)
            .is_err());

        let output = sink.render(100);
        assert!(output[..40].iter().any(|s| *s > 0.0));
        assert!(output[40..100].iter().all(|s| *s == 0.0));
        assert!(output[100..140].iter().any(|s| *s > 0.0));
        assert_eq!(player.current_time(), 100);
        assert_eq!(player.update().spawned_grains, 2);

        player.stop();
        assert!(!player.is_running());
        player.start();
        player.close();
        assert!(sink.source.lock().unwrap().is_none());
    }

    #[test]
    fn play_emitter() {
        let sink = TestSink::new();
        let player = GrainPlayer::new(sink.clone(), EngineConfig::default()).unwrap();
        let source = SourceAudio::new(vec![0.5; 1000], 1000).unwrap();
        let mut emitter = GrainEmitter::with_seed(
            crate::GranularParameters {
                density: 20.0,
                size: 20.0,
                ..Default::default()
            },
            &source,
            player.sample_rate(),
            0,
        )
        .unwrap();
        assert_eq!(
            player.play_emitter(&mut emitter, &source, Duration::from_millis(500)),
            10
        );
        sink.render(1000);
        assert_eq!(player.update().spawned_grains, 10);

        player.stop_all_grains().unwrap();
        player.set_master_gain(0.5).unwrap();
    }
}
