//! The real-time grain engine and its control handle.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_queue::ArrayQueue;

use crate::{
    grain::{builder::GrainBuilder, window::WindowTable},
    mixer::{GrainMixer, VoicePool},
    scheduler::{GrainEvent, GrainScheduler},
    source::{Source, SourceTime},
    utils::{
        buffer::clear_buffer,
        time::{DspClock, SampleTime},
    },
    EngineConfig, Error, GrainData, GrainEmitter, SourceAudio,
};

// -------------------------------------------------------------------------------------------------

/// Messages sent from [`GrainEngineHandle`]s to the engine in the audio thread.
pub(crate) enum EngineMessage {
    SpawnGrain(GrainEvent),
    SetMasterGain(f32),
    ClearAll,
}

// -------------------------------------------------------------------------------------------------

/// Snapshot of the engine's state, as published by the audio thread after each block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatistics {
    /// Sample time of the next block which the engine will process.
    pub current_time: SampleTime,
    /// Number of voices which currently play a grain.
    pub active_voices: usize,
    /// Number of grains waiting for their start time.
    pub pending_grains: usize,
    /// Total number of started grains.
    pub spawned_grains: u64,
    /// Total number of grains dropped because of voice or queue exhaustion.
    pub dropped_grains: u64,
    /// Total number of grains which could not be synthesized.
    pub invalid_grains: u64,
}

/// Engine state shared between the audio thread and the engine's handles.
#[derive(Default)]
struct SharedEngineState {
    current_time: AtomicU64,
    active_voices: AtomicUsize,
    pending_grains: AtomicUsize,
    spawned_grains: AtomicU64,
    dropped_grains: AtomicU64,
    invalid_grains: AtomicU64,
    // counter values which got last reported to the log
    reported_dropped_grains: AtomicU64,
    reported_invalid_grains: AtomicU64,
}

// -------------------------------------------------------------------------------------------------

/// A [`Source`] which plays scheduled grains.
///
/// The engine runs in the audio thread: each call to `write` applies pending control
/// messages, starts due grains in free voices, mixes all active voices into the output and
/// advances the engine's sample clock. Grains are scheduled via a [`GrainEngineHandle`].
pub struct GrainEngine {
    scheduler: GrainScheduler,
    mixer: GrainMixer,
    message_queue: Arc<ArrayQueue<EngineMessage>>,
    retired_sources: Arc<ArrayQueue<SourceAudio>>,
    state: Arc<SharedEngineState>,
    max_grain_samples: usize,
    channel_count: usize,
    sample_rate: u32,
}

impl GrainEngine {
    /// Create a new engine with the given output signal specs and configuration.
    pub fn new(channel_count: usize, sample_rate: u32, config: EngineConfig) -> Result<Self, Error> {
        if channel_count == 0 || sample_rate == 0 {
            return Err(Error::ParameterError(format!(
                "invalid engine output specs: {channel_count} channels, {sample_rate} Hz"
            )));
        }
        config.validate()?;

        let max_grain_samples = config.max_grain_samples(sample_rate);
        let window = Arc::new(WindowTable::new(config.window_mode, config.window_size));
        let builder = GrainBuilder::new(window, max_grain_samples)
            .with_wrap_mode(config.wrap_mode)
            .with_interpolation(config.interpolation);

        let message_queue = Arc::new(ArrayQueue::new(config.message_queue_size));
        let retired_sources = Arc::new(ArrayQueue::new(config.message_queue_size));

        let scheduler = GrainScheduler::new(sample_rate, builder, config.pending_capacity)
            .with_retired_sources_queue(Arc::clone(&retired_sources));

        let mut mixer = GrainMixer::new(VoicePool::new(config.voice_count, max_grain_samples));
        mixer.set_master_gain(config.master_gain);

        log::debug!(
            "created grain engine: {} voices, {} channels, {} Hz, max grain length {} samples",
            config.voice_count,
            channel_count,
            sample_rate,
            max_grain_samples
        );

        Ok(Self {
            scheduler,
            mixer,
            message_queue,
            retired_sources,
            state: Arc::new(SharedEngineState::default()),
            max_grain_samples,
            channel_count,
            sample_rate,
        })
    }

    /// Create a new handle to control this engine from other threads.
    pub fn handle(&self) -> GrainEngineHandle {
        GrainEngineHandle {
            message_queue: Arc::clone(&self.message_queue),
            retired_sources: Arc::clone(&self.retired_sources),
            state: Arc::clone(&self.state),
            max_grain_samples: self.max_grain_samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Current sample time of the engine's clock.
    pub fn current_time(&self) -> SampleTime {
        self.scheduler.now()
    }

    /// Process a block of interleaved output samples. Returns the number of written samples,
    /// which always is the whole output buffer.
    pub fn process(&mut self, output: &mut [f32]) -> usize {
        self.process_messages();

        let frame_count = output.len() / self.channel_count;
        let (frames, remainder) = output.split_at_mut(frame_count * self.channel_count);
        clear_buffer(remainder);

        self.scheduler
            .release_due(frame_count as u64, self.mixer.pool_mut());
        self.mixer.process(frames, self.channel_count);
        self.scheduler.tick(frame_count as u64);

        self.publish_state();
        output.len()
    }

    fn process_messages(&mut self) {
        while let Some(message) = self.message_queue.pop() {
            match message {
                EngineMessage::SpawnGrain(event) => {
                    self.scheduler.schedule(event);
                }
                EngineMessage::SetMasterGain(gain) => {
                    self.mixer.set_master_gain(gain);
                }
                EngineMessage::ClearAll => {
                    self.scheduler.clear();
                    self.mixer.pool_mut().reset();
                }
            }
        }
    }

    fn publish_state(&self) {
        let statistics = self.scheduler.statistics();
        let state = &self.state;
        state
            .current_time
            .store(self.scheduler.now(), Ordering::Relaxed);
        state
            .active_voices
            .store(self.mixer.pool().active_count(), Ordering::Relaxed);
        state
            .pending_grains
            .store(self.scheduler.pending_count(), Ordering::Relaxed);
        state
            .spawned_grains
            .store(statistics.spawned_grains, Ordering::Relaxed);
        state
            .dropped_grains
            .store(statistics.dropped_grains, Ordering::Relaxed);
        state
            .invalid_grains
            .store(statistics.invalid_grains, Ordering::Relaxed);
    }
}

impl Source for GrainEngine {
    fn write(&mut self, output: &mut [f32], _time: &SourceTime) -> usize {
        self.process(output)
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_exhausted(&self) -> bool {
        false
    }
}

// -------------------------------------------------------------------------------------------------

/// Thread-safe, cloneable handle to control a [`GrainEngine`].
///
/// Grains get validated here, on the calling thread, before they are sent to the engine.
/// Sending never blocks: when the engine's message queue is full, an error is returned.
#[derive(Clone)]
pub struct GrainEngineHandle {
    message_queue: Arc<ArrayQueue<EngineMessage>>,
    retired_sources: Arc<ArrayQueue<SourceAudio>>,
    state: Arc<SharedEngineState>,
    max_grain_samples: usize,
    sample_rate: u32,
}

impl GrainEngineHandle {
    /// The engine's output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sample time of the next block the engine will process. Grains scheduled at this
    /// time or earlier start as soon as possible.
    pub fn current_time(&self) -> SampleTime {
        self.state.current_time.load(Ordering::Relaxed)
    }

    /// Schedule a grain to start as soon as possible.
    pub fn schedule(&self, grain: GrainData, source: &SourceAudio) -> Result<(), Error> {
        self.schedule_at(grain, source, self.current_time())
    }

    /// Schedule a grain to start after the given delay, relative to the engine's current time.
    pub fn schedule_in(
        &self,
        grain: GrainData,
        source: &SourceAudio,
        delay: Duration,
    ) -> Result<(), Error> {
        let start_time = self.current_time()
            + DspClock::duration_to_sample_time(delay, self.sample_rate);
        self.schedule_at(grain, source, start_time)
    }

    /// Schedule a grain to start at the given absolute sample time.
    pub fn schedule_at(
        &self,
        grain: GrainData,
        source: &SourceAudio,
        start_time: SampleTime,
    ) -> Result<(), Error> {
        self.release_retired_sources();
        self.validate(&grain, source)?;

        let event = GrainEvent::new(grain, source.clone(), start_time);
        self.send(EngineMessage::SpawnGrain(event))
    }

    /// Run the given emitter for the next `frame_count` frames and schedule all its grains.
    /// An emitter which fell behind the engine's clock is moved to the engine's current time
    /// first. Returns the number of scheduled grains.
    pub fn schedule_emitter(
        &self,
        emitter: &mut GrainEmitter,
        source: &SourceAudio,
        frame_count: usize,
    ) -> usize {
        let now = self.current_time();
        if emitter.current_time() < now {
            emitter.set_current_time(now);
        }
        let mut scheduled = 0;
        emitter.process(frame_count, |start_time, grain| {
            match self.schedule_at(grain, source, start_time) {
                Ok(()) => scheduled += 1,
                Err(err) => log::warn!("failed to schedule emitted grain: {err}"),
            }
        });
        scheduled
    }

    /// Set a new master gain for the mixed grains.
    pub fn set_master_gain(&self, gain: f32) -> Result<(), Error> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(Error::ParameterError(format!(
                "master gain must be >= 0, but is {gain}"
            )));
        }
        self.send(EngineMessage::SetMasterGain(gain))
    }

    /// Stop all playing grains and drop all pending ones.
    pub fn clear_all(&self) -> Result<(), Error> {
        self.send(EngineMessage::ClearAll)
    }

    /// Latest state published by the engine.
    pub fn statistics(&self) -> EngineStatistics {
        let state = &self.state;
        EngineStatistics {
            current_time: state.current_time.load(Ordering::Relaxed),
            active_voices: state.active_voices.load(Ordering::Relaxed),
            pending_grains: state.pending_grains.load(Ordering::Relaxed),
            spawned_grains: state.spawned_grains.load(Ordering::Relaxed),
            dropped_grains: state.dropped_grains.load(Ordering::Relaxed),
            invalid_grains: state.invalid_grains.load(Ordering::Relaxed),
        }
    }

    /// Release sources the engine no longer uses and log grain drops which happened in the
    /// audio thread since the last update. Should be called regularly from a control thread.
    pub fn update(&self) -> EngineStatistics {
        self.release_retired_sources();

        let statistics = self.statistics();
        let state = &self.state;
        let reported_dropped = state
            .reported_dropped_grains
            .swap(statistics.dropped_grains, Ordering::Relaxed);
        if statistics.dropped_grains > reported_dropped {
            log::warn!(
                "{} grain(s) got dropped: no free voice or pending slot available",
                statistics.dropped_grains - reported_dropped
            );
        }
        let reported_invalid = state
            .reported_invalid_grains
            .swap(statistics.invalid_grains, Ordering::Relaxed);
        if statistics.invalid_grains > reported_invalid {
            log::warn!(
                "{} grain(s) could not be synthesized",
                statistics.invalid_grains - reported_invalid
            );
        }
        statistics
    }

    fn validate(&self, grain: &GrainData, source: &SourceAudio) -> Result<(), Error> {
        grain.validate()?;
        if source.is_empty() {
            return Err(Error::InvalidGrainParameters(
                "Source audio is empty".to_string(),
            ));
        }
        let grain_samples = grain.duration_in_samples(self.sample_rate);
        if grain_samples == 0 {
            return Err(Error::InvalidGrainParameters(format!(
                "Grain duration of {} ms is shorter than a sample",
                grain.duration
            )));
        }
        if grain_samples > self.max_grain_samples {
            return Err(Error::InvalidGrainParameters(format!(
                "Grain duration of {} ms exceeds the max grain duration of {} ms",
                grain.duration,
                self.max_grain_samples as f64 * 1000.0 / self.sample_rate as f64
            )));
        }
        Ok(())
    }

    fn send(&self, message: EngineMessage) -> Result<(), Error> {
        if self.message_queue.push(message).is_err() {
            log::warn!("grain engine message queue is full");
            return Err(Error::SendError(
                "grain engine message queue is full".to_string(),
            ));
        }
        Ok(())
    }

    fn release_retired_sources(&self) {
        while self.retired_sources.pop().is_some() {}
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 1000;

    fn engine(config: EngineConfig) -> GrainEngine {
        GrainEngine::new(2, SAMPLE_RATE, config).unwrap()
    }

    fn source() -> SourceAudio {
        SourceAudio::new(vec![1.0; 1000], SAMPLE_RATE).unwrap()
    }

    #[test]
    fn silence() {
        let mut engine = engine(EngineConfig::default());
        let mut output = vec![1.0; 256];
        assert_eq!(engine.write(&mut output, &SourceTime::default()), 256);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(engine.current_time(), 128);
        assert_eq!(engine.handle().current_time(), 128);
    }

    #[test]
    fn scheduled_grain() {
        let mut engine = engine(EngineConfig::default());
        let handle = engine.handle();
        let source = source();

        handle
            .schedule_at(GrainData::new(0.0, 10.0, 1.0, 1.0), &source, 20)
            .unwrap();
        let mut output = vec![0.0; 64];
        engine.process(&mut output);

        let first_sound = output.iter().position(|s| *s != 0.0).unwrap();
        // stereo frame 21: frame 20 is the window's zero edge
        assert_eq!(first_sound, 21 * 2);
        assert!(output[(30 * 2)..].iter().all(|s| *s == 0.0));

        let statistics = handle.update();
        assert_eq!(statistics.spawned_grains, 1);
        assert_eq!(statistics.active_voices, 0);
        assert_eq!(statistics.pending_grains, 0);
    }

    #[test]
    fn future_grains() {
        let mut engine = engine(EngineConfig::default());
        let handle = engine.handle();
        let source = source();
        handle
            .schedule_in(
                GrainData::new(0.0, 10.0, 1.0, 1.0),
                &source,
                Duration::from_millis(100),
            )
            .unwrap();

        let mut output = vec![0.0; 2 * 50];
        for _ in 0..2 {
            engine.process(&mut output);
            assert!(output.iter().all(|s| *s == 0.0));
            assert_eq!(handle.statistics().pending_grains, 1);
        }

        let mut output = vec![0.0; 2 * 5];
        engine.process(&mut output);
        // frame 100 is the window's zero edge
        assert_eq!(output.iter().position(|s| *s != 0.0), Some(2));
        assert_eq!(handle.statistics().active_voices, 1);
        assert_eq!(handle.statistics().pending_grains, 0);
    }

    #[test]
    fn invalid_grains() {
        let engine = engine(EngineConfig::default().max_grain_duration(Duration::from_millis(50)));
        let handle = engine.handle();
        let source = source();
        let empty = SourceAudio::new(Vec::<f32>::new(), SAMPLE_RATE).unwrap();

        assert!(handle.schedule(GrainData::new(0.0, 0.0, 1.0, 1.0), &source).is_err());
        assert!(handle.schedule(GrainData::new(0.0, 10.0, 1.0, 1.0), &empty).is_err());
        assert!(handle.schedule(GrainData::new(0.0, 100.0, 1.0, 1.0), &source).is_err());
        assert!(handle.schedule(GrainData::new(2.0, 10.0, 1.0, 1.0), &source).is_err());
        assert!(handle.schedule(GrainData::new(0.0, 50.0, 1.0, 1.0), &source).is_ok());
        assert!(handle.set_master_gain(-1.0).is_err());
    }

    #[test]
    fn extreme_pitch() {
        let mut engine = engine(EngineConfig::default().interpolation(crate::Interpolation::Cubic));
        let handle = engine.handle();
        let source = source();
        handle
            .schedule(GrainData::new(0.5, 10.0, f32::MAX, 1.0), &source)
            .unwrap();
        let mut output = vec![0.0; 2 * 64];
        engine.process(&mut output);
        assert!(output.iter().all(|s| s.is_finite()));
        let statistics = handle.update();
        assert_eq!(statistics.spawned_grains, 1);
        assert_eq!(statistics.invalid_grains, 0);
    }

    #[test]
    fn voice_exhaustion() {
        let mut engine = engine(EngineConfig::default().voice_count(2));
        let handle = engine.handle();
        let source = source();
        for _ in 0..5 {
            handle
                .schedule(GrainData::new(0.0, 10.0, 1.0, 1.0), &source)
                .unwrap();
        }
        let mut output = vec![0.0; 64];
        engine.process(&mut output);
        let statistics = handle.update();
        assert_eq!(statistics.spawned_grains, 2);
        assert_eq!(statistics.dropped_grains, 3);
        // two equal grains
        let single = {
            let mut engine = self::engine(EngineConfig::default());
            engine
                .handle()
                .schedule(GrainData::new(0.0, 10.0, 1.0, 1.0), &source)
                .unwrap();
            let mut output = vec![0.0; 64];
            engine.process(&mut output);
            output
        };
        for (double, single) in output.iter().zip(single.iter()) {
            assert_eq!(*double, single + single);
        }
    }

    #[test]
    fn message_queue_overflow() {
        let engine = engine(EngineConfig::default().message_queue_size(2));
        let handle = engine.handle();
        let source = source();
        let grain = GrainData::new(0.0, 10.0, 1.0, 1.0);
        assert!(handle.schedule(grain, &source).is_ok());
        assert!(handle.schedule(grain, &source).is_ok());
        assert!(matches!(
            handle.schedule(grain, &source),
            Err(Error::SendError(_))
        ));
    }

    #[test]
    fn clear_and_gain() {
        let mut engine = engine(EngineConfig::default());
        let handle = engine.handle();
        let source = source();
        handle
            .schedule(GrainData::new(0.0, 100.0, 1.0, 1.0), &source)
            .unwrap();
        handle
            .schedule_at(GrainData::new(0.0, 100.0, 1.0, 1.0), &source, 1000)
            .unwrap();
        let mut output = vec![0.0; 20];
        engine.process(&mut output);
        assert_eq!(handle.statistics().active_voices, 1);
        assert_eq!(handle.statistics().pending_grains, 1);

        handle.set_master_gain(0.0).unwrap();
        engine.process(&mut output);
        assert!(output.iter().all(|s| *s == 0.0));

        handle.clear_all().unwrap();
        engine.process(&mut output);
        assert_eq!(handle.statistics().active_voices, 0);
        assert_eq!(handle.statistics().pending_grains, 0);
    }

    #[test]
    fn odd_buffer_sizes() {
        let mut engine = engine(EngineConfig::default());
        let mut output = vec![1.0; 5];
        assert_eq!(engine.process(&mut output), 5);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(engine.current_time(), 2);
        assert!(GrainEngine::new(0, SAMPLE_RATE, EngineConfig::default()).is_err());
    }

    #[test]
    fn emitted_grains() {
        let mut engine = GrainEngine::new(1, 1024, EngineConfig::default()).unwrap();
        let handle = engine.handle();
        let source = SourceAudio::new(vec![1.0; 1024], 1024).unwrap();
        let parameters = crate::GranularParameters {
            density: 8.0,
            size: 10.0,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters, &source, 1024, 0).unwrap();

        // an emitter which is behind the engine catches up
        let mut output = vec![0.0; 256];
        engine.process(&mut output);
        assert_eq!(handle.schedule_emitter(&mut emitter, &source, 1024), 8);
        assert_eq!(emitter.current_time(), 256 + 1024);

        let mut output = vec![0.0; 1024];
        engine.process(&mut output);
        assert_eq!(handle.update().spawned_grains, 8);
        // each grain's first sample is the window's zero edge
        for index in 0..8 {
            assert_eq!(output[index * 128], 0.0);
            assert!(output[index * 128 + 1] > 0.0);
        }
    }

    #[test]
    fn emitted_grains_reuse_voices() {
        let config = EngineConfig::default().voice_count(16);
        let mut engine = GrainEngine::new(1, 1024, config).unwrap();
        let handle = engine.handle();
        let source = SourceAudio::new(vec![1.0; 1024], 1024).unwrap();
        let parameters = crate::GranularParameters {
            density: 128.0,
            size: 4.0,
            ..Default::default()
        };
        let mut emitter = GrainEmitter::with_seed(parameters, &source, 1024, 0).unwrap();

        // a whole second of grains ahead, far more than there are voices
        assert_eq!(handle.schedule_emitter(&mut emitter, &source, 1024), 128);

        let mut output = vec![0.0; 1024];
        for block in output.chunks_mut(64) {
            engine.process(block);
        }
        let statistics = handle.update();
        assert_eq!(statistics.spawned_grains, 128);
        assert_eq!(statistics.dropped_grains, 0);
        assert_eq!(statistics.pending_grains, 0);
        for index in 0..128 {
            assert_eq!(output[index * 8], 0.0);
            assert!(output[index * 8 + 1] > 0.0);
        }
    }

    #[test]
    fn control_thread() {
        let mut engine = engine(EngineConfig::default());
        let handle = engine.handle();
        let source = source();
        std::thread::spawn(move || {
            for index in 0..10 {
                let grain = GrainData::new(index as f32 / 10.0, 5.0, 1.0, 0.5);
                handle.schedule_at(grain, &source, index * 10).unwrap();
            }
        })
        .join()
        .unwrap();

        let mut output = vec![0.0; 2 * 200];
        engine.process(&mut output);
        assert_eq!(engine.handle().statistics().spawned_grains, 10);
        assert!(output.iter().any(|s| *s > 0.0));
    }
}
