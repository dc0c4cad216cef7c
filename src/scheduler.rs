//! Sample accurate grain spawn scheduling.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use crossbeam_queue::ArrayQueue;

use crate::{
    grain::builder::GrainBuilder,
    mixer::VoicePool,
    utils::{
        event::{Event, EventProcessor},
        time::{DspClock, SampleTime},
    },
    Error, GrainData, SourceAudio,
};

// -------------------------------------------------------------------------------------------------

/// A pending grain spawn request: a grain, the source it's cut from and the absolute sample
/// time at which its first sample should play.
#[derive(Debug, Clone)]
pub struct GrainEvent {
    pub grain: GrainData,
    pub source: SourceAudio,
    pub start_time: SampleTime,
}

impl GrainEvent {
    pub fn new(grain: GrainData, source: SourceAudio, start_time: SampleTime) -> Self {
        Self {
            grain,
            source,
            start_time,
        }
    }
}

impl Event for GrainEvent {
    fn sample_time(&self) -> SampleTime {
        self.start_time
    }
}

// -------------------------------------------------------------------------------------------------

/// Grain spawn counters of a [`GrainScheduler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatistics {
    /// Grains which got started in a voice.
    pub spawned_grains: u64,
    /// Grains which got dropped because no voice or no queue slot was free.
    pub dropped_grains: u64,
    /// Grains which got dropped because they could not be synthesized.
    pub invalid_grains: u64,
}

// -------------------------------------------------------------------------------------------------

/// Schedules grain spawn events with sample accuracy.
///
/// Keeps a [`DspClock`] and a bounded queue of pending [`GrainEvent`]s, sorted by start time.
/// Events with equal start times are released in the order they got scheduled. Grains are
/// never started early: a grain which is due within the next block gets a pre-roll which
/// delays its first sample up to its exact start time. Late grains start right away with
/// unchanged content.
pub struct GrainScheduler {
    clock: DspClock,
    builder: GrainBuilder,
    events: VecDeque<GrainEvent>,
    pending_capacity: usize,
    retired_sources: Option<Arc<ArrayQueue<SourceAudio>>>,
    statistics: SchedulerStatistics,
}

impl GrainScheduler {
    /// Create a new scheduler for the given output sample rate, which synthesizes grains
    /// with the given builder and holds up to `pending_capacity` pending events.
    pub fn new(sample_rate: u32, builder: GrainBuilder, pending_capacity: usize) -> Self {
        let clock = DspClock::new(sample_rate);
        let events = VecDeque::with_capacity(pending_capacity);
        Self {
            clock,
            builder,
            events,
            pending_capacity,
            retired_sources: None,
            statistics: SchedulerStatistics::default(),
        }
    }

    /// Hand sources of released events over to the given queue instead of dropping them, so
    /// that the last reference of a source never gets released on the audio thread.
    pub fn with_retired_sources_queue(mut self, queue: Arc<ArrayQueue<SourceAudio>>) -> Self {
        self.retired_sources = Some(queue);
        self
    }

    /// The scheduler's sample clock.
    pub fn clock(&self) -> &DspClock {
        &self.clock
    }

    /// Current sample time.
    #[inline]
    pub fn now(&self) -> SampleTime {
        self.clock.now()
    }

    /// The builder which synthesizes released grains.
    pub fn builder(&self) -> &GrainBuilder {
        &self.builder
    }

    /// Spawn counters.
    pub fn statistics(&self) -> SchedulerStatistics {
        self.statistics
    }

    /// Number of grains waiting to be released.
    pub fn pending_count(&self) -> usize {
        self.events.len()
    }

    /// Time span from now to the start of the last pending grain.
    pub fn queued_duration(&self) -> Duration {
        let queued_time = self
            .events
            .back()
            .map_or(0, |e| e.start_time.saturating_sub(self.now()));
        DspClock::sample_time_to_duration(queued_time, self.clock.sample_rate())
    }

    /// Number of frames until the next pending grain is due, if any.
    pub fn time_until_next_grain(&self) -> Option<SampleTime> {
        self.time_until_next_event(self.now())
    }

    /// Add a new grain event. When the pending queue is full, the event gets dropped and
    /// `false` is returned.
    pub fn schedule(&mut self, event: GrainEvent) -> bool {
        if self.events.len() >= self.pending_capacity {
            self.statistics.dropped_grains += 1;
            self.retire_source(event.source);
            return false;
        }
        self.insert_event(event);
        true
    }

    /// Start all grains which are due before `now + horizon` in free voices of the given
    /// pool. With a horizon of 1, only grains with a start time <= now are released.
    pub fn release_due(&mut self, horizon: u64, pool: &mut VoicePool) {
        let release_time = self.now().saturating_add(horizon.max(1));
        self.process_events_before(release_time, pool);
    }

    /// Advance the clock by the given number of processed frames.
    #[inline]
    pub fn tick(&mut self, frames: u64) {
        self.clock.advance(frames);
    }

    /// Drop all pending events.
    pub fn clear(&mut self) {
        while let Some(event) = self.events.pop_front() {
            self.retire_source(event.source);
        }
    }

    fn retire_source(&self, source: SourceAudio) {
        if let Some(queue) = &self.retired_sources {
            // when the queue is full, the source gets dropped here
            let _ = queue.push(source);
        }
    }
}

impl EventProcessor<VoicePool> for GrainScheduler {
    type Event = GrainEvent;

    fn events(&self) -> &VecDeque<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut VecDeque<Self::Event> {
        &mut self.events
    }

    fn process_event(&mut self, event: Self::Event, pool: &mut VoicePool) {
        let delay = event.start_time.saturating_sub(self.now());
        let sample_rate = self.clock.sample_rate();
        let builder = &self.builder;
        let result = pool.start_voice(|voice| {
            voice.initialise(builder, &event.grain, &event.source, sample_rate, delay)
        });
        match result {
            Ok(_) => self.statistics.spawned_grains += 1,
            Err(Error::VoicePoolExhausted) => self.statistics.dropped_grains += 1,
            Err(_) => self.statistics.invalid_grains += 1,
        }
        self.retire_source(event.source);
    }
}

// -------------------------------------------------------------------------------------------------
