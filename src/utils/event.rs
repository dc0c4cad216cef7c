use std::collections::VecDeque;

use super::time::SampleTime;

// -------------------------------------------------------------------------------------------------

/// A sample time tagged event.
pub(crate) trait Event {
    fn sample_time(&self) -> SampleTime;
}

// -------------------------------------------------------------------------------------------------

/// Manage processing of sample time tagged events, which get applied to some `Context`.
///
/// Note: When adding events via `insert_event`, events will be sorted ascending by time, and
/// events with equal times stay in insertion order. If events are added in other ways, ensure
/// that the sorting doesn't get broken!
pub(crate) trait EventProcessor<Context> {
    /// The sample time tagged event.
    type Event: Event;

    /// Determine in how many sample frames the next event is due.
    fn time_until_next_event(&self, current_time: SampleTime) -> Option<SampleTime> {
        self.events()
            .front()
            .map(|e| e.sample_time().saturating_sub(current_time))
    }

    /// Add a new event for processing while keeping the event list sorted by ascending
    /// sample time. Events with the same time are processed in FIFO order.
    fn insert_event(&mut self, event: Self::Event) {
        let events = self.events_mut();
        let sample_time = event.sample_time();
        let insert_pos = events
            .make_contiguous()
            .partition_point(|e| e.sample_time() <= sample_time);
        events.insert(insert_pos, event);
    }

    /// Process all pending events that are due before the given time.
    fn process_events_before(&mut self, time: SampleTime, context: &mut Context) {
        while self.events().front().is_some_and(|e| e.sample_time() < time) {
            if let Some(event) = self.events_mut().pop_front() {
                self.process_event(event, context);
            }
        }
    }

    /// Access to the event deque.
    fn events(&self) -> &VecDeque<Self::Event>;
    /// Mutable access to the event deque.
    fn events_mut(&mut self) -> &mut VecDeque<Self::Event>;

    /// Process a single due event.
    fn process_event(&mut self, event: Self::Event, context: &mut Context);
}
