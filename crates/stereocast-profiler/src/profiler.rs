//! Owned profiler handle.

use std::time::Duration;

use tracing::warn;

use crate::collector::Collector;
use crate::events::{EventCategory, ProfilerSnapshot, SweepCounters, TimingEvent};
use crate::macros::ScopeGuard;

/// Profiler owned by the render loop.
///
/// Events are queued from `&self` so scope guards can be held while other
/// code runs; [`Profiler::end_frame`] folds them into the statistics. The
/// profiler can move to another thread but not be shared between threads.
#[derive(Default)]
pub struct Profiler {
    collector: Collector,
    reported_dropped: u64,
}

impl Profiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a timing event. Dropped when the queue is full.
    #[inline]
    pub fn record(&self, event: TimingEvent) -> bool {
        self.collector.record(event)
    }

    /// Record a duration for a category.
    #[inline]
    pub fn record_duration(&self, category: EventCategory, duration: Duration) -> bool {
        self.record(TimingEvent::new(category, saturating_nanos(duration)))
    }

    /// Record a duration attributed to one eye.
    #[inline]
    pub fn record_eye_duration(&self, category: EventCategory, eye: u8, duration: Duration) -> bool {
        self.record(TimingEvent::for_eye(category, saturating_nanos(duration), eye))
    }

    /// Time the rest of the enclosing scope.
    #[inline]
    #[must_use]
    pub fn scope(&self, category: EventCategory) -> ScopeGuard<'_> {
        ScopeGuard::new(self, category)
    }

    /// Publish an eye's sweep counters for the next snapshot.
    pub fn report_sweep(&mut self, eye: u8, counters: SweepCounters) {
        self.collector.set_sweep_counters(usize::from(eye), counters);
    }

    /// Mark the end of a frame and fold queued events into the statistics.
    pub fn end_frame(&mut self, frame_number: u64, fps: f32, frame_time_ms: f32) {
        self.collector.set_frame_info(frame_number, fps, frame_time_ms);
        self.collector.flush();

        let dropped = self.collector.dropped();
        if dropped > self.reported_dropped {
            warn!(
                "Profiler event queue overflowed, {} events dropped",
                dropped - self.reported_dropped
            );
            self.reported_dropped = dropped;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProfilerSnapshot {
        self.collector.snapshot()
    }

    pub fn reset(&mut self) {
        self.collector.reset();
        self.reported_dropped = 0;
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
