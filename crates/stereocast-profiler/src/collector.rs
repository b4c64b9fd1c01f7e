//! Event collection and aggregation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::{CategoryStats, EventCategory, ProfilerSnapshot, SweepCounters, TimingEvent};
use crate::ring_buffer::{History, RingBuffer};

/// Capacity of the pending event queue.
const EVENT_BUFFER_SIZE: usize = 4096;
/// Number of recent samples to keep for percentile calculations.
const SAMPLE_HISTORY_SIZE: usize = 100;
/// Number of FPS values kept for the history graph.
pub const FPS_HISTORY_SIZE: usize = 120;

/// Collects and aggregates profiling events.
pub struct Collector {
    buffer: RingBuffer<TimingEvent, EVENT_BUFFER_SIZE>,
    stats: HashMap<EventCategory, CategoryStats>,
    samples: HashMap<EventCategory, VecDeque<u64>>,
    eyes: [SweepCounters; 2],
    fps_history: History<f32>,
    frame_number: u64,
    fps: f32,
    frame_time_ms: f32,
    dropped: AtomicU64,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: RingBuffer::new(),
            stats: HashMap::new(),
            samples: HashMap::new(),
            eyes: [SweepCounters::default(); 2],
            fps_history: History::new(FPS_HISTORY_SIZE),
            frame_number: 0,
            fps: 0.0,
            frame_time_ms: 0.0,
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue an event. Returns `false` when the queue is full and the event
    /// was dropped.
    pub fn record(&self, event: TimingEvent) -> bool {
        let queued = self.buffer.push(event);
        if !queued {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    pub fn set_sweep_counters(&mut self, eye: usize, counters: SweepCounters) {
        if let Some(slot) = self.eyes.get_mut(eye) {
            *slot = counters;
        }
    }

    pub fn set_frame_info(&mut self, frame_number: u64, fps: f32, frame_time_ms: f32) {
        self.frame_number = frame_number;
        self.fps = fps;
        self.frame_time_ms = frame_time_ms;
        self.fps_history.push(fps);
    }

    /// Events lost to a full queue since the last reset.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Process all pending events and update statistics.
    pub fn flush(&mut self) {
        for event in self.buffer.drain() {
            let stats = self
                .stats
                .entry(event.category)
                .or_insert_with(|| CategoryStats::new(event.category));
            stats.record(event.duration_ns);

            let samples = self
                .samples
                .entry(event.category)
                .or_insert_with(|| VecDeque::with_capacity(SAMPLE_HISTORY_SIZE));
            if samples.len() >= SAMPLE_HISTORY_SIZE {
                samples.pop_front();
            }
            samples.push_back(event.duration_ns);

            if samples.len() >= 10 {
                let mut sorted: Vec<u64> = samples.iter().copied().collect();
                sorted.sort_unstable();
                stats.p95_ns = sorted[(sorted.len() * 95) / 100];
            }
        }
    }

    pub fn reset(&mut self) {
        self.stats.clear();
        self.samples.clear();
        self.fps_history.clear();
        self.eyes = [SweepCounters::default(); 2];
        self.dropped.store(0, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ProfilerSnapshot {
        let mut categories: Vec<CategoryStats> = self.stats.values().copied().collect();
        categories.sort_by_key(|s| s.category.order());

        ProfilerSnapshot {
            frame_number: self.frame_number,
            fps: self.fps,
            frame_time_ms: self.frame_time_ms,
            categories,
            eyes: self.eyes,
            fps_history: self.fps_history.iter().collect(),
        }
    }

    #[must_use]
    pub fn get_stats(&self, category: EventCategory) -> Option<&CategoryStats> {
        self.stats.get(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_flush() {
        let mut collector = Collector::new();

        collector.record(TimingEvent::new(EventCategory::Frame, 16_000_000));
        collector.record(TimingEvent::new(EventCategory::Frame, 17_000_000));
        collector.record(TimingEvent::for_eye(EventCategory::TileDraw, 5_000_000, 1));
        collector.flush();

        let frame_stats = collector.get_stats(EventCategory::Frame).unwrap();
        assert_eq!(frame_stats.count, 2);
        assert_eq!(frame_stats.min_ns, 16_000_000);
        assert_eq!(frame_stats.max_ns, 17_000_000);
        assert_eq!(frame_stats.avg_ns, 16_500_000);

        assert_eq!(collector.get_stats(EventCategory::TileDraw).unwrap().count, 1);
    }

    #[test]
    fn p95_uses_recent_samples() {
        let mut collector = Collector::new();
        for i in 1..=100 {
            collector.record(TimingEvent::new(EventCategory::Sweep, i));
        }
        collector.flush();
        assert_eq!(collector.get_stats(EventCategory::Sweep).unwrap().p95_ns, 96);
    }

    #[test]
    fn snapshot_is_in_display_order() {
        let mut collector = Collector::new();
        collector.record(TimingEvent::new(EventCategory::Custom(3), 1));
        collector.record(TimingEvent::new(EventCategory::Composite, 1));
        collector.record(TimingEvent::new(EventCategory::Frame, 1));
        collector.record(TimingEvent::new(EventCategory::BoundsPass, 1));
        collector.flush();

        let order: Vec<_> = collector
            .snapshot()
            .categories
            .iter()
            .map(|s| s.category)
            .collect();
        assert_eq!(
            order,
            vec![
                EventCategory::Frame,
                EventCategory::BoundsPass,
                EventCategory::Composite,
                EventCategory::Custom(3)
            ]
        );
    }

    #[test]
    fn fps_history_is_bounded() {
        let mut collector = Collector::new();
        for frame in 0..200 {
            collector.set_frame_info(frame, frame as f32, 1.0);
        }
        let snapshot = collector.snapshot();
        assert_eq!(snapshot.fps_history.len(), FPS_HISTORY_SIZE);
        assert_eq!(snapshot.fps_history[0], 80.0);
        assert_eq!(snapshot.frame_number, 199);
    }

    #[test]
    fn reset_clears_stats() {
        let mut collector = Collector::new();
        collector.record(TimingEvent::new(EventCategory::Frame, 16_000_000));
        collector.set_sweep_counters(
            0,
            SweepCounters {
                tiles_drawn: 5,
                ..SweepCounters::default()
            },
        );
        collector.flush();
        assert!(collector.get_stats(EventCategory::Frame).is_some());

        collector.reset();
        assert!(collector.get_stats(EventCategory::Frame).is_none());
        assert_eq!(collector.snapshot().eyes[0].tiles_drawn, 0);
    }
}
