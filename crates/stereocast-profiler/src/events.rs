//! Profiler event types and statistics.

use serde::{Deserialize, Serialize};

/// Categories for profiling events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventCategory {
    /// Full frame timing.
    #[default]
    Frame = 0,
    /// Uvw bounds maps rendered at sweep start.
    BoundsPass = 1,
    /// Occlusion hint reprojection at sweep start.
    OcclusionPass = 2,
    /// Tiles drawn for one eye in one frame.
    TileDraw = 3,
    /// A complete sweep, first tile to last.
    Sweep = 4,
    /// HMD submission and mirror output.
    Composite = 5,
    /// GPU timestamp query results.
    GpuTimer = 6,
    /// Custom event with ID.
    Custom(u32) = 255,
}

impl EventCategory {
    /// Get a display name for this category.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Frame => "Frame",
            Self::BoundsPass => "Bounds",
            Self::OcclusionPass => "Occlusion",
            Self::TileDraw => "Tiles",
            Self::Sweep => "Sweep",
            Self::Composite => "Composite",
            Self::GpuTimer => "GPU",
            Self::Custom(_) => "Custom",
        }
    }

    /// Display order.
    #[must_use]
    pub const fn order(&self) -> u64 {
        match self {
            Self::Frame => 0,
            Self::BoundsPass => 1,
            Self::OcclusionPass => 2,
            Self::TileDraw => 3,
            Self::Sweep => 4,
            Self::Composite => 5,
            Self::GpuTimer => 6,
            Self::Custom(id) => 100 + *id as u64,
        }
    }
}

/// A single timing event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEvent {
    pub category: EventCategory,
    /// Duration in nanoseconds.
    pub duration_ns: u64,
    /// Eye index the event belongs to, if any.
    pub eye: Option<u8>,
}

impl TimingEvent {
    #[must_use]
    pub const fn new(category: EventCategory, duration_ns: u64) -> Self {
        Self {
            category,
            duration_ns,
            eye: None,
        }
    }

    /// Create a timing event attributed to one eye.
    #[must_use]
    pub const fn for_eye(category: EventCategory, duration_ns: u64, eye: u8) -> Self {
        Self {
            category,
            duration_ns,
            eye: Some(eye),
        }
    }
}

/// Aggregated statistics for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: EventCategory,
    pub count: u32,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    /// Average duration in nanoseconds (computed from total/count).
    pub avg_ns: u64,
    /// 95th percentile over the recent sample window.
    pub p95_ns: u64,
}

impl Default for CategoryStats {
    fn default() -> Self {
        Self::new(EventCategory::default())
    }
}

impl CategoryStats {
    #[must_use]
    pub const fn new(category: EventCategory) -> Self {
        Self {
            category,
            count: 0,
            total_ns: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            avg_ns: 0,
            p95_ns: 0,
        }
    }

    pub fn record(&mut self, duration_ns: u64) {
        self.count += 1;
        self.total_ns += duration_ns;
        self.min_ns = self.min_ns.min(duration_ns);
        self.max_ns = self.max_ns.max(duration_ns);
        self.avg_ns = self.total_ns / u64::from(self.count);
    }

    #[must_use]
    pub fn min_ms(&self) -> f64 {
        self.min_ns as f64 / 1_000_000.0
    }

    #[must_use]
    pub fn max_ms(&self) -> f64 {
        self.max_ns as f64 / 1_000_000.0
    }

    #[must_use]
    pub fn avg_ms(&self) -> f64 {
        self.avg_ns as f64 / 1_000_000.0
    }

    #[must_use]
    pub fn p95_ms(&self) -> f64 {
        self.p95_ns as f64 / 1_000_000.0
    }
}

/// Sweep progress counters of one eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepCounters {
    pub sweeps_completed: u64,
    pub sweeps_aborted: u64,
    pub tiles_drawn: u64,
    /// Tiles left in the sweep in progress.
    pub tiles_remaining: u32,
    /// Frames the last completed sweep took.
    pub last_sweep_frames: u32,
    pub last_sweep_ms: f32,
}

/// Complete profiler snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilerSnapshot {
    pub frame_number: u64,
    pub fps: f32,
    pub frame_time_ms: f32,
    /// Per-category statistics, in display order.
    pub categories: Vec<CategoryStats>,
    /// Sweep counters indexed by eye.
    pub eyes: [SweepCounters; 2],
    /// Recent FPS values, oldest first.
    pub fps_history: Vec<f32>,
}

impl ProfilerSnapshot {
    #[must_use]
    pub fn category(&self, category: EventCategory) -> Option<&CategoryStats> {
        self.categories.iter().find(|s| s.category == category)
    }
}
