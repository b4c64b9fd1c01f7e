//! Frame and sweep profiling for Stereocast.
//!
//! The [`Profiler`] is an ordinary value owned by the render loop. Passes
//! report their durations as timing events, eyes report their sweep
//! counters, and [`Profiler::end_frame`] folds everything into per-category
//! statistics with a p95 estimate and a 120-frame FPS history.
//!
//! # Feature Flags
//!
//! - `profiling`: Enable the profiling macros. When disabled, the macros
//!   expand to no-ops for zero overhead; the [`Profiler`] API stays usable.
//!
//! # Usage
//!
//! ```ignore
//! use stereocast_profiler::{profile_scope, EventCategory, Profiler};
//!
//! let mut profiler = Profiler::new();
//! {
//!     profile_scope!(profiler, EventCategory::Frame);
//!     // ... render both eyes
//! }
//! profiler.end_frame(frame_number, fps, frame_time_ms);
//! ```

mod collector;
mod events;
mod macros;
mod profiler;
mod ring_buffer;

pub use collector::FPS_HISTORY_SIZE;
pub use events::{CategoryStats, EventCategory, ProfilerSnapshot, SweepCounters, TimingEvent};
pub use macros::ScopeGuard;
pub use profiler::Profiler;
pub use ring_buffer::{History, RingBuffer};
