//! Profiling macros and scope guards.

use std::time::Instant;

use crate::events::EventCategory;
use crate::profiler::Profiler;

/// RAII guard that records timing on drop.
pub struct ScopeGuard<'a> {
    profiler: &'a Profiler,
    category: EventCategory,
    eye: Option<u8>,
    start: Instant,
}

impl<'a> ScopeGuard<'a> {
    #[inline]
    #[must_use]
    pub fn new(profiler: &'a Profiler, category: EventCategory) -> Self {
        Self {
            profiler,
            category,
            eye: None,
            start: Instant::now(),
        }
    }

    /// Create a guard whose event is attributed to one eye.
    #[inline]
    #[must_use]
    pub fn for_eye(profiler: &'a Profiler, category: EventCategory, eye: u8) -> Self {
        Self {
            eye: Some(eye),
            ..Self::new(profiler, category)
        }
    }
}

impl Drop for ScopeGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        match self.eye {
            Some(eye) => self.profiler.record_eye_duration(self.category, eye, elapsed),
            None => self.profiler.record_duration(self.category, elapsed),
        };
    }
}

/// Create a profiling scope that measures execution time until end of scope.
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
///
/// ```ignore
/// use stereocast_profiler::{profile_scope, EventCategory};
///
/// profile_scope!(profiler, EventCategory::Composite);
/// profile_scope!(profiler, EventCategory::TileDraw, eye = 1);
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr, $category:expr) => {
        let _guard = $crate::ScopeGuard::new(&$profiler, $category);
    };
    ($profiler:expr, $category:expr, eye = $eye:expr) => {
        let _guard = $crate::ScopeGuard::for_eye(&$profiler, $category, $eye);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($profiler:expr, $category:expr) => {};
    ($profiler:expr, $category:expr, eye = $eye:expr) => {};
}

/// Record a duration directly (for when you already have the timing).
///
/// When the `profiling` feature is disabled, this macro expands to nothing.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_duration {
    ($profiler:expr, $category:expr, $duration:expr) => {
        $profiler.record_duration($category, $duration);
    };
    ($profiler:expr, $category:expr, eye = $eye:expr, $duration:expr) => {
        $profiler.record_eye_duration($category, $eye, $duration);
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_duration {
    ($profiler:expr, $category:expr, $duration:expr) => {};
    ($profiler:expr, $category:expr, eye = $eye:expr, $duration:expr) => {};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_guard_records_on_drop() {
        let mut profiler = Profiler::new();
        drop(ScopeGuard::for_eye(&profiler, EventCategory::TileDraw, 0));
        drop(ScopeGuard::new(&profiler, EventCategory::TileDraw));
        profiler.end_frame(1, 0.0, 0.0);
        let snapshot = profiler.snapshot();
        assert_eq!(snapshot.category(EventCategory::TileDraw).unwrap().count, 2);
    }
}
