//! Tile budget driven by measured tile cost.
//!
//! The scheduler budget is a tile count. [`TimeBudget`] turns a per-frame time
//! target into such a count from how long recent tiles took, never going
//! above the configured count cap and never below one tile.

use std::time::Duration;

use stereocast_core::{Error, Result};

/// Weight of the newest measurement in the smoothed per-tile cost.
const SMOOTHING: f64 = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeBudget {
    target: Duration,
    cap: u32,
    budget: u32,
    /// Smoothed cost of one tile in seconds
    tile_cost: Option<f64>,
}

impl TimeBudget {
    /// Start at the cap until the first measurement arrives.
    pub fn new(target: Duration, cap: u32) -> Result<Self> {
        if cap == 0 {
            return Err(Error::Config("tile budget cap must be at least 1".to_string()));
        }
        if target.is_zero() {
            return Err(Error::Config("frame time target must be non-zero".to_string()));
        }
        Ok(Self {
            target,
            cap,
            budget: cap,
            tile_cost: None,
        })
    }

    #[inline]
    pub const fn budget(&self) -> u32 {
        self.budget
    }

    #[inline]
    pub const fn cap(&self) -> u32 {
        self.cap
    }

    #[inline]
    pub const fn target(&self) -> Duration {
        self.target
    }

    /// Smoothed time of one tile, once measured.
    pub fn tile_cost(&self) -> Option<Duration> {
        self.tile_cost.map(Duration::from_secs_f64)
    }

    /// Feed the time `tiles` tiles took and return the new budget.
    pub fn record(&mut self, tiles: u32, elapsed: Duration) -> u32 {
        if tiles == 0 {
            return self.budget;
        }
        let sample = elapsed.as_secs_f64() / f64::from(tiles);
        let cost = match self.tile_cost {
            Some(cost) => cost + SMOOTHING * (sample - cost),
            None => sample,
        };
        self.tile_cost = Some(cost);

        self.budget = if cost <= 0.0 {
            self.cap
        } else {
            let fit = (self.target.as_secs_f64() / cost).floor();
            // Saturating float-to-int cast.
            (fit as u32).clamp(1, self.cap)
        };
        self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn starts_at_the_cap() {
        let budget = TimeBudget::new(8 * MS, 8).unwrap();
        assert_eq!(budget.budget(), 8);
        assert!(budget.tile_cost().is_none());
    }

    #[test]
    fn slow_tiles_lower_the_budget() {
        let mut budget = TimeBudget::new(8 * MS, 8).unwrap();
        assert_eq!(budget.record(8, 32 * MS), 2);
        assert_eq!(budget.tile_cost(), Some(4 * MS));
    }

    #[test]
    fn never_exceeds_the_cap() {
        let mut budget = TimeBudget::new(8 * MS, 8).unwrap();
        assert_eq!(budget.record(8, Duration::from_micros(8)), 8);
        assert_eq!(budget.record(8, Duration::ZERO), 8);
    }

    #[test]
    fn never_drops_below_one() {
        let mut budget = TimeBudget::new(8 * MS, 8).unwrap();
        assert_eq!(budget.record(1, 100 * MS), 1);
    }

    #[test]
    fn recovers_gradually() {
        let mut budget = TimeBudget::new(8 * MS, 8).unwrap();
        budget.record(2, 16 * MS);
        assert_eq!(budget.budget(), 1);
        let mut last = 1;
        for _ in 0..20 {
            let next = budget.record(4, 2 * MS);
            assert!(next >= last);
            last = next;
        }
        assert_eq!(last, 8);
    }

    #[test]
    fn idle_frames_keep_the_budget() {
        let mut budget = TimeBudget::new(8 * MS, 8).unwrap();
        budget.record(8, 32 * MS);
        assert_eq!(budget.record(0, Duration::ZERO), 2);
    }

    #[test]
    fn rejects_bad_setup() {
        assert!(TimeBudget::new(8 * MS, 0).is_err());
        assert!(TimeBudget::new(Duration::ZERO, 4).is_err());
    }
}
