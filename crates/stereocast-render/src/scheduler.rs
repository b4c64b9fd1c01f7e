//! Tile scheduler: spreads one eye's raycast over several frames.
//!
//! A sweep is one full pass over every tile of the viewport. At sweep start
//! the queue is filled in scan order and the clear bits are armed; each
//! [`TileScheduler::advance`] then draws at most `budget` tiles. The scheduler
//! owns only the queue and sweep state, the render target belongs to the
//! [`TileRenderer`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use glam::Vec4;
use stereocast_core::{Error, Eye, Result, ViewportSize};
use tracing::{debug, trace, warn};

use crate::bounds::UvwMap;
use crate::occlusion::OcclusionHintMap;
use crate::raycast::RaycastParams;
use crate::tile::{Tile, TileGrid};
use crate::transfer_function::TransferLut;
use crate::transform::TransformSnapshot;

/// Default tile edge length in pixels.
pub const DEFAULT_CHUNK_SIZE: ViewportSize = ViewportSize::new(96, 96);
/// Default number of tiles drawn per frame.
pub const DEFAULT_TILE_BUDGET: u32 = 8;

bitflags! {
    /// Attachments cleared once at the start of a sweep.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClearBits: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

/// Sweep state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepState {
    /// Queue empty, last sweep complete (or none started yet)
    #[default]
    Idle,
    /// Tiles remain in the queue
    Active,
    /// A tile draw failed; the partial sweep must not be shown
    Aborted,
}

/// Everything a tile draw reads besides its rectangle.
///
/// Borrowed from the per-frame context; the snapshot and hints stay fixed
/// for the whole sweep while parameters may change between frames.
#[derive(Clone, Copy)]
pub struct SweepResources<'a> {
    pub snapshot: &'a TransformSnapshot,
    pub hints: &'a OcclusionHintMap,
    pub bounds: &'a UvwMap,
    pub params: &'a RaycastParams,
    pub lut: &'a TransferLut,
}

/// One tile draw request.
#[derive(Clone, Copy)]
pub struct TileDraw<'a> {
    pub eye: Eye,
    pub sweep: u64,
    pub tile: Tile,
    pub resources: SweepResources<'a>,
}

/// Backend that rasterizes tiles into an eye's render target.
///
/// Implementations must restrict all writes of [`Self::draw_tile`] to the
/// tile rectangle.
pub trait TileRenderer {
    /// Clear the selected attachments of the whole target.
    fn clear(&mut self, bits: ClearBits, color: Vec4) -> Result<()>;

    /// Raycast one tile.
    fn draw_tile(&mut self, draw: &TileDraw<'_>) -> Result<()>;

    /// Reallocate the target for a new viewport. Contents are lost.
    fn resize(&mut self, viewport: ViewportSize) -> Result<()>;

    /// Called once after the last tile of a sweep was drawn.
    fn finish_sweep(&mut self, _eye: Eye, _sweep: u64) -> Result<()> {
        Ok(())
    }

    /// CPU-visible first-hit buffer of the last completed sweep, if the
    /// backend keeps one.
    fn first_hit(&self) -> Option<&[f32]> {
        None
    }
}

/// Scheduler setup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub viewport: ViewportSize,
    pub chunk: ViewportSize,
    pub budget: u32,
    pub clear_bits: ClearBits,
    pub clear_color: Vec4,
}

impl SchedulerConfig {
    pub fn new(viewport: ViewportSize) -> Self {
        Self {
            viewport,
            chunk: DEFAULT_CHUNK_SIZE,
            budget: DEFAULT_TILE_BUDGET,
            clear_bits: ClearBits::COLOR | ClearBits::DEPTH,
            clear_color: Vec4::ZERO,
        }
    }
}

/// Outcome of one advance call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    pub tiles_drawn: u32,
    pub remaining: u32,
    /// The call drew the last tile of the sweep
    pub completed: bool,
}

/// Cumulative sweep counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sweeps_started: u64,
    pub sweeps_completed: u64,
    pub sweeps_aborted: u64,
    pub tiles_drawn: u64,
    /// Advance calls the last completed sweep took
    pub last_sweep_frames: u32,
    pub last_sweep_duration: Duration,
}

/// Per-eye tile queue and sweep state.
pub struct TileScheduler {
    eye: Eye,
    grid: TileGrid,
    budget: u32,
    clear_bits: ClearBits,
    clear_color: Vec4,
    queue: VecDeque<Tile>,
    state: SweepState,
    pending_clear: ClearBits,
    sweep: u64,
    sweep_frames: u32,
    sweep_started: Option<Instant>,
    stats: SweepStats,
}

impl TileScheduler {
    /// Create a scheduler. Geometry and budget errors are fatal here.
    pub fn new(eye: Eye, config: &SchedulerConfig) -> Result<Self> {
        let grid = TileGrid::new(config.viewport, config.chunk)?;
        if config.budget == 0 {
            return Err(Error::Config("tile budget must be at least 1".to_string()));
        }
        debug!(
            "{eye} eye scheduler: {} tiles of {} over {}, budget {}",
            grid.tile_count(),
            config.chunk,
            config.viewport,
            config.budget
        );
        Ok(Self {
            eye,
            grid,
            budget: config.budget,
            clear_bits: config.clear_bits,
            clear_color: config.clear_color,
            queue: VecDeque::with_capacity(grid.tile_count() as usize),
            state: SweepState::Idle,
            pending_clear: ClearBits::empty(),
            sweep: 0,
            sweep_frames: 0,
            sweep_started: None,
            stats: SweepStats::default(),
        })
    }

    #[inline]
    pub const fn eye(&self) -> Eye {
        self.eye
    }

    #[inline]
    pub const fn grid(&self) -> &TileGrid {
        &self.grid
    }

    #[inline]
    pub const fn state(&self) -> SweepState {
        self.state
    }

    /// True when no sweep is in progress and the last one was not aborted.
    /// Only then is the render target a complete image.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == SweepState::Idle
    }

    /// True when a new sweep may begin.
    #[inline]
    pub fn needs_sweep(&self) -> bool {
        self.state != SweepState::Active
    }

    /// Sequence number of the current or most recent sweep
    #[inline]
    pub const fn sweep(&self) -> u64 {
        self.sweep
    }

    #[inline]
    pub const fn budget(&self) -> u32 {
        self.budget
    }

    /// Change the per-frame tile cap. Zero pauses progress without leaving
    /// the Active state.
    pub fn set_budget(&mut self, budget: u32) {
        if budget == 0 {
            warn!("{} eye tile budget set to 0, sweeps will not progress", self.eye);
        }
        self.budget = budget;
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        self.clear_color = color;
    }

    /// Tiles left in the current sweep
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.queue.len() as u32
    }

    #[inline]
    pub const fn stats(&self) -> &SweepStats {
        &self.stats
    }

    /// Fill the queue for a new sweep and arm the configured clear bits.
    pub fn begin_sweep(&mut self) -> Result<()> {
        self.activate(self.clear_bits)
    }

    /// Fill the queue for a new sweep, clearing `bits` before the first tile.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn activate(&mut self, bits: ClearBits) -> Result<()> {
        if self.state == SweepState::Active {
            return Err(Error::InvalidState(format!(
                "{} eye sweep {} still has {} tiles queued",
                self.eye,
                self.sweep,
                self.queue.len()
            )));
        }
        self.queue.clear();
        self.queue.extend(self.grid.tiles());
        self.pending_clear = bits;
        self.state = SweepState::Active;
        self.sweep += 1;
        self.sweep_frames = 0;
        self.sweep_started = Some(Instant::now());
        self.stats.sweeps_started += 1;
        trace!("{} eye sweep {} started", self.eye, self.sweep);
        Ok(())
    }

    /// Draw up to `budget` queued tiles.
    ///
    /// A failed draw aborts the sweep: the queue is dropped, the state becomes
    /// [`SweepState::Aborted`] and [`Error::SweepAborted`] is returned.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn advance<R: TileRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        resources: SweepResources<'_>,
    ) -> Result<AdvanceReport> {
        if self.state != SweepState::Active || self.budget == 0 {
            return Ok(AdvanceReport {
                tiles_drawn: 0,
                remaining: self.remaining(),
                completed: false,
            });
        }
        self.sweep_frames += 1;

        if !self.pending_clear.is_empty() {
            let bits = self.pending_clear;
            if let Err(e) = renderer.clear(bits, self.clear_color) {
                return Err(self.abort(&e));
            }
            self.pending_clear = ClearBits::empty();
        }

        let mut drawn = 0;
        while drawn < self.budget {
            let Some(tile) = self.queue.pop_front() else {
                break;
            };
            let draw = TileDraw {
                eye: self.eye,
                sweep: self.sweep,
                tile,
                resources,
            };
            if let Err(e) = renderer.draw_tile(&draw) {
                return Err(self.abort(&e));
            }
            drawn += 1;
        }
        self.stats.tiles_drawn += u64::from(drawn);

        let completed = self.queue.is_empty();
        if completed {
            if let Err(e) = renderer.finish_sweep(self.eye, self.sweep) {
                return Err(self.abort(&e));
            }
            self.finish();
        }

        Ok(AdvanceReport {
            tiles_drawn: drawn,
            remaining: self.remaining(),
            completed,
        })
    }

    fn finish(&mut self) {
        self.state = SweepState::Idle;
        let duration = self
            .sweep_started
            .take()
            .map_or(Duration::ZERO, |start| start.elapsed());
        self.stats.sweeps_completed += 1;
        self.stats.last_sweep_frames = self.sweep_frames;
        self.stats.last_sweep_duration = duration;
        trace!(
            "{} eye sweep {} done in {} frames ({:.2} ms)",
            self.eye,
            self.sweep,
            self.sweep_frames,
            duration.as_secs_f64() * 1000.0
        );
    }

    fn abort(&mut self, cause: &Error) -> Error {
        warn!("{} eye sweep {} aborted: {cause}", self.eye, self.sweep);
        self.discard();
        Error::SweepAborted {
            eye: self.eye,
            sweep: self.sweep,
            reason: cause.to_string(),
        }
    }

    fn discard(&mut self) {
        self.queue.clear();
        self.pending_clear = ClearBits::empty();
        self.sweep_started = None;
        self.state = SweepState::Aborted;
        self.stats.sweeps_aborted += 1;
    }

    /// Abandon the current sweep without drawing the remaining tiles.
    pub fn cancel(&mut self) {
        if self.state == SweepState::Active {
            debug!(
                "{} eye sweep {} cancelled with {} tiles left",
                self.eye,
                self.sweep,
                self.queue.len()
            );
            self.discard();
        }
    }

    /// Change the viewport. Rejected while a sweep is in progress.
    pub fn resize(&mut self, viewport: ViewportSize) -> Result<()> {
        self.regrid(viewport, self.grid.chunk())
    }

    /// Change the tile size. Rejected while a sweep is in progress.
    pub fn set_chunk_size(&mut self, chunk: ViewportSize) -> Result<()> {
        self.regrid(self.grid.viewport(), chunk)
    }

    fn regrid(&mut self, viewport: ViewportSize, chunk: ViewportSize) -> Result<()> {
        if self.state == SweepState::Active {
            return Err(Error::InvalidState(format!(
                "cannot change {} eye tiling during sweep {}",
                self.eye, self.sweep
            )));
        }
        self.grid = TileGrid::new(viewport, chunk)?;
        debug!(
            "{} eye retiled: {} tiles of {chunk} over {viewport}",
            self.eye,
            self.grid.tile_count()
        );
        Ok(())
    }
}
