//! One eye of the stereo renderer.
//!
//! At the start of each sweep the pass captures the transform snapshot, renders
//! the uvw bounds maps and reprojects the previous sweep's first hits into
//! occlusion hints. Everything the tiles of a sweep read stays fixed until the
//! last tile is drawn.

use std::time::{Duration, Instant};

use stereocast_core::{Error, Eye, Result, ViewportSize};
use tracing::{debug, warn};

use crate::bounds::UvwMap;
use crate::config::RenderConfig;
use crate::occlusion::OcclusionHintMap;
use crate::raycast::RaycastParams;
use crate::scheduler::{AdvanceReport, SweepResources, SweepStats, TileRenderer, TileScheduler};
use crate::transfer_function::TransferLut;
use crate::transform::{TransformCache, TransformInputs, TransformSnapshot};

/// Time spent in the sweep-start passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrepareTimings {
    pub bounds: Duration,
    pub occlusion: Duration,
}

/// Scheduler, cached sweep inputs and tile renderer of one eye.
pub struct EyePass<R> {
    eye: Eye,
    scheduler: TileScheduler,
    transforms: TransformCache,
    bounds: UvwMap,
    hints: OcclusionHintMap,
    renderer: R,
    /// The renderer's first-hit buffer holds a complete sweep
    first_hit_valid: bool,
}

impl<R: TileRenderer> EyePass<R> {
    pub fn new(eye: Eye, config: &RenderConfig, renderer: R) -> Result<Self> {
        config.validate()?;
        let viewport = config.eye_viewport;
        Ok(Self {
            eye,
            scheduler: TileScheduler::new(eye, &config.scheduler())?,
            transforms: TransformCache::new(config.volume_frame()),
            bounds: UvwMap::new(viewport)?,
            hints: OcclusionHintMap::new(viewport, config.occlusion_block_size)?,
            renderer,
            first_hit_valid: false,
        })
    }

    #[inline]
    pub const fn eye(&self) -> Eye {
        self.eye
    }

    #[inline]
    pub const fn scheduler(&self) -> &TileScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn scheduler_mut(&mut self) -> &mut TileScheduler {
        &mut self.scheduler
    }

    #[inline]
    pub const fn bounds(&self) -> &UvwMap {
        &self.bounds
    }

    #[inline]
    pub const fn hints(&self) -> &OcclusionHintMap {
        &self.hints
    }

    #[inline]
    pub const fn renderer(&self) -> &R {
        &self.renderer
    }

    #[inline]
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Snapshot the current or last sweep renders with.
    #[inline]
    pub const fn snapshot(&self) -> Option<&TransformSnapshot> {
        self.transforms.snapshot()
    }

    /// The render target holds a complete image of the last sweep.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished() && self.first_hit_valid
    }

    #[inline]
    pub const fn stats(&self) -> &SweepStats {
        self.scheduler.stats()
    }

    /// Start a new sweep from `inputs` if the previous one is done.
    ///
    /// Returns `None` while a sweep is still in progress.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn prepare_sweep(&mut self, inputs: &TransformInputs) -> Result<Option<PrepareTimings>> {
        if !self.scheduler.needs_sweep() {
            return Ok(None);
        }

        let start = Instant::now();
        let snapshot = *self.transforms.begin_sweep(inputs);
        self.bounds.render(&snapshot);
        let bounds = start.elapsed();

        let start = Instant::now();
        let previous = self.transforms.previous().copied();
        match (previous, self.renderer.first_hit()) {
            (Some(previous), Some(first_hit)) if self.first_hit_valid => {
                if let Err(e) = self.hints.reproject(first_hit, &previous, &snapshot) {
                    warn!("{} eye occlusion reprojection failed: {e}", self.eye);
                    self.hints.clear();
                }
            }
            _ => self.hints.clear(),
        }
        let occlusion = start.elapsed();

        self.scheduler.begin_sweep()?;
        debug!(
            "{} eye sweep {}: {} of {} pixels cover the volume, {} occlusion cells known",
            self.eye,
            self.scheduler.sweep(),
            self.bounds.coverage(),
            self.bounds.viewport().area(),
            self.hints.known_cells()
        );
        Ok(Some(PrepareTimings { bounds, occlusion }))
    }

    /// Draw this frame's share of tiles.
    ///
    /// On failure the cached snapshot and hints are dropped so the next sweep
    /// starts fresh from the next pose.
    pub fn advance(&mut self, params: &RaycastParams, lut: &TransferLut) -> Result<AdvanceReport> {
        let Some(snapshot) = self.transforms.snapshot() else {
            if self.scheduler.needs_sweep() {
                return Ok(AdvanceReport::default());
            }
            return Err(Error::InvalidState(format!(
                "{} eye sweep {} has no transform snapshot",
                self.eye,
                self.scheduler.sweep()
            )));
        };
        let resources = SweepResources {
            snapshot,
            hints: &self.hints,
            bounds: &self.bounds,
            params,
            lut,
        };

        match self.scheduler.advance(&mut self.renderer, resources) {
            Ok(report) => {
                if report.completed {
                    self.first_hit_valid = true;
                } else if report.tiles_drawn > 0 {
                    // The first-hit buffer now mixes two sweeps.
                    self.first_hit_valid = false;
                }
                Ok(report)
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Abandon the current sweep; the next one starts without history.
    pub fn restart(&mut self) {
        self.scheduler.cancel();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.transforms.discard();
        self.hints.clear();
        self.first_hit_valid = false;
    }

    /// Change the eye viewport and projection constants.
    pub fn resize(&mut self, config: &RenderConfig) -> Result<()> {
        config.validate()?;
        self.restart();
        let viewport: ViewportSize = config.eye_viewport;
        self.scheduler.resize(viewport)?;
        self.renderer.resize(viewport)?;
        self.bounds = UvwMap::new(viewport)?;
        self.hints = OcclusionHintMap::new(viewport, config.occlusion_block_size)?;
        self.transforms.set_frame(config.volume_frame());
        debug!("{} eye resized to {viewport}", self.eye);
        Ok(())
    }

    /// Change the tile size, applied from the next sweep on.
    pub fn set_chunk_size(&mut self, chunk: ViewportSize) -> Result<()> {
        if !self.scheduler.needs_sweep() {
            self.restart();
        }
        self.scheduler.set_chunk_size(chunk)
    }
}
