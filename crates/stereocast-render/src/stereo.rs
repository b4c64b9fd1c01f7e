//! Stereo frame orchestration.

use std::time::{Duration, Instant};

use glam::Mat4;
use stereocast_core::{Error, Eye, Result, ViewportSize};
use tracing::{info, warn};

use crate::camera::EyePose;
use crate::config::RenderConfig;
use crate::eye::{EyePass, PrepareTimings};
use crate::raycast::RaycastParams;
use crate::scheduler::{AdvanceReport, TileRenderer};
use crate::transfer_function::TransferLut;

/// Context for the frame being rendered.
///
/// Owned by the render loop and passed down explicitly; nothing in the
/// renderer keeps per-frame state of its own.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    /// Current frame number.
    pub frame_number: u64,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Model matrix of the volume.
    pub model: Mat4,
    /// Eye poses, indexed by [`Eye::index`].
    pub eyes: [EyePose; 2],
    /// Raycast parameters; every tile drawn this frame uses these values.
    pub params: RaycastParams,
}

/// What happened to one eye during a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EyeFrameReport {
    /// Set when a sweep started this frame
    pub prepared: Option<PrepareTimings>,
    pub advance: AdvanceReport,
    pub tile_time: Duration,
    /// The sweep was aborted by a failed tile
    pub aborted: bool,
}

/// Result of [`StereoRenderer::render_frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub frame_number: u64,
    pub eyes: [EyeFrameReport; 2],
}

impl FrameReport {
    #[inline]
    pub const fn eye(&self, eye: Eye) -> &EyeFrameReport {
        &self.eyes[eye.index()]
    }

    /// Tiles drawn for both eyes.
    pub fn tiles_drawn(&self) -> u32 {
        self.eyes.iter().map(|e| e.advance.tiles_drawn).sum()
    }
}

/// Two independent eye passes sharing configuration and transfer function.
pub struct StereoRenderer<R> {
    config: RenderConfig,
    eyes: [EyePass<R>; 2],
    lut: TransferLut,
}

impl<R: TileRenderer> StereoRenderer<R> {
    pub fn new(config: RenderConfig, lut: TransferLut, left: R, right: R) -> Result<Self> {
        config.validate()?;
        let eyes = [
            EyePass::new(Eye::Left, &config, left)?,
            EyePass::new(Eye::Right, &config, right)?,
        ];
        info!(
            "Stereo renderer: {} per eye, {} tiles of {} each, budget {}",
            config.eye_viewport,
            eyes[0].scheduler().grid().tile_count(),
            config.chunk,
            config.budget
        );
        Ok(Self { config, eyes, lut })
    }

    #[inline]
    pub const fn config(&self) -> &RenderConfig {
        &self.config
    }

    #[inline]
    pub const fn eye(&self, eye: Eye) -> &EyePass<R> {
        &self.eyes[eye.index()]
    }

    #[inline]
    pub fn eye_mut(&mut self, eye: Eye) -> &mut EyePass<R> {
        &mut self.eyes[eye.index()]
    }

    #[inline]
    pub const fn lut(&self) -> &TransferLut {
        &self.lut
    }

    /// Replace the transfer function. Applies from the next tile on.
    pub fn set_lut(&mut self, lut: TransferLut) {
        self.lut = lut;
    }

    /// Whether an eye's render target holds a complete image.
    #[inline]
    pub fn is_finished(&self, eye: Eye) -> bool {
        self.eye(eye).is_finished()
    }

    /// Set the per-frame tile cap of both eyes.
    pub fn set_budget(&mut self, budget: u32) {
        self.config.budget = budget;
        for pass in &mut self.eyes {
            pass.scheduler_mut().set_budget(budget);
        }
    }

    /// Change the tile size of both eyes. In-progress sweeps restart.
    pub fn set_chunk_size(&mut self, chunk: ViewportSize) -> Result<()> {
        let config = RenderConfig {
            chunk,
            ..self.config.clone()
        };
        config.validate()?;
        for pass in &mut self.eyes {
            pass.set_chunk_size(chunk)?;
        }
        self.config = config;
        Ok(())
    }

    /// Change the per-eye viewport. Both eyes start over.
    pub fn resize(&mut self, viewport: ViewportSize) -> Result<()> {
        let config = RenderConfig {
            eye_viewport: viewport,
            ..self.config.clone()
        };
        for pass in &mut self.eyes {
            pass.resize(&config)?;
        }
        info!("Stereo renderer resized to {viewport} per eye");
        self.config = config;
        Ok(())
    }

    /// Render one frame's share of both eyes.
    ///
    /// An eye whose sweep is done starts a new one from this frame's pose;
    /// an eye still sweeping keeps its snapshot and draws its next tiles. A
    /// failed tile aborts only that eye's sweep, which restarts next frame.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn render_frame(&mut self, ctx: &FrameContext) -> Result<FrameReport> {
        let mut report = FrameReport {
            frame_number: ctx.frame_number,
            ..FrameReport::default()
        };

        for pass in &mut self.eyes {
            let eye = pass.eye();
            let eye_report = &mut report.eyes[eye.index()];
            let inputs = ctx.eyes[eye.index()].inputs(ctx.model);
            eye_report.prepared = pass.prepare_sweep(&inputs)?;

            let start = Instant::now();
            match pass.advance(&ctx.params, &self.lut) {
                Ok(advance) => eye_report.advance = advance,
                Err(Error::SweepAborted { eye, sweep, reason }) => {
                    warn!(
                        "Frame {}: {eye} eye sweep {sweep} aborted ({reason}), restarting",
                        ctx.frame_number
                    );
                    eye_report.aborted = true;
                }
                Err(e) => return Err(e),
            }
            eye_report.tile_time = start.elapsed();
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{ModelPlacement, StereoRig, Turntable};
    use crate::software::SoftwareTileRenderer;
    use crate::transfer_function::TransferFunction;
    use glam::UVec3;
    use std::sync::Arc;
    use stereocast_core::VolumeData;

    fn renderer(config: RenderConfig) -> (StereoRenderer<SoftwareTileRenderer>, RaycastParams) {
        let volume = Arc::new(VolumeData::head_phantom(UVec3::splat(16)).unwrap());
        let info = volume.info();
        let viewport = config.eye_viewport;
        let lut = TransferFunction::ct_stereo().bake(info.min, info.max);
        let stereo = StereoRenderer::new(
            config,
            lut,
            SoftwareTileRenderer::new(Arc::clone(&volume), viewport).unwrap(),
            SoftwareTileRenderer::new(volume, viewport).unwrap(),
        )
        .unwrap();
        (stereo, RaycastParams::for_volume(&info))
    }

    fn context(frame_number: u64, config: &RenderConfig, params: RaycastParams) -> FrameContext {
        FrameContext {
            frame_number,
            dt: 1.0 / 60.0,
            model: ModelPlacement::desktop().model_matrix(&Turntable::new()),
            eyes: StereoRig::new(config).poses(),
            params,
        }
    }

    #[test]
    fn both_eyes_finish_together_from_the_same_start() {
        let config = RenderConfig::new(ViewportSize::new(64, 32))
            .with_chunk_size(16, 16)
            .with_budget(3);
        let (mut stereo, params) = renderer(config.clone());

        let mut frames = 0;
        while !(stereo.is_finished(Eye::Left) && stereo.is_finished(Eye::Right)) {
            let report = stereo
                .render_frame(&context(frames, &config, params))
                .unwrap();
            if frames == 0 {
                assert!(report.eye(Eye::Left).prepared.is_some());
                assert!(report.eye(Eye::Right).prepared.is_some());
            }
            frames += 1;
        }
        // 8 tiles per eye at 3 per frame.
        assert_eq!(frames, 3);
        assert_eq!(stereo.eye(Eye::Left).stats().tiles_drawn, 8);
        assert_eq!(stereo.eye(Eye::Right).stats().tiles_drawn, 8);
    }

    #[test]
    fn eyes_see_different_images() {
        let config = RenderConfig::new(ViewportSize::new(32, 32))
            .with_chunk_size(32, 32)
            .with_budget(1);
        let (mut stereo, params) = renderer(config.clone());
        stereo.render_frame(&context(0, &config, params)).unwrap();
        let left = stereo.eye(Eye::Left).renderer().target().color();
        let right = stereo.eye(Eye::Right).renderer().target().color();
        assert_ne!(left, right);
    }

    #[test]
    fn budget_change_applies_to_both_eyes() {
        let config = RenderConfig::new(ViewportSize::new(64, 64)).with_chunk_size(16, 16);
        let (mut stereo, params) = renderer(config.clone());
        stereo.set_budget(16);
        let report = stereo.render_frame(&context(0, &config, params)).unwrap();
        assert_eq!(report.tiles_drawn(), 32);
        assert!(stereo.is_finished(Eye::Left));
        assert!(stereo.is_finished(Eye::Right));
    }

    #[test]
    fn invalid_chunk_change_keeps_config() {
        let config = RenderConfig::new(ViewportSize::new(64, 64)).with_chunk_size(16, 16);
        let (mut stereo, _) = renderer(config);
        assert!(stereo.set_chunk_size(ViewportSize::new(128, 16)).is_err());
        assert_eq!(stereo.config().chunk, ViewportSize::new(16, 16));

        stereo.set_chunk_size(ViewportSize::new(32, 32)).unwrap();
        assert_eq!(stereo.eye(Eye::Right).scheduler().grid().tile_count(), 4);
    }

    #[test]
    fn resize_restarts_both_eyes() {
        let config = RenderConfig::new(ViewportSize::new(64, 64)).with_chunk_size(16, 16);
        let (mut stereo, params) = renderer(config.clone());
        stereo.render_frame(&context(0, &config, params)).unwrap();
        stereo.resize(ViewportSize::new(32, 32)).unwrap();
        assert!(!stereo.is_finished(Eye::Left));
        assert_eq!(stereo.eye(Eye::Left).scheduler().grid().tile_count(), 4);
        assert_eq!(stereo.config().eye_viewport, ViewportSize::new(32, 32));
    }
}
