//! Display compositor.
//!
//! Per-eye images go to an attached HMD only once that eye's sweep is
//! complete, so a half-drawn sweep is never shown in the headset. The mirror
//! window shows both eyes side by side, at most once per mirror interval while
//! an HMD is attached and every frame otherwise. It follows the same rule:
//! an eye whose sweep is in progress shows its last finished image, or the
//! background before the first sweep completes.

use std::borrow::Cow;
use std::ops::Deref;
use std::time::Duration;

use glam::Vec4;
use image::{imageops, Rgba, RgbaImage};
use stereocast_core::{Eye, Result};
use tracing::trace;

use crate::config::RenderConfig;
use crate::debug::{debug_image, DebugSources, DebugView};
use crate::eye::EyePass;
use crate::software::SoftwareTileRenderer;
use crate::stereo::StereoRenderer;
use crate::target::pack_rgba8;

/// Receiver of composited images.
pub trait DisplaySink {
    /// Whether per-eye submissions go to a head-mounted display.
    fn hmd_attached(&self) -> bool {
        false
    }

    /// Hand a finished eye image to the HMD.
    fn submit_eye(&mut self, eye: Eye, image: &RgbaImage) -> Result<()>;

    /// Show the side-by-side mirror image.
    fn present_mirror(&mut self, image: &RgbaImage) -> Result<()>;
}

/// Decisions for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositePlan {
    /// Eyes submitted to the HMD, indexed by [`Eye::index`]
    pub submit: [bool; 2],
    pub mirror: bool,
    /// Mirror halves read from the eye buffers; the others reuse the last
    /// finished image
    pub refresh: [bool; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub submissions: [u64; 2],
    pub mirrors: u64,
}

/// Mirror timer and per-eye debug view selection.
#[derive(Clone, Debug)]
pub struct Compositor {
    mirror_interval: Duration,
    mirror_timer: Duration,
    background: Vec4,
    depth_scale: f32,
    views: [DebugView; 2],
    /// Last finished image per eye, in that eye's view
    latched: [Option<RgbaImage>; 2],
    stats: CompositorStats,
}

impl Compositor {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            mirror_interval: config.mirror_interval,
            mirror_timer: Duration::ZERO,
            background: config.clear_color,
            depth_scale: config.depth_scale,
            views: [DebugView::Color; 2],
            latched: [None, None],
            stats: CompositorStats::default(),
        }
    }

    #[inline]
    pub const fn view(&self, eye: Eye) -> DebugView {
        self.views[eye.index()]
    }

    pub fn set_view(&mut self, eye: Eye, view: DebugView) {
        self.views[eye.index()] = view;
    }

    /// Cycle both eyes to the next debug view.
    pub fn cycle_views(&mut self) {
        self.views = self.views.map(DebugView::next);
    }

    #[inline]
    pub const fn stats(&self) -> &CompositorStats {
        &self.stats
    }

    /// Advance the mirror timer by `dt` and decide what to show.
    pub fn plan(&mut self, dt: Duration, hmd_attached: bool, finished: [bool; 2]) -> CompositePlan {
        self.mirror_timer += dt;
        let submit = if hmd_attached { finished } else { [false; 2] };
        let mirror = self.mirror_timer > self.mirror_interval || !hmd_attached;
        if mirror {
            self.mirror_timer = Duration::ZERO;
        }
        let refresh = if mirror { finished } else { [false; 2] };
        CompositePlan {
            submit,
            mirror,
            refresh,
        }
    }

    /// Plan the frame and push the resulting images to `sink`.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn present<S: DisplaySink + ?Sized>(
        &mut self,
        dt: Duration,
        stereo: &StereoRenderer<SoftwareTileRenderer>,
        sink: &mut S,
    ) -> Result<CompositePlan> {
        let finished = Eye::BOTH.map(|eye| stereo.is_finished(eye));
        let plan = self.plan(dt, sink.hmd_attached(), finished);

        for eye in Eye::BOTH {
            if plan.submit[eye.index()] {
                let image = self.eye_image(stereo.eye(eye), DebugView::Color)?;
                sink.submit_eye(eye, &image)?;
                self.stats.submissions[eye.index()] += 1;
            }
        }
        if plan.mirror {
            for eye in Eye::BOTH {
                if plan.refresh[eye.index()] {
                    let image = self.eye_image(stereo.eye(eye), self.view(eye))?;
                    self.latched[eye.index()] = Some(image);
                }
            }
            let viewport = stereo.config().eye_viewport;
            let mirror = self.compose(viewport.width, viewport.height, |eye| {
                self.latched[eye.index()].as_ref().map(Ok)
            })?;
            sink.present_mirror(&mirror)?;
            self.stats.mirrors += 1;
        }
        trace!("Composited {plan:?}");
        Ok(plan)
    }

    /// One eye as an image in the given view.
    pub fn eye_image(
        &self,
        pass: &EyePass<SoftwareTileRenderer>,
        view: DebugView,
    ) -> Result<RgbaImage> {
        debug_image(
            view,
            &DebugSources {
                target: pass.renderer().target(),
                bounds: pass.bounds(),
                hints: pass.hints(),
                background: self.background,
                depth_scale: self.depth_scale,
            },
        )
    }

    /// Both eyes side by side in their selected views, left eye on the left.
    ///
    /// Eyes with a sweep in progress show their last presented image.
    pub fn mirror_image(&self, stereo: &StereoRenderer<SoftwareTileRenderer>) -> Result<RgbaImage> {
        let viewport = stereo.config().eye_viewport;
        self.compose(viewport.width, viewport.height, |eye| {
            if stereo.is_finished(eye) {
                Some(self.eye_image(stereo.eye(eye), self.view(eye)).map(Cow::Owned))
            } else {
                self.latched[eye.index()]
                    .as_ref()
                    .map(|image| Ok(Cow::Borrowed(image)))
            }
        })
    }

    /// Place each eye's image over the background. Images that no longer
    /// match the viewport are skipped.
    fn compose<I, F>(&self, width: u32, height: u32, mut image_of: F) -> Result<RgbaImage>
    where
        I: Deref<Target = RgbaImage>,
        F: FnMut(Eye) -> Option<Result<I>>,
    {
        let background = Rgba(pack_rgba8(self.background.truncate().extend(1.0)));
        let mut mirror = RgbaImage::from_pixel(width * 2, height, background);
        for eye in Eye::BOTH {
            let Some(image) = image_of(eye).transpose()? else {
                continue;
            };
            if image.dimensions() != (width, height) {
                continue;
            }
            let x = i64::from(width) * eye.index() as i64;
            imageops::replace(&mut mirror, &*image, x, 0);
        }
        Ok(mirror)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{ModelPlacement, StereoRig, Turntable};
    use crate::raycast::RaycastParams;
    use crate::stereo::FrameContext;
    use crate::transfer_function::TransferFunction;
    use glam::UVec3;
    use std::sync::Arc;
    use stereocast_core::{ViewportSize, VolumeData};

    const FRAME: Duration = Duration::from_millis(16);

    fn compositor() -> Compositor {
        Compositor::new(&RenderConfig::default())
    }

    #[test]
    fn without_hmd_mirror_every_frame() {
        let mut compositor = compositor();
        for _ in 0..3 {
            let plan = compositor.plan(FRAME, false, [true, true]);
            assert_eq!(plan.submit, [false, false]);
            assert!(plan.mirror);
        }
    }

    #[test]
    fn with_hmd_mirror_follows_the_timer() {
        let mut compositor = compositor();
        let mirrored: Vec<bool> = (0..14)
            .map(|_| compositor.plan(FRAME, true, [false, false]).mirror)
            .collect();
        // 7 frames of 16 ms pass 100 ms.
        let expected: Vec<bool> = (1..=14).map(|i| i % 7 == 0).collect();
        assert_eq!(mirrored, expected);
    }

    #[test]
    fn hmd_gets_only_finished_eyes() {
        let mut compositor = compositor();
        assert_eq!(compositor.plan(FRAME, true, [true, false]).submit, [true, false]);
        assert_eq!(compositor.plan(FRAME, true, [false, true]).submit, [false, true]);
    }

    #[derive(Default)]
    struct Capture {
        hmd: bool,
        submitted: Vec<Eye>,
        mirrors: Vec<RgbaImage>,
    }

    impl DisplaySink for Capture {
        fn hmd_attached(&self) -> bool {
            self.hmd
        }

        fn submit_eye(&mut self, eye: Eye, _image: &RgbaImage) -> Result<()> {
            self.submitted.push(eye);
            Ok(())
        }

        fn present_mirror(&mut self, image: &RgbaImage) -> Result<()> {
            self.mirrors.push(image.clone());
            Ok(())
        }
    }

    #[test]
    fn mirror_refreshes_only_finished_eyes() {
        let mut compositor = compositor();
        let plan = compositor.plan(FRAME, false, [false, true]);
        assert!(plan.mirror);
        assert_eq!(plan.refresh, [false, true]);
        let plan = compositor.plan(FRAME, false, [false, false]);
        assert!(plan.mirror);
        assert_eq!(plan.refresh, [false, false]);
        // No mirror this frame, so nothing is read either.
        assert_eq!(compositor.plan(FRAME, true, [true, true]).refresh, [false, false]);
    }

    /// 32x16 eyes in two 16x16 tiles at one tile per frame.
    fn two_frame_sweeps() -> (RenderConfig, StereoRenderer<SoftwareTileRenderer>, FrameContext) {
        let config = RenderConfig::new(ViewportSize::new(32, 16))
            .with_chunk_size(16, 16)
            .with_budget(1);
        let volume = Arc::new(VolumeData::head_phantom(UVec3::splat(8)).unwrap());
        let info = volume.info();
        let stereo = StereoRenderer::new(
            config.clone(),
            TransferFunction::ct_stereo().bake(info.min, info.max),
            SoftwareTileRenderer::new(Arc::clone(&volume), config.eye_viewport).unwrap(),
            SoftwareTileRenderer::new(volume, config.eye_viewport).unwrap(),
        )
        .unwrap();
        let ctx = FrameContext {
            frame_number: 0,
            dt: 0.016,
            model: ModelPlacement::desktop().model_matrix(&Turntable::new()),
            eyes: StereoRig::new(&config).poses(),
            params: RaycastParams::for_volume(&info),
        };
        (config, stereo, ctx)
    }

    #[test]
    fn mirror_never_shows_a_partial_sweep() {
        let (config, mut stereo, ctx) = two_frame_sweeps();
        let mut compositor = Compositor::new(&config);
        let mut sink = Capture::default();
        let opaque = config.clear_color.truncate().extend(1.0);
        let background = RgbaImage::from_pixel(64, 16, Rgba(pack_rgba8(opaque)));

        // Half of each eye drawn: nothing finished to show yet.
        stereo.render_frame(&ctx).unwrap();
        assert!(!stereo.is_finished(Eye::Left));
        let plan = compositor.present(FRAME, &stereo, &mut sink).unwrap();
        assert_eq!(plan.refresh, [false, false]);
        assert_eq!(sink.mirrors[0], background);
        assert_eq!(compositor.mirror_image(&stereo).unwrap(), background);

        stereo.render_frame(&FrameContext { frame_number: 1, ..ctx }).unwrap();
        compositor.present(FRAME, &stereo, &mut sink).unwrap();
        let finished = sink.mirrors[1].clone();
        assert_ne!(finished, background);
        let left = compositor.eye_image(stereo.eye(Eye::Left), DebugView::Color).unwrap();
        assert_eq!(imageops::crop_imm(&finished, 0, 0, 32, 16).to_image(), left);

        // The next sweep clears the buffers and draws one tile.
        stereo.render_frame(&FrameContext { frame_number: 2, ..ctx }).unwrap();
        assert!(!stereo.is_finished(Eye::Right));
        compositor.present(FRAME, &stereo, &mut sink).unwrap();
        assert_eq!(sink.mirrors[2], finished);
        assert_eq!(compositor.mirror_image(&stereo).unwrap(), finished);
        assert_eq!(compositor.stats().mirrors, 3);
    }

    #[test]
    fn present_submits_after_the_sweep_completes() {
        let (config, mut stereo, ctx) = two_frame_sweeps();
        let mut compositor = Compositor::new(&config);
        let mut sink = Capture {
            hmd: true,
            ..Capture::default()
        };

        stereo.render_frame(&ctx).unwrap();
        compositor.present(FRAME, &stereo, &mut sink).unwrap();
        assert!(sink.submitted.is_empty());

        stereo.render_frame(&FrameContext { frame_number: 1, ..ctx }).unwrap();
        compositor.present(FRAME, &stereo, &mut sink).unwrap();
        assert_eq!(sink.submitted, vec![Eye::Left, Eye::Right]);
        assert_eq!(compositor.stats().submissions, [1, 1]);

        sink.hmd = false;
        compositor.cycle_views();
        compositor.present(FRAME, &stereo, &mut sink).unwrap();
        assert_eq!(sink.mirrors.len(), 1);
        assert_eq!(sink.mirrors[0].dimensions(), (64, 16));
        assert_eq!(compositor.view(Eye::Right), DebugView::FirstHit);
    }
}
