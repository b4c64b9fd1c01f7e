//! Test harness for headless rendering and visual regression testing.
//!
//! Renders complete stereo sweeps with the CPU reference renderer so the
//! scheduling pipeline can be verified without a GPU or a display.

use std::path::Path;
use std::sync::Arc;

use glam::UVec3;
use image::{ImageBuffer, Rgba, RgbaImage};
use stereocast_core::{Eye, ViewportSize, VolumeData};
use stereocast_render::{
    Compositor, DebugView, FrameContext, ModelPlacement, RaycastParams, RenderConfig,
    SoftwareTileRenderer, StereoRenderer, StereoRig, TransferFunction, Turntable,
};

use crate::{Result, TestError, VisualTestConfig};

/// Edge length of the phantom volume used by [`HeadlessRenderer::with_phantom`].
const PHANTOM_SIZE: u32 = 32;

/// Headless stereo renderer for testing.
///
/// Drives a [`StereoRenderer`] over the software tile renderer with a fixed
/// camera, one frame at a time.
pub struct HeadlessRenderer {
    stereo: StereoRenderer<SoftwareTileRenderer>,
    compositor: Compositor,
    params: RaycastParams,
    rig: StereoRig,
    placement: ModelPlacement,
    turntable: Turntable,
    frame_number: u64,
}

impl HeadlessRenderer {
    /// Create a new headless renderer for `volume`.
    pub fn new(config: RenderConfig, volume: Arc<VolumeData>) -> Result<Self> {
        let info = volume.info();
        let viewport = config.eye_viewport;
        let lut = TransferFunction::ct_stereo().bake(info.min, info.max);
        let rig = StereoRig::new(&config);
        let compositor = Compositor::new(&config);
        let stereo = StereoRenderer::new(
            config,
            lut,
            SoftwareTileRenderer::new(Arc::clone(&volume), viewport)?,
            SoftwareTileRenderer::new(volume, viewport)?,
        )?;

        Ok(Self {
            stereo,
            compositor,
            params: RaycastParams::for_volume(&info),
            rig,
            placement: ModelPlacement::desktop(),
            turntable: Turntable::new(),
            frame_number: 0,
        })
    }

    /// Create a renderer for the head phantom.
    pub fn with_phantom(config: RenderConfig) -> Result<Self> {
        let volume = VolumeData::head_phantom(UVec3::splat(PHANTOM_SIZE))?;
        Self::new(config, Arc::new(volume))
    }

    pub fn params_mut(&mut self) -> &mut RaycastParams {
        &mut self.params
    }

    pub fn placement_mut(&mut self) -> &mut ModelPlacement {
        &mut self.placement
    }

    pub const fn stereo(&self) -> &StereoRenderer<SoftwareTileRenderer> {
        &self.stereo
    }

    pub fn stereo_mut(&mut self) -> &mut StereoRenderer<SoftwareTileRenderer> {
        &mut self.stereo
    }

    /// Render one frame's share of tiles for both eyes.
    pub fn render_frame(&mut self) -> Result<()> {
        let ctx = FrameContext {
            frame_number: self.frame_number,
            dt: 1.0 / 60.0,
            model: self.placement.model_matrix(&self.turntable),
            eyes: self.rig.poses(),
            params: self.params,
        };
        self.stereo.render_frame(&ctx)?;
        self.frame_number += 1;
        Ok(())
    }

    /// Render frames until both eyes hold a complete image.
    ///
    /// Returns the number of frames it took.
    pub fn render_sweep(&mut self) -> Result<u64> {
        let tiles = self.stereo.eye(Eye::Left).scheduler().grid().tile_count();
        let max_frames = u64::from(tiles) + 2;

        for frames in 1..=max_frames {
            self.render_frame()?;
            if Eye::BOTH.iter().all(|&eye| self.stereo.is_finished(eye)) {
                return Ok(frames);
            }
        }
        Err(TestError::SweepTimeout(max_frames))
    }

    /// Color image of one eye.
    pub fn eye_image(&self, eye: Eye) -> Result<RgbaImage> {
        Ok(self
            .compositor
            .eye_image(self.stereo.eye(eye), DebugView::Color)?)
    }

    /// Both eyes side by side.
    pub fn mirror_image(&self) -> Result<RgbaImage> {
        Ok(self.compositor.mirror_image(&self.stereo)?)
    }

    /// Get the per-eye output dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        let viewport = self.stereo.config().eye_viewport;
        (viewport.width, viewport.height)
    }
}

/// Visual regression test runner.
///
/// Compares rendered mirror images against baseline images and reports
/// differences.
pub struct VisualRegressionTest {
    config: VisualTestConfig,
    renderer: HeadlessRenderer,
}

impl VisualRegressionTest {
    /// Create a new visual regression test runner rendering the head phantom.
    pub fn new(config: VisualTestConfig) -> Result<Self> {
        Self::with_dimensions(config, 128, 128)
    }

    /// Create with custom per-eye dimensions.
    pub fn with_dimensions(config: VisualTestConfig, width: u32, height: u32) -> Result<Self> {
        let renderer = HeadlessRenderer::with_phantom(create_test_config(width, height))?;
        Ok(Self { config, renderer })
    }

    pub fn renderer_mut(&mut self) -> &mut HeadlessRenderer {
        &mut self.renderer
    }

    /// Render a full sweep and compare the mirror image to the baseline.
    ///
    /// # Arguments
    /// * `name` - Test case name (used for baseline filename)
    pub fn run_test(&mut self, name: &str) -> Result<()> {
        self.renderer.render_sweep()?;
        let image = self.renderer.mirror_image()?;
        self.compare_and_save(name, &image)
    }

    fn compare_and_save(&self, name: &str, image: &RgbaImage) -> Result<()> {
        std::fs::create_dir_all(&self.config.baseline_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let baseline_path = format!("{}/{}.png", self.config.baseline_dir, name);
        let output_path = format!("{}/{}.png", self.config.output_dir, name);

        image.save(&output_path)?;

        if Path::new(&baseline_path).exists() {
            let baseline = image::open(&baseline_path)?.to_rgba8();

            let diff = compare_images(&baseline, image)?;
            if diff > self.config.threshold {
                let diff_path = format!("{}/{}_diff.png", self.config.output_dir, name);
                create_diff_image(&baseline, image).save(&diff_path)?;

                return Err(TestError::ImageComparison(format!(
                    "Image difference {:.4} exceeds threshold {:.4} (see {})",
                    diff, self.config.threshold, diff_path
                )));
            }
        } else {
            image.save(&baseline_path)?;
            tracing::info!("Created new baseline: {}", baseline_path);
        }

        Ok(())
    }
}

/// Compare two images and return the normalized difference (0.0-1.0).
pub fn compare_images(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(TestError::ImageComparison(format!(
            "Image dimensions don't match: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let total_diff: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| u64::from(pa[c].abs_diff(pb[c])))
                .sum::<u64>()
        })
        .sum();

    let max_diff = u64::from(a.width()) * u64::from(a.height()) * 3 * 255;
    if max_diff == 0 {
        return Ok(0.0);
    }
    Ok(total_diff as f64 / max_diff as f64)
}

/// Create a visual diff image highlighting differences in red.
pub fn create_diff_image(
    a: &ImageBuffer<Rgba<u8>, Vec<u8>>,
    b: &ImageBuffer<Rgba<u8>, Vec<u8>>,
) -> RgbaImage {
    let (width, height) = a.dimensions();
    let mut diff = RgbaImage::new(width, height);

    for (x, y, pixel) in diff.enumerate_pixels_mut() {
        let pa = a.get_pixel(x, y);
        let pb = b.get_pixel(x, y);
        let max_diff = (0..3).map(|c| pa[c].abs_diff(pb[c])).max().unwrap_or(0);

        *pixel = if max_diff > 10 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([pa[0] / 2, pa[1] / 2, pa[2] / 2, 255])
        };
    }

    diff
}

/// Renderer setup for tests: small square eyes, 16×16 tiles, budget 4.
pub fn create_test_config(width: u32, height: u32) -> RenderConfig {
    RenderConfig::new(ViewportSize::new(width, height))
        .with_chunk_size(16, 16)
        .with_budget(4)
}
