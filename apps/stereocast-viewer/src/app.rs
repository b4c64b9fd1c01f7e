//! Viewer loop: input, stereo sweeps, compositing and capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use glam::UVec3;
use image::RgbaImage;
use tracing::{debug, info};

use stereocast_core::{Eye, Result as RenderResult, ViewportSize, VolumeData};
use stereocast_profiler::{profile_scope, EventCategory, Profiler, SweepCounters};
use stereocast_render::{
    save_image, Compositor, DisplaySink, FrameContext, FrameReport, ModelPlacement,
    RaycastParams, RenderConfig, ScreenshotConfig, SoftwareTileRenderer, StereoRenderer,
    StereoRig, TimeBudget, TransferFunction, Turntable,
};

use crate::input::{InputEvent, InputQueue, InputScript};

/// Simulated frame interval, matching a 90 Hz headset.
const FRAME_DT: Duration = Duration::from_micros(11_111);

/// Viewer options (from CLI or defaults).
#[derive(Debug, Clone)]
pub struct ViewerArgs {
    pub eye_viewport: ViewportSize,
    pub chunk: ViewportSize,
    pub budget: u32,
    /// Target tile time per eye and frame for the adaptive budget
    pub tile_time: Option<Duration>,
    pub volume_size: u32,
    pub frames: u64,
    pub hmd: bool,
    pub auto_rotate: bool,
    pub input: InputScript,
    pub screenshot: ScreenshotConfig,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        let config = RenderConfig::default();
        Self {
            eye_viewport: config.eye_viewport,
            chunk: config.chunk,
            budget: config.budget,
            tile_time: None,
            volume_size: 128,
            frames: 240,
            hmd: false,
            auto_rotate: false,
            input: InputScript::default(),
            screenshot: ScreenshotConfig::default(),
        }
    }
}

impl ViewerArgs {
    /// Parse viewer options from command line arguments.
    pub fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self {
            screenshot: ScreenshotConfig::parse_args(args),
            ..Self::default()
        };

        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            let mut value = || {
                iter.next()
                    .with_context(|| format!("missing value for {arg}"))
            };
            match arg.as_str() {
                "--size" => parsed.eye_viewport = parse_size(value()?)?,
                "--chunk" => parsed.chunk = parse_size(value()?)?,
                "--budget" => parsed.budget = value()?.parse().context("invalid --budget")?,
                "--tile-time" => {
                    let ms: f64 = value()?.parse().context("invalid --tile-time")?;
                    let time = Duration::try_from_secs_f64(ms / 1000.0)
                        .with_context(|| format!("invalid --tile-time {ms}"))?;
                    parsed.tile_time = Some(time);
                }
                "--volume" => parsed.volume_size = value()?.parse().context("invalid --volume")?,
                "--run-frames" => parsed.frames = value()?.parse().context("invalid --run-frames")?,
                "--hmd" => parsed.hmd = true,
                "--auto-rotate" => parsed.auto_rotate = true,
                "--input" => {
                    parsed.input = InputScript::parse(value()?).map_err(anyhow::Error::msg)?;
                }
                // Screenshot flags, read by `ScreenshotConfig::parse_args`
                "-S" | "--screenshot" | "--exit-after" => {}
                "-o" | "--output" | "-f" | "--frames" => {
                    value()?;
                }
                other => bail!("unknown option '{other}', see --help"),
            }
        }

        Ok(parsed)
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.eye_viewport)
            .with_chunk_size(self.chunk.width, self.chunk.height)
            .with_budget(self.budget)
    }
}

fn parse_size(s: &str) -> anyhow::Result<ViewportSize> {
    let Some((w, h)) = s.split_once('x') else {
        bail!("expected <W>x<H>, got '{s}'");
    };
    Ok(ViewportSize::new(
        w.parse().with_context(|| format!("invalid width in '{s}'"))?,
        h.parse().with_context(|| format!("invalid height in '{s}'"))?,
    ))
}

/// Display sink that keeps the latest images in memory.
///
/// The mirror is what screenshots capture; eye submissions stand in for an
/// HMD compositor when `--hmd` is given.
#[derive(Default)]
pub struct MemorySink {
    hmd: bool,
    mirror: Option<RgbaImage>,
    eyes: [Option<RgbaImage>; 2],
}

impl MemorySink {
    pub fn new(hmd: bool) -> Self {
        Self {
            hmd,
            ..Self::default()
        }
    }

    pub const fn mirror(&self) -> Option<&RgbaImage> {
        self.mirror.as_ref()
    }

    pub const fn eye(&self, eye: Eye) -> Option<&RgbaImage> {
        self.eyes[eye.index()].as_ref()
    }
}

impl DisplaySink for MemorySink {
    fn hmd_attached(&self) -> bool {
        self.hmd
    }

    fn submit_eye(&mut self, eye: Eye, image: &RgbaImage) -> RenderResult<()> {
        self.eyes[eye.index()] = Some(image.clone());
        Ok(())
    }

    fn present_mirror(&mut self, image: &RgbaImage) -> RenderResult<()> {
        self.mirror = Some(image.clone());
        Ok(())
    }
}

/// Viewer application state.
pub struct Viewer {
    args: ViewerArgs,
    stereo: StereoRenderer<SoftwareTileRenderer>,
    compositor: Compositor,
    sink: MemorySink,
    params: RaycastParams,
    rig: StereoRig,
    turntable: Turntable,
    placement: ModelPlacement,
    auto_rotate: bool,
    input: InputQueue,
    time_budget: Option<TimeBudget>,
    profiler: Profiler,
}

impl Viewer {
    pub fn new(args: ViewerArgs) -> anyhow::Result<Self> {
        if args.screenshot.enabled {
            info!(
                "Screenshot capture enabled: {:?} frames, output pattern: {}",
                args.screenshot.frames, args.screenshot.output_pattern
            );
        }

        let config = args.render_config();
        config.validate()?;

        let started = Instant::now();
        let volume = Arc::new(VolumeData::head_phantom(UVec3::splat(args.volume_size))?);
        let info = volume.info();
        info!(
            "Head phantom {}³ built in {:.1} ms (values {:.0}..{:.0})",
            args.volume_size,
            started.elapsed().as_secs_f64() * 1000.0,
            info.min,
            info.max
        );

        let lut = TransferFunction::ct_stereo().bake(info.min, info.max);
        let viewport = config.eye_viewport;
        let stereo = StereoRenderer::new(
            config.clone(),
            lut,
            SoftwareTileRenderer::new(Arc::clone(&volume), viewport)?,
            SoftwareTileRenderer::new(volume, viewport)?,
        )?;

        let time_budget = args
            .tile_time
            .map(|target| TimeBudget::new(target, config.budget))
            .transpose()?;

        Ok(Self {
            stereo,
            compositor: Compositor::new(&config),
            sink: MemorySink::new(args.hmd),
            params: RaycastParams::for_volume(&info).with_lod(config.lod_scale, config.lod_bias),
            rig: StereoRig::new(&config),
            turntable: Turntable::new(),
            placement: if args.hmd {
                ModelPlacement::room_scale()
            } else {
                ModelPlacement::desktop()
            },
            auto_rotate: args.auto_rotate,
            input: InputQueue::new(),
            time_budget,
            profiler: Profiler::new(),
            args,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        info!("Running {} frames", self.args.frames);
        for frame_number in 0..self.args.frames {
            self.frame(frame_number)?;

            if self.args.screenshot.exit_after_capture
                && self.args.screenshot.all_captured(frame_number + 1)
            {
                info!("All screenshots captured, exiting...");
                break;
            }
        }
        self.log_summary();
        Ok(())
    }

    fn frame(&mut self, frame_number: u64) -> anyhow::Result<()> {
        let frame_start = Instant::now();
        let dt = FRAME_DT.as_secs_f32();

        self.args.input.feed(frame_number, &mut self.input);
        self.handle_input();
        if self.auto_rotate {
            self.placement.rotate(dt);
        }

        let ctx = FrameContext {
            frame_number,
            dt,
            model: self.placement.model_matrix(&self.turntable),
            eyes: self.rig.poses(),
            params: self.params,
        };
        let report = self.stereo.render_frame(&ctx)?;
        self.record_report(&report);

        {
            profile_scope!(self.profiler, EventCategory::Composite);
            self.compositor
                .present(FRAME_DT, &self.stereo, &mut self.sink)?;
        }

        if self.args.screenshot.should_capture(frame_number) {
            self.capture_screenshot(frame_number)?;
        }

        let frame_time = frame_start.elapsed();
        self.profiler.record_duration(EventCategory::Frame, frame_time);
        let frame_time_ms = frame_time.as_secs_f32() * 1000.0;
        let fps = if frame_time_ms > 0.0 { 1000.0 / frame_time_ms } else { 0.0 };
        self.profiler.end_frame(frame_number, fps, frame_time_ms);
        Ok(())
    }

    fn handle_input(&mut self) {
        let view = self.rig.view_matrix(Eye::Left);
        for event in self.input.drain() {
            match event {
                InputEvent::KeyPressed(key) => self.rig.translate_local(key.translation()),
                InputEvent::DragStart => self.turntable.set_drag_active(true),
                InputEvent::DragStop => self.turntable.set_drag_active(false),
                InputEvent::MouseMotion { dx, dy } => self.turntable.drag_by(dx, dy, view),
                InputEvent::ToggleAutoRotate => {
                    self.auto_rotate = !self.auto_rotate;
                    info!("Auto-rotate: {}", self.auto_rotate);
                }
                InputEvent::CycleDebugView => {
                    self.compositor.cycle_views();
                    info!("Debug view: {:?}", self.compositor.view(Eye::Left));
                }
                InputEvent::ToggleChunkBorders => {
                    self.params.show_chunk_borders = !self.params.show_chunk_borders;
                }
                InputEvent::ToggleOcclusion => {
                    self.params.use_occlusion = !self.params.use_occlusion;
                    info!("Occlusion hints: {}", self.params.use_occlusion);
                }
            }
        }
    }

    fn record_report(&mut self, report: &FrameReport) {
        for eye in Eye::BOTH {
            let eye_report = report.eye(eye);
            let id = eye.index() as u8;
            if let Some(prepared) = eye_report.prepared {
                self.profiler
                    .record_eye_duration(EventCategory::BoundsPass, id, prepared.bounds);
                self.profiler
                    .record_eye_duration(EventCategory::OcclusionPass, id, prepared.occlusion);
            }
            self.profiler
                .record_eye_duration(EventCategory::TileDraw, id, eye_report.tile_time);

            let pass = self.stereo.eye(eye);
            let stats = pass.stats();
            if eye_report.advance.completed {
                self.profiler
                    .record_eye_duration(EventCategory::Sweep, id, stats.last_sweep_duration);
                debug!(
                    "Frame {}: {eye} eye sweep done in {} frames",
                    report.frame_number, stats.last_sweep_frames
                );
            }
            self.profiler.report_sweep(
                id,
                SweepCounters {
                    sweeps_completed: stats.sweeps_completed,
                    sweeps_aborted: stats.sweeps_aborted,
                    tiles_drawn: stats.tiles_drawn,
                    tiles_remaining: pass.scheduler().remaining(),
                    last_sweep_frames: stats.last_sweep_frames,
                    last_sweep_ms: stats.last_sweep_duration.as_secs_f32() * 1000.0,
                },
            );
        }

        if let Some(time_budget) = &mut self.time_budget {
            // Both eyes share one budget; adapt to the slower eye.
            let slowest = report
                .eyes
                .iter()
                .filter(|e| e.advance.tiles_drawn > 0)
                .max_by_key(|e| e.tile_time);
            if let Some(eye_report) = slowest {
                let before = time_budget.budget();
                let budget = time_budget.record(eye_report.advance.tiles_drawn, eye_report.tile_time);
                if budget != before {
                    debug!("Tile budget {before} -> {budget}");
                    self.stereo.set_budget(budget);
                }
            }
        }
    }

    fn capture_screenshot(&self, frame_number: u64) -> anyhow::Result<()> {
        let path = self.args.screenshot.output_path(frame_number);
        let image = match self.sink.mirror() {
            Some(image) => image.clone(),
            None => self.compositor.mirror_image(&self.stereo)?,
        };
        save_image(&image, &path)?;

        if self.args.hmd {
            for eye in Eye::BOTH {
                if let Some(image) = self.sink.eye(eye) {
                    let eye_path = path.with_file_name(format!(
                        "{}_{eye}.png",
                        path.file_stem().and_then(|s| s.to_str()).unwrap_or("eye")
                    ));
                    save_image(image, eye_path)?;
                }
            }
        }
        Ok(())
    }

    fn log_summary(&self) {
        let snapshot = self.profiler.snapshot();
        for stats in &snapshot.categories {
            info!(
                "{:<10} n={:<5} avg {:>7.2} ms  p95 {:>7.2} ms  max {:>7.2} ms",
                stats.category.name(),
                stats.count,
                stats.avg_ms(),
                stats.p95_ms(),
                stats.max_ms()
            );
        }
        for eye in Eye::BOTH {
            let counters = snapshot.eyes[eye.index()];
            info!(
                "{eye} eye: {} sweeps ({} aborted), {} tiles, last sweep {} frames / {:.1} ms",
                counters.sweeps_completed,
                counters.sweeps_aborted,
                counters.tiles_drawn,
                counters.last_sweep_frames,
                counters.last_sweep_ms
            );
        }
        let stats = self.compositor.stats();
        info!(
            "Compositor: {} mirror updates, {:?} eye submissions",
            stats.mirrors, stats.submissions
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("stereocast-viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        let parsed = ViewerArgs::parse(&args(&[])).unwrap();
        assert_eq!(parsed.eye_viewport, ViewportSize::new(800, 800));
        assert_eq!(parsed.budget, 8);
        assert!(!parsed.hmd);
        assert!(!parsed.screenshot.enabled);
    }

    #[test]
    fn parses_render_flags() {
        let parsed = ViewerArgs::parse(&args(&[
            "--size", "64x48", "--chunk", "16x16", "--budget", "3", "--tile-time", "4",
            "--hmd", "--input", "0:drag+,1:move=2,3", "-S", "-f", "0-2",
        ]))
        .unwrap();
        assert_eq!(parsed.eye_viewport, ViewportSize::new(64, 48));
        assert_eq!(parsed.chunk, ViewportSize::new(16, 16));
        assert_eq!(parsed.budget, 3);
        assert_eq!(parsed.tile_time, Some(Duration::from_millis(4)));
        assert!(parsed.hmd);
        assert!(!parsed.input.is_empty());
        assert_eq!(parsed.screenshot.frames.len(), 3);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ViewerArgs::parse(&args(&["--size", "64"])).is_err());
        assert!(ViewerArgs::parse(&args(&["--budget"])).is_err());
        assert!(ViewerArgs::parse(&args(&["--input", "1:fly"])).is_err());
    }

    #[test]
    fn rejects_unusable_tile_time() {
        for ms in ["-1", "NaN", "inf"] {
            assert!(
                ViewerArgs::parse(&args(&["--tile-time", ms])).is_err(),
                "--tile-time {ms}"
            );
        }
        let parsed = ViewerArgs::parse(&args(&["--tile-time", "0.5"])).unwrap();
        assert_eq!(parsed.tile_time, Some(Duration::from_micros(500)));
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = ViewerArgs::parse(&args(&["--sizee", "64x64"])).unwrap_err();
        assert!(err.to_string().contains("--sizee"));
        assert!(ViewerArgs::parse(&args(&["64x64"])).is_err());
        // Screenshot flags and their values are not mistaken for unknown options.
        let parsed = ViewerArgs::parse(&args(&[
            "-S", "-o", "shot_{}.png", "-f", "0,2", "--exit-after", "--budget", "2",
        ]))
        .unwrap();
        assert_eq!(parsed.budget, 2);
        assert!(parsed.screenshot.enabled);
    }

    #[test]
    fn viewer_runs_and_mirrors() {
        let parsed = ViewerArgs::parse(&args(&[
            "--size", "32x32", "--chunk", "16x16", "--budget", "2", "--volume", "16",
            "--run-frames", "3", "--input", "0:drag+,0:move=10,0,1:auto",
        ]))
        .unwrap();
        let mut viewer = Viewer::new(parsed).unwrap();
        viewer.run().unwrap();

        assert!(viewer.auto_rotate);
        assert!(viewer.placement.spin > 0.0);
        assert!(viewer.turntable.drag_active());
        // No HMD: mirror every frame, nothing submitted.
        assert_eq!(viewer.compositor.stats().mirrors, 3);
        assert_eq!(viewer.compositor.stats().submissions, [0, 0]);
        assert_eq!(viewer.sink.mirror().unwrap().dimensions(), (64, 32));
        // 4 tiles per eye at 2 per frame.
        assert_eq!(viewer.profiler.snapshot().eyes[0].sweeps_completed, 1);
    }

    #[test]
    fn hmd_submits_finished_eyes() {
        let parsed = ViewerArgs::parse(&args(&[
            "--size", "32x32", "--chunk", "16x16", "--budget", "4", "--volume", "16",
            "--run-frames", "2", "--hmd",
        ]))
        .unwrap();
        let mut viewer = Viewer::new(parsed).unwrap();
        viewer.run().unwrap();

        assert_eq!(viewer.compositor.stats().submissions, [2, 2]);
        assert!(viewer.sink.eye(Eye::Right).is_some());
    }
}
