//! Chunked stereo volume raycasting for Stereocast.
//!
//! This crate provides:
//! - Tile partitioning and the per-eye sweep scheduler
//! - Transform snapshots fixed for the duration of a sweep
//! - Geometry bounds (uvw) maps and occlusion hint reprojection
//! - Raycast parameters, a CPU reference tile renderer and a Vulkan tile pass
//! - Stereo orchestration, display compositing and debug views
//! - Camera rig, configuration and screenshot capture

pub mod bounds;
pub mod budget;
pub mod camera;
pub mod compositor;
pub mod config;
pub mod debug;
pub mod eye;
pub mod occlusion;
pub mod raycast;
pub mod scheduler;
pub mod screenshot;
pub mod software;
pub mod stereo;
pub mod target;
pub mod tile;
pub mod transfer_function;
pub mod transform;
pub mod vulkan;

pub use bounds::UvwMap;
pub use budget::TimeBudget;
pub use camera::{EyePose, ModelPlacement, StereoRig, Turntable};
pub use compositor::{CompositePlan, Compositor, DisplaySink};
pub use config::{Projection, RenderConfig};
pub use debug::{debug_image, DebugSources, DebugView};
pub use eye::{EyePass, PrepareTimings};
pub use occlusion::{OcclusionHint, OcclusionHintMap};
pub use raycast::{march, RaySample, RaycastParams, RaycastPushConstants};
pub use scheduler::{
    AdvanceReport, ClearBits, SchedulerConfig, SweepResources, SweepState, SweepStats, TileDraw,
    TileRenderer, TileScheduler,
};
pub use screenshot::{parse_frame_indices, save_image, save_screenshot, ScreenshotConfig, ScreenshotError};
pub use software::SoftwareTileRenderer;
pub use stereo::{EyeFrameReport, FrameContext, FrameReport, StereoRenderer};
pub use target::EyeTarget;
pub use tile::{Tile, TileGrid};
pub use transfer_function::{ControlPoint, TransferFunction, TransferLut};
pub use transform::{TransformCache, TransformInputs, TransformSnapshot, VolumeFrame};
pub use vulkan::{
    raycast_set_layout, EyeAttachments, Readback, SweepBufferSizes, VulkanTilePass, HINTS_BINDING,
    LUT_BINDING, UVW_BACK_BINDING, UVW_FRONT_BINDING, VOLUME_BINDING,
};
