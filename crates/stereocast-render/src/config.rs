//! Renderer configuration.

use std::time::Duration;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use stereocast_core::{Error, Result, ViewportSize};

use crate::occlusion::DEFAULT_BLOCK_SIZE;
use crate::raycast::{DEFAULT_DEPTH_BIAS, DEFAULT_LOD_BIAS, DEFAULT_LOD_SCALE};
use crate::scheduler::{SchedulerConfig, ClearBits, DEFAULT_CHUNK_SIZE, DEFAULT_TILE_BUDGET};
use crate::transform::{VolumeFrame, DEFAULT_VOLUME_SIZE};

/// Perspective parameters of the desktop stereo pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 10.0,
        }
    }
}

/// Complete renderer setup for both eyes.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    /// Render target size of one eye.
    pub eye_viewport: ViewportSize,
    /// Tile size.
    pub chunk: ViewportSize,
    /// Tiles drawn per eye per frame.
    pub budget: u32,
    /// Occlusion block edge length in pixels.
    pub occlusion_block_size: u32,
    /// Color the eye targets are cleared to at sweep start.
    pub clear_color: Vec4,
    /// Minimum time between mirror window updates while an HMD is attached.
    pub mirror_interval: Duration,
    pub projection: Projection,
    /// Half-extents of the volume box in model space.
    pub volume_size: Vec3,
    pub lod_scale: f32,
    pub lod_bias: f32,
    pub depth_bias: f32,
    /// View distance mapped to white in depth debug views.
    pub depth_scale: f32,
    /// Horizontal offset of the right eye.
    pub eye_distance: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            eye_viewport: ViewportSize::new(800, 800),
            chunk: DEFAULT_CHUNK_SIZE,
            budget: DEFAULT_TILE_BUDGET,
            occlusion_block_size: DEFAULT_BLOCK_SIZE,
            clear_color: Vec4::new(0.1, 0.12, 0.15, 0.0),
            mirror_interval: Duration::from_millis(100),
            projection: Projection::default(),
            volume_size: DEFAULT_VOLUME_SIZE,
            lod_scale: DEFAULT_LOD_SCALE,
            lod_bias: DEFAULT_LOD_BIAS,
            depth_bias: DEFAULT_DEPTH_BIAS,
            depth_scale: 5.0,
            eye_distance: 0.15,
        }
    }
}

impl RenderConfig {
    /// Defaults for a given eye viewport.
    pub fn new(eye_viewport: ViewportSize) -> Self {
        Self {
            eye_viewport,
            ..Default::default()
        }
    }

    /// Set the per-eye viewport.
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.eye_viewport = ViewportSize::new(width, height);
        self
    }

    /// Set the tile size.
    pub fn with_chunk_size(mut self, width: u32, height: u32) -> Self {
        self.chunk = ViewportSize::new(width, height);
        self
    }

    /// Set the per-frame tile budget.
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_occlusion_block_size(mut self, block_size: u32) -> Self {
        self.occlusion_block_size = block_size;
        self
    }

    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = color;
        self
    }

    pub fn with_mirror_interval(mut self, interval: Duration) -> Self {
        self.mirror_interval = interval;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_volume_size(mut self, volume_size: Vec3) -> Self {
        self.volume_size = volume_size;
        self
    }

    /// Set LOD scale and bias.
    pub fn with_lod(mut self, scale: f32, bias: f32) -> Self {
        self.lod_scale = scale;
        self.lod_bias = bias;
        self
    }

    /// Check everything that would make the renderer unusable.
    pub fn validate(&self) -> Result<()> {
        let viewport = self.eye_viewport;
        if viewport.is_empty() {
            return Err(Error::Config(format!("eye viewport {viewport} is empty")));
        }
        if self.chunk.is_empty() {
            return Err(Error::Config(format!("chunk size {} is empty", self.chunk)));
        }
        if self.chunk.width > viewport.width || self.chunk.height > viewport.height {
            return Err(Error::Config(format!(
                "chunk size {} is larger than eye viewport {viewport}",
                self.chunk
            )));
        }
        if self.budget == 0 {
            return Err(Error::Config("tile budget must be at least 1".to_string()));
        }
        if self.occlusion_block_size == 0 {
            return Err(Error::Config("occlusion block size must be non-zero".to_string()));
        }
        let p = self.projection;
        if !(p.near > 0.0 && p.far > p.near) {
            return Err(Error::Config(format!(
                "invalid clip range near {} far {}",
                p.near, p.far
            )));
        }
        if !(p.fov_y > 0.0 && p.fov_y < std::f32::consts::PI) {
            return Err(Error::Config(format!("invalid vertical fov {}", p.fov_y)));
        }
        if self.volume_size.cmple(Vec3::ZERO).any() {
            return Err(Error::Config(format!(
                "volume size {} must be positive",
                self.volume_size
            )));
        }
        Ok(())
    }

    /// Scheduler setup shared by both eyes.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            viewport: self.eye_viewport,
            chunk: self.chunk,
            budget: self.budget,
            clear_bits: ClearBits::COLOR | ClearBits::DEPTH,
            clear_color: self.clear_color,
        }
    }

    /// Constant transforms for this viewport and projection.
    pub fn volume_frame(&self) -> VolumeFrame {
        VolumeFrame::new(
            self.volume_size,
            self.projection.near,
            self.projection.fov_y,
            self.eye_viewport.aspect(),
        )
    }
}
