//! Raycast parameters and the per-ray marching model.
//!
//! Rays are parameterized by view-space distance from the eye, so first-hit
//! values are comparable across sweeps and between eyes. Marching happens in
//! normalized texture space.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use serde::{Deserialize, Serialize};
use stereocast_core::constants::{EARLY_RAY_TERMINATION_ALPHA, MAX_LOD_STEP_MULTIPLIER};
use stereocast_core::math::Ray;
use stereocast_core::{PixelRect, ViewportSize, VolumeData, VolumeInfo};

use crate::occlusion::OcclusionHint;
use crate::transfer_function::TransferLut;
use crate::transform::TransformSnapshot;

/// Default LOD growth per view-space unit past the ray start.
pub const DEFAULT_LOD_SCALE: f32 = 2.0;
/// Default LOD offset; no coarsening until `bias / scale` units in.
pub const DEFAULT_LOD_BIAS: f32 = 0.25;
/// Default distance kept in front of an occlusion hint.
pub const DEFAULT_DEPTH_BIAS: f32 = 0.05;

/// Tint blended over pixels on a tile border when borders are shown.
pub const CHUNK_BORDER_TINT: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);

/// Typed raycast parameters. Every tile draw reads the latest values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaycastParams {
    /// Base step in normalized texture units
    pub step_size: f32,
    pub lod_scale: f32,
    pub lod_bias: f32,
    pub depth_bias: f32,
    pub window_min: f32,
    pub window_range: f32,
    /// Use occlusion hints to skip empty space
    pub use_occlusion: bool,
    /// Tint tile border pixels
    pub show_chunk_borders: bool,
}

impl RaycastParams {
    /// Defaults derived from the volume: half-voxel steps, full value window.
    pub fn for_volume(info: &VolumeInfo) -> Self {
        let (window_min, window_max) = info.default_window();
        Self {
            step_size: info.default_step_size(),
            lod_scale: DEFAULT_LOD_SCALE,
            lod_bias: DEFAULT_LOD_BIAS,
            depth_bias: DEFAULT_DEPTH_BIAS,
            window_min,
            window_range: window_max - window_min,
            use_occlusion: true,
            show_chunk_borders: false,
        }
    }

    #[must_use]
    pub const fn with_step_size(mut self, step_size: f32) -> Self {
        self.step_size = step_size;
        self
    }

    #[must_use]
    pub const fn with_lod(mut self, scale: f32, bias: f32) -> Self {
        self.lod_scale = scale;
        self.lod_bias = bias;
        self
    }

    #[must_use]
    pub const fn with_window(mut self, min: f32, max: f32) -> Self {
        self.window_min = min;
        self.window_range = max - min;
        self
    }

    pub fn flags(&self) -> RaycastFlags {
        let mut flags = RaycastFlags::empty();
        flags.set(RaycastFlags::OCCLUSION, self.use_occlusion);
        flags.set(RaycastFlags::CHUNK_BORDERS, self.show_chunk_borders);
        flags
    }

    /// Step multiplier at view distance `t` for a ray that started at `t_start`.
    #[inline]
    pub fn step_multiplier(&self, t: f32, t_start: f32) -> f32 {
        let lod = (self.lod_scale * (t - t_start) - self.lod_bias).max(0.0);
        lod.exp2().min(MAX_LOD_STEP_MULTIPLIER)
    }
}

bitflags! {
    /// Shader feature switches packed into the push constants.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RaycastFlags: u32 {
        const OCCLUSION = 1 << 0;
        const CHUNK_BORDERS = 1 << 1;
    }
}

/// Push constants of the tile raycast shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct RaycastPushConstants {
    pub screen_to_texture: [[f32; 4]; 4],
    pub view_to_texture: [[f32; 4]; 4],
    /// x, y, width, height
    pub tile: [u32; 4],
    pub viewport: [u32; 2],
    pub block_size: u32,
    pub flags: u32,
    pub step_size: f32,
    pub lod_scale: f32,
    pub lod_bias: f32,
    pub depth_bias: f32,
    pub window_min: f32,
    pub window_range: f32,
    pub _pad: [f32; 2],
}

/// Byte size of [`RaycastPushConstants`], checked against the device limit.
pub const RAYCAST_PUSH_CONSTANTS_SIZE: u32 = std::mem::size_of::<RaycastPushConstants>() as u32;

impl RaycastPushConstants {
    pub fn new(
        snapshot: &TransformSnapshot,
        params: &RaycastParams,
        tile: PixelRect,
        viewport: ViewportSize,
        block_size: u32,
    ) -> Self {
        Self {
            screen_to_texture: snapshot.screen_to_texture.to_cols_array_2d(),
            view_to_texture: snapshot.view_to_texture.to_cols_array_2d(),
            tile: [tile.x, tile.y, tile.width, tile.height],
            viewport: [viewport.width, viewport.height],
            block_size,
            flags: params.flags().bits(),
            step_size: params.step_size,
            lod_scale: params.lod_scale,
            lod_bias: params.lod_bias,
            depth_bias: params.depth_bias,
            window_min: params.window_min,
            window_range: params.window_range,
            _pad: [0.0; 2],
        }
    }
}

/// Eye ray through a screen coordinate, in texture space.
///
/// The direction is scaled so that the ray parameter is the view-space
/// distance from the eye.
pub fn eye_ray(snapshot: &TransformSnapshot, screen: Vec2) -> Ray {
    let origin = snapshot.texture_eye();
    let near = screen.extend(0.0);
    let near_texture = snapshot.screen_to_texture.transform_point3(near);
    let near_view = snapshot.screen_to_view.transform_point3(near);
    Ray::scaled(origin, (near_texture - origin) / near_view.length())
}

/// Result of marching one ray.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RaySample {
    /// Premultiplied color and accumulated opacity
    pub color: Vec4,
    /// View distance of the first non-transparent sample, `+inf` if none
    pub first_hit: f32,
    /// Number of volume samples taken
    pub samples: u32,
}

impl RaySample {
    pub const MISS: Self = Self {
        color: Vec4::ZERO,
        first_hit: f32::INFINITY,
        samples: 0,
    };
}

/// Texel of a uvw map: texture coordinate in `xyz`, view distance in `w`.
/// A negative `w` marks a ray that misses the volume.
pub type UvwTexel = Vec4;

/// March a ray between its entry and exit texels.
pub fn march(
    volume: &VolumeData,
    lut: &TransferLut,
    params: &RaycastParams,
    front: UvwTexel,
    back: UvwTexel,
    hint: OcclusionHint,
) -> RaySample {
    if front.w < 0.0 || back.w < 0.0 {
        return RaySample::MISS;
    }
    let t_entry = front.w;
    let t_exit = back.w;
    let span = t_exit - t_entry;
    if span <= f32::EPSILON || params.step_size <= 0.0 {
        return RaySample::MISS;
    }

    let entry: Vec3 = front.xyz();
    let direction = (back.xyz() - entry) / span;
    let base_step = params.step_size / direction.length();

    let hinted = if params.use_occlusion {
        hint.start_distance(params.depth_bias)
    } else {
        None
    };
    let t_start = hinted.map_or(t_entry, |h| h.max(t_entry));

    let mut color = Vec4::ZERO;
    let mut first_hit = f32::INFINITY;
    let mut samples = 0;
    let mut t = t_start;

    while t < t_exit {
        let multiplier = params.step_multiplier(t, t_start);
        let position = entry + direction * (t - t_entry);
        let value = volume.sample(position);
        let classified = lut.sample(value, params.window_min, params.window_range);
        samples += 1;

        if classified.w > 0.0 {
            if first_hit.is_infinite() {
                first_hit = t;
            }
            // Opacity is defined per base step; longer steps absorb more.
            let alpha = 1.0 - (1.0 - classified.w.min(1.0)).powf(multiplier);
            let weight = (1.0 - color.w) * alpha;
            color += (classified.xyz() * weight).extend(weight);
            if color.w >= EARLY_RAY_TERMINATION_ALPHA {
                break;
            }
        }

        t += base_step * multiplier;
    }

    RaySample {
        color,
        first_hit,
        samples,
    }
}
