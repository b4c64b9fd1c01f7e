//! Scalar volume data and the metadata the renderer derives from it.

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata of a loaded volume, fixed for the lifetime of its texture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Voxel counts per axis
    pub dims: UVec3,
    /// Smallest voxel value
    pub min: f32,
    /// Largest voxel value
    pub max: f32,
}

impl VolumeInfo {
    /// Default ray step size in normalized texture units: half a voxel along x.
    #[inline]
    pub fn default_step_size(&self) -> f32 {
        1.0 / (2.0 * self.dims.x.max(1) as f32)
    }

    /// Default windowing range, the full value range of the data.
    #[inline]
    pub const fn default_window(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Span of voxel values
    #[inline]
    pub fn value_range(&self) -> f32 {
        self.max - self.min
    }
}

/// Dense scalar volume in x-fastest order.
#[derive(Clone, Debug)]
pub struct VolumeData {
    dims: UVec3,
    voxels: Vec<f32>,
    min: f32,
    max: f32,
}

impl VolumeData {
    /// Wrap voxel values, computing their range.
    pub fn new(dims: UVec3, voxels: Vec<f32>) -> Result<Self> {
        if dims.cmpeq(UVec3::ZERO).any() {
            return Err(Error::InvalidData(format!("volume dimensions {dims} are empty")));
        }
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if voxels.len() != expected {
            return Err(Error::InvalidData(format!(
                "volume {dims} needs {expected} voxels, got {}",
                voxels.len()
            )));
        }

        let (min, max) = voxels
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });

        Ok(Self {
            dims,
            voxels,
            min,
            max,
        })
    }

    /// Build a volume by evaluating `f` at every voxel center in `[0, 1]^3`.
    pub fn from_fn(dims: UVec3, mut f: impl FnMut(Vec3) -> f32) -> Result<Self> {
        let size = dims.as_vec3();
        let mut voxels = Vec::with_capacity(dims.x as usize * dims.y as usize * dims.z as usize);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let p = (UVec3::new(x, y, z).as_vec3() + 0.5) / size;
                    voxels.push(f(p));
                }
            }
        }
        Self::new(dims, voxels)
    }

    /// Synthetic CT-like head: skin, skull shell, brain tissue and two ventricles.
    ///
    /// Values are in the same range as the CT presets of the transfer function.
    pub fn head_phantom(dims: UVec3) -> Result<Self> {
        const RADII: Vec3 = Vec3::new(0.78, 0.9, 0.72);
        Self::from_fn(dims, |p| {
            let c = (p - 0.5) * 2.0;
            let r = (c / RADII).length();
            if r > 1.0 {
                return 0.0;
            }
            if r > 0.94 {
                return 900.0;
            }
            if r > 0.84 {
                return 2300.0;
            }
            let left = ((c - Vec3::new(-0.16, 0.1, 0.0)) / Vec3::new(0.1, 0.25, 0.18)).length();
            let right = ((c - Vec3::new(0.16, 0.1, 0.0)) / Vec3::new(0.1, 0.25, 0.18)).length();
            if left < 1.0 || right < 1.0 {
                300.0
            } else {
                1050.0 + 80.0 * (c.y * 6.0).sin()
            }
        })
    }

    #[inline]
    pub const fn dims(&self) -> UVec3 {
        self.dims
    }

    #[inline]
    pub fn voxels(&self) -> &[f32] {
        &self.voxels
    }

    /// Metadata for the renderer
    #[inline]
    pub const fn info(&self) -> VolumeInfo {
        VolumeInfo {
            dims: self.dims,
            min: self.min,
            max: self.max,
        }
    }

    #[inline]
    fn voxel(&self, x: u32, y: u32, z: u32) -> f32 {
        let index = x as usize
            + y as usize * self.dims.x as usize
            + z as usize * self.dims.x as usize * self.dims.y as usize;
        self.voxels[index]
    }

    /// Trilinear sample at normalized texture coordinates, clamped to the edge.
    pub fn sample(&self, uvw: Vec3) -> f32 {
        let size = self.dims.as_vec3();
        let max_index = size - 1.0;
        let p = (uvw * size - 0.5).clamp(Vec3::ZERO, max_index);
        let base = p.floor();
        let frac = p - base;
        let i0 = base.as_uvec3();
        let i1 = (i0 + 1).min(self.dims - 1);

        let c000 = self.voxel(i0.x, i0.y, i0.z);
        let c100 = self.voxel(i1.x, i0.y, i0.z);
        let c010 = self.voxel(i0.x, i1.y, i0.z);
        let c110 = self.voxel(i1.x, i1.y, i0.z);
        let c001 = self.voxel(i0.x, i0.y, i1.z);
        let c101 = self.voxel(i1.x, i0.y, i1.z);
        let c011 = self.voxel(i0.x, i1.y, i1.z);
        let c111 = self.voxel(i1.x, i1.y, i1.z);

        let c00 = c000 + (c100 - c000) * frac.x;
        let c10 = c010 + (c110 - c010) * frac.x;
        let c01 = c001 + (c101 - c001) * frac.x;
        let c11 = c011 + (c111 - c011) * frac.x;
        let c0 = c00 + (c10 - c00) * frac.y;
        let c1 = c01 + (c11 - c01) * frac.y;
        c0 + (c1 - c0) * frac.z
    }
}
