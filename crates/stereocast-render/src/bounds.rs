//! Geometry bounds pass: per-pixel entry and exit points of the volume box.

use glam::Vec4;
use rayon::prelude::*;
use stereocast_core::math::Aabb;
use stereocast_core::{Error, Result, ViewportSize};

use crate::raycast::{eye_ray, UvwTexel};
use crate::transform::{pixel_to_screen, TransformSnapshot};

/// Texel stored where the eye ray misses the volume.
pub const MISS_TEXEL: UvwTexel = Vec4::new(0.0, 0.0, 0.0, -1.0);

/// Front and back uvw maps of one eye.
#[derive(Clone, Debug)]
pub struct UvwMap {
    viewport: ViewportSize,
    front: Vec<UvwTexel>,
    back: Vec<UvwTexel>,
}

impl UvwMap {
    pub fn new(viewport: ViewportSize) -> Result<Self> {
        if viewport.is_empty() {
            return Err(Error::Config(format!("viewport {viewport} is empty")));
        }
        let len = viewport.area() as usize;
        Ok(Self {
            viewport,
            front: vec![MISS_TEXEL; len],
            back: vec![MISS_TEXEL; len],
        })
    }

    #[inline]
    pub const fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    #[inline]
    pub fn front(&self) -> &[UvwTexel] {
        &self.front
    }

    #[inline]
    pub fn back(&self) -> &[UvwTexel] {
        &self.back
    }

    /// Entry and exit texels of a pixel.
    #[inline]
    pub fn texels(&self, x: u32, y: u32) -> (UvwTexel, UvwTexel) {
        let i = self.viewport.index(x, y);
        (self.front[i], self.back[i])
    }

    /// Number of pixels whose ray hits the volume
    pub fn coverage(&self) -> usize {
        self.front.iter().filter(|t| t.w >= 0.0).count()
    }

    /// Rasterize the volume bounds for a snapshot.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn render(&mut self, snapshot: &TransformSnapshot) {
        let viewport = self.viewport;
        let width = viewport.width as usize;

        self.front
            .par_chunks_mut(width)
            .zip(self.back.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (front_row, back_row))| {
                for (x, (front, back)) in front_row.iter_mut().zip(back_row.iter_mut()).enumerate()
                {
                    let screen = pixel_to_screen(viewport, x as u32, y as u32);
                    let ray = eye_ray(snapshot, screen);
                    match Aabb::UNIT.intersect_ray(&ray) {
                        Some((t_near, t_far)) if t_far > t_near => {
                            *front = ray.at(t_near).extend(t_near);
                            *back = ray.at(t_far).extend(t_far);
                        }
                        _ => {
                            *front = MISS_TEXEL;
                            *back = MISS_TEXEL;
                        }
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformInputs, VolumeFrame, DEFAULT_VOLUME_SIZE};
    use approx::assert_relative_eq;
    use glam::{Mat4, Vec3};

    fn snapshot() -> TransformSnapshot {
        VolumeFrame::new(DEFAULT_VOLUME_SIZE, 0.1, 45f32.to_radians(), 1.0).capture(
            &TransformInputs {
                model: Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
                view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
                projection: Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 10.0),
            },
        )
    }

    #[test]
    fn center_pixel_enters_front_face() {
        let mut map = UvwMap::new(ViewportSize::new(33, 33)).unwrap();
        map.render(&snapshot());
        let (front, back) = map.texels(16, 16);
        assert_relative_eq!(front.w, 5.0, epsilon = 1e-3);
        assert_relative_eq!(back.w, 7.0, epsilon = 1e-3);
        assert_relative_eq!(front.x, 0.5, epsilon = 1e-3);
        // Model +z faces the eye and becomes texture y = 0.
        assert_relative_eq!(front.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(back.y, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn corners_miss_the_volume() {
        let mut map = UvwMap::new(ViewportSize::new(64, 64)).unwrap();
        map.render(&snapshot());
        assert_eq!(map.texels(0, 0), (MISS_TEXEL, MISS_TEXEL));
        assert_eq!(map.texels(63, 63), (MISS_TEXEL, MISS_TEXEL));
        let covered = map.coverage();
        assert!(covered > 0 && covered < 64 * 64);
    }

    #[test]
    fn entry_precedes_exit() {
        let mut map = UvwMap::new(ViewportSize::new(40, 40)).unwrap();
        map.render(&snapshot());
        for (front, back) in map.front().iter().zip(map.back()) {
            if front.w >= 0.0 {
                assert!(back.w > front.w);
            }
        }
    }

    #[test]
    fn empty_viewport_is_rejected() {
        assert!(UvwMap::new(ViewportSize::new(0, 4)).is_err());
    }
}
