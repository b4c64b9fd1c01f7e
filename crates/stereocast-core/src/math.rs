//! Ray and bounding-box math used by the bounds and raycast passes.

use glam::{Mat4, Vec3};

/// Ray for raycasting operations.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray with a normalized direction
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Create a ray keeping the direction's length.
    ///
    /// The ray parameter is then measured in multiples of `direction`, which
    /// lets a ray carry the scale of another space (e.g. view-space distance
    /// while marching in texture space).
    #[inline]
    pub const fn scaled(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get a point along the ray at parameter t
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform ray by an affine matrix, keeping the parameterization
    #[inline]
    pub fn transform(&self, matrix: Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, Default)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// The normalized texture-space volume, `[0, 1]^3`
    pub const UNIT: Self = Self::new(Vec3::ZERO, Vec3::ONE);

    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at origin with given half-extents
    #[inline]
    pub fn from_half_extents(half_extents: Vec3) -> Self {
        Self {
            min: -half_extents,
            max: half_extents,
        }
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Ray-AABB slab test, returns `(t_near, t_far)` or None if no intersection.
    ///
    /// `t_near` is clamped to zero when the origin lies inside the box.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let inv_dir = Vec3::ONE / ray.direction;

        let t1 = (self.min - ray.origin) * inv_dir;
        let t2 = (self.max - ray.origin) * inv_dir;

        let t_min = t1.min(t2);
        let t_max = t1.max(t2);

        let t_near = t_min.max_element();
        let t_far = t_max.min_element();

        if t_near <= t_far && t_far >= 0.0 {
            Some((t_near.max(0.0), t_far))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(5.0), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn scaled_ray_keeps_length() {
        let ray = Ray::scaled(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(ray.at(1.5), Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn transform_preserves_parameter() {
        let ray = Ray::scaled(Vec3::ZERO, Vec3::X);
        let m = Mat4::from_scale(Vec3::splat(2.0)) * Mat4::from_translation(Vec3::Y);
        let moved = ray.transform(m);
        assert_relative_eq!(moved.at(3.0).x, m.transform_point3(ray.at(3.0)).x);
        assert_relative_eq!(moved.at(3.0).y, 2.0);
    }

    #[test]
    fn aabb_contains_point() {
        let aabb = Aabb::UNIT;
        assert!(aabb.contains_point(Vec3::splat(0.5)));
        assert!(aabb.contains_point(Vec3::ZERO));
        assert!(aabb.contains_point(Vec3::ONE));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.5, 0.5)));
    }

    #[test]
    fn aabb_ray_intersection() {
        let aabb = Aabb::UNIT;

        let ray = Ray::new(Vec3::new(-1.0, 0.5, 0.5), Vec3::X);
        let (t_near, t_far) = aabb.intersect_ray(&ray).unwrap();
        assert_relative_eq!(t_near, 1.0, epsilon = 1e-5);
        assert_relative_eq!(t_far, 2.0, epsilon = 1e-5);

        let ray = Ray::new(Vec3::new(-1.0, 2.0, 0.5), Vec3::X);
        assert!(aabb.intersect_ray(&ray).is_none());
    }

    #[test]
    fn origin_inside_box_starts_at_zero() {
        let ray = Ray::new(Vec3::splat(0.5), Vec3::Z);
        let (t_near, t_far) = Aabb::UNIT.intersect_ray(&ray).unwrap();
        assert_eq!(t_near, 0.0);
        assert_relative_eq!(t_far, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn box_behind_ray_misses() {
        let ray = Ray::new(Vec3::new(2.0, 0.5, 0.5), Vec3::X);
        assert!(Aabb::UNIT.intersect_ray(&ray).is_none());
    }

    #[test]
    fn half_extents_center() {
        let aabb = Aabb::from_half_extents(Vec3::new(1.0, 0.886, 1.0));
        assert_eq!(aabb.center(), Vec3::ZERO);
        assert_relative_eq!(aabb.size().y, 1.772, epsilon = 1e-5);
    }
}
