//! Pixel-space geometry for viewports and tiles.

use bytemuck::{Pod, Zeroable};
use glam::UVec2;
use serde::{Deserialize, Serialize};

/// Size of a render target or viewport in pixels.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    /// Create a new viewport size
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered
    #[inline]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns true if either dimension is zero
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height
    #[inline]
    pub fn aspect(self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Check whether a pixel coordinate lies inside the viewport
    #[inline]
    pub const fn contains(self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Linear index of a pixel in row-major storage
    #[inline]
    pub const fn index(self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// The full viewport as a rectangle at the origin
    #[inline]
    pub const fn rect(self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    #[inline]
    pub const fn as_uvec2(self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }
}

impl From<UVec2> for ViewportSize {
    fn from(v: UVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

impl std::fmt::Display for ViewportSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned pixel rectangle, half-open on the right and bottom edges.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Create a new rectangle
    #[inline]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// One past the last column
    #[inline]
    pub const fn right(self) -> u32 {
        self.x + self.width
    }

    /// One past the last row
    #[inline]
    pub const fn bottom(self) -> u32 {
        self.y + self.height
    }

    #[inline]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check if a pixel lies inside the rectangle
    #[inline]
    pub const fn contains(self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Check if another rectangle lies completely inside this one
    #[inline]
    pub const fn contains_rect(self, other: Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Check if two rectangles share at least one pixel
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Clamp the rectangle so it does not extend past the viewport.
    #[must_use]
    pub fn clamp_to(self, viewport: ViewportSize) -> Self {
        let x = self.x.min(viewport.width);
        let y = self.y.min(viewport.height);
        Self {
            x,
            y,
            width: self.right().min(viewport.width) - x,
            height: self.bottom().min(viewport.height) - y,
        }
    }

    /// Check if a pixel lies on the rectangle's outline.
    pub const fn is_border_pixel(self, x: u32, y: u32) -> bool {
        self.contains(x, y)
            && (x == self.x || y == self.y || x + 1 == self.right() || y + 1 == self.bottom())
    }

    /// Iterate over all pixel coordinates in row-major order.
    pub fn pixels(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y..self.bottom()).flat_map(move |y| (self.x..self.right()).map(move |x| (x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_index_is_row_major() {
        let viewport = ViewportSize::new(4, 3);
        assert_eq!(viewport.index(0, 0), 0);
        assert_eq!(viewport.index(3, 0), 3);
        assert_eq!(viewport.index(0, 1), 4);
        assert_eq!(viewport.index(3, 2), 11);
        assert_eq!(viewport.area(), 12);
    }

    #[test]
    fn empty_viewport() {
        assert!(ViewportSize::new(0, 10).is_empty());
        assert!(ViewportSize::new(10, 0).is_empty());
        assert!(!ViewportSize::new(1, 1).is_empty());
    }

    #[test]
    fn rect_edges_are_half_open() {
        let rect = PixelRect::new(2, 3, 4, 5);
        assert_eq!(rect.right(), 6);
        assert_eq!(rect.bottom(), 8);
        assert!(rect.contains(2, 3));
        assert!(rect.contains(5, 7));
        assert!(!rect.contains(6, 7));
        assert!(!rect.contains(5, 8));
    }

    #[test]
    fn rect_intersection() {
        let a = PixelRect::new(0, 0, 10, 10);
        let b = PixelRect::new(10, 0, 10, 10);
        let c = PixelRect::new(9, 9, 2, 2);
        assert!(!a.intersects(b));
        assert!(a.intersects(c));
        assert!(b.intersects(c));
        assert!(!a.intersects(PixelRect::new(3, 3, 0, 4)));
    }

    #[test]
    fn clamp_to_viewport() {
        let viewport = ViewportSize::new(200, 100);
        let rect = PixelRect::new(192, 96, 96, 96).clamp_to(viewport);
        assert_eq!(rect, PixelRect::new(192, 96, 8, 4));
        assert!(viewport.rect().contains_rect(rect));
    }

    #[test]
    fn border_pixels() {
        let rect = PixelRect::new(0, 0, 3, 3);
        let border: Vec<_> = rect.pixels().filter(|&(x, y)| rect.is_border_pixel(x, y)).collect();
        assert_eq!(border.len(), 8);
        assert!(!rect.is_border_pixel(1, 1));
    }

    #[test]
    fn pixel_iteration_covers_area() {
        let rect = PixelRect::new(5, 7, 3, 2);
        let pixels: Vec<_> = rect.pixels().collect();
        assert_eq!(pixels.len() as u64, rect.area());
        assert_eq!(pixels.first(), Some(&(5, 7)));
        assert_eq!(pixels.last(), Some(&(7, 8)));
    }
}
