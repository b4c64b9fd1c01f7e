//! Debug views for the mirror output.
//!
//! Each eye can show its color target or one of the intermediate buffers a
//! sweep reads, cycled with F3 in the viewer.

use glam::{Vec3, Vec4};
use image::RgbaImage;
use stereocast_core::{Error, Result};

use crate::bounds::UvwMap;
use crate::occlusion::{OcclusionHint, OcclusionHintMap};
use crate::target::{pack_rgba8, EyeTarget};

/// Buffer shown for an eye.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugView {
    /// Raycast color over the background (default).
    #[default]
    Color = 0,
    /// First-hit distance as grayscale, near is bright.
    FirstHit = 1,
    /// Entry texture coordinates as RGB.
    UvwFront = 2,
    /// Exit texture coordinates as RGB.
    UvwBack = 3,
    /// Occlusion hint depth per block.
    Occlusion = 4,
}

impl DebugView {
    /// Cycle to the next view.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Color => Self::FirstHit,
            Self::FirstHit => Self::UvwFront,
            Self::UvwFront => Self::UvwBack,
            Self::UvwBack => Self::Occlusion,
            Self::Occlusion => Self::Color,
        }
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Buffers a debug view can read from.
#[derive(Clone, Copy)]
pub struct DebugSources<'a> {
    pub target: &'a EyeTarget,
    pub bounds: &'a UvwMap,
    pub hints: &'a OcclusionHintMap,
    pub background: Vec4,
    /// View distance shown as black
    pub depth_scale: f32,
}

/// Grayscale for a view distance; misses are black.
#[inline]
fn depth_gray(depth: f32, depth_scale: f32) -> Vec4 {
    if !depth.is_finite() || depth_scale <= 0.0 {
        return Vec4::new(0.0, 0.0, 0.0, 1.0);
    }
    let g = 1.0 - (depth / depth_scale).clamp(0.0, 1.0);
    Vec3::splat(g).extend(1.0)
}

#[inline]
fn uvw_color(texel: Vec4) -> Vec4 {
    if texel.w < 0.0 {
        Vec4::new(0.0, 0.0, 0.0, 1.0)
    } else {
        texel.truncate().extend(1.0)
    }
}

/// Render a debug view to an RGBA8 image of the target's size.
pub fn debug_image(view: DebugView, sources: &DebugSources<'_>) -> Result<RgbaImage> {
    let viewport = sources.target.viewport();
    if sources.bounds.viewport() != viewport || sources.hints.viewport() != viewport {
        return Err(Error::InvalidState(format!(
            "debug sources do not match target {viewport}"
        )));
    }

    let bytes = match view {
        DebugView::Color => sources.target.to_rgba8(sources.background),
        DebugView::FirstHit => sources
            .target
            .first_hit()
            .iter()
            .flat_map(|&d| pack_rgba8(depth_gray(d, sources.depth_scale)))
            .collect(),
        DebugView::UvwFront => sources
            .bounds
            .front()
            .iter()
            .flat_map(|&t| pack_rgba8(uvw_color(t)))
            .collect(),
        DebugView::UvwBack => sources
            .bounds
            .back()
            .iter()
            .flat_map(|&t| pack_rgba8(uvw_color(t)))
            .collect(),
        DebugView::Occlusion => viewport
            .rect()
            .pixels()
            .flat_map(|(x, y)| {
                let color = match sources.hints.hint_at_pixel(x, y) {
                    OcclusionHint::Depth(d) => depth_gray(d, sources.depth_scale),
                    // Unknown blocks are marked blue
                    OcclusionHint::Unknown => Vec4::new(0.0, 0.0, 0.5, 1.0),
                };
                pack_rgba8(color)
            })
            .collect(),
    };

    RgbaImage::from_raw(viewport.width, viewport.height, bytes)
        .ok_or_else(|| Error::InvalidData(format!("debug image does not fit {viewport}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ClearBits;
    use stereocast_core::ViewportSize;

    #[test]
    fn views_cycle_back_to_color() {
        let mut view = DebugView::default();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(view.as_u32());
            view = view.next();
        }
        assert_eq!(view, DebugView::Color);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn depth_gray_scales_and_clamps() {
        assert_eq!(depth_gray(0.0, 5.0), Vec4::ONE);
        assert_eq!(depth_gray(10.0, 5.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(depth_gray(f32::INFINITY, 5.0).x, 0.0);
        assert_eq!(depth_gray(2.5, 5.0).x, 0.5);
    }

    #[test]
    fn images_match_the_viewport() {
        let viewport = ViewportSize::new(12, 6);
        let mut target = EyeTarget::new(viewport).unwrap();
        target.clear(ClearBits::COLOR, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let bounds = UvwMap::new(viewport).unwrap();
        let hints = OcclusionHintMap::new(viewport, 6).unwrap();
        let sources = DebugSources {
            target: &target,
            bounds: &bounds,
            hints: &hints,
            background: Vec4::ZERO,
            depth_scale: 5.0,
        };

        let mut view = DebugView::Color;
        for _ in 0..5 {
            let image = debug_image(view, &sources).unwrap();
            assert_eq!(image.dimensions(), (12, 6));
            view = view.next();
        }

        let color = debug_image(DebugView::Color, &sources).unwrap();
        assert_eq!(color.get_pixel(3, 3).0, [255, 0, 0, 255]);
        let occlusion = debug_image(DebugView::Occlusion, &sources).unwrap();
        assert_eq!(occlusion.get_pixel(0, 0).0, [0, 0, 128, 255]);
    }

    #[test]
    fn mismatched_sources_are_rejected() {
        let target = EyeTarget::new(ViewportSize::new(8, 8)).unwrap();
        let bounds = UvwMap::new(ViewportSize::new(4, 4)).unwrap();
        let hints = OcclusionHintMap::new(ViewportSize::new(8, 8), 6).unwrap();
        let sources = DebugSources {
            target: &target,
            bounds: &bounds,
            hints: &hints,
            background: Vec4::ZERO,
            depth_scale: 5.0,
        };
        assert!(debug_image(DebugView::UvwBack, &sources).is_err());
    }
}
