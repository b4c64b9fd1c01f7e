//! Per-eye CPU render targets: color plus first-hit distance.

use glam::Vec4;
use stereocast_core::{Error, PixelRect, Result, ViewportSize};

use crate::scheduler::ClearBits;

/// Color and first-hit attachments of one eye.
#[derive(Clone, Debug)]
pub struct EyeTarget {
    viewport: ViewportSize,
    color: Vec<Vec4>,
    first_hit: Vec<f32>,
}

impl EyeTarget {
    pub fn new(viewport: ViewportSize) -> Result<Self> {
        if viewport.is_empty() {
            return Err(Error::Config(format!("viewport {viewport} is empty")));
        }
        let len = viewport.area() as usize;
        Ok(Self {
            viewport,
            color: vec![Vec4::ZERO; len],
            first_hit: vec![f32::INFINITY; len],
        })
    }

    #[inline]
    pub const fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    #[inline]
    pub fn color(&self) -> &[Vec4] {
        &self.color
    }

    #[inline]
    pub fn first_hit(&self) -> &[f32] {
        &self.first_hit
    }

    /// Clear the selected attachments. Depth clears to `+inf` (no hit).
    pub fn clear(&mut self, bits: ClearBits, color: Vec4) {
        if bits.contains(ClearBits::COLOR) {
            self.color.fill(color);
        }
        if bits.contains(ClearBits::DEPTH) {
            self.first_hit.fill(f32::INFINITY);
        }
    }

    /// Mutable rows of a rectangle, top to bottom, for both attachments.
    pub fn rows_mut<'a>(
        &'a mut self,
        rect: PixelRect,
    ) -> Result<impl Iterator<Item = (u32, &'a mut [Vec4], &'a mut [f32])> + 'a> {
        if !self.viewport.rect().contains_rect(rect) {
            return Err(Error::OutOfBounds(format!(
                "rect {rect:?} outside viewport {}",
                self.viewport
            )));
        }
        let width = self.viewport.width as usize;
        let x0 = rect.x as usize;
        let x1 = x0 + rect.width as usize;
        let rows = rect.y as usize..rect.bottom() as usize;

        Ok(self
            .color
            .chunks_mut(width)
            .zip(self.first_hit.chunks_mut(width))
            .enumerate()
            .skip(rows.start)
            .take(rows.len())
            .map(move |(y, (color, depth))| (y as u32, &mut color[x0..x1], &mut depth[x0..x1])))
    }

    /// Color as RGBA8 over a background, alpha forced to opaque.
    ///
    /// Colors are premultiplied, so the background shows through by
    /// `1 - alpha`.
    pub fn to_rgba8(&self, background: Vec4) -> Vec<u8> {
        self.color
            .iter()
            .flat_map(|c| {
                let rgb = c.truncate() + background.truncate() * (1.0 - c.w);
                pack_rgba8(rgb.extend(1.0))
            })
            .collect()
    }
}

/// Quantize a color in `[0, 1]` to bytes.
#[inline]
pub fn pack_rgba8(color: Vec4) -> [u8; 4] {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_selects_attachments() {
        let mut target = EyeTarget::new(ViewportSize::new(4, 4)).unwrap();
        target.clear(ClearBits::COLOR, Vec4::ONE);
        assert!(target.color().iter().all(|c| *c == Vec4::ONE));
        assert!(target.first_hit().iter().all(|d| d.is_infinite()));

        for (_, _, depth) in target.rows_mut(PixelRect::new(0, 0, 4, 4)).unwrap() {
            depth.fill(1.0);
        }
        target.clear(ClearBits::DEPTH, Vec4::ZERO);
        assert!(target.first_hit().iter().all(|d| d.is_infinite()));
        assert!(target.color().iter().all(|c| *c == Vec4::ONE));
    }

    #[test]
    fn rows_cover_only_the_rect() {
        let mut target = EyeTarget::new(ViewportSize::new(8, 6)).unwrap();
        let rect = PixelRect::new(2, 1, 3, 2);
        let mut seen = Vec::new();
        for (y, color, _) in target.rows_mut(rect).unwrap() {
            seen.push(y);
            color.fill(Vec4::ONE);
        }
        assert_eq!(seen, vec![1, 2]);

        let viewport = target.viewport();
        for (x, y) in viewport.rect().pixels() {
            let written = target.color()[viewport.index(x, y)] == Vec4::ONE;
            assert_eq!(written, rect.contains(x, y), "pixel ({x}, {y})");
        }
    }

    #[test]
    fn rect_outside_viewport_is_rejected() {
        let mut target = EyeTarget::new(ViewportSize::new(8, 8)).unwrap();
        assert!(target.rows_mut(PixelRect::new(6, 0, 4, 4)).is_err());
    }

    #[test]
    fn rgba8_blends_background() {
        let mut target = EyeTarget::new(ViewportSize::new(1, 1)).unwrap();
        target.clear(ClearBits::COLOR, Vec4::new(0.5, 0.0, 0.0, 0.5));
        let bytes = target.to_rgba8(Vec4::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(bytes, vec![128, 0, 128, 255]);
    }
}
