//! Occlusion hints reprojected from the previous sweep.
//!
//! The previous sweep's first-hit distances are reduced to one value per
//! coarse block, carried into the new pose and stored per block of the new
//! viewport. The raycaster may then skip empty space in front of a hint.
//! Hints are a heuristic: anything that cannot be reprojected is
//! [`OcclusionHint::Unknown`] and rendered in full.

use glam::Vec3;
use rayon::prelude::*;
use stereocast_core::{Error, Result, ViewportSize};
use tracing::trace;

use crate::transform::{pixel_to_screen, screen_to_pixel, TransformSnapshot};

/// Default edge length of an occlusion block in pixels.
pub const DEFAULT_BLOCK_SIZE: u32 = 6;

/// Visibility estimate for one block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OcclusionHint {
    /// Nothing known: treat the block as fully visible.
    Unknown,
    /// Estimated view-space distance of the nearest surface in the block.
    Depth(f32),
}

impl OcclusionHint {
    /// Distance to start marching from, given a safety bias.
    #[inline]
    pub fn start_distance(self, depth_bias: f32) -> Option<f32> {
        match self {
            Self::Unknown => None,
            Self::Depth(d) => Some((d - depth_bias).max(0.0)),
        }
    }
}

/// One hint per block of an eye viewport.
#[derive(Clone, Debug)]
pub struct OcclusionHintMap {
    viewport: ViewportSize,
    block_size: u32,
    columns: u32,
    rows: u32,
    /// `+inf` marks an unknown cell
    cells: Vec<f32>,
}

impl OcclusionHintMap {
    pub fn new(viewport: ViewportSize, block_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Config("occlusion block size must be non-zero".to_string()));
        }
        if viewport.is_empty() {
            return Err(Error::Config(format!("viewport {viewport} is empty")));
        }
        let columns = viewport.width.div_ceil(block_size);
        let rows = viewport.height.div_ceil(block_size);
        Ok(Self {
            viewport,
            block_size,
            columns,
            rows,
            cells: vec![f32::INFINITY; columns as usize * rows as usize],
        })
    }

    #[inline]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    #[inline]
    pub const fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    /// Block grid dimensions
    #[inline]
    pub const fn grid(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    /// Forget every hint.
    pub fn clear(&mut self) {
        self.cells.fill(f32::INFINITY);
    }

    /// Row-major cell depths, `+inf` where unknown.
    #[inline]
    pub fn cells(&self) -> &[f32] {
        &self.cells
    }

    /// Number of cells holding a depth
    pub fn known_cells(&self) -> usize {
        self.cells.iter().filter(|d| d.is_finite()).count()
    }

    /// Hint of a block. Coordinates outside the grid yield `Unknown`.
    pub fn lookup(&self, column: i32, row: i32) -> OcclusionHint {
        if column < 0 || row < 0 || column as u32 >= self.columns || row as u32 >= self.rows {
            return OcclusionHint::Unknown;
        }
        let d = self.cells[row as usize * self.columns as usize + column as usize];
        if d.is_finite() {
            OcclusionHint::Depth(d)
        } else {
            OcclusionHint::Unknown
        }
    }

    /// Hint of the block containing a pixel.
    #[inline]
    pub fn hint_at_pixel(&self, x: u32, y: u32) -> OcclusionHint {
        self.lookup(
            i32::try_from(x / self.block_size).unwrap_or(i32::MAX),
            i32::try_from(y / self.block_size).unwrap_or(i32::MAX),
        )
    }

    fn store_min(&mut self, column: u32, row: u32, depth: f32) {
        let cell = &mut self.cells[row as usize * self.columns as usize + column as usize];
        *cell = cell.min(depth);
    }

    /// Rebuild the map from the previous sweep's first-hit buffer.
    ///
    /// `first_hit` holds one view-space distance per pixel of the previous
    /// sweep's viewport, `+inf` where no ray hit anything. The previous
    /// viewport is assumed to match this map's viewport.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn reproject(
        &mut self,
        first_hit: &[f32],
        previous: &TransformSnapshot,
        next: &TransformSnapshot,
    ) -> Result<()> {
        let viewport = self.viewport;
        if first_hit.len() != viewport.area() as usize {
            return Err(Error::InvalidData(format!(
                "first-hit buffer has {} texels, viewport {viewport} needs {}",
                first_hit.len(),
                viewport.area()
            )));
        }

        self.clear();
        let old_to_new = next.old_view_to_new_view(previous);
        let block = self.block_size;
        let columns = self.columns;

        // Per source block: nearest finite first hit, then its new cell.
        let targets: Vec<(u32, u32, f32)> = (0..self.rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..columns).filter_map(move |column| {
                    let depth = block_min_depth(first_hit, viewport, block, column, row)?;
                    let cx = (column * block + block / 2).min(viewport.width - 1);
                    let cy = (row * block + block / 2).min(viewport.height - 1);
                    let screen = pixel_to_screen(viewport, cx, cy);
                    let dir = previous
                        .screen_to_view
                        .transform_point3(Vec3::new(screen.x, screen.y, 0.0))
                        .normalize_or_zero();
                    let old_view = dir * depth;
                    let new_view = old_to_new.transform_point3(old_view);
                    let clip = next.projection * new_view.extend(1.0);
                    if clip.w <= 0.0 {
                        return None;
                    }
                    let ndc = clip.truncate() / clip.w;
                    let (px, py) =
                        screen_to_pixel(viewport, (ndc.truncate() + 1.0) * 0.5)?;
                    Some((px / block, py / block, new_view.length()))
                })
            })
            .collect();

        for &(column, row, depth) in &targets {
            self.store_min(column, row, depth);
        }

        trace!(
            "Reprojected {} of {} occlusion blocks",
            targets.len(),
            self.cells.len()
        );
        Ok(())
    }
}

fn block_min_depth(
    first_hit: &[f32],
    viewport: ViewportSize,
    block: u32,
    column: u32,
    row: u32,
) -> Option<f32> {
    let x0 = column * block;
    let y0 = row * block;
    let x1 = (x0 + block).min(viewport.width);
    let y1 = (y0 + block).min(viewport.height);
    let mut nearest = f32::INFINITY;
    for y in y0..y1 {
        for x in x0..x1 {
            nearest = nearest.min(first_hit[viewport.index(x, y)]);
        }
    }
    nearest.is_finite().then_some(nearest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformInputs, VolumeFrame, DEFAULT_VOLUME_SIZE};
    use glam::Mat4;

    fn looking_at(eye: Vec3, target: Vec3) -> TransformSnapshot {
        VolumeFrame::new(DEFAULT_VOLUME_SIZE, 0.1, 45f32.to_radians(), 1.0).capture(
            &TransformInputs {
                model: Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
                view: Mat4::look_at_rh(eye, target, Vec3::Y),
                projection: Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 10.0),
            },
        )
    }

    fn snapshot(eye_x: f32) -> TransformSnapshot {
        looking_at(Vec3::new(eye_x, 0.0, 3.0), Vec3::ZERO)
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(OcclusionHintMap::new(ViewportSize::new(64, 64), 0).is_err());
    }

    #[test]
    fn grid_rounds_up() {
        let map = OcclusionHintMap::new(ViewportSize::new(200, 100), 6).unwrap();
        assert_eq!(map.grid(), (34, 17));
    }

    #[test]
    fn out_of_range_lookup_is_unknown() {
        let mut map = OcclusionHintMap::new(ViewportSize::new(12, 12), 6).unwrap();
        map.cells.fill(1.0);
        assert_eq!(map.lookup(0, 0), OcclusionHint::Depth(1.0));
        assert_eq!(map.lookup(-1, 0), OcclusionHint::Unknown);
        assert_eq!(map.lookup(0, -1), OcclusionHint::Unknown);
        assert_eq!(map.lookup(2, 0), OcclusionHint::Unknown);
        assert_eq!(map.lookup(0, 2), OcclusionHint::Unknown);
        assert_eq!(map.hint_at_pixel(12, 0), OcclusionHint::Unknown);
    }

    #[test]
    fn fresh_map_is_unknown() {
        let map = OcclusionHintMap::new(ViewportSize::new(32, 32), 4).unwrap();
        assert_eq!(map.known_cells(), 0);
        assert_eq!(map.hint_at_pixel(5, 5), OcclusionHint::Unknown);
    }

    #[test]
    fn static_pose_keeps_hints_in_place() {
        let viewport = ViewportSize::new(48, 48);
        let mut first_hit = vec![f32::INFINITY; viewport.area() as usize];
        for y in 18..30 {
            for x in 18..30 {
                first_hit[viewport.index(x, y)] = 5.0;
            }
        }

        let pose = snapshot(0.0);
        let mut map = OcclusionHintMap::new(viewport, 6).unwrap();
        map.reproject(&first_hit, &pose, &pose).unwrap();

        assert_eq!(map.known_cells(), 4);
        match map.hint_at_pixel(20, 20) {
            OcclusionHint::Depth(d) => assert!((d - 5.0).abs() < 1e-3),
            OcclusionHint::Unknown => panic!("expected a hint at the hit block"),
        }
        assert_eq!(map.hint_at_pixel(0, 0), OcclusionHint::Unknown);
    }

    #[test]
    fn reprojection_keeps_nearest_depth() {
        let viewport = ViewportSize::new(12, 12);
        let mut first_hit = vec![f32::INFINITY; viewport.area() as usize];
        first_hit[viewport.index(2, 2)] = 7.0;
        first_hit[viewport.index(3, 3)] = 4.0;

        let pose = snapshot(0.0);
        let mut map = OcclusionHintMap::new(viewport, 6).unwrap();
        map.reproject(&first_hit, &pose, &pose).unwrap();
        match map.lookup(0, 0) {
            OcclusionHint::Depth(d) => assert!((d - 4.0).abs() < 1e-3),
            OcclusionHint::Unknown => panic!("expected a hint"),
        }
    }

    #[test]
    fn points_leaving_the_view_stay_unknown() {
        let viewport = ViewportSize::new(24, 24);
        let mut first_hit = vec![f32::INFINITY; viewport.area() as usize];
        first_hit[viewport.index(12, 12)] = 6.0;

        // Camera turns around: the old surface ends up behind it.
        let behind = looking_at(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, 10.0));
        let mut map = OcclusionHintMap::new(viewport, 6).unwrap();
        map.reproject(&first_hit, &snapshot(0.0), &behind).unwrap();
        assert_eq!(map.known_cells(), 0);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut map = OcclusionHintMap::new(ViewportSize::new(12, 12), 6).unwrap();
        let pose = snapshot(0.0);
        assert!(map.reproject(&[1.0; 10], &pose, &pose).is_err());
    }

    #[test]
    fn start_distance_applies_bias() {
        assert_eq!(OcclusionHint::Unknown.start_distance(0.05), None);
        assert_eq!(OcclusionHint::Depth(2.0).start_distance(0.5), Some(1.5));
        assert_eq!(OcclusionHint::Depth(0.01).start_distance(0.05), Some(0.0));
    }
}
