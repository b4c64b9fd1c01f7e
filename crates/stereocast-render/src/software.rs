//! CPU reference tile renderer.
//!
//! Produces the same color and first-hit output the GPU tile pass does, one
//! tile at a time, with rows of a tile raycast in parallel.

use std::sync::Arc;

use glam::Vec4;
use rayon::prelude::*;
use stereocast_core::{Error, Result, ViewportSize, VolumeData};

use crate::raycast::{march, CHUNK_BORDER_TINT};
use crate::scheduler::{ClearBits, TileDraw, TileRenderer};
use crate::target::EyeTarget;

/// Tile renderer writing into a CPU [`EyeTarget`].
pub struct SoftwareTileRenderer {
    volume: Arc<VolumeData>,
    target: EyeTarget,
    samples: u64,
}

impl SoftwareTileRenderer {
    pub fn new(volume: Arc<VolumeData>, viewport: ViewportSize) -> Result<Self> {
        Ok(Self {
            volume,
            target: EyeTarget::new(viewport)?,
            samples: 0,
        })
    }

    #[inline]
    pub const fn target(&self) -> &EyeTarget {
        &self.target
    }

    #[inline]
    pub fn volume(&self) -> &VolumeData {
        &self.volume
    }

    /// Total volume samples taken so far
    #[inline]
    pub const fn samples(&self) -> u64 {
        self.samples
    }
}

impl TileRenderer for SoftwareTileRenderer {
    fn clear(&mut self, bits: ClearBits, color: Vec4) -> Result<()> {
        self.target.clear(bits, color);
        Ok(())
    }

    fn draw_tile(&mut self, draw: &TileDraw<'_>) -> Result<()> {
        let resources = draw.resources;
        let viewport = self.target.viewport();
        if resources.bounds.viewport() != viewport || resources.hints.viewport() != viewport {
            return Err(Error::InvalidState(format!(
                "{} eye sweep inputs do not match target {viewport}",
                draw.eye
            )));
        }

        let rect = draw.tile.rect;
        let params = resources.params;
        let volume = &*self.volume;
        let rows: Vec<_> = self.target.rows_mut(rect)?.collect();

        let samples: u64 = rows
            .into_par_iter()
            .map(|(y, colors, depths)| {
                let mut samples = 0u64;
                for (i, (color, depth)) in colors.iter_mut().zip(depths.iter_mut()).enumerate() {
                    let x = rect.x + i as u32;
                    let (front, back) = resources.bounds.texels(x, y);
                    let hint = resources.hints.hint_at_pixel(x, y);
                    let sample = march(volume, resources.lut, params, front, back, hint);
                    samples += u64::from(sample.samples);

                    *color = if params.show_chunk_borders && rect.is_border_pixel(x, y) {
                        sample.color.lerp(CHUNK_BORDER_TINT, 0.5)
                    } else {
                        sample.color
                    };
                    *depth = sample.first_hit;
                }
                samples
            })
            .sum();

        self.samples += samples;
        Ok(())
    }

    fn resize(&mut self, viewport: ViewportSize) -> Result<()> {
        if viewport != self.target.viewport() {
            self.target = EyeTarget::new(viewport)?;
        }
        Ok(())
    }

    fn first_hit(&self) -> Option<&[f32]> {
        Some(self.target.first_hit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::UvwMap;
    use crate::occlusion::OcclusionHintMap;
    use crate::raycast::RaycastParams;
    use crate::scheduler::SweepResources;
    use crate::tile::{Tile, TileGrid};
    use crate::transfer_function::TransferFunction;
    use crate::transform::{TransformInputs, VolumeFrame, DEFAULT_VOLUME_SIZE};
    use glam::{Mat4, UVec3, Vec3};
    use stereocast_core::{Eye, PixelRect};

    const SENTINEL: Vec4 = Vec4::new(0.25, 0.5, 0.75, 1.0);

    struct Scene {
        viewport: ViewportSize,
        renderer: SoftwareTileRenderer,
        bounds: UvwMap,
        hints: OcclusionHintMap,
        params: RaycastParams,
        lut: crate::transfer_function::TransferLut,
        snapshot: crate::transform::TransformSnapshot,
    }

    impl Scene {
        fn new(size: u32) -> Self {
            let viewport = ViewportSize::new(size, size);
            let volume = Arc::new(VolumeData::head_phantom(UVec3::splat(16)).unwrap());
            let snapshot = VolumeFrame::new(DEFAULT_VOLUME_SIZE, 0.1, 45f32.to_radians(), 1.0)
                .capture(&TransformInputs {
                    model: Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
                    view: Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
                    projection: Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 10.0),
                });
            let mut bounds = UvwMap::new(viewport).unwrap();
            bounds.render(&snapshot);
            let params = RaycastParams::for_volume(&volume.info());
            Self {
                viewport,
                renderer: SoftwareTileRenderer::new(volume, viewport).unwrap(),
                bounds,
                hints: OcclusionHintMap::new(viewport, 6).unwrap(),
                params,
                lut: TransferFunction::ct_stereo().bake(0.0, 2300.0),
                snapshot,
            }
        }

        fn draw(&mut self, rect: PixelRect) -> Result<()> {
            let draw = TileDraw {
                eye: Eye::Left,
                sweep: 1,
                tile: Tile { rect, sequence: 0 },
                resources: SweepResources {
                    snapshot: &self.snapshot,
                    hints: &self.hints,
                    bounds: &self.bounds,
                    params: &self.params,
                    lut: &self.lut,
                },
            };
            self.renderer.draw_tile(&draw)
        }
    }

    #[test]
    fn draw_touches_only_the_tile() {
        let mut scene = Scene::new(48);
        scene
            .renderer
            .clear(ClearBits::COLOR | ClearBits::DEPTH, SENTINEL)
            .unwrap();
        let rect = PixelRect::new(16, 16, 16, 16);
        scene.draw(rect).unwrap();

        let target = scene.renderer.target();
        for (x, y) in scene.viewport.rect().pixels() {
            let color = target.color()[scene.viewport.index(x, y)];
            if !rect.contains(x, y) {
                assert_eq!(color, SENTINEL, "pixel ({x}, {y}) was written");
            }
        }
        // The center of the view looks straight into the head.
        let center = scene.viewport.index(24, 24);
        assert!(target.color()[center].w > 0.5);
        assert!(target.first_hit()[center].is_finite());
        assert!(scene.renderer.samples() > 0);
    }

    #[test]
    fn tiles_compose_to_the_full_image() {
        let mut tiled = Scene::new(40);
        let mut whole = Scene::new(40);

        for tile in TileGrid::new(tiled.viewport, ViewportSize::new(13, 7))
            .unwrap()
            .tiles()
        {
            tiled.draw(tile.rect).unwrap();
        }
        whole.draw(whole.viewport.rect()).unwrap();

        assert_eq!(tiled.renderer.target().color(), whole.renderer.target().color());
        assert_eq!(
            tiled.renderer.target().first_hit(),
            whole.renderer.target().first_hit()
        );
    }

    #[test]
    fn border_toggle_tints_edges() {
        let mut scene = Scene::new(32);
        scene.params.show_chunk_borders = true;
        scene.renderer.clear(ClearBits::COLOR, Vec4::ZERO).unwrap();
        scene.draw(PixelRect::new(0, 0, 8, 8)).unwrap();
        let target = scene.renderer.target();
        // Corner rays miss the volume, so only the tint remains.
        assert_eq!(target.color()[0], CHUNK_BORDER_TINT * 0.5);
        assert_eq!(target.color()[scene.viewport.index(3, 3)], Vec4::ZERO);
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let mut scene = Scene::new(32);
        scene.bounds = UvwMap::new(ViewportSize::new(16, 16)).unwrap();
        assert!(scene.draw(PixelRect::new(0, 0, 8, 8)).is_err());
    }

    #[test]
    fn first_hit_is_exposed() {
        let scene = Scene::new(16);
        assert_eq!(scene.renderer.first_hit().map(<[f32]>::len), Some(256));
    }
}
