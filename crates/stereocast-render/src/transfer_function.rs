//! Piecewise-linear transfer functions baked into lookup tables.

use glam::Vec4;
use serde::{Deserialize, Serialize};
use stereocast_core::constants::TRANSFER_LUT_SIZE;
use stereocast_core::{Error, Result};

/// One control point: a voxel value and its RGBA classification.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub value: f32,
    pub color: Vec4,
}

impl ControlPoint {
    pub const fn new(value: f32, color: Vec4) -> Self {
        Self { value, color }
    }

    /// Point with 8-bit color components.
    pub fn from_rgba8(value: f32, rgba: [u8; 4]) -> Self {
        Self {
            value,
            color: Vec4::new(
                f32::from(rgba[0]),
                f32::from(rgba[1]),
                f32::from(rgba[2]),
                f32::from(rgba[3]),
            ) / 255.0,
        }
    }
}

/// Sorted control points mapping voxel values to color and opacity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    points: Vec<ControlPoint>,
}

impl TransferFunction {
    /// Create from control points in any order.
    pub fn new(mut points: Vec<ControlPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::Config(
                "transfer function needs at least one control point".to_string(),
            ));
        }
        if points.iter().any(|p| !p.value.is_finite()) {
            return Err(Error::Config(
                "transfer function control point is not finite".to_string(),
            ));
        }
        points.sort_by(|a, b| a.value.total_cmp(&b.value));
        Ok(Self { points })
    }

    /// CT preset for the desktop stereo viewer.
    pub fn ct_stereo() -> Self {
        Self {
            points: vec![
                ControlPoint::new(164.0, Vec4::ZERO),
                ControlPoint::new(312.0, Vec4::new(1.0, 0.07, 0.07, 0.6)),
                ControlPoint::new(872.0, Vec4::new(0.0, 0.5, 1.0, 0.3)),
                ControlPoint::new(1142.0, Vec4::new(0.4, 0.3, 0.8, 0.0)),
                ControlPoint::new(2500.0, Vec4::new(0.95, 0.83, 1.0, 1.0)),
            ],
        }
    }

    /// CT preset for head-mounted display output.
    pub fn ct_hmd() -> Self {
        Self {
            points: vec![
                ControlPoint::from_rgba8(58.0, [0, 0, 0, 0]),
                ControlPoint::from_rgba8(539.0, [255, 0, 0, 231]),
                ControlPoint::from_rgba8(572.0, [0, 74, 118, 64]),
                ControlPoint::from_rgba8(1356.0, [0, 11, 112, 0]),
                ControlPoint::from_rgba8(1500.0, [242, 212, 255, 255]),
            ],
        }
    }

    #[inline]
    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    /// Classify a single value.
    ///
    /// Below the first point the result is transparent black, above the last
    /// point the last color is held.
    pub fn evaluate(&self, value: f32) -> Vec4 {
        let Some(first) = self.points.first() else {
            return Vec4::ZERO;
        };
        if value < first.value {
            return Vec4::ZERO;
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if value <= b.value {
                let span = b.value - a.value;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (value - a.value) / span);
            }
        }
        self.points.last().map_or(Vec4::ZERO, |p| p.color)
    }

    /// Bake into a lookup table spanning `[min, max]`.
    pub fn bake(&self, min: f32, max: f32) -> TransferLut {
        let span = max - min;
        let last = (TRANSFER_LUT_SIZE - 1) as f32;
        let entries = (0..TRANSFER_LUT_SIZE)
            .map(|i| self.evaluate(min + span * i as f32 / last))
            .collect();
        TransferLut { entries, min, max }
    }
}

/// Baked RGBA table of [`TRANSFER_LUT_SIZE`] entries over a value range.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferLut {
    entries: Vec<Vec4>,
    min: f32,
    max: f32,
}

impl TransferLut {
    #[inline]
    pub fn entries(&self) -> &[Vec4] {
        &self.entries
    }

    /// Value range the table was baked over
    #[inline]
    pub const fn range(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Look up a voxel value through a window.
    ///
    /// The value is normalized as `(v - window_min) / window_range`, clamped
    /// to `[0, 1]` and linearly interpolated between table entries.
    pub fn sample(&self, value: f32, window_min: f32, window_range: f32) -> Vec4 {
        let t = if window_range > 0.0 {
            ((value - window_min) / window_range).clamp(0.0, 1.0)
        } else if value >= window_min {
            1.0
        } else {
            0.0
        };
        let x = t * (self.entries.len() - 1) as f32;
        let i = x.floor() as usize;
        let j = (i + 1).min(self.entries.len() - 1);
        self.entries[i].lerp(self.entries[j], x - i as f32)
    }

    /// Entries as packed RGBA8 texels for upload.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.entries
            .iter()
            .flat_map(|c| {
                let c = (c.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
                [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transparent_below_first_point() {
        let tf = TransferFunction::ct_stereo();
        assert_eq!(tf.evaluate(0.0), Vec4::ZERO);
        assert_eq!(tf.evaluate(163.9), Vec4::ZERO);
    }

    #[test]
    fn linear_between_points() {
        let tf = TransferFunction::ct_stereo();
        let mid = tf.evaluate(238.0);
        assert_relative_eq!(mid.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(mid.w, 0.3, epsilon = 1e-5);
        assert_eq!(tf.evaluate(312.0), Vec4::new(1.0, 0.07, 0.07, 0.6));
    }

    #[test]
    fn last_color_is_held() {
        let tf = TransferFunction::ct_stereo();
        assert_eq!(tf.evaluate(4000.0), Vec4::new(0.95, 0.83, 1.0, 1.0));
    }

    #[test]
    fn hmd_preset_uses_byte_colors() {
        let tf = TransferFunction::ct_hmd();
        let c = tf.evaluate(539.0);
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.w, 231.0 / 255.0);
        assert_eq!(tf.points().len(), 5);
    }

    #[test]
    fn new_sorts_points() {
        let tf = TransferFunction::new(vec![
            ControlPoint::new(10.0, Vec4::ONE),
            ControlPoint::new(0.0, Vec4::ZERO),
        ])
        .unwrap();
        assert_eq!(tf.points()[0].value, 0.0);
        assert!(TransferFunction::new(Vec::new()).is_err());
        assert!(TransferFunction::new(vec![ControlPoint::new(f32::NAN, Vec4::ONE)]).is_err());
    }

    #[test]
    fn baked_table_spans_range() {
        let tf = TransferFunction::ct_stereo();
        let lut = tf.bake(0.0, 2500.0);
        assert_eq!(lut.entries().len(), TRANSFER_LUT_SIZE);
        assert_eq!(lut.entries()[0], Vec4::ZERO);
        assert_eq!(*lut.entries().last().unwrap(), tf.evaluate(2500.0));
        assert_eq!(lut.range(), (0.0, 2500.0));
    }

    #[test]
    fn windowed_sample_clamps() {
        let lut = TransferFunction::ct_stereo().bake(0.0, 2500.0);
        assert_eq!(lut.sample(-100.0, 0.0, 2500.0), Vec4::ZERO);
        let top = lut.sample(9000.0, 0.0, 2500.0);
        assert_relative_eq!(top.w, 1.0, epsilon = 1e-5);
        // Narrow window saturates earlier.
        let narrowed = lut.sample(1250.0, 0.0, 1250.0);
        assert_relative_eq!(narrowed.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn rgba8_packing() {
        let lut = TransferFunction::ct_stereo().bake(0.0, 2500.0);
        let bytes = lut.to_rgba8();
        assert_eq!(bytes.len(), TRANSFER_LUT_SIZE * 4);
        assert_eq!(&bytes[bytes.len() - 4..], &[242, 212, 255, 255]);
    }
}
