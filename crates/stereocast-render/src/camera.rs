//! Stereo camera rig, model placement and turntable interaction.

use glam::{Mat4, Quat, Vec3};
use stereocast_core::Eye;

use crate::config::{Projection, RenderConfig};
use crate::transform::TransformInputs;

/// View and projection of one eye for the current frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EyePose {
    pub view: Mat4,
    pub projection: Mat4,
}

impl EyePose {
    /// Transform inputs for a given model matrix.
    #[inline]
    pub const fn inputs(&self, model: Mat4) -> TransformInputs {
        TransformInputs {
            model,
            view: self.view,
            projection: self.projection,
        }
    }
}

/// Static desktop stereo pair.
///
/// The left eye looks from `eye` at `center`; the right eye sits
/// `eye_distance` further along +X and looks at the same point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoRig {
    pub eye: Vec3,
    pub center: Vec3,
    pub eye_distance: f32,
    pub projection: Projection,
    pub aspect: f32,
}

impl Default for StereoRig {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl StereoRig {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            center: Vec3::ZERO,
            eye_distance: config.eye_distance,
            projection: config.projection,
            aspect: config.eye_viewport.aspect(),
        }
    }

    /// Camera position of an eye.
    pub fn position(&self, eye: Eye) -> Vec3 {
        match eye {
            Eye::Left => self.eye,
            Eye::Right => self.eye + Vec3::X * self.eye_distance,
        }
    }

    pub fn view_matrix(&self, eye: Eye) -> Mat4 {
        Mat4::look_at_rh(self.position(eye), self.center, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.projection.fov_y,
            self.aspect,
            self.projection.near,
            self.projection.far,
        )
    }

    pub fn pose(&self, eye: Eye) -> EyePose {
        EyePose {
            view: self.view_matrix(eye),
            projection: self.projection_matrix(),
        }
    }

    /// Poses of both eyes, indexed by [`Eye::index`].
    pub fn poses(&self) -> [EyePose; 2] {
        Eye::BOTH.map(|eye| self.pose(eye))
    }

    /// Move eye and center by a left-eye view-space offset.
    pub fn translate_local(&mut self, delta: Vec3) {
        let world = self.view_matrix(Eye::Left).inverse().transform_vector3(delta);
        self.eye += world;
        self.center += world;
    }
}

/// Mouse-drag rotation of the model around view-aligned axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Turntable {
    rotation: Quat,
    drag_active: bool,
    /// Radians per pixel of mouse motion
    pub sensitivity: f32,
}

impl Default for Turntable {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            drag_active: false,
            sensitivity: 0.01,
        }
    }
}

impl Turntable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub const fn drag_active(&self) -> bool {
        self.drag_active
    }

    pub fn set_drag_active(&mut self, active: bool) {
        self.drag_active = active;
    }

    /// Rotate by a mouse delta in pixels. Horizontal motion turns around the
    /// view's up axis, vertical motion around its right axis. Ignored unless
    /// a drag is active.
    pub fn drag_by(&mut self, dx: f32, dy: f32, view: Mat4) {
        if !self.drag_active {
            return;
        }
        let inverse_view = view.inverse();
        let up = inverse_view.transform_vector3(Vec3::Y).normalize_or_zero();
        let right = inverse_view.transform_vector3(Vec3::X).normalize_or_zero();
        if up == Vec3::ZERO || right == Vec3::ZERO {
            return;
        }
        let yaw = Quat::from_axis_angle(up, dx * self.sensitivity);
        let pitch = Quat::from_axis_angle(right, dy * self.sensitivity);
        self.rotation = (yaw * pitch * self.rotation).normalize();
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation)
    }

    pub fn reset(&mut self) {
        self.rotation = Quat::IDENTITY;
    }
}

/// Where the volume sits in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPlacement {
    pub translation: Vec3,
    pub scale: f32,
    /// Data-set orientation fix applied before any interaction
    pub orientation: Quat,
    /// Accumulated auto-rotation around +Y
    pub spin: f32,
}

impl ModelPlacement {
    /// In front of the desktop stereo pair.
    pub fn desktop() -> Self {
        Self {
            translation: Vec3::new(0.0, 0.0, -3.0),
            scale: 1.0,
            orientation: Quat::from_rotation_z(std::f32::consts::PI),
            spin: 0.0,
        }
    }

    /// At table height in a tracked room.
    pub fn room_scale() -> Self {
        Self {
            translation: Vec3::new(0.0, 1.0, -0.5),
            scale: 0.3,
            ..Self::desktop()
        }
    }

    /// Auto-rotate by `angle` radians.
    pub fn rotate(&mut self, angle: f32) {
        self.spin = (self.spin + angle).rem_euclid(std::f32::consts::TAU);
    }

    /// Model matrix including the turntable rotation.
    pub fn model_matrix(&self, turntable: &Turntable) -> Mat4 {
        Mat4::from_translation(self.translation)
            * turntable.rotation_matrix()
            * Mat4::from_rotation_y(self.spin)
            * Mat4::from_quat(self.orientation)
            * Mat4::from_scale(Vec3::splat(self.scale))
    }
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self::desktop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn right_eye_is_offset_along_x() {
        let rig = StereoRig::default();
        assert_eq!(rig.position(Eye::Left), Vec3::new(0.0, 0.0, 3.0));
        assert_relative_eq!(rig.position(Eye::Right).x, 0.15);
        let [left, right] = rig.poses();
        assert_ne!(left.view, right.view);
        assert_eq!(left.projection, right.projection);
    }

    #[test]
    fn both_eyes_look_at_the_center() {
        let rig = StereoRig::default();
        for eye in Eye::BOTH {
            let center = rig.view_matrix(eye).transform_point3(rig.center);
            assert_relative_eq!(center.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(center.y, 0.0, epsilon = 1e-5);
            assert!(center.z < 0.0);
        }
    }

    #[test]
    fn translate_moves_along_view_axes() {
        let mut rig = StereoRig::default();
        rig.translate_local(Vec3::new(0.0, 0.0, -0.1));
        assert_relative_eq!(rig.eye.z, 2.9, epsilon = 1e-5);
        assert_relative_eq!(rig.center.z, -0.1, epsilon = 1e-5);

        rig.translate_local(Vec3::new(0.1, 0.0, 0.0));
        assert_relative_eq!(rig.eye.x, 0.1, epsilon = 1e-5);
    }

    #[test]
    fn turntable_only_turns_while_dragging() {
        let view = StereoRig::default().view_matrix(Eye::Left);
        let mut turntable = Turntable::new();
        turntable.drag_by(50.0, 0.0, view);
        assert_eq!(turntable.rotation_matrix(), Mat4::IDENTITY);

        turntable.set_drag_active(true);
        turntable.drag_by(50.0, 0.0, view);
        // Horizontal drag spins around world +Y for an upright camera.
        let turned = turntable.rotation_matrix().transform_vector3(Vec3::Y);
        assert_relative_eq!(turned.y, 1.0, epsilon = 1e-5);
        assert_ne!(turntable.rotation_matrix(), Mat4::IDENTITY);

        turntable.reset();
        assert_eq!(turntable.rotation_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn desktop_model_sits_in_front_of_the_rig() {
        let model = ModelPlacement::desktop().model_matrix(&Turntable::new());
        let origin = model * Vec4::W;
        assert_relative_eq!(origin.z, -3.0);
        // Flipped upside down.
        let up = model.transform_vector3(Vec3::Y);
        assert_relative_eq!(up.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn spin_wraps() {
        let mut placement = ModelPlacement::room_scale();
        placement.rotate(7.0);
        assert!(placement.spin < std::f32::consts::TAU);
        assert_eq!(placement.scale, 0.3);
    }
}
