//! Transform snapshots for chunked raycasting.
//!
//! Every tile of a sweep must be raycast with the matrices that were current
//! when the sweep began, otherwise tiles drawn on different frames would not
//! line up. [`TransformCache`] captures those matrices once per sweep and
//! keeps the previous sweep's snapshot around for occlusion reprojection.

use glam::{Mat4, Vec2, Vec3, Vec4};
use stereocast_core::ViewportSize;

/// Volume extents in model space: half-size of the bounding box per axis.
pub const DEFAULT_VOLUME_SIZE: Vec3 = Vec3::new(1.0, 0.886, 1.0);

/// Constant matrices derived from the volume size and near-plane geometry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeFrame {
    model_to_texture: Mat4,
    screen_to_view: Mat4,
}

impl VolumeFrame {
    /// Derive the constants.
    ///
    /// `fov_y` is the vertical field of view in radians and `aspect` the
    /// width / height ratio of one eye's viewport.
    pub fn new(volume_size: Vec3, near: f32, fov_y: f32, aspect: f32) -> Self {
        let near_h = near * (fov_y * 0.5).tan();
        let near_w = near_h * aspect;

        let screen_to_view = Mat4::from_scale(Vec3::new(near_w, near_h, near))
            * (Mat4::from_translation(Vec3::splat(0.5)) * Mat4::from_scale(Vec3::splat(0.5)))
                .inverse();

        // Texture axes are (x, -z, y) of model space, origin at the front left corner.
        let swap_axes = Mat4::from_cols(
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(0.0, -1.0, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 0.0, 1.0),
        );
        let model_to_texture = swap_axes
            * Mat4::from_scale(2.0 * volume_size).inverse()
            * Mat4::from_translation(Vec3::new(volume_size.x, volume_size.y, -volume_size.z));

        Self {
            model_to_texture,
            screen_to_view,
        }
    }

    /// Model space to normalized texture space `[0, 1]^3`.
    #[inline]
    pub const fn model_to_texture(&self) -> Mat4 {
        self.model_to_texture
    }

    /// Screen `[0, 1]^2` on the near plane to view space.
    #[inline]
    pub const fn screen_to_view(&self) -> Mat4 {
        self.screen_to_view
    }

    /// View-space point on the near plane for a screen coordinate.
    #[inline]
    pub fn near_plane_point(&self, u: f32, v: f32) -> Vec3 {
        self.screen_to_view.transform_point3(Vec3::new(u, v, 0.0))
    }

    /// Capture a snapshot. Pure function of `self` and `inputs`.
    pub fn capture(&self, inputs: &TransformInputs) -> TransformSnapshot {
        let inverse_model = inputs.model.inverse();
        let inverse_view = inputs.view.inverse();
        let view_to_texture = self.model_to_texture * inverse_model * inverse_view;

        TransformSnapshot {
            model: inputs.model,
            inverse_model,
            view: inputs.view,
            inverse_view,
            projection: inputs.projection,
            screen_to_view: self.screen_to_view,
            screen_to_texture: view_to_texture * self.screen_to_view,
            view_to_texture,
        }
    }
}

/// Screen coordinate of a pixel center. Row 0 is the top of the image, so
/// `v` grows upward like view-space y.
#[inline]
pub fn pixel_to_screen(viewport: ViewportSize, x: u32, y: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / viewport.width as f32,
        1.0 - (y as f32 + 0.5) / viewport.height as f32,
    )
}

/// Pixel containing a screen coordinate, `None` outside the viewport.
#[inline]
pub fn screen_to_pixel(viewport: ViewportSize, screen: Vec2) -> Option<(u32, u32)> {
    let x = (screen.x * viewport.width as f32).floor();
    let y = ((1.0 - screen.y) * viewport.height as f32).floor();
    if x < 0.0 || y < 0.0 || x >= viewport.width as f32 || y >= viewport.height as f32 {
        return None;
    }
    Some((x as u32, y as u32))
}

/// Live matrices supplied by the caller for one eye.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformInputs {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

/// Matrices fixed for the duration of one sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformSnapshot {
    pub model: Mat4,
    pub inverse_model: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub projection: Mat4,
    pub screen_to_view: Mat4,
    pub screen_to_texture: Mat4,
    pub view_to_texture: Mat4,
}

impl TransformSnapshot {
    /// Maps view space of `previous` into view space of `self`, accounting for
    /// both camera and model motion.
    pub fn old_view_to_new_view(&self, previous: &Self) -> Mat4 {
        self.view * (self.model * previous.inverse_model) * previous.inverse_view
    }

    /// Eye position in texture space
    #[inline]
    pub fn texture_eye(&self) -> Vec3 {
        self.view_to_texture.transform_point3(Vec3::ZERO)
    }
}

/// Per-eye holder of the current and previous sweep snapshots.
#[derive(Clone, Debug)]
pub struct TransformCache {
    frame: VolumeFrame,
    current: Option<TransformSnapshot>,
    previous: Option<TransformSnapshot>,
}

impl TransformCache {
    pub const fn new(frame: VolumeFrame) -> Self {
        Self {
            frame,
            current: None,
            previous: None,
        }
    }

    #[inline]
    pub const fn frame(&self) -> &VolumeFrame {
        &self.frame
    }

    /// Replace the constants, e.g. after the eye viewport's aspect changed.
    pub fn set_frame(&mut self, frame: VolumeFrame) {
        self.frame = frame;
        self.discard();
    }

    /// Capture the snapshot for a new sweep. The snapshot it replaces becomes
    /// [`Self::previous`].
    pub fn begin_sweep(&mut self, inputs: &TransformInputs) -> &TransformSnapshot {
        self.previous = self.current.take();
        self.current.insert(self.frame.capture(inputs))
    }

    /// Snapshot of the sweep in progress or most recently completed.
    #[inline]
    pub const fn snapshot(&self) -> Option<&TransformSnapshot> {
        self.current.as_ref()
    }

    /// Snapshot the previous sweep was rendered with.
    #[inline]
    pub const fn previous(&self) -> Option<&TransformSnapshot> {
        self.previous.as_ref()
    }

    /// Drop both snapshots after an aborted sweep.
    pub fn discard(&mut self) {
        self.current = None;
        self.previous = None;
    }
}
