//! Core types, math, and geometry for Stereocast.
//!
//! This crate provides the foundational types used throughout the renderer:
//! - Pixel-space viewport and rectangle types
//! - Eye identifiers for stereo rendering
//! - Volume data and its metadata
//! - Ray and bounding box math
//! - Common error types

pub mod coords;
pub mod error;
pub mod math;
pub mod types;
pub mod volume;

pub use coords::{PixelRect, ViewportSize};
pub use error::{Error, Result};
pub use types::Eye;
pub use volume::{VolumeData, VolumeInfo};

/// Renderer-wide constants
pub mod constants {
    /// Number of entries in a baked transfer-function lookup table
    pub const TRANSFER_LUT_SIZE: usize = 512;
    /// Accumulated opacity at which a ray stops marching
    pub const EARLY_RAY_TERMINATION_ALPHA: f32 = 0.99;
    /// Largest step multiplier the LOD heuristic may apply
    pub const MAX_LOD_STEP_MULTIPLIER: f32 = 8.0;
}
