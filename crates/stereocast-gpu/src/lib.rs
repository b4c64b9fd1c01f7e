//! Vulkan helpers for Stereocast.
//!
//! This crate provides:
//! - Graphics pipelines for tile raycasting (dynamic rendering, dynamic
//!   viewport and scissor so a pipeline can be reused for every tile)
//! - Host-visible buffers for sweep inputs and first-hit readback
//! - GPU timestamp timers with a double-buffered query ring

pub mod descriptors;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod timer;

pub use descriptors::{write_storage_buffer, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result};
pub use gpu_allocator::MemoryLocation;
pub use memory::{GpuAllocator, GpuBuffer};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use timer::{DoubleBuffered, GpuTimer, TimerSlot};
