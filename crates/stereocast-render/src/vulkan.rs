//! Vulkan tile raycast pass.
//!
//! Each tile is one dynamic-rendering instance whose render area, viewport
//! and scissor are the tile rectangle, with attachments loaded and stored so
//! earlier tiles of the sweep survive. The fragment shader reads the volume
//! and transfer function through samplers the caller binds, and the sweep's
//! uvw maps and occlusion hints through storage buffers the pass uploads at
//! the first tile of each sweep. When a sweep completes its first-hit image
//! is copied back so the next sweep's hints can be reprojected on the CPU.

use ash::vk;
use glam::Vec4;
use stereocast_core::{Error, Eye, PixelRect, Result, ViewportSize};
use stereocast_gpu::{
    write_storage_buffer, DescriptorSetLayoutBuilder, GpuAllocator, GpuBuffer, GpuError,
    GpuTimer, GraphicsPipeline, GraphicsPipelineConfig, MemoryLocation,
};
use tracing::{debug, info, trace};

use crate::raycast::{RaycastPushConstants, UvwTexel, RAYCAST_PUSH_CONSTANTS_SIZE};
use crate::scheduler::{ClearBits, SweepResources, TileDraw, TileRenderer};

/// 3D volume texture, written by the caller.
pub const VOLUME_BINDING: u32 = 0;
/// Transfer function LUT, written by the caller.
pub const LUT_BINDING: u32 = 1;
pub const UVW_FRONT_BINDING: u32 = 2;
pub const UVW_BACK_BINDING: u32 = 3;
pub const HINTS_BINDING: u32 = 4;

/// Layout of the descriptor set the pass binds.
pub fn raycast_set_layout() -> DescriptorSetLayoutBuilder<'static> {
    let stage = vk::ShaderStageFlags::FRAGMENT;
    DescriptorSetLayoutBuilder::new()
        .sampled_image(VOLUME_BINDING, stage)
        .sampled_image(LUT_BINDING, stage)
        .storage_buffer(UVW_FRONT_BINDING, stage)
        .storage_buffer(UVW_BACK_BINDING, stage)
        .storage_buffer(HINTS_BINDING, stage)
}

/// Color and first-hit images of one eye, kept in `GENERAL` layout.
#[derive(Clone, Copy, Debug)]
pub struct EyeAttachments {
    pub color: vk::Image,
    pub color_view: vk::ImageView,
    pub first_hit: vk::Image,
    pub first_hit_view: vk::ImageView,
    pub extent: ViewportSize,
}

/// Render area of a tile.
#[inline]
pub fn tile_rect2d(rect: PixelRect) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.x as i32,
            y: rect.y as i32,
        },
        extent: vk::Extent2D {
            width: rect.width,
            height: rect.height,
        },
    }
}

/// Viewport covering exactly a tile.
#[inline]
pub fn tile_viewport(rect: PixelRect) -> vk::Viewport {
    vk::Viewport {
        x: rect.x as f32,
        y: rect.y as f32,
        width: rect.width as f32,
        height: rect.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Clear value for the first-hit attachment: no hit.
pub const FIRST_HIT_CLEAR: vk::ClearColorValue = vk::ClearColorValue {
    float32: [f32::INFINITY, 0.0, 0.0, 0.0],
};

fn gpu_error(e: GpuError) -> Error {
    Error::Gpu(e.to_string())
}

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Byte sizes of the per-eye sweep buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepBufferSizes {
    /// Each of the front and back uvw maps
    pub uvw: u64,
    pub hints: u64,
    pub first_hit: u64,
}

impl SweepBufferSizes {
    pub fn new(extent: ViewportSize, block_size: u32) -> Self {
        let area = extent.area();
        let cells = u64::from(extent.width.div_ceil(block_size))
            * u64::from(extent.height.div_ceil(block_size));
        let texel = std::mem::size_of::<UvwTexel>() as u64;
        let float = std::mem::size_of::<f32>() as u64;
        Self {
            uvw: area * texel,
            hints: cells * float,
            first_hit: area * float,
        }
    }
}

/// Progress of the first-hit copy back to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Readback {
    /// Nothing copied since the attachments were created
    #[default]
    Empty,
    /// Copy recorded, the command buffer may still be executing
    Recorded,
    /// Copy complete, the host buffer holds the last finished sweep
    Ready,
}

impl Readback {
    /// State once the previous recording is known to have completed.
    #[must_use]
    pub const fn after_completion(self) -> Self {
        match self {
            Self::Recorded | Self::Ready => Self::Ready,
            Self::Empty => Self::Empty,
        }
    }
}

struct SweepBuffers {
    uvw_front: GpuBuffer,
    uvw_back: GpuBuffer,
    hints: GpuBuffer,
    first_hit: GpuBuffer,
}

impl SweepBuffers {
    fn new(allocator: &mut GpuAllocator, sizes: SweepBufferSizes) -> Result<Self> {
        let storage = vk::BufferUsageFlags::STORAGE_BUFFER;
        let upload = MemoryLocation::CpuToGpu;
        let mut create = |size: u64,
                          usage: vk::BufferUsageFlags,
                          location: MemoryLocation,
                          name: &str| {
            allocator
                .create_buffer(size, usage, location, name)
                .map_err(gpu_error)
        };
        Ok(Self {
            uvw_front: create(sizes.uvw, storage, upload, "uvw front")?,
            uvw_back: create(sizes.uvw, storage, upload, "uvw back")?,
            hints: create(sizes.hints, storage, upload, "occlusion hints")?,
            first_hit: create(
                sizes.first_hit,
                vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuToCpu,
                "first-hit readback",
            )?,
        })
    }

    unsafe fn bind(&self, device: &ash::Device, set: vk::DescriptorSet) {
        unsafe {
            write_storage_buffer(device, set, UVW_FRONT_BINDING, self.uvw_front.descriptor_info());
            write_storage_buffer(device, set, UVW_BACK_BINDING, self.uvw_back.descriptor_info());
            write_storage_buffer(device, set, HINTS_BINDING, self.hints.descriptor_info());
        }
    }

    fn upload(&mut self, resources: &SweepResources<'_>) -> Result<()> {
        self.uvw_front
            .write(resources.bounds.front())
            .map_err(gpu_error)?;
        self.uvw_back
            .write(resources.bounds.back())
            .map_err(gpu_error)?;
        self.hints.write(resources.hints.cells()).map_err(gpu_error)
    }

    unsafe fn free(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        for buffer in [
            &mut self.uvw_front,
            &mut self.uvw_back,
            &mut self.hints,
            &mut self.first_hit,
        ] {
            unsafe { allocator.free_buffer(buffer) }.map_err(gpu_error)?;
        }
        Ok(())
    }
}

/// GPU implementation of [`TileRenderer`] for one eye.
pub struct VulkanTilePass {
    device: ash::Device,
    pipeline: GraphicsPipeline,
    descriptor_set: vk::DescriptorSet,
    attachments: EyeAttachments,
    block_size: u32,
    buffers: SweepBuffers,
    uploaded_sweep: Option<u64>,
    readback: Readback,
    cmd: Option<vk::CommandBuffer>,
    timer: Option<GpuTimer>,
}

impl VulkanTilePass {
    /// Create the pass and its sweep buffers, and point the storage buffer
    /// bindings of `descriptor_set` at them.
    ///
    /// `max_push_constants_size` is the device limit; the raycast push
    /// constants need more than the guaranteed minimum of 128 bytes.
    ///
    /// # Safety
    /// The device must be valid, the shaders valid SPIR-V matching
    /// `set_layout` (see [`raycast_set_layout`]) and the attachments created
    /// with `COLOR_ATTACHMENT` and `TRANSFER_DST` usage, plus `TRANSFER_SRC`
    /// for the first-hit image.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn new(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        vertex_shader: Vec<u32>,
        fragment_shader: Vec<u32>,
        set_layout: vk::DescriptorSetLayout,
        descriptor_set: vk::DescriptorSet,
        attachments: EyeAttachments,
        block_size: u32,
        max_push_constants_size: u32,
    ) -> Result<Self> {
        if max_push_constants_size < RAYCAST_PUSH_CONSTANTS_SIZE {
            return Err(gpu_error(GpuError::Unsupported(format!(
                "raycast push constants need {RAYCAST_PUSH_CONSTANTS_SIZE} bytes, device allows {max_push_constants_size}"
            ))));
        }
        if block_size == 0 {
            return Err(Error::Config("occlusion block size must be non-zero".to_string()));
        }

        let mut buffers =
            SweepBuffers::new(allocator, SweepBufferSizes::new(attachments.extent, block_size))?;

        let config = GraphicsPipelineConfig::tile_raycast(vertex_shader, fragment_shader);
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(RAYCAST_PUSH_CONSTANTS_SIZE);
        let pipeline = match unsafe {
            GraphicsPipeline::new(
                device,
                &config,
                std::slice::from_ref(&set_layout),
                std::slice::from_ref(&push_range),
            )
        } {
            Ok(pipeline) => pipeline,
            Err(e) => {
                unsafe { buffers.free(allocator) }?;
                return Err(gpu_error(e));
            }
        };
        unsafe { buffers.bind(device, descriptor_set) };

        info!(
            "Created tile raycast pass for {} target",
            attachments.extent
        );

        Ok(Self {
            device: device.clone(),
            pipeline,
            descriptor_set,
            attachments,
            block_size,
            buffers,
            uploaded_sweep: None,
            readback: Readback::Empty,
            cmd: None,
            timer: None,
        })
    }

    /// Command buffer subsequent clears and tile draws are recorded into.
    ///
    /// # Safety
    /// `cmd` must be in the recording state, outside a render pass instance,
    /// until [`Self::end_recording`]. The command buffer of the previous
    /// recording must have completed: sweep inputs are rewritten and the
    /// first-hit readback is read through host-mapped memory.
    pub unsafe fn begin_recording(&mut self, cmd: vk::CommandBuffer) {
        self.readback = self.readback.after_completion();
        if let Some(timer) = &mut self.timer {
            unsafe { timer.begin(&self.device, cmd) };
        }
        self.cmd = Some(cmd);
    }

    /// Stop recording; returns the command buffer.
    pub fn end_recording(&mut self) -> Result<Option<vk::CommandBuffer>> {
        let cmd = self.cmd.take();
        if let (Some(timer), Some(cmd)) = (&mut self.timer, cmd) {
            // SAFETY: `begin_recording` requires `cmd` to stay recording until now.
            unsafe { timer.end(&self.device, cmd) }.map_err(gpu_error)?;
        }
        Ok(cmd)
    }

    /// Time the commands recorded between `begin_recording` and
    /// `end_recording` with GPU timestamps.
    ///
    /// `period_ns` is the device timestamp period and `valid_bits` the queue
    /// family's timestamp valid bits.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn enable_timing(&mut self, period_ns: f32, valid_bits: u32) -> Result<()> {
        if self.timer.is_none() {
            let timer = unsafe { GpuTimer::new(&self.device, period_ns, valid_bits) }
                .map_err(gpu_error)?;
            self.timer = Some(timer);
        }
        Ok(())
    }

    /// GPU time of the previous frame's recording, if it is available yet.
    ///
    /// Never blocks. Call once per frame after submitting the command buffer.
    pub fn poll_gpu_time(&mut self) -> Result<Option<f64>> {
        let Some(timer) = &mut self.timer else {
            return Ok(None);
        };
        // SAFETY: the device outlives the pass.
        let ms = unsafe { timer.poll(&self.device) }.map_err(gpu_error)?;
        timer.swap();
        Ok(ms)
    }

    /// Blocking variant of [`Self::poll_gpu_time`] for profiling captures.
    ///
    /// # Safety
    /// The previous frame's command buffer must have been submitted.
    pub unsafe fn wait_gpu_time(&mut self) -> Result<Option<f64>> {
        let Some(timer) = &mut self.timer else {
            return Ok(None);
        };
        let ms = unsafe { timer.wait(&self.device) }.map_err(gpu_error)?;
        timer.swap();
        Ok(ms)
    }

    #[inline]
    pub const fn attachments(&self) -> &EyeAttachments {
        &self.attachments
    }

    #[inline]
    pub const fn readback(&self) -> Readback {
        self.readback
    }

    /// Swap in recreated attachments, e.g. after a resize, and reallocate the
    /// sweep buffers to match.
    ///
    /// # Safety
    /// The device must be idle with respect to this pass.
    pub unsafe fn set_attachments(
        &mut self,
        allocator: &mut GpuAllocator,
        attachments: EyeAttachments,
        descriptor_set: vk::DescriptorSet,
    ) -> Result<()> {
        let sizes = SweepBufferSizes::new(attachments.extent, self.block_size);
        let buffers = SweepBuffers::new(allocator, sizes)?;
        let mut old = std::mem::replace(&mut self.buffers, buffers);
        unsafe {
            old.free(allocator)?;
            self.buffers.bind(&self.device, descriptor_set);
        }
        self.attachments = attachments;
        self.descriptor_set = descriptor_set;
        self.uploaded_sweep = None;
        self.readback = Readback::Empty;
        Ok(())
    }

    fn recording(&self) -> Result<vk::CommandBuffer> {
        self.cmd
            .ok_or_else(|| Error::InvalidState("tile pass is not recording".to_string()))
    }

    /// Copy a sweep's uvw maps and hints into the storage buffers.
    fn upload_inputs(&mut self, draw: &TileDraw<'_>) -> Result<()> {
        let resources = draw.resources;
        let extent = self.attachments.extent;
        if resources.bounds.viewport() != extent
            || resources.hints.viewport() != extent
            || resources.hints.block_size() != self.block_size
        {
            return Err(Error::InvalidState(format!(
                "{} eye sweep inputs do not match {extent} attachments with {} px blocks",
                draw.eye, self.block_size
            )));
        }
        self.buffers.upload(&resources)?;
        trace!(
            "Uploaded {} eye sweep {} inputs ({} known occlusion blocks)",
            draw.eye,
            draw.sweep,
            resources.hints.known_cells()
        );
        Ok(())
    }

    /// Make transfer or earlier attachment writes visible to the next tile.
    unsafe fn attachment_barrier(&self, cmd: vk::CommandBuffer, after_clear: bool) {
        let (src_stage, src_access) = if after_clear {
            (
                vk::PipelineStageFlags2::CLEAR,
                vk::AccessFlags2::TRANSFER_WRITE,
            )
        } else {
            (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            )
        };
        let barriers = [self.attachments.color, self.attachments.first_hit].map(|image| {
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(src_stage)
                .src_access_mask(src_access)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(
                    vk::AccessFlags2::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                )
                .old_layout(vk::ImageLayout::GENERAL)
                .new_layout(vk::ImageLayout::GENERAL)
                .image(image)
                .subresource_range(COLOR_RANGE)
        });
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    /// Record the first-hit image to host buffer copy.
    unsafe fn record_readback(&self, cmd: vk::CommandBuffer) {
        let extent = self.attachments.extent;
        let to_transfer = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::COPY)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_READ)
            .old_layout(vk::ImageLayout::GENERAL)
            .new_layout(vk::ImageLayout::GENERAL)
            .image(self.attachments.first_hit)
            .subresource_range(COLOR_RANGE);
        let barriers = [to_transfer];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        let to_host = vk::BufferMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::HOST)
            .dst_access_mask(vk::AccessFlags2::HOST_READ)
            .buffer(self.buffers.first_hit.buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        let buffer_barriers = [to_host];
        let host_dependency =
            vk::DependencyInfo::default().buffer_memory_barriers(&buffer_barriers);

        unsafe {
            self.device.cmd_pipeline_barrier2(cmd, &dependency_info);
            self.device.cmd_copy_image_to_buffer(
                cmd,
                self.attachments.first_hit,
                vk::ImageLayout::GENERAL,
                self.buffers.first_hit.buffer,
                &[region],
            );
            self.device.cmd_pipeline_barrier2(cmd, &host_dependency);
        }
    }

    /// Destroy the pipeline, timer and sweep buffers. Attachments and
    /// descriptors belong to the caller.
    ///
    /// # Safety
    /// The device must be idle with respect to this pass.
    pub unsafe fn destroy(&mut self, allocator: &mut GpuAllocator) -> Result<()> {
        unsafe {
            if let Some(timer) = &self.timer {
                timer.destroy(&self.device);
            }
            self.pipeline.destroy(&self.device);
            self.buffers.free(allocator)
        }
    }
}

impl TileRenderer for VulkanTilePass {
    fn clear(&mut self, bits: ClearBits, color: Vec4) -> Result<()> {
        let cmd = self.recording()?;
        let device = &self.device;
        unsafe {
            if bits.contains(ClearBits::COLOR) {
                let value = vk::ClearColorValue {
                    float32: color.to_array(),
                };
                device.cmd_clear_color_image(
                    cmd,
                    self.attachments.color,
                    vk::ImageLayout::GENERAL,
                    &value,
                    std::slice::from_ref(&COLOR_RANGE),
                );
            }
            if bits.contains(ClearBits::DEPTH) {
                device.cmd_clear_color_image(
                    cmd,
                    self.attachments.first_hit,
                    vk::ImageLayout::GENERAL,
                    &FIRST_HIT_CLEAR,
                    std::slice::from_ref(&COLOR_RANGE),
                );
            }
            self.attachment_barrier(cmd, true);
        }
        debug!("Recorded sweep clear {bits:?}");
        Ok(())
    }

    fn draw_tile(&mut self, draw: &TileDraw<'_>) -> Result<()> {
        let cmd = self.recording()?;
        let extent = self.attachments.extent;
        let rect = draw.tile.rect;
        if !extent.rect().contains_rect(rect) {
            return Err(Error::OutOfBounds(format!(
                "tile {rect:?} outside {extent} attachments"
            )));
        }
        if self.uploaded_sweep != Some(draw.sweep) {
            self.upload_inputs(draw)?;
            self.uploaded_sweep = Some(draw.sweep);
        }

        let color_attachments = [
            self.attachments.color_view,
            self.attachments.first_hit_view,
        ]
        .map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::GENERAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });
        let render_area = tile_rect2d(rect);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);

        let push_constants = RaycastPushConstants::new(
            draw.resources.snapshot,
            draw.resources.params,
            rect,
            extent,
            self.block_size,
        );

        let device = &self.device;
        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_set_viewport(cmd, 0, &[tile_viewport(rect)]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_push_constants(
                cmd,
                self.pipeline.layout,
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(&push_constants),
            );
            // Fullscreen triangle generated in the vertex shader.
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_rendering(cmd);
            self.attachment_barrier(cmd, false);
        }
        Ok(())
    }

    fn finish_sweep(&mut self, eye: Eye, sweep: u64) -> Result<()> {
        let cmd = self.recording()?;
        unsafe { self.record_readback(cmd) };
        self.readback = Readback::Recorded;
        trace!("Recorded {eye} eye sweep {sweep} first-hit readback");
        Ok(())
    }

    /// Attachments belong to the caller; recreate them and call
    /// [`VulkanTilePass::set_attachments`] instead.
    fn resize(&mut self, viewport: ViewportSize) -> Result<()> {
        if viewport == self.attachments.extent {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "tile pass attachments are {}, recreate them for {viewport}",
                self.attachments.extent
            )))
        }
    }

    fn first_hit(&self) -> Option<&[f32]> {
        if self.readback != Readback::Ready {
            return None;
        }
        self.buffers
            .first_hit
            .read(self.attachments.extent.area() as usize)
    }
}
