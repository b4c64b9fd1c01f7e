//! GPU timestamp timers.
//!
//! A timer owns two query slots. Commands for frame `n` write into the
//! current slot while the results of frame `n - 1` are read from the other
//! one, so polling never stalls on work that is still in flight. The slot in
//! use is chosen by a parity flag that flips on [`GpuTimer::swap`].

use ash::vk;
use tracing::{debug, trace};

use crate::error::{GpuError, Result};

/// Selects one of the two slots of a [`DoubleBuffered`] value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Front,
    Back,
}

impl TimerSlot {
    #[inline]
    const fn from_parity(parity: bool) -> Self {
        if parity {
            Self::Back
        } else {
            Self::Front
        }
    }

    #[inline]
    const fn index(self) -> usize {
        match self {
            Self::Front => 0,
            Self::Back => 1,
        }
    }

    /// First query index of this slot in a two-slot begin/end pool.
    #[inline]
    pub const fn first_query(self) -> u32 {
        self.index() as u32 * QUERIES_PER_SLOT
    }
}

/// Two typed slots, one written this frame and one holding last frame's data.
#[derive(Clone, Debug, Default)]
pub struct DoubleBuffered<T> {
    slots: [T; 2],
    parity: bool,
}

impl<T> DoubleBuffered<T> {
    pub const fn new(front: T, back: T) -> Self {
        Self {
            slots: [front, back],
            parity: false,
        }
    }

    /// Slot written during the current frame.
    #[inline]
    pub const fn current_slot(&self) -> TimerSlot {
        TimerSlot::from_parity(self.parity)
    }

    /// Slot written during the previous frame.
    #[inline]
    pub const fn previous_slot(&self) -> TimerSlot {
        TimerSlot::from_parity(!self.parity)
    }

    #[inline]
    pub const fn current(&self) -> &T {
        &self.slots[self.current_slot().index()]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.slots[self.current_slot().index()]
    }

    #[inline]
    pub const fn previous(&self) -> &T {
        &self.slots[self.previous_slot().index()]
    }

    #[inline]
    pub fn previous_mut(&mut self) -> &mut T {
        &mut self.slots[self.previous_slot().index()]
    }

    /// Flip the parity flag: the current slot becomes the previous one.
    #[inline]
    pub fn swap(&mut self) {
        self.parity = !self.parity;
    }
}

const QUERIES_PER_SLOT: u32 = 2;

/// Recording state of one timer slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum SlotState {
    #[default]
    Empty,
    Begun,
    /// Begin and end timestamps recorded, result not read yet.
    Pending,
}

/// Convert a pair of raw timestamps to milliseconds.
///
/// Only the low `valid_bits` of each timestamp are meaningful, so the delta
/// is computed with wrapping arithmetic and masked.
pub fn ticks_to_ms(begin: u64, end: u64, valid_bits: u32, period_ns: f32) -> f64 {
    let mask = if valid_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << valid_bits) - 1
    };
    let ticks = end.wrapping_sub(begin) & mask;
    ticks as f64 * f64::from(period_ns) / 1_000_000.0
}

/// Begin/end timestamp timer over a double-buffered query pool.
pub struct GpuTimer {
    pool: vk::QueryPool,
    slots: DoubleBuffered<SlotState>,
    period_ns: f32,
    valid_bits: u32,
    last_ms: Option<f64>,
}

impl GpuTimer {
    /// Create a timer.
    ///
    /// `period_ns` is `VkPhysicalDeviceLimits::timestampPeriod` and
    /// `valid_bits` the queue family's `timestampValidBits`.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, period_ns: f32, valid_bits: u32) -> Result<Self> {
        if valid_bits == 0 || period_ns <= 0.0 {
            return Err(GpuError::Unsupported(
                "queue family does not support timestamps".to_string(),
            ));
        }

        let pool_info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(QUERIES_PER_SLOT * 2);

        let pool = unsafe { device.create_query_pool(&pool_info, None) }
            .map_err(|e| GpuError::QueryPool(e.to_string()))?;

        debug!("Created GPU timer ({valid_bits} valid bits, {period_ns} ns/tick)");

        Ok(Self {
            pool,
            slots: DoubleBuffered::default(),
            period_ns,
            valid_bits,
            last_ms: None,
        })
    }

    /// Record the begin timestamp into the current slot.
    ///
    /// # Safety
    /// `cmd` must be in the recording state, outside a render pass instance.
    pub unsafe fn begin(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) {
        let first = self.slots.current_slot().first_query();
        unsafe {
            device.cmd_reset_query_pool(cmd, self.pool, first, QUERIES_PER_SLOT);
            device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, self.pool, first);
        }
        *self.slots.current_mut() = SlotState::Begun;
    }

    /// Record the end timestamp into the current slot.
    ///
    /// # Safety
    /// `cmd` must be in the recording state, after a matching [`Self::begin`].
    pub unsafe fn end(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        if *self.slots.current() != SlotState::Begun {
            return Err(GpuError::InvalidState("timer end without begin".to_string()));
        }
        let first = self.slots.current_slot().first_query();
        unsafe {
            device.cmd_write_timestamp(
                cmd,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                self.pool,
                first + 1,
            );
        }
        *self.slots.current_mut() = SlotState::Pending;
        Ok(())
    }

    /// Flip slots. Call once per frame after the frame's commands are submitted.
    pub fn swap(&mut self) {
        self.slots.swap();
    }

    /// Read the previous slot without blocking.
    ///
    /// Returns `None` if nothing was recorded there or the GPU has not
    /// finished it yet.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn poll(&mut self, device: &ash::Device) -> Result<Option<f64>> {
        unsafe { self.read_previous(device, vk::QueryResultFlags::TYPE_64) }
    }

    /// Read the previous slot, blocking until the GPU has written it.
    ///
    /// Meant for profiling captures, never for the render path.
    ///
    /// # Safety
    /// The device must be valid and the slot's commands must have been submitted.
    pub unsafe fn wait(&mut self, device: &ash::Device) -> Result<Option<f64>> {
        unsafe {
            self.read_previous(
                device,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
    }

    unsafe fn read_previous(
        &mut self,
        device: &ash::Device,
        flags: vk::QueryResultFlags,
    ) -> Result<Option<f64>> {
        if *self.slots.previous() != SlotState::Pending {
            return Ok(None);
        }

        let first = self.slots.previous_slot().first_query();
        let mut timestamps = [0u64; QUERIES_PER_SLOT as usize];
        match unsafe { device.get_query_pool_results(self.pool, first, &mut timestamps, flags) } {
            Ok(()) => {
                let ms = ticks_to_ms(
                    timestamps[0],
                    timestamps[1],
                    self.valid_bits,
                    self.period_ns,
                );
                *self.slots.previous_mut() = SlotState::Empty;
                self.last_ms = Some(ms);
                trace!("GPU timer: {ms:.3} ms");
                Ok(Some(ms))
            }
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(e) => Err(GpuError::QueryPool(e.to_string())),
        }
    }

    /// Most recent measurement in milliseconds.
    pub const fn last_ms(&self) -> Option<f64> {
        self.last_ms
    }

    /// Destroy the query pool.
    ///
    /// # Safety
    /// The device must be idle with respect to this timer's queries.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_query_pool(self.pool, None) };
    }
}
