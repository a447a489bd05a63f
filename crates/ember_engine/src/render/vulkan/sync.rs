//! Synchronization primitives for GPU/CPU frame coordination
//!
//! RAII wrappers over semaphores and fences, plus [`FrameSync`], the
//! per-frame-slot triple the swapchain keeps one of per frame in flight.
//! Each frame slot owns its triple exclusively; no cross-slot locking is
//! needed because slots never share sync objects.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive.
///
/// Signaled by one queue operation and waited on by another, without CPU
/// involvement: image acquisition signals, rendering waits; rendering
/// signals, presentation waits.
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Raw semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-GPU synchronization primitive with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally starting in the signaled state.
    ///
    /// In-flight fences start signaled so the first wait on a fresh frame
    /// slot returns immediately.
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Block the calling thread until the fence signals or the timeout
    /// (in nanoseconds) elapses
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Raw fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization triple for one frame-in-flight slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to render to
    pub image_available: Semaphore,
    /// Signaled when the slot's draw command buffer finishes on the GPU
    pub render_finished: Semaphore,
    /// Signaled when all GPU work submitted for this slot has completed.
    /// Waited on before the slot's command buffer is re-recorded.
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the sync objects for one frame slot
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
