//! Frame orchestration: device bring-up and the per-frame
//! acquire/record/present loop
//!
//! [`RendererContext`] owns the whole Vulkan object graph in drop-safe
//! order and exposes the two calls a frame is made of:
//! [`begin_frame`](RendererContext::begin_frame) and
//! [`end_frame`](RendererContext::end_frame). Everything between them is
//! command recording through [`CommandRecorder`].

use ash::extensions::khr::Surface;
use ash::vk;
use std::sync::Arc;

use crate::render::config::RendererConfig;
use crate::render::vulkan::{
    AcquireResult, CommandRecorder, Framebuffer, FramebufferSpecification, PhysicalDeviceInfo,
    RenderDevice, Swapchain, VulkanError, VulkanInstance, VulkanResult,
};
use crate::render::window::Window;

/// Outcome of [`RendererContext::begin_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// An image was acquired; record commands and call `end_frame`
    Ready,
    /// The swapchain was stale and has been recreated; skip this frame
    /// and rebuild anything sized to the swapchain extent
    SwapchainStale,
}

/// A present that recreated the chain invalidates everything sized to it,
/// exactly like a stale acquire does
fn status_after_present(recreated: bool) -> FrameStatus {
    if recreated {
        FrameStatus::SwapchainStale
    } else {
        FrameStatus::Ready
    }
}

/// Destroys the surface after the swapchain but before the instance
struct SurfaceGuard {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Top-level renderer state: instance, device, swapchain and the
/// in-progress frame.
///
/// Field order is drop order: the swapchain goes first, then the device,
/// then the surface, and the instance last.
pub struct RendererContext {
    swapchain: Swapchain,
    device: Arc<RenderDevice>,
    surface: SurfaceGuard,
    instance: VulkanInstance,
    recorder: Option<CommandRecorder>,
    current_image: Option<u32>,
    clear_colour: [f32; 4],
}

impl RendererContext {
    /// Bring up the full Vulkan stack against the window's surface
    pub fn new(window: &Window, app_name: &str, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, config.validation_layers)?;

        let raw_surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
            .map_err(VulkanError::Api)?
        };
        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        // From here on the guard destroys the surface on any error path
        let surface = SurfaceGuard {
            loader: surface_loader.clone(),
            surface: raw_surface,
        };

        let physical = PhysicalDeviceInfo::select(
            &instance.instance,
            raw_surface,
            &surface_loader,
            &config.gpu_requirements,
        )?;

        let device = Arc::new(RenderDevice::new(
            &instance.instance,
            physical,
            &config.gpu_requirements,
        )?);

        let (width, height) = window.get_framebuffer_size();
        let swapchain = Swapchain::new(
            device.clone(),
            raw_surface,
            surface_loader,
            vk::Extent2D { width, height },
            config,
        )?;

        Ok(Self {
            swapchain,
            device,
            surface,
            instance,
            recorder: None,
            current_image: None,
            clear_colour: config.clear_colour,
        })
    }

    /// Acquire the next swapchain image and open its command buffer for
    /// recording.
    ///
    /// Returns [`FrameStatus::SwapchainStale`] when the chain had to be
    /// recreated; the caller skips drawing for this iteration and rebuilds
    /// any swapchain-sized resources before the next one.
    pub fn begin_frame(&mut self) -> VulkanResult<FrameStatus> {
        debug_assert!(self.current_image.is_none(), "begin_frame called twice");

        let image_index = match self.swapchain.acquire_next_image()? {
            AcquireResult::Stale => return Ok(FrameStatus::SwapchainStale),
            AcquireResult::Acquired(index) => index,
        };

        let mut recorder = CommandRecorder::new(
            self.device.handle().clone(),
            self.swapchain.current_command_buffer(),
        );
        recorder.begin()?;

        self.recorder = Some(recorder);
        self.current_image = Some(image_index);
        Ok(FrameStatus::Ready)
    }

    /// Close the frame's command buffer, submit it and present the image.
    ///
    /// Returns [`FrameStatus::SwapchainStale`] when presentation recreated
    /// the chain; render passes targeting the swapchain hold views from
    /// the old chain and must be rebuilt before the next frame is recorded.
    pub fn end_frame(&mut self) -> VulkanResult<FrameStatus> {
        let image_index = self.current_image.take().ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: "end_frame without a successful begin_frame".to_string(),
            }
        })?;

        if let Some(mut recorder) = self.recorder.take() {
            recorder.end()?;
        }

        let recreated = self.swapchain.present_image(image_index)?;
        Ok(status_after_present(recreated))
    }

    /// The open frame's command recorder
    pub fn recorder(&mut self) -> VulkanResult<&mut CommandRecorder> {
        self.recorder
            .as_mut()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "no frame in progress".to_string(),
            })
    }

    /// The swapchain image index acquired by the open frame.
    ///
    /// This is the framebuffer index for passes rendering to the
    /// swapchain; it is unrelated to the frame slot index.
    pub fn current_image_index(&self) -> Option<u32> {
        self.current_image
    }

    /// Create a framebuffer, defaulting unspecified dimensions to the
    /// current swapchain extent
    pub fn create_framebuffer(&self, spec: &FramebufferSpecification) -> VulkanResult<Framebuffer> {
        Framebuffer::new(self.device.clone(), spec, self.swapchain.extent())
    }

    /// Note that the window was resized; the swapchain is recreated at
    /// the next present using the new framebuffer size
    pub fn signal_resize(&self, width: u32, height: u32) {
        self.swapchain.signal_resize(width, height);
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }

    /// The logical device, shared with every resource created from it
    pub fn device(&self) -> &Arc<RenderDevice> {
        &self.device
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Number of frame slots cycling through the sync ring
    pub fn frames_in_flight(&self) -> u32 {
        self.swapchain.frames_in_flight()
    }

    /// The current frame slot index in `0..frames_in_flight`
    pub fn current_frame_index(&self) -> u32 {
        self.swapchain.current_frame_index()
    }

    /// Clear colour from the renderer configuration
    pub fn clear_colour(&self) -> [f32; 4] {
        self.clear_colour
    }
}

impl Drop for RendererContext {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_path_recreation_reports_stale() {
        // A resize applied at present time must reach the caller, not
        // vanish behind an Ok(()): the old chain's views are gone.
        assert_eq!(status_after_present(true), FrameStatus::SwapchainStale);
    }

    #[test]
    fn clean_present_reports_ready() {
        assert_eq!(status_after_present(false), FrameStatus::Ready);
    }
}
