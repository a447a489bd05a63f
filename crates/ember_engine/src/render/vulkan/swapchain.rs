//! Swapchain, frame-in-flight ring and present loop
//!
//! The swapchain owns the presentable image chain, one [`FrameSync`]
//! triple and one pre-recorded draw command buffer per frame in flight,
//! and the acquire/submit/present state machine. A stale swapchain
//! (out-of-date or suboptimal present result, or an external resize
//! signal) is recreated in place; the device, surface and the sync ring
//! survive recreation, and the frame-slot ring never desyncs from the
//! fence/semaphore arrays because the frame index advances unconditionally
//! in `present_image`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ash::extensions::khr::Surface;
use ash::vk;

use crate::render::config::RendererConfig;
use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Number of presentable images to request: one above the reported
/// minimum, clamped to the maximum when the surface reports one
pub fn clamp_image_count(caps_min: u32, caps_max: u32) -> u32 {
    let desired = caps_min + 1;
    if caps_max > 0 {
        desired.min(caps_max)
    } else {
        desired
    }
}

/// Frames in flight: the configured count, clamped to the actual image
/// count. Never below one.
pub fn clamp_frames_in_flight(desired: u32, image_count: u32) -> u32 {
    desired.clamp(1, image_count)
}

/// Pick the surface format, preferring sRGB B8G8R8A8
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Pick the present mode: FIFO when vsync is forced, otherwise MAILBOX
/// when available with FIFO as the guaranteed fallback
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Derive the swapchain extent from surface capabilities, falling back to
/// the clamped window extent when the surface leaves it unspecified
pub fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                caps.min_image_extent.width,
                caps.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                caps.min_image_extent.height,
                caps.max_image_extent.height,
            ),
        }
    }
}

/// Interpret a `queue_present` result: `Ok(true)` when the chain must be
/// recreated (suboptimal or out-of-date), `Ok(false)` when it is still
/// usable, `Err` for everything else
pub fn interpret_present_result(result: Result<bool, vk::Result>) -> VulkanResult<bool> {
    match result {
        Ok(suboptimal) => Ok(suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

// The latest window framebuffer size, packed into one atomic so resize
// events from the event thread never tear.
fn pack_extent(extent: vk::Extent2D) -> u64 {
    (u64::from(extent.width) << 32) | u64::from(extent.height)
}

fn unpack_extent(packed: u64) -> vk::Extent2D {
    vk::Extent2D {
        width: (packed >> 32) as u32,
        height: packed as u32,
    }
}

/// Result of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image is ready; its index within the swapchain chain
    Acquired(u32),
    /// The swapchain was stale and has been recreated; skip this frame
    Stale,
}

struct ChainObjects {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    image_count: u32,
}

/// The presentable image chain plus per-frame synchronization and draw
/// command buffers
pub struct Swapchain {
    device: Arc<RenderDevice>,
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    image_count: u32,
    frames_in_flight: u32,
    frame_sync: Vec<FrameSync>,
    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    current_frame: u32,
    resize_requested: AtomicBool,
    window_extent: AtomicU64,
    vsync: bool,
}

impl Swapchain {
    /// Create the swapchain, its image views, the per-frame sync ring and
    /// the draw command buffers
    pub fn new(
        device: Arc<RenderDevice>,
        surface: vk::SurfaceKHR,
        surface_loader: Surface,
        window_extent: vk::Extent2D,
        config: &RendererConfig,
    ) -> VulkanResult<Self> {
        let chain = Self::create_chain(
            &device,
            &surface_loader,
            surface,
            window_extent,
            config.vsync,
            vk::SwapchainKHR::null(),
        )?;

        let frames_in_flight =
            clamp_frames_in_flight(config.desired_frames_in_flight, chain.image_count);
        if frames_in_flight != config.desired_frames_in_flight {
            log::warn!(
                "Clamping frames in flight from {} to {} ({} swapchain images)",
                config.desired_frames_in_flight,
                frames_in_flight,
                chain.image_count
            );
        }

        // Draw command buffers are reset per frame, never freed
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(device.queue_families().graphics);

        let command_pool = unsafe {
            device
                .handle()
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight);

        let command_buffers = unsafe {
            device
                .handle()
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        let frame_sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.handle().clone()))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::info!(
            "Swapchain created: {}x{}, {} images, {} frames in flight, format {:?}",
            chain.extent.width,
            chain.extent.height,
            chain.image_count,
            frames_in_flight,
            chain.format.format
        );

        Ok(Self {
            device,
            surface_loader,
            surface,
            swapchain: chain.swapchain,
            images: chain.images,
            image_views: chain.image_views,
            format: chain.format,
            extent: chain.extent,
            image_count: chain.image_count,
            frames_in_flight,
            frame_sync,
            command_pool,
            command_buffers,
            current_frame: 0,
            resize_requested: AtomicBool::new(false),
            window_extent: AtomicU64::new(pack_extent(window_extent)),
            vsync: config.vsync,
        })
    }

    fn create_chain(
        device: &RenderDevice,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        window_extent: vk::Extent2D,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<ChainObjects> {
        let physical = device.physical().device;

        let caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map_err(VulkanError::Api)?
        };

        let format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes, vsync);
        let extent = choose_extent(&caps, window_extent);
        let image_count = clamp_image_count(caps.min_image_count, caps.max_image_count);

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        // Exclusive sharing when graphics and present share a family,
        // concurrent otherwise
        create_info = if families.same_graphics_present() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let loader = device.swapchain_loader();
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match device.create_image_view(image, format.format, vk::ImageAspectFlags::COLOR) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for view in image_views {
                            device.handle().destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(e);
                }
            }
        }

        Ok(ChainObjects {
            swapchain,
            image_count: images.len() as u32,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Wait for the current frame slot's fence, then acquire the next
    /// presentable image.
    ///
    /// On out-of-date the swapchain is recreated immediately and
    /// [`AcquireResult::Stale`] is returned; the caller skips rendering
    /// and presenting for this frame. On success the slot's fence is reset
    /// and its command buffer is reset (not freed), ready for re-recording.
    pub fn acquire_next_image(&mut self) -> VulkanResult<AcquireResult> {
        let frame = self.current_frame as usize;

        // The slot's previous GPU work must finish before its command
        // buffer is touched again. A GPU hang shows up here as an
        // apparent freeze, not a timeout.
        self.frame_sync[frame].in_flight.wait(u64::MAX)?;

        let acquire = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.frame_sync[frame].image_available.handle(),
                vk::Fence::null(),
            )
        };

        let image_index = match acquire {
            Ok((index, _suboptimal)) => index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.invalidate()?;
                return Ok(AcquireResult::Stale);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        self.frame_sync[frame].in_flight.reset()?;
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(
                    self.command_buffers[frame],
                    vk::CommandBufferResetFlags::empty(),
                )
                .map_err(VulkanError::Api)?;
        }

        Ok(AcquireResult::Acquired(image_index))
    }

    /// Submit the current frame slot's draw command buffer and present the
    /// given image.
    ///
    /// Submission waits on the slot's image-available semaphore at the
    /// color-output stage, signals render-finished and the in-flight
    /// fence; presentation waits on render-finished. A stale present
    /// result or a pending resize signal triggers recreation. The frame
    /// index advances unconditionally, including after recreation, so the
    /// frame-slot ring stays aligned with the sync arrays.
    ///
    /// Returns `true` when the chain was recreated. The previous chain's
    /// image views are gone at that point, so every render pass built over
    /// them must be rebuilt before the next frame is recorded.
    pub fn present_image(&mut self, image_index: u32) -> VulkanResult<bool> {
        let frame = self.current_frame as usize;
        let sync = &self.frame_sync[frame];

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[frame]];
        let signal_semaphores = [sync.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .handle()
                .queue_submit(
                    self.device.graphics_queue(),
                    &[submit_info.build()],
                    sync.in_flight.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.present_queue(), &present_info)
        };

        let stale = interpret_present_result(present)?;

        // Read-then-clear on the submission thread; setters only flag
        let resize_requested = self.resize_requested.swap(false, Ordering::Relaxed);

        let recreated = stale || resize_requested;
        if recreated {
            self.invalidate()?;
        }

        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
        Ok(recreated)
    }

    /// Flag the swapchain for recreation at the new framebuffer size.
    /// Callable from any thread observing a window-resize event; the flag
    /// is checked synchronously inside `present_image`.
    pub fn signal_resize(&self, width: u32, height: u32) {
        self.window_extent.store(
            pack_extent(vk::Extent2D { width, height }),
            Ordering::Relaxed,
        );
        self.resize_requested.store(true, Ordering::Relaxed);
    }

    /// Destroy and recreate the swapchain and its image views from the
    /// current surface capabilities. Sync objects, the command pool and
    /// the frames-in-flight count are preserved.
    fn invalidate(&mut self) -> VulkanResult<()> {
        self.device.wait_idle()?;

        // The latest window size matters on surfaces that leave
        // current_extent unspecified; elsewhere the capabilities win.
        let window_extent = unpack_extent(self.window_extent.load(Ordering::Relaxed));
        let chain = Self::create_chain(
            &self.device,
            &self.surface_loader,
            self.surface,
            window_extent,
            self.vsync,
            self.swapchain,
        )?;

        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
        }

        log::info!(
            "Swapchain recreated: {}x{} ({} images)",
            chain.extent.width,
            chain.extent.height,
            chain.image_count
        );

        self.swapchain = chain.swapchain;
        self.images = chain.images;
        self.image_views = chain.image_views;
        self.format = chain.format;
        self.extent = chain.extent;
        self.image_count = chain.image_count;

        Ok(())
    }

    /// The current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// The chosen surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// The presentable images, in chain order
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Image views over the presentable images, in chain order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of presentable images in the chain
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Number of frames in flight; fixed after creation
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// The current frame slot index in `0..frames_in_flight`
    pub fn current_frame_index(&self) -> u32 {
        self.current_frame
    }

    /// The current frame slot's draw command buffer
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffers[self.current_frame as usize]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device
                .swapchain_loader()
                .destroy_swapchain(self.swapchain, None);
            self.device
                .handle()
                .destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_count_clamps_to_reported_maximum() {
        // min 2, max 3: requesting min+1 = 3 stays within the maximum
        assert_eq!(clamp_image_count(2, 3), 3);
        // min 2, max 2: clamped down
        assert_eq!(clamp_image_count(2, 2), 2);
        // max 0 means unlimited
        assert_eq!(clamp_image_count(3, 0), 4);
    }

    #[test]
    fn frames_in_flight_scenario_min2_max3_desired3() {
        let image_count = clamp_image_count(2, 3);
        assert_eq!(image_count, 3);
        assert_eq!(clamp_frames_in_flight(3, image_count), 3);
    }

    #[test]
    fn frames_in_flight_never_exceed_image_count() {
        assert_eq!(clamp_frames_in_flight(3, 2), 2);
        assert_eq!(clamp_frames_in_flight(2, 3), 2);
        assert_eq!(clamp_frames_in_flight(0, 3), 1);
    }

    #[test]
    fn frame_index_ring_wraps_for_every_slot_count() {
        for frames_in_flight in 1u32..=3 {
            let mut index = 0u32;
            let mut seen = vec![0u32; frames_in_flight as usize];
            for _ in 0..(frames_in_flight * 4) {
                seen[index as usize] += 1;
                index = (index + 1) % frames_in_flight;
            }
            // Unconditional advance visits every slot equally
            assert!(seen.iter().all(|&count| count == 4));
            assert_eq!(index, 0);
        }
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn present_mode_respects_vsync() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);

        let fifo_only = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&fifo_only, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_surface_value_when_fixed() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        let extent = choose_extent(&caps, vk::Extent2D { width: 1, height: 1 });
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn extent_clamps_window_size_when_unspecified() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 2000,
                height: 50,
            },
        );
        assert_eq!(extent.width, 1000);
        assert_eq!(extent.height, 100);
    }

    #[test]
    fn out_of_date_present_requires_recreation() {
        assert!(interpret_present_result(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap());
    }

    #[test]
    fn suboptimal_present_requires_recreation() {
        assert!(interpret_present_result(Ok(true)).unwrap());
    }

    #[test]
    fn clean_present_keeps_the_chain() {
        assert!(!interpret_present_result(Ok(false)).unwrap());
    }

    #[test]
    fn present_device_loss_is_an_error() {
        let err = interpret_present_result(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(matches!(
            err,
            VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn packed_window_extent_survives_the_round_trip() {
        let extent = vk::Extent2D {
            width: 2560,
            height: 1440,
        };
        let unpacked = unpack_extent(pack_extent(extent));
        assert_eq!(unpacked.width, 2560);
        assert_eq!(unpacked.height, 1440);
    }
}
