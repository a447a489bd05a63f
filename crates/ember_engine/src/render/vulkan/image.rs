//! GPU-resident 2D images with explicit layout tracking
//!
//! [`Image2D`] wraps image + memory + view (+ sampler when sampled) for any
//! usage: color attachment, depth/stencil, or sampled texture. The current
//! image layout is tracked on the CPU and never queried from the driver;
//! transitions outside the supported table are programming errors, not
//! silently-accepted no-ops, because an unhandled pair would produce a
//! race with no synchronization at all.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use bitflags::bitflags;

use crate::render::vulkan::buffer::StagingBuffer;
use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Engine-level image formats.
///
/// `DepthStencil` resolves to the device's process-wide depth/stencil
/// format, selected once at device creation from the preference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// 8-bit single channel, unsigned normalized
    R8Un,
    /// 32-bit single channel, signed integer (entity-ID picking)
    R32Si,
    /// 32-bit single channel float
    R32F,
    /// 8-bit RGBA, unsigned normalized
    Rgba8Un,
    /// 8-bit RGBA, sRGB
    Srgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float RGBA
    Rgba32F,
    /// Packed 11/11/10 unsigned float RGB
    B10G11R11Uf,
    /// The device-selected depth/stencil format
    DepthStencil,
}

impl ImageFormat {
    /// Resolve to the concrete Vulkan format
    pub fn to_vk(self, device: &RenderDevice) -> vk::Format {
        match self {
            ImageFormat::R8Un => vk::Format::R8_UNORM,
            ImageFormat::R32Si => vk::Format::R32_SINT,
            ImageFormat::R32F => vk::Format::R32_SFLOAT,
            ImageFormat::Rgba8Un => vk::Format::R8G8B8A8_UNORM,
            ImageFormat::Srgba8 => vk::Format::R8G8B8A8_SRGB,
            ImageFormat::Rgba16F => vk::Format::R16G16B16A16_SFLOAT,
            ImageFormat::Rgba32F => vk::Format::R32G32B32A32_SFLOAT,
            ImageFormat::B10G11R11Uf => vk::Format::B10G11R11_UFLOAT_PACK32,
            ImageFormat::DepthStencil => device.depth_stencil_format(),
        }
    }

    /// Integer formats must be sampled with NEAREST filtering
    pub fn is_integer(self) -> bool {
        matches!(self, ImageFormat::R32Si)
    }

    /// Whether this is the depth/stencil format
    pub fn is_depth(self) -> bool {
        matches!(self, ImageFormat::DepthStencil)
    }
}

bitflags! {
    /// Requested image usages, mapped onto `vk::ImageUsageFlags`
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ImageUsage: u32 {
        /// Render target for color output
        const COLOR_ATTACHMENT = 1 << 0;
        /// Render target for depth/stencil output
        const DEPTH_STENCIL_ATTACHMENT = 1 << 1;
        /// Sampled from shaders; a sampler is created alongside the view
        const SAMPLED = 1 << 2;
        /// Source of transfer operations (pixel readback)
        const TRANSFER_SRC = 1 << 3;
        /// Destination of transfer operations (texture upload)
        const TRANSFER_DST = 1 << 4;
    }
}

impl ImageUsage {
    fn to_vk(self) -> vk::ImageUsageFlags {
        let mut flags = vk::ImageUsageFlags::empty();
        if self.contains(ImageUsage::COLOR_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.contains(ImageUsage::SAMPLED) {
            flags |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(ImageUsage::TRANSFER_SRC) {
            flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if self.contains(ImageUsage::TRANSFER_DST) {
            flags |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        flags
    }
}

/// Parameters for creating an [`Image2D`]
#[derive(Debug, Clone)]
pub struct ImageSpecification {
    /// Pixel format
    pub format: ImageFormat,
    /// Requested usages
    pub usage: ImageUsage,
    /// Width in pixels (must be non-zero)
    pub width: u32,
    /// Height in pixels (must be non-zero)
    pub height: u32,
}

/// Barrier masks for one supported layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that must wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Pipeline stage producing the old layout's contents
    pub src_stage: vk::PipelineStageFlags,
    /// Pipeline stage consuming the new layout's contents
    pub dst_stage: vk::PipelineStageFlags,
}

const fn masks(
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) -> TransitionMasks {
    TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    }
}

/// The fixed table of supported (old, new) layout pairs.
///
/// Each entry pins down the access-mask/stage pairs for the barrier; pairs
/// outside the table are rejected rather than guessed at.
pub const SUPPORTED_TRANSITIONS: &[(vk::ImageLayout, vk::ImageLayout, TransitionMasks)] = &[
    (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        masks(
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ),
    (
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        masks(
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    ),
    (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        masks(
            vk::AccessFlags::empty(),
            vk::AccessFlags::from_raw(
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
            ),
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
    ),
    (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        masks(
            vk::AccessFlags::empty(),
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
    ),
    (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        masks(
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    ),
    (
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        masks(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    ),
    (
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        masks(
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
    ),
    (
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        masks(
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ),
    (
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        masks(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ),
    (
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        masks(
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
    ),
    (
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        masks(
            vk::AccessFlags::SHADER_READ,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
        ),
    ),
    (
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        masks(
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    ),
];

/// What a requested transition resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionAction {
    /// Current layout already matches; zero driver calls
    Skip,
    /// Insert a pipeline barrier with the given masks
    Barrier(TransitionMasks),
}

/// Look up the barrier masks for a layout pair
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    SUPPORTED_TRANSITIONS
        .iter()
        .find(|(from, to, _)| *from == old && *to == new)
        .map(|(_, _, masks)| *masks)
}

/// Resolve a transition request against the supported table.
///
/// A same-to-same request is a no-op; an unsupported pair is an error, and
/// a `debug_assert` in debug builds, because proceeding without a barrier
/// would race.
pub fn plan_transition(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<TransitionAction> {
    if old == new {
        return Ok(TransitionAction::Skip);
    }

    match transition_masks(old, new) {
        Some(masks) => Ok(TransitionAction::Barrier(masks)),
        None => {
            debug_assert!(false, "unsupported layout transition {:?} -> {:?}", old, new);
            Err(VulkanError::UnsupportedLayoutTransition { old, new })
        }
    }
}

struct ImageState {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    width: u32,
    height: u32,
    layout: vk::ImageLayout,
}

/// A GPU-resident 2D image with tracked layout.
///
/// Shared between owners and inheriting framebuffers via `Arc`; internal
/// state sits behind a mutex so resize and layout transitions work through
/// a shared handle. All access is expected from the render thread.
pub struct Image2D {
    device: Arc<RenderDevice>,
    format: ImageFormat,
    vk_format: vk::Format,
    usage: ImageUsage,
    sampler: Option<vk::Sampler>,
    state: Mutex<ImageState>,
}

impl Image2D {
    /// Create a new image per the specification.
    ///
    /// Depth/stencil attachments are transitioned to their attachment
    /// layout immediately; everything else starts `UNDEFINED`.
    pub fn new(device: Arc<RenderDevice>, spec: &ImageSpecification) -> VulkanResult<Self> {
        if spec.width == 0 || spec.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "image dimensions must be non-zero, got {}x{}",
                    spec.width, spec.height
                ),
            });
        }

        let vk_format = spec.format.to_vk(&device);
        let state = Self::create_state(&device, spec, vk_format)?;

        let sampler = if spec.usage.contains(ImageUsage::SAMPLED) {
            // Integer formats cannot be linearly filtered
            let filter = if spec.format.is_integer() {
                vk::Filter::NEAREST
            } else {
                vk::Filter::LINEAR
            };
            Some(device.create_sampler(
                filter,
                vk::SamplerMipmapMode::LINEAR,
                vk::SamplerAddressMode::REPEAT,
            )?)
        } else {
            None
        };

        let image = Self {
            device,
            format: spec.format,
            vk_format,
            usage: spec.usage,
            sampler,
            state: Mutex::new(state),
        };

        if spec.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            image.transition_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;
        }

        Ok(image)
    }

    fn create_state(
        device: &RenderDevice,
        spec: &ImageSpecification,
        vk_format: vk::Format,
    ) -> VulkanResult<ImageState> {
        let (image, memory) = device.create_image(
            spec.width,
            spec.height,
            vk_format,
            vk::ImageTiling::OPTIMAL,
            spec.usage.to_vk(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let aspect = aspect_mask(spec.format, vk_format);
        let view = match device.create_image_view(image, vk_format, aspect) {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.handle().destroy_image(image, None);
                    device.handle().free_memory(memory, None);
                }
                return Err(e);
            }
        };

        Ok(ImageState {
            image,
            memory,
            view,
            width: spec.width,
            height: spec.height,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    fn state(&self) -> MutexGuard<'_, ImageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pixel format
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// The resolved Vulkan format
    pub fn vk_format(&self) -> vk::Format {
        self.vk_format
    }

    /// Requested usages
    pub fn usage(&self) -> ImageUsage {
        self.usage
    }

    /// Current width in pixels
    pub fn width(&self) -> u32 {
        self.state().width
    }

    /// Current height in pixels
    pub fn height(&self) -> u32 {
        self.state().height
    }

    /// Raw image handle
    pub fn image(&self) -> vk::Image {
        self.state().image
    }

    /// Raw image view handle
    pub fn view(&self) -> vk::ImageView {
        self.state().view
    }

    /// Sampler handle, present when created with `SAMPLED` usage
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    /// The tracked image layout
    pub fn layout(&self) -> vk::ImageLayout {
        self.state().layout
    }

    /// Transition the image to a new layout.
    ///
    /// No-op when the tracked layout already matches. The barrier runs on a
    /// synchronous single-time command buffer; transitions happen at setup
    /// or resize time, never per-draw.
    pub fn transition_layout(&self, new: vk::ImageLayout) -> VulkanResult<()> {
        let mut state = self.state();
        self.transition_locked(&mut state, new)
    }

    fn transition_locked(&self, state: &mut ImageState, new: vk::ImageLayout) -> VulkanResult<()> {
        let masks = match plan_transition(state.layout, new)? {
            TransitionAction::Skip => return Ok(()),
            TransitionAction::Barrier(masks) => masks,
        };

        let aspect = aspect_mask(self.format, self.vk_format);
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(state.layout)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(state.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access)
            .build();

        self.device.single_time_commands(|device, command_buffer| unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        })?;

        state.layout = new;
        Ok(())
    }

    /// Recreate the image at a new size. The layout resets to `UNDEFINED`
    /// (depth/stencil attachments re-transition immediately). Zero
    /// dimensions are rejected with a warning and leave the image untouched;
    /// a matching size is a no-op.
    pub fn resize(&self, width: u32, height: u32) -> VulkanResult<()> {
        if width == 0 || height == 0 {
            log::warn!(
                "Ignoring zero-size image resize request ({}x{})",
                width,
                height
            );
            return Ok(());
        }

        let mut state = self.state();
        if state.width == width && state.height == height {
            return Ok(());
        }

        // The old image may still be referenced by in-flight work
        self.device.wait_idle()?;

        let spec = ImageSpecification {
            format: self.format,
            usage: self.usage,
            width,
            height,
        };
        let new_state = Self::create_state(&self.device, &spec, self.vk_format)?;

        unsafe {
            let device = self.device.handle();
            device.destroy_image_view(state.view, None);
            device.destroy_image(state.image, None);
            device.free_memory(state.memory, None);
        }
        *state = new_state;

        if self.usage.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
            self.transition_locked(&mut state, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;
        }

        Ok(())
    }

    /// Upload tightly packed pixel data via a staging buffer, leaving the
    /// image in `SHADER_READ_ONLY_OPTIMAL`
    pub fn upload(&self, data: &[u8]) -> VulkanResult<()> {
        let staging = StagingBuffer::new(self.device.clone(), data)?;

        let mut state = self.state();
        self.transition_locked(&mut state, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        self.device.copy_buffer_to_image(
            staging.handle(),
            state.image,
            state.width,
            state.height,
            vk::ImageAspectFlags::COLOR,
        )?;
        self.transition_locked(&mut state, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        Ok(())
    }

    /// Read back a single texel as a signed 32-bit integer.
    ///
    /// Used for entity-ID picking against `R32Si` attachments. Coordinates
    /// are the caller's responsibility; they are not bounds-checked.
    pub fn read_pixel(&self, x: u32, y: u32) -> VulkanResult<i32> {
        let mut state = self.state();

        let previous_layout = state.layout;
        self.transition_locked(&mut state, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

        let (buffer, memory) = self.device.create_buffer(
            std::mem::size_of::<i32>() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let image = state.image;
        let copy_result = self.device.single_time_commands(|device, command_buffer| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D {
                    x: x as i32,
                    y: y as i32,
                    z: 0,
                },
                image_extent: vk::Extent3D {
                    width: 1,
                    height: 1,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_image_to_buffer(
                    command_buffer,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    buffer,
                    &[region],
                );
            }
        });

        let value = copy_result.and_then(|()| unsafe {
            let ptr = self
                .device
                .handle()
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            let value = std::ptr::read_unaligned(ptr as *const i32);
            self.device.handle().unmap_memory(memory);
            Ok(value)
        });

        unsafe {
            self.device.handle().destroy_buffer(buffer, None);
            self.device.handle().free_memory(memory, None);
        }

        self.transition_locked(&mut state, previous_layout)?;

        value
    }

    /// Descriptor info for binding this image as a sampled texture
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        let state = self.state();
        vk::DescriptorImageInfo {
            sampler: self.sampler.unwrap_or(vk::Sampler::null()),
            image_view: state.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Overwrite the tracked layout without inserting a barrier.
    ///
    /// Used by render passes, whose final-layout transition happens inside
    /// the pass rather than through [`Image2D::transition_layout`].
    pub(crate) fn set_tracked_layout(&self, layout: vk::ImageLayout) {
        self.state().layout = layout;
    }
}

impl Drop for Image2D {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        unsafe {
            let device = self.device.handle();
            if let Some(sampler) = self.sampler {
                device.destroy_sampler(sampler, None);
            }
            device.destroy_image_view(state.view, None);
            device.destroy_image(state.image, None);
            device.free_memory(state.memory, None);
        }
    }
}

fn aspect_mask(format: ImageFormat, vk_format: vk::Format) -> vk::ImageAspectFlags {
    if format.is_depth() {
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(vk_format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        aspect
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // A call-counting mock of the transition path: applies plan_transition
    // to a tracked layout and counts barriers that would reach the driver.
    struct MockTracker {
        layout: vk::ImageLayout,
        barrier_calls: u32,
    }

    impl MockTracker {
        fn new(layout: vk::ImageLayout) -> Self {
            Self {
                layout,
                barrier_calls: 0,
            }
        }

        fn transition(&mut self, new: vk::ImageLayout) -> VulkanResult<()> {
            match plan_transition(self.layout, new)? {
                TransitionAction::Skip => {}
                TransitionAction::Barrier(_) => {
                    self.barrier_calls += 1;
                    self.layout = new;
                }
            }
            Ok(())
        }
    }

    #[test]
    fn same_layout_is_zero_driver_calls() {
        let mut tracker = MockTracker::new(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        tracker
            .transition(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .unwrap();
        assert_eq!(tracker.barrier_calls, 0);
        assert_eq!(tracker.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn reversible_pairs_round_trip_tracked_layout() {
        for &(old, new, _) in SUPPORTED_TRANSITIONS {
            if transition_masks(new, old).is_none() {
                continue;
            }

            let mut tracker = MockTracker::new(old);
            tracker.transition(new).unwrap();
            tracker.transition(old).unwrap();
            assert_eq!(tracker.layout, old, "{:?} <-> {:?}", old, new);
            assert_eq!(tracker.barrier_calls, 2);
        }
    }

    #[test]
    fn minimum_required_pairs_are_supported() {
        let required = [
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
            (
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
        ];

        for (old, new) in required {
            assert!(
                transition_masks(old, new).is_some(),
                "required pair {:?} -> {:?} missing",
                old,
                new
            );
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn unsupported_pair_is_an_error() {
        let result = plan_transition(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "unsupported layout transition")]
    #[cfg(debug_assertions)]
    fn unsupported_pair_asserts_in_debug() {
        let _ = plan_transition(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
    }

    #[test]
    fn undefined_never_a_destination() {
        for &(_, to, _) in SUPPORTED_TRANSITIONS {
            assert_ne!(to, vk::ImageLayout::UNDEFINED);
        }
    }

    #[test]
    fn transitions_from_undefined_have_no_source_access() {
        for &(from, _, masks) in SUPPORTED_TRANSITIONS {
            if from == vk::ImageLayout::UNDEFINED {
                assert_eq!(masks.src_access, vk::AccessFlags::empty());
                assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
            }
        }
    }

    #[test]
    fn integer_formats_flagged() {
        assert!(ImageFormat::R32Si.is_integer());
        assert!(!ImageFormat::Rgba8Un.is_integer());
        assert!(!ImageFormat::R32F.is_integer());
    }

    #[test]
    fn usage_flags_map_to_vulkan() {
        let usage = ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED;
        let vk_flags = usage.to_vk();
        assert!(vk_flags.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(vk_flags.contains(vk::ImageUsageFlags::SAMPLED));
        assert!(!vk_flags.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }
}
