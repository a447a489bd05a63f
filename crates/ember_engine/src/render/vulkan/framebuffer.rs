//! Framebuffers: named sets of color + depth/stencil attachments
//!
//! Each attachment is either owned (allocated at the framebuffer's size)
//! or inherited (aliasing an image owned elsewhere). Every attachment's
//! dimensions equal the framebuffer's at all times; inherited attachments
//! are resized once by their owner, and an inheriting framebuffer only
//! verifies the owner got there first.
//!
//! Attachment descriptions, image views and clear values are all derived
//! from one ordered list, and [`RenderPass::for_framebuffer`] consumes
//! that same list, so the attachment order used at render-pass creation
//! can never drift from the view/clear-value order.
//!
//! [`RenderPass::for_framebuffer`]: crate::render::vulkan::RenderPass::for_framebuffer

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::image::{Image2D, ImageFormat, ImageSpecification, ImageUsage};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// What happens to an attachment's previous contents at pass begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachmentLoadOp {
    /// Clear to the attachment's clear value
    #[default]
    Clear,
    /// Preserve previous contents
    Load,
    /// Previous contents are irrelevant
    DontCare,
}

impl AttachmentLoadOp {
    fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
            AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

/// One color attachment slot in a [`FramebufferSpecification`]
#[derive(Clone)]
pub struct AttachmentSpecification {
    /// Pixel format for an owned attachment; ignored when inheriting
    pub format: ImageFormat,
    /// Load behaviour at pass begin
    pub load_op: AttachmentLoadOp,
    /// Clear value; integer formats truncate the components to i32
    pub clear_colour: [f32; 4],
    /// Whether the attachment will be sampled from shaders afterwards
    pub sampled: bool,
    /// Whether the attachment is a transfer source (pixel readback)
    pub transfer_src: bool,
    /// Alias this image instead of allocating one. Ownership stays with
    /// the original owner; resize must happen there first.
    pub inherit_from: Option<Arc<Image2D>>,
}

impl Default for AttachmentSpecification {
    fn default() -> Self {
        Self {
            format: ImageFormat::Rgba8Un,
            load_op: AttachmentLoadOp::Clear,
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            sampled: true,
            transfer_src: false,
            inherit_from: None,
        }
    }
}

/// Parameters for creating a [`Framebuffer`]
#[derive(Clone)]
pub struct FramebufferSpecification {
    /// Debug name, used in log and error messages
    pub name: String,
    /// Width in pixels; zero falls back to the swapchain extent
    pub width: u32,
    /// Height in pixels; zero falls back to the swapchain extent
    pub height: u32,
    /// Ordered color attachment slots
    pub colour_attachments: Vec<AttachmentSpecification>,
    /// Whether to allocate a depth/stencil attachment
    pub depth_stencil: bool,
}

impl Default for FramebufferSpecification {
    fn default() -> Self {
        Self {
            name: "framebuffer".to_string(),
            width: 0,
            height: 0,
            colour_attachments: vec![AttachmentSpecification::default()],
            depth_stencil: true,
        }
    }
}

/// How a resize request resolves against current dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResizeAction {
    /// Zero dimension: warn and leave everything untouched
    Reject,
    /// Dimensions unchanged: nothing to do
    Skip,
    /// Recreate owned attachments at the new size
    Recreate,
}

pub(crate) fn resize_action(current: (u32, u32), requested: (u32, u32)) -> ResizeAction {
    if requested.0 == 0 || requested.1 == 0 {
        ResizeAction::Reject
    } else if requested == current {
        ResizeAction::Skip
    } else {
        ResizeAction::Recreate
    }
}

pub(crate) fn resolve_extent(width: u32, height: u32, fallback: vk::Extent2D) -> (u32, u32) {
    (
        if width == 0 { fallback.width } else { width },
        if height == 0 { fallback.height } else { height },
    )
}

/// Build the clear value an attachment format expects; integer formats
/// clear through the signed-integer union arm
pub(crate) fn clear_value_for(format: ImageFormat, clear_colour: [f32; 4]) -> vk::ClearValue {
    if format.is_integer() {
        vk::ClearValue {
            color: vk::ClearColorValue {
                int32: [
                    clear_colour[0] as i32,
                    clear_colour[1] as i32,
                    clear_colour[2] as i32,
                    clear_colour[3] as i32,
                ],
            },
        }
    } else {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_colour,
            },
        }
    }
}

fn check_inherited_dimensions(
    name: &str,
    image: &Image2D,
    width: u32,
    height: u32,
) -> VulkanResult<()> {
    verify_inherited_dimensions(name, (image.width(), image.height()), (width, height))
}

/// An inheriting framebuffer never resizes a shared image; its owner must
/// already have the target dimensions, and a mismatch means the caller
/// resized in the wrong order.
pub(crate) fn verify_inherited_dimensions(
    name: &str,
    actual: (u32, u32),
    expected: (u32, u32),
) -> VulkanResult<()> {
    let (actual_w, actual_h) = actual;
    let (width, height) = expected;
    debug_assert!(
        actual_w == width && actual_h == height,
        "inherited attachment of '{}' is {}x{}, expected {}x{}; resize the owner first",
        name,
        actual_w,
        actual_h,
        width,
        height
    );
    if actual_w != width || actual_h != height {
        return Err(VulkanError::InvalidOperation {
            reason: format!(
                "inherited attachment of '{}' is {}x{}, expected {}x{}; \
                 the owning framebuffer must be resized first",
                name, actual_w, actual_h, width, height
            ),
        });
    }
    Ok(())
}

struct ColourAttachment {
    image: Arc<Image2D>,
    load_op: AttachmentLoadOp,
    clear_colour: [f32; 4],
    owned: bool,
}

/// Ordered per-attachment data consumed at render-pass creation time.
/// Description, view and clear value come from the same list entry, so
/// their orders agree by construction.
pub(crate) struct AttachmentInfo {
    pub description: vk::AttachmentDescription,
    pub view: vk::ImageView,
    pub clear_value: vk::ClearValue,
    pub image: Arc<Image2D>,
}

/// A named set of color attachments plus an optional depth/stencil
/// attachment, all sized identically
pub struct Framebuffer {
    name: String,
    width: u32,
    height: u32,
    colour: Vec<ColourAttachment>,
    depth: Option<Arc<Image2D>>,
}

impl Framebuffer {
    /// Create attachments per the specification. Zero width or height in
    /// the spec falls back to `fallback_extent` (the swapchain extent).
    pub fn new(
        device: Arc<RenderDevice>,
        spec: &FramebufferSpecification,
        fallback_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let (width, height) = resolve_extent(spec.width, spec.height, fallback_extent);

        let mut colour = Vec::with_capacity(spec.colour_attachments.len());
        for attachment in &spec.colour_attachments {
            let (image, owned) = match &attachment.inherit_from {
                Some(inherited) => {
                    check_inherited_dimensions(&spec.name, inherited, width, height)?;
                    (Arc::clone(inherited), false)
                }
                None => {
                    let mut usage = ImageUsage::COLOR_ATTACHMENT;
                    if attachment.sampled {
                        usage |= ImageUsage::SAMPLED;
                    }
                    // Integer attachments exist to be read back
                    if attachment.transfer_src || attachment.format.is_integer() {
                        usage |= ImageUsage::TRANSFER_SRC;
                    }
                    let image = Image2D::new(
                        device.clone(),
                        &ImageSpecification {
                            format: attachment.format,
                            usage,
                            width,
                            height,
                        },
                    )?;
                    (Arc::new(image), true)
                }
            };

            colour.push(ColourAttachment {
                image,
                load_op: attachment.load_op,
                clear_colour: attachment.clear_colour,
                owned,
            });
        }

        let depth = if spec.depth_stencil {
            let image = Image2D::new(
                device,
                &ImageSpecification {
                    format: ImageFormat::DepthStencil,
                    usage: ImageUsage::DEPTH_STENCIL_ATTACHMENT,
                    width,
                    height,
                },
            )?;
            Some(Arc::new(image))
        } else {
            None
        };

        log::debug!(
            "Framebuffer '{}' created: {}x{}, {} colour attachment(s), depth: {}",
            spec.name,
            width,
            height,
            colour.len(),
            depth.is_some()
        );

        Ok(Self {
            name: spec.name.clone(),
            width,
            height,
            colour,
            depth,
        })
    }

    /// Resize every owned attachment in place.
    ///
    /// Zero dimensions are rejected with a warning and leave all
    /// attachments untouched. Inherited attachments are never resized
    /// here; the owner must already have the new dimensions, and getting
    /// the order wrong is an error.
    pub fn resize(&mut self, width: u32, height: u32) -> VulkanResult<()> {
        match resize_action((self.width, self.height), (width, height)) {
            ResizeAction::Reject => {
                log::warn!(
                    "Ignoring zero-size resize of framebuffer '{}' ({}x{})",
                    self.name,
                    width,
                    height
                );
                return Ok(());
            }
            ResizeAction::Skip => return Ok(()),
            ResizeAction::Recreate => {}
        }

        // Verify inherited attachments before touching anything owned, so
        // a misordered resize fails without partial mutation
        for attachment in &self.colour {
            if !attachment.owned {
                check_inherited_dimensions(&self.name, &attachment.image, width, height)?;
            }
        }

        for attachment in &self.colour {
            if attachment.owned {
                attachment.image.resize(width, height)?;
            }
        }
        if let Some(depth) = &self.depth {
            depth.resize(width, height)?;
        }

        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Read back one texel of an integer-format color attachment.
    ///
    /// Used for entity-ID picking; coordinates are not bounds-checked.
    pub fn read_pixel(&self, attachment_index: usize, x: u32, y: u32) -> VulkanResult<i32> {
        self.colour[attachment_index].image.read_pixel(x, y)
    }

    /// The ordered attachment list: colors in slot order, then depth.
    /// Single source of truth for descriptions, views and clear values.
    pub(crate) fn attachment_infos(&self) -> Vec<AttachmentInfo> {
        let mut infos = Vec::with_capacity(self.colour.len() + 1);

        for attachment in &self.colour {
            let final_layout = if attachment.image.usage().contains(ImageUsage::SAMPLED) {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            };
            let initial_layout = if attachment.load_op == AttachmentLoadOp::Load {
                final_layout
            } else {
                vk::ImageLayout::UNDEFINED
            };

            infos.push(AttachmentInfo {
                description: vk::AttachmentDescription {
                    format: attachment.image.vk_format(),
                    samples: vk::SampleCountFlags::TYPE_1,
                    load_op: attachment.load_op.to_vk(),
                    store_op: vk::AttachmentStoreOp::STORE,
                    stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                    stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                    initial_layout,
                    final_layout,
                    ..Default::default()
                },
                view: attachment.image.view(),
                clear_value: clear_value_for(attachment.image.format(), attachment.clear_colour),
                image: Arc::clone(&attachment.image),
            });
        }

        if let Some(depth) = &self.depth {
            infos.push(AttachmentInfo {
                description: vk::AttachmentDescription {
                    format: depth.vk_format(),
                    samples: vk::SampleCountFlags::TYPE_1,
                    load_op: vk::AttachmentLoadOp::CLEAR,
                    store_op: vk::AttachmentStoreOp::DONT_CARE,
                    stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                    stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                    initial_layout: vk::ImageLayout::UNDEFINED,
                    final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    ..Default::default()
                },
                view: depth.view(),
                clear_value: vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                image: Arc::clone(depth),
            });
        }

        infos
    }

    /// Clear values in attachment-description order
    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.attachment_infos()
            .into_iter()
            .map(|info| info.clear_value)
            .collect()
    }

    /// Image views in attachment-description order
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.attachment_infos()
            .into_iter()
            .map(|info| info.view)
            .collect()
    }

    /// A color attachment's image, for sampling or display elsewhere
    pub fn colour_attachment(&self, index: usize) -> &Arc<Image2D> {
        &self.colour[index].image
    }

    /// Number of color attachments
    pub fn colour_attachment_count(&self) -> usize {
        self.colour.len()
    }

    /// The depth/stencil attachment, when one was requested
    pub fn depth_stencil_attachment(&self) -> Option<&Arc<Image2D>> {
        self.depth.as_ref()
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_spec_extent_falls_back_to_swapchain() {
        let fallback = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        assert_eq!(resolve_extent(0, 0, fallback), (1280, 720));
        assert_eq!(resolve_extent(800, 0, fallback), (800, 720));
        assert_eq!(resolve_extent(800, 600, fallback), (800, 600));
    }

    #[test]
    fn zero_size_resize_is_rejected() {
        assert_eq!(resize_action((800, 600), (0, 600)), ResizeAction::Reject);
        assert_eq!(resize_action((800, 600), (800, 0)), ResizeAction::Reject);
    }

    #[test]
    fn repeated_resize_with_same_dimensions_is_skipped() {
        // First call recreates, second is a no-op: no re-allocation
        assert_eq!(resize_action((800, 600), (1024, 768)), ResizeAction::Recreate);
        assert_eq!(resize_action((1024, 768), (1024, 768)), ResizeAction::Skip);
    }

    #[test]
    fn integer_attachment_clears_through_int_arm() {
        let value = clear_value_for(ImageFormat::R32Si, [-1.0, 0.0, 0.0, 0.0]);
        // Picking attachments clear to -1: "no entity"
        assert_eq!(unsafe { value.color.int32[0] }, -1);
    }

    #[test]
    fn float_attachment_clears_through_float_arm() {
        let value = clear_value_for(ImageFormat::Rgba8Un, [0.1, 0.2, 0.3, 1.0]);
        let floats = unsafe { value.color.float32 };
        assert_eq!(floats, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn matching_inherited_dimensions_pass() {
        assert!(verify_inherited_dimensions("scene", (1024, 768), (1024, 768)).is_ok());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "resize the owner first")]
    fn stale_inherited_dimensions_assert_in_debug() {
        let _ = verify_inherited_dimensions("scene", (800, 600), (1024, 768));
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn stale_inherited_dimensions_are_rejected() {
        let err = verify_inherited_dimensions("scene", (800, 600), (1024, 768)).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidOperation { .. }));
    }
}
