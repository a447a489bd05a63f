//! Render passes and their framebuffer handles
//!
//! A [`RenderPass`] is always built from an existing target: either a
//! [`Framebuffer`]'s own attachment list or the swapchain. Building from
//! the framebuffer's `attachment_infos` means the attachment-description
//! order, the view order and the clear-value order all come from one list
//! and cannot disagree.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::image::Image2D;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A render pass plus the `vk::Framebuffer` handle(s) it renders into
pub struct RenderPass {
    device: Arc<RenderDevice>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    extent: vk::Extent2D,
    clear_values: Vec<vk::ClearValue>,
    colour_attachment_count: u32,
}

impl RenderPass {
    /// Build a render pass over a framebuffer's attachments.
    ///
    /// Consumes the framebuffer's ordered attachment list, so description
    /// order matches view and clear-value order by construction. The
    /// attachments' tracked layouts are set to the pass's final layouts;
    /// every execution of the pass leaves them there.
    pub fn for_framebuffer(
        device: Arc<RenderDevice>,
        framebuffer: &Framebuffer,
    ) -> VulkanResult<Self> {
        let infos = framebuffer.attachment_infos();
        let has_depth = framebuffer.depth_stencil_attachment().is_some();
        let colour_count = framebuffer.colour_attachment_count() as u32;

        let descriptions: Vec<vk::AttachmentDescription> =
            infos.iter().map(|info| info.description).collect();
        let clear_values: Vec<vk::ClearValue> =
            infos.iter().map(|info| info.clear_value).collect();
        let views: Vec<vk::ImageView> = infos.iter().map(|info| info.view).collect();

        let render_pass = create_render_pass(&device, &descriptions, colour_count, has_depth)?;

        let extent = vk::Extent2D {
            width: framebuffer.width(),
            height: framebuffer.height(),
        };
        let framebuffers =
            match create_framebuffer_handles(&device, render_pass, &[views], extent) {
                Ok(handles) => handles,
                Err(e) => {
                    unsafe { device.handle().destroy_render_pass(render_pass, None) };
                    return Err(e);
                }
            };

        for info in &infos {
            info.image.set_tracked_layout(info.description.final_layout);
        }

        Ok(Self {
            device,
            render_pass,
            framebuffers,
            extent,
            clear_values,
            colour_attachment_count: colour_count,
        })
    }

    /// Build a render pass presenting to the swapchain, with one
    /// `vk::Framebuffer` per presentable image and an optional shared
    /// depth attachment
    pub fn for_swapchain(
        device: Arc<RenderDevice>,
        swapchain: &Swapchain,
        clear_colour: [f32; 4],
        depth: Option<&Arc<Image2D>>,
    ) -> VulkanResult<Self> {
        let mut descriptions = vec![vk::AttachmentDescription {
            format: swapchain.format().format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        }];
        let mut clear_values = vec![vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_colour,
            },
        }];

        if let Some(depth) = depth {
            descriptions.push(vk::AttachmentDescription {
                format: depth.vk_format(),
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                ..Default::default()
            });
            clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });
        }

        let render_pass = create_render_pass(&device, &descriptions, 1, depth.is_some())?;

        let view_sets: Vec<Vec<vk::ImageView>> = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let mut views = vec![view];
                if let Some(depth) = depth {
                    views.push(depth.view());
                }
                views
            })
            .collect();

        let extent = swapchain.extent();
        let framebuffers =
            match create_framebuffer_handles(&device, render_pass, &view_sets, extent) {
                Ok(handles) => handles,
                Err(e) => {
                    unsafe { device.handle().destroy_render_pass(render_pass, None) };
                    return Err(e);
                }
            };

        Ok(Self {
            device,
            render_pass,
            framebuffers,
            extent,
            clear_values,
            colour_attachment_count: 1,
        })
    }

    /// Rebuild the `vk::Framebuffer` handles after the target framebuffer
    /// was resized. The pass itself survives; attachment formats are
    /// unchanged by a resize.
    pub fn rebuild_for_framebuffer(&mut self, framebuffer: &Framebuffer) -> VulkanResult<()> {
        let infos = framebuffer.attachment_infos();
        let views: Vec<vk::ImageView> = infos.iter().map(|info| info.view).collect();
        let extent = vk::Extent2D {
            width: framebuffer.width(),
            height: framebuffer.height(),
        };

        let new_handles =
            create_framebuffer_handles(&self.device, self.render_pass, &[views], extent)?;
        self.destroy_framebuffer_handles();
        self.framebuffers = new_handles;
        self.extent = extent;

        for info in &infos {
            info.image.set_tracked_layout(info.description.final_layout);
        }
        Ok(())
    }

    /// Rebuild the per-image `vk::Framebuffer` handles after swapchain
    /// recreation
    pub fn rebuild_for_swapchain(
        &mut self,
        swapchain: &Swapchain,
        depth: Option<&Arc<Image2D>>,
    ) -> VulkanResult<()> {
        let view_sets: Vec<Vec<vk::ImageView>> = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let mut views = vec![view];
                if let Some(depth) = depth {
                    views.push(depth.view());
                }
                views
            })
            .collect();

        let extent = swapchain.extent();
        let new_handles =
            create_framebuffer_handles(&self.device, self.render_pass, &view_sets, extent)?;
        self.destroy_framebuffer_handles();
        self.framebuffers = new_handles;
        self.extent = extent;
        Ok(())
    }

    fn destroy_framebuffer_handles(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        self.framebuffers.clear();
    }

    /// Raw render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// The `vk::Framebuffer` for the given image index. Offscreen passes
    /// have exactly one; swapchain passes one per presentable image.
    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        if self.framebuffers.len() == 1 {
            self.framebuffers[0]
        } else {
            self.framebuffers[index]
        }
    }

    /// The render area extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Clear values in attachment-description order
    pub fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    /// Number of color attachments, needed for pipeline blend state
    pub fn colour_attachment_count(&self) -> u32 {
        self.colour_attachment_count
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.destroy_framebuffer_handles();
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
    }
}

fn create_render_pass(
    device: &RenderDevice,
    descriptions: &[vk::AttachmentDescription],
    colour_count: u32,
    has_depth: bool,
) -> VulkanResult<vk::RenderPass> {
    let colour_refs: Vec<vk::AttachmentReference> = (0..colour_count)
        .map(|index| vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();

    let depth_ref = vk::AttachmentReference {
        attachment: colour_count,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let mut subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&colour_refs);
    if has_depth {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }
    let subpasses = [subpass.build()];

    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    };

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(descriptions)
        .subpasses(&subpasses)
        .dependencies(std::slice::from_ref(&dependency));

    unsafe {
        device
            .handle()
            .create_render_pass(&create_info, None)
            .map_err(VulkanError::Api)
    }
}

fn create_framebuffer_handles(
    device: &RenderDevice,
    render_pass: vk::RenderPass,
    view_sets: &[Vec<vk::ImageView>],
    extent: vk::Extent2D,
) -> VulkanResult<Vec<vk::Framebuffer>> {
    let mut handles = Vec::with_capacity(view_sets.len());
    for views in view_sets {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.handle().create_framebuffer(&create_info, None) } {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                unsafe {
                    for &handle in &handles {
                        device.handle().destroy_framebuffer(handle, None);
                    }
                }
                return Err(VulkanError::Api(e));
            }
        }
    }
    Ok(handles)
}
