//! Graphics pipeline creation
//!
//! Pipelines take their descriptor-set layouts from the shader and their
//! attachment count from the render pass; viewport and scissor are
//! dynamic state, so a swapchain or framebuffer resize never forces a
//! pipeline rebuild.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::Shader;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// One vertex attribute within a [`VertexLayout`]
#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Attribute format
    pub format: vk::Format,
    /// Byte offset within the vertex
    pub offset: u32,
}

/// Describes how vertex data is laid out in buffer memory
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    /// Bytes between consecutive vertices
    pub stride: u32,
    /// Per-vertex attributes
    pub attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    /// Start a layout with the given stride
    pub fn new(stride: u32) -> Self {
        Self {
            stride,
            attributes: Vec::new(),
        }
    }

    /// Append an attribute at the next shader location
    pub fn attribute(mut self, format: vk::Format, offset: u32) -> Self {
        let location = self.attributes.len() as u32;
        self.attributes.push(VertexAttribute {
            location,
            format,
            offset,
        });
        self
    }

    fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                binding: 0,
                location: attribute.location,
                format: attribute.format,
                offset: attribute.offset,
            })
            .collect()
    }
}

/// Fixed-function state for a [`GraphicsPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineSpecification {
    /// Vertex input layout; empty for vertex-free full-screen passes
    pub vertex_layout: VertexLayout,
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writes
    pub depth_write: bool,
    /// Enable standard alpha blending on all color attachments
    pub blending: bool,
    /// Face culling mode
    pub cull_mode: vk::CullModeFlags,
    /// Push-constant ranges visible to the pipeline
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Default for PipelineSpecification {
    fn default() -> Self {
        Self {
            vertex_layout: VertexLayout::default(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            depth_test: true,
            depth_write: true,
            blending: false,
            cull_mode: vk::CullModeFlags::BACK,
            push_constant_ranges: Vec::new(),
        }
    }
}

/// A graphics pipeline bound to a render pass
pub struct GraphicsPipeline {
    device: Arc<RenderDevice>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create a pipeline from a shader, a target render pass and the
    /// fixed-function specification
    pub fn new(
        device: Arc<RenderDevice>,
        shader: &Shader,
        render_pass: &RenderPass,
        spec: &PipelineSpecification,
    ) -> VulkanResult<Self> {
        let stage_infos = shader.stage_infos();

        let binding_descriptions = [spec.vertex_layout.binding_description()];
        let attribute_descriptions = spec.vertex_layout.attribute_descriptions();

        let vertex_input = if spec.vertex_layout.attributes.is_empty() {
            vk::PipelineVertexInputStateCreateInfo::builder()
        } else {
            vk::PipelineVertexInputStateCreateInfo::builder()
                .vertex_binding_descriptions(&binding_descriptions)
                .vertex_attribute_descriptions(&attribute_descriptions)
        };

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(spec.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; one placeholder each
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(spec.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(spec.depth_test)
            .depth_write_enable(spec.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachment = if spec.blending {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build()
        } else {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()
        };

        // One blend state per color attachment in the pass
        let blend_attachments =
            vec![blend_attachment; render_pass.colour_attachment_count() as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(shader.set_layouts())
            .push_constant_ranges(&spec.push_constant_ranges);

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .dynamic_state(&dynamic_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device.handle().create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        };

        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.handle().destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device,
            pipeline,
            layout,
        })
    }

    /// Raw pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Pipeline layout, for descriptor-set binds and push constants
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
            self.device.handle().destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_take_sequential_locations() {
        let layout = VertexLayout::new(32)
            .attribute(vk::Format::R32G32B32_SFLOAT, 0)
            .attribute(vk::Format::R32G32B32_SFLOAT, 12)
            .attribute(vk::Format::R32G32_SFLOAT, 24);

        let descriptions = layout.attribute_descriptions();
        assert_eq!(descriptions.len(), 3);
        assert_eq!(descriptions[0].location, 0);
        assert_eq!(descriptions[1].location, 1);
        assert_eq!(descriptions[2].location, 2);
        assert_eq!(descriptions[2].offset, 24);
        assert_eq!(layout.binding_description().stride, 32);
    }
}
