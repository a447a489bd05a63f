//! Command buffer recording
//!
//! [`CommandRecorder`] wraps one command buffer for the duration of a
//! frame's recording. Render-pass-scoped commands live on
//! [`ActiveRenderPass`], which borrows the recorder so pass-only commands
//! cannot be recorded outside a pass.

use ash::{vk, Device};

use crate::render::vulkan::pipeline::GraphicsPipeline;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::resource_manager::ShaderResourceManager;
use crate::render::vulkan::{IndexBuffer, VertexBuffer, VulkanError, VulkanResult};

/// Records commands into a single primary command buffer
pub struct CommandRecorder {
    device: Device,
    command_buffer: vk::CommandBuffer,
}

impl CommandRecorder {
    /// Wrap an allocated command buffer for recording
    pub fn new(device: Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
        }
    }

    /// Begin recording. The buffer must have been reset beforehand; the
    /// swapchain resets each slot's buffer after its fence wait.
    pub fn begin(&mut self) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    /// Finish recording
    pub fn end(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(VulkanError::Api)
        }
    }

    /// Raw command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Begin a render pass over the given framebuffer index, returning a
    /// scope for pass-only commands. Clear values come from the pass, which
    /// built them in attachment-description order.
    pub fn begin_render_pass<'a>(
        &'a mut self,
        render_pass: &RenderPass,
        framebuffer_index: usize,
    ) -> ActiveRenderPass<'a> {
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass.handle())
            .framebuffer(render_pass.framebuffer(framebuffer_index))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: render_pass.extent(),
            })
            .clear_values(render_pass.clear_values());

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        ActiveRenderPass {
            recorder: self,
            extent: render_pass.extent(),
        }
    }
}

/// Scope for commands recorded inside an active render pass
pub struct ActiveRenderPass<'a> {
    recorder: &'a mut CommandRecorder,
    extent: vk::Extent2D,
}

impl<'a> ActiveRenderPass<'a> {
    /// Bind a graphics pipeline and set the dynamic viewport/scissor to the
    /// full render area
    pub fn bind_pipeline(&mut self, pipeline: &GraphicsPipeline) {
        let device = &self.recorder.device;
        let command_buffer = self.recorder.command_buffer;

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };

        unsafe {
            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.handle(),
            );
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    /// Bind a resource manager's descriptor sets for the given frame slot.
    ///
    /// Refuses to bind while any declared shader resource is still unbound;
    /// a draw against an incomplete manager would read uninitialized
    /// descriptors.
    pub fn bind_shader_resources(
        &mut self,
        pipeline: &GraphicsPipeline,
        manager: &ShaderResourceManager,
        frame_index: u32,
    ) -> VulkanResult<()> {
        debug_assert!(
            manager.ready_to_render(),
            "shader resources bound before all declared resources were set"
        );
        if !manager.ready_to_render() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "resource manager incomplete: unbound resources {:?}",
                    manager.unbound_resources()
                ),
            });
        }

        unsafe {
            self.recorder.device.cmd_bind_descriptor_sets(
                self.recorder.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout(),
                manager.first_set(),
                manager.descriptor_sets(frame_index),
                &[],
            );
        }

        Ok(())
    }

    /// Bind a vertex buffer to binding slot 0
    pub fn bind_vertex_buffer(&mut self, buffer: &VertexBuffer) {
        unsafe {
            self.recorder.device.cmd_bind_vertex_buffers(
                self.recorder.command_buffer,
                0,
                &[buffer.handle()],
                &[0],
            );
        }
    }

    /// Bind a u32 index buffer
    pub fn bind_index_buffer(&mut self, buffer: &IndexBuffer) {
        unsafe {
            self.recorder.device.cmd_bind_index_buffer(
                self.recorder.command_buffer,
                buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Push a constant range visible to the given stages
    pub fn push_constants(
        &mut self,
        pipeline: &GraphicsPipeline,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.recorder.device.cmd_push_constants(
                self.recorder.command_buffer,
                pipeline.layout(),
                stages,
                offset,
                data,
            );
        }
    }

    /// Draw non-indexed geometry
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.recorder.device.cmd_draw(
                self.recorder.command_buffer,
                vertex_count,
                instance_count,
                0,
                0,
            );
        }
    }

    /// Draw indexed geometry
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        unsafe {
            self.recorder.device.cmd_draw_indexed(
                self.recorder.command_buffer,
                index_count,
                instance_count,
                0,
                0,
                0,
            );
        }
    }

    /// End the render pass, returning the recorder for further commands
    pub fn end(self) -> &'a mut CommandRecorder {
        unsafe {
            self.recorder
                .device
                .cmd_end_render_pass(self.recorder.command_buffer);
        }
        self.recorder
    }
}
