//! Vulkan rendering backend
//!
//! Low-level Vulkan implementation: RAII wrappers over device, swapchain,
//! images, buffers, pipelines and descriptor sets. Resource lifetimes and
//! image layouts are tracked explicitly on the CPU side; the driver is
//! never queried for state the engine already knows.

use ash::vk;
use thiserror::Error;

pub mod buffer;
pub mod commands;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod render_pass;
pub mod resource_manager;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::{IndexBuffer, StagingBuffer, UniformBuffer, UniformBufferRing, VertexBuffer};
pub use commands::{ActiveRenderPass, CommandRecorder};
pub use device::{PhysicalDeviceInfo, RenderDevice};
pub use framebuffer::{
    AttachmentLoadOp, AttachmentSpecification, Framebuffer, FramebufferSpecification,
};
pub use image::{Image2D, ImageFormat, ImageSpecification, ImageUsage};
pub use instance::VulkanInstance;
pub use pipeline::{GraphicsPipeline, PipelineSpecification, VertexAttribute, VertexLayout};
pub use render_pass::RenderPass;
pub use resource_manager::{
    ResourceLedger, ShaderResource, ShaderResourceManager, ShaderResourceManagerSpecification,
};
pub use shader::{
    Shader, ShaderResourceKind, ShaderResourceMetadata, ShaderSpecification, ShaderStage,
};
pub use swapchain::{AcquireResult, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore};
pub use texture::Texture2D;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device met the stated requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// An image layout transition outside the supported table was requested
    #[error("Unsupported image layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current tracked layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// A named shader resource was not declared by the bound shader
    #[error("Shader resource not found: {name}")]
    ResourceNotFound {
        /// The resource name as declared in shader metadata
        name: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;
