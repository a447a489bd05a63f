//! # Ember Engine
//!
//! A Vulkan rendering core: device and swapchain bootstrap, per-frame
//! synchronization and command submission, framebuffer/attachment
//! management, and shader resource binding.
//!
//! The engine is organised around an explicit [`render::RendererContext`]
//! object created at application start and passed to every component that
//! needs frame-lifecycle information. There is no global renderer state.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ember_engine::render::{RendererConfig, RendererContext, FrameStatus};
//! use ember_engine::render::window::Window;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     ember_engine::foundation::logging::init();
//!
//!     let config = RendererConfig::default();
//!     let mut window = Window::new("demo", 1280, 720)?;
//!     let mut renderer = RendererContext::new(&mut window, "demo", &config)?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         match renderer.begin_frame()? {
//!             FrameStatus::Ready => {
//!                 // record draw commands, then:
//!                 if renderer.end_frame()? == FrameStatus::SwapchainStale {
//!                     // rebuild anything sized to the swapchain extent
//!                 }
//!             }
//!             FrameStatus::SwapchainStale => continue,
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Foundation utilities (logging)
pub mod foundation;

/// Rendering core: configuration, window, frame orchestration, Vulkan backend
pub mod render;

/// Commonly used types
pub mod prelude {
    pub use crate::render::config::RendererConfig;
    pub use crate::render::renderer::{FrameStatus, RendererContext};
    pub use crate::render::vulkan::{VulkanError, VulkanResult};
    pub use crate::render::window::Window;
}
