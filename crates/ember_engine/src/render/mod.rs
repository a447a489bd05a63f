//! Rendering core
//!
//! The top-level driver is [`RendererContext`], which owns the Vulkan
//! instance, device and swapchain and drives the per-frame acquire /
//! submit / present loop. Everything else in this module consumes the
//! context's frame index and frames-in-flight count.

pub mod config;
pub mod renderer;
pub mod vulkan;
pub mod window;

pub use config::RendererConfig;
pub use renderer::{FrameStatus, RendererContext};
