//! Renderer configuration
//!
//! Loaded once at startup, before any Vulkan object exists. A missing or
//! malformed configuration file is logged and replaced with defaults; it
//! never aborts startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Hard GPU requirements checked during physical device selection.
///
/// These are pass/fail: a device missing any requested capability is
/// skipped, and if no device passes, initialization fails outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuRequirements {
    /// Only accept discrete GPUs
    pub discrete_gpu: bool,
    /// Require anisotropic filtering support
    pub anisotropic_filtering: bool,
    /// Minimum number of sampled images bindable in one descriptor set
    pub min_bound_texture_slots: u32,
}

impl Default for GpuRequirements {
    fn default() -> Self {
        Self {
            discrete_gpu: false,
            anisotropic_filtering: true,
            min_bound_texture_slots: 32,
        }
    }
}

/// Renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Requested number of frames in flight. The swapchain clamps this to
    /// its actual image count at creation time.
    pub desired_frames_in_flight: u32,
    /// Force FIFO presentation (vsync) even when MAILBOX is available
    pub vsync: bool,
    /// Enable the Khronos validation layer (debug builds only)
    pub validation_layers: bool,
    /// Default clear colour for swapchain-targeting framebuffers (RGBA)
    pub clear_colour: [f32; 4],
    /// Hard device requirements
    pub gpu_requirements: GpuRequirements,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            desired_frames_in_flight: 3,
            vsync: false,
            validation_layers: cfg!(debug_assertions),
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            gpu_requirements: GpuRequirements::default(),
        }
    }
}

impl RendererConfig {
    /// Load configuration from a TOML file, falling back to defaults if the
    /// file is missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!(
                    "Could not read renderer config '{}' ({}), using defaults",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!(
                    "Malformed renderer config '{}' ({}), using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Serialize the configuration to a TOML string
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RendererConfig::default();
        assert_eq!(config.desired_frames_in_flight, 3);
        assert!(config.gpu_requirements.min_bound_texture_slots >= 1);
    }

    #[test]
    fn toml_round_trip() {
        let mut config = RendererConfig::default();
        config.desired_frames_in_flight = 2;
        config.vsync = true;
        config.gpu_requirements.discrete_gpu = true;

        let text = config.to_toml();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.desired_frames_in_flight, 2);
        assert!(parsed.vsync);
        assert!(parsed.gpu_requirements.discrete_gpu);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: RendererConfig = toml::from_str("vsync = true\n").unwrap();
        assert!(parsed.vsync);
        assert_eq!(parsed.desired_frames_in_flight, 3);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = RendererConfig::load_or_default("/definitely/not/a/real/path.toml");
        assert_eq!(config.desired_frames_in_flight, 3);
    }
}
