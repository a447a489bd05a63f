//! Sampled textures layered over [`Image2D`]

use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::image::{Image2D, ImageFormat, ImageSpecification, ImageUsage};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A 2D image ready to be sampled from a shader.
///
/// Wraps an [`Image2D`] created with sampled usage; the image may also be
/// shared with a framebuffer as an inherited attachment.
pub struct Texture2D {
    image: Arc<Image2D>,
}

impl Texture2D {
    /// Load an image file from disk, decode to RGBA8, and upload it
    pub fn from_file(device: Arc<RenderDevice>, path: &Path) -> VulkanResult<Self> {
        let decoded = image::open(path).map_err(|e| VulkanError::InitializationFailed(format!(
            "failed to load texture {}: {}",
            path.display(),
            e
        )))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("Loaded texture {} ({}x{})", path.display(), width, height);
        Self::from_bytes(device, width, height, rgba.as_raw())
    }

    /// Create a texture from raw tightly-packed RGBA8 pixels
    pub fn from_bytes(
        device: Arc<RenderDevice>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> VulkanResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "texture data is {} bytes, {}x{} RGBA8 needs {}",
                    pixels.len(),
                    width,
                    height,
                    expected
                ),
            });
        }

        let image = Image2D::new(
            device,
            &ImageSpecification {
                width,
                height,
                format: ImageFormat::Rgba8Un,
                usage: ImageUsage::SAMPLED | ImageUsage::TRANSFER_DST,
            },
        )?;
        image.upload(pixels)?;

        Ok(Self {
            image: Arc::new(image),
        })
    }

    /// Wrap an existing image as a sampled texture.
    ///
    /// Used for sampling a framebuffer's colour attachment; the image must
    /// have been created with sampled usage.
    pub fn from_image(image: Arc<Image2D>) -> VulkanResult<Self> {
        if !image.usage().contains(ImageUsage::SAMPLED) {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "image {}x{} was created without sampled usage",
                    image.width(),
                    image.height()
                ),
            });
        }
        Ok(Self { image })
    }

    /// A 1x1 texture of a single colour, handy as a placeholder binding
    pub fn flat_colour(device: Arc<RenderDevice>, rgba: [u8; 4]) -> VulkanResult<Self> {
        Self::from_bytes(device, 1, 1, &rgba)
    }

    /// The backing image
    pub fn image(&self) -> &Arc<Image2D> {
        &self.image
    }

    /// Texture width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Texture height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Descriptor info for a combined image sampler write
    pub(crate) fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        self.image.descriptor_info()
    }
}
