//! Shader modules and resource-binding metadata
//!
//! Reflection is an interface contract here: the [`ShaderSpecification`]
//! carries the SPIR-V words per stage plus the declared resource metadata
//! a reflection pipeline would produce. [`Shader`] turns that into shader
//! modules and one descriptor-set layout per set index, which the
//! resource manager and pipeline consume.

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Pipeline stage a shader module targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// The corresponding Vulkan stage flag
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// The kind of resource a shader declares at a binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderResourceKind {
    /// A uniform buffer
    UniformBuffer,
    /// A single sampled texture
    Texture2D,
    /// An array of sampled textures
    Texture2DArray,
}

impl ShaderResourceKind {
    /// The descriptor type backing this resource kind
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            ShaderResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            ShaderResourceKind::Texture2D | ShaderResourceKind::Texture2DArray => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
        }
    }
}

/// One declared shader resource: name, location and shape
#[derive(Debug, Clone)]
pub struct ShaderResourceMetadata {
    /// The resource name as declared in the shader
    pub name: String,
    /// Descriptor-set index
    pub set: u32,
    /// Binding index within the set
    pub binding: u32,
    /// Resource kind
    pub kind: ShaderResourceKind,
    /// Array length; 1 for non-array resources
    pub array_length: u32,
    /// Stages the resource is visible to
    pub stages: vk::ShaderStageFlags,
}

/// SPIR-V words per stage plus declared resource metadata
pub struct ShaderSpecification {
    /// Debug name
    pub name: String,
    /// SPIR-V code per stage
    pub stages: Vec<(ShaderStage, Vec<u32>)>,
    /// Declared resources, as a reflection pipeline would report them
    pub resources: Vec<ShaderResourceMetadata>,
}

/// Read a SPIR-V file into the u32 words a shader module expects
pub fn read_spirv_file<P: AsRef<Path>>(path: P) -> VulkanResult<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        VulkanError::InitializationFailed(format!(
            "failed to read shader '{}': {}",
            path.display(),
            e
        ))
    })?;
    spirv_words(&bytes)
}

/// Reinterpret SPIR-V bytes as words, validating alignment and size
pub fn spirv_words(bytes: &[u8]) -> VulkanResult<Vec<u32>> {
    if bytes.len() % 4 != 0 || bytes.is_empty() {
        return Err(VulkanError::InitializationFailed(
            "SPIR-V bytecode length is not a multiple of 4".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Group declared resources by set index into dense per-set binding lists,
/// covering 0..=max declared set
pub fn group_by_set(resources: &[ShaderResourceMetadata]) -> Vec<Vec<&ShaderResourceMetadata>> {
    let set_count = resources
        .iter()
        .map(|resource| resource.set + 1)
        .max()
        .unwrap_or(0);

    let mut sets: Vec<Vec<&ShaderResourceMetadata>> = vec![Vec::new(); set_count as usize];
    for resource in resources {
        sets[resource.set as usize].push(resource);
    }
    sets
}

/// Compiled shader modules plus per-set descriptor layouts
pub struct Shader {
    device: Arc<RenderDevice>,
    name: String,
    modules: Vec<(ShaderStage, vk::ShaderModule)>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    resources: Vec<ShaderResourceMetadata>,
}

impl Shader {
    /// Create shader modules and descriptor-set layouts per the
    /// specification. Module creation failure is fatal to the caller;
    /// there is no fallback shader.
    pub fn new(device: Arc<RenderDevice>, spec: ShaderSpecification) -> VulkanResult<Self> {
        let mut modules = Vec::with_capacity(spec.stages.len());
        for (stage, words) in &spec.stages {
            let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
            let module = unsafe {
                match device.handle().create_shader_module(&create_info, None) {
                    Ok(module) => module,
                    Err(e) => {
                        Self::destroy_modules(&device, &modules);
                        return Err(VulkanError::Api(e));
                    }
                }
            };
            modules.push((*stage, module));
        }

        let mut set_layouts = Vec::new();
        for set_resources in group_by_set(&spec.resources) {
            let bindings: Vec<vk::DescriptorSetLayoutBinding> = set_resources
                .iter()
                .map(|resource| {
                    vk::DescriptorSetLayoutBinding::builder()
                        .binding(resource.binding)
                        .descriptor_type(resource.kind.descriptor_type())
                        .descriptor_count(resource.array_length)
                        .stage_flags(resource.stages)
                        .build()
                })
                .collect();

            let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
            let layout = unsafe {
                match device.handle().create_descriptor_set_layout(&create_info, None) {
                    Ok(layout) => layout,
                    Err(e) => {
                        Self::destroy_layouts(&device, &set_layouts);
                        Self::destroy_modules(&device, &modules);
                        return Err(VulkanError::Api(e));
                    }
                }
            };
            set_layouts.push(layout);
        }

        log::debug!(
            "Shader '{}' created: {} stage(s), {} descriptor set(s), {} resource(s)",
            spec.name,
            modules.len(),
            set_layouts.len(),
            spec.resources.len()
        );

        Ok(Self {
            device,
            name: spec.name,
            modules,
            set_layouts,
            resources: spec.resources,
        })
    }

    fn destroy_modules(device: &RenderDevice, modules: &[(ShaderStage, vk::ShaderModule)]) {
        unsafe {
            for &(_, module) in modules {
                device.handle().destroy_shader_module(module, None);
            }
        }
    }

    fn destroy_layouts(device: &RenderDevice, layouts: &[vk::DescriptorSetLayout]) {
        unsafe {
            for &layout in layouts {
                device.handle().destroy_descriptor_set_layout(layout, None);
            }
        }
    }

    /// Stage create-infos for pipeline creation, entry point `main`
    pub fn stage_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo> {
        const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

        self.modules
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.to_vk())
                    .module(module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect()
    }

    /// Descriptor-set layouts, in set-index order
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        &self.set_layouts
    }

    /// All declared resources
    pub fn resources(&self) -> &[ShaderResourceMetadata] {
        &self.resources
    }

    /// Look up a declared resource by name
    pub fn resource(&self, name: &str) -> Option<&ShaderResourceMetadata> {
        self.resources.iter().find(|resource| resource.name == name)
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        Self::destroy_layouts(&self.device, &self.set_layouts);
        Self::destroy_modules(&self.device, &self.modules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, set: u32, binding: u32, kind: ShaderResourceKind) -> ShaderResourceMetadata {
        ShaderResourceMetadata {
            name: name.to_string(),
            set,
            binding,
            kind,
            array_length: 1,
            stages: vk::ShaderStageFlags::FRAGMENT,
        }
    }

    #[test]
    fn spirv_words_round_trip_little_endian() {
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words(&bytes).unwrap();
        // SPIR-V magic number
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words[1], 0x0001_0000);
    }

    #[test]
    fn misaligned_spirv_is_rejected() {
        assert!(spirv_words(&[1, 2, 3]).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn resources_group_into_dense_sets() {
        let resources = vec![
            resource("camera", 0, 0, ShaderResourceKind::UniformBuffer),
            resource("albedo", 2, 0, ShaderResourceKind::Texture2D),
            resource("lights", 0, 1, ShaderResourceKind::UniformBuffer),
        ];

        let sets = group_by_set(&resources);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].len(), 2);
        // Set 1 is declared empty but still gets a layout slot
        assert!(sets[1].is_empty());
        assert_eq!(sets[2].len(), 1);
    }

    #[test]
    fn no_resources_means_no_sets() {
        assert!(group_by_set(&[]).is_empty());
    }

    #[test]
    fn texture_kinds_share_descriptor_type() {
        assert_eq!(
            ShaderResourceKind::Texture2D.descriptor_type(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(
            ShaderResourceKind::Texture2DArray.descriptor_type(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(
            ShaderResourceKind::UniformBuffer.descriptor_type(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
    }
}
