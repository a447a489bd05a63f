//! Physical device selection and logical device management
//!
//! Selection is all-or-nothing: the first enumerated device satisfying the
//! extension, surface-support, requirement and queue-family checks wins,
//! and if none do, initialization fails with no degraded fallback.
//!
//! [`RenderDevice`] is read-only after construction (queues, family indices
//! and the memory-type table never change) and is shared across the
//! renderer via `Arc`. The synchronous helpers (`copy_buffer`,
//! `single_time_commands`) block on `queue_wait_idle` and are meant for
//! setup and resize paths, never steady-state per-frame work.

use std::ffi::CStr;

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};

use crate::render::config::GpuRequirements;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Surface capabilities, formats and present modes reported for a device
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Query swapchain support for a physical device / surface pair
    pub fn query(
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
    ) -> VulkanResult<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// Selected queue family indices. Graphics and present may coincide;
/// transfer falls back to the graphics family when no dedicated transfer
/// family exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics queue family
    pub graphics: u32,
    /// Presentation queue family
    pub present: u32,
    /// Transfer queue family
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Whether graphics and present share one family (enables exclusive
    /// image sharing mode on the swapchain)
    pub fn same_graphics_present(&self) -> bool {
        self.graphics == self.present
    }
}

/// Pick queue families from reported properties and per-family present
/// support. Prefers a single family supporting both graphics and present.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Option<QueueFamilyIndices> {
    let mut graphics = None;
    let mut present = None;

    // First pass: a family supporting both wins outright
    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && present_support[index] {
            graphics = Some(index as u32);
            present = Some(index as u32);
            break;
        }
    }

    // Second pass: separate families
    if graphics.is_none() {
        for (index, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics.is_none() {
                graphics = Some(index as u32);
            }
            if present_support[index] && present.is_none() {
                present = Some(index as u32);
            }
        }
    }

    let graphics = graphics?;
    let present = present?;

    // Dedicated transfer family if one exists, otherwise reuse graphics
    let transfer = families
        .iter()
        .enumerate()
        .find(|(_, family)| {
            family.queue_count > 0
                && family.queue_flags.contains(vk::QueueFlags::TRANSFER)
                && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(index, _)| index as u32)
        .unwrap_or(graphics);

    Some(QueueFamilyIndices {
        graphics,
        present,
        transfer,
    })
}

/// Check stated GPU requirements against reported properties and features
pub fn meets_requirements(
    requirements: &GpuRequirements,
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
) -> bool {
    if requirements.discrete_gpu
        && properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    {
        return false;
    }

    if requirements.anisotropic_filtering && features.sampler_anisotropy == vk::FALSE {
        return false;
    }

    if properties.limits.max_descriptor_set_sampled_images < requirements.min_bound_texture_slots {
        return false;
    }

    true
}

/// Physical device selection result and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory-type properties table, used for allocation-type selection
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Selected queue families
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the first physical device meeting all requirements
    pub fn select(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        requirements: &GpuRequirements,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, surface_loader, requirements) {
                Ok(Some(info)) => {
                    log::info!("Selected GPU: {}", unsafe {
                        CStr::from_ptr(info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(info);
                }
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(VulkanError::NoSuitableGpu)
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &Surface,
        requirements: &GpuRequirements,
    ) -> VulkanResult<Option<Self>> {
        // (a) required device extensions
        if !Self::supports_extensions(instance, device, &[SwapchainLoader::name()])? {
            return Ok(None);
        }

        // (b) swapchain support must be non-empty
        let support = SwapchainSupportDetails::query(device, surface, surface_loader)?;
        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Ok(None);
        }

        // (c) stated requirements
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        if !meets_requirements(requirements, &properties, &features) {
            return Ok(None);
        }

        // (d) usable queue families
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let mut present_support = Vec::with_capacity(families.len());
        for index in 0..families.len() as u32 {
            let supported = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .map_err(VulkanError::Api)?
            };
            present_support.push(supported);
        }

        let queue_families = match pick_queue_families(&families, &present_support) {
            Some(indices) => indices,
            None => return Ok(None),
        };

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Some(Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families,
        }))
    }

    fn supports_extensions(
        instance: &Instance,
        device: vk::PhysicalDevice,
        required: &[&CStr],
    ) -> VulkanResult<bool> {
        let available = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        Ok(required.iter().all(|required| {
            available.iter().any(|ext| {
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == *required
            })
        }))
    }
}

/// Logical device, queues and allocation helpers
pub struct RenderDevice {
    device: Device,
    physical: PhysicalDeviceInfo,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    transient_pool: vk::CommandPool,
    depth_stencil_format: vk::Format,
}

impl RenderDevice {
    /// Create the logical device with one queue per selected family
    pub fn new(
        instance: &Instance,
        physical: PhysicalDeviceInfo,
        requirements: &GpuRequirements,
    ) -> VulkanResult<Self> {
        let unique_families: std::collections::BTreeSet<u32> = [
            physical.queue_families.graphics,
            physical.queue_families.present,
            physical.queue_families.transfer,
        ]
        .into_iter()
        .collect();

        let priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(requirements.anisotropic_filtering)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical.queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.queue_families.present, 0) };
        let transfer_queue =
            unsafe { device.get_device_queue(physical.queue_families.transfer, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);

        // Transient pool backing the synchronous single-time command path
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(physical.queue_families.graphics);

        let transient_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        // The depth/stencil format is a process-wide constant: chosen once
        // here from the preference list, never reselected per-framebuffer.
        let depth_stencil_format = Self::find_supported_format(
            instance,
            physical.device,
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        Ok(Self {
            device,
            physical,
            graphics_queue,
            present_queue,
            transfer_queue,
            swapchain_loader,
            transient_pool,
            depth_stencil_format,
        })
    }

    /// Raw logical device handle
    pub fn handle(&self) -> &Device {
        &self.device
    }

    /// Selected physical device info
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Selected queue family indices
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical.queue_families
    }

    /// Graphics queue handle
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue handle
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Transfer queue handle
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Swapchain extension loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// The process-wide depth/stencil attachment format
    pub fn depth_stencil_format(&self) -> vk::Format {
        self.depth_stencil_format
    }

    /// Whether anisotropic filtering was enabled at device creation
    pub fn anisotropy_enabled(&self) -> bool {
        self.physical.features.sampler_anisotropy == vk::TRUE
    }

    /// Block until all submitted GPU work has completed
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }

    /// Find a memory type index matching the filter and property flags
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        let table = &self.physical.memory_properties;
        for i in 0..table.memory_type_count {
            if (type_filter & (1 << i)) != 0
                && table.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
            {
                return Ok(i);
            }
        }

        Err(VulkanError::NoSuitableMemoryType)
    }

    /// Create and bind a buffer with backing memory
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Buffer, vk::DeviceMemory)> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            self.device
                .create_buffer(&buffer_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory_type_index =
            match self.find_memory_type(requirements.memory_type_bits, properties) {
                Ok(index) => index,
                Err(e) => {
                    unsafe { self.device.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            match self.device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok((buffer, memory))
    }

    /// Create and bind a 2D image with backing memory
    pub fn create_image(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            self.device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let memory_type_index =
            match self.find_memory_type(requirements.memory_type_bits, properties) {
                Ok(index) => index,
                Err(e) => {
                    unsafe { self.device.destroy_image(image, None) };
                    return Err(e);
                }
            };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            match self.device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok((image, memory))
    }

    /// Create an image view over a 2D image
    pub fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        unsafe {
            self.device
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Create an image sampler
    pub fn create_sampler(
        &self,
        filter: vk::Filter,
        mipmap_mode: vk::SamplerMipmapMode,
        address_mode: vk::SamplerAddressMode,
    ) -> VulkanResult<vk::Sampler> {
        let anisotropy = self.anisotropy_enabled();
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                self.physical.properties.limits.max_sampler_anisotropy
            } else {
                1.0
            })
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS);

        unsafe {
            self.device
                .create_sampler(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Record and synchronously submit a short-lived command buffer on the
    /// graphics queue. Blocks until the GPU has finished executing it.
    pub fn single_time_commands(
        &self,
        record: impl FnOnce(&Device, vk::CommandBuffer),
    ) -> VulkanResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.transient_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?[0]
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        let result = (|| {
            unsafe {
                self.device
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(VulkanError::Api)?;
            }

            record(&self.device, command_buffer);

            unsafe {
                self.device
                    .end_command_buffer(command_buffer)
                    .map_err(VulkanError::Api)?;

                let command_buffers = [command_buffer];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

                self.device
                    .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())
                    .map_err(VulkanError::Api)?;
                self.device
                    .queue_wait_idle(self.graphics_queue)
                    .map_err(VulkanError::Api)?;
            }

            Ok(())
        })();

        unsafe {
            self.device
                .free_command_buffers(self.transient_pool, &[command_buffer]);
        }

        result
    }

    /// Copy between buffers via a synchronous single-time command buffer
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.single_time_commands(|device, command_buffer| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
            }
        })
    }

    /// Copy a tightly packed buffer into a 2D image (transfer-dst layout)
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        aspect_mask: vk::ImageAspectFlags,
    ) -> VulkanResult<()> {
        self.single_time_commands(|device, command_buffer| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                image_extent: vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                },
            };
            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
        })
    }

    fn find_supported_format(
        instance: &Instance,
        device: vk::PhysicalDevice,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        for &format in candidates {
            let properties =
                unsafe { instance.get_physical_device_format_properties(device, format) };

            let supported = match tiling {
                vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
                _ => properties.optimal_tiling_features.contains(features),
            };

            if supported {
                return Ok(format);
            }
        }

        Err(VulkanError::InitializationFailed(
            "No supported format among candidates".to_string(),
        ))
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.transient_pool, None);
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_combined_graphics_present_family() {
        // Family 0 is graphics-only, family 1 supports both
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
        ];
        let present = [false, true];

        let indices = pick_queue_families(&families, &present).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 1);
        assert!(indices.same_graphics_present());
    }

    #[test]
    fn falls_back_to_separate_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let present = [false, true];

        let indices = pick_queue_families(&families, &present).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.present, 1);
        assert!(!indices.same_graphics_present());
    }

    #[test]
    fn dedicated_transfer_family_is_used() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let present = [true, false];

        let indices = pick_queue_families(&families, &present).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.transfer, 1);
    }

    #[test]
    fn no_present_family_means_no_device() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let present = [false];

        assert!(pick_queue_families(&families, &present).is_none());
    }

    #[test]
    fn requirement_checks() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        properties.limits.max_descriptor_set_sampled_images = 16;

        let mut features = vk::PhysicalDeviceFeatures::default();
        features.sampler_anisotropy = vk::TRUE;

        let mut requirements = GpuRequirements {
            discrete_gpu: false,
            anisotropic_filtering: true,
            min_bound_texture_slots: 16,
        };
        assert!(meets_requirements(&requirements, &properties, &features));

        requirements.discrete_gpu = true;
        assert!(!meets_requirements(&requirements, &properties, &features));

        requirements.discrete_gpu = false;
        requirements.min_bound_texture_slots = 32;
        assert!(!meets_requirements(&requirements, &properties, &features));
    }
}
