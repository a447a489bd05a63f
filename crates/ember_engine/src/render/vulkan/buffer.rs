//! Vertex, index and uniform buffer primitives
//!
//! Vertex and index data lives in device-local memory and is written
//! through a staging buffer plus a synchronous device-to-device copy;
//! uniform data lives in persistently-mapped host-coherent memory and is
//! updated with a direct memcpy every frame. The asymmetry is deliberate:
//! uniforms change every frame, vertex data rarely.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Short-lived host-visible buffer used as a copy source for uploads
pub struct StagingBuffer {
    device: Arc<RenderDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl StagingBuffer {
    /// Allocate a host-visible buffer and fill it with the given bytes
    pub fn new(device: Arc<RenderDevice>, data: &[u8]) -> VulkanResult<Self> {
        let size = data.len() as vk::DeviceSize;
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "cannot create an empty staging buffer".to_string(),
            });
        }

        let (buffer, memory) = device.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        unsafe {
            let ptr = device
                .handle()
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            device.handle().unmap_memory(memory);
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}

/// Device-local vertex buffer
pub struct VertexBuffer {
    device: Arc<RenderDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    capacity: vk::DeviceSize,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Create a vertex buffer and upload the given vertices
    pub fn new<T: bytemuck::Pod>(device: Arc<RenderDevice>, vertices: &[T]) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as vk::DeviceSize;

        let (buffer, memory) = device.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut this = Self {
            device,
            buffer,
            memory,
            capacity: size,
            vertex_count: 0,
        };
        this.upload(bytes, vertices.len() as u32)?;
        Ok(this)
    }

    /// Replace the buffer contents.
    ///
    /// Always stages through a host-visible buffer followed by a
    /// device-to-device copy; the destination is device-local and cannot
    /// be written directly. Grows the buffer when the data outgrows it.
    pub fn set_data<T: bytemuck::Pod>(&mut self, vertices: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as vk::DeviceSize;

        if size > self.capacity {
            self.device.wait_idle()?;
            let (buffer, memory) = self.device.create_buffer(
                size,
                vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            unsafe {
                self.device.handle().destroy_buffer(self.buffer, None);
                self.device.handle().free_memory(self.memory, None);
            }
            self.buffer = buffer;
            self.memory = memory;
            self.capacity = size;
        }

        self.upload(bytes, vertices.len() as u32)
    }

    fn upload(&mut self, bytes: &[u8], vertex_count: u32) -> VulkanResult<()> {
        // Staging buffer is dropped (and the CPU copy released) once the
        // synchronous copy completes
        let staging = StagingBuffer::new(self.device.clone(), bytes)?;
        self.device
            .copy_buffer(staging.handle(), self.buffer, staging.size())?;
        self.vertex_count = vertex_count;
        Ok(())
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Number of vertices last uploaded
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}

/// Device-local index buffer holding u32 indices
pub struct IndexBuffer {
    device: Arc<RenderDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    capacity: vk::DeviceSize,
    index_count: u32,
}

impl IndexBuffer {
    /// Create an index buffer and upload the given indices
    pub fn new(device: Arc<RenderDevice>, indices: &[u32]) -> VulkanResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let size = bytes.len() as vk::DeviceSize;

        let (buffer, memory) = device.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let mut this = Self {
            device,
            buffer,
            memory,
            capacity: size,
            index_count: 0,
        };
        this.upload(bytes, indices.len() as u32)?;
        Ok(this)
    }

    /// Replace the buffer contents via the staging-then-copy path
    pub fn set_data(&mut self, indices: &[u32]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let size = bytes.len() as vk::DeviceSize;

        if size > self.capacity {
            self.device.wait_idle()?;
            let (buffer, memory) = self.device.create_buffer(
                size,
                vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            unsafe {
                self.device.handle().destroy_buffer(self.buffer, None);
                self.device.handle().free_memory(self.memory, None);
            }
            self.buffer = buffer;
            self.memory = memory;
            self.capacity = size;
        }

        self.upload(bytes, indices.len() as u32)
    }

    fn upload(&mut self, bytes: &[u8], index_count: u32) -> VulkanResult<()> {
        let staging = StagingBuffer::new(self.device.clone(), bytes)?;
        self.device
            .copy_buffer(staging.handle(), self.buffer, staging.size())?;
        self.index_count = index_count;
        Ok(())
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Number of indices last uploaded
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}

/// Host-coherent uniform buffer, persistently mapped at creation.
///
/// Updates are a direct memcpy into the mapped pointer with no staging and
/// no barrier; host-coherent memory makes the write visible to the GPU by
/// the time the frame's command buffer is submitted.
pub struct UniformBuffer {
    device: Arc<RenderDevice>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    mapped: *mut u8,
    shadow: Vec<u8>,
}

impl UniformBuffer {
    /// Allocate and persistently map a uniform buffer of `size` bytes
    pub fn new(device: Arc<RenderDevice>, size: vk::DeviceSize) -> VulkanResult<Self> {
        let (buffer, memory) = device.create_buffer(
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mapped = unsafe {
            match device
                .handle()
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
            {
                Ok(ptr) => ptr as *mut u8,
                Err(e) => {
                    device.handle().destroy_buffer(buffer, None);
                    device.handle().free_memory(memory, None);
                    return Err(VulkanError::Api(e));
                }
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            mapped,
            shadow: vec![0; size as usize],
        })
    }

    /// Write bytes at the given offset into the shadow copy and straight
    /// through to the mapped GPU memory
    pub fn set_data(&mut self, data: &[u8], offset: vk::DeviceSize) -> VulkanResult<()> {
        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "uniform write of {} bytes at offset {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    self.size
                ),
            });
        }

        self.shadow[offset as usize..end as usize].copy_from_slice(data);
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.mapped.add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    /// Raw buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// The CPU shadow of the buffer contents
    pub fn shadow(&self) -> &[u8] {
        &self.shadow
    }

    /// Descriptor info covering the whole buffer
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            self.device.handle().unmap_memory(self.memory);
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }
    }
}

/// One independent [`UniformBuffer`] per frame in flight.
///
/// Callers must write to the slot matching the frame about to be
/// submitted; writing another slot would race with an in-flight GPU read.
pub struct UniformBufferRing {
    buffers: Vec<UniformBuffer>,
}

impl UniformBufferRing {
    /// Create `frames_in_flight` uniform buffers of `size` bytes each
    pub fn new(
        device: Arc<RenderDevice>,
        size: vk::DeviceSize,
        frames_in_flight: u32,
    ) -> VulkanResult<Self> {
        let buffers = (0..frames_in_flight)
            .map(|_| UniformBuffer::new(device.clone(), size))
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self { buffers })
    }

    /// The buffer backing the given frame slot
    pub fn get(&self, frame_index: u32) -> &UniformBuffer {
        &self.buffers[frame_index as usize]
    }

    /// Write into the given frame slot's buffer
    pub fn set_data(
        &mut self,
        frame_index: u32,
        data: &[u8],
        offset: vk::DeviceSize,
    ) -> VulkanResult<()> {
        self.buffers[frame_index as usize].set_data(data, offset)
    }

    /// Number of per-frame buffer instances
    pub fn len(&self) -> u32 {
        self.buffers.len() as u32
    }

    /// Whether the ring holds no buffers
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
