//! Per-frame descriptor-set allocation and deferred descriptor writes
//!
//! The manager tracks every resource the bound shader declares within its
//! set range, allocates one descriptor set per (frame, set-index) pair,
//! and batches `set`/`update` calls into a queue flushed with a single
//! driver call per frame by [`ShaderResourceManager::process_changes`].
//!
//! The bookkeeping lives in [`ResourceLedger`], which is plain data:
//! completeness and pool sizing are testable without a device.

use std::sync::Arc;

use ash::vk;

use crate::render::vulkan::buffer::{UniformBuffer, UniformBufferRing};
use crate::render::vulkan::device::RenderDevice;
use crate::render::vulkan::shader::{Shader, ShaderResourceKind, ShaderResourceMetadata};
use crate::render::vulkan::texture::Texture2D;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// A value bound to a named shader resource
pub enum ShaderResource<'a> {
    /// One uniform buffer, bound identically to every frame slot
    UniformBuffer(&'a UniformBuffer),
    /// A per-frame uniform buffer ring; each frame slot binds its own
    /// buffer instance
    UniformBufferRing(&'a UniformBufferRing),
    /// A single sampled texture
    Texture(&'a Texture2D),
    /// An array of sampled textures; length must match the declaration
    TextureArray(&'a [&'a Texture2D]),
}

impl ShaderResource<'_> {
    fn kind(&self) -> ShaderResourceKind {
        match self {
            ShaderResource::UniformBuffer(_) | ShaderResource::UniformBufferRing(_) => {
                ShaderResourceKind::UniformBuffer
            }
            ShaderResource::Texture(_) => ShaderResourceKind::Texture2D,
            ShaderResource::TextureArray(_) => ShaderResourceKind::Texture2DArray,
        }
    }

    fn array_length(&self) -> u32 {
        match self {
            ShaderResource::TextureArray(textures) => textures.len() as u32,
            _ => 1,
        }
    }
}

/// One tracked shader resource
#[derive(Debug, Clone)]
pub struct LedgerRecord {
    /// Resource name as declared by the shader
    pub name: String,
    /// Descriptor-set index
    pub set: u32,
    /// Binding index within the set
    pub binding: u32,
    /// Declared resource kind
    pub kind: ShaderResourceKind,
    /// Declared array length
    pub array_length: u32,
    /// Whether the resource has received at least one bind
    pub bound: bool,
}

/// Pure bookkeeping for declared resources: bind-completeness and
/// computed descriptor-pool sizing
pub struct ResourceLedger {
    records: Vec<LedgerRecord>,
}

impl ResourceLedger {
    /// Track every declared resource whose set index falls inside
    /// `[first_set, last_set]`, all initially unbound
    pub fn new(resources: &[ShaderResourceMetadata], first_set: u32, last_set: u32) -> Self {
        let records = resources
            .iter()
            .filter(|resource| resource.set >= first_set && resource.set <= last_set)
            .map(|resource| LedgerRecord {
                name: resource.name.clone(),
                set: resource.set,
                binding: resource.binding,
                kind: resource.kind,
                array_length: resource.array_length,
                bound: false,
            })
            .collect();

        Self { records }
    }

    /// Validate a bind against the declaration, returning a copy of the
    /// record. Kind or array-length mismatch is a programming error.
    pub fn validate(
        &self,
        name: &str,
        kind: ShaderResourceKind,
        array_length: u32,
    ) -> VulkanResult<LedgerRecord> {
        let record = self
            .records
            .iter()
            .find(|record| record.name == name)
            .ok_or_else(|| VulkanError::ResourceNotFound {
                name: name.to_string(),
            })?;

        debug_assert!(
            record.kind == kind && record.array_length == array_length,
            "resource '{}' bound as {:?}[{}], declared {:?}[{}]",
            name,
            kind,
            array_length,
            record.kind,
            record.array_length
        );
        if record.kind != kind || record.array_length != array_length {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "resource '{}' bound as {:?}[{}] but declared {:?}[{}]",
                    name, kind, array_length, record.kind, record.array_length
                ),
            });
        }

        Ok(record.clone())
    }

    /// Record that a resource has been bound at least once
    pub fn mark_bound(&mut self, name: &str) {
        if let Some(record) = self.records.iter_mut().find(|record| record.name == name) {
            record.bound = true;
        }
    }

    /// True iff every tracked resource has been bound at least once
    pub fn ready_to_render(&self) -> bool {
        self.records.iter().all(|record| record.bound)
    }

    /// Names of resources never bound, in declaration order
    pub fn unbound(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|record| !record.bound)
            .map(|record| record.name.clone())
            .collect()
    }

    /// Pool sizes computed from the declared per-type descriptor counts
    /// times frames in flight, rather than a fixed guess
    pub fn pool_sizes(&self, frames_in_flight: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut uniform_buffers = 0;
        let mut sampled_images = 0;
        for record in &self.records {
            match record.kind.descriptor_type() {
                vk::DescriptorType::UNIFORM_BUFFER => uniform_buffers += record.array_length,
                _ => sampled_images += record.array_length,
            }
        }

        let mut sizes = Vec::new();
        if uniform_buffers > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: uniform_buffers * frames_in_flight,
            });
        }
        if sampled_images > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: sampled_images * frames_in_flight,
            });
        }
        sizes
    }

    /// Number of tracked resources
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger tracks no resources
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Set range and frame count for a [`ShaderResourceManager`]
#[derive(Debug, Clone, Copy)]
pub struct ShaderResourceManagerSpecification {
    /// First descriptor-set index this manager owns
    pub first_set: u32,
    /// Last descriptor-set index this manager owns (inclusive)
    pub last_set: u32,
    /// Frames in flight; one descriptor-set copy per frame
    pub frames_in_flight: u32,
}

struct QueuedWrite {
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    image_infos: Vec<vk::DescriptorImageInfo>,
}

/// Allocates and updates per-frame descriptor sets for a shader's
/// declared resources
pub struct ShaderResourceManager {
    device: Arc<RenderDevice>,
    pool: vk::DescriptorPool,
    /// Indexed `[frame][set - first_set]`
    sets: Vec<Vec<vk::DescriptorSet>>,
    ledger: ResourceLedger,
    queue: Vec<QueuedWrite>,
    first_set: u32,
    frames_in_flight: u32,
}

impl ShaderResourceManager {
    /// Build tracking records for every resource the shader declares
    /// within the set range, size the descriptor pool from those records,
    /// and allocate `frames_in_flight × set-count` descriptor sets.
    pub fn new(
        device: Arc<RenderDevice>,
        shader: &Shader,
        spec: &ShaderResourceManagerSpecification,
    ) -> VulkanResult<Self> {
        let layouts = shader
            .set_layouts()
            .get(spec.first_set as usize..=spec.last_set as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!(
                    "shader '{}' declares {} descriptor set(s), manager wants sets {}..={}",
                    shader.name(),
                    shader.set_layouts().len(),
                    spec.first_set,
                    spec.last_set
                ),
            })?;

        let ledger = ResourceLedger::new(shader.resources(), spec.first_set, spec.last_set);

        let pool_sizes = ledger.pool_sizes(spec.frames_in_flight);
        let set_count = (spec.last_set - spec.first_set + 1) * spec.frames_in_flight;

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(set_count);

        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&pool_info, None)
                .map_err(VulkanError::Api)?
        };

        let mut sets = Vec::with_capacity(spec.frames_in_flight as usize);
        for _ in 0..spec.frames_in_flight {
            let alloc_info = vk::DescriptorSetAllocateInfo::builder()
                .descriptor_pool(pool)
                .set_layouts(layouts);

            let frame_sets = unsafe {
                match device.handle().allocate_descriptor_sets(&alloc_info) {
                    Ok(sets) => sets,
                    Err(e) => {
                        device.handle().destroy_descriptor_pool(pool, None);
                        return Err(VulkanError::Api(e));
                    }
                }
            };
            sets.push(frame_sets);
        }

        log::debug!(
            "Resource manager for '{}': sets {}..={}, {} resource(s), {} frame(s)",
            shader.name(),
            spec.first_set,
            spec.last_set,
            ledger.len(),
            spec.frames_in_flight
        );

        Ok(Self {
            device,
            pool,
            sets,
            ledger,
            queue: Vec::new(),
            first_set: spec.first_set,
            frames_in_flight: spec.frames_in_flight,
        })
    }

    /// Bind a resource to every frame slot at once.
    ///
    /// For resources that do not vary per frame (a texture bound once);
    /// one logical call enqueues a write per frame copy. Marks the
    /// resource bound.
    pub fn set(&mut self, name: &str, resource: ShaderResource<'_>) -> VulkanResult<()> {
        let record = self
            .ledger
            .validate(name, resource.kind(), resource.array_length())?;
        self.check_ring_length(name, &resource)?;

        for frame in 0..self.frames_in_flight {
            self.enqueue(&record, frame, &resource);
        }
        self.ledger.mark_bound(name);
        Ok(())
    }

    /// Bind a resource to one frame slot only.
    ///
    /// For genuinely per-frame-varying data (a camera uniform refreshed
    /// every frame); write the slot about to be submitted, never another.
    pub fn update(
        &mut self,
        name: &str,
        frame_index: u32,
        resource: ShaderResource<'_>,
    ) -> VulkanResult<()> {
        let record = self
            .ledger
            .validate(name, resource.kind(), resource.array_length())?;
        self.check_ring_length(name, &resource)?;

        self.enqueue(&record, frame_index, &resource);
        self.ledger.mark_bound(name);
        Ok(())
    }

    fn check_ring_length(&self, name: &str, resource: &ShaderResource<'_>) -> VulkanResult<()> {
        if let ShaderResource::UniformBufferRing(ring) = resource {
            if ring.len() != self.frames_in_flight {
                return Err(VulkanError::InvalidOperation {
                    reason: format!(
                        "uniform ring for '{}' has {} buffer(s), manager runs {} frame(s)",
                        name,
                        ring.len(),
                        self.frames_in_flight
                    ),
                });
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, record: &LedgerRecord, frame: u32, resource: &ShaderResource<'_>) {
        let dst_set = self.sets[frame as usize][(record.set - self.first_set) as usize];

        let (buffer_infos, image_infos) = match resource {
            ShaderResource::UniformBuffer(buffer) => (vec![buffer.descriptor_info()], Vec::new()),
            ShaderResource::UniformBufferRing(ring) => {
                (vec![ring.get(frame).descriptor_info()], Vec::new())
            }
            ShaderResource::Texture(texture) => (Vec::new(), vec![texture.descriptor_info()]),
            ShaderResource::TextureArray(textures) => (
                Vec::new(),
                textures.iter().map(|texture| texture.descriptor_info()).collect(),
            ),
        };

        self.queue.push(QueuedWrite {
            set: dst_set,
            binding: record.binding,
            descriptor_type: record.kind.descriptor_type(),
            buffer_infos,
            image_infos,
        });
    }

    /// Flush every queued descriptor write in one driver call, then clear
    /// the queue. Must run before the sets are bound for a draw that
    /// depends on the queued changes.
    pub fn process_changes(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .queue
            .iter()
            .map(|queued| {
                let mut write = vk::WriteDescriptorSet::builder()
                    .dst_set(queued.set)
                    .dst_binding(queued.binding)
                    .descriptor_type(queued.descriptor_type);
                if queued.buffer_infos.is_empty() {
                    write = write.image_info(&queued.image_infos);
                } else {
                    write = write.buffer_info(&queued.buffer_infos);
                }
                write.build()
            })
            .collect();

        unsafe {
            self.device.handle().update_descriptor_sets(&writes, &[]);
        }
        self.queue.clear();
    }

    /// True iff every declared resource has been bound at least once.
    ///
    /// This is a precondition check, not an enforcement; the draw path in
    /// [`ActiveRenderPass::bind_shader_resources`] consults it before
    /// binding.
    ///
    /// [`ActiveRenderPass::bind_shader_resources`]: crate::render::vulkan::ActiveRenderPass::bind_shader_resources
    pub fn ready_to_render(&self) -> bool {
        self.ledger.ready_to_render()
    }

    /// Names of declared resources never bound
    pub fn unbound_resources(&self) -> Vec<String> {
        self.ledger.unbound()
    }

    /// The frame slot's descriptor sets, in set-index order
    pub fn descriptor_sets(&self, frame_index: u32) -> &[vk::DescriptorSet] {
        &self.sets[frame_index as usize]
    }

    /// First descriptor-set index this manager owns
    pub fn first_set(&self) -> u32 {
        self.first_set
    }

    /// Number of queued, unflushed descriptor writes
    pub fn pending_changes(&self) -> usize {
        self.queue.len()
    }
}

impl Drop for ShaderResourceManager {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        unsafe {
            // Frees all sets allocated from it
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, set: u32, binding: u32, kind: ShaderResourceKind, array_length: u32) -> ShaderResourceMetadata {
        ShaderResourceMetadata {
            name: name.to_string(),
            set,
            binding,
            kind,
            array_length,
            stages: vk::ShaderStageFlags::ALL_GRAPHICS,
        }
    }

    fn sample_resources() -> Vec<ShaderResourceMetadata> {
        vec![
            metadata("camera", 0, 0, ShaderResourceKind::UniformBuffer, 1),
            metadata("lights", 0, 1, ShaderResourceKind::UniformBuffer, 1),
            metadata("albedo", 1, 0, ShaderResourceKind::Texture2D, 1),
            metadata("shadow_maps", 1, 1, ShaderResourceKind::Texture2DArray, 4),
        ]
    }

    fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut result = Vec::new();
        for (index, &item) in items.iter().enumerate() {
            let mut rest = items.to_vec();
            rest.remove(index);
            for mut tail in permutations(&rest) {
                tail.insert(0, item);
                result.push(tail);
            }
        }
        result
    }

    #[test]
    fn completeness_gate_flips_after_last_bind_in_any_order() {
        let resources = sample_resources();
        let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
        let indices: Vec<usize> = (0..names.len()).collect();

        // All 4! bind orders: the gate must flip exactly once, after the
        // final bind
        for order in permutations(&indices) {
            let mut ledger = ResourceLedger::new(&resources, 0, 1);
            let mut flips = 0;
            let mut previous = ledger.ready_to_render();
            assert!(!previous);

            for &index in &order {
                ledger.mark_bound(names[index]);
                let now = ledger.ready_to_render();
                if now != previous {
                    flips += 1;
                }
                previous = now;
            }

            assert!(ledger.ready_to_render());
            assert_eq!(flips, 1, "order {:?}", order);
        }
    }

    #[test]
    fn rebinding_does_not_unflip_the_gate() {
        let resources = sample_resources();
        let mut ledger = ResourceLedger::new(&resources, 0, 1);
        for resource in &resources {
            ledger.mark_bound(&resource.name);
        }
        assert!(ledger.ready_to_render());
        ledger.mark_bound("camera");
        assert!(ledger.ready_to_render());
    }

    #[test]
    fn unbound_resources_are_reported_by_name() {
        let resources = sample_resources();
        let mut ledger = ResourceLedger::new(&resources, 0, 1);
        ledger.mark_bound("camera");
        ledger.mark_bound("albedo");
        assert_eq!(ledger.unbound(), vec!["lights", "shadow_maps"]);
    }

    #[test]
    fn ledger_only_tracks_sets_in_range() {
        let resources = sample_resources();
        let ledger = ResourceLedger::new(&resources, 0, 0);
        assert_eq!(ledger.len(), 2);
        // Out-of-range resources are someone else's problem
        assert!(matches!(
            ledger.validate("albedo", ShaderResourceKind::Texture2D, 1),
            Err(VulkanError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn pool_sizes_computed_from_declared_counts() {
        let resources = sample_resources();
        let ledger = ResourceLedger::new(&resources, 0, 1);
        let sizes = ledger.pool_sizes(3);

        let uniform = sizes
            .iter()
            .find(|size| size.ty == vk::DescriptorType::UNIFORM_BUFFER)
            .unwrap();
        let sampled = sizes
            .iter()
            .find(|size| size.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .unwrap();

        // 2 uniform buffers x 3 frames, (1 + 4) sampled images x 3 frames
        assert_eq!(uniform.descriptor_count, 6);
        assert_eq!(sampled.descriptor_count, 15);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn kind_mismatch_is_an_error() {
        let resources = sample_resources();
        let ledger = ResourceLedger::new(&resources, 0, 1);
        assert!(ledger
            .validate("camera", ShaderResourceKind::Texture2D, 1)
            .is_err());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn array_length_mismatch_is_an_error() {
        let resources = sample_resources();
        let ledger = ResourceLedger::new(&resources, 0, 1);
        assert!(ledger
            .validate("shadow_maps", ShaderResourceKind::Texture2DArray, 3)
            .is_err());
    }

    #[test]
    #[should_panic(expected = "bound as")]
    #[cfg(debug_assertions)]
    fn kind_mismatch_asserts_in_debug() {
        let resources = sample_resources();
        let ledger = ResourceLedger::new(&resources, 0, 1);
        let _ = ledger.validate("camera", ShaderResourceKind::Texture2D, 1);
    }
}
