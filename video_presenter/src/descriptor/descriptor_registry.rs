/// DescriptorRegistry - owner of every descriptor-set layout, the pool and the sets

use crate::device::{
    BufferInfo, DescriptorBinding, DescriptorInfo, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorType, DescriptorWrite,
    DescriptorWriteInfos, GpuContext, ImageInfo,
};
use crate::error::Result;
use crate::{vp_bail, vp_debug, vp_warn};

use super::pending_updates::PendingUpdates;

const SOURCE: &str = "vpresent::DescriptorRegistry";

/// Registry-assigned index of a descriptor set
pub type SetIndex = u32;

struct RegisteredSet {
    layout: DescriptorSetLayoutHandle,
    bindings: Vec<DescriptorBinding>,
}

/// Allocates and owns descriptor-set layouts and sets, and batches writes.
///
/// Lifecycle: [`register`](Self::register) every layout, then
/// [`finalize`](Self::finalize) once to create the pool (pools cannot grow),
/// then queue updates. Deferred updates are copied into an internal arena and
/// applied by [`flush_pending_updates`](Self::flush_pending_updates), which
/// must run before any draw that samples them.
pub struct DescriptorRegistry {
    ctx: GpuContext,
    sets: Vec<RegisteredSet>,
    pool_sizes: Vec<DescriptorPoolSize>,
    pool: Option<DescriptorPoolHandle>,
    allocated: Vec<DescriptorSetHandle>,
    finalized: bool,
    pending: PendingUpdates,
}

impl DescriptorRegistry {
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            sets: Vec::new(),
            pool_sizes: Vec::new(),
            pool: None,
            allocated: Vec::new(),
            finalized: false,
            pending: PendingUpdates::default(),
        }
    }

    /// Register one descriptor-set layout
    ///
    /// # Returns
    ///
    /// The set index used by later update and pipeline calls.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` after [`finalize`](Self::finalize)
    /// - `InvalidArgument` for an empty list, a zero count or a repeated slot
    pub fn register(&mut self, bindings: &[DescriptorBinding]) -> Result<SetIndex> {
        if self.finalized {
            vp_bail!(SOURCE, AlreadyInitialized,
                "Cannot register a descriptor set after the pool was finalized");
        }
        if bindings.is_empty() {
            vp_bail!(SOURCE, InvalidArgument, "Descriptor set registered with no bindings");
        }
        for (i, binding) in bindings.iter().enumerate() {
            if binding.count == 0 {
                vp_bail!(SOURCE, InvalidArgument, "Binding {} has a descriptor count of 0", binding.binding);
            }
            if bindings[..i].iter().any(|b| b.binding == binding.binding) {
                vp_bail!(SOURCE, InvalidArgument, "Binding slot {} declared twice", binding.binding);
            }
        }

        let layout = self.ctx.device().create_descriptor_set_layout(bindings)?;

        for binding in bindings {
            match self.pool_sizes.iter_mut().find(|size| size.kind == binding.kind) {
                Some(size) => size.count += binding.count,
                None => self.pool_sizes.push(DescriptorPoolSize {
                    kind: binding.kind,
                    count: binding.count,
                }),
            }
        }

        let index = self.sets.len() as SetIndex;
        self.sets.push(RegisteredSet {
            layout,
            bindings: bindings.to_vec(),
        });
        vp_debug!(SOURCE, "Registered descriptor set {} ({} bindings)", index, bindings.len());
        Ok(index)
    }

    /// Create the pool sized to the registered bindings and allocate one set per layout
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` on a second call
    /// - `InvariantViolation` if pool sizes exist without any registered set
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            vp_bail!(SOURCE, AlreadyInitialized, "Descriptor pool already finalized");
        }

        if self.sets.is_empty() {
            if !self.pool_sizes.is_empty() {
                vp_bail!(SOURCE, InvariantViolation,
                    "{} pool size entries but no registered descriptor set", self.pool_sizes.len());
            }
            vp_warn!(SOURCE, "Finalizing with no registered descriptor sets");
            self.finalized = true;
            return Ok(());
        }

        let device = self.ctx.device();
        let pool = device.create_descriptor_pool(&self.pool_sizes, self.sets.len() as u32)?;

        let layouts: Vec<DescriptorSetLayoutHandle> = self.sets.iter().map(|s| s.layout).collect();
        let allocated = match device.allocate_descriptor_sets(pool, &layouts) {
            Ok(allocated) => allocated,
            Err(e) => {
                device.destroy_descriptor_pool(pool);
                return Err(e);
            }
        };

        self.pool = Some(pool);
        self.allocated = allocated;
        self.finalized = true;
        vp_debug!(SOURCE, "Allocated {} descriptor sets", self.allocated.len());
        Ok(())
    }

    /// Write `infos` to `binding` of set `set`, starting at `array_index`.
    ///
    /// With `immediate` the GPU descriptor is written before returning.
    /// Otherwise the infos are copied and applied by the next flush, so the
    /// caller's values may be dropped or reused right away.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`finalize`](Self::finalize)
    /// - `OutOfRange` for an unknown set or binding, or an array overflow
    /// - `InvalidArgument` for no infos or infos of the wrong kind
    pub fn queue_update(
        &mut self,
        set: SetIndex,
        binding: u32,
        array_index: u32,
        infos: &[DescriptorInfo],
        immediate: bool,
    ) -> Result<()> {
        if !self.finalized {
            vp_bail!(SOURCE, NotInitialized, "Descriptor update before the pool was finalized");
        }
        let handle = match self.allocated.get(set as usize) {
            Some(handle) => *handle,
            None => vp_bail!(SOURCE, OutOfRange,
                "Descriptor set {} out of range (count: {})", set, self.allocated.len()),
        };
        if infos.is_empty() {
            vp_bail!(SOURCE, InvalidArgument, "Descriptor update with no resource info");
        }
        let slot = match self.sets[set as usize].bindings.iter().find(|b| b.binding == binding) {
            Some(slot) => *slot,
            None => vp_bail!(SOURCE, OutOfRange, "Set {} has no binding {}", set, binding),
        };
        if let Some(info) = infos.iter().find(|info| info.kind() != slot.kind) {
            vp_bail!(SOURCE, InvalidArgument,
                "Binding {} expects {:?}, got {:?}", binding, slot.kind, info.kind());
        }
        if array_index as u64 + infos.len() as u64 > slot.count as u64 {
            vp_bail!(SOURCE, OutOfRange,
                "Elements {}..{} exceed binding {} count {}",
                array_index, array_index as usize + infos.len(), binding, slot.count);
        }

        if immediate {
            Self::write_now(&self.ctx, handle, binding, array_index, slot.kind, infos);
        } else {
            self.pending.push(handle, binding, array_index, slot.kind, infos);
        }
        Ok(())
    }

    fn write_now(
        ctx: &GpuContext,
        set: DescriptorSetHandle,
        binding: u32,
        array_index: u32,
        kind: DescriptorType,
        infos: &[DescriptorInfo],
    ) {
        let buffers: Vec<BufferInfo>;
        let images: Vec<ImageInfo>;
        let write_infos = match kind {
            DescriptorType::UniformBuffer => {
                buffers = infos
                    .iter()
                    .filter_map(|info| match info {
                        DescriptorInfo::Buffer(buffer) => Some(*buffer),
                        DescriptorInfo::Image(_) => None,
                    })
                    .collect();
                DescriptorWriteInfos::Buffers(&buffers)
            }
            DescriptorType::CombinedImageSampler => {
                images = infos
                    .iter()
                    .filter_map(|info| match info {
                        DescriptorInfo::Image(image) => Some(*image),
                        DescriptorInfo::Buffer(_) => None,
                    })
                    .collect();
                DescriptorWriteInfos::Images(&images)
            }
        };

        ctx.device().update_descriptor_sets(&[DescriptorWrite {
            set,
            binding,
            array_index,
            kind,
            infos: write_infos,
        }]);
    }

    /// Apply every queued write in one device call and clear the queue.
    ///
    /// Returns the number of writes applied; an empty queue makes no device call.
    pub fn flush_pending_updates(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let count = self.pending.len();
        self.ctx.device().update_descriptor_sets(&self.pending.writes());
        self.pending.clear();
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn set_layout(&self, set: SetIndex) -> Option<DescriptorSetLayoutHandle> {
        self.sets.get(set as usize).map(|s| s.layout)
    }

    /// Allocated set, `None` before finalize or out of range
    pub fn descriptor_set(&self, set: SetIndex) -> Option<DescriptorSetHandle> {
        self.allocated.get(set as usize).copied()
    }

    pub fn bindings(&self, set: SetIndex) -> Option<&[DescriptorBinding]> {
        self.sets.get(set as usize).map(|s| s.bindings.as_slice())
    }

    /// Free the sets, destroy the pool, then destroy every layout.
    ///
    /// Safe to call repeatedly; the registry can be reused afterwards.
    pub fn terminate(&mut self) {
        let device = self.ctx.device();
        if let Some(pool) = self.pool.take() {
            if !self.allocated.is_empty() {
                device.free_descriptor_sets(pool, &self.allocated);
            }
            device.destroy_descriptor_pool(pool);
        }
        for set in self.sets.drain(..) {
            device.destroy_descriptor_set_layout(set.layout);
        }
        self.allocated.clear();
        self.pool_sizes.clear();
        self.pending.clear();
        self.finalized = false;
    }
}

impl Drop for DescriptorRegistry {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
#[path = "descriptor_registry_tests.rs"]
mod tests;
