/// Arena of deferred descriptor writes
///
/// Infos are copied into two flat vectors and each queued write keeps a range
/// into them. Clearing keeps the capacity, so steady-state frames queue
/// updates without allocating.

use std::ops::Range;

use crate::device::{
    BufferInfo, DescriptorInfo, DescriptorSetHandle, DescriptorType, DescriptorWrite,
    DescriptorWriteInfos, ImageInfo,
};

struct PendingWrite {
    set: DescriptorSetHandle,
    binding: u32,
    array_index: u32,
    kind: DescriptorType,
    infos: Range<usize>,
}

#[derive(Default)]
pub(crate) struct PendingUpdates {
    writes: Vec<PendingWrite>,
    buffers: Vec<BufferInfo>,
    images: Vec<ImageInfo>,
}

impl PendingUpdates {
    /// Copy `infos` into the arena and queue one write.
    ///
    /// Every info must match `kind`; the registry validates this beforehand.
    pub(crate) fn push(
        &mut self,
        set: DescriptorSetHandle,
        binding: u32,
        array_index: u32,
        kind: DescriptorType,
        infos: &[DescriptorInfo],
    ) {
        let range = match kind {
            DescriptorType::UniformBuffer => {
                let start = self.buffers.len();
                self.buffers.extend(infos.iter().filter_map(|info| match info {
                    DescriptorInfo::Buffer(buffer) => Some(*buffer),
                    DescriptorInfo::Image(_) => None,
                }));
                start..self.buffers.len()
            }
            DescriptorType::CombinedImageSampler => {
                let start = self.images.len();
                self.images.extend(infos.iter().filter_map(|info| match info {
                    DescriptorInfo::Image(image) => Some(*image),
                    DescriptorInfo::Buffer(_) => None,
                }));
                start..self.images.len()
            }
        };

        self.writes.push(PendingWrite {
            set,
            binding,
            array_index,
            kind,
            infos: range,
        });
    }

    /// Writes borrowing the arena's copies
    pub(crate) fn writes(&self) -> Vec<DescriptorWrite<'_>> {
        self.writes
            .iter()
            .map(|write| DescriptorWrite {
                set: write.set,
                binding: write.binding,
                array_index: write.array_index,
                kind: write.kind,
                infos: match write.kind {
                    DescriptorType::UniformBuffer => {
                        DescriptorWriteInfos::Buffers(&self.buffers[write.infos.clone()])
                    }
                    DescriptorType::CombinedImageSampler => {
                        DescriptorWriteInfos::Images(&self.images[write.infos.clone()])
                    }
                },
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.writes.clear();
        self.buffers.clear();
        self.images.clear();
    }
}
