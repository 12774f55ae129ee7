/// PipelineObject - one graphics pipeline and its descriptor binding groups
///
/// Descriptor sets are assigned to numbered slots inside named binding
/// groups before the pipeline is built. Building creates the pipeline layout
/// from every distinct registered set (ordered by set index) and resolves
/// each group into the descriptor-set handles bound at draw time.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::command::CommandRecorder;
use crate::descriptor::{DescriptorRegistry, SetIndex};
use crate::device::{
    DescriptorSetHandle, DescriptorSetLayoutHandle, FixedFunctionState, GpuContext,
    GraphicsPipelineDesc, PipelineHandle, PipelineLayoutHandle, RenderTargetLayout,
    ShaderStageDesc, VertexLayout,
};
use crate::error::Result;
use crate::{vp_bail, vp_debug};

const SOURCE: &str = "vpresent::PipelineObject";

/// Binding group drawn by the presenter's composite pass
pub const PRESENT_GROUP: &str = "present";

/// Slots per binding group (Vulkan guarantees at least 4 bound sets)
pub const MAX_BOUND_SETS: u32 = 32;

// ===== BINDING GROUP =====

#[derive(Default)]
struct BindingGroup {
    /// Set index per slot number; `None` is an unresolved slot
    slots: Vec<Option<SetIndex>>,
    /// Descriptor sets in slot order, filled by `build`
    resolved: Vec<DescriptorSetHandle>,
}

// ===== PIPELINE OBJECT =====

pub struct PipelineObject {
    ctx: GpuContext,
    groups: FxHashMap<String, BindingGroup>,
    set_indices: BTreeSet<SetIndex>,
    state: FixedFunctionState,
    layout: Option<PipelineLayoutHandle>,
    pipeline: Option<PipelineHandle>,
}

impl PipelineObject {
    /// Pipeline with the default fixed-function state
    pub fn new(ctx: GpuContext) -> Self {
        Self::with_state(ctx, FixedFunctionState::default())
    }

    pub fn with_state(ctx: GpuContext, state: FixedFunctionState) -> Self {
        Self {
            ctx,
            groups: FxHashMap::default(),
            set_indices: BTreeSet::new(),
            state,
            layout: None,
            pipeline: None,
        }
    }

    /// Assign descriptor set `set` to `slot` of every group in `groups`.
    ///
    /// Either every group is updated or none is.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` once the pipeline is built
    /// - `InvalidArgument` for no groups or a (group, slot) pair already assigned
    /// - `OutOfRange` for a slot at or above [`MAX_BOUND_SETS`]
    pub fn register_descriptor_set(&mut self, set: SetIndex, slot: u32, groups: &[&str]) -> Result<()> {
        if self.is_built() {
            vp_bail!(SOURCE, AlreadyInitialized, "Cannot register descriptor sets on a built pipeline");
        }
        if groups.is_empty() {
            vp_bail!(SOURCE, InvalidArgument, "Descriptor set {} registered without a group", set);
        }
        if slot >= MAX_BOUND_SETS {
            vp_bail!(SOURCE, OutOfRange, "Slot {} exceeds the {} bound set limit", slot, MAX_BOUND_SETS);
        }

        // ========== VALIDATION: every (group, slot) pair must be free ==========
        for (i, name) in groups.iter().enumerate() {
            if groups[..i].contains(name) {
                vp_bail!(SOURCE, InvalidArgument, "Group '{}' listed twice", name);
            }
            let taken = self
                .groups
                .get(*name)
                .and_then(|group| group.slots.get(slot as usize))
                .is_some_and(|assigned| assigned.is_some());
            if taken {
                vp_bail!(SOURCE, InvalidArgument, "Slot {} of group '{}' is already assigned", slot, name);
            }
        }

        // ========== ASSIGN ==========
        for name in groups {
            let group = self.groups.entry((*name).to_string()).or_default();
            if group.slots.len() <= slot as usize {
                group.slots.resize(slot as usize + 1, None);
            }
            group.slots[slot as usize] = Some(set);
        }
        self.set_indices.insert(set);
        Ok(())
    }

    /// Create the pipeline layout and the graphics pipeline, then resolve every group.
    ///
    /// Groups are bound from set 0 in slot order, so slot N of every group
    /// must hold a set compatible with the N-th distinct registered set index.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if already built
    /// - `InvalidArgument` without shader stages
    /// - `NotInitialized` if the registry is not finalized
    /// - `OutOfRange` for an unresolved slot or a set the registry does not know
    pub fn build(
        &mut self,
        registry: &DescriptorRegistry,
        stages: &[ShaderStageDesc],
        vertex_layout: &VertexLayout,
        target: &RenderTargetLayout,
    ) -> Result<()> {
        if self.is_built() {
            vp_bail!(SOURCE, AlreadyInitialized, "Pipeline already built");
        }
        if stages.is_empty() {
            vp_bail!(SOURCE, InvalidArgument, "Pipeline built without shader stages");
        }
        if !registry.is_finalized() {
            vp_bail!(SOURCE, NotInitialized, "Descriptor registry must be finalized before building");
        }

        // ========== VALIDATION: every slot resolved ==========
        for (name, group) in &self.groups {
            if let Some(slot) = group.slots.iter().position(Option::is_none) {
                vp_bail!(SOURCE, OutOfRange, "Slot {} of group '{}' has no descriptor set", slot, name);
            }
        }

        let mut set_layouts: Vec<DescriptorSetLayoutHandle> = Vec::with_capacity(self.set_indices.len());
        for set in &self.set_indices {
            match registry.set_layout(*set) {
                Some(layout) => set_layouts.push(layout),
                None => vp_bail!(SOURCE, OutOfRange,
                    "Descriptor set {} is not registered (count: {})", set, registry.set_count()),
            }
        }

        let mut resolved: Vec<(String, Vec<DescriptorSetHandle>)> = Vec::with_capacity(self.groups.len());
        for (name, group) in &self.groups {
            let mut handles = Vec::with_capacity(group.slots.len());
            for set in group.slots.iter().flatten() {
                match registry.descriptor_set(*set) {
                    Some(handle) => handles.push(handle),
                    None => vp_bail!(SOURCE, OutOfRange, "Descriptor set {} was never allocated", set),
                }
            }
            resolved.push((name.clone(), handles));
        }

        // ========== CREATE ==========
        let device = self.ctx.device();
        let layout = device.create_pipeline_layout(&set_layouts)?;
        let pipeline = match device.create_graphics_pipeline(&GraphicsPipelineDesc {
            layout,
            stages,
            vertex_layout,
            state: &self.state,
            target,
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e);
            }
        };

        for (name, handles) in resolved {
            if let Some(group) = self.groups.get_mut(&name) {
                group.resolved = handles;
            }
        }
        self.layout = Some(layout);
        self.pipeline = Some(pipeline);
        vp_debug!(SOURCE, "Built pipeline with {} set layouts and {} groups", set_layouts.len(), self.groups.len());
        Ok(())
    }

    /// Bind the pipeline and the resolved descriptor sets of `group`
    pub fn bind(&self, recorder: &mut CommandRecorder, group: &str) -> Result<()> {
        let (layout, pipeline) = match (self.layout, self.pipeline) {
            (Some(layout), Some(pipeline)) => (layout, pipeline),
            _ => vp_bail!(SOURCE, NotInitialized, "Pipeline bound before it was built"),
        };
        let sets = match self.groups.get(group) {
            Some(group) => &group.resolved,
            None => vp_bail!(SOURCE, InvalidArgument, "Unknown binding group '{}'", group),
        };

        recorder.bind_pipeline(pipeline)?;
        recorder.bind_descriptor_sets(layout, 0, sets)
    }

    pub fn is_built(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn layout(&self) -> Option<PipelineLayoutHandle> {
        self.layout
    }

    pub fn pipeline(&self) -> Option<PipelineHandle> {
        self.pipeline
    }

    pub fn state(&self) -> &FixedFunctionState {
        &self.state
    }

    /// Descriptor sets bound for `group`, empty before build
    pub fn resolved_sets(&self, group: &str) -> Option<&[DescriptorSetHandle]> {
        self.groups.get(group).map(|g| g.resolved.as_slice())
    }

    /// Destroy the pipeline and its layout; group registrations are cleared.
    pub fn terminate(&mut self) {
        let device = self.ctx.device();
        if let Some(pipeline) = self.pipeline.take() {
            device.destroy_pipeline(pipeline);
        }
        if let Some(layout) = self.layout.take() {
            device.destroy_pipeline_layout(layout);
        }
        self.groups.clear();
        self.set_indices.clear();
    }
}

impl Drop for PipelineObject {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
#[path = "pipeline_object_tests.rs"]
mod tests;
