/// VulkanDevice - Vulkan implementation of the presenter's device function table

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use video_presenter::vpresent::device::*;
use video_presenter::vpresent::{Error, Result};
use video_presenter::{vp_bail, vp_bail_warn, vp_debug, vp_err, vp_error};

use crate::vulkan_config::VulkanConfig;
use crate::vulkan_context::{vk_error, VulkanContext, SOURCE};
use crate::vulkan_format::*;
use crate::vulkan_handle::VkHandle;
use crate::vulkan_swapchain::VulkanSwapchain;

/// Host-visible buffer and its memory
struct BufferAllocation {
    allocation: Allocation,
    size: u64,
}

/// Vulkan device function table.
///
/// Wrap it in a [`GpuContext`] with [`context`](Self::context) to hand it to
/// the presenter. Buffers are allocated with gpu-allocator in CPU-to-GPU
/// memory and stay mapped for their whole life.
pub struct VulkanDevice {
    ctx: Arc<VulkanContext>,
    config: VulkanConfig,
    buffers: Mutex<FxHashMap<u64, BufferAllocation>>,
}

impl VulkanDevice {
    /// Create a device able to present to `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: VulkanConfig) -> Result<Arc<Self>> {
        let ctx = VulkanContext::new(window, &config)?;
        Ok(Arc::new(Self {
            ctx: Arc::new(ctx),
            config,
            buffers: Mutex::new(FxHashMap::default()),
        }))
    }

    /// GPU context for the presenter, using the graphics queue
    pub fn context(self: &Arc<Self>) -> GpuContext {
        GpuContext::new(self.clone(), QueueHandle::from_vk(self.ctx.queue))
    }

    /// Swapchain presenting into `window`.
    ///
    /// The surface is created here; back buffers are created by `Swapchain::init`.
    pub fn create_swapchain(&self, window: Arc<winit::window::Window>) -> Result<VulkanSwapchain> {
        VulkanSwapchain::new(Arc::clone(&self.ctx), window, self.config.back_buffer_count)
    }

    pub fn config(&self) -> &VulkanConfig {
        &self.config
    }

    /// Live buffers created through this device
    pub fn buffer_count(&self) -> usize {
        self.lock_buffers().len()
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    fn lock_buffers(&self) -> MutexGuard<'_, FxHashMap<u64, BufferAllocation>> {
        match self.buffers.lock() {
            Ok(buffers) => buffers,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn free_allocation(&self, allocation: Allocation) {
        match self.ctx.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    vp_error!(SOURCE, "Failed to free buffer memory: {}", e);
                }
            }
            Err(_) => vp_error!(SOURCE, "Allocator lock poisoned, leaking buffer memory"),
        }
    }

    fn copy_to_allocation(allocation: &BufferAllocation, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > allocation.size) {
            vp_bail!(SOURCE, OutOfRange,
                "Write of {} bytes at offset {} exceeds buffer size {}", data.len(), offset, allocation.size);
        }
        let mapped = match allocation.allocation.mapped_ptr() {
            Some(ptr) => ptr.as_ptr() as *mut u8,
            None => vp_bail!(SOURCE, BackendError, "Buffer memory is not host-visible"),
        };
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }
}

// ============================================================================
// RESOURCE FACTORY
// ============================================================================

impl ResourceFactory for VulkanDevice {
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<BufferHandle> {
        if desc.size == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Buffer size must be greater than 0");
        }
        let device = self.device();
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = device
                .create_buffer(&create_info, None)
                .map_err(|e| vk_error("vkCreateBuffer", e))?;

            let requirements = device.get_buffer_memory_requirements(buffer);
            let allocation = match self.ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name: "presenter buffer",
                    requirements,
                    location: MemoryLocation::CpuToGpu,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }),
                Err(_) => {
                    device.destroy_buffer(buffer, None);
                    vp_bail!(SOURCE, BackendError, "Allocator lock poisoned");
                }
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    device.destroy_buffer(buffer, None);
                    vp_error!(SOURCE, "Out of GPU memory for buffer of {} bytes: {}", requirements.size, e);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                self.free_allocation(allocation);
                device.destroy_buffer(buffer, None);
                return Err(vk_error("vkBindBufferMemory", e));
            }

            let allocation = BufferAllocation { allocation, size: desc.size };
            if let Some(data) = data {
                if let Err(e) = Self::copy_to_allocation(&allocation, 0, data) {
                    self.free_allocation(allocation.allocation);
                    device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            }

            let handle = BufferHandle::from_vk(buffer);
            self.lock_buffers().insert(handle.as_raw(), allocation);
            Ok(handle)
        }
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let buffers = self.lock_buffers();
        match buffers.get(&buffer.as_raw()) {
            Some(allocation) => Self::copy_to_allocation(allocation, offset, data),
            None => vp_bail!(SOURCE, NotFound, "Unknown buffer {:#x}", buffer.as_raw()),
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if buffer.is_null() {
            return;
        }
        let allocation = self.lock_buffers().remove(&buffer.as_raw());
        if let Some(allocation) = allocation {
            self.free_allocation(allocation.allocation);
        }
        unsafe { self.device().destroy_buffer(buffer.to_vk(), None) };
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let info = sampler_create_info(desc);
        let sampler = unsafe { self.device().create_sampler(&info, None) }
            .map_err(|e| vk_error("vkCreateSampler", e))?;
        Ok(SamplerHandle::from_vk(sampler))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        if !sampler.is_null() {
            unsafe { self.device().destroy_sampler(sampler.to_vk(), None) };
        }
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        let semaphore = unsafe { self.device().create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .map_err(|e| vk_error("vkCreateSemaphore", e))?;
        Ok(SemaphoreHandle::from_vk(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        if !semaphore.is_null() {
            unsafe { self.device().destroy_semaphore(semaphore.to_vk(), None) };
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { self.device().create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }
            .map_err(|e| vk_error("vkCreateFence", e))?;
        Ok(FenceHandle::from_vk(fence))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if !fence.is_null() {
            unsafe { self.device().destroy_fence(fence.to_vk(), None) };
        }
    }

    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle> {
        if code.is_empty() || code.len() % 4 != 0 {
            vp_bail_warn!(SOURCE, InvalidArgument,
                "Shader code not 4-byte aligned (size: {} bytes)", code.len());
        }
        let words: Vec<u32> = code
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { self.device().create_shader_module(&info, None) }
            .map_err(|e| vk_error("vkCreateShaderModule", e))?;
        Ok(ShaderModuleHandle::from_vk(module))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        if !module.is_null() {
            unsafe { self.device().destroy_shader_module(module.to_vk(), None) };
        }
    }
}

// ============================================================================
// GRAPHICS DEVICE
// ============================================================================

impl GraphicsDevice for VulkanDevice {
    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(descriptor_type_to_vk(b.kind))
                    .descriptor_count(b.count)
                    .stage_flags(stage_flags_to_vk(b.stages))
            })
            .collect();
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device().create_descriptor_set_layout(&info, None) }
            .map_err(|e| vk_error("vkCreateDescriptorSetLayout", e))?;
        Ok(DescriptorSetLayoutHandle::from_vk(layout))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        if !layout.is_null() {
            unsafe { self.device().destroy_descriptor_set_layout(layout.to_vk(), None) };
        }
    }

    fn create_descriptor_pool(&self, sizes: &[DescriptorPoolSize], max_sets: u32) -> Result<DescriptorPoolHandle> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|s| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(s.kind),
                descriptor_count: s.count,
            })
            .collect();
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(max_sets);
        let pool = unsafe { self.device().create_descriptor_pool(&info, None) }
            .map_err(|e| vk_error("vkCreateDescriptorPool", e))?;
        Ok(DescriptorPoolHandle::from_vk(pool))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        if !pool.is_null() {
            unsafe { self.device().destroy_descriptor_pool(pool.to_vk(), None) };
        }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPoolHandle,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<Vec<DescriptorSetHandle>> {
        let vk_layouts: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|l| l.to_vk()).collect();
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool.to_vk())
            .set_layouts(&vk_layouts);
        let sets = unsafe { self.device().allocate_descriptor_sets(&info) }
            .map_err(|e| vk_error("vkAllocateDescriptorSets", e))?;
        Ok(sets.into_iter().map(DescriptorSetHandle::from_vk).collect())
    }

    fn free_descriptor_sets(&self, pool: DescriptorPoolHandle, sets: &[DescriptorSetHandle]) {
        if pool.is_null() || sets.is_empty() {
            return;
        }
        let vk_sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| s.to_vk()).collect();
        if let Err(e) = unsafe { self.device().free_descriptor_sets(pool.to_vk(), &vk_sets) } {
            vp_error!(SOURCE, "vkFreeDescriptorSets failed: {:?}", e);
        }
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]) {
        // Info arrays must outlive the write structs pointing at them
        let buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = writes
            .iter()
            .map(|w| match w.infos {
                DescriptorWriteInfos::Buffers(infos) => infos
                    .iter()
                    .map(|i| vk::DescriptorBufferInfo {
                        buffer: i.buffer.to_vk(),
                        offset: i.offset,
                        range: i.range,
                    })
                    .collect(),
                DescriptorWriteInfos::Images(_) => Vec::new(),
            })
            .collect();
        let image_infos: Vec<Vec<vk::DescriptorImageInfo>> = writes
            .iter()
            .map(|w| match w.infos {
                DescriptorWriteInfos::Images(infos) => infos
                    .iter()
                    .map(|i| vk::DescriptorImageInfo {
                        sampler: i.sampler.to_vk(),
                        image_view: i.view.to_vk(),
                        image_layout: image_layout_to_vk(i.layout),
                    })
                    .collect(),
                DescriptorWriteInfos::Buffers(_) => Vec::new(),
            })
            .collect();

        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .enumerate()
            .map(|(index, w)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(w.set.to_vk())
                    .dst_binding(w.binding)
                    .dst_array_element(w.array_index)
                    .descriptor_type(descriptor_type_to_vk(w.kind));
                match w.infos {
                    DescriptorWriteInfos::Buffers(_) => write.buffer_info(&buffer_infos[index]),
                    DescriptorWriteInfos::Images(_) => write.image_info(&image_infos[index]),
                }
            })
            .collect();

        unsafe { self.device().update_descriptor_sets(&vk_writes, &[]) };
    }

    // ===== PIPELINES =====

    fn create_pipeline_layout(&self, set_layouts: &[DescriptorSetLayoutHandle]) -> Result<PipelineLayoutHandle> {
        let vk_layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|l| l.to_vk()).collect();
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&vk_layouts);
        let layout = unsafe { self.device().create_pipeline_layout(&info, None) }
            .map_err(|e| vk_error("vkCreatePipelineLayout", e))?;
        Ok(PipelineLayoutHandle::from_vk(layout))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        if !layout.is_null() {
            unsafe { self.device().destroy_pipeline_layout(layout.to_vk(), None) };
        }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineHandle> {
        let state = desc.state;
        if !state.dynamic_viewport_scissor {
            vp_bail!(SOURCE, InvalidArgument, "Pipelines require dynamic viewport and scissor");
        }
        let samples = match sample_count_to_vk(state.sample_count) {
            Some(samples) => samples,
            None => vp_bail!(SOURCE, InvalidArgument, "Unsupported sample count {}", state.sample_count),
        };

        let entry_points = desc
            .stages
            .iter()
            .map(|s| CString::new(s.entry_point.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| vp_err!(SOURCE, InvalidArgument, "Shader entry point contains a NUL byte"))?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .stages
            .iter()
            .zip(&entry_points)
            .map(|(stage, entry)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(stage.stage))
                    .module(stage.module.to_vk())
                    .name(entry)
            })
            .collect();

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_layout
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: vertex_format_to_vk(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(state.topology))
            .primitive_restart_enable(state.primitive_restart);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(polygon_mode_to_vk(state.polygon_mode))
            .cull_mode(cull_mode_to_vk(state.cull_mode))
            .front_face(front_face_to_vk(state.front_face))
            .line_width(state.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(state.depth_test_enable)
            .depth_write_enable(state.depth_test_enable)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(state.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout.to_vk())
            .render_pass(desc.target.render_pass.to_vk())
            .subpass(desc.target.subpass);

        let pipelines = unsafe {
            self.device()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| vk_error("vkCreateGraphicsPipelines", e))?;

        match pipelines.first() {
            Some(&pipeline) => {
                vp_debug!(SOURCE, "Graphics pipeline created ({} stages)", stages.len());
                Ok(PipelineHandle::from_vk(pipeline))
            }
            None => vp_bail!(SOURCE, BackendError, "vkCreateGraphicsPipelines returned no pipeline"),
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if !pipeline.is_null() {
            unsafe { self.device().destroy_pipeline(pipeline.to_vk(), None) };
        }
    }

    // ===== COMMAND RECORDING =====

    fn create_command_pool(&self) -> Result<CommandPoolHandle> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.ctx.queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { self.device().create_command_pool(&info, None) }
            .map_err(|e| vk_error("vkCreateCommandPool", e))?;
        Ok(CommandPoolHandle::from_vk(pool))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        if !pool.is_null() {
            unsafe { self.device().destroy_command_pool(pool.to_vk(), None) };
        }
    }

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.to_vk())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device().allocate_command_buffers(&info) }
            .map_err(|e| vk_error("vkAllocateCommandBuffers", e))?;
        match buffers.first() {
            Some(&cmd) => Ok(CommandBufferHandle::from_vk(cmd)),
            None => vp_bail!(SOURCE, BackendError, "vkAllocateCommandBuffers returned no buffer"),
        }
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        let device = self.device();
        unsafe {
            device
                .reset_command_buffer(cmd.to_vk(), vk::CommandBufferResetFlags::empty())
                .map_err(|e| vk_error("vkResetCommandBuffer", e))?;
            let info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd.to_vk(), &info)
                .map_err(|e| vk_error("vkBeginCommandBuffer", e))
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()> {
        unsafe { self.device().end_command_buffer(cmd.to_vk()) }.map_err(|e| vk_error("vkEndCommandBuffer", e))
    }

    fn cmd_image_barrier(&self, cmd: CommandBufferHandle, barrier: &ImageBarrier) {
        let (src_access, src_stage) = layout_access(barrier.old_layout);
        let (dst_access, dst_stage) = layout_access(barrier.new_layout);
        let image_barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .old_layout(image_layout_to_vk(barrier.old_layout))
            .new_layout(image_layout_to_vk(barrier.new_layout))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image.to_vk())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe {
            self.device().cmd_pipeline_barrier(
                cmd.to_vk(),
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            );
        }
    }

    fn cmd_set_viewport(&self, cmd: CommandBufferHandle, viewport: &Viewport) {
        let vk_viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device().cmd_set_viewport(cmd.to_vk(), 0, &[vk_viewport]) };
    }

    fn cmd_set_scissor(&self, cmd: CommandBufferHandle, scissor: &Rect2D) {
        let rect = vk::Rect2D {
            offset: vk::Offset2D { x: scissor.x, y: scissor.y },
            extent: vk::Extent2D { width: scissor.width, height: scissor.height },
        };
        unsafe { self.device().cmd_set_scissor(cmd.to_vk(), 0, &[rect]) };
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.to_vk())
            .framebuffer(framebuffer.to_vk())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width: extent.width, height: extent.height },
            })
            .clear_values(&clear_values);
        unsafe { self.device().cmd_begin_render_pass(cmd.to_vk(), &info, vk::SubpassContents::INLINE) };
    }

    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle) {
        unsafe { self.device().cmd_end_render_pass(cmd.to_vk()) };
    }

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(cmd.to_vk(), vk::PipelineBindPoint::GRAPHICS, pipeline.to_vk())
        };
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) {
        let vk_sets: Vec<vk::DescriptorSet> = sets.iter().map(|s| s.to_vk()).collect();
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                cmd.to_vk(),
                vk::PipelineBindPoint::GRAPHICS,
                layout.to_vk(),
                first_set,
                &vk_sets,
                &[],
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64) {
        unsafe { self.device().cmd_bind_vertex_buffers(cmd.to_vk(), 0, &[buffer.to_vk()], &[offset]) };
    }

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, first_vertex: u32) {
        unsafe { self.device().cmd_draw(cmd.to_vk(), vertex_count, 1, first_vertex, 0) };
    }

    // ===== SUBMISSION =====

    fn queue_submit(&self, queue: QueueHandle, submit: &SubmitInfo<'_>, fence: FenceHandle) -> Result<()> {
        let wait_semaphores: Vec<vk::Semaphore> = submit.waits.iter().map(|w| w.semaphore.to_vk()).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> =
            submit.waits.iter().map(|w| pipeline_stage_to_vk(w.stage)).collect();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signals.iter().map(|s| s.to_vk()).collect();
        let command_buffers = [submit.command_buffer.to_vk()];

        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe { self.device().queue_submit(queue.to_vk(), &[info], fence.to_vk()) }
            .map_err(|e| vk_error("vkQueueSubmit", e))
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<()> {
        let timeout_ns = timeout.map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX));
        match unsafe { self.device().wait_for_fences(&[fence.to_vk()], true, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                vp_bail!(SOURCE, BackendError, "Fence wait timed out after {:?}", timeout)
            }
            Err(e) => Err(vk_error("vkWaitForFences", e)),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<()> {
        unsafe { self.device().reset_fences(&[fence.to_vk()]) }.map_err(|e| vk_error("vkResetFences", e))
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.device().device_wait_idle() }.map_err(|e| vk_error("vkDeviceWaitIdle", e))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let leaked: Vec<(u64, BufferAllocation)> = match self.buffers.get_mut() {
            Ok(buffers) => buffers.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        if leaked.is_empty() {
            return;
        }
        vp_error!(SOURCE, "{} buffer(s) still alive when the device was dropped", leaked.len());
        unsafe { self.ctx.device.device_wait_idle().ok() };
        for (raw, allocation) in leaked {
            self.free_allocation(allocation.allocation);
            unsafe { self.ctx.device.destroy_buffer(BufferHandle::from_raw(raw).to_vk(), None) };
        }
    }
}
