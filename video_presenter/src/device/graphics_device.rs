/// GraphicsDevice - the device function table shared by every presenter component

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::device::handle::*;
use crate::device::types::*;

/// Creates and destroys standalone GPU resources.
///
/// Destroy calls accept handles that were already destroyed by the caller's
/// bookkeeping only once; passing a null handle is a no-op.
pub trait ResourceFactory: Send + Sync {
    /// Create a host-visible buffer, optionally filled with `data`
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<BufferHandle>;

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    fn destroy_buffer(&self, buffer: BufferHandle);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn destroy_sampler(&self, sampler: SamplerHandle);

    fn create_semaphore(&self) -> Result<SemaphoreHandle>;

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;

    fn destroy_fence(&self, fence: FenceHandle);

    /// Create a shader module from SPIR-V bytes (length must be a multiple of 4)
    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle>;

    fn destroy_shader_module(&self, module: ShaderModuleHandle);
}

/// Device function table: descriptors, pipelines, command recording and
/// queue submission on top of [`ResourceFactory`].
pub trait GraphicsDevice: ResourceFactory {
    // ===== DESCRIPTORS =====

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle>;

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);

    /// Create a pool whose sets may be freed individually
    fn create_descriptor_pool(
        &self,
        sizes: &[DescriptorPoolSize],
        max_sets: u32,
    ) -> Result<DescriptorPoolHandle>;

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocate one set per layout, in order
    fn allocate_descriptor_sets(
        &self,
        pool: DescriptorPoolHandle,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<Vec<DescriptorSetHandle>>;

    fn free_descriptor_sets(&self, pool: DescriptorPoolHandle, sets: &[DescriptorSetHandle]);

    /// Apply all writes in one call
    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]);

    // ===== PIPELINES =====

    fn create_pipeline_layout(
        &self,
        set_layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<PipelineLayoutHandle>;

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineHandle>;

    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    // ===== COMMAND RECORDING =====

    /// Create a pool whose buffers can be reset individually
    fn create_command_pool(&self) -> Result<CommandPoolHandle>;

    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    fn allocate_command_buffer(&self, pool: CommandPoolHandle) -> Result<CommandBufferHandle>;

    /// Reset and begin a one-time-submit recording
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> Result<()>;

    fn cmd_image_barrier(&self, cmd: CommandBufferHandle, barrier: &ImageBarrier);

    fn cmd_set_viewport(&self, cmd: CommandBufferHandle, viewport: &Viewport);

    fn cmd_set_scissor(&self, cmd: CommandBufferHandle, scissor: &Rect2D);

    fn cmd_begin_render_pass(
        &self,
        cmd: CommandBufferHandle,
        render_pass: RenderPassHandle,
        framebuffer: FramebufferHandle,
        extent: Extent2D,
        clear_color: [f32; 4],
    );

    fn cmd_end_render_pass(&self, cmd: CommandBufferHandle);

    fn cmd_bind_pipeline(&self, cmd: CommandBufferHandle, pipeline: PipelineHandle);

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    );

    fn cmd_bind_vertex_buffer(&self, cmd: CommandBufferHandle, buffer: BufferHandle, offset: u64);

    fn cmd_draw(&self, cmd: CommandBufferHandle, vertex_count: u32, first_vertex: u32);

    // ===== SUBMISSION =====

    fn queue_submit(
        &self,
        queue: QueueHandle,
        submit: &SubmitInfo<'_>,
        fence: FenceHandle,
    ) -> Result<()>;

    /// Block until the fence is signaled; `None` waits forever
    fn wait_for_fence(&self, fence: FenceHandle, timeout: Option<Duration>) -> Result<()>;

    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    fn wait_idle(&self) -> Result<()>;
}

/// Shared GPU context: the device function table plus the submission queue.
///
/// Cloned into every component that talks to the GPU; cloning only bumps the
/// device reference count.
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<dyn GraphicsDevice>,
    queue: QueueHandle,
}

impl GpuContext {
    pub fn new(device: Arc<dyn GraphicsDevice>, queue: QueueHandle) -> Self {
        Self { device, queue }
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    /// Graphics queue used for command submission
    pub fn queue(&self) -> QueueHandle {
        self.queue
    }
}
