//! Mock device, swapchain, window, frame and shader loader for unit tests (no GPU required)
//!
//! Every mock keeps its state behind a `Mutex` so a test can keep a handle for
//! inspection after handing the mock to the presenter.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::*;
use crate::error::{Error, Result};

// ============================================================================
// Mock Device
// ============================================================================

/// Queue submission captured by the mock device
#[derive(Debug, Clone)]
pub struct RecordedSubmit {
    pub command_buffer: CommandBufferHandle,
    pub waits: Vec<SemaphoreWait>,
    pub signals: Vec<SemaphoreHandle>,
}

#[derive(Default)]
pub struct MockDeviceState {
    next_handle: u64,
    /// Every device call, by name
    pub calls: Vec<String>,
    /// Commands recorded into command buffers, by name
    pub commands: Vec<String>,
    /// Live objects: raw handle -> kind
    pub live: BTreeMap<u64, &'static str>,
    pub buffers: HashMap<u64, Vec<u8>>,
    pub descriptors: HashMap<(u64, u32, u32), DescriptorInfo>,
    pub update_batches: usize,
    pub submits: Vec<RecordedSubmit>,
    pub draws: Vec<u32>,
    pub barriers: Vec<ImageBarrier>,
    pub pipeline_descs: Vec<(FixedFunctionState, usize, RenderTargetLayout)>,
    pub pipeline_layout_sets: Vec<Vec<DescriptorSetLayoutHandle>>,
    pub pool_sizes: Vec<DescriptorPoolSize>,
    pub failures: HashSet<&'static str>,
}

pub struct MockDevice {
    state: Mutex<MockDeviceState>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockDeviceState {
                next_handle: 1,
                ..Default::default()
            }),
        })
    }

    pub fn context(self: &Arc<Self>) -> GpuContext {
        GpuContext::new(self.clone(), QueueHandle::from_raw(0xE0E0))
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockDeviceState> {
        self.state.lock().unwrap()
    }

    /// Make every subsequent call named `call` fail with a backend error
    pub fn fail(&self, call: &'static str) {
        self.state().failures.insert(call);
    }

    pub fn heal(&self, call: &'static str) {
        self.state().failures.remove(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn live_of(&self, kind: &str) -> usize {
        self.state().live.values().filter(|k| **k == kind).count()
    }

    pub fn descriptor(&self, set: DescriptorSetHandle, binding: u32, array_index: u32) -> Option<DescriptorInfo> {
        self.state().descriptors.get(&(set.as_raw(), binding, array_index)).copied()
    }

    pub fn buffer_data(&self, buffer: BufferHandle) -> Vec<u8> {
        self.state().buffers.get(&buffer.as_raw()).cloned().unwrap_or_default()
    }

    pub fn submits(&self) -> Vec<RecordedSubmit> {
        self.state().submits.clone()
    }

    fn call(&self, name: &'static str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(name.to_string());
        if state.failures.contains(name) {
            return Err(Error::BackendError(format!("{} failed (mock)", name)));
        }
        Ok(())
    }

    fn create(&self, name: &'static str, kind: &'static str) -> Result<u64> {
        self.call(name)?;
        let mut state = self.state();
        let raw = state.next_handle;
        state.next_handle += 1;
        state.live.insert(raw, kind);
        Ok(raw)
    }

    fn destroy(&self, name: &'static str, raw: u64) {
        let mut state = self.state();
        state.calls.push(name.to_string());
        if raw != 0 {
            state.live.remove(&raw);
            state.buffers.remove(&raw);
        }
    }

    fn record(&self, command: &str) {
        self.state().commands.push(command.to_string());
    }
}

impl ResourceFactory for MockDevice {
    fn create_buffer(&self, desc: &BufferDesc, data: Option<&[u8]>) -> Result<BufferHandle> {
        let raw = self.create("create_buffer", "buffer")?;
        let mut contents = vec![0u8; desc.size as usize];
        if let Some(data) = data {
            contents[..data.len()].copy_from_slice(data);
        }
        self.state().buffers.insert(raw, contents);
        Ok(BufferHandle::from_raw(raw))
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.call("write_buffer")?;
        let mut state = self.state();
        let contents = state
            .buffers
            .get_mut(&buffer.as_raw())
            .ok_or_else(|| Error::NotFound(format!("buffer {:?}", buffer)))?;
        let start = offset as usize;
        if start + data.len() > contents.len() {
            return Err(Error::OutOfRange("write past end of buffer".to_string()));
        }
        contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.destroy("destroy_buffer", buffer.as_raw());
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        Ok(SamplerHandle::from_raw(self.create("create_sampler", "sampler")?))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.destroy("destroy_sampler", sampler.as_raw());
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        Ok(SemaphoreHandle::from_raw(self.create("create_semaphore", "semaphore")?))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.destroy("destroy_semaphore", semaphore.as_raw());
    }

    fn create_fence(&self, _signaled: bool) -> Result<FenceHandle> {
        Ok(FenceHandle::from_raw(self.create("create_fence", "fence")?))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.destroy("destroy_fence", fence.as_raw());
    }

    fn create_shader_module(&self, code: &[u8]) -> Result<ShaderModuleHandle> {
        if code.len() % 4 != 0 {
            return Err(Error::InvalidArgument("unaligned SPIR-V".to_string()));
        }
        Ok(ShaderModuleHandle::from_raw(self.create("create_shader_module", "shader_module")?))
    }

    fn destroy_shader_module(&self, module: ShaderModuleHandle) {
        self.destroy("destroy_shader_module", module.as_raw());
    }
}

impl GraphicsDevice for MockDevice {
    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> Result<DescriptorSetLayoutHandle> {
        Ok(DescriptorSetLayoutHandle::from_raw(
            self.create("create_descriptor_set_layout", "descriptor_set_layout")?,
        ))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.destroy("destroy_descriptor_set_layout", layout.as_raw());
    }

    fn create_descriptor_pool(&self, sizes: &[DescriptorPoolSize], _max_sets: u32) -> Result<DescriptorPoolHandle> {
        let raw = self.create("create_descriptor_pool", "descriptor_pool")?;
        self.state().pool_sizes = sizes.to_vec();
        Ok(DescriptorPoolHandle::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        self.destroy("destroy_descriptor_pool", pool.as_raw());
    }

    fn allocate_descriptor_sets(
        &self,
        _pool: DescriptorPoolHandle,
        layouts: &[DescriptorSetLayoutHandle],
    ) -> Result<Vec<DescriptorSetHandle>> {
        self.call("allocate_descriptor_sets")?;
        let mut state = self.state();
        let mut sets = Vec::with_capacity(layouts.len());
        for _ in layouts {
            let raw = state.next_handle;
            state.next_handle += 1;
            state.live.insert(raw, "descriptor_set");
            sets.push(DescriptorSetHandle::from_raw(raw));
        }
        Ok(sets)
    }

    fn free_descriptor_sets(&self, _pool: DescriptorPoolHandle, sets: &[DescriptorSetHandle]) {
        for set in sets {
            self.destroy("free_descriptor_set", set.as_raw());
        }
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite<'_>]) {
        let mut state = self.state();
        state.calls.push("update_descriptor_sets".to_string());
        state.update_batches += 1;
        for write in writes {
            let set = write.set.as_raw();
            match write.infos {
                DescriptorWriteInfos::Buffers(infos) => {
                    for (i, info) in infos.iter().enumerate() {
                        state.descriptors.insert(
                            (set, write.binding, write.array_index + i as u32),
                            DescriptorInfo::Buffer(*info),
                        );
                    }
                }
                DescriptorWriteInfos::Images(infos) => {
                    for (i, info) in infos.iter().enumerate() {
                        state.descriptors.insert(
                            (set, write.binding, write.array_index + i as u32),
                            DescriptorInfo::Image(*info),
                        );
                    }
                }
            }
        }
    }

    fn create_pipeline_layout(&self, set_layouts: &[DescriptorSetLayoutHandle]) -> Result<PipelineLayoutHandle> {
        let raw = self.create("create_pipeline_layout", "pipeline_layout")?;
        self.state().pipeline_layout_sets.push(set_layouts.to_vec());
        Ok(PipelineLayoutHandle::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.destroy("destroy_pipeline_layout", layout.as_raw());
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineHandle> {
        let raw = self.create("create_graphics_pipeline", "pipeline")?;
        self.state()
            .pipeline_descs
            .push((desc.state.clone(), desc.stages.len(), *desc.target));
        Ok(PipelineHandle::from_raw(raw))
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.destroy("destroy_pipeline", pipeline.as_raw());
    }

    fn create_command_pool(&self) -> Result<CommandPoolHandle> {
        Ok(CommandPoolHandle::from_raw(self.create("create_command_pool", "command_pool")?))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        // Command buffers are freed with their pool
        let mut state = self.state();
        state.calls.push("destroy_command_pool".to_string());
        state.live.retain(|raw, kind| *raw != pool.as_raw() && *kind != "command_buffer");
    }

    fn allocate_command_buffer(&self, _pool: CommandPoolHandle) -> Result<CommandBufferHandle> {
        Ok(CommandBufferHandle::from_raw(self.create("allocate_command_buffer", "command_buffer")?))
    }

    fn begin_command_buffer(&self, _cmd: CommandBufferHandle) -> Result<()> {
        self.call("begin_command_buffer")?;
        self.record("begin");
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: CommandBufferHandle) -> Result<()> {
        self.call("end_command_buffer")?;
        self.record("end");
        Ok(())
    }

    fn cmd_image_barrier(&self, _cmd: CommandBufferHandle, barrier: &ImageBarrier) {
        self.record("image_barrier");
        self.state().barriers.push(*barrier);
    }

    fn cmd_set_viewport(&self, _cmd: CommandBufferHandle, _viewport: &Viewport) {
        self.record("set_viewport");
    }

    fn cmd_set_scissor(&self, _cmd: CommandBufferHandle, _scissor: &Rect2D) {
        self.record("set_scissor");
    }

    fn cmd_begin_render_pass(
        &self,
        _cmd: CommandBufferHandle,
        _render_pass: RenderPassHandle,
        _framebuffer: FramebufferHandle,
        _extent: Extent2D,
        _clear_color: [f32; 4],
    ) {
        self.record("begin_render_pass");
    }

    fn cmd_end_render_pass(&self, _cmd: CommandBufferHandle) {
        self.record("end_render_pass");
    }

    fn cmd_bind_pipeline(&self, _cmd: CommandBufferHandle, _pipeline: PipelineHandle) {
        self.record("bind_pipeline");
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: CommandBufferHandle,
        _layout: PipelineLayoutHandle,
        _first_set: u32,
        _sets: &[DescriptorSetHandle],
    ) {
        self.record("bind_descriptor_sets");
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: CommandBufferHandle, _buffer: BufferHandle, _offset: u64) {
        self.record("bind_vertex_buffer");
    }

    fn cmd_draw(&self, _cmd: CommandBufferHandle, vertex_count: u32, _first_vertex: u32) {
        self.record("draw");
        self.state().draws.push(vertex_count);
    }

    fn queue_submit(&self, _queue: QueueHandle, submit: &SubmitInfo<'_>, _fence: FenceHandle) -> Result<()> {
        self.call("queue_submit")?;
        self.state().submits.push(RecordedSubmit {
            command_buffer: submit.command_buffer,
            waits: submit.waits.to_vec(),
            signals: submit.signals.to_vec(),
        });
        Ok(())
    }

    fn wait_for_fence(&self, _fence: FenceHandle, _timeout: Option<Duration>) -> Result<()> {
        self.call("wait_for_fence")
    }

    fn reset_fence(&self, _fence: FenceHandle) -> Result<()> {
        self.call("reset_fence")
    }

    fn wait_idle(&self) -> Result<()> {
        self.call("wait_idle")
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBufferState {
    Available,
    Acquired,
}

pub struct MockSwapchainState {
    pub initialized: bool,
    pub image_count: u32,
    pub size: Extent2D,
    pub fullscreen: bool,
    pub format: SurfaceFormat,
    pub targets: Vec<RenderTarget>,
    pub states: Vec<MockBufferState>,
    pub acquire_calls: usize,
    pub presented: Vec<u32>,
    pub dropped: Vec<u32>,
    pub resizes: Vec<(u32, u32, bool)>,
    pub fail_acquire: bool,
    next_handle: u64,
}

#[derive(Clone)]
pub struct MockSwapchain {
    state: Arc<Mutex<MockSwapchainState>>,
}

impl MockSwapchain {
    pub fn new(image_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSwapchainState {
                initialized: false,
                image_count,
                size: Extent2D::default(),
                fullscreen: false,
                format: SurfaceFormat::Bgra8,
                targets: Vec::new(),
                states: Vec::new(),
                acquire_calls: 0,
                presented: Vec::new(),
                dropped: Vec::new(),
                resizes: Vec::new(),
                fail_acquire: false,
                next_handle: 0x1000_0000,
            })),
        }
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, MockSwapchainState> {
        self.state.lock().unwrap()
    }

    fn rebuild_targets(state: &mut MockSwapchainState) {
        state.targets.clear();
        state.states.clear();
        for _ in 0..state.image_count {
            let base = state.next_handle;
            state.next_handle += 4;
            state.targets.push(RenderTarget {
                image: ImageHandle::from_raw(base),
                view: ImageViewHandle::from_raw(base + 1),
                framebuffer: FramebufferHandle::from_raw(base + 2),
                sync: Arc::new(SyncPoint::new(SemaphoreHandle::from_raw(base + 3), ImageLayout::Undefined)),
                size: state.size,
            });
            state.states.push(MockBufferState::Available);
        }
    }
}

impl Swapchain for MockSwapchain {
    fn init(&mut self, width: u32, height: u32, format: SurfaceFormat) -> Result<()> {
        let mut state = self.state();
        state.size = Extent2D::new(width, height);
        state.format = format;
        state.initialized = true;
        Self::rebuild_targets(&mut state);
        Ok(())
    }

    fn terminate(&mut self) {
        let mut state = self.state();
        state.initialized = false;
        state.targets.clear();
        state.states.clear();
    }

    fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    fn acquire_next_back_buffer(&mut self) -> Result<u32> {
        let mut state = self.state();
        state.acquire_calls += 1;
        if state.fail_acquire {
            return Err(Error::BackendError("acquire failed (mock)".to_string()));
        }
        let index = state
            .states
            .iter()
            .position(|s| *s == MockBufferState::Available)
            .ok_or_else(|| Error::InputFull("no back buffer available (mock)".to_string()))?;
        state.states[index] = MockBufferState::Acquired;
        // Acquisition leaves a pending signal the first draw must wait on
        state.targets[index].sync.mark_submitted();
        Ok(index as u32)
    }

    fn back_buffer(&self, index: u32) -> Result<RenderTarget> {
        self.state()
            .targets
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("back buffer {}", index)))
    }

    fn is_acquired(&self, index: u32) -> bool {
        self.state().states.get(index as usize) == Some(&MockBufferState::Acquired)
    }

    fn present(&mut self, index: u32, _wait_for_vsync: bool) -> Result<()> {
        let mut state = self.state();
        if state.states.get(index as usize) != Some(&MockBufferState::Acquired) {
            return Err(Error::NotFound(format!("back buffer {} not acquired", index)));
        }
        state.targets[index as usize].sync.take_submitted();
        state.states[index as usize] = MockBufferState::Available;
        state.presented.push(index);
        Ok(())
    }

    fn drop_back_buffer(&mut self, index: u32) -> Result<()> {
        let mut state = self.state();
        if state.states.get(index as usize) != Some(&MockBufferState::Acquired) {
            return Err(Error::NotFound(format!("back buffer {} not acquired", index)));
        }
        state.states[index as usize] = MockBufferState::Available;
        state.dropped.push(index);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<()> {
        let mut state = self.state();
        state.resizes.push((width, height, fullscreen));
        state.size = Extent2D::new(width, height);
        state.fullscreen = fullscreen;
        Self::rebuild_targets(&mut state);
        Ok(())
    }

    fn size(&self) -> Extent2D {
        self.state().size
    }

    fn fullscreen_enabled(&self) -> bool {
        self.state().fullscreen
    }

    fn back_buffers_available(&self) -> u32 {
        self.state().states.iter().filter(|s| **s == MockBufferState::Available).count() as u32
    }

    fn back_buffers_acquired(&self) -> u32 {
        self.state().states.iter().filter(|s| **s == MockBufferState::Acquired).count() as u32
    }

    fn render_target_layout(&self) -> RenderTargetLayout {
        RenderTargetLayout {
            render_pass: RenderPassHandle::from_raw(0xAB),
            subpass: 0,
            format: self.state().format,
        }
    }
}

// ============================================================================
// Mock Window
// ============================================================================

pub struct MockWindow {
    state: Mutex<(Extent2D, bool)>,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new((Extent2D::new(width, height), false)),
        })
    }

    pub fn set_client_size(&self, width: u32, height: u32) {
        self.state.lock().unwrap().0 = Extent2D::new(width, height);
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.state.lock().unwrap().1 = fullscreen;
    }
}

impl PresentationWindow for MockWindow {
    fn client_size(&self) -> Extent2D {
        self.state.lock().unwrap().0
    }

    fn is_fullscreen(&self) -> bool {
        self.state.lock().unwrap().1
    }
}

// ============================================================================
// Mock Frame
// ============================================================================

pub struct MockFrame {
    id: FrameId,
    format: SurfaceFormat,
    size: Extent2D,
    pts: Duration,
    memory: Mutex<MemoryType>,
    texture: NativeTexture,
    observers: Mutex<Vec<Arc<dyn FrameObserver>>>,
    pub convert_calls: Mutex<usize>,
    pub fail_convert: bool,
}

impl MockFrame {
    pub fn new(format: SurfaceFormat, width: u32, height: u32, pts: Duration) -> Self {
        let id = FrameId::next();
        let raw = 0x2000_0000 + id.as_raw() * 4;
        Self {
            id,
            format,
            size: Extent2D::new(width, height),
            pts,
            memory: Mutex::new(MemoryType::Host),
            texture: NativeTexture {
                image: ImageHandle::from_raw(raw),
                view: ImageViewHandle::from_raw(raw + 1),
                sync: Arc::new(SyncPoint::new(SemaphoreHandle::from_raw(raw + 2), ImageLayout::General)),
                size: Extent2D::new(width, height),
            },
            observers: Mutex::new(Vec::new()),
            convert_calls: Mutex::new(0),
            fail_convert: false,
        }
    }

    pub fn texture(&self) -> &NativeTexture {
        &self.texture
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }
}

impl Frame for MockFrame {
    fn id(&self) -> FrameId {
        self.id
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn size(&self) -> Extent2D {
        self.size
    }

    fn pts(&self) -> Duration {
        self.pts
    }

    fn memory_type(&self) -> MemoryType {
        *self.memory.lock().unwrap()
    }

    fn convert(&self, memory: MemoryType) -> Result<()> {
        *self.convert_calls.lock().unwrap() += 1;
        if self.fail_convert {
            return Err(Error::BackendError("convert failed (mock)".to_string()));
        }
        *self.memory.lock().unwrap() = memory;
        Ok(())
    }

    fn native_texture(&self) -> Option<NativeTexture> {
        (*self.memory.lock().unwrap() == MemoryType::Gpu).then(|| self.texture.clone())
    }

    fn add_observer(&self, observer: Arc<dyn FrameObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn FrameObserver>) {
        self.observers.lock().unwrap().retain(|o| !Arc::ptr_eq(o, observer));
    }
}

impl Drop for MockFrame {
    fn drop(&mut self) {
        let observers = std::mem::take(&mut *self.observers.lock().unwrap());
        for observer in observers {
            observer.on_frame_released(self.id);
        }
    }
}

// ============================================================================
// Mock Shader Loader
// ============================================================================

pub struct MockShaderLoader {
    pub shaders: HashMap<String, Vec<u8>>,
}

impl MockShaderLoader {
    /// Loader knowing the presenter's default quad shaders
    pub fn quad() -> Self {
        let mut shaders = HashMap::new();
        shaders.insert("quad.vert.spv".to_string(), vec![0x03, 0x02, 0x23, 0x07, 0, 0, 1, 0]);
        shaders.insert("quad.frag.spv".to_string(), vec![0x03, 0x02, 0x23, 0x07, 0, 0, 1, 0]);
        Self { shaders }
    }
}

impl ShaderLoader for MockShaderLoader {
    fn load(&self, name: &str) -> Result<Vec<u8>> {
        self.shaders
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("shader {}", name)))
    }
}
