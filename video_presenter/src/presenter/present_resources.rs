/// GPU objects owned by the presenter and the composite render pass

use bytemuck::Zeroable;

use crate::command::CommandRecorder;
use crate::descriptor::{DescriptorRegistry, SetIndex};
use crate::device::{
    BufferDesc, BufferHandle, BufferInfo, BufferUsage, DescriptorBinding, DescriptorInfo,
    DescriptorType, Frame, GpuContext, ImageInfo, ImageLayout, PipelineStage, RenderTarget,
    RenderTargetLayout, SamplerDesc, SamplerHandle, ShaderLoader, ShaderModuleHandle, ShaderStage,
    ShaderStageDesc, ShaderStageFlags,
};
use crate::error::Result;
use crate::pipeline::{PipelineObject, PRESENT_GROUP};
use crate::{vp_bail, vp_debug};

use super::config::PresenterConfig;
use super::renderer::Renderer;
use super::view_transform::{quad_vertex_layout, ViewCache, ViewProjection, QUAD_VERTICES};

const SOURCE: &str = "vpresent::FramePresenter";

/// Binding of the view-projection uniform block
pub const VIEW_PROJECTION_BINDING: u32 = 0;
/// Binding of the source texture and its sampler
pub const TEXTURE_BINDING: u32 = 1;

/// Everything the composite pass draws with.
///
/// Created step by step by [`create`](Self::create); whatever exists is
/// released by [`destroy`](Self::destroy) or on drop, so a failed step leaks
/// nothing.
pub(crate) struct PresentResources {
    ctx: GpuContext,
    registry: DescriptorRegistry,
    pipeline: PipelineObject,
    recorder: Option<CommandRecorder>,
    vertex_buffer: BufferHandle,
    uniform_buffer: BufferHandle,
    sampler: SamplerHandle,
    present_set: SetIndex,
    view: ViewCache,
}

impl PresentResources {
    /// Descriptor sets, pipeline, command recorder, vertex buffer, uniform
    /// buffer and sampler, in that order.
    pub(crate) fn create(
        ctx: &GpuContext,
        shaders: &dyn ShaderLoader,
        config: &PresenterConfig,
        target: &RenderTargetLayout,
    ) -> Result<Self> {
        let mut resources = Self {
            ctx: ctx.clone(),
            registry: DescriptorRegistry::new(ctx.clone()),
            pipeline: PipelineObject::new(ctx.clone()),
            recorder: None,
            vertex_buffer: BufferHandle::NULL,
            uniform_buffer: BufferHandle::NULL,
            sampler: SamplerHandle::NULL,
            present_set: 0,
            view: ViewCache::default(),
        };

        resources.register_descriptor_sets().map_err(|e| e.in_step("register descriptor sets"))?;
        resources.build_pipeline(shaders, config, target).map_err(|e| e.in_step("build pipeline"))?;
        resources.recorder = Some(
            CommandRecorder::new(ctx.clone(), config.clear_color)
                .map_err(|e| e.in_step("create command recorder"))?,
        );
        resources.create_vertex_buffer().map_err(|e| e.in_step("create vertex buffer"))?;

        let view_projection = ViewProjection::zeroed();
        let size = std::mem::size_of::<ViewProjection>() as u64;
        resources.uniform_buffer = resources
            .create_buffer_for_descriptor(VIEW_PROJECTION_BINDING, view_projection.as_bytes(), size, 0, size)
            .map_err(|e| e.in_step("create uniform buffer"))?;

        resources.create_sampler().map_err(|e| e.in_step("create sampler"))?;

        vp_debug!(SOURCE, "Presenter GPU resources created");
        Ok(resources)
    }

    fn register_descriptor_sets(&mut self) -> Result<()> {
        let bindings = [
            DescriptorBinding {
                binding: VIEW_PROJECTION_BINDING,
                kind: DescriptorType::UniformBuffer,
                count: 1,
                stages: ShaderStageFlags::VERTEX,
            },
            DescriptorBinding {
                binding: TEXTURE_BINDING,
                kind: DescriptorType::CombinedImageSampler,
                count: 1,
                stages: ShaderStageFlags::FRAGMENT,
            },
        ];
        self.present_set = self.registry.register(&bindings)?;
        self.registry.finalize()?;
        self.pipeline.register_descriptor_set(self.present_set, 0, &[PRESENT_GROUP])
    }

    fn build_pipeline(
        &mut self,
        shaders: &dyn ShaderLoader,
        config: &PresenterConfig,
        target: &RenderTargetLayout,
    ) -> Result<()> {
        let device = self.ctx.device();
        let sources = [
            (ShaderStage::Vertex, config.vertex_shader.as_str()),
            (ShaderStage::Fragment, config.fragment_shader.as_str()),
        ];

        let mut modules: Vec<ShaderModuleHandle> = Vec::with_capacity(sources.len());
        let mut stages = Vec::with_capacity(sources.len());
        let mut result = Ok(());
        for (stage, name) in sources {
            let module = shaders.load(name).and_then(|code| device.create_shader_module(&code));
            match module {
                Ok(module) => {
                    modules.push(module);
                    stages.push(ShaderStageDesc {
                        stage,
                        module,
                        entry_point: config.shader_entry_point.clone(),
                    });
                }
                Err(e) => {
                    result = Err(e.in_step(name));
                    break;
                }
            }
        }

        if result.is_ok() {
            result = self.pipeline.build(&self.registry, &stages, &quad_vertex_layout(), target);
        }

        // Modules are only needed while the pipeline is created
        for module in modules {
            device.destroy_shader_module(module);
        }
        result
    }

    fn create_vertex_buffer(&mut self) -> Result<()> {
        let data: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        self.vertex_buffer = self.ctx.device().create_buffer(
            &BufferDesc {
                size: data.len() as u64,
                usage: BufferUsage::Vertex,
            },
            Some(data),
        )?;
        Ok(())
    }

    /// Create a uniform buffer holding `data` and bind `offset..offset + range` of it.
    ///
    /// The buffer is destroyed again if the descriptor update fails.
    fn create_buffer_for_descriptor(
        &mut self,
        binding: u32,
        data: &[u8],
        buffer_size: u64,
        offset: u64,
        range: u64,
    ) -> Result<BufferHandle> {
        let kind = self
            .registry
            .bindings(self.present_set)
            .and_then(|bindings| bindings.iter().find(|b| b.binding == binding))
            .map(|b| b.kind);
        if kind != Some(DescriptorType::UniformBuffer) {
            vp_bail!(SOURCE, InvalidArgument, "Binding {} is not a uniform buffer", binding);
        }
        if range == 0 {
            vp_bail!(SOURCE, OutOfRange, "Binding {} has a size of 0", binding);
        }
        if offset + range > buffer_size || data.len() as u64 > buffer_size {
            vp_bail!(SOURCE, OutOfRange,
                "Binding {} range {}..{} exceeds buffer size {}", binding, offset, offset + range, buffer_size);
        }

        let device = self.ctx.device();
        let buffer = device.create_buffer(
            &BufferDesc {
                size: buffer_size,
                usage: BufferUsage::Uniform,
            },
            Some(data),
        )?;

        let info = DescriptorInfo::Buffer(BufferInfo { buffer, offset, range });
        if let Err(e) = self.registry.queue_update(self.present_set, binding, 0, &[info], true) {
            device.destroy_buffer(buffer);
            return Err(e);
        }
        Ok(buffer)
    }

    fn create_sampler(&mut self) -> Result<()> {
        if !self.sampler.is_null() {
            vp_bail!(SOURCE, AlreadyInitialized, "Sampler already created");
        }
        self.sampler = self.ctx.device().create_sampler(&SamplerDesc::default())?;
        Ok(())
    }

    /// Record and submit the composite pass of `frame` into `target`.
    ///
    /// On failure nothing is submitted and the recorder is ready for the next frame.
    pub(crate) fn render(
        &mut self,
        frame: &dyn Frame,
        target: &RenderTarget,
        target_layout: &RenderTargetLayout,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        let result = self.record_and_submit(frame, target, target_layout, renderer);
        if result.is_err() {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.abort();
            }
        }
        result
    }

    fn record_and_submit(
        &mut self,
        frame: &dyn Frame,
        target: &RenderTarget,
        target_layout: &RenderTargetLayout,
        renderer: &mut dyn Renderer,
    ) -> Result<()> {
        let texture = match frame.native_texture() {
            Some(texture) => texture,
            None => vp_bail!(SOURCE, NotFound, "Frame {} has no GPU texture", frame.id()),
        };
        let recorder = match self.recorder.as_mut() {
            Some(recorder) => recorder,
            None => vp_bail!(SOURCE, NotInitialized, "Command recorder missing"),
        };

        // Descriptors and the uniform buffer may still be read by the previous frame
        recorder.wait_for_completion()?;

        if let Some(view_projection) = self.view.update(texture.size, target.size) {
            self.ctx
                .device()
                .write_buffer(self.uniform_buffer, 0, view_projection.as_bytes())
                .map_err(|e| e.in_step("update view transform"))?;
            self.view.commit(texture.size, target.size);
        }

        let info = DescriptorInfo::Image(ImageInfo {
            sampler: self.sampler,
            view: texture.view,
            layout: ImageLayout::ShaderReadOnly,
        });
        self.registry.queue_update(self.present_set, TEXTURE_BINDING, 0, &[info], false)?;
        self.registry.flush_pending_updates();

        recorder.transition_before_pass(texture.image, &texture.sync, ImageLayout::ShaderReadOnly)?;
        recorder.begin_frame(target, target_layout.render_pass)?;
        recorder.sync_resource(&target.sync, PipelineStage::ColorAttachmentOutput)?;

        renderer.draw_background(recorder).map_err(|e| e.in_step("draw background"))?;

        self.pipeline.bind(recorder, PRESENT_GROUP)?;
        recorder.bind_vertex_buffer(self.vertex_buffer, 0)?;
        recorder.sync_resource(&texture.sync, PipelineStage::FragmentShader)?;
        recorder.draw(QUAD_VERTICES.len() as u32)?;

        renderer.draw_overlay(recorder, frame).map_err(|e| e.in_step("draw overlay"))?;

        recorder.end_frame(self.ctx.queue())
    }

    /// Block until the last composite pass finished on the GPU
    pub(crate) fn wait_for_completion(&mut self) -> Result<()> {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.wait_for_completion(),
            None => Ok(()),
        }
    }

    /// Force the next frame to rewrite the view transform
    pub(crate) fn invalidate_view(&mut self) {
        self.view.invalidate();
    }

    #[cfg(test)]
    pub(crate) fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    #[cfg(test)]
    pub(crate) fn uniform_buffer(&self) -> BufferHandle {
        self.uniform_buffer
    }

    #[cfg(test)]
    pub(crate) fn sampler(&self) -> SamplerHandle {
        self.sampler
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn present_set(&self) -> SetIndex {
        self.present_set
    }

    /// Release descriptor sets, pipeline, sampler, buffers and the recorder.
    pub(crate) fn destroy(&mut self) {
        self.pipeline.terminate();
        self.registry.terminate();

        let device = self.ctx.device();
        if !self.sampler.is_null() {
            device.destroy_sampler(self.sampler);
            self.sampler = SamplerHandle::NULL;
        }
        if !self.uniform_buffer.is_null() {
            device.destroy_buffer(self.uniform_buffer);
            self.uniform_buffer = BufferHandle::NULL;
        }
        if !self.vertex_buffer.is_null() {
            device.destroy_buffer(self.vertex_buffer);
            self.vertex_buffer = BufferHandle::NULL;
        }
        if let Some(mut recorder) = self.recorder.take() {
            recorder.terminate();
        }
    }
}

impl Drop for PresentResources {
    fn drop(&mut self) {
        self.destroy();
    }
}

