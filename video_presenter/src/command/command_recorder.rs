/// CommandRecorder - one reusable command buffer with per-resource semaphore sync
///
/// A frame is recorded between [`begin_frame`](CommandRecorder::begin_frame)
/// and [`end_frame`](CommandRecorder::end_frame). Resources touched by the
/// frame are declared with [`sync_resource`](CommandRecorder::sync_resource):
/// a resource with a pending GPU signal is waited on, and every declared
/// resource is signalled again by the submission.
///
/// The single command buffer is guarded by a fence. `begin_frame` waits for
/// the previous submission before re-recording.

use std::sync::Arc;

use crate::device::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, DescriptorSetHandle, Extent2D,
    FenceHandle, GpuContext, ImageBarrier, ImageHandle, ImageLayout, PipelineHandle,
    PipelineLayoutHandle, PipelineStage, QueueHandle, Rect2D, RenderPassHandle, RenderTarget,
    SemaphoreHandle, SemaphoreWait, SubmitInfo, SyncPoint, Viewport,
};
use crate::error::Result;
use crate::{vp_bail, vp_trace};

const SOURCE: &str = "vpresent::CommandRecorder";

/// Image transition recorded before the render pass begins
struct PendingTransition {
    image: ImageHandle,
    sync: Arc<SyncPoint>,
    layout: ImageLayout,
}

pub struct CommandRecorder {
    ctx: GpuContext,
    pool: CommandPoolHandle,
    cmd: CommandBufferHandle,
    fence: FenceHandle,
    clear_color: [f32; 4],

    recording: bool,
    in_flight: bool,
    extent: Extent2D,

    transitions: Vec<PendingTransition>,
    waits: Vec<SemaphoreWait>,
    /// Resources whose pending signal was consumed by `waits`
    waited: Vec<Arc<SyncPoint>>,
    signals: Vec<Arc<SyncPoint>>,
}

impl CommandRecorder {
    /// Create the command pool, the command buffer and its fence
    pub fn new(ctx: GpuContext, clear_color: [f32; 4]) -> Result<Self> {
        let device = ctx.device();

        let pool = device.create_command_pool()?;
        let cmd = match device.allocate_command_buffer(pool) {
            Ok(cmd) => cmd,
            Err(e) => {
                device.destroy_command_pool(pool);
                return Err(e);
            }
        };
        let fence = match device.create_fence(false) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_command_pool(pool);
                return Err(e);
            }
        };

        Ok(Self {
            ctx,
            pool,
            cmd,
            fence,
            clear_color,
            recording: false,
            in_flight: false,
            extent: Extent2D::default(),
            transitions: Vec::new(),
            waits: Vec::new(),
            waited: Vec::new(),
            signals: Vec::new(),
        })
    }

    pub fn command_buffer(&self) -> CommandBufferHandle {
        self.cmd
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Whether a submission may still be executing on the GPU
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Extent of the target being recorded, zero outside a frame
    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    /// Request a layout transition of `image` before the next render pass.
    ///
    /// Must be called before [`begin_frame`](Self::begin_frame); images that
    /// already are in `layout` produce no barrier.
    pub fn transition_before_pass(
        &mut self,
        image: ImageHandle,
        sync: &Arc<SyncPoint>,
        layout: ImageLayout,
    ) -> Result<()> {
        if self.recording {
            vp_bail!(SOURCE, AlreadyInitialized, "Layout transitions must be requested before begin_frame");
        }
        if image.is_null() {
            vp_bail!(SOURCE, InvalidArgument, "Layout transition of a null image");
        }
        self.transitions.push(PendingTransition {
            image,
            sync: Arc::clone(sync),
            layout,
        });
        Ok(())
    }

    /// Start recording into `target`.
    ///
    /// Waits for the previous submission, records pending layout transitions,
    /// sets the viewport and scissor to the target size and begins the render
    /// pass with the clear color.
    pub fn begin_frame(&mut self, target: &RenderTarget, render_pass: RenderPassHandle) -> Result<()> {
        if self.recording {
            vp_bail!(SOURCE, AlreadyInitialized, "begin_frame called while a frame is being recorded");
        }
        if target.framebuffer.is_null() {
            vp_bail!(SOURCE, InvalidArgument, "Render target has no framebuffer");
        }
        if render_pass.is_null() {
            vp_bail!(SOURCE, InvalidArgument, "Null render pass");
        }

        self.wait_for_completion()?;
        if let Err(e) = self.begin_recording(target, render_pass) {
            self.reset_frame_state();
            return Err(e);
        }
        Ok(())
    }

    fn begin_recording(&mut self, target: &RenderTarget, render_pass: RenderPassHandle) -> Result<()> {
        let device = self.ctx.device();
        device.begin_command_buffer(self.cmd)?;
        self.recording = true;

        for transition in self.transitions.drain(..) {
            let current = transition.sync.layout();
            if current == transition.layout {
                continue;
            }
            device.cmd_image_barrier(self.cmd, &ImageBarrier {
                image: transition.image,
                old_layout: current,
                new_layout: transition.layout,
            });
            transition.sync.set_layout(transition.layout);
        }

        let extent = target.size;
        device.cmd_set_viewport(self.cmd, &Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        device.cmd_set_scissor(self.cmd, &Rect2D {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        });
        device.cmd_begin_render_pass(self.cmd, render_pass, target.framebuffer, extent, self.clear_color);

        // The render pass leaves the target ready for presentation
        target.sync.set_layout(ImageLayout::PresentSrc);
        self.extent = extent;
        Ok(())
    }

    /// Declare that this frame uses the resource guarded by `sync`.
    ///
    /// If the resource has a pending signal the submission waits on it at
    /// `stage`. The submission always signals it again.
    pub fn sync_resource(&mut self, sync: &Arc<SyncPoint>, stage: PipelineStage) -> Result<()> {
        if !self.recording {
            vp_bail!(SOURCE, NotInitialized, "sync_resource outside of a frame");
        }
        if self.signals.iter().any(|s| Arc::ptr_eq(s, sync)) {
            return Ok(());
        }

        if sync.take_submitted() {
            self.waits.push(SemaphoreWait {
                semaphore: sync.semaphore(),
                stage,
            });
            self.waited.push(Arc::clone(sync));
        }
        self.signals.push(Arc::clone(sync));
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) -> Result<()> {
        self.ensure_recording("bind_pipeline")?;
        self.ctx.device().cmd_bind_pipeline(self.cmd, pipeline);
        Ok(())
    }

    pub fn bind_descriptor_sets(
        &mut self,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) -> Result<()> {
        self.ensure_recording("bind_descriptor_sets")?;
        if sets.is_empty() {
            return Ok(());
        }
        self.ctx.device().cmd_bind_descriptor_sets(self.cmd, layout, first_set, sets);
        Ok(())
    }

    pub fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.ensure_recording("bind_vertex_buffer")?;
        if buffer.is_null() {
            vp_bail!(SOURCE, InvalidArgument, "Null vertex buffer");
        }
        self.ctx.device().cmd_bind_vertex_buffer(self.cmd, buffer, offset);
        Ok(())
    }

    /// Non-indexed draw with the currently bound pipeline and vertex buffer
    pub fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.ensure_recording("draw")?;
        if vertex_count == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Draw with a vertex count of 0");
        }
        self.ctx.device().cmd_draw(self.cmd, vertex_count, 0);
        Ok(())
    }

    /// End the render pass and recording, then submit to `queue`.
    ///
    /// On success every synced resource is flagged as having a pending
    /// signal. On failure the consumed signals are restored. The recorder is
    /// ready for a new frame either way.
    pub fn end_frame(&mut self, queue: QueueHandle) -> Result<()> {
        if !self.recording {
            vp_bail!(SOURCE, NotInitialized, "end_frame without begin_frame");
        }

        let result = self.submit(queue);
        match &result {
            Ok(()) => {
                for sync in &self.signals {
                    sync.mark_submitted();
                }
                self.in_flight = true;
                vp_trace!(SOURCE, "Submitted frame: {} waits, {} signals", self.waits.len(), self.signals.len());
            }
            Err(_) => {
                for sync in &self.waited {
                    sync.mark_submitted();
                }
            }
        }
        self.reset_frame_state();
        result
    }

    fn submit(&mut self, queue: QueueHandle) -> Result<()> {
        let device = self.ctx.device();
        device.cmd_end_render_pass(self.cmd);
        device.end_command_buffer(self.cmd)?;

        let signals: Vec<SemaphoreHandle> = self.signals.iter().map(|s| s.semaphore()).collect();
        device.queue_submit(
            queue,
            &SubmitInfo {
                command_buffer: self.cmd,
                waits: &self.waits,
                signals: &signals,
            },
            self.fence,
        )
    }

    /// Abandon the frame being recorded without submitting it.
    ///
    /// Consumed signals are restored so the next user still waits on them.
    pub fn abort(&mut self) {
        if !self.recording && self.transitions.is_empty() {
            return;
        }
        if self.recording {
            let device = self.ctx.device();
            device.cmd_end_render_pass(self.cmd);
            // The buffer is reset by the next begin; its end result does not matter
            let _ = device.end_command_buffer(self.cmd);
        }
        for sync in &self.waited {
            sync.mark_submitted();
        }
        self.reset_frame_state();
    }

    /// Block until the last submission finished executing
    pub fn wait_for_completion(&mut self) -> Result<()> {
        if !self.in_flight {
            return Ok(());
        }
        let device = self.ctx.device();
        device.wait_for_fence(self.fence, None)?;
        device.reset_fence(self.fence)?;
        self.in_flight = false;
        Ok(())
    }

    /// Destroy the fence and the command pool (which frees the buffer).
    ///
    /// Safe to call repeatedly.
    pub fn terminate(&mut self) {
        if self.pool.is_null() {
            return;
        }
        if self.in_flight {
            let _ = self.ctx.device().wait_for_fence(self.fence, None);
            self.in_flight = false;
        }
        self.reset_frame_state();

        let device = self.ctx.device();
        device.destroy_fence(self.fence);
        device.destroy_command_pool(self.pool);
        self.fence = FenceHandle::NULL;
        self.cmd = CommandBufferHandle::NULL;
        self.pool = CommandPoolHandle::NULL;
    }

    fn ensure_recording(&self, operation: &str) -> Result<()> {
        if !self.recording {
            vp_bail!(SOURCE, NotInitialized, "{} outside of a frame", operation);
        }
        Ok(())
    }

    fn reset_frame_state(&mut self) {
        self.recording = false;
        self.extent = Extent2D::default();
        self.transitions.clear();
        self.waits.clear();
        self.waited.clear();
        self.signals.clear();
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
#[path = "command_recorder_tests.rs"]
mod tests;
