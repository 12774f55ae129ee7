/// FramePresenter - per-frame orchestration of acquire, render, pace and present
///
/// All shared state (swapchain, back-buffer tracking table, resize flag,
/// GPU resources) lives behind one mutex. A condition variable wakes
/// producers blocked in [`alloc_frame`](FramePresenter::alloc_frame) when a
/// back buffer returns to the pool.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use rustc_hash::FxHashMap;

use crate::device::{
    Extent2D, Frame, FrameId, FrameObserver, GpuContext, MemoryType, PresentationWindow,
    ShaderLoader, SurfaceFormat, Swapchain,
};
use crate::error::Result;
use crate::{vp_bail, vp_debug, vp_info, vp_warn};

use super::back_buffer_frame::BackBufferFrame;
use super::config::PresenterConfig;
use super::frame_pacer::FramePacer;
use super::present_resources::PresentResources;
use super::renderer::{NoopRenderer, Renderer};

const SOURCE: &str = "vpresent::FramePresenter";

/// Lifecycle of a [`FramePresenter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterState {
    Uninitialized,
    Ready,
    /// Waiting for every back buffer to return before a resize
    Resizing,
    Terminated,
}

/// Successful outcome of [`FramePresenter::present`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, and the swapchain was resized during this call
    ResolutionUpdated,
}

// ===== SHARED STATE =====

struct PresenterInner {
    lifecycle: PresenterState,
    config: PresenterConfig,
    resources: Option<PresentResources>,
    swapchain: Box<dyn Swapchain>,
    /// Presenter-allocated frames still held by the producer: frame -> back
    /// buffer index, `None` once the frame has been presented
    tracked: FxHashMap<FrameId, Option<u32>>,
    resize_pending: bool,
    pacer: FramePacer,
    renderer: Box<dyn Renderer>,
}

struct PresenterShared {
    inner: Mutex<PresenterInner>,
    released: Condvar,
}

impl PresenterShared {
    fn lock(&self) -> MutexGuard<'_, PresenterInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, PresenterInner>) -> MutexGuard<'a, PresenterInner> {
        match self.released.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// A presenter-allocated frame was dropped by its last holder
    fn release(&self, frame: FrameId) {
        let mut inner = self.lock();
        // A presented frame no longer owns its index; the swapchain may have
        // handed it to another frame
        if let Some(Some(index)) = inner.tracked.remove(&frame) {
            if inner.swapchain.is_acquired(index) {
                if let Err(e) = inner.swapchain.drop_back_buffer(index) {
                    vp_warn!(SOURCE, "Dropping back buffer {} of frame {} failed: {}", index, frame, e);
                }
            }
        }
        drop(inner);
        self.released.notify_all();
    }
}

/// Frame observer returning released back buffers to the presenter
struct ReleaseObserver {
    shared: Weak<PresenterShared>,
}

impl FrameObserver for ReleaseObserver {
    fn on_frame_released(&self, frame: FrameId) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(frame);
        }
    }
}

// ===== FRAME PRESENTER =====

/// Composites decoded frames onto a swapchain.
///
/// `present` is driven by one presentation thread; `resize_if_needed` and
/// the queries may be called concurrently from a UI thread.
pub struct FramePresenter {
    ctx: GpuContext,
    window: Arc<dyn PresentationWindow>,
    shaders: Box<dyn ShaderLoader>,
    shared: Arc<PresenterShared>,
    observer: Arc<dyn FrameObserver>,
}

impl FramePresenter {
    /// Create an uninitialized presenter.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configured input format is not BGRA8 or RGBA8.
    pub fn new(
        ctx: GpuContext,
        swapchain: Box<dyn Swapchain>,
        window: Arc<dyn PresentationWindow>,
        shaders: Box<dyn ShaderLoader>,
        config: PresenterConfig,
    ) -> Result<Self> {
        if !config.input_format.is_presentable_input() {
            vp_bail!(SOURCE, InvalidArgument, "Unsupported input format {}", config.input_format);
        }

        let shared = Arc::new(PresenterShared {
            inner: Mutex::new(PresenterInner {
                lifecycle: PresenterState::Uninitialized,
                config,
                resources: None,
                swapchain,
                tracked: FxHashMap::default(),
                resize_pending: false,
                pacer: FramePacer::new(),
                renderer: Box::new(NoopRenderer),
            }),
            released: Condvar::new(),
        });
        let observer: Arc<dyn FrameObserver> = Arc::new(ReleaseObserver {
            shared: Arc::downgrade(&shared),
        });

        Ok(Self {
            ctx,
            window,
            shaders,
            shared,
            observer,
        })
    }

    // ===== LIFECYCLE =====

    /// Create the swapchain and every GPU resource of the composite pass.
    ///
    /// Allowed from `Uninitialized` and `Terminated`. A failed step releases
    /// what was created and leaves the state unchanged.
    pub fn initialize(&self, width: u32, height: u32) -> Result<()> {
        let mut inner = self.shared.lock();
        match inner.lifecycle {
            PresenterState::Ready | PresenterState::Resizing => {
                vp_bail!(SOURCE, AlreadyInitialized, "Presenter already initialized");
            }
            PresenterState::Uninitialized | PresenterState::Terminated => {}
        }
        if width == 0 || height == 0 {
            vp_bail!(SOURCE, InvalidArgument, "Invalid presenter size {}x{}", width, height);
        }

        let format = inner.config.input_format;
        inner
            .swapchain
            .init(width, height, format)
            .map_err(|e| e.in_step("initialize swapchain"))?;

        let target_layout = inner.swapchain.render_target_layout();
        let resources = match PresentResources::create(&self.ctx, self.shaders.as_ref(), &inner.config, &target_layout) {
            Ok(resources) => resources,
            Err(e) => {
                inner.swapchain.terminate();
                return Err(e);
            }
        };

        inner.resources = Some(resources);
        inner.tracked.clear();
        inner.resize_pending = false;
        inner.pacer.flush();
        inner.lifecycle = PresenterState::Ready;
        vp_info!(SOURCE, "Presenter initialized at {}x{} ({})", width, height, format);
        Ok(())
    }

    /// Wait for the device to go idle and release everything.
    ///
    /// Safe to call repeatedly; also runs on drop. Producers blocked in
    /// `alloc_frame` wake up with `NotInitialized`.
    pub fn terminate(&self) {
        let mut inner = self.shared.lock();
        let has_resources = inner.resources.is_some() || inner.swapchain.is_initialized();
        if !has_resources && inner.lifecycle != PresenterState::Ready {
            return;
        }

        if let Err(e) = self.ctx.device().wait_idle() {
            vp_warn!(SOURCE, "wait_idle failed during terminate: {}", e);
        }
        inner.resources = None;
        inner.swapchain.terminate();
        inner.tracked.clear();
        inner.resize_pending = false;
        inner.pacer.flush();
        inner.lifecycle = PresenterState::Terminated;
        drop(inner);

        self.shared.released.notify_all();
        vp_debug!(SOURCE, "Presenter terminated");
    }

    pub fn state(&self) -> PresenterState {
        self.shared.lock().lifecycle
    }

    pub fn config(&self) -> PresenterConfig {
        self.shared.lock().config.clone()
    }

    /// Change the expected frame format; only before initialization
    pub fn set_input_format(&self, format: SurfaceFormat) -> Result<()> {
        if !format.is_presentable_input() {
            vp_bail!(SOURCE, InvalidArgument, "Unsupported input format {}", format);
        }
        let mut inner = self.shared.lock();
        if matches!(inner.lifecycle, PresenterState::Ready | PresenterState::Resizing) {
            vp_bail!(SOURCE, AlreadyInitialized, "Input format cannot change after initialization");
        }
        inner.config.input_format = format;
        Ok(())
    }

    pub fn input_format(&self) -> SurfaceFormat {
        self.shared.lock().config.input_format
    }

    /// Replace the background/overlay hooks
    pub fn set_renderer(&self, renderer: Box<dyn Renderer>) {
        self.shared.lock().renderer = renderer;
    }

    // ===== PRESENT =====

    /// Draw `frame` into a back buffer and present it.
    ///
    /// Frames from [`alloc_frame`](Self::alloc_frame) already live in a back
    /// buffer and are presented as is. Presenting such a frame a second time
    /// composites it into a freshly acquired back buffer.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before `initialize`
    /// - `FormatMismatch` if the frame format differs from the input format
    /// - any acquire, render or present failure; an acquired back buffer is
    ///   returned to the pool before the error is reported
    pub fn present(&self, frame: &dyn Frame) -> Result<PresentStatus> {
        let input_format = {
            let inner = self.shared.lock();
            Self::ensure_running(&inner)?;
            inner.config.input_format
        };
        if frame.format() != input_format {
            vp_bail!(SOURCE, FormatMismatch,
                "Frame {} is {}, presenter expects {}", frame.id(), frame.format(), input_format);
        }
        frame.convert(MemoryType::Gpu).map_err(|e| e.in_step("convert frame"))?;

        let mut guard = self.shared.lock();
        Self::ensure_running(&guard)?;
        let inner = &mut *guard;

        Self::check_for_resize(inner, self.window.as_ref());

        let tracked = if inner.config.render_to_back_buffer {
            inner.tracked.get(&frame.id()).copied().flatten()
        } else {
            None
        };

        let mut resized = false;
        let index = match tracked {
            Some(index) => index,
            None => {
                if inner.resize_pending && inner.tracked.is_empty() {
                    Self::resize_swapchain(inner, self.window.as_ref()).map_err(|e| e.in_step("resize swapchain"))?;
                    resized = true;
                }
                let index = inner
                    .swapchain
                    .acquire_next_back_buffer()
                    .map_err(|e| e.in_step("acquire back buffer"))?;
                if let Err(e) = Self::render(inner, frame, index) {
                    if let Err(drop_err) = inner.swapchain.drop_back_buffer(index) {
                        vp_warn!(SOURCE, "Dropping back buffer {} failed: {}", index, drop_err);
                    }
                    drop(guard);
                    self.shared.released.notify_all();
                    return Err(e.in_step("render frame"));
                }
                index
            }
        };

        if inner.config.wait_for_pts {
            inner.pacer.wait_for(frame.pts());
        }

        let result = inner.swapchain.present(index, inner.config.wait_for_vsync);
        if tracked.is_some() && !inner.swapchain.is_acquired(index) {
            if let Some(entry) = inner.tracked.get_mut(&frame.id()) {
                *entry = None;
            }
        }
        drop(guard);
        self.shared.released.notify_all();
        result.map_err(|e| e.in_step("present back buffer"))?;

        Ok(if resized {
            PresentStatus::ResolutionUpdated
        } else {
            PresentStatus::Presented
        })
    }

    fn render(inner: &mut PresenterInner, frame: &dyn Frame, index: u32) -> Result<()> {
        let target = inner.swapchain.back_buffer(index)?;
        let target_layout = inner.swapchain.render_target_layout();
        let resources = match inner.resources.as_mut() {
            Some(resources) => resources,
            None => vp_bail!(SOURCE, NotInitialized, "Presenter resources missing"),
        };
        resources.render(frame, &target, &target_layout, inner.renderer.as_mut())
    }

    // ===== PRESENTER-OWNED FRAMES =====

    /// Hand out a back buffer as a frame the producer renders into directly.
    ///
    /// Blocks until a back buffer is available, or fails with `InputFull`
    /// when the presenter is frozen. A pending resize is applied first, once
    /// every back buffer has been released.
    ///
    /// # Errors
    ///
    /// - `NotInitialized` if the presenter is not running
    /// - `InvalidArgument` outside render-to-back-buffer mode or for a format
    ///   other than the input format
    pub fn alloc_frame(&self, format: SurfaceFormat) -> Result<Arc<BackBufferFrame>> {
        let mut inner = self.shared.lock();
        Self::ensure_running(&inner)?;
        if !inner.config.render_to_back_buffer {
            vp_bail!(SOURCE, InvalidArgument, "alloc_frame requires render-to-back-buffer mode");
        }
        if format != inner.config.input_format {
            vp_bail!(SOURCE, InvalidArgument,
                "Format {} does not match the input format {}", format, inner.config.input_format);
        }

        while inner.swapchain.back_buffers_available() == 0 {
            if inner.config.frozen {
                vp_bail!(SOURCE, InputFull, "No back buffer available");
            }
            inner = self.shared.wait(inner);
            Self::ensure_running(&inner)?;
        }

        Self::check_for_resize(&mut inner, self.window.as_ref());
        if inner.resize_pending {
            inner.lifecycle = PresenterState::Resizing;
            while inner.swapchain.back_buffers_acquired() > 0 || !inner.tracked.is_empty() {
                if inner.config.frozen {
                    inner.lifecycle = PresenterState::Ready;
                    vp_bail!(SOURCE, InputFull, "Back buffers still held, resize pending");
                }
                inner = self.shared.wait(inner);
                if inner.lifecycle != PresenterState::Resizing {
                    Self::ensure_running(&inner)?;
                }
            }
            inner.lifecycle = PresenterState::Ready;
            Self::resize_swapchain(&mut inner, self.window.as_ref()).map_err(|e| e.in_step("resize swapchain"))?;
        }

        let index = inner
            .swapchain
            .acquire_next_back_buffer()
            .map_err(|e| e.in_step("acquire back buffer"))?;
        let target = match inner.swapchain.back_buffer(index) {
            Ok(target) => target,
            Err(e) => {
                if let Err(drop_err) = inner.swapchain.drop_back_buffer(index) {
                    vp_warn!(SOURCE, "Dropping back buffer {} failed: {}", index, drop_err);
                }
                return Err(e);
            }
        };

        let frame = Arc::new(BackBufferFrame::new(format, index, target));
        frame.add_observer(Arc::clone(&self.observer));
        inner.tracked.insert(frame.id(), Some(index));
        Ok(frame)
    }

    /// Number of presenter-allocated frames still held by the producer
    pub fn tracked_frames(&self) -> usize {
        self.shared.lock().tracked.len()
    }

    // ===== RESIZE =====

    /// Flag a resize if the window changed and, unless producers render into
    /// back buffers, resize right away. Intended for the UI thread.
    pub fn resize_if_needed(&self) -> Result<()> {
        let mut inner = self.shared.lock();
        if inner.lifecycle != PresenterState::Ready {
            return Ok(());
        }
        Self::check_for_resize(&mut inner, self.window.as_ref());
        if !inner.config.render_to_back_buffer && inner.resize_pending {
            Self::resize_swapchain(&mut inner, self.window.as_ref())?;
        }
        Ok(())
    }

    /// Force a resize before the next acquire
    pub fn request_resize(&self) {
        self.shared.lock().resize_pending = true;
    }

    pub fn is_resize_pending(&self) -> bool {
        self.shared.lock().resize_pending
    }

    pub fn swapchain_size(&self) -> Extent2D {
        self.shared.lock().swapchain.size()
    }

    /// Drop the pacing anchor (after a seek or a pause)
    pub fn flush(&self) {
        self.shared.lock().pacer.flush();
    }

    /// Set the resize flag when the fullscreen state toggled or the client
    /// area (if non-empty) differs from the swapchain size.
    fn check_for_resize(inner: &mut PresenterInner, window: &dyn PresentationWindow) {
        if window.is_fullscreen() != inner.swapchain.fullscreen_enabled() {
            inner.resize_pending = true;
        } else {
            let client = window.client_size();
            if !client.is_empty() && client != inner.swapchain.size() {
                inner.resize_pending = true;
            }
        }
    }

    /// Recreate the back buffers at the client size; clears the flag on success
    fn resize_swapchain(inner: &mut PresenterInner, window: &dyn PresentationWindow) -> Result<()> {
        if let Some(resources) = inner.resources.as_mut() {
            resources.wait_for_completion()?;
        }

        let client = window.client_size();
        let size = if client.is_empty() { inner.swapchain.size() } else { client };
        let fullscreen = window.is_fullscreen();
        inner.swapchain.resize(size.width, size.height, fullscreen)?;

        if let Some(resources) = inner.resources.as_mut() {
            resources.invalidate_view();
        }
        inner.resize_pending = false;
        vp_info!(SOURCE, "Swapchain resized to {}x{} (fullscreen: {})", size.width, size.height, fullscreen);
        Ok(())
    }

    #[cfg(test)]
    fn with_resources<R>(&self, f: impl FnOnce(&PresentResources) -> R) -> Option<R> {
        self.shared.lock().resources.as_ref().map(f)
    }

    fn ensure_running(inner: &PresenterInner) -> Result<()> {
        match inner.lifecycle {
            PresenterState::Ready | PresenterState::Resizing => Ok(()),
            PresenterState::Uninitialized | PresenterState::Terminated => {
                vp_bail!(SOURCE, NotInitialized, "Presenter is not initialized")
            }
        }
    }
}

impl Drop for FramePresenter {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
#[path = "frame_presenter_tests.rs"]
mod tests;
