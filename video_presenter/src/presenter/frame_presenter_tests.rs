//! Unit tests for frame_presenter.rs
//!
//! Drives the whole presenter (descriptor registry, pipeline, recorder,
//! swapchain interplay) against MockDevice, MockSwapchain and MockWindow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::command::CommandRecorder;
use crate::device::mock_graphics_device::{MockDevice, MockFrame, MockShaderLoader, MockSwapchain, MockWindow};
use crate::device::*;
use crate::error::{Error, Result};
use crate::presenter::{
    FramePresenter, PresentStatus, PresenterConfig, PresenterState, Renderer, QUAD_VERTICES,
    TEXTURE_BINDING, VIEW_PROJECTION_BINDING,
};

const BACK_BUFFERS: u32 = 3;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

struct Harness {
    device: Arc<MockDevice>,
    swapchain: MockSwapchain,
    window: Arc<MockWindow>,
    presenter: FramePresenter,
}

fn harness_with(config: PresenterConfig, shaders: MockShaderLoader) -> Harness {
    let device = MockDevice::new();
    let swapchain = MockSwapchain::new(BACK_BUFFERS);
    let window = MockWindow::new(1920, 1080);
    let presenter = FramePresenter::new(
        device.context(),
        Box::new(swapchain.clone()),
        window.clone(),
        Box::new(shaders),
        config,
    )
    .unwrap();
    Harness { device, swapchain, window, presenter }
}

fn harness(config: PresenterConfig) -> Harness {
    harness_with(config, MockShaderLoader::quad())
}

/// Presenter initialized at 1920x1080
fn ready(config: PresenterConfig) -> Harness {
    let h = harness(config);
    h.presenter.initialize(1920, 1080).unwrap();
    h
}

fn back_buffer_config(frozen: bool) -> PresenterConfig {
    PresenterConfig {
        render_to_back_buffer: true,
        frozen,
        ..PresenterConfig::default()
    }
}

fn bgra_frame(width: u32, height: u32) -> MockFrame {
    MockFrame::new(SurfaceFormat::Bgra8, width, height, Duration::ZERO)
}

struct RecordingRenderer {
    log: Arc<Mutex<Vec<&'static str>>>,
    fail_overlay: bool,
}

impl Renderer for RecordingRenderer {
    fn draw_background(&mut self, _recorder: &mut CommandRecorder) -> Result<()> {
        self.log.lock().unwrap().push("background");
        Ok(())
    }

    fn draw_overlay(&mut self, recorder: &mut CommandRecorder, _frame: &dyn Frame) -> Result<()> {
        self.log.lock().unwrap().push("overlay");
        if self.fail_overlay {
            return Err(Error::InvalidArgument("overlay failed".to_string()));
        }
        recorder.draw(3)
    }
}

// ============================================================================
// CONSTRUCTION & CONFIGURATION
// ============================================================================

#[test]
fn test_new_rejects_unsupported_input_format() {
    let device = MockDevice::new();
    let config = PresenterConfig {
        input_format: SurfaceFormat::Nv12,
        ..PresenterConfig::default()
    };
    let result = FramePresenter::new(
        device.context(),
        Box::new(MockSwapchain::new(2)),
        MockWindow::new(640, 480),
        Box::new(MockShaderLoader::quad()),
        config,
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn test_set_input_format_only_before_initialize() {
    let h = harness(PresenterConfig::default());

    assert!(matches!(h.presenter.set_input_format(SurfaceFormat::Rgba16F), Err(Error::InvalidArgument(_))));
    h.presenter.set_input_format(SurfaceFormat::Rgba8).unwrap();
    assert_eq!(h.presenter.input_format(), SurfaceFormat::Rgba8);

    h.presenter.initialize(1920, 1080).unwrap();
    assert_eq!(h.swapchain.state().format, SurfaceFormat::Rgba8);
    assert!(matches!(h.presenter.set_input_format(SurfaceFormat::Bgra8), Err(Error::AlreadyInitialized(_))));
}

// ============================================================================
// INITIALIZE
// ============================================================================

#[test]
fn test_initialize_creates_all_resources() {
    let h = ready(PresenterConfig::default());

    assert_eq!(h.presenter.state(), PresenterState::Ready);
    assert_eq!(h.presenter.swapchain_size(), Extent2D::new(1920, 1080));
    assert!(h.swapchain.state().initialized);

    assert_eq!(h.device.live_of("descriptor_set_layout"), 1);
    assert_eq!(h.device.live_of("descriptor_pool"), 1);
    assert_eq!(h.device.live_of("descriptor_set"), 1);
    assert_eq!(h.device.live_of("pipeline_layout"), 1);
    assert_eq!(h.device.live_of("pipeline"), 1);
    assert_eq!(h.device.live_of("command_pool"), 1);
    assert_eq!(h.device.live_of("buffer"), 2);
    assert_eq!(h.device.live_of("sampler"), 1);
    // Shader modules only live while the pipeline is created
    assert_eq!(h.device.live_of("shader_module"), 0);
    assert_eq!(h.device.count_calls("create_shader_module"), 2);
}

#[test]
fn test_initialize_binds_uniform_buffer_and_fills_vertices() {
    let h = ready(PresenterConfig::default());

    let (set, uniform, vertex, sampler) = h
        .presenter
        .with_resources(|r| {
            (
                r.registry().descriptor_set(r.present_set()).unwrap(),
                r.uniform_buffer(),
                r.vertex_buffer(),
                r.sampler(),
            )
        })
        .unwrap();

    assert_eq!(
        h.device.descriptor(set, VIEW_PROJECTION_BINDING, 0),
        Some(DescriptorInfo::Buffer(BufferInfo { buffer: uniform, offset: 0, range: 128 }))
    );
    assert_eq!(h.device.buffer_data(uniform), vec![0u8; 128]);
    assert_eq!(h.device.buffer_data(vertex), bytemuck::cast_slice::<_, u8>(&QUAD_VERTICES).to_vec());
    assert!(!sampler.is_null());
}

#[test]
fn test_initialize_twice_fails() {
    let h = ready(PresenterConfig::default());
    assert!(matches!(h.presenter.initialize(1920, 1080), Err(Error::AlreadyInitialized(_))));
}

#[test]
fn test_initialize_with_zero_size_is_invalid() {
    let h = harness(PresenterConfig::default());
    assert!(matches!(h.presenter.initialize(0, 1080), Err(Error::InvalidArgument(_))));
    assert_eq!(h.presenter.state(), PresenterState::Uninitialized);
}

#[test]
fn test_initialize_missing_shader_leaks_nothing() {
    let h = harness_with(PresenterConfig::default(), MockShaderLoader { shaders: HashMap::new() });

    let result = h.presenter.initialize(1920, 1080);
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(h.presenter.state(), PresenterState::Uninitialized);
    assert_eq!(h.device.live_count(), 0);
    assert!(!h.swapchain.state().initialized);
}

#[test]
fn test_initialize_failing_late_step_leaks_nothing() {
    let h = harness(PresenterConfig::default());
    h.device.fail("create_sampler");

    let err = h.presenter.initialize(1920, 1080).unwrap_err();
    assert!(matches!(err, Error::BackendError(_)));
    assert!(err.to_string().contains("create sampler"));
    assert_eq!(h.device.live_count(), 0);
}

// ============================================================================
// PRESENT
// ============================================================================

#[test]
fn test_present_before_initialize_fails() {
    let h = harness(PresenterConfig::default());
    let frame = bgra_frame(1920, 1080);
    assert!(matches!(h.presenter.present(&frame), Err(Error::NotInitialized(_))));
}

#[test]
fn test_end_to_end_present_and_format_mismatch() {
    let h = ready(PresenterConfig::default());

    let frame = MockFrame::new(SurfaceFormat::Bgra8, 1920, 1080, Duration::from_millis(40));
    assert_eq!(h.presenter.present(&frame).unwrap(), PresentStatus::Presented);
    assert_eq!(h.presenter.swapchain_size(), Extent2D::new(1920, 1080));
    assert_eq!(h.swapchain.state().presented, vec![0]);

    let acquires = h.swapchain.state().acquire_calls;
    let wrong = MockFrame::new(SurfaceFormat::Rgba8, 1920, 1080, Duration::from_millis(80));
    assert!(matches!(h.presenter.present(&wrong), Err(Error::FormatMismatch(_))));
    assert_eq!(h.swapchain.state().acquire_calls, acquires);
    assert_eq!(*wrong.convert_calls.lock().unwrap(), 0);
    assert_eq!(h.swapchain.state().presented, vec![0]);
}

#[test]
fn test_present_records_composite_pass() {
    let h = ready(PresenterConfig::default());
    let frame = bgra_frame(1920, 1080);

    h.presenter.present(&frame).unwrap();

    assert_eq!(
        h.device.commands(),
        vec![
            "begin",
            "image_barrier",
            "set_viewport",
            "set_scissor",
            "begin_render_pass",
            "bind_pipeline",
            "bind_descriptor_sets",
            "bind_vertex_buffer",
            "draw",
            "end_render_pass",
            "end",
        ]
    );
    assert_eq!(h.device.state().draws, vec![4]);
    assert_eq!(frame.memory_type(), MemoryType::Gpu);
    assert_eq!(frame.texture().sync.layout(), ImageLayout::ShaderReadOnly);
}

#[test]
fn test_present_syncs_target_and_source() {
    let h = ready(PresenterConfig::default());
    let frame = bgra_frame(1920, 1080);
    let target_semaphore = h.swapchain.state().targets[0].sync.semaphore();

    h.presenter.present(&frame).unwrap();

    let submits = h.device.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(
        submits[0].waits,
        vec![SemaphoreWait {
            semaphore: target_semaphore,
            stage: PipelineStage::ColorAttachmentOutput,
        }]
    );
    assert_eq!(submits[0].signals, vec![target_semaphore, frame.texture().sync.semaphore()]);
    assert!(frame.texture().sync.is_submitted());
}

#[test]
fn test_present_updates_texture_descriptor() {
    let h = ready(PresenterConfig::default());
    let frame = bgra_frame(1280, 720);

    h.presenter.present(&frame).unwrap();

    let (set, sampler) = h
        .presenter
        .with_resources(|r| (r.registry().descriptor_set(r.present_set()).unwrap(), r.sampler()))
        .unwrap();
    assert_eq!(
        h.device.descriptor(set, TEXTURE_BINDING, 0),
        Some(DescriptorInfo::Image(ImageInfo {
            sampler,
            view: frame.texture().view,
            layout: ImageLayout::ShaderReadOnly,
        }))
    );
}

#[test]
fn test_view_transform_rewritten_only_on_size_change() {
    let h = ready(PresenterConfig::default());

    h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    assert_eq!(h.device.count_calls("write_buffer"), 1);

    h.presenter.present(&bgra_frame(1280, 720)).unwrap();
    assert_eq!(h.device.count_calls("write_buffer"), 2);
}

#[test]
fn test_render_failure_drops_back_buffer() {
    let h = ready(PresenterConfig::default());
    h.device.fail("queue_submit");

    let result = h.presenter.present(&bgra_frame(1920, 1080));
    assert!(matches!(result, Err(Error::BackendError(_))));
    assert_eq!(h.swapchain.state().dropped, vec![0]);
    assert!(h.swapchain.state().presented.is_empty());
    assert_eq!(h.swapchain.back_buffers_available(), BACK_BUFFERS);

    h.device.heal("queue_submit");
    assert_eq!(h.presenter.present(&bgra_frame(1920, 1080)).unwrap(), PresentStatus::Presented);
}

#[test]
fn test_acquire_failure_is_propagated() {
    let h = ready(PresenterConfig::default());
    h.swapchain.state().fail_acquire = true;

    assert!(matches!(h.presenter.present(&bgra_frame(1920, 1080)), Err(Error::BackendError(_))));
    assert!(h.swapchain.state().presented.is_empty());
    assert_eq!(h.device.count_calls("queue_submit"), 0);
}

#[test]
fn test_convert_failure_skips_acquire() {
    let h = ready(PresenterConfig::default());
    let mut frame = bgra_frame(1920, 1080);
    frame.fail_convert = true;

    assert!(h.presenter.present(&frame).is_err());
    assert_eq!(h.swapchain.state().acquire_calls, 0);
}

#[test]
fn test_renderer_hooks_run_around_quad() {
    let h = ready(PresenterConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    h.presenter.set_renderer(Box::new(RecordingRenderer { log: log.clone(), fail_overlay: false }));

    h.presenter.present(&bgra_frame(1920, 1080)).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["background", "overlay"]);
    assert_eq!(h.device.state().draws, vec![4, 3]);
}

#[test]
fn test_overlay_failure_drops_back_buffer_and_recovers() {
    let h = ready(PresenterConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    h.presenter.set_renderer(Box::new(RecordingRenderer { log, fail_overlay: true }));

    assert!(h.presenter.present(&bgra_frame(1920, 1080)).is_err());
    assert_eq!(h.swapchain.state().dropped, vec![0]);
    assert_eq!(h.device.count_calls("queue_submit"), 0);

    h.presenter.set_renderer(Box::new(crate::presenter::NoopRenderer));
    assert!(h.presenter.present(&bgra_frame(1920, 1080)).is_ok());
}

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn test_fullscreen_toggle_resizes_before_acquire() {
    let h = ready(PresenterConfig::default());
    h.window.set_fullscreen(true);

    let status = h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    assert_eq!(status, PresentStatus::ResolutionUpdated);
    assert_eq!(h.swapchain.state().resizes, vec![(1920, 1080, true)]);
    assert!(!h.presenter.is_resize_pending());

    let status = h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    assert_eq!(status, PresentStatus::Presented);
}

#[test]
fn test_resize_if_needed_follows_client_area() {
    let h = ready(PresenterConfig::default());
    h.window.set_client_size(1280, 720);

    h.presenter.resize_if_needed().unwrap();
    assert_eq!(h.presenter.swapchain_size(), Extent2D::new(1280, 720));
    assert!(!h.presenter.is_resize_pending());

    // Unchanged, non-zero size does not flag again
    h.presenter.resize_if_needed().unwrap();
    assert!(!h.presenter.is_resize_pending());
    assert_eq!(h.swapchain.state().resizes.len(), 1);
}

#[test]
fn test_minimized_window_does_not_flag_resize() {
    let h = ready(PresenterConfig::default());
    h.window.set_client_size(0, 0);

    h.presenter.resize_if_needed().unwrap();
    assert!(!h.presenter.is_resize_pending());
    assert_eq!(h.presenter.swapchain_size(), Extent2D::new(1920, 1080));
}

#[test]
fn test_resize_if_needed_defers_in_back_buffer_mode() {
    let h = ready(back_buffer_config(true));
    h.window.set_client_size(1280, 720);

    h.presenter.resize_if_needed().unwrap();
    assert!(h.presenter.is_resize_pending());
    assert!(h.swapchain.state().resizes.is_empty());
}

#[test]
fn test_request_resize_applies_on_next_present() {
    let h = ready(PresenterConfig::default());
    h.presenter.request_resize();
    assert!(h.presenter.is_resize_pending());

    let status = h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    assert_eq!(status, PresentStatus::ResolutionUpdated);
    assert!(!h.presenter.is_resize_pending());
}

// ============================================================================
// PRESENTER-OWNED FRAMES
// ============================================================================

#[test]
fn test_alloc_frame_requires_back_buffer_mode_and_format() {
    let h = ready(PresenterConfig::default());
    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Bgra8), Err(Error::InvalidArgument(_))));

    let h = ready(back_buffer_config(true));
    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Rgba8), Err(Error::InvalidArgument(_))));

    let h = harness(back_buffer_config(true));
    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Bgra8), Err(Error::NotInitialized(_))));
}

#[test]
fn test_frozen_back_pressure() {
    let h = ready(back_buffer_config(true));

    let mut held: Vec<_> = (0..BACK_BUFFERS)
        .map(|_| h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap())
        .collect();
    assert_eq!(h.presenter.tracked_frames(), BACK_BUFFERS as usize);

    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Bgra8), Err(Error::InputFull(_))));

    // Releasing one frame immediately permits one more
    let released = held.pop().unwrap();
    let index = released.back_buffer_index();
    drop(released);
    assert_eq!(h.swapchain.state().dropped, vec![index]);

    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    assert_eq!(frame.back_buffer_index(), index);
    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Bgra8), Err(Error::InputFull(_))));
}

#[test]
fn test_present_allocated_frame_skips_render() {
    let h = ready(back_buffer_config(true));
    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    frame.set_pts(Duration::from_millis(33));

    let status = h.presenter.present(frame.as_ref()).unwrap();
    assert_eq!(status, PresentStatus::Presented);
    assert_eq!(h.swapchain.state().presented, vec![frame.back_buffer_index()]);
    assert_eq!(h.device.count_calls("queue_submit"), 0);

    drop(frame);
    assert_eq!(h.presenter.tracked_frames(), 0);
    assert!(h.swapchain.state().dropped.is_empty());
}

#[test]
fn test_late_release_of_presented_frame_keeps_reused_buffer() {
    let h = ready(back_buffer_config(true));
    let first = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    h.presenter.present(first.as_ref()).unwrap();

    let second = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    assert_eq!(second.back_buffer_index(), first.back_buffer_index());

    drop(first);
    assert!(h.swapchain.state().dropped.is_empty());
    assert_eq!(h.presenter.tracked_frames(), 1);

    // The reused buffer stays with its new owner
    let third = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    assert_ne!(third.back_buffer_index(), second.back_buffer_index());

    h.presenter.present(second.as_ref()).unwrap();
    assert_eq!(h.swapchain.state().presented, vec![0, second.back_buffer_index()]);
}

#[test]
fn test_presenting_frame_again_composites_into_new_buffer() {
    let h = ready(back_buffer_config(true));
    let first = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    h.presenter.present(first.as_ref()).unwrap();
    let second = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();

    h.presenter.present(first.as_ref()).unwrap();
    assert_eq!(h.device.count_calls("queue_submit"), 1);
    let presented = h.swapchain.state().presented.clone();
    assert_eq!(presented.len(), 2);
    assert_ne!(presented[1], second.back_buffer_index());

    // The second frame still owns its buffer
    h.presenter.present(second.as_ref()).unwrap();
    assert_eq!(h.swapchain.state().presented.last(), Some(&second.back_buffer_index()));
    assert_eq!(h.device.count_calls("queue_submit"), 1);
}

#[test]
fn test_blocking_alloc_wakes_on_release() {
    let h = ready(back_buffer_config(false));
    let mut held: Vec<_> = (0..BACK_BUFFERS)
        .map(|_| h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap())
        .collect();

    let released = held.pop().unwrap();
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        drop(released);
    });

    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8);
    releaser.join().unwrap();
    assert!(frame.is_ok());
}

#[test]
fn test_terminate_wakes_blocked_alloc() {
    let h = ready(back_buffer_config(false));
    let _held: Vec<_> = (0..BACK_BUFFERS)
        .map(|_| h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap())
        .collect();

    std::thread::scope(|scope| {
        let waiter = scope.spawn(|| h.presenter.alloc_frame(SurfaceFormat::Bgra8));
        std::thread::sleep(Duration::from_millis(50));
        h.presenter.terminate();
        assert!(matches!(waiter.join().unwrap(), Err(Error::NotInitialized(_))));
    });
}

#[test]
fn test_alloc_frame_resizes_once_all_buffers_return() {
    let h = ready(back_buffer_config(true));
    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    h.window.set_client_size(1280, 720);

    assert!(matches!(h.presenter.alloc_frame(SurfaceFormat::Bgra8), Err(Error::InputFull(_))));
    assert_eq!(h.presenter.state(), PresenterState::Ready);
    assert!(h.presenter.is_resize_pending());

    drop(frame);
    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();
    assert_eq!(h.swapchain.state().resizes, vec![(1280, 720, false)]);
    assert_eq!(frame.size(), Extent2D::new(1280, 720));
    assert!(!h.presenter.is_resize_pending());
}

// ============================================================================
// TERMINATE
// ============================================================================

#[test]
fn test_terminate_releases_everything() {
    let h = ready(PresenterConfig::default());
    h.presenter.present(&bgra_frame(1920, 1080)).unwrap();
    h.presenter.request_resize();

    h.presenter.terminate();

    assert_eq!(h.presenter.state(), PresenterState::Terminated);
    assert_eq!(h.device.live_count(), 0);
    assert!(!h.swapchain.state().initialized);
    assert!(!h.presenter.is_resize_pending());
    assert_eq!(h.device.count_calls("wait_idle"), 1);
}

#[test]
fn test_terminate_twice_is_noop() {
    let h = ready(PresenterConfig::default());

    h.presenter.terminate();
    let calls = h.device.calls().len();
    h.presenter.terminate();

    assert_eq!(h.device.calls().len(), calls);
    assert_eq!(h.presenter.state(), PresenterState::Terminated);
}

#[test]
fn test_terminate_clears_tracked_frames() {
    let h = ready(back_buffer_config(true));
    let frame = h.presenter.alloc_frame(SurfaceFormat::Bgra8).unwrap();

    h.presenter.terminate();
    assert_eq!(h.presenter.tracked_frames(), 0);

    // Late release after terminate is harmless
    drop(frame);
    assert!(h.swapchain.state().dropped.is_empty());
}

#[test]
fn test_reinitialize_after_terminate() {
    let h = ready(PresenterConfig::default());
    h.presenter.terminate();

    h.presenter.initialize(1280, 720).unwrap();
    assert_eq!(h.presenter.state(), PresenterState::Ready);
    assert_eq!(h.presenter.present(&bgra_frame(1280, 720)).unwrap(), PresentStatus::Presented);
}

#[test]
fn test_drop_terminates() {
    let device;
    {
        let h = ready(PresenterConfig::default());
        device = h.device.clone();
        assert!(device.live_count() > 0);
    }
    assert_eq!(device.live_count(), 0);
}
