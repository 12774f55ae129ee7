#![allow(dead_code)]
//! GPU test utilities - shared Vulkan device and window for integration tests
//!
//! One hidden window and one VulkanDevice are created on first use and kept
//! for the whole test binary (one device per application, as in real use).
//! Swapchains are created per test from the shared device; tests using them
//! must be `#[serial]` since they all present into the same window.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use video_presenter_vulkan::{VulkanConfig, VulkanDevice};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

// Platform-specific imports for EventLoop threading
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(target_os = "macos")))]
use winit::platform::x11::EventLoopBuilderExtX11;

/// Global device (initialized once)
static GPU_DEVICE: OnceLock<Arc<VulkanDevice>> = OnceLock::new();

/// Global window (kept alive for the device)
/// Note: the EventLoop is intentionally leaked with mem::forget to keep the window valid
static GPU_WINDOW: OnceLock<Arc<Window>> = OnceLock::new();

/// Environment variable naming a directory with compiled `quad.vert.spv` / `quad.frag.spv`
pub const SHADER_DIR_VAR: &str = "VIDEO_PRESENTER_SHADER_DIR";

/// Shared device and window for GPU tests
pub fn get_test_device() -> (Arc<VulkanDevice>, Arc<Window>) {
    let device = GPU_DEVICE
        .get_or_init(|| {
            let (window, event_loop) = create_test_window();
            let config = VulkanConfig {
                application_name: "video_presenter tests".to_string(),
                ..VulkanConfig::default()
            };
            let device = VulkanDevice::new(window.as_ref(), config)
                .expect("Failed to create VulkanDevice for tests");

            // Test-only workaround: EventLoop is not Sync and cannot live in a static
            std::mem::forget(event_loop);
            GPU_WINDOW.set(window).ok();
            device
        })
        .clone();
    let window = GPU_WINDOW.get().expect("test window not initialized").clone();
    (device, window)
}

/// Directory holding the presenter's compiled shaders, if configured
pub fn shader_dir() -> Option<PathBuf> {
    std::env::var_os(SHADER_DIR_VAR).map(PathBuf::from)
}

/// Create a hidden test window.
///
/// The EventLoop supports any_thread, since cargo test runs tests off the main thread.
#[allow(deprecated)]
pub fn create_test_window() -> (Arc<Window>, EventLoop<()>) {
    let event_loop = {
        #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(any(target_os = "windows", all(unix, not(target_os = "macos")))))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let window_attrs = Window::default_attributes()
        .with_title("GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(800, 600))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (Arc::new(window), event_loop)
}
