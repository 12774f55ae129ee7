/*!
# Video Presenter - Vulkan Backend

Vulkan implementation of the video_presenter device function table and
swapchain interface.

This crate uses the Ash library for Vulkan bindings and gpu-allocator for
buffer memory. One logical device with a single graphics queue (also used for
presentation) is shared by the function table and every swapchain.

```no_run
use std::sync::Arc;
use video_presenter_vulkan::{VulkanConfig, VulkanDevice};

# fn run(window: Arc<winit::window::Window>) -> video_presenter::vpresent::Result<()> {
let device = VulkanDevice::new(window.as_ref(), VulkanConfig::default())?;
let swapchain = device.create_swapchain(Arc::clone(&window))?;
let gpu = device.context();
# let _ = (swapchain, gpu);
# Ok(())
# }
```
*/

mod vulkan_config;
mod vulkan_context;
mod vulkan_handle;
mod vulkan_format;
mod vulkan_device;
mod vulkan_swapchain;

// Validation layer support (only compiled with the vulkan-validation feature)
#[cfg(feature = "vulkan-validation")]
mod debug;

pub use vulkan_config::{DebugSeverity, VulkanConfig};
pub use vulkan_device::VulkanDevice;
pub use vulkan_swapchain::VulkanSwapchain;

#[cfg(feature = "vulkan-validation")]
pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
