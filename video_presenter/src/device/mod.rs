/// Device module - GPU context, function table and external collaborator interfaces

pub mod handle;
pub mod types;
pub mod graphics_device;
pub mod sync;
pub mod swapchain;
pub mod frame;
pub mod window;
pub mod shader;

pub use handle::*;
pub use types::*;
pub use graphics_device::*;
pub use sync::*;
pub use swapchain::*;
pub use frame::*;
pub use window::*;
pub use shader::*;

// Mock device, swapchain, window and frames for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
