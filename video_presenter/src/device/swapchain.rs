/// Swapchain trait - presentable surface owned by the platform backend

use std::sync::Arc;

use crate::error::Result;
use crate::device::handle::*;
use crate::device::sync::SyncPoint;
use crate::device::types::{Extent2D, RenderTargetLayout, SurfaceFormat};

/// Destination of one frame's draw pass.
///
/// Owned by the swapchain; the presenter borrows a copy for one frame.
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
    pub framebuffer: FramebufferHandle,
    pub sync: Arc<SyncPoint>,
    pub size: Extent2D,
}

/// Presentable surface with a pool of back buffers.
///
/// Back buffers cycle available -> acquired -> presenting -> available.
/// Indices returned by [`acquire_next_back_buffer`](Swapchain::acquire_next_back_buffer)
/// stay valid until the buffer is presented, dropped or the swapchain resized.
pub trait Swapchain: Send {
    /// Create the surface and its back buffers
    fn init(&mut self, width: u32, height: u32, format: SurfaceFormat) -> Result<()>;

    /// Destroy everything created by `init`; safe to call repeatedly
    fn terminate(&mut self);

    fn is_initialized(&self) -> bool;

    /// Acquire the next available back buffer
    fn acquire_next_back_buffer(&mut self) -> Result<u32>;

    /// Render target of a back buffer
    fn back_buffer(&self, index: u32) -> Result<RenderTarget>;

    /// Whether `index` is currently acquired (not yet presented or dropped)
    fn is_acquired(&self, index: u32) -> bool;

    /// Queue an acquired back buffer for display
    fn present(&mut self, index: u32, wait_for_vsync: bool) -> Result<()>;

    /// Return an acquired back buffer to the pool without presenting it
    fn drop_back_buffer(&mut self, index: u32) -> Result<()>;

    /// Recreate the back buffers at a new size
    fn resize(&mut self, width: u32, height: u32, fullscreen: bool) -> Result<()>;

    fn size(&self) -> Extent2D;

    fn fullscreen_enabled(&self) -> bool;

    fn back_buffers_available(&self) -> u32;

    fn back_buffers_acquired(&self) -> u32;

    /// Render pass the presenter's pipeline must be compatible with
    fn render_target_layout(&self) -> RenderTargetLayout;
}
