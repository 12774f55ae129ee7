/// Presentation window interface - client area and fullscreen state

use crate::device::types::Extent2D;

/// Window the swapchain presents into, as seen by the resize logic
pub trait PresentationWindow: Send + Sync {
    /// Size of the client (drawable) area in physical pixels
    fn client_size(&self) -> Extent2D;

    fn is_fullscreen(&self) -> bool;
}

impl PresentationWindow for winit::window::Window {
    fn client_size(&self) -> Extent2D {
        let size = self.inner_size();
        Extent2D::new(size.width, size.height)
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen().is_some()
    }
}
