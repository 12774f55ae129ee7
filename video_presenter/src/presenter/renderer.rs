/// Renderer hooks - extra draw steps around the composite quad

use crate::command::CommandRecorder;
use crate::device::Frame;
use crate::error::Result;

/// Draw steps injected into the presenter's render pass.
///
/// `draw_background` runs after the render target is synced and before the
/// quad; `draw_overlay` runs after the quad, before the frame is submitted.
/// Both default to doing nothing.
pub trait Renderer: Send {
    fn draw_background(&mut self, _recorder: &mut CommandRecorder) -> Result<()> {
        Ok(())
    }

    fn draw_overlay(&mut self, _recorder: &mut CommandRecorder, _frame: &dyn Frame) -> Result<()> {
        Ok(())
    }
}

/// Renderer drawing nothing besides the video quad
#[derive(Debug, Default)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {}
