/// Presenter configuration

use crate::device::SurfaceFormat;

/// Options fixed when the presenter is created.
///
/// `input_format` can still be changed with
/// [`FramePresenter::set_input_format`](super::FramePresenter::set_input_format)
/// until the presenter is initialized.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenterConfig {
    /// Pixel format frames must arrive in (BGRA8 or RGBA8)
    pub input_format: SurfaceFormat,
    /// Present on vertical blank
    pub wait_for_vsync: bool,
    /// Hold each frame until its presentation timestamp is due
    pub wait_for_pts: bool,
    /// Producers draw straight into back buffers allocated with `alloc_frame`
    pub render_to_back_buffer: bool,
    /// `alloc_frame` fails with `InputFull` instead of blocking
    pub frozen: bool,
    pub clear_color: [f32; 4],
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub shader_entry_point: String,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            input_format: SurfaceFormat::Bgra8,
            wait_for_vsync: true,
            wait_for_pts: false,
            render_to_back_buffer: false,
            frozen: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: "quad.vert.spv".to_string(),
            fragment_shader: "quad.frag.spv".to_string(),
            shader_entry_point: "main".to_string(),
        }
    }
}
