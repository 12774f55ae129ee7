/// Presenter module - frame presentation orchestrator and its helpers

pub mod frame_presenter;
pub mod config;
pub mod renderer;
pub mod back_buffer_frame;
pub mod frame_pacer;
pub mod view_transform;
mod present_resources;

pub use frame_presenter::*;
pub use config::*;
pub use renderer::*;
pub use back_buffer_frame::*;
pub use frame_pacer::*;
pub use view_transform::{quad_vertex_layout, letterbox_rect, LetterboxRect, QuadVertex, ViewProjection, QUAD_VERTICES};
pub use present_resources::{TEXTURE_BINDING, VIEW_PROJECTION_BINDING};
