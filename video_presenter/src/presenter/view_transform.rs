/// Quad geometry and the letterbox view transform uploaded to the uniform buffer

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::device::{Extent2D, VertexAttribute, VertexBinding, VertexFormat, VertexLayout};

/// Vertex of the composite quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub pos: [f32; 3],
    pub tex: [f32; 2],
}

/// Unit quad drawn as a 4-vertex triangle strip.
///
/// Position y = 1 is the top of the picture (texture v = 0).
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [0.0, 1.0, 0.0], tex: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0, 0.0], tex: [1.0, 0.0] },
    QuadVertex { pos: [0.0, 0.0, 0.0], tex: [0.0, 1.0] },
    QuadVertex { pos: [1.0, 0.0, 0.0], tex: [1.0, 1.0] },
];

/// Vertex-input layout matching [`QuadVertex`]
pub fn quad_vertex_layout() -> VertexLayout {
    VertexLayout {
        bindings: vec![VertexBinding {
            binding: 0,
            stride: std::mem::size_of::<QuadVertex>() as u32,
        }],
        attributes: vec![
            VertexAttribute {
                location: 0,
                binding: 0,
                format: VertexFormat::R32G32B32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                binding: 0,
                format: VertexFormat::R32G32_SFLOAT,
                offset: 12,
            },
        ],
    }
}

/// Uniform block read by the quad vertex shader (column-major matrices)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewProjection {
    pub vertex_transform: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
}

impl ViewProjection {
    /// Transform fitting a `source` picture inside `target`, centered, aspect preserved.
    ///
    /// Maps the unit quad to the letterboxed rectangle in clip space (y down).
    /// The texture transform is identity.
    pub fn letterbox(source: Extent2D, target: Extent2D) -> Self {
        let rect = letterbox_rect(source, target);
        let (tw, th) = (target.width.max(1) as f32, target.height.max(1) as f32);

        let scale = Vec3::new(2.0 * rect.width / tw, -2.0 * rect.height / th, 1.0);
        let offset = Vec3::new(2.0 * rect.x / tw - 1.0, 1.0 - 2.0 * rect.y / th, 0.0);
        let vertex = Mat4::from_translation(offset) * Mat4::from_scale(scale);

        Self {
            vertex_transform: vertex.to_cols_array_2d(),
            tex_transform: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Destination rectangle of the picture in target pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Largest centered rectangle with the source aspect ratio fitting in `target`.
///
/// An empty source fills the whole target.
pub fn letterbox_rect(source: Extent2D, target: Extent2D) -> LetterboxRect {
    let (tw, th) = (target.width as f32, target.height as f32);
    if source.is_empty() || target.is_empty() {
        return LetterboxRect { x: 0.0, y: 0.0, width: tw, height: th };
    }

    let scale = (tw / source.width as f32).min(th / source.height as f32);
    let width = source.width as f32 * scale;
    let height = source.height as f32 * scale;
    LetterboxRect {
        x: (tw - width) * 0.5,
        y: (th - height) * 0.5,
        width,
        height,
    }
}

/// Remembers the (source, target) pair the uniform buffer was last written for
#[derive(Debug, Default)]
pub(crate) struct ViewCache {
    key: Option<(Extent2D, Extent2D)>,
}

impl ViewCache {
    /// New transform if the pair changed since the last call
    pub(crate) fn update(&mut self, source: Extent2D, target: Extent2D) -> Option<ViewProjection> {
        if self.key == Some((source, target)) {
            return None;
        }
        Some(ViewProjection::letterbox(source, target))
    }

    /// Record that the transform for this pair reached the GPU
    pub(crate) fn commit(&mut self, source: Extent2D, target: Extent2D) {
        self.key = Some((source, target));
    }

    pub(crate) fn invalidate(&mut self) {
        self.key = None;
    }
}

#[cfg(test)]
#[path = "view_transform_tests.rs"]
mod tests;
