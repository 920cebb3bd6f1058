//! The primitive vertex layout shared between the CPU-side batch and the
//! generated vertex stage.

use bytemuck::{Pod, Zeroable};

/// One triangle-list vertex: drawing-area position, fixed-point depth,
/// packed color and a homogeneous texture coordinate. Immutable once
/// appended to a batch.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PrimVertex {
    pub x: f32,
    pub y: f32,
    pub z: u32,
    pub color: [u8; 4],
    pub s: f32,
    pub t: f32,
    pub q: f32,
}

impl PrimVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Uint32,
        2 => Unorm8x4,
        3 => Float32x3,
    ];

    pub const STRIDE: u64 = std::mem::size_of::<PrimVertex>() as u64;

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: Self::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(PrimVertex::STRIDE, 28);
        assert_eq!(PrimVertex::ATTRIBUTES[0].offset, 0);
        assert_eq!(PrimVertex::ATTRIBUTES[1].offset, 8);
        assert_eq!(PrimVertex::ATTRIBUTES[2].offset, 12);
        assert_eq!(PrimVertex::ATTRIBUTES[3].offset, 16);
    }
}
