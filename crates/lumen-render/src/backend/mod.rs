//! Collaborator traits the batcher draws through.
//!
//! The batcher never touches a GPU API directly. It binds textures, sets blend
//! state, uploads geometry and issues indexed draws through [`RenderBackend`]
//! and [`GeometryTarget`]. [`gpu::WgpuBackend`] implements them over wgpu;
//! tests use a recording mock.

pub mod context;
pub mod gpu;

use std::sync::Arc;

use crate::batch::{BatchProgram, VertexLayout};
use crate::blend::BlendMode;
use crate::texture::BaseTexture;

/// Handle to a linked batch program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Primitive topology of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

impl PrimitiveType {
    pub fn to_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveType::Points => wgpu::PrimitiveTopology::PointList,
            PrimitiveType::Lines => wgpu::PrimitiveTopology::LineList,
            PrimitiveType::LineStrip => wgpu::PrimitiveTopology::LineStrip,
            PrimitiveType::Triangles => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveType::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

/// Width of one index in the index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn byte_size(self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }

    pub fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

/// One GPU-side vertex and index buffer pair.
pub trait GeometryTarget: Send + Sync {
    /// Make this geometry the source of subsequent draws.
    fn bind(&self);

    /// Replace the buffer contents. Buffers grow as needed.
    fn update_buffers(&self, vertices: &[u8], indices: &[u8]);
}

/// The GPU-facing side of the batcher.
///
/// Methods take `&self`; implementations keep their state behind a lock.
pub trait RenderBackend: Send + Sync {
    /// Hardware limit on textures bound to one fragment stage.
    fn max_texture_image_units(&self) -> u32;

    /// Whether a buffer drawn from earlier in the frame may be overwritten.
    fn can_upload_same_buffer(&self) -> bool {
        true
    }

    /// Try compiling a probe fragment shader. Returns `false` on failure.
    fn compile_probe(&self, fragment_source: &str) -> bool;

    /// Compile and link a batch program for the given vertex layout.
    fn create_program(&self, program: &BatchProgram, layout: &VertexLayout) -> ProgramId;

    fn bind_program(&self, program: ProgramId);

    fn create_geometry(&self, layout: &VertexLayout) -> Box<dyn GeometryTarget>;

    /// Bind `texture` to sampler `slot`. Cheap when already bound there.
    fn bind_texture(&self, texture: &Arc<BaseTexture>, slot: u32);

    /// The texture currently bound at `slot`, if any.
    fn bound_texture(&self, slot: u32) -> Option<Arc<BaseTexture>>;

    fn set_blend_mode(&self, mode: BlendMode);

    /// Draw `count` indices starting at `byte_offset` of the bound geometry.
    fn draw_elements(&self, primitive: PrimitiveType, count: u32, format: IndexFormat, byte_offset: u32);
}
