//! Sprite batching: buffering, grouping, packing and draw-call emission.

mod batcher;
pub mod buffer;
pub mod draw_call;
pub mod geometry;
pub mod layout;
pub mod shader;

pub use batcher::{BatchStats, Batcher};
pub use buffer::{ScratchPool, ViewableBuffer, bucket_for};
pub use draw_call::{DrawCall, TextureSet};
pub use geometry::pack_interleaved_geometry;
pub use layout::{
    AttributeDefinition, AttributeFormat, AttributeSource, CompiledAttribute, VertexLayout,
};
pub use shader::{BatchProgram, ShaderGenerator, check_max_if_statements, generate_probe_source};
