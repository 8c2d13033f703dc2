//! Sprite batching and draw-call generation.
//!
//! The [`Batcher`] accepts renderable elements in paint order and turns them
//! into as few indexed draws as the texture-unit limit and blend-mode changes
//! allow, without reordering anything. It talks to the GPU only through the
//! [`RenderBackend`] and [`GeometryTarget`] traits; [`WgpuBackend`] implements
//! them over wgpu.
//!
//! ```
//! use std::sync::Arc;
//! use lumen_render::{AlphaMode, BaseTexture, BatchSettings, Batcher, BlendMode, Renderable, Sprite};
//! use lumen_test_utils::MockBackend;
//!
//! let backend = Arc::new(MockBackend::new());
//! let mut batcher = Batcher::new(backend.clone(), BatchSettings::default()).unwrap();
//! let texture = BaseTexture::new(16, 16, AlphaMode::Premultiplied);
//!
//! batcher.start();
//! for blend in [BlendMode::Normal, BlendMode::Add, BlendMode::Normal] {
//!     let sprite: Arc<dyn Renderable> = Arc::new(Sprite::new(texture.clone()).with_blend_mode(blend));
//!     batcher.render(&sprite);
//! }
//! batcher.stop();
//!
//! assert_eq!(backend.draws().len(), 3);
//! ```

pub mod backend;
pub mod batch;
pub mod blend;
pub mod color;
pub mod dispatcher;
pub mod error;
pub mod platform;
pub mod renderable;
pub mod settings;
pub mod texture;

pub use backend::context::{GraphicsContext, GraphicsContextDescriptor};
pub use backend::gpu::WgpuBackend;
pub use backend::{GeometryTarget, IndexFormat, PrimitiveType, ProgramId, RenderBackend};
pub use batch::{
    AttributeDefinition, AttributeFormat, BatchProgram, BatchStats, Batcher, DrawCall,
    ShaderGenerator, TextureSet, VertexLayout,
};
pub use blend::{BlendMode, premultiply_blend_mode};
pub use color::{pack_color, premultiply_tint, tint_to_bgr};
pub use dispatcher::{BatchSystem, EmptyRenderer, ObjectRenderer, RendererId};
pub use error::{BatchError, BatchResult, GraphicsError};
pub use platform::{PlatformFlags, PlatformInfo};
pub use renderable::{CustomAttributeData, QUAD_INDICES, Renderable, Sprite, SpriteFrame};
pub use settings::BatchSettings;
pub use texture::{AlphaMode, BaseTexture, NO_LOCATION, TextureId, next_batch_tick};
