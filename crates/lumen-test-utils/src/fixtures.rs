//! Textures and elements for batcher tests.

use std::sync::Arc;

use lumen_core::math::{Affine2, Vec2};
use lumen_render::{
    AlphaMode, BaseTexture, BlendMode, CustomAttributeData, Renderable, Sprite,
};

/// A loaded 16x16 premultiplied texture.
pub fn texture() -> Arc<BaseTexture> {
    texture_with(AlphaMode::Premultiplied)
}

pub fn texture_with(alpha_mode: AlphaMode) -> Arc<BaseTexture> {
    BaseTexture::new(16, 16, alpha_mode)
}

/// `count` distinct loaded textures.
pub fn textures(count: usize) -> Vec<Arc<BaseTexture>> {
    (0..count).map(|_| texture()).collect()
}

/// A 16x16 sprite quad with normal blending.
pub fn quad(texture: &Arc<BaseTexture>) -> Arc<dyn Renderable> {
    quad_with_blend(texture, BlendMode::Normal)
}

pub fn quad_with_blend(texture: &Arc<BaseTexture>, blend_mode: BlendMode) -> Arc<dyn Renderable> {
    Arc::new(Sprite::new(texture.clone()).with_blend_mode(blend_mode))
}

/// A quad translated to `(x, y)`.
pub fn quad_at(texture: &Arc<BaseTexture>, x: f32, y: f32) -> Arc<dyn Renderable> {
    Arc::new(Sprite::new(texture.clone()).with_transform(Affine2::from_translation(Vec2::new(x, y))))
}

/// Free-form element with explicit geometry.
#[derive(Debug, Clone)]
pub struct TestElement {
    pub texture: Arc<BaseTexture>,
    pub vertices: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
    pub blend_mode: BlendMode,
    pub alpha: f32,
    pub tint: u32,
    /// Custom attribute values keyed by identifier.
    pub custom: Vec<(String, Vec<f32>)>,
}

impl TestElement {
    /// A unit triangle.
    pub fn triangle(texture: &Arc<BaseTexture>) -> Self {
        Self::new(
            texture,
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            vec![0, 1, 2],
        )
    }

    pub fn new(texture: &Arc<BaseTexture>, vertices: Vec<f32>, uvs: Vec<f32>, indices: Vec<u32>) -> Self {
        Self {
            texture: texture.clone(),
            vertices,
            uvs,
            indices,
            blend_mode: BlendMode::Normal,
            alpha: 1.0,
            tint: 0xffffff,
            custom: Vec::new(),
        }
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_tint(mut self, tint: u32) -> Self {
        self.tint = tint;
        self
    }

    pub fn with_custom(mut self, identifier: impl Into<String>, values: Vec<f32>) -> Self {
        self.custom.push((identifier.into(), values));
        self
    }

    pub fn into_renderable(self) -> Arc<dyn Renderable> {
        Arc::new(self)
    }
}

impl Renderable for TestElement {
    fn texture(&self) -> &Arc<BaseTexture> {
        &self.texture
    }

    fn vertex_data(&self) -> &[f32] {
        &self.vertices
    }

    fn uvs(&self) -> &[f32] {
        &self.uvs
    }

    fn indices(&self) -> &[u32] {
        &self.indices
    }

    fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn world_alpha(&self) -> f32 {
        self.alpha
    }

    fn tint(&self) -> u32 {
        self.tint
    }

    fn custom_attribute(&self, identifier: &str) -> Option<CustomAttributeData<'_>> {
        self.custom
            .iter()
            .find(|(name, _)| name == identifier)
            .map(|(_, values)| CustomAttributeData::Float(values))
    }
}
