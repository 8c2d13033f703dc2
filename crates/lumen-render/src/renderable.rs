//! The element contract the batcher consumes, and a quad [`Sprite`].

use std::sync::Arc;

use lumen_core::math::{Affine2, Vec2};

use crate::blend::BlendMode;
use crate::texture::BaseTexture;

/// Values an element supplies for a custom vertex attribute.
///
/// Either one tuple per vertex, or a single tuple broadcast to every vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CustomAttributeData<'a> {
    /// Float words, written through the float view.
    Float(&'a [f32]),
    /// Raw 32-bit words, written through the integer view.
    Uint(&'a [u32]),
}

impl CustomAttributeData<'_> {
    pub fn len(&self) -> usize {
        match self {
            CustomAttributeData::Float(values) => values.len(),
            CustomAttributeData::Uint(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Word at `index` as raw bits.
    #[inline]
    pub fn word(&self, index: usize) -> u32 {
        match self {
            CustomAttributeData::Float(values) => values[index].to_bits(),
            CustomAttributeData::Uint(values) => values[index],
        }
    }
}

/// Anything the batcher can draw.
///
/// Positions are world-space `x, y` pairs. `uvs` has the same length as
/// `vertex_data`, and every index is below `vertex_data().len() / 2`.
pub trait Renderable: Send + Sync {
    fn texture(&self) -> &Arc<BaseTexture>;

    fn vertex_data(&self) -> &[f32];

    fn uvs(&self) -> &[f32];

    fn indices(&self) -> &[u32];

    fn blend_mode(&self) -> BlendMode {
        BlendMode::Normal
    }

    /// Alpha after multiplying through the scene graph.
    fn world_alpha(&self) -> f32 {
        1.0
    }

    /// Tint as `0xRRGGBB`.
    fn tint(&self) -> u32 {
        0xffffff
    }

    /// Data for a custom attribute declared in the batcher's vertex layout.
    fn custom_attribute(&self, _identifier: &str) -> Option<CustomAttributeData<'_>> {
        None
    }

    fn vertex_count(&self) -> usize {
        self.vertex_data().len() / 2
    }
}

/// Normalized UV rectangle of a sprite within its texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteFrame {
    /// U coordinate of the left edge
    pub u_min: f32,
    /// V coordinate of the top edge
    pub v_min: f32,
    /// U coordinate of the right edge
    pub u_max: f32,
    /// V coordinate of the bottom edge
    pub v_max: f32,
}

impl SpriteFrame {
    /// The whole texture.
    pub const FULL: SpriteFrame = SpriteFrame::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(u_min: f32, v_min: f32, u_max: f32, v_max: f32) -> Self {
        Self {
            u_min,
            v_min,
            u_max,
            v_max,
        }
    }

    /// Frame covering a pixel rectangle of a `texture_width` x `texture_height` texture.
    pub fn from_pixels(x: u32, y: u32, w: u32, h: u32, texture_width: u32, texture_height: u32) -> Self {
        let tw = texture_width.max(1) as f32;
        let th = texture_height.max(1) as f32;
        Self::new(
            x as f32 / tw,
            y as f32 / th,
            (x + w) as f32 / tw,
            (y + h) as f32 / th,
        )
    }
}

impl Default for SpriteFrame {
    fn default() -> Self {
        Self::FULL
    }
}

/// Quad winding shared by every sprite.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// A textured quad.
///
/// Corners are emitted top-left, top-right, bottom-right, bottom-left.
///
/// # Example
///
/// ```
/// use lumen_core::math::{Affine2, Vec2};
/// use lumen_render::{AlphaMode, BaseTexture, BlendMode, Renderable, Sprite};
///
/// let texture = BaseTexture::new(64, 64, AlphaMode::Premultiplied);
/// let sprite = Sprite::new(texture)
///     .with_transform(Affine2::from_translation(Vec2::new(10.0, 20.0)))
///     .with_blend_mode(BlendMode::Add);
///
/// assert_eq!(sprite.vertex_data()[..2], [10.0, 20.0]);
/// assert_eq!(sprite.indices().len(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct Sprite {
    texture: Arc<BaseTexture>,
    transform: Affine2,
    size: Vec2,
    anchor: Vec2,
    frame: SpriteFrame,
    tint: u32,
    alpha: f32,
    blend_mode: BlendMode,
    vertices: [f32; 8],
    uvs: [f32; 8],
}

impl Sprite {
    /// A sprite the size of its texture at the origin.
    pub fn new(texture: Arc<BaseTexture>) -> Self {
        let size = Vec2::new(texture.width() as f32, texture.height() as f32);
        let mut sprite = Self {
            texture,
            transform: Affine2::IDENTITY,
            size,
            anchor: Vec2::ZERO,
            frame: SpriteFrame::FULL,
            tint: 0xffffff,
            alpha: 1.0,
            blend_mode: BlendMode::Normal,
            vertices: [0.0; 8],
            uvs: [0.0; 8],
        };
        sprite.update_vertices();
        sprite.update_uvs();
        sprite
    }

    pub fn with_transform(mut self, transform: Affine2) -> Self {
        self.set_transform(transform);
        self
    }

    pub fn with_size(mut self, size: Vec2) -> Self {
        self.size = size;
        self.update_vertices();
        self
    }

    /// Anchor in normalized sprite space. `(0.5, 0.5)` centers the quad on its origin.
    pub fn with_anchor(mut self, anchor: Vec2) -> Self {
        self.anchor = anchor;
        self.update_vertices();
        self
    }

    pub fn with_frame(mut self, frame: SpriteFrame) -> Self {
        self.frame = frame;
        self.update_uvs();
        self
    }

    pub fn with_tint(mut self, tint: u32) -> Self {
        self.tint = tint & 0xffffff;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Replace the world transform and recompute the corners.
    pub fn set_transform(&mut self, transform: Affine2) {
        self.transform = transform;
        self.update_vertices();
    }

    pub fn transform(&self) -> Affine2 {
        self.transform
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    fn update_vertices(&mut self) {
        let min = -self.anchor * self.size;
        let max = min + self.size;
        let corners = [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ];
        for (i, corner) in corners.into_iter().enumerate() {
            let world = self.transform.transform_point2(corner);
            self.vertices[i * 2] = world.x;
            self.vertices[i * 2 + 1] = world.y;
        }
    }

    fn update_uvs(&mut self) {
        let f = self.frame;
        self.uvs = [
            f.u_min, f.v_min, f.u_max, f.v_min, f.u_max, f.v_max, f.u_min, f.v_max,
        ];
    }
}

impl Renderable for Sprite {
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
        &QUAD_INDICES
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

    fn vertex_count(&self) -> usize {
        4
    }
}
