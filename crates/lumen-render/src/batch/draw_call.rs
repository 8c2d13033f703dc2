//! Pooled per-flush records.

use std::sync::Arc;

use crate::backend::PrimitiveType;
use crate::blend::BlendMode;
use crate::texture::BaseTexture;

/// One GPU draw over a contiguous index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawCall {
    /// Index of the texture set in the batcher's pool.
    pub texture_set: usize,
    pub blend: BlendMode,
    pub primitive: PrimitiveType,
    /// First index of the range.
    pub start: u32,
    /// Number of indices.
    pub size: u32,
}

/// Textures bound together for a run of draw calls, with their slots.
#[derive(Debug, Clone, Default)]
pub struct TextureSet {
    pub elements: Vec<Option<Arc<BaseTexture>>>,
    /// Slot assigned to the texture at the same position in `elements`.
    pub ids: Vec<u32>,
    pub count: usize,
}

impl TextureSet {
    pub fn with_capacity(max_textures: usize) -> Self {
        Self {
            elements: vec![None; max_textures],
            ids: vec![0; max_textures],
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.elements.len()
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.elements.len()
    }

    pub fn push(&mut self, texture: Arc<BaseTexture>) {
        self.elements[self.count] = Some(texture);
        self.count += 1;
    }

    /// Textures and slots currently in the set.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<BaseTexture>, u32)> {
        self.elements[..self.count]
            .iter()
            .zip(&self.ids)
            .filter_map(|(texture, &slot)| texture.as_ref().map(|t| (t, slot)))
    }

    /// Release the held textures.
    pub fn clear(&mut self) {
        for element in &mut self.elements[..self.count] {
            *element = None;
        }
        self.count = 0;
    }
}
