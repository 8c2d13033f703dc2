//! Texture handles as seen by the batcher.
//!
//! A [`BaseTexture`] carries two bookkeeping fields the batcher writes while
//! grouping: the tick it was last admitted under and the slot it was assigned.
//! Checking "is this texture already in the current group" is a single
//! comparison against the tick, with no per-flush set to clear.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Global counter for generating unique texture IDs.
static TEXTURE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Global batch tick shared by every batcher in the process.
static BATCH_TICK: AtomicU64 = AtomicU64::new(0);

/// Sentinel for a texture that holds no slot.
pub const NO_LOCATION: u32 = u32::MAX;

/// Advance the global batch tick and return the new value.
///
/// Every value handed out is unique, so a texture stamped by one group (or one
/// batcher) never looks admitted to another.
pub fn next_batch_tick() -> u64 {
    BATCH_TICK.fetch_add(1, Ordering::Relaxed) + 1
}

/// Unique identifier for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

impl TextureId {
    /// Generate a new unique texture ID.
    pub fn new() -> Self {
        Self(TEXTURE_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TextureId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a texture's color channels relate to its alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Straight alpha. Color is stored unscaled.
    NoPremultipliedAlpha,
    /// Source data is already premultiplied.
    Premultiplied,
    /// Color is premultiplied while uploading.
    #[default]
    PremultiplyOnUpload,
}

/// A texture the batcher can group and bind.
#[derive(Debug)]
pub struct BaseTexture {
    id: TextureId,
    width: u32,
    height: u32,
    alpha_mode: AlphaMode,
    valid: AtomicBool,
    batch_tick: AtomicU64,
    batch_location: AtomicU32,
}

impl BaseTexture {
    /// Create a loaded texture.
    pub fn new(width: u32, height: u32, alpha_mode: AlphaMode) -> Arc<Self> {
        Arc::new(Self::with_validity(width, height, alpha_mode, true))
    }

    /// Create a texture whose data has not arrived yet.
    ///
    /// Elements using it are skipped until [`set_valid`](Self::set_valid) is called.
    pub fn pending(width: u32, height: u32, alpha_mode: AlphaMode) -> Arc<Self> {
        Arc::new(Self::with_validity(width, height, alpha_mode, false))
    }

    fn with_validity(width: u32, height: u32, alpha_mode: AlphaMode, valid: bool) -> Self {
        Self {
            id: TextureId::new(),
            width,
            height,
            alpha_mode,
            valid: AtomicBool::new(valid),
            batch_tick: AtomicU64::new(0),
            batch_location: AtomicU32::new(NO_LOCATION),
        }
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    /// Whether sampled color is premultiplied by alpha.
    pub fn is_premultiplied(&self) -> bool {
        !matches!(self.alpha_mode, AlphaMode::NoPremultipliedAlpha)
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Mark the texture loaded (or lost).
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }

    /// Tick of the group this texture was last admitted to.
    pub fn batch_tick(&self) -> u64 {
        self.batch_tick.load(Ordering::Relaxed)
    }

    /// Slot assigned during the last flush, or [`NO_LOCATION`].
    pub fn batch_location(&self) -> u32 {
        self.batch_location.load(Ordering::Relaxed)
    }

    pub(crate) fn set_batch_tick(&self, tick: u64) {
        self.batch_tick.store(tick, Ordering::Relaxed);
    }

    pub(crate) fn set_batch_location(&self, location: u32) {
        self.batch_location.store(location, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = BaseTexture::new(1, 1, AlphaMode::default());
        let b = BaseTexture::new(1, 1, AlphaMode::default());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_ticks_increase() {
        let first = next_batch_tick();
        let second = next_batch_tick();
        assert!(second > first);
    }

    #[test]
    fn test_premultiplied_modes() {
        assert!(BaseTexture::new(1, 1, AlphaMode::Premultiplied).is_premultiplied());
        assert!(BaseTexture::new(1, 1, AlphaMode::PremultiplyOnUpload).is_premultiplied());
        assert!(!BaseTexture::new(1, 1, AlphaMode::NoPremultipliedAlpha).is_premultiplied());
    }

    #[test]
    fn test_pending_becomes_valid() {
        let texture = BaseTexture::pending(16, 16, AlphaMode::default());
        assert!(!texture.is_valid());
        assert_eq!(texture.batch_location(), NO_LOCATION);
        texture.set_valid(true);
        assert!(texture.is_valid());
    }
}
