//! Batcher configuration.

use crate::error::{BatchError, BatchResult};
use crate::platform::PlatformInfo;

/// Default number of quads buffered before a forced flush.
pub const DEFAULT_BATCH_SIZE: u32 = 4096;

/// Largest batch size whose vertex capacity fits in a `u32`.
pub const MAX_BATCH_SIZE: u32 = u32::MAX / 4;

/// Default cap on geometry targets rotated through in one frame.
pub const DEFAULT_MAX_PACKED_GEOMETRIES: usize = 64;

/// Settings that shape a [`Batcher`](crate::batch::Batcher).
///
/// # Example
///
/// ```
/// use lumen_render::BatchSettings;
///
/// let settings = BatchSettings::new()
///     .batch_size(1024)
///     .max_textures(8);
/// assert_eq!(settings.vertex_capacity(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    /// Quads per flush. Vertex capacity is four times this.
    pub batch_size: u32,
    /// Cap on texture units. `None` uses the platform recommendation.
    pub max_textures: Option<u32>,
    /// Force a single texture unit.
    pub prefer_legacy: bool,
    /// Override for the platform's same-buffer upload probe.
    pub can_upload_same_buffer: Option<bool>,
    /// Upper bound on geometry targets rotated through in one frame.
    pub max_packed_geometries: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_textures: None,
            prefer_legacy: false,
            can_upload_same_buffer: None,
            max_packed_geometries: DEFAULT_MAX_PACKED_GEOMETRIES,
        }
    }
}

impl BatchSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of quads buffered per flush.
    pub fn batch_size(mut self, quads: u32) -> Self {
        self.batch_size = quads;
        self
    }

    /// Cap the texture units the batcher will use.
    pub fn max_textures(mut self, max_textures: u32) -> Self {
        self.max_textures = Some(max_textures);
        self
    }

    /// Force the single-texture path.
    pub fn prefer_legacy(mut self, prefer_legacy: bool) -> Self {
        self.prefer_legacy = prefer_legacy;
        self
    }

    /// Override whether a buffer may be re-uploaded mid-frame.
    pub fn can_upload_same_buffer(mut self, can_upload: bool) -> Self {
        self.can_upload_same_buffer = Some(can_upload);
        self
    }

    /// Bound the per-frame geometry rotation pool.
    pub fn max_packed_geometries(mut self, max: usize) -> Self {
        self.max_packed_geometries = max;
        self
    }

    /// Vertex capacity of one flush. Always a multiple of 4.
    pub fn vertex_capacity(&self) -> u32 {
        self.batch_size.saturating_mul(4)
    }

    /// Texture-unit cap after applying the legacy switch and platform default.
    pub fn resolved_max_textures(&self) -> u32 {
        if self.prefer_legacy {
            return 1;
        }
        self.max_textures
            .unwrap_or_else(|| PlatformInfo::get().recommended_max_textures())
    }

    /// Same-buffer upload policy after applying the platform probe.
    pub fn resolved_can_upload_same_buffer(&self) -> bool {
        self.can_upload_same_buffer
            .unwrap_or_else(|| PlatformInfo::get().can_upload_same_buffer())
    }

    /// Reject settings that cannot produce a working batcher.
    pub fn validate(&self) -> BatchResult<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(BatchError::InvalidBatchSize {
                size: self.batch_size,
            });
        }
        if self.max_textures == Some(0) {
            return Err(BatchError::InvalidMaxTextures { max_textures: 0 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = BatchSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.vertex_capacity(), DEFAULT_BATCH_SIZE * 4);
    }

    #[test]
    fn test_legacy_forces_single_texture() {
        let settings = BatchSettings::new().max_textures(16).prefer_legacy(true);
        assert_eq!(settings.resolved_max_textures(), 1);
    }

    #[test]
    fn test_zero_values_rejected() {
        assert_eq!(
            BatchSettings::new().batch_size(0).validate(),
            Err(BatchError::InvalidBatchSize { size: 0 })
        );
        assert_eq!(
            BatchSettings::new().max_textures(0).validate(),
            Err(BatchError::InvalidMaxTextures { max_textures: 0 })
        );
    }

    #[test]
    fn test_oversized_batch_rejected() {
        assert!(BatchSettings::new().batch_size(MAX_BATCH_SIZE).validate().is_ok());
        assert_eq!(
            BatchSettings::new().batch_size(MAX_BATCH_SIZE + 1).validate(),
            Err(BatchError::InvalidBatchSize {
                size: MAX_BATCH_SIZE + 1
            })
        );
        assert_eq!(BatchSettings::new().batch_size(u32::MAX).vertex_capacity(), u32::MAX);
    }

    #[test]
    fn test_upload_override() {
        let settings = BatchSettings::new().can_upload_same_buffer(false);
        assert!(!settings.resolved_can_upload_same_buffer());
    }
}
