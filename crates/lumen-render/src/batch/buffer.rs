//! Scratch buffers reused across flushes.
//!
//! # Viewable Buffer
//!
//! A word-aligned byte region with float, integer and byte views over the same
//! storage. Interleaved vertex data mixes `f32` positions with packed `u32`
//! colors, so both views are needed.
//!
//! # Scratch Pool
//!
//! Buffers are kept in power-of-two buckets keyed by required size. A flush
//! takes the buffer for its bucket, packs into it, and puts it back.
//!
//! ```
//! use lumen_render::batch::ScratchPool;
//!
//! let mut pool = ScratchPool::new(6);
//!
//! // 100 vertices round up to 128
//! let buffer = pool.take_attribute_buffer(100);
//! assert_eq!(buffer.len_words(), 128 * 6);
//! pool.release_attribute_buffer(buffer);
//!
//! // Same bucket, no new allocation
//! let buffer = pool.take_attribute_buffer(120);
//! pool.release_attribute_buffer(buffer);
//! assert_eq!(pool.bucket_count(), 1);
//! ```

use tracing::debug;

/// Attribute buffers are sized in multiples of this many vertices.
pub const ATTRIBUTE_GRANULARITY: usize = 8;

/// Index buffers are sized in multiples of this many indices.
pub const INDEX_GRANULARITY: usize = 12;

/// Bucket index and rounded size for `count` items at `granularity`.
///
/// The rounded size is `next_pow2(ceil(count / granularity)) * granularity`
/// and the bucket is the log2 of that power of two.
pub fn bucket_for(count: usize, granularity: usize) -> (usize, usize) {
    let p2 = count.div_ceil(granularity).max(1).next_power_of_two();
    (p2.trailing_zeros() as usize, p2 * granularity)
}

/// A word buffer with typed views over the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewableBuffer {
    words: Vec<u32>,
}

impl ViewableBuffer {
    /// Create a zeroed buffer of `words` 32-bit words.
    pub fn new(words: usize) -> Self {
        Self {
            words: vec![0; words],
        }
    }

    pub fn len_words(&self) -> usize {
        self.words.len()
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    pub fn float32_view(&self) -> &[f32] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn float32_view_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    pub fn uint32_view(&self) -> &[u32] {
        &self.words
    }

    pub fn uint32_view_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    /// The backing storage as bytes, ready for upload.
    pub fn raw_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }
}

/// Bucketed attribute and index buffers owned by one batcher.
///
/// Buffers are created lazily, never shrunk, and live until the pool is dropped.
#[derive(Debug)]
pub struct ScratchPool {
    stride_words: usize,
    attribute_buffers: Vec<Option<ViewableBuffer>>,
    index_buffers: Vec<Option<ViewableBuffer>>,
    created: usize,
}

impl ScratchPool {
    /// Create an empty pool for vertices of `stride_words` words each.
    pub fn new(stride_words: usize) -> Self {
        Self {
            stride_words,
            attribute_buffers: Vec::new(),
            index_buffers: Vec::new(),
            created: 0,
        }
    }

    pub fn stride_words(&self) -> usize {
        self.stride_words
    }

    /// Take the attribute buffer able to hold `vertices` vertices.
    pub fn take_attribute_buffer(&mut self, vertices: usize) -> ViewableBuffer {
        let (bucket, rounded) = bucket_for(vertices, ATTRIBUTE_GRANULARITY);
        let words = rounded * self.stride_words;
        take_or_create(&mut self.attribute_buffers, &mut self.created, bucket, words, "attribute")
    }

    /// Return an attribute buffer taken with [`take_attribute_buffer`](Self::take_attribute_buffer).
    pub fn release_attribute_buffer(&mut self, buffer: ViewableBuffer) {
        let vertices = buffer.len_words() / self.stride_words.max(1);
        let (bucket, _) = bucket_for(vertices, ATTRIBUTE_GRANULARITY);
        put_back(&mut self.attribute_buffers, bucket, buffer);
    }

    /// Take the index buffer able to hold `indices` indices.
    pub fn take_index_buffer(&mut self, indices: usize) -> ViewableBuffer {
        let (bucket, rounded) = bucket_for(indices, INDEX_GRANULARITY);
        take_or_create(&mut self.index_buffers, &mut self.created, bucket, rounded, "index")
    }

    /// Return an index buffer taken with [`take_index_buffer`](Self::take_index_buffer).
    pub fn release_index_buffer(&mut self, buffer: ViewableBuffer) {
        let (bucket, _) = bucket_for(buffer.len_words(), INDEX_GRANULARITY);
        put_back(&mut self.index_buffers, bucket, buffer);
    }

    /// Number of buffers created so far, across both kinds.
    pub fn bucket_count(&self) -> usize {
        self.created
    }

    /// Total bytes held by buffers currently in the pool.
    pub fn total_bytes(&self) -> usize {
        self.attribute_buffers
            .iter()
            .chain(self.index_buffers.iter())
            .flatten()
            .map(ViewableBuffer::byte_len)
            .sum()
    }

    /// Drop every cached buffer.
    pub fn clear(&mut self) {
        self.attribute_buffers.clear();
        self.index_buffers.clear();
        self.created = 0;
    }
}

fn take_or_create(
    buckets: &mut Vec<Option<ViewableBuffer>>,
    created: &mut usize,
    bucket: usize,
    words: usize,
    kind: &str,
) -> ViewableBuffer {
    if bucket >= buckets.len() {
        buckets.resize_with(bucket + 1, || None);
    }
    match buckets[bucket].take() {
        Some(buffer) => buffer,
        None => {
            debug!("Creating {} scratch buffer: bucket {}, {} words", kind, bucket, words);
            *created += 1;
            ViewableBuffer::new(words)
        }
    }
}

fn put_back(buckets: &mut Vec<Option<ViewableBuffer>>, bucket: usize, buffer: ViewableBuffer) {
    if bucket >= buckets.len() {
        buckets.resize_with(bucket + 1, || None);
    }
    buckets[bucket] = Some(buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_rounding() {
        assert_eq!(bucket_for(0, 8), (0, 8));
        assert_eq!(bucket_for(1, 8), (0, 8));
        assert_eq!(bucket_for(8, 8), (0, 8));
        assert_eq!(bucket_for(9, 8), (1, 16));
        assert_eq!(bucket_for(100, 8), (4, 128));
        assert_eq!(bucket_for(18, 12), (1, 24));
        assert_eq!(bucket_for(6 * 4096, 12), (11, 24576));
    }

    #[test]
    fn test_views_alias() {
        let mut buffer = ViewableBuffer::new(2);
        buffer.float32_view_mut()[0] = 1.0;
        buffer.uint32_view_mut()[1] = 0xff00_00ff;
        assert_eq!(buffer.uint32_view()[0], 1.0f32.to_bits());
        assert_eq!(&buffer.raw_bytes()[4..8], &[0xff, 0x00, 0x00, 0xff]);
        assert_eq!(buffer.byte_len(), 8);
    }

    #[test]
    fn test_pool_reuses_bucket() {
        let mut pool = ScratchPool::new(6);

        let buffer = pool.take_attribute_buffer(10);
        assert_eq!(buffer.len_words(), 16 * 6);
        pool.release_attribute_buffer(buffer);

        let buffer = pool.take_attribute_buffer(16);
        pool.release_attribute_buffer(buffer);
        assert_eq!(pool.bucket_count(), 1);

        let buffer = pool.take_attribute_buffer(17);
        assert_eq!(buffer.len_words(), 32 * 6);
        pool.release_attribute_buffer(buffer);
        assert_eq!(pool.bucket_count(), 2);
    }

    #[test]
    fn test_index_buckets_are_separate() {
        let mut pool = ScratchPool::new(6);
        let indices = pool.take_index_buffer(18);
        assert_eq!(indices.len_words(), 24);
        pool.release_index_buffer(indices);
        assert_eq!(pool.bucket_count(), 1);
        assert_eq!(pool.total_bytes(), 24 * 4);
    }

    #[test]
    fn test_clear() {
        let mut pool = ScratchPool::new(6);
        let buffer = pool.take_attribute_buffer(4);
        pool.release_attribute_buffer(buffer);
        pool.clear();
        assert_eq!(pool.bucket_count(), 0);
        assert_eq!(pool.total_bytes(), 0);
    }
}
