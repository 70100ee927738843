//! Immutable byte chunk appended to the ring buffer by a producer.

use std::sync::Arc;

/// A shareable, immutable block of PCM bytes.
///
/// The bytes live behind an `Arc` so the same allocation can sit in a ring
/// buffer queue and in a consumer at the same time. `size` may be smaller
/// than the backing allocation when the chunk wraps a partially filled
/// frame buffer; only the first `size` bytes belong to the chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Arc<Vec<u8>>,
    size: usize,
    /// Capture time in producer-defined ticks, if known.
    pub timestamp: Option<u64>,
    /// Originating speaker / user id, if known.
    pub tag: Option<String>,
}

impl Chunk {
    pub fn new(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            data: Arc::new(data),
            size,
            timestamp: None,
            tag: None,
        }
    }

    /// Wrap an already shared allocation. `size` is clamped to its length.
    pub fn from_shared(data: Arc<Vec<u8>>, size: usize) -> Self {
        let size = size.min(data.len());
        Self {
            data,
            size,
            timestamp: None,
            tag: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// `true` if both chunks reference the same allocation.
    pub fn shares_data_with(&self, other: &Chunk) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(data: Vec<u8>) -> Self {
        Chunk::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_shared_clamps_size_to_allocation() {
        let data = Arc::new(vec![1u8, 2, 3]);
        let chunk = Chunk::from_shared(Arc::clone(&data), 10);
        assert_eq!(chunk.size(), 3);

        let partial = Chunk::from_shared(data, 2);
        assert_eq!(partial.as_bytes(), &[1, 2]);
    }

    #[test]
    fn clones_share_the_same_bytes() {
        let chunk = Chunk::new(vec![9; 32]).with_tag("speaker-1").with_timestamp(42);
        let copy = chunk.clone();
        assert!(chunk.shares_data_with(&copy));
        assert_eq!(copy.tag.as_deref(), Some("speaker-1"));
        assert_eq!(copy.timestamp, Some(42));
    }
}
