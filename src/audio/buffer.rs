//! Lock-free ring buffer for PCM chunks
//!
//! Hands received chunks from a stream receiver thread to the real-time
//! playback callback without locking.

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free ring buffer of PCM chunks
pub struct RingBuffer {
    queue: ArrayQueue<Bytes>,
    overflow_count: AtomicUsize,
    underrun_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            underrun_count: AtomicUsize::new(0),
        }
    }

    /// Push a chunk into the buffer
    /// Returns false if buffer is full (overflow)
    pub fn push(&self, chunk: Bytes) -> bool {
        match self.queue.push(chunk) {
            Ok(()) => true,
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop a chunk from the buffer
    /// Returns None if buffer is empty (underrun)
    pub fn pop(&self) -> Option<Bytes> {
        match self.queue.pop() {
            Some(chunk) => Some(chunk),
            None => {
                self.underrun_count.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn underrun_count(&self) -> usize {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// Get fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        self.len() as f32 / self.capacity() as f32
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}

/// Drains a ring buffer sample by sample for an output callback
///
/// Keeps the partially consumed chunk between callbacks. Missing data is
/// rendered as silence.
pub struct ChunkReader {
    buffer: SharedRingBuffer,
    current: Bytes,
    offset: usize,
}

impl ChunkReader {
    pub fn new(buffer: SharedRingBuffer) -> Self {
        Self {
            buffer,
            current: Bytes::new(),
            offset: 0,
        }
    }

    /// Next little-endian `i16` sample, or `None` on underrun
    pub fn next_i16(&mut self) -> Option<i16> {
        self.next_bytes::<2>().map(i16::from_le_bytes)
    }

    /// Next little-endian `f32` sample, or `None` on underrun
    pub fn next_f32(&mut self) -> Option<f32> {
        self.next_bytes::<4>().map(f32::from_le_bytes)
    }

    fn next_bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.offset + N > self.current.len() {
            self.current = self.buffer.pop()?;
            self.offset = 0;
            if self.current.len() < N {
                return None;
            }
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.current[self.offset..self.offset + N]);
        self.offset += N;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::new(2);

        assert!(buffer.push(Bytes::from_static(b"aa")));
        assert!(buffer.push(Bytes::from_static(b"bb")));
        assert!(!buffer.push(Bytes::from_static(b"cc")));
        assert_eq!(buffer.overflow_count(), 1);
        assert_eq!(buffer.fill_level(), 1.0);

        assert_eq!(buffer.pop().unwrap().as_ref(), b"aa");
        assert_eq!(buffer.pop().unwrap().as_ref(), b"bb");
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_chunk_reader_spans_chunks() {
        let buffer = create_shared_buffer(4);
        let mut first = Vec::new();
        first.extend_from_slice(&1i16.to_le_bytes());
        first.extend_from_slice(&(-2i16).to_le_bytes());
        buffer.push(Bytes::from(first));
        buffer.push(Bytes::from(3i16.to_le_bytes().to_vec()));

        let mut reader = ChunkReader::new(buffer);
        assert_eq!(reader.next_i16(), Some(1));
        assert_eq!(reader.next_i16(), Some(-2));
        assert_eq!(reader.next_i16(), Some(3));
        assert_eq!(reader.next_i16(), None);
    }
}
