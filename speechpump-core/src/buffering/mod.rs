//! Unbounded FIFO byte queue built from variable-sized chunks.
//!
//! Producers append whole [`Chunk`]s; the consumer drains arbitrary byte
//! counts that may start and end anywhere inside a chunk. A cursor into the
//! front chunk remembers how much of it has already been handed out.
//!
//! One producer thread and one consumer thread may use a `RingBuffer`
//! concurrently (wrap it in an `Arc`). Neither side ever blocks on the
//! other beyond the short internal lock.
//!
//! Every byte has an absolute stream position. `write_pos` is the position
//! of the next appended byte and `read_pos` that of the next drained one,
//! so `write_pos - read_pos` is always [`RingBuffer::current_size`]. Both
//! start at the initial position (0 unless built with
//! [`RingBuffer::with_init_pos`]).

pub mod chunk;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

pub use chunk::Chunk;

#[derive(Debug, Default)]
struct Queue {
    chunks: VecDeque<Chunk>,
    /// Bytes of `chunks.front()` already drained.
    front_offset: usize,
    /// Undrained bytes across all queued chunks.
    buffered: usize,
    read_pos: u64,
    write_pos: u64,
}

/// Chunked SPSC byte queue.
#[derive(Debug, Default)]
pub struct RingBuffer {
    queue: Mutex<Queue>,
    finished: AtomicBool,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ring whose first byte sits at stream position `pos`.
    pub fn with_init_pos(pos: u64) -> Self {
        Self {
            queue: Mutex::new(Queue {
                read_pos: pos,
                write_pos: pos,
                ..Queue::default()
            }),
            finished: AtomicBool::new(false),
        }
    }

    /// Queue a chunk behind everything already buffered. Never blocks.
    ///
    /// Empty chunks carry no bytes and are not queued.
    pub fn append(&self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }
        let mut q = self.queue.lock();
        q.buffered += chunk.size();
        q.write_pos += chunk.size() as u64;
        q.chunks.push_back(chunk);
    }

    /// Copy up to `destination.len()` buffered bytes into `destination`.
    ///
    /// Returns the number of bytes copied, which is short (possibly 0)
    /// whenever less data is buffered than requested.
    pub fn drain(&self, destination: &mut [u8]) -> usize {
        let mut q = self.queue.lock();
        let mut copied = 0;

        while copied < destination.len() {
            let offset = q.front_offset;
            let Some(front) = q.chunks.front() else {
                break;
            };

            let available = &front.as_bytes()[offset..];
            let n = available.len().min(destination.len() - copied);
            destination[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            let exhausted = n == available.len();

            if exhausted {
                q.chunks.pop_front();
                q.front_offset = 0;
            } else {
                q.front_offset += n;
            }
        }

        q.buffered -= copied;
        q.read_pos += copied as u64;
        copied
    }

    /// Copy buffered bytes starting at absolute position `pos` without
    /// consuming them.
    ///
    /// Returns 0 when `pos` is outside `read_pos..write_pos`, i.e. already
    /// drained or not yet written.
    pub fn read_at(&self, pos: u64, destination: &mut [u8]) -> usize {
        let q = self.queue.lock();
        if pos < q.read_pos || pos >= q.write_pos {
            return 0;
        }

        // Offset of `pos` within the front chunk's full payload.
        let mut skip = (pos - q.read_pos) as usize + q.front_offset;
        let mut copied = 0;
        for chunk in &q.chunks {
            if copied == destination.len() {
                break;
            }
            let bytes = chunk.as_bytes();
            if skip >= bytes.len() {
                skip -= bytes.len();
                continue;
            }
            let available = &bytes[skip..];
            let n = available.len().min(destination.len() - copied);
            destination[copied..copied + n].copy_from_slice(&available[..n]);
            copied += n;
            skip = 0;
        }
        copied
    }

    /// Drain at most `requested` bytes into the front of `destination`.
    pub fn drain_up_to(&self, destination: &mut [u8], requested: usize) -> usize {
        let end = requested.min(destination.len());
        self.drain(&mut destination[..end])
    }

    /// Undrained bytes currently buffered.
    pub fn current_size(&self) -> usize {
        self.queue.lock().buffered
    }

    /// Number of chunks still (partially) queued.
    pub fn chunk_count(&self) -> usize {
        self.queue.lock().chunks.len()
    }

    /// Absolute position of the next byte [`drain`](Self::drain) returns.
    pub fn read_pos(&self) -> u64 {
        self.queue.lock().read_pos
    }

    /// Absolute position the next appended byte will get.
    pub fn write_pos(&self) -> u64 {
        self.queue.lock().write_pos
    }

    /// Drop all buffered data without consuming it.
    pub fn clear(&self) {
        self.reset_read_pos();
    }

    /// Skip everything buffered by moving `read_pos` up to `write_pos`.
    /// Returns the new read position.
    pub fn reset_read_pos(&self) -> u64 {
        let mut q = self.queue.lock();
        q.chunks.clear();
        q.front_offset = 0;
        q.buffered = 0;
        q.read_pos = q.write_pos;
        q.read_pos
    }

    /// Mark that the producer will not append any more chunks.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Undo [`finish`](Self::finish) when the producer resumes.
    ///
    /// A reader that already observed end of stream has returned 0 and is
    /// not revived; only readers still polling see the new data.
    pub fn reopen(&self) {
        self.finished.store(false, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Finished and fully drained: a reader has reached end of stream.
    pub fn is_drained(&self) -> bool {
        // Load `finished` first: an append that races with this call
        // happens before `finish()`, so it is visible in `current_size()`.
        self.is_finished() && self.current_size() == 0
    }
}
