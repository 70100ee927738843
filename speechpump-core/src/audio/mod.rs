//! Source and sink contracts consumed by the pump, plus their stock
//! implementations.
//!
//! ```text
//! MicrophoneCapture ─► RingBuffer ─► RingBufferReader ─┐
//! WAV file ───────────────────────► WavFileSource ─────┤ AudioSource
//!                                                      ▼
//!                                                  AudioPump
//!                                                      │ AudioSink
//!                      RingBufferSink / ChannelSink / WavFileSink
//! ```

pub mod capture;
pub mod format;
pub mod reader;
pub mod sinks;
pub mod wav;

use std::sync::Arc;

use crate::buffering::Chunk;
use crate::error::Result;

pub use format::AudioFormat;

/// Pull side of the pump: something that yields PCM bytes.
pub trait AudioSource: Send + 'static {
    /// Format of every byte this source will produce.
    fn format(&self) -> AudioFormat;

    /// Fill the front of `buffer` with up to `buffer.len()` bytes.
    ///
    /// May block until data is available. `Ok(0)` means end of stream and
    /// is permanent. An `Err` also ends the stream; the pump reports it and
    /// then treats it like end of stream.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

/// Push side of the pump: something that consumes PCM frames.
pub trait AudioSink: Send + 'static {
    /// `Some` before the first frame of a session, `None` after the last.
    fn set_format(&mut self, format: Option<&AudioFormat>);

    /// Consume one frame. A zero-length frame marks end of stream.
    ///
    /// The frame's buffer is reused by the pump only when nothing else
    /// holds it, so a sink may keep (clone) the frame for as long as it
    /// likes.
    fn process_audio(&mut self, frame: AudioFrame);
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn set_format(&mut self, format: Option<&AudioFormat>) {
        (**self).set_format(format)
    }

    fn process_audio(&mut self, frame: AudioFrame) {
        (**self).process_audio(frame)
    }
}

/// One pump iteration's worth of audio.
///
/// Cheap to clone: the bytes are shared, not copied.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    buffer: Arc<Vec<u8>>,
    len: usize,
    /// Zero-based frame number within the pump session.
    pub sequence: u64,
}

impl AudioFrame {
    pub fn new(buffer: Arc<Vec<u8>>, len: usize, sequence: u64) -> Self {
        let len = len.min(buffer.len());
        Self {
            buffer,
            len,
            sequence,
        }
    }

    /// The valid bytes of this frame.
    pub fn bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `true` if both frames were delivered in the same buffer allocation.
    pub fn shares_buffer_with(&self, other: &AudioFrame) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Address of the backing allocation, for identity checks in logs/tests.
    pub fn buffer_ptr(&self) -> *const u8 {
        self.buffer.as_ptr()
    }

    /// Zero-copy view of this frame as a ring buffer chunk.
    pub fn to_chunk(&self) -> Chunk {
        Chunk::from_shared(Arc::clone(&self.buffer), self.len).with_timestamp(self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_exposes_only_valid_bytes() {
        let frame = AudioFrame::new(Arc::new(vec![1, 2, 3, 4]), 2, 0);
        assert_eq!(frame.bytes(), &[1, 2]);
        assert_eq!(frame.len(), 2);
        assert!(!frame.is_empty());
    }

    #[test]
    fn chunk_view_shares_the_frame_buffer() {
        let buffer = Arc::new(vec![7u8; 8]);
        let frame = AudioFrame::new(Arc::clone(&buffer), 5, 3);
        let chunk = frame.to_chunk();
        assert_eq!(chunk.size(), 5);
        assert_eq!(chunk.timestamp, Some(3));
        // buffer + frame + chunk
        assert_eq!(Arc::strong_count(&buffer), 3);
    }
}
