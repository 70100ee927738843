//! Stock [`AudioSink`] implementations.
//!
//! - [`RingBufferSink`] fans one pump out to any number of ring buffers,
//!   each of which can feed its own [`RingBufferReader`] (and pump).
//! - [`ChannelSink`] forwards everything over a crossbeam channel.
//!
//! [`RingBufferReader`]: crate::audio::reader::RingBufferReader

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audio::reader::{ReaderConfig, RingBufferReader};
use crate::audio::{AudioFormat, AudioFrame, AudioSink};
use crate::buffering::RingBuffer;

/// Shares each frame into every attached ring as a zero-copy chunk.
///
/// Holding the frame buffer in the rings means the pump allocates a fresh
/// buffer for the next frame until the readers have drained it.
///
/// Rings are finished only by the zero-length end-of-stream frame. A pump
/// that is stopped and restarted on the same sink leaves its readers
/// waiting for the next session. Rings whose reader has been dropped are
/// pruned on the next frame.
#[derive(Clone, Default)]
pub struct RingBufferSink {
    outputs: Arc<Mutex<Vec<Arc<RingBuffer>>>>,
    format: Arc<Mutex<Option<AudioFormat>>>,
}

impl RingBufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new ring and return a reader over it.
    ///
    /// Readers attached mid-session only see frames delivered afterwards.
    /// The reader reports `format` as given, since it may be created
    /// before the pump has announced one.
    pub fn add_reader(&self, format: AudioFormat, config: ReaderConfig) -> RingBufferReader {
        let ring = Arc::new(RingBuffer::new());
        self.outputs.lock().push(Arc::clone(&ring));
        debug!(readers = self.reader_count(), "ring reader attached");
        RingBufferReader::with_config(ring, format, config)
    }

    /// Detach a ring previously returned through [`add_reader`](Self::add_reader).
    pub fn remove_reader(&self, reader: &RingBufferReader) {
        let mut outputs = self.outputs.lock();
        outputs.retain(|ring| !Arc::ptr_eq(ring, reader.ring()));
        reader.ring().finish();
    }

    pub fn reader_count(&self) -> usize {
        self.outputs.lock().len()
    }

    /// Format most recently announced by the pump.
    pub fn current_format(&self) -> Option<AudioFormat> {
        *self.format.lock()
    }
}

impl AudioSink for RingBufferSink {
    fn set_format(&mut self, format: Option<&AudioFormat>) {
        *self.format.lock() = format.copied();
        if format.is_some() {
            for ring in self.outputs.lock().iter() {
                ring.reopen();
            }
        }
    }

    fn process_audio(&mut self, frame: AudioFrame) {
        let mut outputs = self.outputs.lock();
        let before = outputs.len();
        // The sink's own handle is the last one once the reader is gone.
        outputs.retain(|ring| Arc::strong_count(ring) > 1);
        if outputs.len() < before {
            debug!(
                pruned = before - outputs.len(),
                readers = outputs.len(),
                "dropped ring readers pruned"
            );
        }

        if frame.is_empty() {
            for ring in outputs.iter() {
                ring.finish();
            }
            return;
        }
        let chunk = frame.to_chunk();
        for ring in outputs.iter() {
            ring.append(chunk.clone());
        }
    }
}

/// Message forwarded by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum SinkMessage {
    Format(AudioFormat),
    Audio(AudioFrame),
    EndOfStream,
}

/// Sends every sink call as a [`SinkMessage`] on a crossbeam channel.
///
/// Frames are forwarded as-is, so the receiver keeps the pump's buffer
/// alive until it drops the message.
pub struct ChannelSink {
    tx: Sender<SinkMessage>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(tx: Sender<SinkMessage>) -> Self {
        Self {
            tx,
            disconnected: false,
        }
    }

    /// Unbounded channel pair.
    pub fn unbounded() -> (Self, Receiver<SinkMessage>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    fn send(&mut self, message: SinkMessage) {
        if self.disconnected {
            return;
        }
        if self.tx.send(message).is_err() {
            warn!("channel sink receiver dropped; discarding further audio");
            self.disconnected = true;
        }
    }
}

impl AudioSink for ChannelSink {
    fn set_format(&mut self, format: Option<&AudioFormat>) {
        match format {
            Some(format) => self.send(SinkMessage::Format(*format)),
            None => self.send(SinkMessage::EndOfStream),
        }
    }

    fn process_audio(&mut self, frame: AudioFrame) {
        self.send(SinkMessage::Audio(frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioSource;

    fn frame(bytes: &[u8], sequence: u64) -> AudioFrame {
        AudioFrame::new(Arc::new(bytes.to_vec()), bytes.len(), sequence)
    }

    fn fast() -> ReaderConfig {
        ReaderConfig {
            poll_interval_ms: 1,
        }
    }

    #[test]
    fn ring_sink_fans_out_to_every_reader() {
        let mut sink = RingBufferSink::new();
        let fmt = AudioFormat::default();
        let mut a = sink.add_reader(fmt, fast());
        let mut b = sink.add_reader(fmt, fast());

        sink.set_format(Some(&fmt));
        sink.process_audio(frame(&[1, 2, 3], 0));
        sink.process_audio(frame(&[4], 1));
        sink.process_audio(frame(&[], 2));
        sink.set_format(None);

        for reader in [&mut a, &mut b] {
            let mut buf = [0u8; 8];
            assert_eq!(reader.read(&mut buf).expect("read"), 4);
            assert_eq!(&buf[..4], &[1, 2, 3, 4]);
            assert_eq!(reader.read(&mut buf).expect("read"), 0);
        }
    }

    #[test]
    fn ring_sink_shares_frame_buffers() {
        let mut sink = RingBufferSink::new();
        let reader = sink.add_reader(AudioFormat::default(), fast());

        let buffer = Arc::new(vec![0u8; 16]);
        sink.process_audio(AudioFrame::new(Arc::clone(&buffer), 16, 0));
        assert_eq!(Arc::strong_count(&buffer), 2, "ring holds the frame buffer");

        let mut out = [0u8; 16];
        reader.ring().drain(&mut out);
        assert_eq!(Arc::strong_count(&buffer), 1, "draining releases it");
    }

    #[test]
    fn removed_reader_stops_receiving_and_sees_eof() {
        let mut sink = RingBufferSink::new();
        let mut reader = sink.add_reader(AudioFormat::default(), fast());
        sink.remove_reader(&reader);
        assert_eq!(sink.reader_count(), 0);

        sink.process_audio(frame(&[1, 2], 0));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).expect("read"), 0);
    }

    #[test]
    fn ring_sink_survives_a_stopped_session() {
        let mut sink = RingBufferSink::new();
        let fmt = AudioFormat::default();
        let mut reader = sink.add_reader(fmt, fast());
        let mut buf = [0u8; 8];

        // Stopped session: no end-of-stream frame before the format clears.
        sink.set_format(Some(&fmt));
        sink.process_audio(frame(&[1, 2, 3, 4], 0));
        sink.set_format(None);
        assert!(!reader.ring().is_finished());
        assert_eq!(reader.read(&mut buf[..4]).expect("read"), 4);

        sink.set_format(Some(&fmt));
        sink.process_audio(frame(&[5, 6], 0));
        sink.process_audio(frame(&[], 1));
        sink.set_format(None);
        assert_eq!(reader.read(&mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], &[5, 6]);
        assert_eq!(reader.read(&mut buf).expect("read"), 0);
    }

    #[test]
    fn next_session_reopens_finished_rings() {
        let mut sink = RingBufferSink::new();
        let fmt = AudioFormat::default();
        let mut reader = sink.add_reader(fmt, fast());

        sink.set_format(Some(&fmt));
        sink.process_audio(frame(&[], 0));
        sink.set_format(None);
        assert!(reader.ring().is_finished());

        sink.set_format(Some(&fmt));
        assert!(!reader.ring().is_finished());
        sink.process_audio(frame(&[9, 9], 0));
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).expect("read"), 2);
    }

    #[test]
    fn dropped_readers_are_pruned() {
        let mut sink = RingBufferSink::new();
        let kept = sink.add_reader(AudioFormat::default(), fast());
        let dropped = sink.add_reader(AudioFormat::default(), fast());
        assert_eq!(sink.reader_count(), 2);

        drop(dropped);
        sink.process_audio(frame(&[1], 0));
        assert_eq!(sink.reader_count(), 1);
        assert_eq!(kept.ring().current_size(), 1);
    }

    #[test]
    fn channel_sink_forwards_session_messages() {
        let (mut sink, rx) = ChannelSink::unbounded();
        let fmt = AudioFormat::default();
        sink.set_format(Some(&fmt));
        sink.process_audio(frame(&[7, 7], 0));
        sink.set_format(None);

        assert!(matches!(rx.recv(), Ok(SinkMessage::Format(f)) if f == fmt));
        match rx.recv() {
            Ok(SinkMessage::Audio(f)) => assert_eq!(f.bytes(), &[7, 7]),
            other => panic!("expected audio, got {other:?}"),
        }
        assert!(matches!(rx.recv(), Ok(SinkMessage::EndOfStream)));
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::unbounded();
        drop(rx);
        sink.process_audio(frame(&[1], 0));
        sink.process_audio(frame(&[2], 1));
        assert!(sink.disconnected);
    }
}
