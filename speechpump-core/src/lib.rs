//! # speechpump-core
//!
//! Real-time PCM audio plumbing: a chunked byte queue, source/sink
//! contracts, and a pump that moves fixed-duration frames between them on
//! a background thread.
//!
//! ## Architecture
//!
//! ```text
//! AudioSource ──read(frame_size)──► AudioPump worker ──process_audio──► AudioSink
//!      ▲                                 │                                  │
//!  RingBufferReader               state / condvar                    RingBufferSink
//!      ▲                                 │                                  │
//!  RingBuffer ◄── producer     broadcast::Sender<PumpStatusEvent>    more RingBuffers
//! ```
//!
//! Frame buffers are `Arc<Vec<u8>>`. The worker writes into the previous
//! buffer only when it holds the sole reference; otherwise it allocates.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod events;
pub mod pump;

// Convenience re-exports for downstream crates
pub use audio::reader::{ReaderConfig, RingBufferReader};
pub use audio::sinks::{ChannelSink, RingBufferSink, SinkMessage};
pub use audio::wav::{WavFileSink, WavFileSource, WavSinkConfig};
pub use audio::{AudioFormat, AudioFrame, AudioSink, AudioSource};
pub use buffering::{Chunk, RingBuffer};
pub use error::{PumpError, Result};
pub use events::PumpStatusEvent;
pub use pump::{AudioPump, DiagnosticsSnapshot, PumpConfig, PumpState};
