//! `AudioSource` over a shared [`RingBuffer`].
//!
//! The ring never blocks, so the reader polls it: each `read` keeps
//! draining until the request is full, the producer has finished and the
//! ring is empty, or the reader is cancelled. Cancellation is the only way
//! to unblock a pump that is waiting on a silent producer.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{AudioFormat, AudioSource};
use crate::buffering::RingBuffer;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderConfig {
    /// Sleep between polls of an empty ring, in milliseconds. Default: 5.
    pub poll_interval_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5,
        }
    }
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Blocking reader that turns a ring buffer into an [`AudioSource`].
pub struct RingBufferReader {
    ring: Arc<RingBuffer>,
    format: AudioFormat,
    config: ReaderConfig,
    cancelled: Arc<AtomicBool>,
}

impl RingBufferReader {
    pub fn new(ring: Arc<RingBuffer>, format: AudioFormat) -> Self {
        Self::with_config(ring, format, ReaderConfig::default())
    }

    pub fn with_config(ring: Arc<RingBuffer>, format: AudioFormat, config: ReaderConfig) -> Self {
        Self {
            ring,
            format,
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle that makes a blocked `read` return as soon as it next polls.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    pub fn ring(&self) -> &Arc<RingBuffer> {
        &self.ring
    }
}

impl AudioSource for RingBufferReader {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut filled = 0;

        while filled < buffer.len() {
            let n = self.ring.drain(&mut buffer[filled..]);
            filled += n;
            if n > 0 {
                continue;
            }

            if self.cancelled.load(Ordering::Acquire) {
                debug!(filled, "ring reader cancelled");
                break;
            }
            if self.ring.is_drained() {
                break;
            }
            thread::sleep(self.config.poll_interval());
        }

        Ok(filled)
    }
}

/// Cancels the [`RingBufferReader`] it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
