//! PCM stream description shared by sources, the pump and sinks.

use serde::{Deserialize, Serialize};

use crate::error::{PumpError, Result};

/// `WAVE_FORMAT_PCM` tag.
pub const FORMAT_TAG_PCM: u16 = 1;
/// `WAVE_FORMAT_IEEE_FLOAT` tag.
pub const FORMAT_TAG_IEEE_FLOAT: u16 = 3;

/// Layout of interleaved PCM bytes, mirroring the WAVE `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_second: u32,
    pub avg_bytes_per_second: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Integer PCM with derived `block_align` / `avg_bytes_per_second`.
    pub fn pcm(samples_per_second: u32, bits_per_sample: u16, channels: u16) -> Self {
        Self::with_tag(FORMAT_TAG_PCM, samples_per_second, bits_per_sample, channels)
    }

    /// 32-bit IEEE float PCM.
    pub fn float32(samples_per_second: u32, channels: u16) -> Self {
        Self::with_tag(FORMAT_TAG_IEEE_FLOAT, samples_per_second, 32, channels)
    }

    fn with_tag(format_tag: u16, samples_per_second: u32, bits_per_sample: u16, channels: u16) -> Self {
        let block_align = channels.saturating_mul(bits_per_sample.div_ceil(8));
        Self {
            format_tag,
            channels,
            samples_per_second,
            avg_bytes_per_second: samples_per_second.saturating_mul(u32::from(block_align)),
            block_align,
            bits_per_sample,
        }
    }

    /// 16 kHz, 16-bit mono: the speech default.
    pub fn speech_default() -> Self {
        Self::pcm(16_000, 16, 1)
    }

    /// Bytes of audio per second of playback, derived from the sample layout.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.bits_per_sample / 8)
            * u64::from(self.samples_per_second)
            * u64::from(self.channels)
    }

    /// Bytes in one frame when the stream is cut into `frames_per_second`
    /// equal slices.
    ///
    /// # Errors
    /// `UnsupportedFormat` if the sample width is not a whole number of
    /// bytes, if any dimension is zero, or if the frame rounds down to
    /// nothing.
    pub fn frame_size(&self, frames_per_second: u32) -> Result<usize> {
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(PumpError::UnsupportedFormat(format!(
                "{}-bit samples are not byte aligned",
                self.bits_per_sample
            )));
        }
        if self.channels == 0 || self.samples_per_second == 0 {
            return Err(PumpError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                self.channels, self.samples_per_second
            )));
        }
        if frames_per_second == 0 {
            return Err(PumpError::UnsupportedFormat(
                "frame rate must be non-zero".into(),
            ));
        }

        let size = self.bytes_per_second() / u64::from(frames_per_second);
        if size == 0 {
            return Err(PumpError::UnsupportedFormat(format!(
                "{frames_per_second} frames/s leaves no bytes per frame"
            )));
        }
        usize::try_from(size)
            .map_err(|_| PumpError::UnsupportedFormat(format!("frame of {size} bytes is too large")))
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::speech_default()
    }
}
