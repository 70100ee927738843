//! WAV file source and sink backed by `hound`.
//!
//! Samples are exchanged with the pump as little-endian interleaved PCM
//! bytes, the same layout the `data` chunk of the file uses.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio::format::{AudioFormat, FORMAT_TAG_IEEE_FLOAT};
use crate::audio::{AudioFrame, AudioSink, AudioSource};
use crate::error::{PumpError, Result};

/// Reads PCM bytes from a WAV file. End of file is end of stream.
pub struct WavFileSource {
    reader: hound::WavReader<BufReader<File>>,
    format: AudioFormat,
    path: PathBuf,
}

impl WavFileSource {
    /// Open `path` and validate that its samples are byte aligned.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();
        if spec.bits_per_sample % 8 != 0 {
            return Err(PumpError::UnsupportedFormat(format!(
                "{}: {}-bit samples are not byte aligned",
                path.display(),
                spec.bits_per_sample
            )));
        }

        let format = match spec.sample_format {
            hound::SampleFormat::Float => AudioFormat::float32(spec.sample_rate, spec.channels),
            hound::SampleFormat::Int => {
                AudioFormat::pcm(spec.sample_rate, spec.bits_per_sample, spec.channels)
            }
        };
        info!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            "opened WAV source"
        );

        Ok(Self {
            reader,
            format,
            path,
        })
    }

    /// Samples (not frames) left to read.
    pub fn remaining_samples(&self) -> u32 {
        self.reader.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSource for WavFileSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let width = usize::from(self.format.bits_per_sample / 8);
        let wanted = buffer.len() / width;
        let mut written = 0;

        if self.format.format_tag == FORMAT_TAG_IEEE_FLOAT {
            for sample in self.reader.samples::<f32>().take(wanted) {
                let bytes = sample?.to_le_bytes();
                buffer[written..written + width].copy_from_slice(&bytes);
                written += width;
            }
        } else {
            for sample in self.reader.samples::<i32>().take(wanted) {
                encode_int_sample(sample?, width, &mut buffer[written..written + width]);
                written += width;
            }
        }

        Ok(written)
    }
}

/// Little-endian encoding of an integer sample as stored in a WAV file.
/// 8-bit WAV samples are unsigned; `hound` hands them out signed.
fn encode_int_sample(sample: i32, width: usize, out: &mut [u8]) {
    if width == 1 {
        out[0] = (sample + 128) as u8;
        return;
    }
    out.copy_from_slice(&sample.to_le_bytes()[..width]);
}

fn decode_int_sample(bytes: &[u8]) -> i32 {
    match bytes.len() {
        1 => i32::from(bytes[0]) - 128,
        2 => i32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        // Sign-extend 24-bit samples through the top byte.
        3 => i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8,
        _ => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

/// Explicit switch for recording pumped audio to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WavSinkConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for WavSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("speechpump.wav"),
        }
    }
}

/// Writes every received frame to a WAV file.
///
/// The file is created when the first format arrives and finalized when
/// the pump signals the end of the session with `set_format(None)`.
pub struct WavFileSink {
    config: WavSinkConfig,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    format: Option<AudioFormat>,
    /// Bytes of a sample split across two frames.
    carry: Vec<u8>,
    samples_written: u64,
    last_error: Option<String>,
}

impl WavFileSink {
    pub fn new(config: WavSinkConfig) -> Self {
        Self {
            config,
            writer: None,
            format: None,
            carry: Vec::new(),
            samples_written: 0,
            last_error: None,
        }
    }

    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self::new(WavSinkConfig {
            enabled: true,
            path: path.into(),
        })
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Most recent write failure, if any. Writing stops after a failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn open(&mut self, format: &AudioFormat) -> Result<()> {
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.samples_per_second,
            bits_per_sample: format.bits_per_sample,
            sample_format: if format.format_tag == FORMAT_TAG_IEEE_FLOAT {
                hound::SampleFormat::Float
            } else {
                hound::SampleFormat::Int
            },
        };
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.writer = Some(hound::WavWriter::create(&self.config.path, spec)?);
        self.format = Some(*format);
        self.carry.clear();
        debug!(path = %self.config.path.display(), "WAV sink opened");
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let (Some(writer), Some(format)) = (self.writer.as_mut(), self.format) else {
            return Ok(());
        };
        let width = usize::from(format.bits_per_sample / 8);
        let float = format.format_tag == FORMAT_TAG_IEEE_FLOAT;

        self.carry.extend_from_slice(bytes);
        let whole = self.carry.len() / width * width;
        for sample in self.carry[..whole].chunks_exact(width) {
            if float {
                writer.write_sample(f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]))?;
            } else {
                writer.write_sample(decode_int_sample(sample))?;
            }
            self.samples_written += 1;
        }
        self.carry.drain(..whole);
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.format = None;
        if !self.carry.is_empty() {
            warn!(bytes = self.carry.len(), "dropping incomplete trailing sample");
            self.carry.clear();
        }
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            info!(
                path = %self.config.path.display(),
                samples = self.samples_written,
                "WAV sink finalized"
            );
        }
        Ok(())
    }

    fn record_failure(&mut self, err: PumpError) {
        warn!(path = %self.config.path.display(), "WAV sink failed: {err}");
        self.last_error = Some(err.to_string());
        self.writer = None;
        self.format = None;
    }
}

impl AudioSink for WavFileSink {
    fn set_format(&mut self, format: Option<&AudioFormat>) {
        if !self.config.enabled {
            return;
        }
        let result = match format {
            Some(format) => self.finalize().and_then(|()| self.open(format)),
            None => self.finalize(),
        };
        if let Err(err) = result {
            self.record_failure(err);
        }
    }

    fn process_audio(&mut self, frame: AudioFrame) {
        if !self.config.enabled || frame.is_empty() {
            return;
        }
        if let Err(err) = self.write_bytes(frame.bytes()) {
            self.record_failure(err);
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(err) = self.finalize() {
            warn!("failed to finalize WAV sink on drop: {err}");
        }
    }
}
