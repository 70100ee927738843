//! Microphone capture via the cpal backend.
//!
//! The input callback converts whatever the device delivers to 16-bit
//! little-endian PCM and appends it to a [`RingBuffer`] as one chunk per
//! callback. A [`RingBufferReader`] over the same ring is then an
//! [`AudioSource`](crate::audio::AudioSource) for the pump.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio
//! on macOS). `MicrophoneCapture` must be created and dropped on the same
//! thread. The reader it hands out is `Send` and can move to the pump.

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
use serde::{Deserialize, Serialize};

use crate::audio::reader::{ReaderConfig, RingBufferReader};
use crate::audio::AudioFormat;
use crate::buffering::{Chunk, RingBuffer};
use crate::error::{PumpError, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Metadata about an audio input device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    pub is_default: bool,
}

/// Handle to an active capture stream. Dropping it stops the stream.
pub struct MicrophoneCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    ring: Arc<RingBuffer>,
    format: AudioFormat,
}

impl MicrophoneCapture {
    /// Open `preferred_device` if present, otherwise the default input.
    ///
    /// # Errors
    /// `AudioDevice` when no input device exists, `AudioStream` if cpal
    /// fails to build or start the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, preferred_device)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| PumpError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config = StreamConfig {
            channels,
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        info!(sample_rate, channels, sample_format = ?supported.sample_format(), "capture config selected");

        let ring = Arc::new(RingBuffer::new());
        let running = Arc::new(AtomicBool::new(true));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let (ring, running) = (Arc::clone(&ring), Arc::clone(&running));
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if running.load(Ordering::Relaxed) {
                            ring.append(encode_pcm16(data, f32_to_i16));
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            SampleFormat::I16 => {
                let (ring, running) = (Arc::clone(&ring), Arc::clone(&running));
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if running.load(Ordering::Relaxed) {
                            ring.append(encode_pcm16(data, |s| s));
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            SampleFormat::U8 => {
                let (ring, running) = (Arc::clone(&ring), Arc::clone(&running));
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if running.load(Ordering::Relaxed) {
                            ring.append(encode_pcm16(data, u8_to_i16));
                        }
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            fmt => {
                return Err(PumpError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| PumpError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PumpError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            ring,
            format: AudioFormat::pcm(sample_rate, 16, channels),
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(_preferred_device: Option<&str>) -> Result<Self> {
        Err(PumpError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    /// Format of the bytes appended to the ring.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// A pump source over the captured audio.
    pub fn reader(&self, config: ReaderConfig) -> RingBufferReader {
        RingBufferReader::with_config(Arc::clone(&self.ring), self.format, config)
    }

    /// Stop capturing and end the stream for every reader once drained.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.ring.finish();
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio-cpal")]
fn select_device(host: &cpal::Host, preferred: Option<&str>) -> Result<cpal::Device> {
    if let Some(preferred) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) =
                    devices.find(|d| d.name().map(|n| n == preferred).unwrap_or(false))
                {
                    return Ok(device);
                }
                warn!("preferred input device '{preferred}' not found, falling back");
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(device) = host.default_input_device() {
        return Ok(device);
    }
    host.input_devices()
        .map_err(|e| PumpError::AudioDevice(e.to_string()))?
        .next()
        .ok_or_else(|| PumpError::AudioDevice("no input device available".into()))
}

/// List available input devices. Empty without the `audio-cpal` feature.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect(),
        Err(e) => {
            warn!("failed to enumerate input devices: {e}");
            Vec::new()
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    Vec::new()
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn encode_pcm16<T: Copy>(data: &[T], convert: impl Fn(T) -> i16) -> Chunk {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for sample in data {
        bytes.extend_from_slice(&convert(*sample).to_le_bytes());
    }
    Chunk::new(bytes)
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn u8_to_i16(sample: u8) -> i16 {
    (i16::from(sample) - 128) << 8
}
