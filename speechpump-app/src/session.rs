//! One pump session: a source, the pump, and a consumer thread on the
//! far side of a [`ChannelSink`].
//!
//! The consumer holds each frame until it has written it, so the pump
//! exercises its allocate-on-contention path whenever the consumer lags.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use serde::Serialize;
use speechpump_core::{
    AudioPump, AudioSink, AudioSource, ChannelSink, DiagnosticsSnapshot, PumpState, SinkMessage,
    WavFileSink, WavSinkConfig,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStats {
    pub frames: u64,
    pub bytes: u64,
    pub end_of_stream: bool,
    pub samples_recorded: u64,
    pub recording_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub elapsed_ms: f64,
    pub final_state: PumpState,
    pub pump: DiagnosticsSnapshot,
    pub consumer: ConsumerStats,
}

/// Drain `rx` until end of stream, optionally recording to WAV.
pub fn spawn_consumer(
    rx: Receiver<SinkMessage>,
    recording: WavSinkConfig,
) -> Result<JoinHandle<ConsumerStats>> {
    thread::Builder::new()
        .name("audio-consumer".into())
        .spawn(move || consume(rx, recording))
        .context("failed to spawn consumer thread")
}

fn consume(rx: Receiver<SinkMessage>, recording: WavSinkConfig) -> ConsumerStats {
    let mut wav = WavFileSink::new(recording);
    let mut stats = ConsumerStats::default();

    for message in rx.iter() {
        match message {
            SinkMessage::Format(format) => wav.set_format(Some(&format)),
            SinkMessage::Audio(frame) => {
                if !frame.is_empty() {
                    stats.frames += 1;
                    stats.bytes += frame.len() as u64;
                }
                wav.process_audio(frame);
            }
            SinkMessage::EndOfStream => {
                wav.set_format(None);
                stats.end_of_stream = true;
                break;
            }
        }
    }

    stats.samples_recorded = wav.samples_written();
    stats.recording_error = wav.last_error().map(str::to_string);
    stats
}

/// Pump `source` until it ends or `limit` elapses, then tear down.
pub fn run_session<S: AudioSource>(
    pump: &AudioPump,
    source: S,
    recording: WavSinkConfig,
    limit: Option<Duration>,
) -> Result<SessionReport> {
    let (sink, rx) = ChannelSink::unbounded();
    let consumer = spawn_consumer(rx, recording)?;

    pump.attach_reader(source)?;
    let started = Instant::now();
    pump.start_pump(sink)?;
    info!(session = pump.session(), "session running");

    while pump.state() == PumpState::Processing {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            info!("capture limit reached");
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    pump.stop_pump()?;
    let final_state = pump.state();
    if final_state == PumpState::Idle {
        pump.detach_reader()?;
    }

    let consumer = consumer
        .join()
        .map_err(|_| anyhow!("consumer thread panicked"))?;
    if !consumer.end_of_stream {
        warn!("consumer exited before end of stream");
    }

    Ok(SessionReport {
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        final_state,
        pump: pump.diagnostics_snapshot(),
        consumer,
    })
}
