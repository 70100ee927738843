//! `AudioPump`: moves fixed-duration frames from an [`AudioSource`] to an
//! [`AudioSink`] on a background worker thread.
//!
//! ## Lifecycle
//!
//! ```text
//! AudioPump::new()                         NoInput
//!     └─► set_audio_reader(Some(..))   →   Idle
//!         └─► start_pump(sink)         →   Processing
//!             ├─► stop_pump()          →   Idle      (reader kept)
//!             └─► source hits EOF      →   NoInput   (reader dropped)
//! ```
//!
//! `Paused` is reserved: every operation that would enter or leave it
//! fails with `PumpError::NotImplemented`.
//!
//! ## Threading
//!
//! The caller writes only `requested`; the worker writes `actual` and
//! signals the condvar on every change. `start_pump` and `stop_pump` block
//! until the two converge, so a `stop_pump` issued after `start_pump`
//! returned always finds a worker that has begun processing. `stop_pump`
//! and `Drop` also join the worker, so no thread outlives the call.

pub mod worker;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::audio::{AudioSink, AudioSource};
use crate::error::{PumpError, Result};
use crate::events::PumpStatusEvent;

/// Status broadcast capacity: events buffered for slow subscribers.
const STATUS_CHANNEL_CAP: usize = 64;

/// Pump state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    /// No reader attached.
    NoInput,
    /// Reader attached, not pumping.
    Idle,
    /// Reserved; never entered.
    Paused,
    /// Worker is moving frames.
    Processing,
}

/// Configuration for `AudioPump`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PumpConfig {
    /// Frames delivered per second of audio. Default: 10 (100 ms frames).
    pub frames_per_second: u32,
    /// OS thread name of the worker. Default: `"audio-pump"`.
    pub thread_name: String,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 10,
            thread_name: "audio-pump".into(),
        }
    }
}

/// Counters shared with the worker.
#[derive(Debug, Default)]
pub struct PumpDiagnostics {
    pub sessions_started: AtomicU64,
    pub frames_delivered: AtomicU64,
    pub bytes_delivered: AtomicU64,
    pub buffers_allocated: AtomicU64,
    pub read_errors: AtomicU64,
}

impl PumpDiagnostics {
    pub fn reset(&self) {
        self.sessions_started.store(0, Ordering::Relaxed);
        self.frames_delivered.store(0, Ordering::Relaxed);
        self.bytes_delivered.store(0, Ordering::Relaxed);
        self.buffers_allocated.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub sessions_started: u64,
    pub frames_delivered: u64,
    pub bytes_delivered: u64,
    pub buffers_allocated: u64,
    pub read_errors: u64,
}

/// State guarded by the pump mutex.
pub(crate) struct Control {
    pub actual: PumpState,
    pub requested: PumpState,
    /// Attached reader; the worker holds it while a session runs.
    pub reader: Option<Box<dyn AudioSource>>,
    /// Error raised by the worker before it reached `Processing`.
    pub failure: Option<PumpError>,
    pub session: u64,
}

pub(crate) struct Shared {
    pub control: Mutex<Control>,
    pub changed: Condvar,
    pub status_tx: broadcast::Sender<PumpStatusEvent>,
    pub diagnostics: PumpDiagnostics,
}

impl Shared {
    pub fn publish(&self, session: u64, state: PumpState, detail: Option<String>) {
        let _ = self.status_tx.send(PumpStatusEvent {
            session,
            state,
            detail,
        });
    }
}

/// The pump handle.
///
/// `AudioPump` is `Send + Sync`; all methods take `&self`.
pub struct AudioPump {
    config: PumpConfig,
    shared: Arc<Shared>,
    /// Also serializes start/stop callers.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPump {
    pub fn new(config: PumpConfig) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAP);
        Self {
            config,
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    actual: PumpState::NoInput,
                    requested: PumpState::NoInput,
                    reader: None,
                    failure: None,
                    session: 0,
                }),
                changed: Condvar::new(),
                status_tx,
                diagnostics: PumpDiagnostics::default(),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Attach (`Some`) or detach (`None`) the source.
    ///
    /// # Errors
    /// `InvalidState` while processing or paused, or when attaching over an
    /// already attached reader.
    pub fn set_audio_reader(&self, reader: Option<Box<dyn AudioSource>>) -> Result<()> {
        let mut control = self.shared.control.lock();

        let busy = control.requested == PumpState::Processing;
        if busy || matches!(control.actual, PumpState::Processing | PumpState::Paused) {
            return Err(PumpError::InvalidState {
                operation: "set audio reader",
                state: if busy { PumpState::Processing } else { control.actual },
            });
        }
        if reader.is_some() && control.reader.is_some() {
            return Err(PumpError::InvalidState {
                operation: "attach a second audio reader",
                state: control.actual,
            });
        }

        let state = if reader.is_some() {
            PumpState::Idle
        } else {
            PumpState::NoInput
        };
        control.reader = reader;
        control.actual = state;
        control.requested = state;
        let session = control.session;
        self.shared.changed.notify_all();
        drop(control);

        info!(?state, "audio reader updated");
        self.shared.publish(session, state, None);
        Ok(())
    }

    /// Shorthand for `set_audio_reader(Some(Box::new(reader)))`.
    pub fn attach_reader<R: AudioSource>(&self, reader: R) -> Result<()> {
        self.set_audio_reader(Some(Box::new(reader)))
    }

    /// Shorthand for `set_audio_reader(None)`.
    pub fn detach_reader(&self) -> Result<()> {
        self.set_audio_reader(None)
    }

    /// Spawn the worker and block until it is processing (or has already
    /// finished, e.g. on an immediate end of stream).
    ///
    /// # Errors
    /// - `NotImplemented` while paused.
    /// - `InvalidState` while processing or with no reader attached.
    /// - `UnsupportedFormat` if the source format cannot be framed; the
    ///   pump is left `Idle` with the reader still attached.
    /// - `Io` if the worker thread cannot be spawned.
    pub fn start_pump<S: AudioSink>(&self, sink: S) -> Result<()> {
        let mut worker = self.worker.lock();

        {
            let control = self.shared.control.lock();
            match control.actual {
                PumpState::Paused => return Err(PumpError::NotImplemented("start pump while paused")),
                PumpState::Processing => {
                    return Err(PumpError::InvalidState {
                        operation: "start pump",
                        state: PumpState::Processing,
                    })
                }
                PumpState::NoInput | PumpState::Idle => {}
            }
        }

        // A worker that ended on its own (EOF) may still be running its
        // teardown; it is already out of its loop.
        if let Some(finished) = worker.take() {
            reap(finished);
        }

        let mut control = self.shared.control.lock();
        if control.reader.is_none() {
            return Err(PumpError::InvalidState {
                operation: "start pump without an audio reader",
                state: control.actual,
            });
        }

        control.session += 1;
        let session = control.session;
        control.failure = None;
        control.requested = PumpState::Processing;
        self.shared.changed.notify_all();

        let ctx = worker::WorkerContext {
            shared: Arc::clone(&self.shared),
            sink: Box::new(sink),
            frames_per_second: self.config.frames_per_second,
            session,
        };
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker::run(ctx));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                control.requested = control.actual;
                self.shared.changed.notify_all();
                error!("failed to spawn pump worker: {e}");
                return Err(PumpError::Io(e));
            }
        };

        while control.actual != PumpState::Processing && control.requested == PumpState::Processing {
            self.shared.changed.wait(&mut control);
        }

        if let Some(err) = control.failure.take() {
            drop(control);
            reap(handle);
            return Err(err);
        }

        info!(session, state = ?control.actual, "pump started");
        *worker = Some(handle);
        Ok(())
    }

    /// Reserved; always fails.
    pub fn pause_pump(&self) -> Result<()> {
        Err(PumpError::NotImplemented("pause pump"))
    }

    /// Ask the worker to stop and block until it is `Idle` and joined.
    ///
    /// A no-op when nothing is being pumped.
    ///
    /// # Errors
    /// `NotImplemented` while paused.
    pub fn stop_pump(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        let mut control = self.shared.control.lock();

        match control.actual {
            PumpState::Paused => return Err(PumpError::NotImplemented("stop pump while paused")),
            PumpState::NoInput | PumpState::Idle => {}
            PumpState::Processing => {
                control.requested = PumpState::Idle;
                self.shared.changed.notify_all();
                while control.actual != PumpState::Idle && control.requested == PumpState::Idle {
                    self.shared.changed.wait(&mut control);
                }
                info!(state = ?control.actual, "pump stopped");
            }
        }
        drop(control);

        if let Some(handle) = worker.take() {
            reap(handle);
        }
        Ok(())
    }

    /// Current actual state (snapshot).
    pub fn state(&self) -> PumpState {
        self.shared.control.lock().actual
    }

    /// Number of sessions started so far.
    pub fn session(&self) -> u64 {
        self.shared.control.lock().session
    }

    /// Subscribe to state-change and worker-error events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<PumpStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    pub fn reset_diagnostics(&self) {
        self.shared.diagnostics.reset();
    }
}

impl Default for AudioPump {
    fn default() -> Self {
        Self::new(PumpConfig::default())
    }
}

impl Drop for AudioPump {
    fn drop(&mut self) {
        let Some(handle) = self.worker.get_mut().take() else {
            return;
        };
        {
            let mut control = self.shared.control.lock();
            if control.requested == PumpState::Processing {
                control.requested = PumpState::Idle;
                self.shared.changed.notify_all();
            }
        }
        reap(handle);
    }
}

fn reap(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("pump worker panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, AudioFrame};

    struct Silence;

    impl AudioSource for Silence {
        fn format(&self) -> AudioFormat {
            AudioFormat::default()
        }

        fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
            buffer.fill(0);
            std::thread::sleep(std::time::Duration::from_millis(1));
            Ok(buffer.len())
        }
    }

    struct Discard;

    impl AudioSink for Discard {
        fn set_format(&mut self, _format: Option<&AudioFormat>) {}
        fn process_audio(&mut self, _frame: AudioFrame) {}
    }

    #[test]
    fn new_pump_has_no_input() {
        let pump = AudioPump::default();
        assert_eq!(pump.state(), PumpState::NoInput);
        assert_eq!(pump.session(), 0);
    }

    #[test]
    fn start_without_reader_is_rejected() {
        let pump = AudioPump::default();
        let err = pump.start_pump(Discard).unwrap_err();
        assert!(err.is_usage_error(), "unexpected error: {err}");
        assert_eq!(pump.state(), PumpState::NoInput);
    }

    #[test]
    fn second_reader_is_rejected_until_detached() {
        let pump = AudioPump::default();
        pump.attach_reader(Silence).expect("attach");
        assert!(pump.attach_reader(Silence).unwrap_err().is_usage_error());

        pump.detach_reader().expect("detach");
        assert_eq!(pump.state(), PumpState::NoInput);
        pump.attach_reader(Silence).expect("re-attach");
        assert_eq!(pump.state(), PumpState::Idle);
    }

    #[test]
    fn reader_cannot_change_while_processing() {
        let pump = AudioPump::default();
        pump.attach_reader(Silence).expect("attach");
        pump.start_pump(Discard).expect("start");

        let err = pump.detach_reader().unwrap_err();
        assert!(matches!(
            err,
            PumpError::InvalidState {
                state: PumpState::Processing,
                ..
            }
        ));

        pump.stop_pump().expect("stop");
        pump.detach_reader().expect("detach after stop");
    }

    #[test]
    fn pause_is_not_implemented() {
        let pump = AudioPump::default();
        assert!(matches!(pump.pause_pump(), Err(PumpError::NotImplemented(_))));
    }

    #[test]
    fn drop_joins_a_running_worker() {
        let pump = AudioPump::default();
        pump.attach_reader(Silence).expect("attach");
        pump.start_pump(Discard).expect("start");
        drop(pump);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: PumpConfig =
            serde_json::from_str(r#"{"framesPerSecond": 50}"#).expect("parse config");
        assert_eq!(cfg.frames_per_second, 50);
        assert_eq!(cfg.thread_name, "audio-pump");
    }
}
