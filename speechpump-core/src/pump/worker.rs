//! Body of the pump worker thread.
//!
//! One call to [`run`] is one pump session. The worker owns the sink for
//! the whole session and borrows the reader out of the shared control
//! block; it hands the reader back when the session ends by `stop_pump`
//! and drops it on end of stream.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use super::{Control, PumpDiagnostics, PumpState, Shared};
use crate::audio::{AudioFrame, AudioSink, AudioSource};
use crate::error::PumpError;

pub(crate) struct WorkerContext {
    pub shared: Arc<Shared>,
    pub sink: Box<dyn AudioSink>,
    pub frames_per_second: u32,
    pub session: u64,
}

pub(crate) fn run(ctx: WorkerContext) {
    let WorkerContext {
        shared,
        mut sink,
        frames_per_second,
        session,
    } = ctx;
    let span = info_span!("audio_pump", session);
    let _enter = span.enter();

    let mut guard = SessionGuard {
        shared: &shared,
        session,
        armed: true,
    };

    let reader = shared.control.lock().reader.take();
    let Some(mut source) = reader else {
        // start_pump checks for a reader under the same lock it spawns us
        // from, so this only happens if that check is bypassed.
        let mut control = shared.control.lock();
        fail_start(
            &shared,
            &mut control,
            session,
            PumpError::InvalidState {
                operation: "run pump without an audio reader",
                state: PumpState::NoInput,
            },
            PumpState::NoInput,
        );
        guard.armed = false;
        return;
    };

    let format = source.format();
    let frame_size = match format.frame_size(frames_per_second) {
        Ok(size) => size,
        Err(err) => {
            let mut control = shared.control.lock();
            control.reader = Some(source);
            fail_start(&shared, &mut control, session, err, PumpState::Idle);
            guard.armed = false;
            return;
        }
    };

    shared
        .diagnostics
        .sessions_started
        .fetch_add(1, Ordering::Relaxed);
    info!(
        frame_size,
        sample_rate = format.samples_per_second,
        channels = format.channels,
        bits = format.bits_per_sample,
        "pump session started"
    );
    sink.set_format(Some(&format));

    let mut buffer = Arc::new(vec![0u8; frame_size]);
    shared
        .diagnostics
        .buffers_allocated
        .fetch_add(1, Ordering::Relaxed);
    let mut sequence = 0u64;

    let mut control = loop {
        {
            let mut control = shared.control.lock();
            if control.requested != PumpState::Processing {
                break control;
            }
            if control.actual != PumpState::Processing {
                control.actual = PumpState::Processing;
                shared.changed.notify_all();
                drop(control);
                shared.publish(session, PumpState::Processing, None);
            }
        }

        let bytes = reclaim_or_allocate(&mut buffer, frame_size, &shared.diagnostics);
        let n = match source.read(bytes) {
            Ok(n) => n.min(frame_size),
            Err(err) => {
                warn!(sequence, "source read failed, ending stream: {err}");
                shared.diagnostics.read_errors.fetch_add(1, Ordering::Relaxed);
                shared.publish(
                    session,
                    PumpState::Processing,
                    Some(format!("source read failed: {err}")),
                );
                0
            }
        };

        sink.process_audio(AudioFrame::new(Arc::clone(&buffer), n, sequence));

        if n == 0 {
            debug!(sequence, "end of stream");
            let mut control = shared.control.lock();
            if control.requested == PumpState::Processing {
                control.requested = PumpState::NoInput;
            }
            continue;
        }

        sequence += 1;
        shared
            .diagnostics
            .frames_delivered
            .fetch_add(1, Ordering::Relaxed);
        shared
            .diagnostics
            .bytes_delivered
            .fetch_add(n as u64, Ordering::Relaxed);
    };

    let end_state = control.requested;
    control.actual = end_state;
    if end_state == PumpState::Idle {
        control.reader = Some(source);
    } else {
        drop(source);
    }
    shared.changed.notify_all();
    drop(control);
    guard.armed = false;

    shared.publish(session, end_state, None);
    sink.set_format(None);
    info!(frames = sequence, state = ?end_state, "pump session ended");
}

/// Buffer for the next read: the previous one if nothing else holds it,
/// otherwise a fresh allocation that replaces it.
fn reclaim_or_allocate<'a>(
    buffer: &'a mut Arc<Vec<u8>>,
    frame_size: usize,
    diagnostics: &PumpDiagnostics,
) -> &'a mut [u8] {
    if Arc::get_mut(buffer).is_none() {
        *buffer = Arc::new(vec![0u8; frame_size]);
        diagnostics.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }
    // Unique at this point, so this never clones.
    Arc::make_mut(buffer).as_mut_slice()
}

/// Report a session that could not begin and release `start_pump`.
fn fail_start(
    shared: &Shared,
    control: &mut Control,
    session: u64,
    err: PumpError,
    state: PumpState,
) {
    error!("pump session failed to start: {err}");
    let detail = err.to_string();
    control.actual = state;
    control.requested = state;
    control.failure = Some(err);
    shared.changed.notify_all();
    shared.publish(session, state, Some(detail));
}

/// Resets the pump to `NoInput` if the worker unwinds mid-session, so no
/// caller stays blocked on the condvar.
struct SessionGuard<'a> {
    shared: &'a Shared,
    session: u64,
    armed: bool,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut control = self.shared.control.lock();
        control.actual = PumpState::NoInput;
        control.requested = PumpState::NoInput;
        if control.failure.is_none() {
            control.failure = Some(PumpError::Other(anyhow::anyhow!("pump worker panicked")));
        }
        self.shared.changed.notify_all();
        drop(control);
        self.shared.publish(
            self.session,
            PumpState::NoInput,
            Some("pump worker panicked".into()),
        );
    }
}
