//! Logs pump status events until the pump is dropped.

use std::thread::{self, JoinHandle};

use speechpump_core::AudioPump;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub fn spawn_status_logger(pump: &AudioPump) -> std::io::Result<JoinHandle<()>> {
    let mut rx = pump.subscribe_status();
    thread::Builder::new()
        .name("pump-status".into())
        .spawn(move || loop {
            match rx.blocking_recv() {
                Ok(ev) if ev.is_error() => warn!(
                    session = ev.session,
                    state = ?ev.state,
                    "pump reported: {}",
                    ev.detail.unwrap_or_default()
                ),
                Ok(ev) => debug!(session = ev.session, state = ?ev.state, "pump status"),
                Err(RecvError::Lagged(n)) => warn!("status logger lagged by {n} events"),
                Err(RecvError::Closed) => break,
            }
        })
}
