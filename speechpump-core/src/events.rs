//! Status events broadcast by the pump.
//!
//! Every change of the pump's actual state produces one
//! [`PumpStatusEvent`]. Worker failures (unframeable formats, source read
//! errors) produce an event carrying a `detail` message.

use serde::{Deserialize, Serialize};

use crate::pump::PumpState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpStatusEvent {
    /// Pump session the event belongs to (0 before the first start).
    pub session: u64,
    pub state: PumpState,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

impl PumpStatusEvent {
    pub fn is_error(&self) -> bool {
        self.detail.is_some()
    }
}
