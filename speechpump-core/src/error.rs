//! Error type shared by every speechpump-core module.

use thiserror::Error;

use crate::pump::PumpState;

/// All errors produced by speechpump-core.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error("cannot {operation} while pump is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PumpState,
    },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PumpError {
    /// `true` for errors caused by calling an operation in the wrong state.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PumpError::InvalidState { .. } | PumpError::NotImplemented(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PumpError>;
