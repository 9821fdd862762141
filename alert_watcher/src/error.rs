use alert_core::error::InitializationError;
use alert_core::observation::ObservationError;
use alert_core::store::PersistenceError;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Deserialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to start player `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("player `{program}` exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },
    #[cfg(feature = "audio")]
    #[error("failed to open sound file {}: {source}", path.display())]
    Open {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[cfg(feature = "audio")]
    #[error("failed to open audio output: {0}")]
    Stream(#[from] rodio::StreamError),
    #[cfg(feature = "audio")]
    #[error("failed to decode sound file: {0}")]
    Decode(#[from] rodio::decoder::DecoderError),
    #[cfg(feature = "audio")]
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("alert source unavailable: {0}")]
    SourceUnavailable(#[from] FetchError),
    #[error("alert source returned no records")]
    EmptySource,
    #[error("state store error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl From<ObservationError> for CycleError {
    fn from(e: ObservationError) -> Self {
        match e {
            ObservationError::EmptySource => CycleError::EmptySource,
        }
    }
}

#[derive(Debug, Error)]
pub enum MainError {
    #[error(transparent)]
    Init(#[from] InitializationError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}
