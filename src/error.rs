//! Error types shared across the scan pipeline, the report store and the
//! classifier adapters.

use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors that end a scan job. Anything that reaches the job boundary is
/// recorded as `state = error` with this error's message.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to open video {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("no video stream in {0}")]
    NoVideoStream(PathBuf),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("no decodable frame in {0}")]
    NoFrame(PathBuf),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl From<ffmpeg_next::Error> for ScanError {
    fn from(err: ffmpeg_next::Error) -> Self {
        ScanError::Decode(err.to_string())
    }
}

impl From<JoinError> for ScanError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            let payload = err.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "job panicked".to_string());
            ScanError::Worker(message)
        } else {
            ScanError::Worker(err.to_string())
        }
    }
}

/// Errors raised by a [`crate::ports::repository::ReportRepository`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("report not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid report json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a detector or body classifier. These never escape a
/// frame: the pipeline turns them into `Outcome::Unavailable`.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("no async runtime available for classifier client")]
    NoRuntime,

    #[error("{0}")]
    Other(String),
}
