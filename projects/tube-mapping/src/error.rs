use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the map pipeline stages
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The video could not be opened by the selected backend
    #[error("video source unavailable: {path:?} ({reason})")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The source opened but no frame was sampled
    #[error("no frames decoded from {path:?}")]
    NoFrames { path: PathBuf },

    /// A frame does not have the expected shape or pixel type
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Parameters would produce an empty or negative output
    #[error("geometry violation: {0}")]
    GeometryViolation(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Warning,
}

/// User-facing message produced when a background job finishes or fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Catch-all for failures that carry no specific category.
    pub fn unknown() -> Self {
        Self::warning("Unknown warning", "Unknown error while reading the file.")
    }
}

impl PipelineError {
    pub fn notification(&self) -> Notification {
        match self {
            PipelineError::SourceUnavailable { path, .. } => Notification::warning(
                "Video unavailable",
                format!("Could not open video file {}.", path.display()),
            ),
            PipelineError::NoFrames { path } => Notification::warning(
                "No frames",
                format!("No frames could be sampled from {}.", path.display()),
            ),
            PipelineError::MalformedFrame(detail) => {
                Notification::warning("Malformed frame", detail.clone())
            }
            PipelineError::GeometryViolation(detail) => {
                Notification::warning("Invalid geometry", detail.clone())
            }
            _ => Notification::unknown(),
        }
    }
}
