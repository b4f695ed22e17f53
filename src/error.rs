use std::io;

use axum_extra::extract::multipart::MultipartError;
use thiserror::Error;

/// Every failure a compression request can hit. The `Display` text is what
/// the client sees in the `error` field.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No file uploaded")]
    NoFile,

    #[error("No file selected")]
    NoFileSelected,

    #[error("File must be a PDF")]
    NotPdf,

    #[error("Invalid file name")]
    InvalidFileName,

    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Invalid upload: {0}")]
    BadRequest(String),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{tool} not installed")]
    ToolMissing { tool: String },

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} error: {stderr}")]
    ToolFailed { tool: String, stderr: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
