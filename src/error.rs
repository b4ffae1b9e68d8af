use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::{io, path::PathBuf};

/// Errors surfaced by `POST /api/transform`.
///
/// Only [`FittingError::MissingImage`] and [`FittingError::BadRequest`] carry their own
/// text to the client; everything else is reported as a generic processing error.
#[derive(thiserror::Error, Debug)]
pub enum FittingError {
    /// The required `image` field was absent or empty.
    #[error("No image uploaded.")]
    MissingImage,

    /// The multipart body could not be read.
    #[error("{message}")]
    BadRequest { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode output image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl FittingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FittingError::MissingImage | FittingError::BadRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe message without internal details.
    pub fn user_message(&self) -> String {
        match self {
            FittingError::MissingImage | FittingError::BadRequest { .. } => self.to_string(),
            _ => "Error processing image".to_string(),
        }
    }
}

impl IntoResponse for FittingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Processing error: {self}");
        } else {
            log::info!("Rejected request: {self}");
        }
        (status, self.user_message()).into_response()
    }
}

/// Filesystem failures in the upload directory.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("failed to create upload directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to scan {path:?}: {source}")]
    Scan { path: PathBuf, source: io::Error },

    #[error("no free file name for {0}")]
    NameExhausted(String),
}

/// Failures of the deterministic overlay path.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    #[error("failed to read overlay asset {path:?}: {source}")]
    Asset { path: PathBuf, source: io::Error },

    #[error("failed to parse overlay svg: {0}")]
    Svg(#[from] usvg::Error),

    #[error("overlay svg has invalid size {width}x{height}")]
    InvalidSize { width: f32, height: f32 },

    #[error("failed to decode input image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("normalized image {width}x{height} exceeds the memory budget")]
    TooLarge { width: u32, height: u32 },

    #[error("failed to allocate {width}x{height} overlay pixmap")]
    Pixmap { width: u32, height: u32 },
}

/// Failures talking to the Gemini API. Never shown to clients.
#[derive(thiserror::Error, Debug)]
pub enum GeminiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("gemini returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to parse gemini response: {0}")]
    Payload(#[source] reqwest::Error),

    #[error("gemini image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Failures while loading configuration at startup.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid environment configuration: {0}")]
    Env(#[from] envy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let error = FittingError::MissingImage;
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.user_message(), "No image uploaded.");
    }

    #[test]
    fn processing_errors_are_generic() {
        let error = FittingError::Storage(StorageError::NameExhausted("1.png".to_string()));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.user_message(), "Error processing image");
    }
}
