pub mod config;
pub mod engine;
pub mod error;
pub mod gemini;
pub mod model;
pub mod overlay;
pub mod server;
pub mod storage;

use async_trait::async_trait;
use std::{fmt, time::Duration};

pub use config::FittingConfig;
pub use engine::TryOnEngine;
pub use error::{FittingError, GeminiError, OverlayError, StorageError};
pub use gemini::GeminiEditor;
pub use model::{TransformPath, TransformRequest, TransformResult, UploadedFile};
pub use overlay::OverlayComposer;
pub use storage::UploadStore;

/// Trait for implementing remote image editors that can be used with the [`TryOnEngine`].
///
/// An editor never fails in the `Result` sense: every failure mode is folded into
/// [`EditOutcome::Unavailable`] so the engine can branch on it and fall back to the
/// local overlay.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Submits a single edit and returns the produced image, if any.
    async fn edit(&self, request: EditRequest<'_>) -> EditOutcome;
}

/// Borrowed view of everything an editor needs for one edit.
#[derive(Clone, Copy, Debug)]
pub struct EditRequest<'a> {
    /// Natural-language instruction sent alongside the images.
    pub prompt: &'a str,
    /// The user's photo to be edited.
    pub subject: &'a UploadedFile,
    /// Optional photo of the garment the user wants to wear.
    pub reference: Option<&'a UploadedFile>,
}

/// Encoded image bytes returned by a remote editor.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Result of a remote edit attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum EditOutcome {
    /// The editor produced an image.
    Generated(GeneratedImage),
    /// The editor could not produce an image; the engine falls back.
    Unavailable(UnavailableReason),
}

/// Why no remote image is available for a request.
#[derive(Clone, Debug, PartialEq)]
pub enum UnavailableReason {
    /// No API credential is configured.
    NoCredential,
    /// The call raised: transport, status, or payload error.
    Raised(String),
    /// The call succeeded but carried no image, possibly some text instead.
    NoImage(Option<String>),
    /// The call did not complete within the configured timeout.
    TimedOut(Duration),
}

impl UnavailableReason {
    /// Returns the reason as a short string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailableReason::NoCredential => "no_credential",
            UnavailableReason::Raised(_) => "raised",
            UnavailableReason::NoImage(_) => "no_image",
            UnavailableReason::TimedOut(_) => "timed_out",
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NoCredential => write!(f, "no API key configured"),
            UnavailableReason::Raised(message) => write!(f, "remote call failed: {message}"),
            UnavailableReason::NoImage(Some(text)) => {
                write!(f, "remote returned no image, text: {text}")
            }
            UnavailableReason::NoImage(None) => write!(f, "remote returned no image"),
            UnavailableReason::TimedOut(after) => {
                write!(f, "remote call timed out after {after:?}")
            }
        }
    }
}
