use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of every file the engine writes.
pub const OUTPUT_PREFIX: &str = "transformed_";

const SUBJECT_ONLY_PROMPT: &str = "Edit this image. Replace the person's outfit with a \
    high-quality, elegant white wedding dress. Maintain the exact face, pose, and background. \
    Return the image.";

const WITH_REFERENCE_PROMPT: &str = "Edit the first image. Replace the person's outfit with \
    the dress shown in the second image, keeping its cut, color, and fabric. Maintain the exact \
    face, pose, and background of the first image. Return the image.";

/// An upload persisted by the [`UploadStore`](crate::UploadStore).
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub mime_type: String,
    pub original_name: String,
    /// Name assigned on receipt, unique within the upload directory.
    pub stored_name: String,
    pub path: PathBuf,
}

pub struct TransformRequest {
    pub subject: UploadedFile,
    pub reference: Option<UploadedFile>,
}

impl TransformRequest {
    /// Instruction sent to the remote editor, chosen by whether a garment reference is present.
    pub fn prompt(&self) -> &'static str {
        if self.reference.is_some() {
            WITH_REFERENCE_PROMPT
        } else {
            SUBJECT_ONLY_PROMPT
        }
    }

    /// Name of the file this request produces.
    pub fn output_name(&self) -> String {
        format!("{OUTPUT_PREFIX}{}", self.subject.stored_name)
    }
}

/// Which code path produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformPath {
    AiGenerated,
    HybridFallback,
    OfflineSimulation,
}

impl TransformPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformPath::AiGenerated => "ai",
            TransformPath::HybridFallback => "hybrid",
            TransformPath::OfflineSimulation => "offline",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            TransformPath::AiGenerated => {
                "Nano Banana AI successfully generated your wedding dress photo!"
            }
            TransformPath::HybridFallback => "Nano Banana API processed the request! (Hybrid Mode)",
            TransformPath::OfflineSimulation => {
                "Wedding dress fitting complete! (Offline Mode - Set API Key for AI)"
            }
        }
    }
}

/// JSON body returned by `POST /api/transform`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub success: bool,
    pub transformed_image_url: String,
    pub message: String,
}

impl TransformResult {
    pub fn new(path: TransformPath, url_prefix: &str, output_name: &str) -> Self {
        Self {
            success: true,
            transformed_image_url: format!("{}/{output_name}", url_prefix.trim_end_matches('/')),
            message: path.message().to_string(),
        }
    }
}
