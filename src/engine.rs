use crate::{
    EditOutcome, EditRequest, GeneratedImage, ImageEditor, UnavailableReason,
    config::FittingConfig,
    error::FittingError,
    model::{TransformPath, TransformRequest, TransformResult},
    overlay::OverlayComposer,
    storage::UploadStore,
};
use image::{DynamicImage, ImageFormat};
use std::{io::Cursor, time::Duration};

/// Orchestrates a single try-on: remote edit first, deterministic overlay otherwise.
///
/// The engine holds no per-request state; concurrent requests only share the
/// upload directory, where every output has a unique name.
pub struct TryOnEngine<E: ImageEditor> {
    editor: Option<E>,
    composer: OverlayComposer,
    store: UploadStore,
    public_url_prefix: String,
    remote_timeout: Duration,
}

impl<E: ImageEditor> TryOnEngine<E> {
    /// Creates an engine. `editor` is `None` when no credential is configured,
    /// which makes every request take the offline path.
    pub fn new(
        editor: Option<E>,
        composer: OverlayComposer,
        store: UploadStore,
        config: &FittingConfig,
    ) -> Self {
        Self {
            editor,
            composer,
            store,
            public_url_prefix: config.public_url_prefix.clone(),
            remote_timeout: config.remote_timeout,
        }
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// Whether requests will try the remote editor first.
    pub fn is_online(&self) -> bool {
        self.editor.is_some()
    }

    /// Produces exactly one output file for the request, or a processing error.
    ///
    /// Remote failures never surface here; only failures of the overlay path do.
    pub async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformResult, FittingError> {
        let output_name = request.output_name();
        log::info!("Processing request for: {}", request.subject.path.display());

        let fallback = match &self.editor {
            Some(editor) => {
                match self.invoke(editor, request).await {
                    EditOutcome::Generated(image) => {
                        match self.persist_generated(&output_name, image).await {
                            Ok(()) => {
                                return Ok(self.result(TransformPath::AiGenerated, &output_name));
                            }
                            Err(err) => {
                                log::warn!("Discarding unusable {} image: {err}", editor.name())
                            }
                        }
                    }
                    EditOutcome::Unavailable(reason) => {
                        log::warn!("{} unavailable ({}): {reason}", editor.name(), reason.as_str())
                    }
                }
                log::info!("Falling back to overlay");
                TransformPath::HybridFallback
            }
            None => {
                log::info!("{}, using offline overlay", UnavailableReason::NoCredential);
                TransformPath::OfflineSimulation
            }
        };

        self.compose_overlay(request, &output_name).await?;
        Ok(self.result(fallback, &output_name))
    }

    async fn invoke(&self, editor: &E, request: &TransformRequest) -> EditOutcome {
        let edit = EditRequest {
            prompt: request.prompt(),
            subject: &request.subject,
            reference: request.reference.as_ref(),
        };
        match tokio::time::timeout(self.remote_timeout, editor.edit(edit)).await {
            Ok(outcome) => outcome,
            Err(_) => EditOutcome::Unavailable(UnavailableReason::TimedOut(self.remote_timeout)),
        }
    }

    /// Re-encodes the remote image in the output's format and writes it.
    async fn persist_generated(
        &self,
        output_name: &str,
        image: GeneratedImage,
    ) -> Result<(), FittingError> {
        let format = output_format(output_name);
        log::debug!(
            "Re-encoding {} bytes of {} as {format:?}",
            image.bytes.len(),
            image.mime_type.as_deref().unwrap_or("unlabelled image data")
        );
        let encoded = tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&image.bytes).map_err(FittingError::Decode)?;
            encode_image(&decoded, format)
        })
        .await??;

        self.store.write_output(output_name, &encoded).await?;
        Ok(())
    }

    async fn compose_overlay(
        &self,
        request: &TransformRequest,
        output_name: &str,
    ) -> Result<(), FittingError> {
        let composer = self.composer.clone();
        let subject = request.subject.bytes.clone();
        let format = output_format(output_name);

        let encoded = tokio::task::spawn_blocking(move || {
            let composite = composer.compose(&subject)?;
            encode_image(&composite, format)
        })
        .await??;

        let path = self.store.write_output(output_name, &encoded).await?;
        log::info!("Overlay written to {}", path.display());
        Ok(())
    }

    fn result(&self, path: TransformPath, output_name: &str) -> TransformResult {
        log::info!("Request completed via {} path: {output_name}", path.as_str());
        TransformResult::new(path, &self.public_url_prefix, output_name)
    }
}

/// Formats whose encoders take any RGBA image at the normalized size.
const OUTPUT_FORMATS: [ImageFormat; 7] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::Bmp,
    ImageFormat::Tga,
];

/// Format implied by the output name's extension, PNG for anything else.
pub fn output_format(output_name: &str) -> ImageFormat {
    match ImageFormat::from_path(output_name) {
        Ok(format) if OUTPUT_FORMATS.contains(&format) && format.writing_enabled() => format,
        _ => ImageFormat::Png,
    }
}

/// Encodes an image; JPEG output drops the alpha channel.
pub fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, FittingError> {
    let mut out = Cursor::new(Vec::new());
    let written = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut out, format),
        _ => image.write_to(&mut out, format),
    };
    written.map_err(FittingError::Encode)?;
    Ok(out.into_inner())
}
