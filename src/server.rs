use crate::{
    ImageEditor, TryOnEngine,
    error::FittingError,
    model::{TransformRequest, TransformResult},
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::{get, post},
};
use bytes::Bytes;
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};

/// URL prefix under which stored files are served.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// Builds the service router around a shared engine.
pub fn router<E: ImageEditor + 'static>(
    engine: Arc<TryOnEngine<E>>,
    max_upload_bytes: usize,
) -> Router {
    let uploads = ServeDir::new(engine.store().root());

    Router::new()
        .route("/", get(|| async { "Welcome to the fitting room!" }))
        .route("/health", get(get_health::<E>))
        .route("/api/transform", post(post_transform::<E>))
        .nest_service(UPLOADS_ROUTE, uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

async fn get_health<E: ImageEditor + 'static>(
    State(engine): State<Arc<TryOnEngine<E>>>,
) -> impl IntoResponse {
    let mode = if engine.is_online() { "ai" } else { "offline" };
    Json(json!({ "status": "ok", "mode": mode }))
}

async fn post_transform<E: ImageEditor + 'static>(
    State(engine): State<Arc<TryOnEngine<E>>>,
    multipart: Multipart,
) -> Result<Json<TransformResult>, FittingError> {
    let form = TransformForm::read(multipart).await?;

    // nothing is stored unless the subject photo is present
    let Some(image) = form.image else {
        return Err(FittingError::MissingImage);
    };

    let store = engine.store();
    let subject = store
        .save(&image.file_name, image.content_type.as_deref(), image.bytes)
        .await?;
    let reference = match form.dress {
        Some(dress) => Some(
            store
                .save(&dress.file_name, dress.content_type.as_deref(), dress.bytes)
                .await?,
        ),
        None => None,
    };

    let result = engine
        .transform(&TransformRequest { subject, reference })
        .await?;
    Ok(Json(result))
}

struct FormFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Default)]
struct TransformForm {
    image: Option<FormFile>,
    dress: Option<FormFile>,
}

impl TransformForm {
    /// Collects the `image` and `dress` parts; other fields and empty parts are ignored.
    async fn read(mut multipart: Multipart) -> Result<Self, FittingError> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            FittingError::BadRequest {
                message: format!("Failed to parse multipart data: {e}"),
            }
        })? {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().unwrap_or("").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(|e| FittingError::BadRequest {
                message: format!("Failed to read field {name:?}: {e}"),
            })?;

            if bytes.is_empty() {
                log::debug!("Ignoring empty multipart field {name:?}");
                continue;
            }
            let file = FormFile {
                file_name,
                content_type,
                bytes,
            };
            match name.as_str() {
                "image" => form.image = Some(file),
                "dress" => form.dress = Some(file),
                _ => log::debug!("Ignoring multipart field {name:?}"),
            }
        }

        Ok(form)
    }
}
