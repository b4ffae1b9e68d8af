use crate::{
    EditOutcome, EditRequest, GeneratedImage, ImageEditor, UnavailableReason,
    config::FittingConfig, error::GeminiError, model::UploadedFile,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Remote editor backed by the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiEditor {
    http: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiEditor {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Builds an editor when a credential is configured.
    pub fn from_config(config: &FittingConfig) -> Option<Self> {
        config.api_key().map(|key| {
            Self::new(
                key,
                config.gemini_model.as_str(),
                config.gemini_api_base.as_str(),
            )
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{model_path}:generateContent", self.api_base)
    }

    async fn generate(
        &self,
        request: EditRequest<'_>,
    ) -> Result<GenerateContentResponse, GeminiError> {
        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&GenerateContentRequest::for_edit(request))
            .send()
            .await
            .map_err(|source| GeminiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(GeminiError::Payload)
    }

    /// Lists the models available to this key that support `generateContent`.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, GeminiError> {
        let endpoint = format!("{}/models", self.api_base);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("key", self.api_key.clone())];
            if let Some(token) = page_token.take() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(&endpoint)
                .query(&query)
                .send()
                .await
                .map_err(|source| GeminiError::Transport {
                    endpoint: endpoint.clone(),
                    source,
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GeminiError::Status {
                    status,
                    body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
                });
            }

            let page = response
                .json::<ListModelsResponse>()
                .await
                .map_err(GeminiError::Payload)?;
            models.extend(
                page.models
                    .into_iter()
                    .filter(ModelInfo::supports_generate_content),
            );

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }
}

#[async_trait]
impl ImageEditor for GeminiEditor {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn edit(&self, request: EditRequest<'_>) -> EditOutcome {
        log::info!("Using image model {}", self.model);

        let response = match self.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("Gemini API error: {err}");
                return EditOutcome::Unavailable(UnavailableReason::Raised(err.to_string()));
            }
        };

        match extract_image(&response) {
            Ok(Some(image)) => {
                log::info!("Gemini generated an image ({} bytes)", image.bytes.len());
                EditOutcome::Generated(image)
            }
            Ok(None) => {
                let text = response.text();
                log::info!("Gemini returned no image, text: {text:?}");
                EditOutcome::Unavailable(UnavailableReason::NoImage(text))
            }
            Err(err) => {
                log::warn!("Gemini API error: {err}");
                EditOutcome::Unavailable(UnavailableReason::Raised(err.to_string()))
            }
        }
    }
}

/// First inline image of the first candidate, decoded from base64.
fn extract_image(
    response: &GenerateContentResponse,
) -> Result<Option<GeneratedImage>, GeminiError> {
    let Some(content) = response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
    else {
        return Ok(None);
    };

    let Some(inline) = content
        .parts
        .iter()
        .filter_map(|part| part.inline_data.as_ref())
        .find(|inline| !inline.data.is_empty())
    else {
        return Ok(None);
    };

    Ok(Some(GeneratedImage {
        bytes: BASE64.decode(inline.data.as_bytes())?,
        mime_type: inline.mime_type.clone(),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    fn for_edit(request: EditRequest<'_>) -> Self {
        let mut parts = vec![Part::text(request.prompt), Part::image(request.subject)];
        if let Some(reference) = request.reference {
            parts.push(Part::image(reference));
        }
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn image(file: &UploadedFile) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: Some(file.mime_type.clone()),
                data: BASE64.encode(&file.bytes),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    #[serde(default)]
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate, if any.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text = content
            .parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("");
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// One entry of the Gemini model listing.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|method| method == "generateContent")
    }
}
