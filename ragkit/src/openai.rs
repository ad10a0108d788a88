//! Embeddings from the OpenAI `/embeddings` endpoint (feature `openai`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::document::Embedding;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Output size of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

const PROVIDER: &str = "OpenAI";

fn failure(message: impl Into<String>) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message: message.into() }
}

/// An [`EmbeddingProvider`] for OpenAI or any server exposing the same
/// `/embeddings` API.
///
/// A whole batch goes out in one request; vectors come back in input order.
///
/// ```rust,ignore
/// use ragkit::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(256);
/// let vectors = provider.embed_many(&["first chunk", "second chunk"]).await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` when the caller asked for shortened vectors.
    requested_dimensions: Option<usize>,
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAIEmbeddingProvider {
    /// A provider for the public API using `text-embedding-3-small`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(failure("API key must not be empty"));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            requested_dimensions: None,
        })
    }

    /// Read `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL` and
    /// `OPENAI_EMBEDDING_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| failure("OPENAI_API_KEY environment variable not set"))?;
        let mut provider = Self::new(api_key)?;
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            provider = provider.with_base_url(url);
        }
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            provider = provider.with_model(model);
        }
        Ok(provider)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the API for vectors of `dims` components.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.requested_dimensions = Some(dims);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Vectors in input order; the API does not promise to preserve it.
fn into_ordered(mut response: EmbeddingResponse) -> Vec<Embedding> {
    response.data.sort_by_key(|item| item.index);
    response.data.into_iter().map(|item| item.embedding).collect()
}

/// The API's own error message when the body carries one.
fn api_error_detail(body: String) -> String {
    serde_json::from_str::<ApiErrorBody>(&body).map(|b| b.error.message).unwrap_or(body)
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embed_many(&[text])
            .await?
            .pop()
            .ok_or_else(|| failure("API returned no embedding"))
    }

    async fn embed_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            provider = PROVIDER,
            model = %self.model,
            batch_size = texts.len(),
            "embedding batch"
        );

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
                failure(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = api_error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, %detail, "embedding API error");
            return Err(failure(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "unreadable embedding response");
            failure(format!("failed to parse response: {e}"))
        })?;
        Ok(into_ordered(parsed))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
