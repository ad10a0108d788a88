//! Configuration for the OpenAI client.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Model used when none is given.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection settings for [`OpenAIClient`](super::OpenAIClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Base URL for OpenAI-compatible servers. `None` uses the public API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), model: model.into(), organization_id: None, base_url: None }
    }

    /// Config for an OpenAI-compatible API at `base_url`.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self { base_url: Some(base_url.into()), ..Self::new(api_key, model) }
    }

    /// Read `OPENAI_API_KEY`, and optionally `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let mut config = Self::new(api_key, model);
        config.base_url = std::env::var("OPENAI_BASE_URL").ok();
        Ok(config)
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}
