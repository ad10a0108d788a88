//! OpenAI client implementation.

use super::config::OpenAIConfig;
use super::convert;
use crate::error::{ModelError, Result};
use crate::llm::{GenerationConfig, LanguageModel, Prompt, TextStream};
use async_openai::{
    Client,
    config::OpenAIConfig as AsyncOpenAIConfig,
    types::{CreateChatCompletionRequest, CreateChatCompletionRequestArgs},
};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error};

/// OpenAI client for standard OpenAI API and OpenAI-compatible APIs.
pub struct OpenAIClient {
    client: Client<AsyncOpenAIConfig>,
    model: String,
    max_input_chars: Option<usize>,
}

impl OpenAIClient {
    /// Create a new OpenAI client.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        if config.api_key.is_empty() && config.base_url.is_none() {
            return Err(ModelError::Config("API key must not be empty".to_string()));
        }

        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(org_id) = &config.organization_id {
            openai_config = openai_config.with_org_id(org_id);
        }

        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model,
            max_input_chars: None,
        })
    }

    /// Create a client for an OpenAI-compatible API.
    pub fn compatible(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::new(OpenAIConfig::compatible(api_key, base_url, model))
    }

    /// Create a client from `OPENAI_API_KEY` / `OPENAI_MODEL` / `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    /// Declare the model's prompt limit in characters.
    pub fn with_max_input_chars(mut self, limit: usize) -> Self {
        self.max_input_chars = Some(limit);
        self
    }

    fn build_request(
        &self,
        prompt: Prompt,
        config: &GenerationConfig,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = prompt
            .into_messages()
            .iter()
            .map(convert::to_request_message)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(convert::model_error)?;

        let model = config.model.as_deref().unwrap_or(&self.model);
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(model).messages(messages);

        if let Some(temp) = config.temperature {
            request_builder.temperature(temp);
        }
        if let Some(top_p) = config.top_p {
            request_builder.top_p(top_p);
        }
        if let Some(max_tokens) = config.max_tokens {
            request_builder.max_tokens(max_tokens);
        }

        request_builder.build().map_err(convert::model_error)
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn stream(&self, prompt: Prompt, config: &GenerationConfig) -> Result<TextStream> {
        config.validate()?;
        let request = self.build_request(prompt, config)?;
        debug!(model = %request.model, messages = request.messages.len(), "starting chat stream");

        let mut stream = self.client.chat().create_stream(request).await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "stream request failed");
            convert::model_error(e)
        })?;

        let text = try_stream! {
            while let Some(result) = stream.next().await {
                let chunk = result.map_err(convert::model_error)?;
                for choice in chunk.choices {
                    // Only the first choice is surfaced.
                    if choice.index != 0 {
                        continue;
                    }
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            yield content;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(text))
    }

    async fn complete(&self, prompt: Prompt, config: &GenerationConfig) -> Result<String> {
        config.validate()?;
        let request = self.build_request(prompt, config)?;
        debug!(model = %request.model, messages = request.messages.len(), "chat completion");

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "completion request failed");
            convert::model_error(e)
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ModelError::EmptyResponse)
    }
}
