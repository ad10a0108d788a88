//! Conversions between ragkit and `async-openai` types.

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};

use crate::error::ModelError;
use crate::llm::{Message, Role};

const PROVIDER: &str = "OpenAI";

pub(crate) fn to_request_message(
    message: &Message,
) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        Role::System => {
            ChatCompletionRequestSystemMessageArgs::default().content(content).build()?.into()
        }
        Role::User => {
            ChatCompletionRequestUserMessageArgs::default().content(content).build()?.into()
        }
        Role::Assistant => {
            ChatCompletionRequestAssistantMessageArgs::default().content(content).build()?.into()
        }
    })
}

/// Map a client error onto [`ModelError`], keeping the provider message verbatim.
pub(crate) fn model_error(err: OpenAIError) -> ModelError {
    match err {
        OpenAIError::ApiError(api) => {
            if api.message.to_ascii_lowercase().contains("rate limit") {
                ModelError::RateLimited { provider: PROVIDER.into(), message: api.message }
            } else {
                ModelError::Request { provider: PROVIDER.into(), message: api.message }
            }
        }
        OpenAIError::StreamError(message) => ModelError::Stream(message),
        OpenAIError::InvalidArgument(message) => ModelError::Config(message),
        other => ModelError::Request { provider: PROVIDER.into(), message: other.to_string() },
    }
}
