//! The [`LanguageModel`] trait and its request types.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// The author of a chat [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to a [`LanguageModel`]: either a single text prompt or a message list.
///
/// A text prompt is sent as one user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
}

impl Prompt {
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Prompt::Text(text) => vec![Message::user(text)],
            Prompt::Messages(messages) => messages,
        }
    }

    /// Total character count across all message contents.
    pub fn char_len(&self) -> usize {
        match self {
            Prompt::Text(text) => text.chars().count(),
            Prompt::Messages(messages) => messages.iter().map(|m| m.content.chars().count()).sum(),
        }
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<Vec<Message>> for Prompt {
    fn from(messages: Vec<Message>) -> Self {
        Prompt::Messages(messages)
    }
}

/// Per-request generation settings.
///
/// Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Overrides the model identifier the client was built with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GenerationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Check value ranges before a request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Config`] if `temperature` is outside `0.0..=2.0`,
    /// `top_p` is outside `(0.0, 1.0]`, or `max_tokens` is zero.
    pub fn validate(&self) -> Result<()> {
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ModelError::Config(format!(
                    "temperature ({t}) must be between 0.0 and 2.0"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(ModelError::Config(format!("top_p ({p}) must be in (0.0, 1.0]")));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(ModelError::Config("max_tokens must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// A finite, single-pass stream of text fragments.
///
/// Dropping the stream cancels the underlying request.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A text-generating language model.
///
/// Backends implement [`stream`](LanguageModel::stream); the default
/// [`complete`](LanguageModel::complete) drains that stream, so both modes
/// return the same text for the same prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The model identifier.
    fn name(&self) -> &str;

    /// Largest prompt, in characters, the model accepts. `None` means unknown.
    fn max_input_chars(&self) -> Option<usize> {
        None
    }

    /// Start a generation and return its text fragments as they arrive.
    async fn stream(&self, prompt: Prompt, config: &GenerationConfig) -> Result<TextStream>;

    /// Generate the full completion.
    async fn complete(&self, prompt: Prompt, config: &GenerationConfig) -> Result<String> {
        let stream = self.stream(prompt, config).await?;
        collect_text(stream).await
    }
}

/// Drain a [`TextStream`] into one string, failing on the first error.
pub async fn collect_text(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}

const REASONING_TAGS: [(&str, &str); 2] = [("<thinking>", "</thinking>"), ("<think>", "</think>")];

/// Remove model-specific wrappers from a completion.
///
/// Strips `<thinking>...</thinking>` and `<think>...</think>` reasoning
/// blocks and surrounding whitespace. An unclosed tag is left as-is.
pub fn strip_formatting(text: &str) -> String {
    let mut out = text.to_string();
    for (open, close) in REASONING_TAGS {
        while let Some(start) = out.find(open) {
            let Some(rel_end) = out[start..].find(close) else { break };
            out.replace_range(start..start + rel_end + close.len(), "");
        }
    }
    out.trim().to_string()
}

/// The incremental counterpart of [`strip_formatting`].
///
/// Text that may open a reasoning block is held back until the block closes
/// (and is dropped) or the stream ends (and it is released unchanged).
/// Leading whitespace is dropped; trailing whitespace is passed through.
///
/// ```rust
/// use ragkit_model::FormattingFilter;
///
/// let mut filter = FormattingFilter::new();
/// assert_eq!(filter.push("<think>pla"), "");
/// assert_eq!(filter.push("n</think> The "), "The ");
/// assert_eq!(filter.push("answer."), "answer.");
/// assert_eq!(filter.finish(), "");
/// ```
#[derive(Debug, Clone, Default)]
pub struct FormattingFilter {
    pending: String,
    started: bool,
}

impl FormattingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a fragment, returning the text that is safe to emit now.
    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let mut out = String::new();

        loop {
            let opened = REASONING_TAGS
                .iter()
                .filter_map(|&(open, close)| self.pending.find(open).map(|at| (at, open, close)))
                .min_by_key(|&(at, ..)| at);

            let Some((at, open, close)) = opened else {
                let keep = partial_tag_len(&self.pending);
                let ready = self.pending.len() - keep;
                out.extend(self.pending.drain(..ready));
                break;
            };

            out.extend(self.pending.drain(..at));
            match self.pending[open.len()..].find(close) {
                Some(rel) => self.pending.replace_range(..open.len() + rel + close.len(), ""),
                None => break,
            }
        }
        self.emit(out)
    }

    /// Release whatever is still held back, including an unclosed block.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        self.emit(rest)
    }

    fn emit(&mut self, text: String) -> String {
        if self.started {
            return text;
        }
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return String::new();
        }
        self.started = true;
        trimmed.to_string()
    }
}

/// Length of the longest suffix of `text` that could begin an opening tag.
fn partial_tag_len(text: &str) -> usize {
    REASONING_TAGS
        .iter()
        .flat_map(|(open, _)| (1..open.len()).rev().find(|&k| text.ends_with(&open[..k])))
        .max()
        .unwrap_or(0)
}
