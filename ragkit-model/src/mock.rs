//! A scriptable in-process [`LanguageModel`] for tests and offline demos.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::llm::{GenerationConfig, LanguageModel, Prompt, TextStream};

type Responder = Arc<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Mock LLM for testing.
///
/// The response is produced by a responder function over the flattened prompt
/// text (message contents joined by blank lines). Streaming yields one
/// fragment per whitespace-delimited token, and `max_tokens` caps the number
/// of fragments, so [`complete`](LanguageModel::complete) and
/// [`stream`](LanguageModel::stream) agree.
///
/// # Example
///
/// ```rust
/// use ragkit_model::MockLlm;
///
/// let model = MockLlm::new("mock").with_response("Paris is the capital of France.");
/// assert_eq!(model.call_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockLlm {
    name: String,
    responder: Responder,
    max_input_chars: Option<usize>,
    stream_error_after: Option<usize>,
    calls: Arc<Mutex<Vec<Prompt>>>,
}

impl std::fmt::Debug for MockLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlm")
            .field("name", &self.name)
            .field("max_input_chars", &self.max_input_chars)
            .field("stream_error_after", &self.stream_error_after)
            .finish_non_exhaustive()
    }
}

impl MockLlm {
    /// A mock that answers every prompt with `"mock response"`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_fn(name, |_| Ok("mock response".to_string()))
    }

    /// A mock whose answer is computed from the prompt text.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            responder: Arc::new(f),
            max_input_chars: None,
            stream_error_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that fails every request with `error`.
    pub fn failing(name: impl Into<String>, error: ModelError) -> Self {
        Self::from_fn(name, move |_| Err(error.clone()))
    }

    /// Answer every prompt with `text`.
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.responder = Arc::new(move |_: &str| Ok(text.clone()));
        self
    }

    pub fn with_max_input_chars(mut self, limit: usize) -> Self {
        self.max_input_chars = Some(limit);
        self
    }

    /// Make the stream fail after yielding `fragments` fragments.
    pub fn with_stream_error_after(mut self, fragments: usize) -> Self {
        self.stream_error_after = Some(fragments);
        self
    }

    /// Prompts received so far, oldest first.
    pub fn calls(&self) -> Vec<Prompt> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn prompt_text(prompt: &Prompt) -> String {
        match prompt {
            Prompt::Text(text) => text.clone(),
            Prompt::Messages(messages) => {
                messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n\n")
            }
        }
    }
}

/// Split text into fragments of one token plus its trailing whitespace.
fn fragments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut seen_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            seen_space = true;
        } else if seen_space && !current.is_empty() {
            out.push(std::mem::take(&mut current));
            seen_space = false;
        }
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[async_trait]
impl LanguageModel for MockLlm {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.max_input_chars
    }

    async fn stream(&self, prompt: Prompt, config: &GenerationConfig) -> Result<TextStream> {
        config.validate()?;
        let text = Self::prompt_text(&prompt);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt);
        }

        let response = (self.responder)(&text)?;
        let mut parts = fragments(&response);
        if let Some(max) = config.max_tokens {
            parts.truncate(max as usize);
        }
        debug!(model = %self.name, fragments = parts.len(), "mock generation");

        let fail_after = self.stream_error_after;
        let stream = async_stream::try_stream! {
            for (i, part) in parts.into_iter().enumerate() {
                if fail_after == Some(i) {
                    Err::<(), _>(ModelError::Stream("mock stream interrupted".to_string()))?;
                }
                yield part;
            }
        };
        Ok(Box::pin(stream))
    }
}
