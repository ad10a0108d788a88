//! Prompt templates and the assembler that fills them with retrieved context.
//!
//! A [`PromptTemplate`] declares named slots and renders them from
//! [`PromptValues`]. The [`PromptAssembler`] supplies the retrieved context and
//! the question for two of those slots; the wording of the prompt lives
//! entirely in the template supplied by the caller.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// Separator placed between chunk texts in the context slot.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Named values used to fill a template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptValues(HashMap<String, String>);

impl PromptValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PromptValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A prompt with named input slots.
pub trait PromptTemplate: Send + Sync {
    /// Names of the slots this template expects, in first-use order.
    fn input_variables(&self) -> &[String];

    /// Render the template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TemplateError`] when a slot has no value.
    fn format(&self, values: &PromptValues) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Slot(String),
}

/// A template using `{name}` placeholders, with `{{` and `}}` for literal braces.
///
/// # Example
///
/// ```rust
/// use ragkit::{PromptTemplate, PromptValues, StringPromptTemplate};
///
/// let template =
///     StringPromptTemplate::parse("Context: {context}\nQ: {question} {{json}}").unwrap();
/// assert_eq!(template.input_variables(), ["context", "question"]);
///
/// let values = PromptValues::new().with("context", "ctx").with("question", "why?");
/// assert_eq!(template.format(&values).unwrap(), "Context: ctx\nQ: why? {json}");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StringPromptTemplate {
    source: String,
    segments: Vec<Segment>,
    variables: Vec<String>,
}

impl StringPromptTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TemplateError`] for unbalanced braces or empty or
    /// malformed slot names.
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut variables: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if chars.peek().map(|(_, n)| *n) == Some('{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek().map(|(_, n)| *n) == Some('}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, n) in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(template_error(format!("unclosed '{{' at byte {pos}")));
                    }
                    let name = name.trim().to_string();
                    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                        let message = format!("invalid slot name '{name}' at byte {pos}");
                        return Err(template_error(message));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    if !variables.contains(&name) {
                        variables.push(name.clone());
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => return Err(template_error(format!("unmatched '}}' at byte {pos}"))),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { source, segments, variables })
    }

    /// The template text as given to [`parse`](Self::parse).
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PromptTemplate for StringPromptTemplate {
    fn input_variables(&self) -> &[String] {
        &self.variables
    }

    fn format(&self, values: &PromptValues) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| template_error(format!("missing value for slot '{name}'")))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn template_error(message: String) -> RagError {
    warn!(%message, "prompt template error");
    RagError::TemplateError(message)
}

/// Fills a [`PromptTemplate`] with retrieved context and a question.
///
/// Chunk texts are joined in rank order with [`CONTEXT_SEPARATOR`]. When a
/// character limit is set, an oversized prompt is rejected with
/// [`RagError::ContextTooLarge`] rather than truncated.
#[derive(Clone)]
pub struct PromptAssembler {
    template: Arc<dyn PromptTemplate>,
    context_slot: String,
    question_slot: String,
    max_chars: Option<usize>,
}

impl std::fmt::Debug for PromptAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptAssembler")
            .field("input_variables", &self.template.input_variables())
            .field("context_slot", &self.context_slot)
            .field("question_slot", &self.question_slot)
            .field("max_chars", &self.max_chars)
            .finish()
    }
}

impl PromptAssembler {
    /// Create an assembler using the `context` and `question` slots.
    pub fn new(template: Arc<dyn PromptTemplate>) -> Self {
        Self {
            template,
            context_slot: "context".to_string(),
            question_slot: "question".to_string(),
            max_chars: None,
        }
    }

    pub fn with_slots(mut self, context: impl Into<String>, question: impl Into<String>) -> Self {
        self.context_slot = context.into();
        self.question_slot = question.into();
        self
    }

    pub fn with_max_chars(mut self, limit: Option<usize>) -> Self {
        self.max_chars = limit;
        self
    }

    pub fn max_chars(&self) -> Option<usize> {
        self.max_chars
    }

    /// Join chunk texts in rank order.
    pub fn context(results: &[SearchResult]) -> String {
        results.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
    }

    /// Render the prompt for `question` from `results`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::TemplateError`] if the template needs slots other
    /// than the context and question slots, and
    /// [`RagError::ContextTooLarge`] if the prompt exceeds the limit.
    pub fn assemble(&self, results: &[SearchResult], question: &str) -> Result<String> {
        let values = PromptValues::new()
            .with(self.context_slot.as_str(), Self::context(results))
            .with(self.question_slot.as_str(), question);
        let prompt = self.template.format(&values)?;

        let size = prompt.chars().count();
        if let Some(limit) = self.max_chars {
            if size > limit {
                warn!(size, limit, "assembled prompt exceeds limit");
                return Err(RagError::ContextTooLarge { size, limit });
            }
        }

        debug!(chunks = results.len(), prompt_chars = size, "assembled prompt");
        Ok(prompt)
    }
}
