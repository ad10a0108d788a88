//! Sends assembled prompts to a [`LanguageModel`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use ragkit_model::{
    FormattingFilter, GenerationConfig, LanguageModel, ModelError, Prompt, TextStream,
    strip_formatting,
};
use ragkit_telemetry::{TraceCollector, TraceRecord};
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::Result;

/// Wraps a language model with a fixed [`GenerationConfig`].
///
/// Both [`generate`](Generator::generate) and
/// [`generate_stream`](Generator::generate_stream) strip formatting wrappers
/// such as `<thinking>` blocks, so the two produce the same text up to
/// surrounding whitespace. Both emit a `rag.generate` [`TraceRecord`] when a
/// collector is configured.
#[derive(Clone)]
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    config: GenerationConfig,
    collector: Option<Arc<dyn TraceCollector>>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .field("traced", &self.collector.is_some())
            .finish()
    }
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model, config: GenerationConfig::default(), collector: None }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_trace_collector(mut self, collector: Arc<dyn TraceCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn start_record(&self, prompt: &str, streaming: bool) -> TraceRecord {
        TraceRecord::new(
            "rag.generate",
            json!({
                "model": self.config.model.as_deref().unwrap_or(self.model.name()),
                "prompt_chars": prompt.chars().count(),
                "streaming": streaming,
            }),
        )
    }

    fn emit(&self, record: TraceRecord) {
        if let Some(collector) = &self.collector {
            collector.record(record);
        }
    }

    /// Generate a complete answer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::GenerationError`](crate::RagError::GenerationError)
    /// wrapping the model's error unchanged.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let started = Instant::now();
        let mut record = self.start_record(prompt, false);
        debug!(model = %self.model.name(), prompt_chars = prompt.len(), "generating answer");

        let result = self.model.complete(Prompt::from(prompt), &self.config).await;
        record.set_latency(started.elapsed());

        match result {
            Ok(raw) => {
                let text = strip_formatting(&raw);
                record.outputs = Some(json!({ "text": text }));
                self.emit(record);
                info!(answer_chars = text.len(), "generation completed");
                Ok(text)
            }
            Err(e) => {
                error!(model = %self.model.name(), error = %e, "generation failed");
                record.error = Some(e.to_string());
                self.emit(record);
                Err(e.into())
            }
        }
    }

    /// Generate an answer incrementally.
    ///
    /// The returned stream is finite and single-pass. Dropping it cancels the
    /// request and records the run as cancelled.
    pub async fn generate_stream(&self, prompt: &str) -> Result<TextStream> {
        let mut record = self.start_record(prompt, true);
        let started = Instant::now();
        debug!(model = %self.model.name(), prompt_chars = prompt.len(), "starting answer stream");

        match self.model.stream(Prompt::from(prompt), &self.config).await {
            Ok(stream) => {
                let traced = TracedStream::new(stream, record, self.collector.clone(), started)
                    .stripping_formatting();
                Ok(Box::pin(traced))
            }
            Err(e) => {
                error!(model = %self.model.name(), error = %e, "stream request failed");
                record.set_latency(started.elapsed());
                record.error = Some(e.to_string());
                self.emit(record);
                Err(e.into())
            }
        }
    }
}

/// A text stream that completes a [`TraceRecord`] when it ends, fails, or is
/// dropped early.
pub(crate) struct TracedStream {
    inner: TextStream,
    text: String,
    run_started: Instant,
    stream_started: Instant,
    record: Option<TraceRecord>,
    collector: Option<Arc<dyn TraceCollector>>,
    stage: Option<&'static str>,
    filter: Option<FormattingFilter>,
}

impl TracedStream {
    /// `run_started` is when the traced operation began, which for a pipeline
    /// run is before retrieval.
    pub(crate) fn new(
        inner: TextStream,
        record: TraceRecord,
        collector: Option<Arc<dyn TraceCollector>>,
        run_started: Instant,
    ) -> Self {
        Self {
            inner,
            text: String::new(),
            run_started,
            stream_started: Instant::now(),
            record: Some(record),
            collector,
            stage: None,
            filter: None,
        }
    }

    /// Drop reasoning blocks from the fragments as they pass.
    pub(crate) fn stripping_formatting(mut self) -> Self {
        self.filter = Some(FormattingFilter::new());
        self
    }

    /// Also push the streaming time as a timing for `stage`.
    pub(crate) fn with_stage(mut self, stage: &'static str) -> Self {
        self.stage = Some(stage);
        self
    }

    fn finish(&mut self, error: Option<&ModelError>, cancelled: bool) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        if let Some(stage) = self.stage {
            record.push_stage(stage, self.stream_started.elapsed());
        }
        record.set_latency(self.run_started.elapsed());
        record.cancelled = cancelled;
        if let Some(e) = error {
            record.error = Some(e.to_string());
        }
        if !cancelled && error.is_none() {
            record.outputs = Some(json!({ "text": self.text }));
        }
        if cancelled {
            debug!(
                run.id = %record.run_id,
                received_chars = self.text.len(),
                "stream dropped before completion"
            );
        }
        if let Some(collector) = &self.collector {
            collector.record(record);
        }
    }
}

impl Stream for TracedStream {
    type Item = std::result::Result<String, ModelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.record.is_none() {
                return Poll::Ready(None);
            }
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(fragment))) => {
                    let fragment = match &mut this.filter {
                        Some(filter) => filter.push(&fragment),
                        None => fragment,
                    };
                    if fragment.is_empty() {
                        continue;
                    }
                    this.text.push_str(&fragment);
                    return Poll::Ready(Some(Ok(fragment)));
                }
                Poll::Ready(Some(Err(e))) => {
                    error!(error = %e, "answer stream failed");
                    this.finish(Some(&e), false);
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    // Closing the record makes the held-back tail the last item.
                    let tail =
                        this.filter.as_mut().map(FormattingFilter::finish).unwrap_or_default();
                    this.text.push_str(&tail);
                    this.finish(None, false);
                    return Poll::Ready((!tail.is_empty()).then(|| Ok(tail)));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for TracedStream {
    fn drop(&mut self) {
        self.finish(None, true);
    }
}
