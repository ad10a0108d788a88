//! End-to-end tests for the RAG pipeline with offline components.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use ragkit::document::{Embedding, IndexEntry, SearchResult};
use ragkit::{
    Document, EmbeddingProvider, HashingEmbeddingProvider, PipelineStage, RagConfig, RagError,
    RagPipeline, RagPipelineBuilder, Reranker, StaticSource, StringPromptTemplate,
    TextFileSource, VectorStore,
};
use ragkit_model::{GenerationConfig, MockLlm, ModelError};
use ragkit_telemetry::InMemoryTraceCollector;

const TEMPLATE: &str = "You are an assistant for question-answering tasks. Use the following \
pieces of retrieved context to answer the question. If you don't know the answer, just say that \
you don't know. Use three sentences maximum and keep the answer concise.\n\
Question: {question}\nContext: {context}\nAnswer:";

const QUESTION: &str = "What is Task Decomposition?";

const ARTICLE: &str = "Agents built around a language model use it as the core controller. \
The model is complemented by planning, memory, and tool use, and the interesting behaviour comes \
from running them in a loop until the goal is reached.

Planning

A complicated task usually involves many steps. An agent needs to know what they are and plan \
ahead, and it needs to reflect on past actions so that later attempts improve.

Task Decomposition

Task decomposition is the process of breaking a complicated task into smaller and simpler steps. \
Chain of thought prompting instructs the model to think step by step, which spends more \
computation to decompose hard tasks into smaller subgoals.

Tree of thoughts extends this by exploring several reasoning paths at each step. The problem is \
decomposed into thought steps with several candidate thoughts per step, forming a tree that is \
searched breadth-first or depth-first.

Task decomposition can be done by the model with simple prompting such as \"Steps for XYZ\" or \
\"What are the subgoals for achieving XYZ?\", with task-specific instructions, or with human \
inputs. Another approach hands long-horizon planning to an external classical planner.

Self-Reflection

Self-reflection lets agents improve iteratively by refining past decisions and correcting \
mistakes. Reasoning and acting can be interleaved so the trajectory alternates between thought, \
action, and observation steps.

Memory

Short-term memory corresponds to in-context learning and is bounded by the context window. \
Long-term memory keeps information over extended periods, usually in an external vector store \
with fast maximum inner product search.

Tool Use

Tools extend what a model can do: calculators for arithmetic, search engines for fresh knowledge, \
and code interpreters for precise computation. The agent decides which tool to call and how to use \
the result in the next step of its plan.";

const CANNED_ANSWER: &str = "Task decomposition breaks a complicated task into smaller steps \
and subgoals, often by prompting the model to think step by step.";

fn config() -> RagConfig {
    RagConfig::builder().chunk_size(400).chunk_overlap(80).top_k(6).build().unwrap()
}

fn builder(model: &MockLlm) -> RagPipelineBuilder {
    RagPipeline::builder()
        .config(config())
        .embedding_provider(Arc::new(HashingEmbeddingProvider::new(256)))
        .template(Arc::new(StringPromptTemplate::parse(TEMPLATE).unwrap()))
        .language_model(Arc::new(model.clone()))
}

fn article() -> Document {
    Document::new("agents", ARTICLE).with_source_uri("https://example.com/agents")
}

fn answering_model() -> MockLlm {
    MockLlm::from_fn("mock", |prompt| {
        if prompt.contains("Task decomposition") {
            Ok(CANNED_ANSWER.to_string())
        } else {
            Ok("I don't know.".to_string())
        }
    })
}

struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> ragkit::Result<Embedding> {
        Err(RagError::EmbeddingError { provider: "failing".into(), message: "offline".into() })
    }

    fn dimensions(&self) -> usize {
        8
    }
}

struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn upsert(&self, _entries: Vec<IndexEntry>) -> ragkit::Result<()> {
        Err(RagError::VectorStoreError { backend: "broken".into(), message: "disk full".into() })
    }

    async fn search(&self, _embedding: &[f32], _top_k: usize) -> ragkit::Result<Vec<SearchResult>> {
        Err(RagError::VectorStoreError { backend: "broken".into(), message: "offline".into() })
    }

    async fn clear(&self) -> ragkit::Result<()> {
        Ok(())
    }

    async fn len(&self) -> ragkit::Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn answers_task_decomposition_question() {
    let model = answering_model();
    let pipeline = builder(&model)
        .generation_config(GenerationConfig::new().with_temperature(0.0))
        .build()
        .unwrap();

    let report = pipeline.index_documents(&[article()]).await.unwrap();
    assert_eq!(report.documents, 1);
    assert!(report.chunks >= 6, "expected at least 6 chunks, got {}", report.chunks);

    let answer = pipeline.answer_with_sources(QUESTION).await.unwrap();
    assert_eq!(answer.sources.len(), 6);
    assert!(answer.sources.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(answer.text.contains("subgoals"));
    assert_eq!(model.call_count(), 1);

    let prompt = model.calls()[0].clone().into_messages().remove(0).content;
    assert!(prompt.contains("Question: What is Task Decomposition?"));
    assert!(prompt.contains(&answer.sources[0].chunk.text));
    assert!(prompt.ends_with("Answer:"));
}

#[tokio::test]
async fn sources_carry_offsets_into_the_document() {
    let model = answering_model();
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    for result in pipeline.retrieve(QUESTION).await.unwrap() {
        let start = result.chunk.start_index().unwrap();
        let slice: String =
            ARTICLE.chars().skip(start).take(result.chunk.text.chars().count()).collect();
        assert_eq!(slice, result.chunk.text);
        assert_eq!(result.chunk.document_id, "agents");
    }
}

#[tokio::test]
async fn max_tokens_caps_the_answer() {
    let model = answering_model();
    let pipeline = builder(&model)
        .generation_config(GenerationConfig::new().with_max_tokens(5))
        .build()
        .unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let text = pipeline.answer(QUESTION).await.unwrap();
    assert_eq!(text, "Task decomposition breaks a complicated");
}

#[tokio::test]
async fn streamed_answer_matches_atomic_answer() {
    let model = answering_model();
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let atomic = pipeline.answer_with_sources(QUESTION).await.unwrap();
    let stream = pipeline.answer_stream(QUESTION).await.unwrap();
    assert_eq!(stream.sources(), atomic.sources.as_slice());

    let streamed = stream.collect_answer().await.unwrap();
    assert_eq!(streamed, atomic);
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn streamed_answer_drops_reasoning_like_atomic_answer() {
    let model = MockLlm::new("mock").with_response("<think>plan first</think> Use subgoals.");
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let atomic = pipeline.answer(QUESTION).await.unwrap();
    let streamed = pipeline.answer_stream(QUESTION).await.unwrap().collect_answer().await.unwrap();
    assert_eq!(atomic, "Use subgoals.");
    assert_eq!(streamed.text.trim(), atomic);
}

#[tokio::test]
async fn stream_yields_fragments_in_order() {
    let model = MockLlm::new("mock").with_response("one two three");
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let fragments: Vec<String> = pipeline
        .answer_stream(QUESTION)
        .await
        .unwrap()
        .map(|fragment| fragment.unwrap())
        .collect()
        .await;
    assert_eq!(fragments, vec!["one ", "two ", "three"]);
}

#[tokio::test]
async fn load_failure_is_tagged_load() {
    let model = answering_model();
    let pipeline = builder(&model).build().unwrap();

    let err = pipeline
        .load_and_index(&TextFileSource::new(["/no/such/ragkit/article.txt"]))
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Load));
    assert!(matches!(err.root(), RagError::LoadError { .. }));
    assert_eq!(pipeline.vector_store().len().await.unwrap(), 0);
}

#[tokio::test]
async fn load_and_index_reports_counts() {
    let model = answering_model();
    let pipeline = builder(&model).build().unwrap();

    let source = StaticSource::new(vec![article(), Document::new("short", "A short note.")]);
    let report = pipeline.load_and_index(&source).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(pipeline.vector_store().len().await.unwrap(), report.chunks);
}

#[tokio::test]
async fn embedding_failure_is_tagged_embed() {
    let model = answering_model();
    let pipeline = builder(&model).embedding_provider(Arc::new(FailingEmbedder)).build().unwrap();

    let err = pipeline.index_documents(&[article()]).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Embed));

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Embed));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn store_failures_are_tagged_by_phase() {
    let model = answering_model();
    let pipeline = builder(&model).vector_store(Arc::new(BrokenStore)).build().unwrap();

    let err = pipeline.index_documents(&[article()]).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Index));
    assert!(matches!(err.root(), RagError::VectorStoreError { .. }));

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Retrieve));
}

/// A reranker whose scoring backend is unavailable.
struct OfflineReranker;

#[async_trait]
impl Reranker for OfflineReranker {
    async fn rerank(
        &self,
        _query: &str,
        _results: Vec<SearchResult>,
    ) -> ragkit::Result<Vec<SearchResult>> {
        Err(RagError::RerankerError {
            reranker: "cross-encoder".into(),
            message: "scoring service unavailable".into(),
        })
    }
}

#[tokio::test]
async fn reranker_failure_is_tagged_retrieve() {
    let model = answering_model();
    let pipeline = builder(&model).reranker(Arc::new(OfflineReranker)).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Retrieve));
    assert!(matches!(
        err.root(),
        RagError::RerankerError { reranker, .. } if reranker == "cross-encoder"
    ));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn model_failure_is_tagged_generate_with_cause() {
    let model = MockLlm::failing(
        "mock",
        ModelError::RateLimited { provider: "mock".into(), message: "slow down".into() },
    );
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Generate));
    assert!(matches!(
        err.root(),
        RagError::GenerationError(ModelError::RateLimited { message, .. }) if message == "slow down"
    ));
}

#[tokio::test]
async fn oversized_prompt_is_tagged_assemble() {
    let model = answering_model().with_max_input_chars(300);
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let err = pipeline.answer(QUESTION).await.unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Assemble));
    assert!(matches!(err.root(), RagError::ContextTooLarge { limit: 300, .. }));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn stream_error_surfaces_once_then_ends() {
    let model = MockLlm::new("mock").with_response("a b c d").with_stream_error_after(2);
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let items: Vec<_> = pipeline.answer_stream(QUESTION).await.unwrap().collect().await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok() && items[1].is_ok());
    let err = items[2].as_ref().unwrap_err();
    assert_eq!(err.stage(), Some(PipelineStage::Generate));
}

#[tokio::test]
async fn answer_emits_trace_records() {
    let collector = Arc::new(InMemoryTraceCollector::new());
    let model = answering_model();
    let pipeline = builder(&model).trace_collector(collector.clone()).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    pipeline.answer(QUESTION).await.unwrap();

    let records = collector.records();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["rag.generate", "rag.answer"]);

    let answer = &records[1];
    assert!(!answer.is_error());
    assert_eq!(answer.inputs["question"], QUESTION);
    assert_eq!(answer.outputs.as_ref().unwrap()["sources"].as_array().unwrap().len(), 6);
    for stage in ["retrieve", "assemble", "generate"] {
        assert!(answer.stage(stage).is_some(), "missing stage {stage}");
    }
}

#[tokio::test]
async fn failed_answer_is_recorded_as_error() {
    let collector = Arc::new(InMemoryTraceCollector::new());
    let model = MockLlm::failing("mock", ModelError::EmptyResponse);
    let pipeline = builder(&model).trace_collector(collector.clone()).build().unwrap();

    assert!(pipeline.answer(QUESTION).await.is_err());
    let last = collector.last().unwrap();
    assert_eq!(last.name, "rag.answer");
    assert!(last.is_error());
}

#[tokio::test]
async fn dropped_stream_is_recorded_as_cancelled() {
    let collector = Arc::new(InMemoryTraceCollector::new());
    let model = MockLlm::new("mock").with_response("one two three four");
    let pipeline = builder(&model).trace_collector(collector.clone()).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    let mut stream = pipeline.answer_stream(QUESTION).await.unwrap();
    let run_id = stream.run_id();
    assert_eq!(stream.next().await.unwrap().unwrap(), "one ");
    drop(stream);

    let records = collector.records();
    let run = records.iter().find(|r| r.run_id == run_id).unwrap();
    assert_eq!(run.name, "rag.answer_stream");
    assert!(run.cancelled);
    assert!(run.stage("retrieve").is_some());
}

#[tokio::test]
async fn indexing_twice_duplicates_entries() {
    let model = answering_model();
    let pipeline = builder(&model).build().unwrap();

    let first = pipeline.index_documents(&[article()]).await.unwrap();
    let second = pipeline.index_documents(&[article()]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(pipeline.vector_store().len().await.unwrap(), first.chunks * 2);

    let results = pipeline.retrieve(QUESTION).await.unwrap();
    assert_eq!(results[0].chunk, results[1].chunk);
    assert_eq!(results[0].score, results[1].score);
}

#[tokio::test]
async fn cleared_index_still_answers_without_sources() {
    let model = MockLlm::from_fn("echo", |prompt| Ok(prompt.to_string()));
    let pipeline = builder(&model).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();

    pipeline.clear().await.unwrap();
    assert!(pipeline.vector_store().is_empty().await.unwrap());

    let answer = pipeline.answer_with_sources(QUESTION).await.unwrap();
    assert!(answer.sources.is_empty());
    assert!(answer.text.contains("Context: \nAnswer:"));
}

#[tokio::test]
async fn concurrent_answers_share_the_index() {
    let model = answering_model();
    let pipeline = Arc::new(builder(&model).build().unwrap());
    pipeline.index_documents(&[article()]).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.answer_with_sources(QUESTION).await.unwrap() })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().sources.len(), 6);
    }
    assert_eq!(model.call_count(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn answer_span_is_captured_under_the_run_id() {
    use ragkit_telemetry::{InMemoryTraceLayer, SharedTraceStorage};
    use tracing_subscriber::layer::SubscriberExt;

    let storage = Arc::new(SharedTraceStorage::new());
    let subscriber = tracing_subscriber::registry().with(InMemoryTraceLayer::new(storage.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let collector = Arc::new(InMemoryTraceCollector::new());
    let model = answering_model();
    let pipeline = builder(&model).trace_collector(collector.clone()).build().unwrap();
    pipeline.index_documents(&[article()]).await.unwrap();
    pipeline.answer(QUESTION).await.unwrap();

    let run_id = collector.last().unwrap().run_id.to_string();
    let spans = storage.get_trace(&run_id).unwrap();
    assert_eq!(spans.last().unwrap().name, "rag.answer");
}
