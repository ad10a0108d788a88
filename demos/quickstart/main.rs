//! # RAG Quickstart
//!
//! Indexes local text files and answers a question about them, fully offline:
//! `HashingEmbeddingProvider` for embeddings and a `MockLlm` that answers by
//! quoting the opening sentences of the retrieved context.
//!
//! Run: `cargo run --example rag_quickstart -- --question "What is Task Decomposition?"`
//!
//! Pass `--stream` to print the answer as it is generated and
//! `RUST_LOG=ragkit=debug` to see each pipeline stage.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use ragkit::{
    HashingEmbeddingProvider, RagConfig, RagPipeline, SearchResult, StringPromptTemplate,
    TextFileSource,
};
use ragkit_model::{GenerationConfig, MockLlm};
use ragkit_telemetry::LogTraceCollector;

const RAG_PROMPT: &str = "You are an assistant for question-answering tasks. Use the following \
pieces of retrieved context to answer the question. If you don't know the answer, just say that \
you don't know. Use three sentences maximum and keep the answer concise.
Question: {question}
Context: {context}
Answer:";

#[derive(Debug, Parser)]
#[command(about = "Answer a question from local documents with an offline RAG pipeline")]
struct Args {
    /// Question to answer.
    #[arg(short, long, default_value = "What is Task Decomposition?")]
    question: String,

    /// Files or directories to index (`.txt` and `.md`). Defaults to the
    /// bundled sample article.
    #[arg(short, long)]
    path: Vec<PathBuf>,

    #[arg(long, env = "RAGKIT_CHUNK_SIZE", default_value_t = 1000)]
    chunk_size: usize,

    #[arg(long, env = "RAGKIT_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    #[arg(short = 'k', long, env = "RAGKIT_TOP_K", default_value_t = 6)]
    top_k: usize,

    /// Print the answer fragment by fragment.
    #[arg(long)]
    stream: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Answer with the first three sentences of the prompt's context section.
fn extractive_answer(prompt: &str) -> ragkit_model::Result<String> {
    let context = prompt
        .split_once("Context: ")
        .and_then(|(_, rest)| rest.rsplit_once("\nAnswer:"))
        .map(|(context, _)| context.trim())
        .unwrap_or_default();
    if context.is_empty() {
        return Ok("I don't know.".to_string());
    }

    let sentences: Vec<&str> = context
        .split_inclusive(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .take(3)
        .collect();
    Ok(sentences.join(" "))
}

fn print_sources(sources: &[SearchResult]) {
    println!("\nSources:");
    for (rank, result) in sources.iter().enumerate() {
        let preview: String = result.chunk.text.chars().take(60).collect();
        println!(
            "  {}. [{:.3}] {} @{}: {}...",
            rank + 1,
            result.score,
            result.chunk.id,
            result.chunk.start_index().unwrap_or_default(),
            preview.replace('\n', " "),
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    ragkit_telemetry::init_telemetry("rag-quickstart")?;
    let args = Args::parse();

    let config = RagConfig::builder()
        .chunk_size(args.chunk_size)
        .chunk_overlap(args.chunk_overlap)
        .top_k(args.top_k)
        .build()?;

    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(HashingEmbeddingProvider::default()))
        .template(Arc::new(StringPromptTemplate::parse(RAG_PROMPT)?))
        .language_model(Arc::new(MockLlm::from_fn("extractive", extractive_answer)))
        .generation_config(GenerationConfig::new().with_temperature(0.0))
        .trace_collector(Arc::new(LogTraceCollector))
        .build()?;

    // -- Offline phase: load, chunk, embed, index -------------------------
    let paths = if args.path.is_empty() { vec![default_data_dir()] } else { args.path.clone() };
    let report = pipeline.load_and_index(&TextFileSource::new(paths)).await?;
    println!("Indexed {} chunks from {} documents", report.chunks, report.documents);

    // -- Online phase: retrieve, assemble, generate -----------------------
    println!("\nQ: {}\nA: ", args.question);
    if args.stream {
        let mut stream = pipeline.answer_stream(&args.question).await?;
        let sources = stream.sources().to_vec();
        while let Some(fragment) = stream.next().await {
            print!("{}", fragment?);
            std::io::stdout().flush()?;
        }
        println!();
        print_sources(&sources);
    } else {
        let answer = pipeline.answer_with_sources(&args.question).await?;
        println!("{}", answer.text);
        print_sources(&answer.sources);
    }

    Ok(())
}
