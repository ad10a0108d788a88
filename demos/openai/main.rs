//! # RAG with OpenAI
//!
//! Fetches a web page, indexes it with OpenAI embeddings, and streams an
//! answer from an OpenAI chat model.
//!
//! Requires `OPENAI_API_KEY`. `OPENAI_MODEL` and `OPENAI_BASE_URL` are
//! honoured, so any OpenAI-compatible server works.
//!
//! Run: `cargo run --example rag_openai --features openai`

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use ragkit::{HttpSource, OpenAIEmbeddingProvider, RagConfig, RagPipeline, StringPromptTemplate};
use ragkit_model::{GenerationConfig, OpenAIClient};
use ragkit_telemetry::LogTraceCollector;
use tracing::info;

const RAG_PROMPT: &str = "You are an assistant for question-answering tasks. Use the following \
pieces of retrieved context to answer the question. If you don't know the answer, just say that \
you don't know. Use three sentences maximum and keep the answer concise.
Question: {question}
Context: {context}
Answer:";

#[derive(Debug, Parser)]
#[command(about = "Answer a question about a web page with OpenAI models")]
struct Args {
    #[arg(short, long, default_value = "What is Task Decomposition?")]
    question: String,

    /// Pages to index.
    #[arg(short, long, default_value = "https://lilianweng.github.io/posts/2023-06-23-agent/")]
    url: Vec<String>,

    #[arg(short = 'k', long, env = "RAGKIT_TOP_K", default_value_t = 6)]
    top_k: usize,

    /// Cap on generated tokens.
    #[arg(long, default_value_t = 256)]
    max_tokens: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    ragkit_telemetry::init_telemetry("rag-openai")?;
    let args = Args::parse();

    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(1000).chunk_overlap(200).top_k(args.top_k).build()?)
        .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
        .template(Arc::new(StringPromptTemplate::parse(RAG_PROMPT)?))
        .language_model(Arc::new(OpenAIClient::from_env()?))
        .generation_config(
            GenerationConfig::new().with_temperature(0.0).with_max_tokens(args.max_tokens),
        )
        .trace_collector(Arc::new(LogTraceCollector))
        .build()?;

    let report = pipeline.load_and_index(&HttpSource::new(args.url)).await?;
    info!(documents = report.documents, chunks = report.chunks, "index ready");

    println!("Q: {}\nA: ", args.question);
    let mut stream = pipeline.answer_stream(&args.question).await?;
    while let Some(fragment) = stream.next().await {
        print!("{}", fragment?);
        std::io::stdout().flush()?;
    }
    println!();

    for result in stream.sources() {
        println!("  [{:.3}] {}", result.score, result.chunk.id);
    }
    Ok(())
}
