//! OpenAI chat completions backend.
//!
//! Works against the OpenAI API and any OpenAI-compatible server (Ollama,
//! vLLM, LM Studio) via [`OpenAIConfig::compatible`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragkit_model::openai::{OpenAIClient, OpenAIConfig};
//!
//! let model = OpenAIClient::new(OpenAIConfig::new(
//!     std::env::var("OPENAI_API_KEY")?,
//!     "gpt-4o-mini",
//! ))?;
//! ```

mod client;
mod config;
mod convert;

pub use client::OpenAIClient;
pub use config::{DEFAULT_MODEL, OpenAIConfig};
