//! # ragkit-model
//!
//! Language model integrations for ragkit.
//!
//! ## Overview
//!
//! Every backend implements [`LanguageModel`], which offers two invocation
//! modes over the same request:
//!
//! - [`LanguageModel::complete`] waits for the whole answer.
//! - [`LanguageModel::stream`] yields text fragments as they arrive. The
//!   stream is finite and single-pass; dropping it cancels the request.
//!
//! Backends:
//!
//! - [`MockLlm`] - scriptable in-process model for tests and offline demos
//! - `OpenAIClient` - OpenAI and OpenAI-compatible chat APIs (feature `openai`)
//!
//! ## Quick Start
//!
//! ```rust
//! use ragkit_model::{GenerationConfig, LanguageModel, MockLlm};
//!
//! # async fn run() -> ragkit_model::Result<()> {
//! let model = MockLlm::new("mock").with_response("Subgoals make big tasks tractable.");
//! let config = GenerationConfig::new().with_temperature(0.0).with_max_tokens(64);
//! let answer = model.complete("What is task decomposition?".into(), &config).await?;
//! assert!(answer.contains("Subgoals"));
//! # Ok(())
//! # }
//! ```

mod error;
mod llm;
pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use error::{ModelError, Result};
pub use llm::{
    FormattingFilter, GenerationConfig, LanguageModel, Message, Prompt, Role, TextStream,
    collect_text, strip_formatting,
};
pub use mock::MockLlm;
#[cfg(feature = "openai")]
pub use openai::OpenAIClient;
