//! LLM integration crate for the Diligence engine.
//!
//! This crate provides a provider-agnostic abstraction for interacting with
//! Large Language Models, plus the retry/backoff/timeout policy every
//! engine call goes through.
//!
//! # Providers
//! - **Ollama**: local LLM runtime (default)
//! - **OpenAI-compatible**: any `/chat/completions` endpoint
//! - **Scripted**: deterministic test double
//!
//! # Example
//! ```no_run
//! use diligence_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("Hello, world!", "llama3.2").with_temperature(0.7);
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod retry;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient, ScriptedClient};
pub use retry::{complete_with_retry, RetryPolicy};
