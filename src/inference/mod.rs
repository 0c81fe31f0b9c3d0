//! Inference backend abstraction.
//!
//! The protocol treats natural-language inference as an opaque
//! collaborator: a prompt and a token budget go in, text comes out.
//! Backends are selected by name via [`InferenceFactory`].

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::config::InferenceConfig;
use crate::core::error::{ProtocolError, ProtocolResult};

mod mock;
mod openai;

pub use mock::MockInference;
pub use openai::OpenAiInference;

/// Opaque text-completion service
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Produce a completion for the prompt within the token budget.
    /// Transport or backend failures surface as `InferenceUnavailable`.
    async fn complete(&self, prompt: &str, max_tokens: usize) -> ProtocolResult<String>;
}

/// Factory for creating the configured inference backend
pub struct InferenceFactory;

impl InferenceFactory {
    pub fn create(config: &InferenceConfig) -> ProtocolResult<Arc<dyn InferenceService>> {
        match config.provider.as_str() {
            "openai" => Ok(Arc::new(OpenAiInference::new(config)?)),
            "mock" => Ok(Arc::new(MockInference::default())),
            other => Err(ProtocolError::ConfigError(format!(
                "Unknown inference provider: {other}"
            ))),
        }
    }
}
