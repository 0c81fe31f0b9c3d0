//! Reasoning chains derived from the inference service.

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ProtocolError, ProtocolResult};
use crate::inference::InferenceService;

/// One step of a reasoning chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub reasoning: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// A derived chain of reasoning steps with a final conclusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub steps: Vec<ReasoningStep>,
    pub conclusion: String,
}

/// Extract JSON from a response that may be wrapped in markdown code
/// blocks. Some models wrap JSON in ```json ... ``` fences even when
/// asked for raw output.
fn extract_json_from_response(response: &str) -> &str {
    static JSON_BLOCK_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re =
        JSON_BLOCK_RE.get_or_init(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").unwrap());

    if let Some(captures) = re.captures(response) {
        if let Some(json_match) = captures.get(1) {
            return json_match.as_str().trim();
        }
    }

    response.trim()
}

/// Produces reasoning chains for an input by prompting the inference
/// service through a fixed five-step template.
pub struct ReasoningEngine {
    inference: Arc<dyn InferenceService>,
    max_tokens: usize,
    timeout: Duration,
}

impl ReasoningEngine {
    pub fn new(inference: Arc<dyn InferenceService>, max_tokens: usize) -> Self {
        Self {
            inference,
            max_tokens,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Derive a reasoning chain for the input. A response that is not
    /// parseable as a step array falls back to a single step holding
    /// the raw text.
    pub async fn derive_chain(&self, input: &str) -> ProtocolResult<ReasoningChain> {
        let prompt = Self::build_reasoning_prompt(input);
        let response = tokio::time::timeout(
            self.timeout,
            self.inference.complete(&prompt, self.max_tokens),
        )
        .await
        .map_err(|_| ProtocolError::CollaborationTimedOut {
            operation: "reasoning chain derivation".to_string(),
            seconds: self.timeout.as_secs(),
        })??;

        let steps = Self::parse_steps(&response);
        let conclusion = steps
            .last()
            .map(|s| s.reasoning.clone())
            .unwrap_or_default();

        debug!("Derived reasoning chain with {} steps", steps.len());
        Ok(ReasoningChain { steps, conclusion })
    }

    fn build_reasoning_prompt(input: &str) -> String {
        format!(
            "Given the input: \"{input}\"\n\n\
             Generate a detailed reasoning chain with the following steps:\n\
             1. Initial understanding\n\
             2. Key components identification\n\
             3. Relationship analysis\n\
             4. Pattern recognition\n\
             5. Conclusion formation\n\n\
             For each step, provide:\n\
             - Reasoning\n\
             - Confidence level\n\
             - Supporting evidence\n\n\
             Respond with a JSON array of {{\"reasoning\", \"confidence\", \"evidence\"}} objects."
        )
    }

    fn parse_steps(response: &str) -> Vec<ReasoningStep> {
        let json_text = extract_json_from_response(response);
        match serde_json::from_str::<Vec<ReasoningStep>>(json_text) {
            Ok(steps) if !steps.is_empty() => steps,
            _ => vec![ReasoningStep {
                reasoning: response.trim().to_string(),
                confidence: 0.9,
                evidence: vec![],
            }],
        }
    }
}
