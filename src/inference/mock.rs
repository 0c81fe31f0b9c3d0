//! Scripted inference backend for tests and the demo driver.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::error::{ProtocolError, ProtocolResult};
use crate::inference::InferenceService;

/// Returns queued responses in order, then a fixed fallback. With
/// `failing()` every call reports `InferenceUnavailable` instead.
pub struct MockInference {
    responses: Mutex<VecDeque<String>>,
    fallback: String,
    fail: bool,
}

impl MockInference {
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: "{\"text\": \"mock completion\"}".to_string(),
            fail: false,
        }
    }

    /// A backend whose every call fails, for error-path tests
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: String::new(),
            fail: true,
        }
    }
}

impl Default for MockInference {
    fn default() -> Self {
        Self::with_responses(Vec::new())
    }
}

#[async_trait]
impl InferenceService for MockInference {
    async fn complete(&self, _prompt: &str, _max_tokens: usize) -> ProtocolResult<String> {
        if self.fail {
            return Err(ProtocolError::InferenceUnavailable(
                "mock backend configured to fail".to_string(),
            ));
        }

        let mut queue = self.responses.lock().expect("mock queue poisoned");
        Ok(queue.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
