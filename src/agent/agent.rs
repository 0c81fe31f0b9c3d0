//! Agent: capability ownership, task execution, and experience.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::agent::capability::{Capability, CapabilityMatcher, ConfidenceUpdater};
use crate::core::config::AgentConfig;
use crate::core::error::{ProtocolError, ProtocolResult};
use crate::inference::InferenceService;

/// Capabilities scoring at or below this against a task are not
/// considered relevant when folding in an outcome
const RELEVANCE_THRESHOLD: f64 = 0.5;

/// Minimum mean combined confidence for a two-agent collaboration
const VIABILITY_THRESHOLD: f64 = 0.7;

/// Immutable record of one task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: String,
    pub task: JsonValue,
    pub result: JsonValue,
    /// Partner agent for joint executions
    pub partner: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of an agent's externally visible state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub capabilities: Vec<Capability>,
    pub trust_score: f64,
    pub learning_progress: f64,
    pub last_update: DateTime<Utc>,
}

/// An autonomous agent holding a set of confidence-scored capabilities.
///
/// Tasks are matched lexically against capability descriptions, executed
/// through the inference service, and the outcome is folded back into
/// the confidences of the capabilities involved.
pub struct Agent {
    id: String,
    capabilities: Vec<Capability>,
    trust_score: f64,
    learning_progress: f64,
    last_update: DateTime<Utc>,
    experience: Vec<Experience>,
    inference: Arc<dyn InferenceService>,
    updater: ConfidenceUpdater,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        capabilities: Vec<Capability>,
        inference: Arc<dyn InferenceService>,
        updater: ConfidenceUpdater,
        config: AgentConfig,
    ) -> Self {
        Self {
            id: id.into(),
            capabilities,
            trust_score: 0.5,
            learning_progress: 0.0,
            last_update: Utc::now(),
            experience: Vec::new(),
            inference,
            updater,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn state(&self) -> AgentState {
        AgentState {
            id: self.id.clone(),
            capabilities: self.capabilities.clone(),
            trust_score: self.trust_score,
            learning_progress: self.learning_progress,
            last_update: self.last_update,
        }
    }

    pub fn experience_log(&self) -> &[Experience] {
        &self.experience
    }

    /// Declare a new capability. Rejects malformed entries and
    /// duplicates by name.
    pub fn learn_capability(&mut self, capability: Capability) -> ProtocolResult<()> {
        if capability.name.is_empty() || capability.description.is_empty() {
            return Err(ProtocolError::CapabilityRejected(
                "name and description must be non-empty".to_string(),
            ));
        }
        if self.capabilities.iter().any(|c| c.name == capability.name) {
            return Err(ProtocolError::CapabilityRejected(format!(
                "duplicate capability '{}'",
                capability.name
            )));
        }

        info!("Agent {} learned capability '{}'", self.id, capability.name);
        self.capabilities.push(capability);
        self.learning_progress = (self.learning_progress + 0.1).min(1.0);
        self.last_update = Utc::now();
        Ok(())
    }

    /// Match, execute, and learn from a single task
    pub async fn process_task(&mut self, task: &JsonValue) -> ProtocolResult<JsonValue> {
        let capability = CapabilityMatcher::best_match(&self.capabilities, task)
            .cloned()
            .ok_or_else(|| ProtocolError::NoCapabilityMatch {
                participant: self.id.clone(),
            })?;

        debug!(
            "Agent {} executing task with capability '{}'",
            self.id, capability.name
        );

        let result = self.execute_capability(&capability, task).await?;
        self.learn_from_experience(task, &result, None);
        Ok(result)
    }

    /// Execute one capability against the task through the inference
    /// service, bounded by the configured timeout.
    pub async fn execute_capability(
        &self,
        capability: &Capability,
        task: &JsonValue,
    ) -> ProtocolResult<JsonValue> {
        let prompt = self.build_prompt(capability, task);
        let seconds = self.config.task_timeout_seconds;

        let completion = tokio::time::timeout(
            Duration::from_secs(seconds),
            self.inference.complete(&prompt, 1000),
        )
        .await
        .map_err(|_| ProtocolError::CollaborationTimedOut {
            operation: format!("capability '{}' execution", capability.name),
            seconds,
        })??;

        Ok(Self::parse_response(&completion))
    }

    /// Execute a task jointly with a partner agent.
    ///
    /// Both sides' best capabilities run concurrently; if either side
    /// errors the joint operation fails as a whole rather than merging
    /// with a missing half.
    pub async fn collaborate_with(
        &mut self,
        partner: &mut Agent,
        task: &JsonValue,
    ) -> ProtocolResult<JsonValue> {
        let combined_mean = self.combined_confidence(partner);
        if combined_mean <= VIABILITY_THRESHOLD {
            return Err(ProtocolError::ConsensusThresholdNotMet {
                achieved: combined_mean,
                threshold: VIABILITY_THRESHOLD,
                session_id: String::new(),
            });
        }

        let my_capability = CapabilityMatcher::best_match(&self.capabilities, task)
            .cloned()
            .ok_or_else(|| ProtocolError::NoCapabilityMatch {
                participant: self.id.clone(),
            })?;
        let partner_capability = CapabilityMatcher::best_match(&partner.capabilities, task)
            .cloned()
            .ok_or_else(|| ProtocolError::NoCapabilityMatch {
                participant: partner.id.clone(),
            })?;

        info!(
            "Agents {} and {} collaborating on task via '{}' / '{}'",
            self.id, partner.id, my_capability.name, partner_capability.name,
        );

        let (my_result, partner_result) = tokio::try_join!(
            self.execute_capability(&my_capability, task),
            partner.execute_capability(&partner_capability, task),
        )?;

        let merged = json!({
            "combined": true,
            "results": [my_result, partner_result],
        });

        self.learn_from_experience(task, &merged, Some(partner.id.clone()));
        partner.learn_from_experience(task, &merged, Some(self.id.clone()));

        Ok(merged)
    }

    /// Mean confidence across both agents' capability sets
    fn combined_confidence(&self, partner: &Agent) -> f64 {
        let all: Vec<f64> = self
            .capabilities
            .iter()
            .chain(partner.capabilities.iter())
            .map(|c| c.confidence)
            .collect();
        if all.is_empty() {
            return 0.0;
        }
        all.iter().sum::<f64>() / all.len() as f64
    }

    /// Append an experience record and fold the outcome into the
    /// confidences of capabilities relevant to the task.
    pub fn learn_from_experience(
        &mut self,
        task: &JsonValue,
        result: &JsonValue,
        partner: Option<String>,
    ) {
        let signal = if result.is_null() { 0.0 } else { 1.0 };

        for capability in &mut self.capabilities {
            if CapabilityMatcher::score(capability, task) > RELEVANCE_THRESHOLD {
                let updated = self.updater.update(capability, signal);
                debug!(
                    "Agent {} capability '{}' confidence now {:.3}",
                    self.id, capability.name, updated
                );
            }
        }

        self.experience.push(Experience {
            id: Uuid::new_v4().to_string(),
            task: task.clone(),
            result: result.clone(),
            partner,
            timestamp: Utc::now(),
        });

        // Retention cap: prune oldest first
        let retention = self.config.experience_retention;
        if self.experience.len() > retention {
            let excess = self.experience.len() - retention;
            warn!(
                "Agent {} pruning {} experience records (retention {})",
                self.id, excess, retention
            );
            self.experience.drain(..excess);
        }

        self.last_update = Utc::now();
    }

    fn build_prompt(&self, capability: &Capability, task: &JsonValue) -> String {
        format!(
            "Using the capability \"{}\":\n{}\n\nProcess the following task:\n{}\n\nParameters required:\n{}\n\nPlease provide a detailed response.",
            capability.name,
            capability.description,
            serde_json::to_string_pretty(task).unwrap_or_else(|_| task.to_string()),
            capability.parameters.join(", "),
        )
    }

    /// Completions are JSON when the model cooperates, plain text
    /// otherwise
    fn parse_response(text: &str) -> JsonValue {
        serde_json::from_str(text).unwrap_or_else(|_| json!({ "text": text }))
    }
}
