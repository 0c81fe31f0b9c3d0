//! Collaboration session state machine and consensus computation.
//!
//! A session takes a participant set and a task through validation,
//! secure-channel setup, capability-matched execution, and a consensus
//! check, folding the outcome back into the trust ledger.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::agent::{Agent, CapabilityMatcher, ConfidenceUpdater};
use crate::core::config::ProtocolConfig;
use crate::core::error::{ProtocolError, ProtocolResult};
use crate::protocol::channel::SecureChannel;
use crate::protocol::trust::TrustLedger;
use crate::protocol::validator::ParticipantValidator;

/// Separator for the session-id hash input; fixed by the wire contract
const SESSION_ID_SEPARATOR: &str = ",";

/// Lifecycle states of a collaboration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    Validating,
    ChannelReady,
    Executing,
    ConsensusReached,
    ConsensusFailed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::ConsensusReached | SessionStatus::ConsensusFailed
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initiated => "initiated",
            SessionStatus::Validating => "validating",
            SessionStatus::ChannelReady => "channel_ready",
            SessionStatus::Executing => "executing",
            SessionStatus::ConsensusReached => "consensus_reached",
            SessionStatus::ConsensusFailed => "consensus_failed",
        };
        write!(f, "{s}")
    }
}

/// Why a session ended in `ConsensusFailed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailureReason {
    /// One or more participants failed validation
    ParticipantRejected { participants: Vec<String> },
    /// A participant had no capability scoring above zero
    NoCapabilityMatch { participant: String },
    /// Achieved confidence fell below the configured threshold
    ConsensusThresholdNotMet { achieved: f64 },
}

/// Bookkeeping record for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    /// Sorted, deduplicated participant set
    pub participants: Vec<String>,
    pub task: JsonValue,
    pub status: SessionStatus,
    pub failure: Option<FailureReason>,
    /// Achieved consensus confidence once computed
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    /// Whether a channel key is bound to this session
    pub channel_bound: bool,
}

/// Result of a successful initiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub encrypted_channel: bool,
}

/// Result of a completed execution + consensus round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub status: SessionStatus,
    pub confidence: f64,
    /// Per-participant results, merged; present only on consensus
    pub result: Option<JsonValue>,
}

/// Result of a direct consensus check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub confidence: f64,
}

/// Derive the deterministic session id for a participant set: SHA-256
/// over the sorted, comma-joined unique identifiers, lowercase hex.
pub fn derive_session_id(participants: &[String]) -> String {
    let unique: BTreeSet<&str> = participants.iter().map(|s| s.as_str()).collect();
    let joined = unique.into_iter().collect::<Vec<_>>().join(SESSION_ID_SEPARATOR);
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)
}

/// The collaboration and trust protocol.
///
/// Owns the validator, secure channel, trust ledger, session records,
/// and the registry of participating agents. Each session record sits
/// behind its own mutex so no two callers race its transitions, while
/// distinct sessions proceed independently.
pub struct CollaborationProtocol {
    config: ProtocolConfig,
    validator: ParticipantValidator,
    channel: SecureChannel,
    trust: TrustLedger,
    updater: ConfidenceUpdater,
    sessions: DashMap<String, Arc<Mutex<SessionRecord>>>,
    agents: DashMap<String, Arc<Mutex<Agent>>>,
}

impl CollaborationProtocol {
    pub fn new(config: ProtocolConfig) -> Self {
        let validator = ParticipantValidator::from_rule_names(&config.validation_rules);
        let channel = SecureChannel::new(config.encryption_strength);
        let updater = ConfidenceUpdater::new(config.learning_rate);

        Self {
            config,
            validator,
            channel,
            trust: TrustLedger::new(),
            updater,
            sessions: DashMap::new(),
            agents: DashMap::new(),
        }
    }

    /// Protocol with injected validator, for wiring custom rules
    pub fn with_validator(config: ProtocolConfig, validator: ParticipantValidator) -> Self {
        let channel = SecureChannel::new(config.encryption_strength);
        let updater = ConfidenceUpdater::new(config.learning_rate);
        Self {
            config,
            validator,
            channel,
            trust: TrustLedger::new(),
            updater,
            sessions: DashMap::new(),
            agents: DashMap::new(),
        }
    }

    /// Register an agent so sessions can execute tasks on its behalf
    pub fn register_agent(&self, agent: Agent) -> Arc<Mutex<Agent>> {
        let id = agent.id().to_string();
        let handle = Arc::new(Mutex::new(agent));
        self.agents.insert(id, handle.clone());
        handle
    }

    pub fn validator(&self) -> &ParticipantValidator {
        &self.validator
    }

    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    pub fn trust_ledger(&self) -> &TrustLedger {
        &self.trust
    }

    /// Snapshot of a session record
    pub async fn session(&self, session_id: &str) -> Option<SessionRecord> {
        // Clone the slot out so the map shard is not held across the await
        let slot = self.sessions.get(session_id).map(|s| s.clone())?;
        let record = slot.lock().await.clone();
        Some(record)
    }

    /// Initiate a collaboration: derive the session id, validate every
    /// participant, and provision the secure channel.
    ///
    /// Validation failure terminates the session as `ConsensusFailed`
    /// with `ParticipantRejected` before any channel work is spent.
    /// Re-initiating with the same participant set replaces the
    /// previous session record and re-provisions its channel key.
    pub async fn initiate_collaboration(
        &self,
        participants: &[String],
        task: &JsonValue,
    ) -> ProtocolResult<CollaborationOutcome> {
        let normalized = Self::normalize_participants(participants)?;
        let session_id = derive_session_id(&normalized);

        info!(
            "Initiating collaboration {} with {} participants",
            session_id,
            normalized.len()
        );

        // Last initiation wins for a given participant set
        let slot = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(SessionRecord {
                    id: session_id.clone(),
                    participants: normalized.clone(),
                    task: task.clone(),
                    status: SessionStatus::Initiated,
                    failure: None,
                    confidence: None,
                    created_at: Utc::now(),
                    channel_bound: false,
                }))
            })
            .clone();

        let mut record = slot.lock().await;
        *record = SessionRecord {
            id: session_id.clone(),
            participants: normalized.clone(),
            task: task.clone(),
            status: SessionStatus::Validating,
            failure: None,
            confidence: None,
            created_at: Utc::now(),
            channel_bound: false,
        };

        match self.validator.validate_all(&normalized).await {
            Ok(()) => {
                for id in &normalized {
                    self.trust.record_validation(id, true);
                }
            }
            Err(err) => {
                if let ProtocolError::ValidationFailed { participants } = &err {
                    for id in &normalized {
                        self.trust
                            .record_validation(id, !participants.contains(id));
                    }
                    record.status = SessionStatus::ConsensusFailed;
                    record.failure = Some(FailureReason::ParticipantRejected {
                        participants: participants.clone(),
                    });
                    warn!(
                        "Session {} rejected participants: {}",
                        session_id,
                        participants.join(", ")
                    );
                }
                return Err(err);
            }
        }

        self.channel.provision(&session_id)?;
        record.status = SessionStatus::ChannelReady;
        record.channel_bound = true;

        info!("Session {} channel ready", session_id);

        Ok(CollaborationOutcome {
            session_id,
            status: SessionStatus::ChannelReady,
            encrypted_channel: true,
        })
    }

    /// Execute a channel-ready session and compute consensus.
    ///
    /// Each participant's best-scoring capability runs concurrently;
    /// individual execution failures leave that participant's result
    /// absent rather than aborting the round. Consensus confidence is
    /// the fraction of participants with a present, non-null result.
    pub async fn execute_session(&self, session_id: &str) -> ProtocolResult<SessionOutcome> {
        let slot = self
            .sessions
            .get(session_id)
            .map(|s| s.clone())
            .ok_or_else(|| ProtocolError::UnknownSession(session_id.to_string()))?;

        let mut record = slot.lock().await;
        if record.status != SessionStatus::ChannelReady {
            return Err(ProtocolError::InvalidSessionState {
                session_id: session_id.to_string(),
                status: record.status.to_string(),
                expected: SessionStatus::ChannelReady.to_string(),
            });
        }

        record.status = SessionStatus::Executing;
        let task = record.task.clone();
        let participants = record.participants.clone();

        // Fail fast: every participant must have a usable capability
        // before any execution is started.
        let mut selected = Vec::with_capacity(participants.len());
        for id in &participants {
            let capability = match self.agents.get(id).map(|a| a.clone()) {
                Some(agent) => {
                    let agent = agent.lock().await;
                    CapabilityMatcher::best_match(agent.capabilities(), &task).cloned()
                }
                None => None,
            };
            match capability {
                Some(capability) => selected.push((id.clone(), capability)),
                None => {
                    record.status = SessionStatus::ConsensusFailed;
                    record.failure = Some(FailureReason::NoCapabilityMatch {
                        participant: id.clone(),
                    });
                    return Err(ProtocolError::NoCapabilityMatch {
                        participant: id.clone(),
                    });
                }
            }
        }

        let executions = selected.iter().map(|(id, capability)| {
            let agent = self.agents.get(id).map(|a| a.clone());
            let task = task.clone();
            async move {
                let agent = agent?;
                let agent = agent.lock().await;
                match agent.execute_capability(capability, &task).await {
                    Ok(result) => Some(result),
                    Err(err) => {
                        warn!("Execution for participant '{id}' failed: {err}");
                        None
                    }
                }
            }
        });
        let results: Vec<Option<JsonValue>> = join_all(executions).await;

        let present = results
            .iter()
            .filter(|r| matches!(r, Some(v) if !v.is_null()))
            .count();
        let confidence = present as f64 / participants.len() as f64;
        record.confidence = Some(confidence);

        debug!(
            "Session {} consensus confidence {:.3} (threshold {:.3})",
            session_id, confidence, self.config.trust_threshold
        );

        // Terminal transition feeds the outcome back into each
        // participant's trust and capability confidences.
        for ((id, _), result) in selected.iter().zip(&results) {
            let signal = match result {
                Some(v) if !v.is_null() => 1.0,
                _ => 0.0,
            };
            self.trust
                .apply_outcome(id, signal, self.updater.learning_rate());
            if let Some(agent) = self.agents.get(id).map(|a| a.clone()) {
                let mut agent = agent.lock().await;
                let outcome = result.clone().unwrap_or(JsonValue::Null);
                agent.learn_from_experience(&task, &outcome, None);
            }
        }

        if confidence >= self.config.trust_threshold {
            record.status = SessionStatus::ConsensusReached;
            let per_participant: serde_json::Map<String, JsonValue> = participants
                .iter()
                .zip(&results)
                .map(|(id, r)| (id.clone(), r.clone().unwrap_or(JsonValue::Null)))
                .collect();
            let merged = json!({
                "sessionId": session_id,
                "results": per_participant,
            });
            info!(
                "Session {} reached consensus at {:.3}",
                session_id, confidence
            );
            Ok(SessionOutcome {
                session_id: session_id.to_string(),
                status: SessionStatus::ConsensusReached,
                confidence,
                result: Some(merged),
            })
        } else {
            record.status = SessionStatus::ConsensusFailed;
            record.failure = Some(FailureReason::ConsensusThresholdNotMet {
                achieved: confidence,
            });
            warn!(
                "Session {} failed consensus: {:.3} < {:.3}",
                session_id, confidence, self.config.trust_threshold
            );
            Err(ProtocolError::ConsensusThresholdNotMet {
                achieved: confidence,
                threshold: self.config.trust_threshold,
                session_id: session_id.to_string(),
            })
        }
    }

    /// Full pipeline: initiate, then execute and settle consensus
    pub async fn collaborate(
        &self,
        participants: &[String],
        task: &JsonValue,
    ) -> ProtocolResult<SessionOutcome> {
        let outcome = self.initiate_collaboration(participants, task).await?;
        self.execute_session(&outcome.session_id).await
    }

    /// Direct consensus check over a participant set: the fraction of
    /// participants passing validation, compared to the configured
    /// threshold. Memoized validation results are reused.
    pub async fn achieve_consensus(
        &self,
        task: &JsonValue,
        participants: &[String],
    ) -> ProtocolResult<ConsensusOutcome> {
        if participants.is_empty() {
            return Err(ProtocolError::InvalidParticipantSet(
                "no participants supplied".to_string(),
            ));
        }

        let checks = participants.iter().map(|id| self.validator.validate(id));
        let results = join_all(checks).await;

        for (id, valid) in participants.iter().zip(&results) {
            self.trust.record_validation(id, *valid);
        }

        let confidence = results.iter().filter(|v| **v).count() as f64 / results.len() as f64;

        debug!(
            "Consensus for task {} over {} participants: {:.3}",
            task, participants.len(), confidence
        );

        if confidence >= self.config.trust_threshold {
            Ok(ConsensusOutcome { confidence })
        } else {
            Err(ProtocolError::ConsensusThresholdNotMet {
                achieved: confidence,
                threshold: self.config.trust_threshold,
                session_id: derive_session_id(participants),
            })
        }
    }

    /// Sorted, deduplicated, all-non-empty participant set of size >= 2
    fn normalize_participants(participants: &[String]) -> ProtocolResult<Vec<String>> {
        let unique: BTreeSet<String> = participants
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();

        if unique.len() < 2 {
            return Err(ProtocolError::InvalidParticipantSet(format!(
                "need at least 2 distinct non-empty participants, got {}",
                unique.len()
            )));
        }

        Ok(unique.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_ignores_order_and_duplicates() {
        let a = vec!["a2".to_string(), "a1".to_string()];
        let b = vec!["a1".to_string(), "a2".to_string(), "a1".to_string()];
        assert_eq!(derive_session_id(&a), derive_session_id(&b));
    }

    #[test]
    fn test_session_id_is_sha256_of_comma_joined_ids() {
        // sha256("a1,a2"), fixed by the wire contract
        let expected = {
            let digest = Sha256::digest(b"a1,a2");
            hex::encode(digest)
        };
        let id = derive_session_id(&["a2".to_string(), "a1".to_string()]);
        assert_eq!(id, expected);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_normalize_rejects_small_or_degenerate_sets() {
        assert!(CollaborationProtocol::normalize_participants(&["a1".to_string()]).is_err());
        assert!(CollaborationProtocol::normalize_participants(&[
            "a1".to_string(),
            "a1".to_string()
        ])
        .is_err());
        assert!(CollaborationProtocol::normalize_participants(&[
            "a1".to_string(),
            String::new()
        ])
        .is_err());
        let ok = CollaborationProtocol::normalize_participants(&[
            "b".to_string(),
            "a".to_string(),
        ])
        .unwrap();
        assert_eq!(ok, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionStatus::ConsensusReached.is_terminal());
        assert!(SessionStatus::ConsensusFailed.is_terminal());
        assert!(!SessionStatus::ChannelReady.is_terminal());
    }
}
