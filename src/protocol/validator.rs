//! Participant validation with ordered named rules and memoized results.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

use crate::core::error::{ProtocolError, ProtocolResult};

/// A single named validation rule applied to a participant identifier
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Rule name as it appears in configuration
    fn name(&self) -> &str;

    /// Evaluate the rule for one participant
    async fn check(&self, participant_id: &str) -> bool;
}

/// `basic`: the identifier must be non-empty
struct BasicRule;

#[async_trait]
impl ValidationRule for BasicRule {
    fn name(&self) -> &str {
        "basic"
    }

    async fn check(&self, participant_id: &str) -> bool {
        !participant_id.is_empty()
    }
}

/// `advanced`: always passes; extension point for external attestation
struct AdvancedRule;

#[async_trait]
impl ValidationRule for AdvancedRule {
    fn name(&self) -> &str {
        "advanced"
    }

    async fn check(&self, _participant_id: &str) -> bool {
        true
    }
}

/// Unrecognized rule names pass permissively so an unknown entry in the
/// configured rule list never blocks a participant.
struct PermissiveRule {
    name: String,
}

#[async_trait]
impl ValidationRule for PermissiveRule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, _participant_id: &str) -> bool {
        true
    }
}

/// Applies an ordered set of validation rules to participant
/// identifiers, memoizing the conjunction per participant.
///
/// Validation is idempotent: the first call for an identifier runs
/// every configured rule and caches the combined result; later calls
/// return the cached value without re-running any rule.
pub struct ParticipantValidator {
    rules: Vec<Arc<dyn ValidationRule>>,
    cache: DashMap<String, bool>,
}

impl ParticipantValidator {
    /// Build a validator from configured rule names, in order.
    /// Unknown names get a permissive always-pass rule.
    pub fn from_rule_names(names: &[String]) -> Self {
        let rules = names
            .iter()
            .map(|name| match name.as_str() {
                "basic" => Arc::new(BasicRule) as Arc<dyn ValidationRule>,
                "advanced" => Arc::new(AdvancedRule) as Arc<dyn ValidationRule>,
                other => {
                    warn!("Unknown validation rule '{}', treating as pass", other);
                    Arc::new(PermissiveRule {
                        name: other.to_string(),
                    }) as Arc<dyn ValidationRule>
                }
            })
            .collect();

        Self {
            rules,
            cache: DashMap::new(),
        }
    }

    /// Build a validator from explicit rule instances (used by tests
    /// and by callers wiring in custom attestation rules).
    pub fn with_rules(rules: Vec<Arc<dyn ValidationRule>>) -> Self {
        Self {
            rules,
            cache: DashMap::new(),
        }
    }

    /// Validate one participant. All rules run on the first call; the
    /// conjunction of their results is cached indefinitely.
    pub async fn validate(&self, participant_id: &str) -> bool {
        if let Some(cached) = self.cache.get(participant_id) {
            return *cached;
        }

        let mut valid = true;
        for rule in &self.rules {
            let passed = rule.check(participant_id).await;
            debug!(
                "Rule '{}' for participant '{}': {}",
                rule.name(),
                participant_id,
                passed
            );
            valid &= passed;
        }

        self.cache.insert(participant_id.to_string(), valid);
        valid
    }

    /// Validate every participant concurrently and require all to pass.
    ///
    /// Checks run to completion rather than cancelling on first
    /// failure, so the memo cache is warm for subsequent calls even
    /// when the set as a whole is rejected.
    pub async fn validate_all(&self, participant_ids: &[String]) -> ProtocolResult<()> {
        let checks = participant_ids.iter().map(|id| self.validate(id));
        let results = join_all(checks).await;

        let rejected: Vec<String> = participant_ids
            .iter()
            .zip(results)
            .filter(|(_, ok)| !ok)
            .map(|(id, _)| id.clone())
            .collect();

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ValidationFailed {
                participants: rejected,
            })
        }
    }

    /// Drop the cached result for a participant so the next `validate`
    /// re-runs the rules. This is the explicit invalidation path; there
    /// is no TTL.
    pub fn invalidate(&self, participant_id: &str) {
        self.cache.remove(participant_id);
    }

    /// Cached result for a participant, if one exists
    pub fn cached(&self, participant_id: &str) -> Option<bool> {
        self.cache.get(participant_id).map(|v| *v)
    }
}
