//! Trust ledger: per-participant validation outcomes and trust scores.

use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};

/// Tri-state validation outcome for a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    /// Never validated
    Unknown,
    /// Passed all configured rules
    Valid,
    /// Failed at least one rule
    Invalid,
}

/// Value record for a single participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Opaque participant identifier
    pub id: String,

    /// Latest validation outcome
    pub validation: ValidationOutcome,

    /// Running trust estimate in [0, 1]
    pub trust_score: f64,
}

impl ParticipantRecord {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            validation: ValidationOutcome::Unknown,
            trust_score: DEFAULT_TRUST,
        }
    }
}

/// Starting trust for a participant seen for the first time
pub const DEFAULT_TRUST: f64 = 0.5;

/// Holds per-participant validation results and trust values.
///
/// Entries are created on first reference and live for the process
/// lifetime. Updates go through the concurrent map so writes to
/// different participants never block each other.
#[derive(Debug, Default)]
pub struct TrustLedger {
    participants: DashMap<String, ParticipantRecord>,
}

impl TrustLedger {
    pub fn new() -> Self {
        Self {
            participants: DashMap::new(),
        }
    }

    /// Record a validation outcome for a participant, creating the
    /// record if this is the first reference.
    pub fn record_validation(&self, id: &str, valid: bool) {
        let outcome = if valid {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid
        };
        let mut entry = self
            .participants
            .entry(id.to_string())
            .or_insert_with(|| ParticipantRecord::new(id));
        entry.validation = outcome;
        debug!("Recorded validation for {}: {:?}", id, outcome);
    }

    /// Fold an outcome signal in [0, 1] into a participant's trust
    /// score using a first-order EMA step, clamped to [0, 1].
    pub fn apply_outcome(&self, id: &str, signal: f64, learning_rate: f64) -> f64 {
        let mut entry = self
            .participants
            .entry(id.to_string())
            .or_insert_with(|| ParticipantRecord::new(id));
        let updated =
            (entry.trust_score + learning_rate * (signal - entry.trust_score)).clamp(0.0, 1.0);
        entry.trust_score = updated;
        debug!("Trust for {} updated to {:.3}", id, updated);
        updated
    }

    /// Current trust score, or the default for an unseen participant
    pub fn trust_of(&self, id: &str) -> f64 {
        self.participants
            .get(id)
            .map(|r| r.trust_score)
            .unwrap_or(DEFAULT_TRUST)
    }

    /// Latest validation outcome, `Unknown` for an unseen participant
    pub fn validation_of(&self, id: &str) -> ValidationOutcome {
        self.participants
            .get(id)
            .map(|r| r.validation)
            .unwrap_or(ValidationOutcome::Unknown)
    }

    /// Snapshot of a participant record, if one exists
    pub fn get(&self, id: &str) -> Option<ParticipantRecord> {
        self.participants.get(id).map(|r| r.clone())
    }

    /// Number of participants the ledger has seen
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
