//! Collaboration and trust protocol: validation, secure channels,
//! sessions, and consensus.

pub mod channel;
pub mod session;
pub mod trust;
pub mod validator;

pub use channel::{ChannelKey, Envelope, SecureChannel};
pub use session::{
    derive_session_id, CollaborationOutcome, CollaborationProtocol, ConsensusOutcome,
    FailureReason, SessionOutcome, SessionRecord, SessionStatus,
};
pub use trust::{ParticipantRecord, TrustLedger, ValidationOutcome};
pub use validator::{ParticipantValidator, ValidationRule};
