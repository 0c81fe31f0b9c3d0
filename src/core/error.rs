use thiserror::Error;

/// Custom error types for the collaboration protocol
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Fewer than two distinct, non-empty participant identifiers were supplied
    #[error("Invalid participant set: {0}")]
    InvalidParticipantSet(String),

    /// One or more participants failed validation
    #[error("Validation failed for participants: {}", .participants.join(", "))]
    ValidationFailed {
        /// The identifiers that were rejected
        participants: Vec<String>,
    },

    /// A channel payload failed authenticated decryption
    #[error("Channel authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No capability scored above zero for the task
    #[error("No capability matched the task for participant '{participant}'")]
    NoCapabilityMatch { participant: String },

    /// Consensus confidence fell below the configured threshold
    #[error(
        "Consensus threshold not met for session {session_id}: achieved {achieved:.3}, required {threshold:.3}"
    )]
    ConsensusThresholdNotMet {
        achieved: f64,
        threshold: f64,
        session_id: String,
    },

    /// The inference backend could not be reached or returned an error
    #[error("Inference service unavailable: {0}")]
    InferenceUnavailable(String),

    /// The distributed-ledger client could not be reached or returned an error
    #[error("Ledger client unavailable: {0}")]
    LedgerUnavailable(String),

    /// An external-collaborator call exceeded its time bound
    #[error("Collaboration timed out after {seconds}s: {operation}")]
    CollaborationTimedOut { operation: String, seconds: u64 },

    /// A declared capability was malformed or a duplicate
    #[error("Capability rejected: {0}")]
    CapabilityRejected(String),

    /// No channel has been provisioned for the session
    #[error("No secure channel provisioned for session {0}")]
    ChannelNotProvisioned(String),

    /// The session id is not known to the protocol
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// An operation was attempted in the wrong session state
    #[error("Session {session_id} is in state '{status}', expected '{expected}'")]
    InvalidSessionState {
        session_id: String,
        status: String,
        expected: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Cryptographic failures other than tag verification
    #[error("Cryptographic operation failed: {0}")]
    CryptoError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::SerializationError(err.to_string())
    }
}

/// Shorthand result type used throughout the protocol core
pub type ProtocolResult<T> = Result<T, ProtocolError>;
