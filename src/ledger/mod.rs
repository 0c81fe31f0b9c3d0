//! Distributed-ledger collaborator: a narrow, read-only interface to
//! contract code and transaction history, plus derived telemetry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::ProtocolResult;

pub mod telemetry;

pub use telemetry::{ContractMetrics, ContractTelemetry, Optimization};

/// Completion status of a historical transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Succeeded,
    Failed,
}

/// One entry of an address's transaction history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxRecord {
    pub gas_used: u64,
    pub confirm_time_ms: u64,
    pub status: TxStatus,
}

/// Opaque read-only chain data source. Failures surface as
/// `LedgerUnavailable`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Deployed bytecode at the address
    async fn get_code(&self, address: &str) -> ProtocolResult<Vec<u8>>;

    /// Transaction history for the address
    async fn get_history(&self, address: &str) -> ProtocolResult<Vec<TxRecord>>;
}
