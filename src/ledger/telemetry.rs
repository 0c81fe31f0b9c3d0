//! Contract telemetry derived from transaction history.

use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{ProtocolError, ProtocolResult};
use crate::ledger::{LedgerClient, TxStatus};

/// Gas usage above this average triggers a storage suggestion
const GAS_THRESHOLD: f64 = 1_000_000.0;

/// Error rate above this triggers an error-handling suggestion
const ERROR_RATE_THRESHOLD: f64 = 0.05;

/// Aggregated performance metrics for a contract address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMetrics {
    pub avg_gas_used: f64,
    pub avg_confirm_time_ms: f64,
    pub error_rate: f64,
    pub tx_count: usize,
}

/// A threshold-derived optimization suggestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimization {
    pub kind: String,
    pub suggestion: String,
}

/// Computes contract metrics from ledger history and derives
/// threshold-based optimization suggestions. Actual scanning or
/// rewriting of contracts stays outside this system.
pub struct ContractTelemetry {
    client: Arc<dyn LedgerClient>,
    timeout: Duration,
}

impl ContractTelemetry {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Aggregate history into metrics. An empty history yields zeroed
    /// metrics rather than an error.
    pub async fn analyze(&self, address: &str) -> ProtocolResult<ContractMetrics> {
        let history = tokio::time::timeout(self.timeout, self.client.get_history(address))
            .await
            .map_err(|_| ProtocolError::CollaborationTimedOut {
                operation: format!("ledger history for {}", address),
                seconds: self.timeout.as_secs(),
            })??;
        let count = history.len();

        if count == 0 {
            return Ok(ContractMetrics {
                avg_gas_used: 0.0,
                avg_confirm_time_ms: 0.0,
                error_rate: 0.0,
                tx_count: 0,
            });
        }

        let total_gas: u64 = history.iter().map(|t| t.gas_used).sum();
        let total_time: u64 = history.iter().map(|t| t.confirm_time_ms).sum();
        let failures = history
            .iter()
            .filter(|t| t.status == TxStatus::Failed)
            .count();

        let metrics = ContractMetrics {
            avg_gas_used: total_gas as f64 / count as f64,
            avg_confirm_time_ms: total_time as f64 / count as f64,
            error_rate: failures as f64 / count as f64,
            tx_count: count,
        };

        info!(
            "Telemetry for {}: avg gas {:.0}, error rate {:.3} over {} txs",
            address, metrics.avg_gas_used, metrics.error_rate, count
        );

        Ok(metrics)
    }

    /// Threshold rules over the metrics; no heuristics beyond these
    pub fn suggest_optimizations(metrics: &ContractMetrics) -> Vec<Optimization> {
        let mut suggestions = Vec::new();

        if metrics.avg_gas_used > GAS_THRESHOLD {
            suggestions.push(Optimization {
                kind: "gas".to_string(),
                suggestion: "Optimize storage usage".to_string(),
            });
        }
        if metrics.error_rate > ERROR_RATE_THRESHOLD {
            suggestions.push(Optimization {
                kind: "reliability".to_string(),
                suggestion: "Improve error handling".to_string(),
            });
        }

        suggestions
    }
}
