use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Protocol configuration
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Inference backend configuration
    pub inference: InferenceConfig,

    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ledger client configuration
    pub ledger: Option<LedgerConfig>,
}

/// Collaboration protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProtocolConfig {
    /// Baseline encryption strength; the effective strength for a payload
    /// is the maximum of this value and the payload's sensitivity level
    #[serde(default = "default_encryption_strength")]
    pub encryption_strength: u32,

    /// Ordered validation rule names applied to each participant
    #[serde(default = "default_validation_rules")]
    pub validation_rules: Vec<String>,

    /// Minimum consensus confidence in (0, 1]
    #[serde(default = "default_trust_threshold")]
    pub trust_threshold: f64,

    /// EMA learning rate for confidence/trust updates, in (0, 1]
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

/// Inference backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Provider name (e.g., "openai", "mock")
    pub provider: String,

    /// API key for the provider
    #[serde(default)]
    pub api_key: String,

    /// Model name to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Temperature setting for generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Override for the provider API base URL
    pub api_base: Option<String>,
}

/// Agent configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Time bound for a single capability execution in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_seconds: u64,

    /// Maximum experience records retained per agent (oldest pruned first)
    #[serde(default = "default_experience_retention")]
    pub experience_retention: usize,
}

/// Ledger client configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint for the chain provider
    pub rpc_url: String,
}

// Default values for optional configuration
fn default_encryption_strength() -> u32 {
    2
}

fn default_validation_rules() -> Vec<String> {
    vec!["basic".to_string()]
}

fn default_trust_threshold() -> f64 {
    0.7
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> usize {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_task_timeout() -> u64 {
    60
}

fn default_experience_retention() -> usize {
    1000
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            encryption_strength: default_encryption_strength(),
            validation_rules: default_validation_rules(),
            trust_threshold: default_trust_threshold(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            task_timeout_seconds: default_task_timeout(),
            experience_retention: default_experience_retention(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = toml::from_str(&config_text)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Reject option values outside their documented ranges
    fn validate(&self) -> Result<()> {
        let p = &self.protocol;
        if !(p.trust_threshold > 0.0 && p.trust_threshold <= 1.0) {
            anyhow::bail!(
                "trust_threshold must be in (0, 1], got {}",
                p.trust_threshold
            );
        }
        if !(p.learning_rate > 0.0 && p.learning_rate <= 1.0) {
            anyhow::bail!("learning_rate must be in (0, 1], got {}", p.learning_rate);
        }
        Ok(())
    }

    /// Create a new config with default values for testing
    pub fn for_testing() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            inference: InferenceConfig {
                provider: "mock".to_string(),
                api_key: "test-key".to_string(),
                model: default_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                api_base: None,
            },
            agent: AgentConfig::default(),
            ledger: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_for_testing_uses_mock_provider() {
        let config = Config::for_testing();
        assert_eq!(config.inference.provider, "mock");
        assert!(config.ledger.is_none());
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let toml_text = r#"
            [inference]
            provider = "mock"
        "#;
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.protocol.encryption_strength, 2);
        assert_eq!(config.protocol.validation_rules, vec!["basic"]);
        assert!((config.protocol.trust_threshold - 0.7).abs() < f64::EPSILON);
        assert!((config.protocol.learning_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.agent.task_timeout_seconds, 60);
    }

    #[test]
    fn test_from_file_rejects_out_of_range_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [protocol]
            trust_threshold = 1.5

            [inference]
            provider = "mock"
            "#
        )
        .unwrap();

        let result = Config::from_file(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [protocol]
            encryption_strength = 3
            validation_rules = ["basic", "advanced"]
            trust_threshold = 0.6

            [inference]
            provider = "openai"
            api_key = "k"
            model = "gpt-4"
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.protocol.encryption_strength, 3);
        assert_eq!(config.protocol.validation_rules.len(), 2);
        assert!((config.protocol.trust_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.inference.provider, "openai");
    }
}
