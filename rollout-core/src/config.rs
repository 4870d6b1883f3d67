//! `rollout.yaml`: environments, named accounts, and transport tuning.
//!
//! The configuration is an explicit struct handed to every run; nothing in
//! the workspace reads it from global state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accounts::AccountEntry;
use crate::error::ConfigError;
use crate::types::{Address, EnvironmentId};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "rollout.yaml";

/// Root of `rollout.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Directory holding compiled artifacts (Hardhat JSON layout).
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,
    /// Registry root; one sub-directory per environment.
    #[serde(default = "default_deployments")]
    pub deployments: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_environment: Option<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
    /// Role → per-environment account table.
    #[serde(default)]
    pub named_accounts: BTreeMap<String, BTreeMap<String, AccountEntry>>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_deployments() -> PathBuf {
    PathBuf::from("deployments")
}

/// One target environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub chain_id: u64,
    /// Live networks get an extra confirmation line in the CLI.
    #[serde(default)]
    pub live: bool,
    pub transport: TransportConfig,
    /// Signer set; empty means "ask the node" for RPC transports.
    #[serde(default)]
    pub accounts: Vec<Address>,
    /// Gas limit applied to every transaction unless a unit overrides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// How to reach an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-process development chain with `accounts` generated signers.
    Memory {
        #[serde(default = "default_dev_accounts")]
        accounts: usize,
    },
    /// JSON-RPC over HTTP.
    Rpc {
        url: String,
        /// Environment variable that overrides `url` when set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_env: Option<String>,
    },
}

fn default_dev_accounts() -> usize {
    10
}

impl TransportConfig {
    /// Endpoint label, with `url_env` applied.
    pub fn endpoint(&self) -> String {
        match self {
            TransportConfig::Memory { .. } => "memory".to_owned(),
            TransportConfig::Rpc { url, url_env } => url_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| url.clone()),
        }
    }
}

/// Bounded exponential backoff for transient transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_initial_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    10_000
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; used by tests and the memory chain.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (1-based), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let millis = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_delay_ms as f64) as u64)
    }
}

/// Receipt polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

const fn default_poll_interval_ms() -> u64 {
    500
}

const fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RolloutConfig {
    /// Load and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: RolloutConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;

        // Relative directories are relative to the config file.
        if let Some(base) = path.parent() {
            if config.artifacts.is_relative() {
                config.artifacts = base.join(&config.artifacts);
            }
            if config.deployments.is_relative() {
                config.deployments = base.join(&config.deployments);
            }
        }
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default) = &self.default_environment {
            if !self.environments.contains_key(default) {
                return Err(ConfigError::UnknownEnvironment(default.clone()));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        for (role, table) in &self.named_accounts {
            if let Some(env) = table
                .keys()
                .find(|k| *k != "default" && !self.environments.contains_key(*k))
            {
                return Err(ConfigError::Invalid(format!(
                    "named account '{role}' references unknown environment '{env}'"
                )));
            }
        }
        Ok(())
    }

    /// Pick an environment by name, falling back to `default_environment`.
    pub fn environment(
        &self,
        name: Option<&str>,
    ) -> Result<(EnvironmentId, &EnvironmentConfig), ConfigError> {
        let name = name
            .or(self.default_environment.as_deref())
            .ok_or(ConfigError::NoEnvironment)?;
        self.environments
            .get(name)
            .map(|env| (EnvironmentId::from(name), env))
            .ok_or_else(|| ConfigError::UnknownEnvironment(name.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
default_environment: hardhat
environments:
  hardhat:
    chain_id: 1337
    transport: { kind: memory }
  mainnet:
    chain_id: 1
    live: true
    transport: { kind: rpc, url: "http://eth.k8s:8545", url_env: ROLLOUT_TEST_UNSET_RPC }
named_accounts:
  deployer:
    default: 0
  dummy:
    default: 1
    mainnet: "0x00000000000000000000000000000000000000aa"
"#;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_sample_with_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RolloutConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        assert_eq!(config.environments.len(), 2);
        assert_eq!(config.artifacts, dir.path().join("artifacts"));
        assert_eq!(config.deployments, dir.path().join("deployments"));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(
            config.environments["hardhat"].transport,
            TransportConfig::Memory { accounts: 10 }
        );
    }

    #[test]
    fn environment_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let config = RolloutConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        let (id, env) = config.environment(None).unwrap();
        assert_eq!(id, EnvironmentId::from("hardhat"));
        assert_eq!(env.chain_id, 1337);
        let (id, env) = config.environment(Some("mainnet")).unwrap();
        assert_eq!(id.0, "mainnet");
        assert!(env.live);
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = RolloutConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        let err = config.environment(Some("goerli")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEnvironment(name) if name == "goerli"));
    }

    #[test]
    fn rpc_endpoint_uses_url_when_env_var_unset() {
        let dir = TempDir::new().unwrap();
        let config = RolloutConfig::load(&write_config(&dir, SAMPLE)).unwrap();
        assert_eq!(
            config.environments["mainnet"].transport.endpoint(),
            "http://eth.k8s:8545"
        );
    }

    #[test]
    fn named_account_for_unknown_environment_is_invalid() {
        let dir = TempDir::new().unwrap();
        let body = SAMPLE.replace("mainnet: \"0x", "ropsten: \"0x");
        let err = RolloutConfig::load(&write_config(&dir, &body)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("ropsten")));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "environments: [unclosed");
        let err = RolloutConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 300,
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
        assert_eq!(RetryPolicy::immediate(3).delay_for_attempt(3), Duration::ZERO);
    }
}
