//! Engine configuration with layered loading.
//!
//! Values come from compiled defaults, then an optional TOML file, then
//! `SERAC__`-prefixed environment variables (`__` separates nested
//! fields), later sources overriding earlier ones. Validation happens at
//! engine construction: a bad value yields a descriptive [`ConfigError`]
//! and no engine instance.
//!
//! # Example
//!
//! ```toml
//! min_quorum_stake = "4000000"
//! min_quorum_connected_score_ratio = 0.5
//! min_avaproofs_node_count = 8
//! query_timeout_ms = 10000
//! enable_proof_replacement = true
//! ```

use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    amount::{amount_to_score, Amount},
    errors::ConfigError,
    record::{VOTE_STALE_FACTOR, VOTE_STALE_MIN_THRESHOLD, VOTE_STALE_THRESHOLD},
};

/// Tunables of the voting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvalancheConfig {
    /// Minimum total stake (decimal currency units) before quorum can
    /// latch. Defaults to `"0"`.
    #[serde(default = "default_min_quorum_stake")]
    pub min_quorum_stake: String,

    /// Required connected/total score ratio, in `[0.0, 1.0]`.
    #[serde(default)]
    pub min_quorum_connected_score_ratio: f64,

    /// Distinct peer proofs-exchange signals needed before quorum can
    /// latch.
    #[serde(default)]
    pub min_avaproofs_node_count: i64,

    /// Votes an item may absorb at zero confidence before going stale.
    #[serde(default = "default_stale_vote_threshold")]
    pub stale_vote_threshold: u32,

    /// Extra vote allowance per point of confidence in the staleness rule.
    #[serde(default = "default_stale_vote_factor")]
    pub stale_vote_factor: u32,

    /// Per-query deadline in milliseconds. Defaults to 10 seconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Event-loop cadence in milliseconds. Defaults to 10.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Whether proofs in the conflicting pool are worth polling.
    #[serde(default)]
    pub enable_proof_replacement: bool,

    /// Confirmations a stake output needs before its proof leaves the
    /// orphan pool. Forwarded to the peer registry.
    #[serde(default = "default_stake_utxo_confirmations")]
    pub stake_utxo_confirmations: u32,

    /// Hex-encoded master secret enabling local participation.
    #[serde(default)]
    pub master_key: Option<String>,

    /// Canonical hex payload of our own stake proof.
    #[serde(default)]
    pub local_proof: Option<String>,
}

fn default_min_quorum_stake() -> String {
    "0".to_string()
}

fn default_stale_vote_threshold() -> u32 {
    VOTE_STALE_THRESHOLD
}

fn default_stale_vote_factor() -> u32 {
    VOTE_STALE_FACTOR
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_stake_utxo_confirmations() -> u32 {
    1
}

impl Default for AvalancheConfig {
    fn default() -> Self {
        Self {
            min_quorum_stake: default_min_quorum_stake(),
            min_quorum_connected_score_ratio: 0.0,
            min_avaproofs_node_count: 0,
            stale_vote_threshold: default_stale_vote_threshold(),
            stale_vote_factor: default_stale_vote_factor(),
            query_timeout_ms: default_query_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            enable_proof_replacement: false,
            stake_utxo_confirmations: default_stake_utxo_confirmations(),
            master_key: None,
            local_proof: None,
        }
    }
}

impl AvalancheConfig {
    /// Loads configuration from a TOML file with environment overrides
    /// (`SERAC__QUERY_TIMEOUT_MS=500` style). The file is optional.
    ///
    /// # Errors
    ///
    /// Returns the underlying loader error when the file or environment
    /// cannot be read or deserialized.
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("SERAC").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads from the path in `SERAC_CONFIG`, falling back to
    /// `config/avalanche.toml`.
    ///
    /// # Errors
    ///
    /// See [`AvalancheConfig::from_file`].
    pub fn load() -> Result<Self, config::ConfigError> {
        let path = std::env::var("SERAC_CONFIG")
            .unwrap_or_else(|_| "config/avalanche.toml".to_string());
        Self::from_file(&path)
    }

    /// Checks every field; the engine constructor refuses to exist on the
    /// first violation.
    ///
    /// # Errors
    ///
    /// Returns the specific [`ConfigError`] for the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.min_quorum_score()?;

        if !(0.0..=1.0).contains(&self.min_quorum_connected_score_ratio) {
            return Err(ConfigError::ConnectedScoreRatio(self.min_quorum_connected_score_ratio));
        }
        if self.min_avaproofs_node_count < 0 {
            return Err(ConfigError::AvaproofsNodeCount(self.min_avaproofs_node_count));
        }
        if self.stale_vote_threshold < VOTE_STALE_MIN_THRESHOLD {
            return Err(ConfigError::StaleVoteThreshold {
                min: VOTE_STALE_MIN_THRESHOLD,
                got: self.stale_vote_threshold,
            });
        }
        if self.stale_vote_factor == 0 {
            return Err(ConfigError::StaleVoteFactor);
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::QueryTimeout);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.stake_utxo_confirmations == 0 {
            return Err(ConfigError::StakeUtxoConfirmations);
        }

        if let Some(key) = &self.master_key {
            let raw = hex::decode(key)
                .map_err(|e| ConfigError::MasterKey(format!("invalid hex: {e}")))?;
            if raw.len() != 32 {
                return Err(ConfigError::MasterKey(format!(
                    "expected 32 bytes, got {}",
                    raw.len()
                )));
            }
        }
        if self.local_proof.is_some() && self.master_key.is_none() {
            return Err(ConfigError::LocalProofWithoutMasterKey);
        }

        Ok(())
    }

    /// Parses the quorum stake option into score units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MinQuorumStake`] when the amount does not
    /// parse or is out of range.
    pub fn min_quorum_score(&self) -> Result<u64, ConfigError> {
        let amount = Amount::parse_str(&self.min_quorum_stake)?;
        Ok(amount_to_score(amount))
    }

    #[must_use]
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
