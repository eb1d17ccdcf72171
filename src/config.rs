//! Deployment configuration: the network table, the addresses of the
//! multisig and governor, and the gas and receipt-polling knobs.
//!
//! Configuration is plain JSON deserialized with serde. Two environment
//! variables override the file at lookup time:
//!
//! - `DEPLOY_RPC_URL` replaces the RPC URL of whichever network is selected.
//! - `DEPLOY_FORCE_MULTISIG_OWNER` (`1`, `true`, `yes`) routes every upgrade
//!   through the multisig regardless of network tier.
use crate::domain::error::OrchestratorError;
use crate::domain::gas_policy::{DEFAULT_GAS_MARGIN_BPS, MAX_GAS_MARGIN_BPS};
use crate::domain::types::{NetworkTier, TxFormat, UpgradeDecision};
use crate::features::evm::{DEFAULT_RECEIPT_MAX_POLLS, DEFAULT_RECEIPT_POLL_INTERVAL_MS};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const RPC_URL_ENV: &str = "DEPLOY_RPC_URL";
pub const FORCE_MULTISIG_OWNER_ENV: &str = "DEPLOY_FORCE_MULTISIG_OWNER";
const DEFAULT_MAX_RESPONSE_BYTES: u64 = 256 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub fallback_rpc_url: Option<String>,
    pub chain_id: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tx_format: TxFormat,
}

impl NetworkConfig {
    pub fn tier(&self) -> NetworkTier {
        NetworkTier::from_tags(&self.tags)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub networks: BTreeMap<String, NetworkConfig>,
    pub multisig_address: Address,
    #[serde(default)]
    pub governor_address: Option<Address>,
    #[serde(default = "default_gas_margin_bps")]
    pub gas_margin_bps: u32,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    #[serde(default = "default_receipt_max_polls")]
    pub receipt_max_polls: u32,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: u64,
}

const fn default_gas_margin_bps() -> u32 {
    DEFAULT_GAS_MARGIN_BPS
}

const fn default_receipt_poll_interval_ms() -> u64 {
    DEFAULT_RECEIPT_POLL_INTERVAL_MS
}

const fn default_receipt_max_polls() -> u32 {
    DEFAULT_RECEIPT_MAX_POLLS
}

const fn default_max_response_bytes() -> u64 {
    DEFAULT_MAX_RESPONSE_BYTES
}

impl DeploymentConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, OrchestratorError> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            OrchestratorError::InvalidConfig(format!("failed to parse deployment config: {error}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|error| {
            OrchestratorError::InvalidConfig(format!(
                "failed to read deployment config {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.networks.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one network must be configured".to_string(),
            ));
        }
        for (name, network) in &self.networks {
            if network.rpc_url.trim().is_empty() {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "network {name} has an empty rpc_url"
                )));
            }
            if network.chain_id == 0 {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "network {name} must set a non-zero chain_id"
                )));
            }
        }
        if self.multisig_address.is_zero() {
            return Err(OrchestratorError::InvalidConfig(
                "multisig_address must not be the zero address".to_string(),
            ));
        }
        if self.gas_margin_bps > MAX_GAS_MARGIN_BPS {
            return Err(OrchestratorError::InvalidConfig(format!(
                "gas_margin_bps {} exceeds {MAX_GAS_MARGIN_BPS}",
                self.gas_margin_bps
            )));
        }
        if self.receipt_max_polls == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "receipt_max_polls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The named network, with `DEPLOY_RPC_URL` applied when set.
    pub fn network(&self, name: &str) -> Result<NetworkConfig, OrchestratorError> {
        let mut network = self.networks.get(name).cloned().ok_or_else(|| {
            OrchestratorError::InvalidConfig(format!("network {name} is not configured"))
        })?;
        if let Some(rpc_url) = std::env::var(RPC_URL_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
        {
            network.rpc_url = rpc_url;
        }
        Ok(network)
    }

    pub fn tier_for(&self, name: &str) -> Result<NetworkTier, OrchestratorError> {
        Ok(self.network(name)?.tier())
    }

    pub fn upgrade_decision_for(&self, name: &str) -> Result<UpgradeDecision, OrchestratorError> {
        Ok(UpgradeDecision::for_network(
            self.tier_for(name)?,
            force_multisig_owner(),
        ))
    }

    pub fn governor(&self) -> Result<Address, OrchestratorError> {
        self.governor_address.ok_or_else(|| {
            OrchestratorError::InvalidConfig("governor_address is not configured".to_string())
        })
    }
}

pub fn force_multisig_owner() -> bool {
    std::env::var(FORCE_MULTISIG_OWNER_ENV)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::with_locked_host_env;
    use alloy_primitives::address;

    const CONFIG: &str = r#"{
        "networks": {
            "development": { "rpc_url": "http://127.0.0.1:8545", "chain_id": 31337 },
            "rskTestnet": {
                "rpc_url": "https://public-node.testnet.rsk.co",
                "fallback_rpc_url": "https://testnet.sovryn.app/rpc",
                "chain_id": 31,
                "tags": ["testnet"]
            },
            "rskMainnet": {
                "rpc_url": "https://public-node.rsk.co",
                "chain_id": 30,
                "tags": ["mainnet", "forked"]
            }
        },
        "multisig_address": "0x189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57",
        "governor_address": "0x6496df39d000478a7a7352c01e0e713835051ccd"
    }"#;

    fn without_overrides<T>(f: impl FnOnce() -> T) -> T {
        with_locked_host_env(
            &[(RPC_URL_ENV, None), (FORCE_MULTISIG_OWNER_ENV, None)],
            f,
        )
    }

    #[test]
    fn parses_and_applies_defaults() {
        let config = DeploymentConfig::from_json_str(CONFIG).expect("config should parse");
        assert_eq!(config.gas_margin_bps, 3_000);
        assert_eq!(config.receipt_poll_interval_ms, 1_000);
        assert_eq!(config.receipt_max_polls, 120);
        assert_eq!(
            config.multisig_address,
            address!("189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57")
        );
        assert_eq!(
            config.governor(),
            Ok(address!("6496df39d000478a7a7352c01e0e713835051ccd"))
        );
    }

    #[test]
    fn classifies_networks_from_tags() {
        without_overrides(|| {
            let config = DeploymentConfig::from_json_str(CONFIG).expect("config should parse");
            assert_eq!(config.tier_for("development"), Ok(NetworkTier::Local));
            assert_eq!(config.tier_for("rskTestnet"), Ok(NetworkTier::Testnet));
            assert_eq!(config.tier_for("rskMainnet"), Ok(NetworkTier::Mainnet));
            assert!(matches!(
                config.tier_for("goerli"),
                Err(OrchestratorError::InvalidConfig(_))
            ));

            assert_eq!(
                config.upgrade_decision_for("development"),
                Ok(UpgradeDecision::DirectApply)
            );
            assert_eq!(
                config.upgrade_decision_for("rskMainnet"),
                Ok(UpgradeDecision::GovernanceProposal)
            );
        });
    }

    #[test]
    fn force_multisig_owner_env_routes_through_multisig() {
        with_locked_host_env(&[(FORCE_MULTISIG_OWNER_ENV, Some("TRUE"))], || {
            let config = DeploymentConfig::from_json_str(CONFIG).expect("config should parse");
            assert_eq!(
                config.upgrade_decision_for("development"),
                Ok(UpgradeDecision::MultisigGated)
            );
        });
        with_locked_host_env(&[(FORCE_MULTISIG_OWNER_ENV, Some("off"))], || {
            assert!(!force_multisig_owner());
        });
    }

    #[test]
    fn rpc_url_env_overrides_selected_network() {
        with_locked_host_env(&[(RPC_URL_ENV, Some(" http://10.0.0.5:8545 "))], || {
            let config = DeploymentConfig::from_json_str(CONFIG).expect("config should parse");
            let network = config.network("rskTestnet").expect("network should exist");
            assert_eq!(network.rpc_url, "http://10.0.0.5:8545");
            assert_eq!(
                network.fallback_rpc_url.as_deref(),
                Some("https://testnet.sovryn.app/rpc")
            );
        });
    }

    #[test]
    fn tx_format_defaults_to_legacy() {
        without_overrides(|| {
            let config = DeploymentConfig::from_json_str(CONFIG).expect("config should parse");
            let rsk = config.network("rskMainnet").expect("network should exist");
            assert_eq!(rsk.tx_format, TxFormat::Legacy);

            let typed = CONFIG.replace(
                "\"chain_id\": 31337 }",
                "\"chain_id\": 31337, \"tx_format\": \"eip1559\" }",
            );
            let config = DeploymentConfig::from_json_str(&typed).expect("config should parse");
            let development = config.network("development").expect("network should exist");
            assert_eq!(development.tx_format, TxFormat::Eip1559);

            let unknown = CONFIG.replace(
                "\"chain_id\": 31337 }",
                "\"chain_id\": 31337, \"tx_format\": \"eip2930\" }",
            );
            assert!(DeploymentConfig::from_json_str(&unknown).is_err());
        });
    }

    #[test]
    fn rejects_invalid_configs() {
        assert!(DeploymentConfig::from_json_str("{").is_err());

        let no_networks = r#"{
            "networks": {},
            "multisig_address": "0x189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57"
        }"#;
        assert!(DeploymentConfig::from_json_str(no_networks).is_err());

        let zero_multisig = CONFIG.replace(
            "0x189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57",
            "0x0000000000000000000000000000000000000000",
        );
        assert!(DeploymentConfig::from_json_str(&zero_multisig).is_err());

        let excessive_margin = CONFIG.replace(
            "\"governor_address\"",
            "\"gas_margin_bps\": 20000, \"governor_address\"",
        );
        assert!(matches!(
            DeploymentConfig::from_json_str(&excessive_margin),
            Err(OrchestratorError::InvalidConfig(message)) if message.contains("gas_margin_bps")
        ));
    }

    #[test]
    fn missing_governor_is_a_config_error() {
        let config = DeploymentConfig::from_json_str(
            r#"{
                "networks": { "development": { "rpc_url": "http://127.0.0.1:8545", "chain_id": 31337 } },
                "multisig_address": "0x189ecd23e9e34cfc07bfc3b7f5711a23f43f8a57"
            }"#,
        )
        .expect("config should parse");
        assert!(config.governor().is_err());
    }
}
