//! Static network profiles keyed by chain id.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use alloy_core::primitives::{Address, address};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DeployError, Result};

/// Confirmations waited for on public networks before verifying.
pub const VERIFICATION_BLOCK_CONFIRMATIONS: u64 = 6;

/// Chain id used by local hardhat/anvil nodes.
pub const LOCAL_CHAIN_ID: u64 = 31337;

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "DIGIPASS_";

/// Block explorer with a verification API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Etherscan-compatible API endpoint.
    pub api_url: Url,
    /// Public browser URL, used for log links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_url: Option<Url>,
}

/// Resolved, immutable parameters of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    pub chain_id: u64,
    pub name: String,
    /// Cross-chain router.
    pub router_address: Address,
    /// Token bridged between the source and destination purchasers.
    pub bridging_token_address: Address,
    /// Token used to pay cross-chain fees (LINK).
    pub fee_token_address: Option<Address>,
    pub is_development: bool,
    /// Always 1 on development chains.
    pub required_confirmations: u64,
    pub explorer: Option<ExplorerConfig>,
}

/// One network as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub chain_id: u64,
    pub router_address: Address,
    pub bridging_token_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_token_address: Option<Address>,
    #[serde(default)]
    pub development: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer: Option<ExplorerConfig>,
}

impl NetworkEntry {
    fn into_profile(self, name: String) -> ChainProfile {
        let required_confirmations = if self.development {
            1
        } else {
            self.confirmations
                .unwrap_or(VERIFICATION_BLOCK_CONFIRMATIONS)
                .max(1)
        };

        ChainProfile {
            chain_id: self.chain_id,
            name,
            router_address: self.router_address,
            bridging_token_address: self.bridging_token_address,
            fee_token_address: self.fee_token_address,
            is_development: self.development,
            required_confirmations,
            explorer: self.explorer,
        }
    }
}

/// On-disk layout of the networks file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworksFile {
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkEntry>,
}

impl From<&ChainProfile> for NetworkEntry {
    fn from(profile: &ChainProfile) -> Self {
        Self {
            chain_id: profile.chain_id,
            router_address: profile.router_address,
            bridging_token_address: profile.bridging_token_address,
            fee_token_address: profile.fee_token_address,
            development: profile.is_development,
            confirmations: (!profile.is_development).then_some(profile.required_confirmations),
            explorer: profile.explorer.clone(),
        }
    }
}

impl NetworksFile {
    /// Write the file as TOML, in the layout [`NetworkConfig::load`] reads.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeployError::InvalidConfig(format!("failed to serialize networks: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            DeployError::InvalidConfig(format!("failed to write {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), networks = self.networks.len(), "Networks file saved");
        Ok(())
    }
}

/// Chain id to profile table, built once at start-up.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    profiles: Arc<BTreeMap<u64, ChainProfile>>,
}

impl NetworkConfig {
    /// Build the table from named entries.
    ///
    /// Two entries sharing a chain id are rejected so that every lookup has exactly one answer.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, NetworkEntry)>,
    ) -> Result<Self> {
        let mut profiles = BTreeMap::new();
        for (name, entry) in entries {
            let profile = entry.into_profile(name);
            if let Some(existing) = profiles.insert(profile.chain_id, profile) {
                return Err(DeployError::InvalidConfig(format!(
                    "chain id {} is configured more than once ({})",
                    existing.chain_id, existing.name
                )));
            }
        }
        Ok(Self {
            profiles: Arc::new(profiles),
        })
    }

    /// Load networks from a TOML file, with `DIGIPASS_NETWORKS__<NAME>__<FIELD>` overrides.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::InvalidConfig(format!(
                "network configuration not found: {}",
                path.display()
            )));
        }

        let file: NetworksFile = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| DeployError::InvalidConfig(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            networks = file.networks.len(),
            "Network configuration loaded"
        );

        Self::from_entries(file.networks)
    }

    /// Profiles for the networks the project targets out of the box.
    pub fn builtin() -> Result<Self> {
        let parse = |url: &str| {
            Url::parse(url)
                .map_err(|e| DeployError::InvalidConfig(format!("invalid built-in url {url}: {e}")))
        };
        let explorer = |api: &str, browser: &str| -> Result<Option<ExplorerConfig>> {
            Ok(Some(ExplorerConfig {
                api_url: parse(api)?,
                browser_url: Some(parse(browser)?),
            }))
        };

        let entries = [
            (
                "localhost",
                NetworkEntry {
                    chain_id: LOCAL_CHAIN_ID,
                    router_address: address!("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
                    bridging_token_address: address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"),
                    fee_token_address: Some(address!("0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0")),
                    development: true,
                    confirmations: None,
                    explorer: None,
                },
            ),
            (
                "sepolia",
                NetworkEntry {
                    chain_id: 11155111,
                    router_address: address!("0x0BF3dE8c5D3e8A2B34D2BEeB17ABfCeBaf363A59"),
                    bridging_token_address: address!("0xFd57b4ddBf88a4e07fF4e34C487b99af2Fe82a05"),
                    fee_token_address: Some(address!("0x779877A7B0D9E8603169DdbD7836e478b4624789")),
                    development: false,
                    confirmations: Some(VERIFICATION_BLOCK_CONFIRMATIONS),
                    explorer: explorer(
                        "https://api-sepolia.etherscan.io/api",
                        "https://sepolia.etherscan.io",
                    )?,
                },
            ),
            (
                "fuji",
                NetworkEntry {
                    chain_id: 43113,
                    router_address: address!("0xF694E193200268f9a4868e4Aa017A0118C9a8177"),
                    bridging_token_address: address!("0xD21341536c5cF5EB1bcb58f6723cE26e8D8E90e4"),
                    fee_token_address: Some(address!("0x0b9d5D9136855f6FEc3c0993feE6E9CE8a297846")),
                    development: false,
                    confirmations: Some(VERIFICATION_BLOCK_CONFIRMATIONS),
                    explorer: explorer(
                        "https://api-testnet.snowtrace.io/api",
                        "https://testnet.snowtrace.io",
                    )?,
                },
            ),
            (
                "amoy",
                NetworkEntry {
                    chain_id: 80002,
                    router_address: address!("0x9C32fCB86BF0f4a1A8921a9Fe46de3198bb884B2"),
                    bridging_token_address: address!("0xcab0EF91Bee323d1A617c0a027eE753aFd6997E4"),
                    fee_token_address: Some(address!("0x0Fd9e8d3aF1aaee056EB9e802c3A762a667b1904")),
                    development: false,
                    confirmations: Some(VERIFICATION_BLOCK_CONFIRMATIONS),
                    explorer: explorer(
                        "https://api-amoy.polygonscan.com/api",
                        "https://amoy.polygonscan.com",
                    )?,
                },
            ),
        ];

        Self::from_entries(entries.into_iter().map(|(name, e)| (name.to_string(), e)))
    }

    /// Look up the profile for `chain_id`.
    pub fn resolve(&self, chain_id: u64) -> Result<ChainProfile> {
        self.profiles
            .get(&chain_id)
            .cloned()
            .ok_or(DeployError::ConfigNotFound { chain_id })
    }

    /// Look up a profile by its configured name.
    pub fn resolve_name(&self, name: &str) -> Option<ChainProfile> {
        self.profiles.values().find(|p| p.name == name).cloned()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ChainProfile> {
        self.profiles.values()
    }

    /// The table in its on-disk layout.
    pub fn to_networks_file(&self) -> NetworksFile {
        NetworksFile {
            networks: self
                .profiles
                .values()
                .map(|p| (p.name.clone(), NetworkEntry::from(p)))
                .collect(),
        }
    }
}
