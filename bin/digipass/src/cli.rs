use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use digipass_deploy::{AssetConstructor, LOCAL_CHAIN_ID, Role};
use tracing::level_filters::LevelFilter;
use url::Url;

/// The default JSON-RPC endpoint (local hardhat/anvil node).
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Target network, by chain id or by configured name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::Display)]
pub enum NetworkSelector {
    #[strum(serialize = "{0}")]
    ChainId(u64),
    #[strum(serialize = "{0}")]
    Name(String),
}

impl FromStr for NetworkSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse()
            .map(NetworkSelector::ChainId)
            .unwrap_or_else(|_| NetworkSelector::Name(s.to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum OutData {
    /// Print the report only.
    None,
    #[strum(default)]
    Path(String),
}

#[derive(Parser)]
#[command(name = "digipass")]
#[command(
    author,
    version,
    about = "Deploy and verify the DigiPass cross-chain ticket contracts"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "DIGIPASS_VERBOSITY", default_value_t = LevelFilter::INFO, global = true)]
    pub verbosity: LevelFilter,

    /// Path to a networks TOML file.
    ///
    /// If not provided, the built-in network table is used.
    #[arg(long, env = "DIGIPASS_NETWORKS", global = true)]
    pub networks: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the contracts of one role and verify them.
    Deploy(DeployArgs),
    /// List the configured networks.
    Networks {
        /// Also write the network table to this TOML file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Parser)]
pub struct DeployArgs {
    /// Which side of the cross-chain pair to deploy.
    #[arg(long, env = "DIGIPASS_ROLE")]
    pub role: Role,

    /// The target network (chain id or name).
    #[arg(short, long, visible_alias = "chain", env = "DIGIPASS_NETWORK", default_value_t = NetworkSelector::ChainId(LOCAL_CHAIN_ID))]
    pub network: NetworkSelector,

    /// The URL of the JSON-RPC endpoint. The node signs transactions for the deployer account.
    #[arg(long, alias = "rpc", env = "DIGIPASS_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: Url,

    /// Directory holding compiled contract artifacts (Hardhat `artifacts/` or Foundry `out/`).
    #[arg(long, env = "DIGIPASS_ARTIFACTS", default_value = "artifacts")]
    pub artifacts: PathBuf,

    /// Hardhat `build-info` directory, used for explorer verification.
    ///
    /// Defaults to `<artifacts>/build-info` when it exists.
    #[arg(long, env = "DIGIPASS_BUILD_INFO")]
    pub build_info: Option<PathBuf>,

    /// Hex private key of the deployer account.
    #[arg(long, env = "DIGIPASS_PRIVATE_KEY", conflicts_with = "mnemonic")]
    pub private_key: Option<String>,

    /// Mnemonic of the deployer account.
    ///
    /// If neither a key nor a mnemonic is provided, the first dev account is used.
    #[arg(long, env = "DIGIPASS_MNEMONIC")]
    pub mnemonic: Option<String>,

    /// Derivation index used with `--mnemonic`.
    #[arg(long, env = "DIGIPASS_ACCOUNT_INDEX", default_value_t = 0)]
    pub account_index: u32,

    /// Constructor variant of the DigiPass contract.
    #[arg(long, env = "DIGIPASS_ASSET_CONSTRUCTOR", default_value_t = AssetConstructor::Empty)]
    pub asset_constructor: AssetConstructor,

    /// Bound on each confirmation wait, in seconds.
    #[arg(long, env = "DIGIPASS_TIMEOUT", default_value_t = 300)]
    pub timeout: u64,

    /// Override the network's confirmation threshold. Development chains always use 1.
    #[arg(long, env = "DIGIPASS_CONFIRMATIONS")]
    pub confirmations: Option<u64>,

    /// Where to write the deployment report.
    ///
    /// If not provided, the report is stored at: ./deployments/<network>.json
    #[arg(long, env = "DIGIPASS_OUTDATA")]
    pub outdata: Option<OutData>,
}
