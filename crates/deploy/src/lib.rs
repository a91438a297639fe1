//! digipass-deploy - Deployment and oracle correlation library for the DigiPass contracts.
//!
//! This crate deploys the cross-chain ticket purchase contracts (a source-chain initiator and a
//! destination-chain pass plus receiver) with dependency ordering, confirmation waits and
//! best-effort explorer verification, and correlates oracle requests with their fulfillments.

pub mod abi;
pub mod chain;

mod artifacts;
pub use artifacts::{Artifact, ArtifactStore};

mod builder;
pub use builder::{DEFAULT_CONFIRMATION_TIMEOUT, OrchestratorBuilder};

mod confirm;
pub use confirm::{ConfirmationWaiter, DEFAULT_POLL_INTERVAL};

mod correlator;
pub use correlator::{Correlator, OracleRequest, RequestRecord};

mod deployer;
pub use deployer::{ContractDeployer, DEV_MNEMONIC, PendingDeployment, Signer};

mod deployment;
pub use deployment::{
    ConstructorArg, DeploymentReport, DeploymentResult, DeploymentSpec, VerificationRequest,
};

mod error;
pub use error::{DeployError, Result};

mod fixture;
pub use fixture::Fixture;

mod network;
pub use network::{
    ChainProfile, ENV_PREFIX, ExplorerConfig, LOCAL_CHAIN_ID, NetworkConfig, NetworkEntry,
    NetworksFile, VERIFICATION_BLOCK_CONFIRMATIONS,
};

pub mod oracle;

mod orchestrator;
pub use orchestrator::Orchestrator;

mod roles;
pub use roles::{
    AssetConstructor, DESTINATION_TICKET_PURCHASER, DIGIPASS, Role, SOURCE_TICKET_PURCHASE,
};

mod verify;
pub use verify::{
    API_KEY_ENV, EtherscanVerifier, NoVerification, SourceBundle, VerificationOutcome,
    VerificationService, Verifier,
};

pub use abi::AbiValue;
pub use chain::{
    ChainClient, DevBehaviour, DevChain, DevChainBuilder, EventSubscription, JsonRpcChain, Log,
    Snapshots, TransactionReceipt, TransactionRequest,
};
