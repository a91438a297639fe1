//! Error taxonomy for deployment runs and oracle correlation.

use std::time::Duration;

use alloy_core::primitives::{B256, TxHash};

/// Result alias used throughout the crate.
pub type Result<T, E = DeployError> = std::result::Result<T, E>;

/// Errors raised by the deployment pipeline and the request correlator.
///
/// Configuration and dependency errors abort the enclosing pipeline. Verification failures are
/// never returned from a pipeline run; they are logged and recorded in the report instead.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// No profile exists for the requested chain.
    #[error("no network profile configured for chain id {chain_id}")]
    ConfigNotFound { chain_id: u64 },

    /// A profile exists but lacks something the selected pipeline needs.
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    /// A contract artifact could not be loaded or was malformed.
    #[error("artifact error for {contract}: {reason}")]
    Artifact { contract: String, reason: String },

    /// The chain rejected the deployment transaction.
    #[error("failed to submit deployment of {contract}: {reason}")]
    DeploymentSubmission { contract: String, reason: String },

    /// The transaction did not reach the required confirmations in time.
    #[error("transaction {tx_hash} not confirmed {required} time(s) within {timeout:?}")]
    ConfirmationTimeout {
        tx_hash: TxHash,
        required: u64,
        timeout: Duration,
    },

    /// A constructor argument referenced a contract that has not confirmed yet.
    #[error("{contract} depends on {dependency}, which has not been confirmed")]
    DependencyNotReady { contract: String, dependency: String },

    /// The verification service refused or failed a submission.
    #[error("verification of {address} failed: {reason}")]
    VerificationFailure {
        address: alloy_core::primitives::Address,
        reason: String,
    },

    /// No matching fulfillment was observed before the deadline.
    #[error("request {request_id:?} was not fulfilled within {timeout:?}")]
    CorrelationTimeout {
        request_id: Option<B256>,
        timeout: Duration,
    },

    /// The fulfillment listener rejected the observed state.
    #[error("fulfillment of request {request_id} rejected: {reason}")]
    CorrelationAssertion { request_id: B256, reason: String },

    /// Transport or node level failure.
    #[error("chain client error: {0}")]
    Chain(String),
}

impl DeployError {
    pub(crate) fn chain(err: impl std::fmt::Display) -> Self {
        Self::Chain(err.to_string())
    }

    /// Returns true if the error is one of the timeout variants.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationTimeout { .. } | Self::CorrelationTimeout { .. }
        )
    }
}
