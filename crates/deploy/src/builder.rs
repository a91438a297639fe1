//! Builder module for creating an [`Orchestrator`].
//!
//! This module provides the [`OrchestratorBuilder`] struct which wires a chain client, an artifact
//! store, a confirmation policy and a verifier for one resolved network profile.

use std::time::Duration;

use crate::{
    artifacts::ArtifactStore,
    chain::ChainClient,
    confirm::{ConfirmationWaiter, DEFAULT_POLL_INTERVAL},
    deployer::{ContractDeployer, Signer},
    network::ChainProfile,
    orchestrator::Orchestrator,
    verify::{NoVerification, VerificationService, Verifier},
};

/// Default bound on a single confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Builder for creating an [`Orchestrator`].
///
/// # Example
///
/// ```no_run
/// use digipass_deploy::{
///     AssetConstructor, DevChain, NetworkConfig, OrchestratorBuilder, Role, Signer, LOCAL_CHAIN_ID,
/// };
///
/// # async fn example() -> Result<(), digipass_deploy::DeployError> {
/// let profile = NetworkConfig::builtin()?.resolve(LOCAL_CHAIN_ID)?;
/// let mut orchestrator = OrchestratorBuilder::new(profile, DevChain::default(), Signer::dev_account()?)
///     .build();
/// let _report = orchestrator.run_role(Role::Destination, AssetConstructor::Empty).await?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder<C, S = NoVerification> {
    /// The resolved network profile.
    profile: ChainProfile,
    /// The chain client deployments are sent through.
    chain: C,
    /// The deployer account.
    signer: Signer,
    /// Where creation bytecode comes from.
    artifacts: ArtifactStore,
    /// Bound on each confirmation wait.
    timeout: Duration,
    /// Interval between receipt polls.
    poll_interval: Duration,
    /// Overrides the profile's confirmation threshold when set.
    required_confirmations: Option<u64>,
    /// Verification gate and service.
    verifier: Verifier<S>,
}

impl<C: ChainClient> OrchestratorBuilder<C> {
    /// Create a new [`OrchestratorBuilder`]. Verification is disabled until a verifier is set.
    pub fn new(profile: ChainProfile, chain: C, signer: Signer) -> Self {
        Self {
            profile,
            chain,
            signer,
            artifacts: ArtifactStore::default(),
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            required_confirmations: None,
            verifier: Verifier::new(NoVerification, false),
        }
    }
}

impl<C: ChainClient, S: VerificationService> OrchestratorBuilder<C, S> {
    pub fn artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Set the bound on each confirmation wait.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait for `count` confirmations instead of the profile's threshold. Ignored on development
    /// chains, which never mine past the deployment on their own.
    pub fn required_confirmations(mut self, count: u64) -> Self {
        self.required_confirmations = Some(count);
        self
    }

    /// Use `verifier` for the verification step.
    pub fn verifier<V: VerificationService>(self, verifier: Verifier<V>) -> OrchestratorBuilder<C, V> {
        OrchestratorBuilder {
            profile: self.profile,
            chain: self.chain,
            signer: self.signer,
            artifacts: self.artifacts,
            timeout: self.timeout,
            poll_interval: self.poll_interval,
            required_confirmations: self.required_confirmations,
            verifier,
        }
    }

    /// Build the orchestrator. Development profiles always wait for exactly one confirmation;
    /// an override is only honoured on other networks.
    pub fn build(self) -> Orchestrator<C, S> {
        let required_confirmations = match self.required_confirmations {
            Some(count) if self.profile.is_development && count != 1 => {
                tracing::warn!(
                    network = %self.profile.name,
                    requested = count,
                    "Ignoring confirmation override on a development chain"
                );
                1
            }
            Some(count) => count.max(1),
            None => self.profile.required_confirmations.max(1),
        };

        tracing::debug!(
            chain_id = self.profile.chain_id,
            network = %self.profile.name,
            required_confirmations,
            timeout = ?self.timeout,
            "Orchestrator configured"
        );

        Orchestrator {
            profile: self.profile,
            deployer: ContractDeployer::new(self.chain, self.artifacts),
            waiter: ConfirmationWaiter::new(self.timeout).with_poll_interval(self.poll_interval),
            verifier: self.verifier,
            signer: self.signer,
            required_confirmations,
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;

    use super::*;
    use crate::{
        artifacts::Artifact,
        chain::DevChain,
        network::{LOCAL_CHAIN_ID, NetworkConfig},
        roles::{AssetConstructor, DESTINATION_TICKET_PURCHASER, DIGIPASS, Role},
    };

    const SEPOLIA_CHAIN_ID: u64 = 11155111;

    fn builder(chain_id: u64) -> OrchestratorBuilder<DevChain> {
        let profile = NetworkConfig::builtin().unwrap().resolve(chain_id).unwrap();
        OrchestratorBuilder::new(profile, DevChain::default(), Signer::new(Address::repeat_byte(7)))
            .artifacts(ArtifactStore::from_artifacts([
                Artifact::new(DIGIPASS, vec![0x60, 0x01]),
                Artifact::new(DESTINATION_TICKET_PURCHASER, vec![0x60, 0x02]),
            ]))
            .timeout(Duration::from_millis(200))
            .poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_development_chain_ignores_confirmation_override() {
        let mut orchestrator = builder(LOCAL_CHAIN_ID).required_confirmations(6).build();
        assert_eq!(orchestrator.required_confirmations(), 1);

        let report = orchestrator
            .run_role(Role::Destination, AssetConstructor::Empty)
            .await
            .unwrap();
        assert!(report.deployments.iter().all(|d| d.confirmations == 1));
    }

    #[test]
    fn test_public_chain_honours_override() {
        assert_eq!(builder(SEPOLIA_CHAIN_ID).build().required_confirmations(), 6);
        assert_eq!(
            builder(SEPOLIA_CHAIN_ID)
                .required_confirmations(2)
                .build()
                .required_confirmations(),
            2
        );
        assert_eq!(
            builder(SEPOLIA_CHAIN_ID)
                .required_confirmations(0)
                .build()
                .required_confirmations(),
            1
        );
    }
}
