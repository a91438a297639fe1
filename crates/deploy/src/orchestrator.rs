//! Sequential deployment pipeline: deploy, confirm, then verify.

use tracing::Instrument;

use crate::{
    chain::ChainClient,
    confirm::ConfirmationWaiter,
    deployer::{ContractDeployer, Signer},
    deployment::{DeploymentReport, DeploymentResult, DeploymentSpec, VerificationRequest},
    error::Result,
    network::ChainProfile,
    roles::{AssetConstructor, Role},
    verify::{VerificationService, Verifier},
};

/// Runs deployment plans against one network with one signer.
///
/// Nodes are deployed strictly in plan order. Each deployment is confirmed before the next one
/// is submitted, so a node can only ever reference addresses that are already buried at the
/// required depth. Verification runs once every node has confirmed and never fails the run.
pub struct Orchestrator<C, S> {
    pub(crate) profile: ChainProfile,
    pub(crate) deployer: ContractDeployer<C>,
    pub(crate) waiter: ConfirmationWaiter,
    pub(crate) verifier: Verifier<S>,
    pub(crate) signer: Signer,
    pub(crate) required_confirmations: u64,
}

impl<C: ChainClient, S: VerificationService> Orchestrator<C, S> {
    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    pub fn chain(&self) -> &C {
        self.deployer.chain()
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn required_confirmations(&self) -> u64 {
        self.required_confirmations
    }

    /// Run the plan for `role`.
    pub async fn run_role(&mut self, role: Role, asset: AssetConstructor) -> Result<DeploymentReport> {
        let plan = role.plan(&self.profile, asset)?;
        let span = tracing::info_span!("role", %role);
        self.run(&plan).instrument(span).await
    }

    /// Deploy, confirm and verify every node of `plan`.
    pub async fn run(&mut self, plan: &[DeploymentSpec]) -> Result<DeploymentReport> {
        let span = tracing::info_span!(
            "deploy",
            chain_id = self.profile.chain_id,
            network = %self.profile.name,
        );
        self.run_plan(plan).instrument(span).await
    }

    async fn run_plan(&mut self, plan: &[DeploymentSpec]) -> Result<DeploymentReport> {
        tracing::info!(
            nodes = plan.len(),
            confirmations = self.required_confirmations,
            deployer = %self.signer.address,
            "Starting deployment"
        );

        let mut deployments: Vec<DeploymentResult> = Vec::with_capacity(plan.len());
        for spec in plan {
            let args = spec.resolve_args(&deployments)?;
            let verify_args = spec.resolve_verify_args(&deployments)?;
            let pending = self
                .deployer
                .deploy(&spec.contract_name, &args, &self.signer)
                .await?;
            let result = DeploymentResult {
                verify_args,
                ..self
                    .waiter
                    .await_confirmations(self.deployer.chain(), pending, self.required_confirmations)
                    .await?
            };

            tracing::info!(
                contract = %result.contract_name,
                address = %result.address,
                "Contract deployed"
            );
            deployments.push(result);
        }

        let mut verifications = Vec::with_capacity(deployments.len());
        for deployment in &deployments {
            let outcome = self
                .verifier
                .verify(&self.profile, &VerificationRequest::from(deployment))
                .await;
            verifications.push((deployment.address, outcome));
        }

        Ok(DeploymentReport {
            chain_id: self.profile.chain_id,
            network: self.profile.name.clone(),
            deployments,
            verifications,
        })
    }
}
