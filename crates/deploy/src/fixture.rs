//! Deploy-once test fixtures backed by chain snapshots.

use alloy_core::primitives::U256;
use tokio::sync::Mutex;

use crate::{
    builder::OrchestratorBuilder,
    chain::{ChainClient, Snapshots},
    deployment::{DeploymentReport, DeploymentSpec},
    error::{DeployError, Result},
    orchestrator::Orchestrator,
    roles::{AssetConstructor, Role},
    verify::VerificationService,
};

struct Loaded {
    report: DeploymentReport,
    snapshot: U256,
}

/// Runs a deployment plan once and hands every later caller the same fresh state.
///
/// The first [`Fixture::setup_once`] deploys with a confirmation threshold of 1 and snapshots the
/// chain. Every later call reverts to that snapshot and takes a new one, so state written by one
/// test never leaks into the next.
pub struct Fixture<C, S> {
    orchestrator: Mutex<Orchestrator<C, S>>,
    plan: Vec<DeploymentSpec>,
    loaded: Mutex<Option<Loaded>>,
}

impl<C: Snapshots, S: VerificationService> Fixture<C, S> {
    pub fn new(builder: OrchestratorBuilder<C, S>, plan: Vec<DeploymentSpec>) -> Self {
        Self {
            orchestrator: Mutex::new(builder.required_confirmations(1).build()),
            plan,
            loaded: Mutex::new(None),
        }
    }

    /// Fixture for the plan of `role` on the builder's network.
    pub fn for_role(
        builder: OrchestratorBuilder<C, S>,
        role: Role,
        asset: AssetConstructor,
    ) -> Result<Self> {
        let orchestrator = builder.required_confirmations(1).build();
        let plan = role.plan(orchestrator.profile(), asset)?;
        Ok(Self {
            orchestrator: Mutex::new(orchestrator),
            plan,
            loaded: Mutex::new(None),
        })
    }

    /// Deployed contracts, in a state identical to the one right after the first deployment.
    pub async fn setup_once(&self) -> Result<DeploymentReport> {
        let mut loaded = self.loaded.lock().await;
        let mut orchestrator = self.orchestrator.lock().await;

        if let Some(state) = loaded.as_mut() {
            let chain = orchestrator.chain();
            if !chain.revert(state.snapshot).await? {
                return Err(DeployError::Chain(format!(
                    "fixture snapshot {} no longer exists",
                    state.snapshot
                )));
            }
            state.snapshot = chain.snapshot().await?;
            tracing::debug!(snapshot = %state.snapshot, "Fixture restored");
            return Ok(state.report.clone());
        }

        let report = orchestrator.run(&self.plan).await?;
        let snapshot = orchestrator.chain().snapshot().await?;
        tracing::debug!(%snapshot, contracts = report.deployments.len(), "Fixture loaded");

        *loaded = Some(Loaded {
            report: report.clone(),
            snapshot,
        });
        Ok(report)
    }

    /// Current head block, mostly useful to assert isolation in tests.
    pub async fn block_number(&self) -> Result<u64> {
        self.orchestrator.lock().await.chain().block_number().await
    }
}
