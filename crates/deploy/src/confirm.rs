//! Waiting for deployment transactions to be buried deep enough.

use std::time::Duration;

use alloy_core::primitives::Address;

use crate::{
    chain::ChainClient,
    deployer::PendingDeployment,
    deployment::DeploymentResult,
    error::{DeployError, Result},
};

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls a transaction until it has the required number of confirmations.
///
/// The wait is always bounded: a transaction that is dropped or never mined surfaces as
/// [`DeployError::ConfirmationTimeout`] once `timeout` elapses. Failed receipt or head queries
/// are polled again until then; the transaction itself is never resubmitted.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationWaiter {
    timeout: Duration,
    poll_interval: Duration,
}

impl ConfirmationWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until `pending` has `required` confirmations (at least one).
    pub async fn await_confirmations<C: ChainClient>(
        &self,
        chain: &C,
        pending: PendingDeployment,
        required: u64,
    ) -> Result<DeploymentResult> {
        let required = required.max(1);
        let tx_hash = pending.tx_hash;

        tracing::debug!(
            contract = %pending.contract_name,
            %tx_hash,
            required,
            "Waiting for confirmations"
        );

        tokio::time::timeout(self.timeout, self.poll(chain, pending, required))
            .await
            .map_err(|_| DeployError::ConfirmationTimeout {
                tx_hash,
                required,
                timeout: self.timeout,
            })?
    }

    async fn poll<C: ChainClient>(
        &self,
        chain: &C,
        pending: PendingDeployment,
        required: u64,
    ) -> Result<DeploymentResult> {
        loop {
            match self.check(chain, &pending, required).await {
                Ok(Some((address, confirmations))) => {
                    tracing::info!(
                        contract = %pending.contract_name,
                        %address,
                        confirmations,
                        "Deployment confirmed"
                    );
                    return Ok(DeploymentResult {
                        contract_name: pending.contract_name,
                        address,
                        transaction_hash: pending.tx_hash,
                        constructor_args: pending.constructor_args,
                        verify_args: None,
                        confirmations,
                        confirmed: true,
                    });
                }
                Ok(None) => {}
                Err(DeployError::Chain(e)) => {
                    tracing::trace!(
                        error = %e,
                        tx_hash = %pending.tx_hash,
                        "Confirmation check failed, retrying..."
                    );
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll: the contract address and confirmation count once `required` is reached.
    async fn check<C: ChainClient>(
        &self,
        chain: &C,
        pending: &PendingDeployment,
        required: u64,
    ) -> Result<Option<(Address, u64)>> {
        let Some(receipt) = chain.transaction_receipt(pending.tx_hash).await? else {
            return Ok(None);
        };
        if !receipt.status {
            return Err(DeployError::DeploymentSubmission {
                contract: pending.contract_name.clone(),
                reason: format!("creation reverted in block {}", receipt.block_number),
            });
        }
        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::DeploymentSubmission {
                contract: pending.contract_name.clone(),
                reason: "receipt carries no contract address".to_string(),
            })?;

        let head = chain.block_number().await?;
        let confirmations = head.saturating_sub(receipt.block_number) + 1;
        if confirmations < required {
            tracing::trace!(
                tx_hash = %pending.tx_hash,
                confirmations,
                required,
                "Not enough confirmations yet"
            );
            return Ok(None);
        }
        Ok(Some((address, confirmations)))
    }
}
