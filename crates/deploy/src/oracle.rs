//! Oracle request/fulfillment plumbing: bindings for the consumer and oracle contracts, and the
//! test-side fulfillment driver.

use std::future::Future;

use alloy_core::{
    primitives::{Address, B256, Bytes, U256},
    sol,
    sol_types::SolCall,
};

use crate::{
    chain::{ChainClient, TransactionRequest},
    deployer::Signer,
    error::{DeployError, Result},
};

sol! {
    /// Chainlink-style consumer that asks an oracle for a trading volume.
    interface IApiConsumer {
        event ChainlinkRequested(bytes32 indexed id);
        event ChainlinkFulfilled(bytes32 indexed id);
        /// Spelling matches the deployed consumer contract.
        event DataFullfilled(uint256 volume);

        function requestVolumeData() external returns (bytes32 requestId);
        function fulfill(bytes32 requestId, uint256 volume) external;
        function volume() external view returns (uint256);
    }

    /// Oracle mock that forwards answers to the requesting consumer.
    interface IMockOracle {
        function fulfillOracleRequest(bytes32 requestId, bytes32 data) external returns (bool);
    }
}

/// Calldata for `requestVolumeData()`.
pub fn request_volume_call() -> Bytes {
    IApiConsumer::requestVolumeDataCall {}.abi_encode().into()
}

/// Left-pad an integer into a 32-byte word, the encoding oracles use for numeric answers.
pub fn num_to_bytes32(value: u64) -> B256 {
    B256::from(U256::from(value).to_be_bytes::<32>())
}

/// Read `volume()` from an API consumer.
pub async fn read_volume<C: ChainClient>(chain: &C, consumer: Address) -> Result<U256> {
    let output = chain
        .call(consumer, IApiConsumer::volumeCall {}.abi_encode().into())
        .await?;
    IApiConsumer::volumeCall::abi_decode_returns(&output)
        .map_err(|e| DeployError::Chain(format!("malformed volume() output {output}: {e}")))
}

/// Something that answers oracle requests.
///
/// On a live network this is the oracle node itself; in tests an [`OracleSimulator`] plays its
/// part.
pub trait FulfillmentDriver: Send + Sync {
    fn fulfill(&self, request_id: B256, value: B256) -> impl Future<Output = Result<()>> + Send;
}

/// Drives a mock oracle by calling `fulfillOracleRequest(requestId, value)` on it.
#[derive(Debug, Clone)]
pub struct OracleSimulator<C> {
    chain: C,
    oracle: Address,
    signer: Signer,
}

impl<C: ChainClient> OracleSimulator<C> {
    pub fn new(chain: C, oracle: Address, signer: Signer) -> Self {
        Self {
            chain,
            oracle,
            signer,
        }
    }

    pub fn oracle(&self) -> Address {
        self.oracle
    }
}

impl<C: ChainClient> FulfillmentDriver for OracleSimulator<C> {
    async fn fulfill(&self, request_id: B256, value: B256) -> Result<()> {
        let input = IMockOracle::fulfillOracleRequestCall {
            requestId: request_id,
            data: value,
        }
        .abi_encode();
        let tx_hash = self
            .chain
            .send_transaction(TransactionRequest::call(
                self.signer.address,
                self.oracle,
                input.into(),
            ))
            .await?;

        tracing::debug!(%request_id, %tx_hash, oracle = %self.oracle, "Fulfillment submitted");
        Ok(())
    }
}
