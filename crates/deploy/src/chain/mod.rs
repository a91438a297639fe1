//! Chain client boundary.
//!
//! Everything the pipeline and the correlator need from a node goes through [`ChainClient`]:
//! submitting transactions, reading receipts and the head block, `eth_call`, and log
//! subscriptions. [`JsonRpcChain`] talks to a real node, [`DevChain`] is an in-process
//! development chain with instant mining.

mod dev;
mod rpc;

use std::{future::Future, sync::Arc};

use alloy_core::primitives::{Address, B256, Bytes, TxHash, U256};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::Result;

pub use dev::{DevBehaviour, DevChain, DevChainBuilder};
pub use rpc::{JsonRpcChain, create_client, json_rpc_call};

/// A transaction to be signed and sent by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub input: Bytes,
    pub value: U256,
}

impl TransactionRequest {
    /// A contract creation transaction.
    pub fn create(from: Address, init_code: Bytes) -> Self {
        Self {
            from,
            to: None,
            input: init_code,
            value: U256::ZERO,
        }
    }

    /// A plain call to `to`.
    pub fn call(from: Address, to: Address, input: Bytes) -> Self {
        Self {
            from,
            to: Some(to),
            input,
            value: U256::ZERO,
        }
    }
}

/// An emitted event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

impl Log {
    pub fn topic(&self, index: usize) -> Option<B256> {
        self.topics.get(index).copied()
    }
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    /// `false` if execution reverted.
    pub status: bool,
    pub logs: Vec<Log>,
}

/// Stream of logs matching an address and `topic0`.
///
/// Dropping the subscription stops any background polling that feeds it.
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<Log>,
    poller: Option<JoinHandle<()>>,
}

impl EventSubscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Log>, poller: Option<JoinHandle<()>>) -> Self {
        Self { rx, poller }
    }

    /// Next matching log, or `None` once the source has gone away.
    pub async fn next(&mut self) -> Option<Log> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Operations the core needs from a node.
pub trait ChainClient: Send + Sync + 'static {
    /// Submit a transaction. Errors here are synchronous rejections.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash>> + Send;

    /// Receipt for `hash`, or `None` while it is still pending (or was dropped).
    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send;

    /// Current head block number.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Read-only call against the latest state.
    fn call(&self, to: Address, input: Bytes) -> impl Future<Output = Result<Bytes>> + Send;

    /// Subscribe to logs emitted by `address` with the given `topic0`.
    ///
    /// Only logs emitted after this future resolves are delivered.
    fn subscribe(
        &self,
        address: Address,
        topic0: B256,
    ) -> impl Future<Output = Result<EventSubscription>> + Send;
}

/// State snapshots, available on development nodes.
pub trait Snapshots: ChainClient {
    fn snapshot(&self) -> impl Future<Output = Result<U256>> + Send;

    /// Restore the state captured by `id`. The snapshot is consumed.
    fn revert(&self, id: U256) -> impl Future<Output = Result<bool>> + Send;
}

impl<C: ChainClient> ChainClient for Arc<C> {
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash>> + Send {
        (**self).send_transaction(tx)
    }

    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<TransactionReceipt>>> + Send {
        (**self).transaction_receipt(hash)
    }

    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send {
        (**self).block_number()
    }

    fn call(&self, to: Address, input: Bytes) -> impl Future<Output = Result<Bytes>> + Send {
        (**self).call(to, input)
    }

    fn subscribe(
        &self,
        address: Address,
        topic0: B256,
    ) -> impl Future<Output = Result<EventSubscription>> + Send {
        (**self).subscribe(address, topic0)
    }
}

impl<C: Snapshots> Snapshots for Arc<C> {
    fn snapshot(&self) -> impl Future<Output = Result<U256>> + Send {
        (**self).snapshot()
    }

    fn revert(&self, id: U256) -> impl Future<Output = Result<bool>> + Send {
        (**self).revert(id)
    }
}
