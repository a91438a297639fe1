//! Ethereum JSON-RPC implementation of [`ChainClient`].

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, TxHash, U64, U256};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use super::{ChainClient, EventSubscription, Log, Snapshots, TransactionReceipt, TransactionRequest};
use crate::error::{DeployError, Result};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between `eth_getLogs` polls for subscriptions.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| DeployError::Chain(format!("failed to create HTTP client: {e}")))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// An `error` member in the response is surfaced as [`DeployError::Chain`] carrying the node's
/// message.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T> {
    let response = client
        .post(url.clone())
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| DeployError::Chain(format!("failed to send {method} request: {e}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|e| DeployError::Chain(format!("failed to parse {method} response: {e}")))?;

    if let Some(error) = result.get("error") {
        return Err(DeployError::Chain(format!(
            "{method}: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        )));
    }

    let result_value = result
        .get("result")
        .cloned()
        .ok_or_else(|| DeployError::Chain(format!("no result in {method} response")))?;

    serde_json::from_value(result_value)
        .map_err(|e| DeployError::Chain(format!("failed to deserialize {method} result: {e}")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    #[serde(default)]
    block_number: Option<U64>,
    #[serde(default)]
    transaction_hash: Option<TxHash>,
}

impl From<RpcLog> for Log {
    fn from(log: RpcLog) -> Self {
        Log {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: log.block_number.map(|n| n.to::<u64>()),
            transaction_hash: log.transaction_hash,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: TxHash,
    block_number: Option<U64>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

/// Chain client backed by an HTTP JSON-RPC endpoint.
///
/// Transactions are sent with `eth_sendTransaction`, so the node (or a signing proxy in front
/// of it) must hold the key of the `from` account and manages its nonce.
#[derive(Debug, Clone)]
pub struct JsonRpcChain {
    client: reqwest::Client,
    url: Url,
    poll_interval: Duration,
}

impl JsonRpcChain {
    pub fn new(url: Url) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the `eth_getLogs` polling interval used by subscriptions.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = json_rpc_call(&self.client, &self.url, "eth_chainId", vec![]).await?;
        Ok(id.to())
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        json_rpc_call(&self.client, &self.url, method, params).await
    }
}

impl ChainClient for JsonRpcChain {
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        let mut params = json!({
            "from": tx.from,
            "data": tx.input,
            "value": tx.value,
        });
        if let Some(to) = tx.to {
            params["to"] = json!(to);
        }

        let hash: TxHash = self.request("eth_sendTransaction", vec![params]).await?;
        tracing::debug!(tx_hash = %hash, from = %tx.from, "Transaction sent");
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;

        // Some nodes return a receipt without a block number while the tx is pending.
        Ok(receipt.and_then(|r| {
            let block_number = r.block_number?.to::<u64>();
            Some(TransactionReceipt {
                transaction_hash: r.transaction_hash,
                block_number,
                contract_address: r.contract_address,
                status: r.status.is_none_or(|s| s == U64::from(1)),
                logs: r.logs.into_iter().map(Log::from).collect(),
            })
        }))
    }

    async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.request("eth_blockNumber", vec![]).await?;
        Ok(number.to())
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        self.request(
            "eth_call",
            vec![json!({ "to": to, "data": input }), json!("latest")],
        )
        .await
    }

    async fn subscribe(&self, address: Address, topic0: B256) -> Result<EventSubscription> {
        let mut from_block = self.block_number().await? + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let client = self.client.clone();
        let url = self.url.clone();
        let poll_interval = self.poll_interval;

        let poller = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;

                let head: U64 = match json_rpc_call(&client, &url, "eth_blockNumber", vec![]).await
                {
                    Ok(head) => head,
                    Err(e) => {
                        tracing::trace!(error = %e, "Log poll failed, retrying...");
                        continue;
                    }
                };
                let head = head.to::<u64>();
                if head < from_block {
                    continue;
                }

                let filter = json!({
                    "address": address,
                    "topics": [topic0],
                    "fromBlock": U64::from(from_block),
                    "toBlock": U64::from(head),
                });
                let logs: Vec<RpcLog> =
                    match json_rpc_call(&client, &url, "eth_getLogs", vec![filter]).await {
                        Ok(logs) => logs,
                        Err(e) => {
                            tracing::trace!(error = %e, "Log poll failed, retrying...");
                            continue;
                        }
                    };

                for log in logs {
                    if tx.send(Log::from(log)).is_err() {
                        return;
                    }
                }
                from_block = head + 1;
            }
        });

        tracing::debug!(%address, %topic0, from_block, "Subscribed to logs");
        Ok(EventSubscription::new(rx, Some(poller)))
    }
}

impl Snapshots for JsonRpcChain {
    async fn snapshot(&self) -> Result<U256> {
        self.request("evm_snapshot", vec![]).await
    }

    async fn revert(&self, id: U256) -> Result<bool> {
        self.request("evm_revert", vec![json!(id)]).await
    }
}
