//! In-process development chain.
//!
//! Every transaction is mined into its own block immediately, the way a local hardhat or anvil
//! node behaves in automine mode. Contracts are opaque unless their creation code was
//! registered with a [`DevBehaviour`], in which case calls to them are simulated.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_core::{
    primitives::{Address, B256, Bytes, TxHash, U256, keccak256},
    sol_types::{SolCall, SolEvent, SolInterface, SolValue},
};
use tokio::sync::mpsc;

use super::{ChainClient, EventSubscription, Log, Snapshots, TransactionReceipt, TransactionRequest};
use crate::{
    error::{DeployError, Result},
    oracle::{
        IApiConsumer::{self, IApiConsumerCalls},
        IMockOracle,
    },
};

/// Simulated contract logic attached to a creation bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevBehaviour {
    /// Chainlink-style API consumer. Constructor: `(address oracle)`.
    ApiConsumer,
    /// Oracle mock that forwards `fulfillOracleRequest` to the requesting consumer.
    MockOracle,
}

#[derive(Debug, Clone)]
enum DevContract {
    Opaque,
    ApiConsumer {
        oracle: Address,
        volume: U256,
        request_count: u64,
    },
    MockOracle {
        /// Outstanding request id -> consumer that issued it.
        requests: HashMap<B256, Address>,
    },
}

/// Chain state captured by snapshots.
#[derive(Debug, Clone, Default)]
struct DevState {
    block_number: u64,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, DevContract>,
    receipts: HashMap<TxHash, TransactionReceipt>,
}

struct Subscriber {
    address: Address,
    topic0: B256,
    tx: mpsc::UnboundedSender<Log>,
}

#[derive(Default)]
struct DevInner {
    state: DevState,
    snapshots: Vec<(U256, DevState)>,
    next_snapshot: u64,
    subscribers: Vec<Subscriber>,
    behaviours: Vec<(Bytes, DevBehaviour)>,
    reject_next: Option<String>,
    drop_next: bool,
}

/// Outcome of executing a call against a simulated contract.
enum Execution {
    Success { logs: Vec<Log>, output: Bytes },
    Revert(String),
}

/// Builder for [`DevChain`].
#[derive(Debug, Clone, Default)]
pub struct DevChainBuilder {
    mine_on_poll: bool,
    behaviours: Vec<(Bytes, DevBehaviour)>,
}

impl DevChainBuilder {
    /// Mine an empty block every time the head block is queried, so confirmation counts grow
    /// while a waiter polls.
    pub fn mine_on_poll(mut self, mine_on_poll: bool) -> Self {
        self.mine_on_poll = mine_on_poll;
        self
    }

    /// Simulate contracts created from `creation_code` with `behaviour`.
    pub fn behaviour(mut self, creation_code: impl Into<Bytes>, behaviour: DevBehaviour) -> Self {
        self.behaviours.push((creation_code.into(), behaviour));
        self
    }

    pub fn build(self) -> DevChain {
        DevChain {
            inner: Arc::new(Mutex::new(DevInner {
                behaviours: self.behaviours,
                ..Default::default()
            })),
            mine_on_poll: self.mine_on_poll,
        }
    }
}

/// Development chain with instant mining, held entirely in memory.
#[derive(Clone)]
pub struct DevChain {
    inner: Arc<Mutex<DevInner>>,
    mine_on_poll: bool,
}

impl Default for DevChain {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DevChain {
    pub fn builder() -> DevChainBuilder {
        DevChainBuilder::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, DevInner>> {
        self.inner
            .lock()
            .map_err(|_| DeployError::Chain("dev chain state poisoned".to_string()))
    }

    /// Reject the next submitted transaction with `reason`.
    pub fn reject_next_transaction(&self, reason: impl Into<String>) -> Result<()> {
        self.lock()?.reject_next = Some(reason.into());
        Ok(())
    }

    /// Accept the next transaction but never mine it.
    pub fn drop_next_transaction(&self) -> Result<()> {
        self.lock()?.drop_next = true;
        Ok(())
    }

    /// Mine `count` empty blocks.
    pub fn mine_blocks(&self, count: u64) -> Result<()> {
        self.lock()?.state.block_number += count;
        Ok(())
    }

    /// Whether code exists at `address`.
    pub fn has_code(&self, address: Address) -> Result<bool> {
        Ok(self.lock()?.state.contracts.contains_key(&address))
    }

    fn behaviour_for(inner: &DevInner, init_code: &[u8]) -> Option<(DevBehaviour, usize)> {
        inner
            .behaviours
            .iter()
            .find(|(code, _)| init_code.starts_with(code))
            .map(|(code, behaviour)| (*behaviour, code.len()))
    }

    fn create_contract(inner: &DevInner, init_code: &[u8]) -> std::result::Result<DevContract, String> {
        match Self::behaviour_for(inner, init_code) {
            None => Ok(DevContract::Opaque),
            Some((DevBehaviour::MockOracle, _)) => Ok(DevContract::MockOracle {
                requests: HashMap::new(),
            }),
            Some((DevBehaviour::ApiConsumer, code_len)) => {
                let oracle = <Address as SolValue>::abi_decode(&init_code[code_len..])
                    .map_err(|e| format!("missing oracle constructor argument: {e}"))?;
                Ok(DevContract::ApiConsumer {
                    oracle,
                    volume: U256::ZERO,
                    request_count: 0,
                })
            }
        }
    }

    /// Execute a call to `to`, mutating `state` only on success.
    fn execute(state: &mut DevState, from: Address, to: Address, input: &[u8]) -> Execution {
        let Some(contract) = state.contracts.get(&to).cloned() else {
            // Plain value transfer to an account.
            return Execution::Success {
                logs: vec![],
                output: Bytes::new(),
            };
        };

        match contract {
            DevContract::Opaque => Execution::Success {
                logs: vec![],
                output: Bytes::new(),
            },
            DevContract::ApiConsumer {
                oracle,
                volume,
                request_count,
            } => match IApiConsumerCalls::abi_decode(input) {
                Ok(IApiConsumerCalls::requestVolumeData(_)) => {
                    let mut preimage = to.to_vec();
                    preimage.extend(request_count.to_be_bytes());
                    let request_id = keccak256(preimage);

                    let Some(DevContract::MockOracle { requests }) = state.contracts.get_mut(&oracle)
                    else {
                        return Execution::Revert("oracle is not a mock oracle".to_string());
                    };
                    requests.insert(request_id, to);
                    state.contracts.insert(
                        to,
                        DevContract::ApiConsumer {
                            oracle,
                            volume,
                            request_count: request_count + 1,
                        },
                    );

                    Execution::Success {
                        logs: vec![Log {
                            address: to,
                            topics: vec![IApiConsumer::ChainlinkRequested::SIGNATURE_HASH, request_id],
                            data: Bytes::new(),
                            block_number: None,
                            transaction_hash: None,
                        }],
                        output: request_id.abi_encode().into(),
                    }
                }
                Ok(IApiConsumerCalls::fulfill(IApiConsumer::fulfillCall {
                    requestId: request_id,
                    volume: new_volume,
                })) => {
                    if from != oracle {
                        return Execution::Revert("Source must be the oracle of the request".to_string());
                    }
                    state.contracts.insert(
                        to,
                        DevContract::ApiConsumer {
                            oracle,
                            volume: new_volume,
                            request_count,
                        },
                    );

                    Execution::Success {
                        logs: vec![
                            Log {
                                address: to,
                                topics: vec![IApiConsumer::ChainlinkFulfilled::SIGNATURE_HASH, request_id],
                                data: Bytes::new(),
                                block_number: None,
                                transaction_hash: None,
                            },
                            Log {
                                address: to,
                                topics: vec![IApiConsumer::DataFullfilled::SIGNATURE_HASH],
                                data: new_volume.abi_encode().into(),
                                block_number: None,
                                transaction_hash: None,
                            },
                        ],
                        output: Bytes::new(),
                    }
                }
                Ok(IApiConsumerCalls::volume(_)) => Execution::Success {
                    logs: vec![],
                    output: volume.abi_encode().into(),
                },
                Err(e) => Execution::Revert(format!("unknown call: {e}")),
            },
            DevContract::MockOracle { mut requests } => {
                let call = match <IMockOracle::fulfillOracleRequestCall as SolCall>::abi_decode(input) {
                    Ok(call) => call,
                    Err(e) => return Execution::Revert(format!("unknown call: {e}")),
                };
                let Some(consumer) = requests.remove(&call.requestId) else {
                    return Execution::Revert("Must have a valid requestId".to_string());
                };
                state
                    .contracts
                    .insert(to, DevContract::MockOracle { requests });

                let callback = IApiConsumer::fulfillCall {
                    requestId: call.requestId,
                    volume: U256::from_be_bytes(call.data.0),
                }
                .abi_encode();
                Self::execute(state, to, consumer, &callback)
            }
        }
    }

    fn mine(&self, tx: TransactionRequest) -> Result<TxHash> {
        let mut inner = self.lock()?;

        if let Some(reason) = inner.reject_next.take() {
            return Err(DeployError::Chain(reason));
        }

        let nonce = inner.state.nonces.get(&tx.from).copied().unwrap_or_default();
        let mut preimage = tx.from.to_vec();
        preimage.extend(nonce.to_be_bytes());
        preimage.extend_from_slice(&tx.input);
        let tx_hash = keccak256(preimage);

        inner.state.nonces.insert(tx.from, nonce + 1);

        if std::mem::take(&mut inner.drop_next) {
            tracing::debug!(%tx_hash, "Dropping transaction");
            return Ok(tx_hash);
        }

        let block_number = inner.state.block_number + 1;
        let mut scratch = inner.state.clone();
        scratch.block_number = block_number;

        let (status, contract_address, logs) = match tx.to {
            None => {
                let address = tx.from.create(nonce);
                match Self::create_contract(&inner, &tx.input) {
                    Ok(contract) => {
                        scratch.contracts.insert(address, contract);
                        (true, Some(address), vec![])
                    }
                    Err(reason) => {
                        tracing::debug!(%tx_hash, reason, "Creation reverted");
                        (false, None, vec![])
                    }
                }
            }
            Some(to) => match Self::execute(&mut scratch, tx.from, to, &tx.input) {
                Execution::Success { logs, .. } => (true, None, logs),
                Execution::Revert(reason) => {
                    tracing::debug!(%tx_hash, reason, "Call reverted");
                    (false, None, vec![])
                }
            },
        };

        let logs: Vec<Log> = logs
            .into_iter()
            .map(|log| Log {
                block_number: Some(block_number),
                transaction_hash: Some(tx_hash),
                ..log
            })
            .collect();

        // A reverted transaction still consumes a block and a nonce, but no state changes.
        if status {
            inner.state = scratch;
        }
        inner.state.block_number = block_number;
        inner.state.receipts.insert(
            tx_hash,
            TransactionReceipt {
                transaction_hash: tx_hash,
                block_number,
                contract_address,
                status,
                logs: logs.clone(),
            },
        );

        inner.subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in &inner.subscribers {
            for log in logs
                .iter()
                .filter(|log| log.address == sub.address && log.topic(0) == Some(sub.topic0))
            {
                let _ = sub.tx.send(log.clone());
            }
        }

        Ok(tx_hash)
    }
}

impl ChainClient for DevChain {
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        self.mine(tx)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>> {
        Ok(self.lock()?.state.receipts.get(&hash).cloned())
    }

    async fn block_number(&self) -> Result<u64> {
        let mut inner = self.lock()?;
        if self.mine_on_poll {
            inner.state.block_number += 1;
        }
        Ok(inner.state.block_number)
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes> {
        let mut scratch = self.lock()?.state.clone();
        match Self::execute(&mut scratch, Address::ZERO, to, &input) {
            Execution::Success { output, .. } => Ok(output),
            Execution::Revert(reason) => Err(DeployError::Chain(format!("call reverted: {reason}"))),
        }
    }

    async fn subscribe(&self, address: Address, topic0: B256) -> Result<EventSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock()?.subscribers.push(Subscriber {
            address,
            topic0,
            tx,
        });
        Ok(EventSubscription::new(rx, None))
    }
}

impl Snapshots for DevChain {
    async fn snapshot(&self) -> Result<U256> {
        let mut inner = self.lock()?;
        inner.next_snapshot += 1;
        let id = U256::from(inner.next_snapshot);
        let state = inner.state.clone();
        inner.snapshots.push((id, state));
        Ok(id)
    }

    async fn revert(&self, id: U256) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(position) = inner.snapshots.iter().position(|(sid, _)| *sid == id) else {
            return Ok(false);
        };
        // Later snapshots are invalidated along with the one being restored.
        let mut discarded = inner.snapshots.split_off(position);
        let (_, state) = discarded.remove(0);
        inner.state = state;
        Ok(true)
    }
}
