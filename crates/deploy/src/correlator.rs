//! Request/fulfillment correlation for oracle-backed contracts.
//!
//! A request moves through `Idle -> Submitted -> AwaitingFulfillment -> Fulfilled`, or ends in
//! `Failed` on a chain error, a listener rejection or the deadline. Fulfillment events are routed
//! through one dispatcher that resolves the matching entry of a pending table keyed by request
//! id. An entry resolves at most once.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy_core::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolEvent,
};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::{
    chain::{ChainClient, EventSubscription, Log, TransactionRequest},
    confirm::DEFAULT_POLL_INTERVAL,
    deployer::Signer,
    error::{DeployError, Result},
    oracle::{self, FulfillmentDriver, IApiConsumer},
};

/// An outstanding oracle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub request_id: B256,
    pub submitted_at: DateTime<Utc>,
    pub fulfilled: bool,
    pub value: Option<U256>,
}

/// The request transaction and the answer the driver should deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    /// Consumer contract that issues the request and emits the fulfillment event.
    pub consumer: Address,
    pub call: Bytes,
    /// Encoded answer handed to the fulfillment driver.
    pub answer: B256,
}

impl OracleRequest {
    /// `requestVolumeData()` on `consumer`, answered with `value`.
    pub fn volume(consumer: Address, value: u64) -> Self {
        Self {
            consumer,
            call: oracle::request_volume_call(),
            answer: oracle::num_to_bytes32(value),
        }
    }
}

struct PendingRequest {
    record: RequestRecord,
    resolve: Option<oneshot::Sender<()>>,
}

/// Correlates oracle requests with their fulfillment events.
pub struct Correlator<C> {
    chain: C,
    signer: Signer,
    timeout: Duration,
    poll_interval: Duration,
    pending: Mutex<HashMap<B256, PendingRequest>>,
}

impl<C: ChainClient> Correlator<C> {
    /// `timeout` bounds a whole [`Correlator::request_and_await`] call.
    pub fn new(chain: C, signer: Signer, timeout: Duration) -> Self {
        Self {
            chain,
            signer,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Number of requests still awaiting resolution.
    pub fn outstanding(&self) -> usize {
        self.lock().map(|pending| pending.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<B256, PendingRequest>>> {
        self.pending
            .lock()
            .map_err(|_| DeployError::Chain("pending request table poisoned".to_string()))
    }

    /// Route a fulfillment event to its pending request.
    ///
    /// Returns `true` if the event resolved a wait. Events for unknown or already resolved ids
    /// are ignored.
    pub fn dispatch(&self, log: &Log) -> bool {
        let Some(request_id) = log.topic(1) else {
            return false;
        };
        let Ok(mut pending) = self.lock() else {
            return false;
        };

        match pending.get_mut(&request_id) {
            Some(entry) if !entry.record.fulfilled => {
                entry.record.fulfilled = true;
                if let Some(resolve) = entry.resolve.take() {
                    let _ = resolve.send(());
                }
                tracing::debug!(%request_id, "Fulfillment matched");
                true
            }
            _ => {
                tracing::trace!(%request_id, "Ignoring fulfillment event");
                false
            }
        }
    }

    fn register(&self, request_id: B256) -> Result<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        self.lock()?.insert(
            request_id,
            PendingRequest {
                record: RequestRecord {
                    request_id,
                    submitted_at: Utc::now(),
                    fulfilled: false,
                    value: None,
                },
                resolve: Some(tx),
            },
        );
        Ok(rx)
    }

    fn forget(&self, request_id: B256) -> Option<RequestRecord> {
        self.lock()
            .ok()
            .and_then(|mut pending| pending.remove(&request_id))
            .map(|entry| entry.record)
    }

    /// Submit `request`, have `driver` fulfill it, and resolve once the matching fulfillment
    /// event is observed and `listener` accepts the resulting state.
    ///
    /// The fulfillment subscription is attached before the request is sent. The listener
    /// receives the request id and returns the decoded value; its error rejects this same wait
    /// as [`DeployError::CorrelationAssertion`]. The listener runs under the same deadline as
    /// the rest of the call.
    pub async fn request_and_await<D, L, Fut>(
        &self,
        request: OracleRequest,
        driver: &D,
        listener: L,
    ) -> Result<U256>
    where
        D: FulfillmentDriver,
        L: FnOnce(B256) -> Fut,
        Fut: Future<Output = anyhow::Result<U256>>,
    {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timed_out = |request_id| DeployError::CorrelationTimeout {
            request_id,
            timeout: self.timeout,
        };

        let mut events = self
            .chain
            .subscribe(request.consumer, IApiConsumer::ChainlinkFulfilled::SIGNATURE_HASH)
            .await?;

        let request_id = tokio::time::timeout_at(deadline, self.submit(&request))
            .await
            .map_err(|_| timed_out(None))??;
        let resolved = self.register(request_id)?;

        tracing::info!(%request_id, consumer = %request.consumer, "Awaiting fulfillment");

        let outcome = tokio::time::timeout_at(
            deadline,
            self.await_fulfillment(request_id, request.answer, driver, resolved, &mut events),
        )
        .await;

        let outcome = match outcome {
            Err(_) => Err(timed_out(Some(request_id))),
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => match tokio::time::timeout_at(deadline, listener(request_id)).await {
                Err(_) => Err(timed_out(Some(request_id))),
                Ok(value) => value.map_err(|e| DeployError::CorrelationAssertion {
                    request_id,
                    reason: format!("{e:#}"),
                }),
            },
        };

        if let Some(record) = self.forget(request_id) {
            let record = RequestRecord {
                value: outcome.as_ref().ok().copied(),
                ..record
            };
            let elapsed = Utc::now() - record.submitted_at;
            tracing::debug!(
                %request_id,
                fulfilled = record.fulfilled,
                value = ?record.value,
                elapsed_ms = elapsed.num_milliseconds(),
                "Request settled"
            );
        }

        match &outcome {
            Ok(value) => tracing::info!(%request_id, %value, "Request fulfilled"),
            Err(e) => tracing::warn!(%request_id, error = %e, "Request failed"),
        }
        outcome
    }

    /// Send the request and read its id from the first log of the mined receipt.
    async fn submit(&self, request: &OracleRequest) -> Result<B256> {
        let tx_hash = self
            .chain
            .send_transaction(TransactionRequest::call(
                self.signer.address,
                request.consumer,
                request.call.clone(),
            ))
            .await?;

        let receipt = loop {
            if let Some(receipt) = self.chain.transaction_receipt(tx_hash).await? {
                break receipt;
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        if !receipt.status {
            return Err(DeployError::Chain(format!(
                "request transaction {tx_hash} reverted"
            )));
        }

        receipt
            .logs
            .first()
            .and_then(|log| log.topic(1))
            .ok_or_else(|| {
                DeployError::Chain(format!("request transaction {tx_hash} emitted no request id"))
            })
    }

    async fn await_fulfillment<D: FulfillmentDriver>(
        &self,
        request_id: B256,
        answer: B256,
        driver: &D,
        mut resolved: oneshot::Receiver<()>,
        events: &mut EventSubscription,
    ) -> Result<()> {
        driver.fulfill(request_id, answer).await?;

        loop {
            tokio::select! {
                biased;
                res = &mut resolved => {
                    return res.map_err(|_| {
                        DeployError::Chain(format!("request {request_id} was dropped"))
                    });
                }
                log = events.next() => match log {
                    Some(log) => {
                        self.dispatch(&log);
                    }
                    None => {
                        return Err(DeployError::Chain(
                            "fulfillment subscription closed".to_string(),
                        ));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abi::{self, AbiValue},
        chain::{DevBehaviour, DevChain},
    };

    const ORACLE_CODE: &[u8] = &[0xfe, 0x01];
    const CONSUMER_CODE: &[u8] = &[0xfe, 0x02];

    struct Setup {
        chain: DevChain,
        signer: Signer,
        oracle: Address,
        consumer: Address,
    }

    async fn setup() -> Setup {
        let chain = DevChain::builder()
            .behaviour(ORACLE_CODE.to_vec(), DevBehaviour::MockOracle)
            .behaviour(CONSUMER_CODE.to_vec(), DevBehaviour::ApiConsumer)
            .build();
        let signer = Signer::new(Address::repeat_byte(1));

        let oracle = signer.address.create(0);
        chain
            .send_transaction(TransactionRequest::create(signer.address, ORACLE_CODE.into()))
            .await
            .unwrap();

        let mut consumer_code = CONSUMER_CODE.to_vec();
        consumer_code.extend(abi::encode_args(&[AbiValue::Address(oracle)]));
        let consumer = signer.address.create(1);
        chain
            .send_transaction(TransactionRequest::create(signer.address, consumer_code.into()))
            .await
            .unwrap();

        Setup {
            chain,
            signer,
            oracle,
            consumer,
        }
    }

    fn correlator(setup: &Setup, timeout: Duration) -> Correlator<DevChain> {
        Correlator::new(setup.chain.clone(), setup.signer, timeout)
            .with_poll_interval(Duration::from_millis(5))
    }

    fn fulfilled_log(request_id: B256) -> Log {
        Log {
            address: Address::ZERO,
            topics: vec![IApiConsumer::ChainlinkFulfilled::SIGNATURE_HASH, request_id],
            data: Bytes::new(),
            block_number: None,
            transaction_hash: None,
        }
    }

    #[tokio::test]
    async fn test_round_trip_resolves_with_fulfilled_value() {
        let setup = setup().await;
        let correlator = correlator(&setup, Duration::from_secs(5));
        let driver = crate::oracle::OracleSimulator::new(setup.chain.clone(), setup.oracle, setup.signer);

        let chain = setup.chain.clone();
        let consumer = setup.consumer;
        let value = correlator
            .request_and_await(OracleRequest::volume(consumer, 777), &driver, |_| async move {
                Ok::<_, anyhow::Error>(oracle::read_volume(&chain, consumer).await?)
            })
            .await
            .unwrap();

        assert_eq!(value, U256::from(777));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_listener_error_rejects_the_wait() {
        let setup = setup().await;
        let correlator = correlator(&setup, Duration::from_secs(5));
        let driver = crate::oracle::OracleSimulator::new(setup.chain.clone(), setup.oracle, setup.signer);

        let err = correlator
            .request_and_await(OracleRequest::volume(setup.consumer, 1), &driver, |_| async {
                Err::<U256, _>(anyhow::anyhow!("volume mismatch"))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeployError::CorrelationAssertion { ref reason, .. } if reason.contains("volume mismatch")
        ));
        assert_eq!(correlator.outstanding(), 0);
    }

    /// Never answers.
    struct SilentOracle;

    impl FulfillmentDriver for SilentOracle {
        async fn fulfill(&self, _request_id: B256, _value: B256) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_fulfillment_times_out() {
        let setup = setup().await;
        let correlator = correlator(&setup, Duration::from_millis(100));

        let err = correlator
            .request_and_await(OracleRequest::volume(setup.consumer, 1), &SilentOracle, |_| async {
                Ok::<_, anyhow::Error>(U256::ZERO)
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(
            err,
            DeployError::CorrelationTimeout { request_id: Some(_), .. }
        ));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_stalled_listener_times_out() {
        let setup = setup().await;
        let correlator = correlator(&setup, Duration::from_millis(100));
        let driver = crate::oracle::OracleSimulator::new(setup.chain.clone(), setup.oracle, setup.signer);

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            correlator.request_and_await(OracleRequest::volume(setup.consumer, 1), &driver, |_| {
                std::future::pending::<anyhow::Result<U256>>()
            }),
        )
        .await
        .expect("the correlator deadline should cover the listener")
        .unwrap_err();

        assert!(matches!(
            err,
            DeployError::CorrelationTimeout { request_id: Some(_), .. }
        ));
        assert_eq!(correlator.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_events_resolve_once() {
        let setup = setup().await;
        let correlator = correlator(&setup, Duration::from_secs(1));
        let request_id = B256::repeat_byte(0xaa);

        let resolved = correlator.register(request_id).unwrap();
        assert!(correlator.dispatch(&fulfilled_log(request_id)));
        assert!(!correlator.dispatch(&fulfilled_log(request_id)));
        assert!(resolved.await.is_ok());

        correlator.forget(request_id);
        assert!(!correlator.dispatch(&fulfilled_log(request_id)));
        assert!(!correlator.dispatch(&fulfilled_log(B256::repeat_byte(0xbb))));
    }
}
