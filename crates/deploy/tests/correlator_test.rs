//! Oracle request/fulfillment round trips on a fixture-deployed consumer.
//!
//! Run with: cargo test --test correlator_test

use std::time::Duration;

use alloy_core::primitives::{Address, U256};
use digipass_deploy::{
    Artifact, ArtifactStore, Correlator, DeploymentSpec, DevBehaviour, DevChain, Fixture,
    LOCAL_CHAIN_ID, NetworkConfig, NoVerification, OracleRequest, OrchestratorBuilder, Signer,
    oracle::{self, OracleSimulator},
};

const MOCK_ORACLE: &str = "MockOracle";
const API_CONSUMER: &str = "APIConsumer";
const MOCK_ORACLE_CODE: &[u8] = &[0x60, 0xa0, 0x01];
const API_CONSUMER_CODE: &[u8] = &[0x60, 0xa0, 0x02];

/// Initialize tracing for tests (idempotent).
fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

struct TestContext {
    chain: DevChain,
    signer: Signer,
    fixture: Fixture<DevChain, NoVerification>,
}

impl TestContext {
    fn new() -> Self {
        let chain = DevChain::builder()
            .behaviour(MOCK_ORACLE_CODE.to_vec(), DevBehaviour::MockOracle)
            .behaviour(API_CONSUMER_CODE.to_vec(), DevBehaviour::ApiConsumer)
            .build();
        let signer = Signer::dev_account().unwrap();
        let profile = NetworkConfig::builtin().unwrap().resolve(LOCAL_CHAIN_ID).unwrap();

        let builder = OrchestratorBuilder::new(profile, chain.clone(), signer)
            .artifacts(ArtifactStore::from_artifacts([
                Artifact::new(MOCK_ORACLE, MOCK_ORACLE_CODE.to_vec()),
                Artifact::new(API_CONSUMER, API_CONSUMER_CODE.to_vec()),
            ]))
            .poll_interval(Duration::from_millis(5));
        let plan = vec![
            DeploymentSpec::new(MOCK_ORACLE),
            DeploymentSpec::new(API_CONSUMER).depends_on(MOCK_ORACLE),
        ];

        Self {
            chain,
            signer,
            fixture: Fixture::new(builder, plan),
        }
    }

    /// Deploy (or restore) the oracle and consumer.
    async fn setup(&self) -> (Address, Address) {
        let report = self.fixture.setup_once().await.unwrap();
        (
            report.address(MOCK_ORACLE).unwrap(),
            report.address(API_CONSUMER).unwrap(),
        )
    }

    fn correlator(&self) -> Correlator<DevChain> {
        Correlator::new(self.chain.clone(), self.signer, Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(5))
    }
}

#[tokio::test]
async fn test_request_resolves_with_simulated_answer() {
    init_test_tracing();
    let ctx = TestContext::new();
    let (oracle_address, consumer) = ctx.setup().await;
    let driver = OracleSimulator::new(ctx.chain.clone(), oracle_address, ctx.signer);

    let chain = ctx.chain.clone();
    let value = ctx
        .correlator()
        .request_and_await(OracleRequest::volume(consumer, 777), &driver, |request_id| async move {
            let volume = oracle::read_volume(&chain, consumer).await?;
            anyhow::ensure!(volume == U256::from(777), "request {request_id}: volume is {volume}");
            Ok::<_, anyhow::Error>(volume)
        })
        .await
        .unwrap();

    assert_eq!(value, U256::from(777));
}

#[tokio::test]
async fn test_each_context_starts_from_fresh_state() {
    init_test_tracing();
    let ctx = TestContext::new();

    let (oracle_address, consumer) = ctx.setup().await;
    let driver = OracleSimulator::new(ctx.chain.clone(), oracle_address, ctx.signer);
    let chain = ctx.chain.clone();
    ctx.correlator()
        .request_and_await(OracleRequest::volume(consumer, 42), &driver, |_| async move {
            Ok::<_, anyhow::Error>(oracle::read_volume(&chain, consumer).await?)
        })
        .await
        .unwrap();
    assert_eq!(
        oracle::read_volume(&ctx.chain, consumer).await.unwrap(),
        U256::from(42)
    );

    // Same addresses, but the fulfilled volume is gone.
    let (restored_oracle, restored_consumer) = ctx.setup().await;
    assert_eq!((restored_oracle, restored_consumer), (oracle_address, consumer));
    assert_eq!(
        oracle::read_volume(&ctx.chain, consumer).await.unwrap(),
        U256::ZERO
    );
}

#[tokio::test]
async fn test_failed_assertion_rejects_the_request() {
    init_test_tracing();
    let ctx = TestContext::new();
    let (oracle_address, consumer) = ctx.setup().await;
    let driver = OracleSimulator::new(ctx.chain.clone(), oracle_address, ctx.signer);
    let correlator = ctx.correlator();

    let chain = ctx.chain.clone();
    let err = correlator
        .request_and_await(OracleRequest::volume(consumer, 5), &driver, |_| async move {
            let volume = oracle::read_volume(&chain, consumer).await?;
            anyhow::ensure!(volume == U256::from(6), "expected 6, got {volume}");
            Ok::<_, anyhow::Error>(volume)
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("expected 6, got 5"));
    assert_eq!(correlator.outstanding(), 0);
}
