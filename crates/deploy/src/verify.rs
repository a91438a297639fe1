//! Best-effort source verification on block explorers.

use std::{
    collections::HashMap,
    future::Future,
    path::Path,
    time::Duration,
};

use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{
    abi,
    deployment::VerificationRequest,
    error::{DeployError, Result},
    network::ChainProfile,
};

/// Environment variable holding the explorer API key.
pub const API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

/// What happened to a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Development chain or no credential: nothing was sent.
    Skipped,
    Accepted,
    AlreadyVerified,
    /// The service failed. Deployment success is unaffected.
    Failed(String),
}

/// External verification service.
pub trait VerificationService: Send + Sync {
    fn submit(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome>> + Send;
}

/// Gate in front of a [`VerificationService`].
///
/// The service is called only on non-development chains and only when a credential is
/// configured. Service errors are logged and reported as [`VerificationOutcome::Failed`].
#[derive(Debug, Clone)]
pub struct Verifier<S> {
    service: S,
    credential_present: bool,
}

impl<S: VerificationService> Verifier<S> {
    pub fn new(service: S, credential_present: bool) -> Self {
        Self {
            service,
            credential_present,
        }
    }

    pub fn should_verify(&self, profile: &ChainProfile) -> bool {
        !profile.is_development && self.credential_present
    }

    pub async fn verify(
        &self,
        profile: &ChainProfile,
        request: &VerificationRequest,
    ) -> VerificationOutcome {
        if !self.should_verify(profile) {
            tracing::debug!(
                contract = %request.contract_name,
                address = %request.address,
                development = profile.is_development,
                "Skipping verification"
            );
            return VerificationOutcome::Skipped;
        }

        match self.service.submit(request).await {
            Ok(outcome) => {
                tracing::info!(
                    contract = %request.contract_name,
                    address = %request.address,
                    network = %profile.name,
                    ?outcome,
                    "Contract verified"
                );
                outcome
            }
            Err(e) => {
                let failure = DeployError::VerificationFailure {
                    address: request.address,
                    reason: e.to_string(),
                };
                tracing::warn!(error = %failure, contract = %request.contract_name, "Verification failed");
                VerificationOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Service used when verification is disabled; never called through [`Verifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerification;

impl VerificationService for NoVerification {
    async fn submit(&self, _request: &VerificationRequest) -> Result<VerificationOutcome> {
        Ok(VerificationOutcome::Skipped)
    }
}

/// Compiler input needed to reproduce a contract's bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBundle {
    /// `path:Name` of the contract.
    pub qualified_name: String,
    /// Long solc version, e.g. `v0.8.19+commit.7dd6d404`.
    pub compiler_version: String,
    /// Solidity standard JSON input.
    pub standard_json_input: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildInfo {
    solc_long_version: String,
    input: Value,
    output: BuildOutput,
}

#[derive(Debug, Deserialize)]
struct BuildOutput {
    #[serde(default)]
    contracts: HashMap<String, HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

enum StatusCheck {
    Pending,
    Failed(String),
}

/// Etherscan-compatible verification client.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    client: reqwest::Client,
    api_url: Option<Url>,
    api_key: String,
    sources: HashMap<String, SourceBundle>,
    poll_interval: Duration,
    max_polls: usize,
}

impl EtherscanVerifier {
    pub fn new(client: reqwest::Client, api_url: Option<Url>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_url,
            api_key: api_key.into(),
            sources: HashMap::new(),
            poll_interval: Duration::from_secs(5),
            max_polls: 12,
        }
    }

    /// Build the gated verifier for `profile`, reading the key from [`API_KEY_ENV`] and the
    /// compiler inputs from an optional `build-info` directory.
    pub fn verifier_for(profile: &ChainProfile, build_info: Option<&Path>) -> Result<Verifier<Self>> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty());
        let credential_present = api_key.is_some();
        let mut service = Self::new(
            crate::chain::create_client()?,
            profile.explorer.as_ref().map(|e| e.api_url.clone()),
            api_key.unwrap_or_default(),
        );
        if let Some(dir) = build_info {
            service = service.with_build_info(dir)?;
        }
        Ok(Verifier::new(service, credential_present))
    }

    pub fn with_status_polling(mut self, poll_interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = poll_interval;
        self.max_polls = max_polls;
        self
    }

    pub fn with_source(mut self, contract_name: impl Into<String>, bundle: SourceBundle) -> Self {
        self.sources.insert(contract_name.into(), bundle);
        self
    }

    /// Register every contract found in a Hardhat `build-info` directory.
    pub fn with_build_info(mut self, dir: &Path) -> Result<Self> {
        let read_err = |reason: String| DeployError::Artifact {
            contract: "build-info".to_string(),
            reason,
        };

        let entries = std::fs::read_dir(dir)
            .map_err(|e| read_err(format!("failed to read {}: {e}", dir.display())))?;

        for path in entries.flatten().map(|e| e.path()) {
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| read_err(format!("failed to read {}: {e}", path.display())))?;
            let info: BuildInfo = serde_json::from_str(&content)
                .map_err(|e| read_err(format!("failed to parse {}: {e}", path.display())))?;
            let input = info.input.to_string();

            for (source, contracts) in info.output.contracts {
                for name in contracts.into_keys() {
                    self.sources.insert(
                        name.clone(),
                        SourceBundle {
                            qualified_name: format!("{source}:{name}"),
                            compiler_version: format!("v{}", info.solc_long_version),
                            standard_json_input: input.clone(),
                        },
                    );
                }
            }
        }

        Ok(self)
    }

    async fn post(&self, api_url: &Url, params: &[(&str, String)]) -> Result<EtherscanResponse> {
        self.client
            .post(api_url.clone())
            .form(params)
            .send()
            .await
            .map_err(DeployError::chain)?
            .json()
            .await
            .map_err(DeployError::chain)
    }

    async fn check_status(
        &self,
        api_url: &Url,
        guid: &str,
    ) -> std::result::Result<VerificationOutcome, StatusCheck> {
        let response = self
            .post(
                api_url,
                &[
                    ("apikey", self.api_key.clone()),
                    ("module", "contract".to_string()),
                    ("action", "checkverifystatus".to_string()),
                    ("guid", guid.to_string()),
                ],
            )
            .await
            .map_err(|e| StatusCheck::Failed(e.to_string()))?;

        let result = response.result.as_str().unwrap_or_default().to_lowercase();
        if result.contains("pending") {
            Err(StatusCheck::Pending)
        } else if result.contains("already verified") {
            Ok(VerificationOutcome::AlreadyVerified)
        } else if response.status == "1" {
            Ok(VerificationOutcome::Accepted)
        } else {
            Err(StatusCheck::Failed(result))
        }
    }
}

impl VerificationService for EtherscanVerifier {
    async fn submit(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let failure = |reason: String| DeployError::VerificationFailure {
            address: request.address,
            reason,
        };

        let api_url = self
            .api_url
            .as_ref()
            .ok_or_else(|| failure("no explorer API configured for this network".to_string()))?;
        let source = self.sources.get(&request.contract_name).ok_or_else(|| {
            failure(format!("no compiler input for {}", request.contract_name))
        })?;

        let response = self
            .post(
                api_url,
                &[
                    ("apikey", self.api_key.clone()),
                    ("module", "contract".to_string()),
                    ("action", "verifysourcecode".to_string()),
                    ("contractaddress", request.address.to_string()),
                    ("sourceCode", source.standard_json_input.clone()),
                    ("codeformat", "solidity-standard-json-input".to_string()),
                    ("contractname", source.qualified_name.clone()),
                    ("compilerversion", source.compiler_version.clone()),
                    (
                        "constructorArguements",
                        abi::encode_args_hex(&request.constructor_args),
                    ),
                ],
            )
            .await?;

        let result = response.result.as_str().unwrap_or_default().to_string();
        if response.status != "1" {
            if result.to_lowercase().contains("already verified") {
                return Ok(VerificationOutcome::AlreadyVerified);
            }
            return Err(failure(format!("{}: {}", response.message, result)));
        }

        tracing::debug!(guid = %result, address = %request.address, "Verification submitted");

        (|| self.check_status(api_url, &result))
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.poll_interval)
                    .with_max_times(self.max_polls),
            )
            .when(|e| matches!(e, StatusCheck::Pending))
            .await
            .map_err(|e| match e {
                StatusCheck::Pending => failure("verification still pending".to_string()),
                StatusCheck::Failed(reason) => failure(reason),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use alloy_core::primitives::Address;

    use super::*;
    use crate::network::NetworkConfig;

    /// Records submissions and answers with a fixed result.
    struct RecordingService {
        calls: AtomicUsize,
        requests: Mutex<Vec<VerificationRequest>>,
        fail: bool,
    }

    impl RecordingService {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(vec![]),
                fail,
            }
        }
    }

    impl VerificationService for RecordingService {
        async fn submit(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                Err(DeployError::Chain("explorer unavailable".to_string()))
            } else {
                Ok(VerificationOutcome::Accepted)
            }
        }
    }

    fn request() -> VerificationRequest {
        VerificationRequest {
            contract_name: "DigiPass".to_string(),
            address: Address::repeat_byte(3),
            constructor_args: vec![],
        }
    }

    #[tokio::test]
    async fn test_verification_gate_all_combinations() {
        let config = NetworkConfig::builtin().unwrap();
        let dev = config.resolve(crate::network::LOCAL_CHAIN_ID).unwrap();
        let public = config.resolve(11155111).unwrap();

        for (profile, credential, expect_call) in [
            (&dev, false, false),
            (&dev, true, false),
            (&public, false, false),
            (&public, true, true),
        ] {
            let verifier = Verifier::new(RecordingService::new(false), credential);
            let outcome = verifier.verify(profile, &request()).await;

            let calls = verifier.service.calls.load(Ordering::SeqCst);
            assert_eq!(calls, usize::from(expect_call), "profile {}", profile.name);
            if expect_call {
                assert_eq!(outcome, VerificationOutcome::Accepted);
            } else {
                assert_eq!(outcome, VerificationOutcome::Skipped);
            }
        }
    }

    #[tokio::test]
    async fn test_service_failure_is_not_an_error() {
        let public = NetworkConfig::builtin().unwrap().resolve(11155111).unwrap();
        let verifier = Verifier::new(RecordingService::new(true), true);

        let outcome = verifier.verify(&public, &request()).await;
        assert!(matches!(outcome, VerificationOutcome::Failed(ref r) if r.contains("unavailable")));
        assert_eq!(verifier.service.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_etherscan_without_explorer_fails_softly() {
        let mut public = NetworkConfig::builtin().unwrap().resolve(11155111).unwrap();
        public.explorer = None;
        let service = EtherscanVerifier::new(reqwest::Client::new(), None, "key");
        let verifier = Verifier::new(service, true);

        let outcome = verifier.verify(&public, &request()).await;
        assert!(matches!(outcome, VerificationOutcome::Failed(ref r) if r.contains("no explorer")));
    }

    #[test]
    fn test_build_info_registers_contracts() {
        let dir = tempdir::TempDir::new("digipass-build-info").unwrap();
        std::fs::write(
            dir.path().join("abc.json"),
            r#"{
                "solcLongVersion": "0.8.19+commit.7dd6d404",
                "input": {"language": "Solidity", "sources": {}},
                "output": {"contracts": {"contracts/DigiPass.sol": {"DigiPass": {}}}}
            }"#,
        )
        .unwrap();

        let verifier = EtherscanVerifier::new(reqwest::Client::new(), None, "key")
            .with_build_info(dir.path())
            .unwrap();
        let bundle = &verifier.sources["DigiPass"];
        assert_eq!(bundle.qualified_name, "contracts/DigiPass.sol:DigiPass");
        assert_eq!(bundle.compiler_version, "v0.8.19+commit.7dd6d404");
        assert!(bundle.standard_json_input.contains("Solidity"));
    }
}
