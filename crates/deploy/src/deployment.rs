//! Deployment plan nodes and their results.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::{
    abi::AbiValue,
    error::{DeployError, Result},
    verify::VerificationOutcome,
};

/// One constructor argument of a [`DeploymentSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructorArg {
    /// A literal value known before the run starts.
    Value(AbiValue),
    /// The address of an earlier node in the same plan, once it has confirmed.
    DependsOn(String),
}

impl From<AbiValue> for ConstructorArg {
    fn from(value: AbiValue) -> Self {
        Self::Value(value)
    }
}

impl From<Address> for ConstructorArg {
    fn from(address: Address) -> Self {
        Self::Value(address.into())
    }
}

impl From<U256> for ConstructorArg {
    fn from(value: U256) -> Self {
        Self::Value(value.into())
    }
}

/// A node of the deployment graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub contract_name: String,
    pub constructor_args: Vec<ConstructorArg>,
    /// Arguments submitted to the explorer instead of `constructor_args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_args: Option<Vec<ConstructorArg>>,
}

impl DeploymentSpec {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            constructor_args: Vec::new(),
            verify_args: None,
        }
    }

    /// Verify with `args` rather than the constructor arguments.
    pub fn verify_with<A: Into<ConstructorArg>>(mut self, args: impl IntoIterator<Item = A>) -> Self {
        self.verify_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn arg(mut self, arg: impl Into<ConstructorArg>) -> Self {
        self.constructor_args.push(arg.into());
        self
    }

    /// Use the confirmed address of `contract_name` as the next argument.
    pub fn depends_on(mut self, contract_name: impl Into<String>) -> Self {
        self.constructor_args
            .push(ConstructorArg::DependsOn(contract_name.into()));
        self
    }

    /// Names of the nodes this one depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.constructor_args
            .iter()
            .chain(self.verify_args.iter().flatten())
            .filter_map(|arg| match arg {
                ConstructorArg::DependsOn(name) => Some(name.as_str()),
                ConstructorArg::Value(_) => None,
            })
    }

    /// Resolve the arguments against `results`.
    ///
    /// Fails with [`DeployError::DependencyNotReady`] if a dependency is missing or has not
    /// confirmed; a placeholder address is never substituted.
    pub fn resolve_args(&self, results: &[DeploymentResult]) -> Result<Vec<AbiValue>> {
        self.resolve(&self.constructor_args, results)
    }

    /// Resolve the explorer arguments, if this node overrides them.
    pub fn resolve_verify_args(&self, results: &[DeploymentResult]) -> Result<Option<Vec<AbiValue>>> {
        self.verify_args
            .as_deref()
            .map(|args| self.resolve(args, results))
            .transpose()
    }

    fn resolve(&self, args: &[ConstructorArg], results: &[DeploymentResult]) -> Result<Vec<AbiValue>> {
        args.iter()
            .map(|arg| match arg {
                ConstructorArg::Value(value) => Ok(value.clone()),
                ConstructorArg::DependsOn(name) => results
                    .iter()
                    .find(|r| &r.contract_name == name && r.confirmed)
                    .filter(|r| !r.address.is_zero())
                    .map(|r| AbiValue::Address(r.address))
                    .ok_or_else(|| DeployError::DependencyNotReady {
                        contract: self.contract_name.clone(),
                        dependency: name.clone(),
                    }),
            })
            .collect()
    }
}

/// A deployed contract, owned by the orchestrator run that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub contract_name: String,
    pub address: Address,
    pub transaction_hash: TxHash,
    pub constructor_args: Vec<AbiValue>,
    /// Explorer arguments, when they differ from `constructor_args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_args: Option<Vec<AbiValue>>,
    pub confirmations: u64,
    pub confirmed: bool,
}

/// Explorer submission derived from a confirmed deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub contract_name: String,
    pub address: Address,
    pub constructor_args: Vec<AbiValue>,
}

impl From<&DeploymentResult> for VerificationRequest {
    fn from(result: &DeploymentResult) -> Self {
        Self {
            contract_name: result.contract_name.clone(),
            address: result.address,
            constructor_args: result
                .verify_args
                .clone()
                .unwrap_or_else(|| result.constructor_args.clone()),
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub chain_id: u64,
    pub network: String,
    pub deployments: Vec<DeploymentResult>,
    pub verifications: Vec<(Address, VerificationOutcome)>,
}

impl DeploymentReport {
    pub fn get(&self, contract_name: &str) -> Option<&DeploymentResult> {
        self.deployments
            .iter()
            .find(|d| d.contract_name == contract_name)
    }

    pub fn address(&self, contract_name: &str) -> Option<Address> {
        self.get(contract_name).map(|d| d.address)
    }

    pub fn verification(&self, address: Address) -> Option<&VerificationOutcome> {
        self.verifications
            .iter()
            .find(|(a, _)| *a == address)
            .map(|(_, outcome)| outcome)
    }

    /// Contract name to address, for manifests.
    pub fn addresses(&self) -> BTreeMap<String, Address> {
        self.deployments
            .iter()
            .map(|d| (d.contract_name.clone(), d.address))
            .collect()
    }

    /// Write the report as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DeployError::InvalidConfig(format!("failed to serialize report: {e}")))?;
        std::fs::write(path, json).map_err(|e| {
            DeployError::InvalidConfig(format!("failed to write {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| DeployError::InvalidConfig(format!("failed to parse report: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, address: Address, confirmed: bool) -> DeploymentResult {
        DeploymentResult {
            contract_name: name.to_string(),
            address,
            transaction_hash: TxHash::ZERO,
            constructor_args: vec![],
            verify_args: None,
            confirmations: u64::from(confirmed),
            confirmed,
        }
    }

    #[test]
    fn test_resolves_confirmed_dependency() {
        let router = Address::repeat_byte(1);
        let asset = Address::repeat_byte(2);
        let spec = DeploymentSpec::new("DestinationTicketPurchaser")
            .arg(router)
            .depends_on("DigiPass");

        let args = spec
            .resolve_args(&[result("DigiPass", asset, true)])
            .unwrap();
        assert_eq!(args, vec![AbiValue::Address(router), AbiValue::Address(asset)]);
        assert_eq!(spec.dependencies().collect::<Vec<_>>(), vec!["DigiPass"]);
    }

    #[test]
    fn test_unconfirmed_or_missing_dependency_fails_fast() {
        let spec = DeploymentSpec::new("DestinationTicketPurchaser").depends_on("DigiPass");

        for results in [
            vec![],
            vec![result("DigiPass", Address::repeat_byte(2), false)],
            vec![result("DigiPass", Address::ZERO, true)],
        ] {
            let err = spec.resolve_args(&results).unwrap_err();
            assert!(matches!(
                err,
                DeployError::DependencyNotReady { ref dependency, .. } if dependency == "DigiPass"
            ));
        }
    }

    #[test]
    fn test_verification_uses_override_arguments() {
        let router = Address::repeat_byte(1);
        let fee_token = Address::repeat_byte(3);
        let spec = DeploymentSpec::new("SourceTicketPurchase")
            .arg(router)
            .arg(fee_token)
            .arg(Address::repeat_byte(4))
            .verify_with([router, fee_token]);

        let verify_args = spec.resolve_verify_args(&[]).unwrap();
        let deployment = DeploymentResult {
            constructor_args: spec.resolve_args(&[]).unwrap(),
            verify_args,
            ..result("SourceTicketPurchase", Address::repeat_byte(9), true)
        };

        let request = VerificationRequest::from(&deployment);
        assert_eq!(
            request.constructor_args,
            vec![AbiValue::Address(router), AbiValue::Address(fee_token)]
        );
        assert_eq!(deployment.constructor_args.len(), 3);

        // Without an override the constructor arguments are replayed.
        let plain = result("DigiPass", Address::repeat_byte(2), true);
        assert_eq!(VerificationRequest::from(&plain).constructor_args, vec![]);
    }

    #[test]
    fn test_report_round_trips_through_file() {
        let dir = tempdir::TempDir::new("digipass-report").unwrap();
        let path = dir.path().join("deployments.json");
        let report = DeploymentReport {
            chain_id: 31337,
            network: "localhost".to_string(),
            deployments: vec![result("DigiPass", Address::repeat_byte(2), true)],
            verifications: vec![(Address::repeat_byte(2), VerificationOutcome::Skipped)],
        };

        report.save_to_file(&path).unwrap();
        let loaded = DeploymentReport::load_from_file(&path).unwrap();
        assert_eq!(loaded, report);
        assert_eq!(loaded.addresses()["DigiPass"], Address::repeat_byte(2));
    }
}
