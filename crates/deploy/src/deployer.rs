//! Contract creation.

use std::str::FromStr;

use alloy_core::primitives::{Address, Bytes, TxHash};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};

use crate::{
    abi::{self, AbiValue},
    artifacts::ArtifactStore,
    chain::{ChainClient, TransactionRequest},
    error::{DeployError, Result},
};

/// Mnemonic used by local hardhat and anvil nodes for their funded dev accounts.
pub const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// The account deployments are sent from.
///
/// Only the address is needed here: signing and nonce management belong to the chain client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signer {
    pub address: Address,
}

impl Signer {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Derive the signer address from a hex private key.
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim_start_matches("0x"))
            .map_err(|e| DeployError::InvalidConfig(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer.address()))
    }

    /// Derive the address at `index` of a BIP-39 mnemonic (`m/44'/60'/0'/0/index`).
    pub fn from_mnemonic(phrase: &str, index: u32) -> Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(phrase)
            .index(index)
            .and_then(|builder| builder.build())
            .map_err(|e| DeployError::InvalidConfig(format!("invalid mnemonic: {e}")))?;
        Ok(Self::new(signer.address()))
    }

    /// First funded account of a local dev node.
    pub fn dev_account() -> Result<Self> {
        Self::from_mnemonic(DEV_MNEMONIC, 0)
    }
}

/// A submitted, not yet confirmed, contract creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDeployment {
    pub contract_name: String,
    pub tx_hash: TxHash,
    pub constructor_args: Vec<AbiValue>,
}

/// Submits contract creation transactions.
pub struct ContractDeployer<C> {
    chain: C,
    artifacts: ArtifactStore,
}

impl<C: ChainClient> ContractDeployer<C> {
    pub fn new(chain: C, artifacts: ArtifactStore) -> Self {
        Self { chain, artifacts }
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn artifacts_mut(&mut self) -> &mut ArtifactStore {
        &mut self.artifacts
    }

    /// Submit the creation of `contract_name` with `constructor_args`. Does not wait for mining.
    pub async fn deploy(
        &mut self,
        contract_name: &str,
        constructor_args: &[AbiValue],
        signer: &Signer,
    ) -> Result<PendingDeployment> {
        let artifact = self.artifacts.get(contract_name)?;

        let mut init_code = artifact.bytecode.to_vec();
        init_code.extend(abi::encode_args(constructor_args));

        let tx_hash = self
            .chain
            .send_transaction(TransactionRequest::create(
                signer.address,
                Bytes::from(init_code),
            ))
            .await
            .map_err(|e| DeployError::DeploymentSubmission {
                contract: contract_name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            contract = contract_name,
            %tx_hash,
            deployer = %signer.address,
            args = constructor_args.len(),
            "Deployment transaction submitted"
        );

        Ok(PendingDeployment {
            contract_name: contract_name.to_string(),
            tx_hash,
            constructor_args: constructor_args.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::address;

    use super::*;
    use crate::{artifacts::Artifact, chain::DevChain};

    #[test]
    fn test_dev_account_matches_known_address() {
        let signer = Signer::dev_account().unwrap();
        assert_eq!(
            signer.address,
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn test_private_key_signer() {
        let signer = Signer::from_private_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(
            signer.address,
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert!(Signer::from_private_key("not-a-key").is_err());
    }

    #[tokio::test]
    async fn test_deploy_appends_constructor_args() {
        let chain = DevChain::default();
        let mut deployer = ContractDeployer::new(
            chain.clone(),
            ArtifactStore::from_artifacts([Artifact::new("DigiPass", vec![0x60, 0x80])]),
        );
        let signer = Signer::new(Address::repeat_byte(9));
        let router = Address::repeat_byte(7);

        let pending = deployer
            .deploy("DigiPass", &[AbiValue::Address(router)], &signer)
            .await
            .unwrap();

        assert_eq!(pending.contract_name, "DigiPass");
        assert_eq!(pending.constructor_args, vec![AbiValue::Address(router)]);
        let receipt = chain.transaction_receipt(pending.tx_hash).await.unwrap().unwrap();
        assert_eq!(receipt.contract_address, Some(signer.address.create(0)));
    }

    #[tokio::test]
    async fn test_deploy_with_dynamic_constructor_args() {
        let chain = DevChain::default();
        let mut deployer = ContractDeployer::new(
            chain.clone(),
            ArtifactStore::from_artifacts([Artifact::new("DigiPass", vec![0x60, 0x80])]),
        );
        let signer = Signer::new(Address::repeat_byte(9));
        let args = [AbiValue::from("DigiPass"), AbiValue::from("DPASS")];

        let pending = deployer.deploy("DigiPass", &args, &signer).await.unwrap();

        assert_eq!(pending.constructor_args, args.to_vec());
        let receipt = chain.transaction_receipt(pending.tx_hash).await.unwrap().unwrap();
        assert!(receipt.status);
        assert_eq!(abi::encode_args_hex(&args).len(), 6 * 64);
    }

    #[tokio::test]
    async fn test_rejection_is_a_submission_error() {
        let chain = DevChain::default();
        let mut deployer = ContractDeployer::new(
            chain.clone(),
            ArtifactStore::from_artifacts([Artifact::new("DigiPass", vec![0x60])]),
        );
        chain.reject_next_transaction("nonce too low").unwrap();

        let err = deployer
            .deploy("DigiPass", &[], &Signer::new(Address::repeat_byte(1)))
            .await
            .unwrap_err();
        match err {
            DeployError::DeploymentSubmission { contract, reason } => {
                assert_eq!(contract, "DigiPass");
                assert!(reason.contains("nonce too low"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
