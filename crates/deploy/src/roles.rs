//! Role-specific deployment plans.

use crate::{
    deployment::{ConstructorArg, DeploymentSpec},
    error::{DeployError, Result},
    network::ChainProfile,
};

/// Pass/asset contract deployed on the destination chain.
pub const DIGIPASS: &str = "DigiPass";
/// Receiver deployed on the destination chain.
pub const DESTINATION_TICKET_PURCHASER: &str = "DestinationTicketPurchaser";
/// Initiator deployed on the source chain.
pub const SOURCE_TICKET_PURCHASE: &str = "SourceTicketPurchase";

/// Which side of the cross-chain pair a network hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
    /// `DigiPass` followed by `DestinationTicketPurchaser(router, DigiPass)`.
    Destination,
    /// `SourceTicketPurchase(router, feeToken, bridgingToken)`, verified with
    /// `(router, feeToken)`.
    Source,
}

/// Constructor variant of the `DigiPass` asset contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum AssetConstructor {
    /// `constructor()`.
    #[default]
    Empty,
    /// `constructor(address router, address bridgingToken)`.
    RouterAndToken,
}

impl AssetConstructor {
    fn args(self, profile: &ChainProfile) -> Vec<ConstructorArg> {
        match self {
            Self::Empty => vec![],
            Self::RouterAndToken => vec![
                profile.router_address.into(),
                profile.bridging_token_address.into(),
            ],
        }
    }
}

impl Role {
    /// The ordered deployment plan for this role on `profile`.
    pub fn plan(self, profile: &ChainProfile, asset: AssetConstructor) -> Result<Vec<DeploymentSpec>> {
        match self {
            Self::Destination => {
                let digipass = asset
                    .args(profile)
                    .into_iter()
                    .fold(DeploymentSpec::new(DIGIPASS), DeploymentSpec::arg);
                let purchaser = DeploymentSpec::new(DESTINATION_TICKET_PURCHASER)
                    .arg(profile.router_address)
                    .depends_on(DIGIPASS);
                Ok(vec![digipass, purchaser])
            }
            Self::Source => {
                let fee_token = profile.fee_token_address.ok_or_else(|| {
                    DeployError::InvalidConfig(format!(
                        "network {} (chain id {}) has no fee token, required by the source role",
                        profile.name, profile.chain_id
                    ))
                })?;
                Ok(vec![
                    DeploymentSpec::new(SOURCE_TICKET_PURCHASE)
                        .arg(profile.router_address)
                        .arg(fee_token)
                        .arg(profile.bridging_token_address)
                        .verify_with([profile.router_address, fee_token]),
                ])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::network::{LOCAL_CHAIN_ID, NetworkConfig};

    #[test]
    fn test_destination_plan_references_confirmed_asset() {
        let profile = NetworkConfig::builtin().unwrap().resolve(LOCAL_CHAIN_ID).unwrap();
        let plan = Role::Destination
            .plan(&profile, AssetConstructor::Empty)
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].contract_name, DIGIPASS);
        assert!(plan[0].constructor_args.is_empty());
        assert!(plan.iter().all(|spec| spec.verify_args.is_none()));
        assert_eq!(
            plan[1].constructor_args,
            vec![
                ConstructorArg::from(profile.router_address),
                ConstructorArg::DependsOn(DIGIPASS.to_string()),
            ]
        );
    }

    #[test]
    fn test_asset_constructor_variant() {
        let profile = NetworkConfig::builtin().unwrap().resolve(LOCAL_CHAIN_ID).unwrap();
        let plan = Role::Destination
            .plan(&profile, AssetConstructor::RouterAndToken)
            .unwrap();
        assert_eq!(plan[0].constructor_args.len(), 2);
        assert_eq!(plan[0].dependencies().count(), 0);
    }

    #[test]
    fn test_source_plan_requires_fee_token() {
        let mut profile = NetworkConfig::builtin().unwrap().resolve(11155111).unwrap();
        let plan = Role::Source.plan(&profile, AssetConstructor::Empty).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].constructor_args.len(), 3);
        assert_eq!(
            plan[0].verify_args,
            Some(vec![
                ConstructorArg::from(profile.router_address),
                ConstructorArg::from(profile.fee_token_address.unwrap()),
            ])
        );

        profile.fee_token_address = None;
        assert!(matches!(
            Role::Source.plan(&profile, AssetConstructor::Empty),
            Err(DeployError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("destination").unwrap(), Role::Destination);
        assert_eq!(Role::Source.to_string(), "source");
        assert_eq!(
            AssetConstructor::from_str("router-and-token").unwrap(),
            AssetConstructor::RouterAndToken
        );
    }
}
