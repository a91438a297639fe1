//! digipass is a CLI tool to deploy and verify the DigiPass cross-chain ticket contracts.

mod cli;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, DeployArgs, NetworkSelector, OutData};
use digipass_deploy::{
    ArtifactStore, ChainProfile, DeploymentReport, EtherscanVerifier, JsonRpcChain, NetworkConfig,
    OrchestratorBuilder, Signer,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = match &cli.networks {
        Some(path) => NetworkConfig::load(path)
            .with_context(|| format!("Failed to load networks from {}", path.display()))?,
        None => NetworkConfig::builtin()?,
    };

    match cli.command {
        Command::Deploy(args) => deploy(&config, args).await,
        Command::Networks { output } => {
            println!("{}", networks_table(config.profiles()));
            if let Some(path) = output {
                config.to_networks_file().save_to_file(&path)?;
            }
            Ok(())
        }
    }
}

async fn deploy(config: &NetworkConfig, args: DeployArgs) -> Result<()> {
    let profile = match &args.network {
        NetworkSelector::ChainId(chain_id) => config.resolve(*chain_id)?,
        NetworkSelector::Name(name) => config
            .resolve_name(name)
            .with_context(|| format!("No network named {name}"))?,
    };

    let chain = JsonRpcChain::new(args.rpc_url.clone())?;
    let node_chain_id = chain
        .chain_id()
        .await
        .with_context(|| format!("Failed to reach {}", args.rpc_url))?;
    anyhow::ensure!(
        node_chain_id == profile.chain_id,
        "RPC endpoint reports chain id {node_chain_id}, expected {} ({})",
        profile.chain_id,
        profile.name
    );

    let signer = match (&args.private_key, &args.mnemonic) {
        (Some(key), _) => Signer::from_private_key(key)?,
        (None, Some(phrase)) => Signer::from_mnemonic(phrase, args.account_index)?,
        (None, None) => Signer::dev_account()?,
    };

    let build_info = args
        .build_info
        .clone()
        .unwrap_or_else(|| args.artifacts.join("build-info"));
    let verifier = EtherscanVerifier::verifier_for(
        &profile,
        build_info.is_dir().then_some(build_info.as_path()),
    )?;

    tracing::info!(
        network = %profile.name,
        chain_id = profile.chain_id,
        role = %args.role,
        deployer = %signer.address,
        rpc_url = %args.rpc_url,
        "Starting deployment..."
    );

    let mut builder = OrchestratorBuilder::new(profile.clone(), chain, signer)
        .artifacts(ArtifactStore::from_dir(&args.artifacts))
        .timeout(Duration::from_secs(args.timeout))
        .verifier(verifier);
    if let Some(confirmations) = args.confirmations {
        builder = builder.required_confirmations(confirmations);
    }

    let report = builder
        .build()
        .run_role(args.role, args.asset_constructor)
        .await?;

    println!("{}", report_table(&report));

    let outdata = match args.outdata {
        Some(OutData::None) => None,
        Some(OutData::Path(path)) => Some(PathBuf::from(path)),
        None => Some(PathBuf::from("deployments").join(format!("{}.json", profile.name))),
    };
    if let Some(path) = outdata {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        report.save_to_file(&path)?;
    }

    Ok(())
}

fn report_table(report: &DeploymentReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Contract", "Address", "Confirmations", "Verification"]);

    for deployment in &report.deployments {
        let verification = report
            .verification(deployment.address)
            .map(|outcome| format!("{outcome:?}"))
            .unwrap_or_default();
        table.add_row(vec![
            deployment.contract_name.clone(),
            deployment.address.to_string(),
            deployment.confirmations.to_string(),
            verification,
        ]);
    }
    table
}

fn networks_table<'a>(profiles: impl Iterator<Item = &'a ChainProfile>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Network",
        "Chain id",
        "Development",
        "Confirmations",
        "Router",
    ]);

    for profile in profiles {
        table.add_row(vec![
            profile.name.clone(),
            profile.chain_id.to_string(),
            profile.is_development.to_string(),
            profile.required_confirmations.to_string(),
            profile.router_address.to_string(),
        ]);
    }
    table
}
