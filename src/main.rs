use anyhow::{bail, Context, Result};
use clap::Parser;
use mixedos_validator::collector::{KubeApiCollector, KubectlCollector, StateCollector};
use mixedos_validator::config::{Backend, ValidationConfig};
use mixedos_validator::deploy::{KubeApplyDeployer, KubectlDeployer, WorkloadDeployer};
use mixedos_validator::executor::{CommandExecutor, ShellExecutor};
use mixedos_validator::lifecycle::{AddressCommands, CommandLifecycle};
use mixedos_validator::suite::{Collaborators, StageResult, ValidationSuite};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "mixedos-validator",
    about = "Builds a mixed Linux/Windows cluster and validates that it converged"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "MIXEDOS_VALIDATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Kubeconfig of the cluster under test, overrides the config file
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Tear the cluster down instead of building and validating it
    #[arg(long)]
    destroy: bool,

    /// How node and pod state is collected
    #[arg(long, value_enum)]
    collector: Option<Backend>,

    /// How workloads are deployed
    #[arg(long, value_enum)]
    deployer: Option<Backend>,
}

fn load_config(cli: &Cli) -> Result<ValidationConfig> {
    let mut config = match &cli.config {
        Some(path) => ValidationConfig::load(path)
            .with_context(|| format!("Failed to load config at {}", path.display()))?,
        None => ValidationConfig::default(),
    };
    if let Some(kubeconfig) = &cli.kubeconfig {
        config.kubeconfig = kubeconfig.clone();
    }
    if let Some(collector) = cli.collector {
        config.collector = collector;
    }
    if let Some(deployer) = cli.deployer {
        config.deployer = deployer;
    }
    config.destroy |= cli.destroy;
    config.validate()?;
    Ok(config)
}

fn collaborators(config: &ValidationConfig) -> Collaborators {
    let executor: Arc<dyn CommandExecutor> = Arc::new(ShellExecutor::new());
    let collector: Arc<dyn StateCollector> = match config.collector {
        Backend::Kubectl => Arc::new(KubectlCollector::new(executor.clone(), config.kubeconfig.clone())),
        Backend::Api => Arc::new(KubeApiCollector::new(config.kubeconfig.clone())),
    };
    let deployer: Arc<dyn WorkloadDeployer> = match config.deployer {
        Backend::Kubectl => Arc::new(KubectlDeployer::new(executor.clone(), config.kubeconfig.clone())),
        Backend::Api => Arc::new(KubeApplyDeployer::new(config.kubeconfig.clone())),
    };
    let lifecycle = Arc::new(
        CommandLifecycle::new(
            executor.clone(),
            config.lifecycle.build_command.clone(),
            config.lifecycle.destroy_command.clone(),
        )
        .with_address_commands(AddressCommands {
            servers: config.lifecycle.server_ips_command.clone(),
            workers: config.lifecycle.worker_ips_command.clone(),
            secondary_os_workers: config.lifecycle.secondary_os_worker_ips_command.clone(),
        }),
    );
    Collaborators {
        lifecycle,
        collector,
        executor,
        deployer,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if config.destroy {
        info!("Running in destroy mode");
    } else {
        info!("Running mixed OS cluster validation");
    }

    let ports = collaborators(&config);
    let mut suite = ValidationSuite::new(config, ports);
    let report = suite.run().await;

    for outcome in report.outcomes.iter() {
        match &outcome.result {
            StageResult::Passed => println!("PASSED! {} ({:?})", outcome.stage, outcome.elapsed),
            StageResult::Failed(e) => {
                println!("FAILED! {} ({:?}): {}", outcome.stage, outcome.elapsed, e);
                if let Some(snapshot) = &outcome.snapshot {
                    println!("{}", snapshot);
                }
            }
            StageResult::Skipped(reason) => println!("SKIPPED! {}: {}", outcome.stage, reason),
        }
    }

    match report.first_failure() {
        None => {
            info!("Validation finished in state {:?}.", suite.state());
            Ok(())
        }
        Some(outcome) => bail!("stage \"{}\" failed", outcome.stage),
    }
}
