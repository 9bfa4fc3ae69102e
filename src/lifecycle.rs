use async_trait::async_trait;
use std::sync::Arc;
use tracing::*;

use crate::error::{Error, Result};
use crate::executor::{last_line, CommandExecutor};
use crate::types::ClusterSpec;

pub const CLUSTER_CREATED: &str = "cluster created";
pub const CLUSTER_DESTROYED: &str = "cluster destroyed";

// Provisions and tears down the cluster under test.
// Both calls are one-shot: they are never retried.
#[async_trait]
pub trait LifecycleController: Send + Sync {
    async fn build(&self) -> Result<String>;

    async fn destroy(&self) -> Result<String>;

    // Addresses of the machines the last build provisioned.
    async fn node_addresses(&self) -> Result<NodeAddresses>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAddresses {
    pub servers: Vec<String>,
    pub workers: Vec<String>,
    pub secondary_os_workers: Vec<String>,
}

// Servers must have addresses. Workers must have addresses exactly when any were requested.
pub fn check_node_addresses(spec: &ClusterSpec, addresses: &NodeAddresses) -> Result<()> {
    if addresses.servers.is_empty() {
        return Err(Error::ContractViolated {
            expected: format!("addresses for {} servers", spec.server_count),
            actual: "no server addresses".to_string(),
        });
    }
    match (spec.worker_count, addresses.workers.is_empty()) {
        (0, false) => Err(Error::ContractViolated {
            expected: "no worker addresses".to_string(),
            actual: addresses.workers.join(","),
        }),
        (count, true) if count > 0 => Err(Error::ContractViolated {
            expected: format!("addresses for {} workers", count),
            actual: "no worker addresses".to_string(),
        }),
        _ => Ok(()),
    }
}

// Accepts the forms provisioning tools print address lists in:
// "a,b", "a b", or a JSON-ish `["a", "b"]`.
pub fn parse_address_list(out: &str) -> Vec<String> {
    out.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim_matches(|c| c == '"' || c == '[' || c == ']'))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// The status string must match the sentinel exactly.
pub fn expect_status(actual: &str, expected: &str) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ContractViolated {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

// Runs provisioning commands (e.g. a terraform wrapper script).
// The last non-empty line the command prints is its status string.
pub struct CommandLifecycle {
    executor: Arc<dyn CommandExecutor>,
    build_command: String,
    destroy_command: String,
    address_commands: AddressCommands,
}

// Commands printing the address lists of each node group, e.g. `terraform output -raw master_ips`.
// An empty command reports no addresses for its group.
#[derive(Debug, Clone, Default)]
pub struct AddressCommands {
    pub servers: String,
    pub workers: String,
    pub secondary_os_workers: String,
}

impl CommandLifecycle {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        build_command: impl Into<String>,
        destroy_command: impl Into<String>,
    ) -> Self {
        CommandLifecycle {
            executor,
            build_command: build_command.into(),
            destroy_command: destroy_command.into(),
            address_commands: AddressCommands::default(),
        }
    }

    pub fn with_address_commands(mut self, address_commands: AddressCommands) -> Self {
        self.address_commands = address_commands;
        self
    }

    async fn addresses(&self, command: &str) -> Result<Vec<String>> {
        if command.trim().is_empty() {
            return Ok(Vec::new());
        }
        let out = self.executor.run_stdout(command).await?;
        Ok(parse_address_list(&out))
    }

    async fn run(&self, command: &str) -> Result<String> {
        if command.trim().is_empty() {
            return Err(Error::ConfigInvalid(
                "no lifecycle command configured".to_string(),
            ));
        }
        let out = self.executor.run(command).await?;
        Ok(last_line(&out))
    }
}

#[async_trait]
impl LifecycleController for CommandLifecycle {
    async fn build(&self) -> Result<String> {
        info!("Building cluster: {}", self.build_command);
        self.run(&self.build_command).await
    }

    async fn destroy(&self) -> Result<String> {
        info!("Destroying cluster: {}", self.destroy_command);
        self.run(&self.destroy_command).await
    }

    async fn node_addresses(&self) -> Result<NodeAddresses> {
        Ok(NodeAddresses {
            servers: self.addresses(&self.address_commands.servers).await?,
            workers: self.addresses(&self.address_commands.workers).await?,
            secondary_os_workers: self
                .addresses(&self.address_commands.secondary_os_workers)
                .await?,
        })
    }
}
