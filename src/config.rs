use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::conformance::ExemptionRule;
use crate::error::{Error, Result};
use crate::poller::PollBudget;
use crate::types::ClusterSpec;

// Everything a validation run needs, threaded explicitly through every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    // Cluster access credentials consumed by every collector and probe call.
    pub kubeconfig: PathBuf,
    pub cluster: ClusterSpec,
    pub destroy: bool,
    pub collector: Backend,
    pub deployer: Backend,
    pub lifecycle: LifecycleConfig,
    pub budgets: Budgets,
    pub exemptions: Vec<ExemptionRule>,
    pub connectivity: ConnectivityConfig,
    pub conformance_plugin: PluginConfig,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            kubeconfig: PathBuf::from("/tmp/mixedos-kubeconfig"),
            cluster: ClusterSpec::default(),
            destroy: false,
            collector: Backend::Kubectl,
            deployer: Backend::Kubectl,
            lifecycle: LifecycleConfig::default(),
            budgets: Budgets::default(),
            exemptions: vec![ExemptionRule::Contains("helm-install".to_string())],
            connectivity: ConnectivityConfig::default(),
            conformance_plugin: PluginConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum Backend {
    // Shell out to kubectl.
    Kubectl,
    // Talk to the API server with kube.
    Api,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    pub build_command: String,
    pub destroy_command: String,
    // Each prints the comma or whitespace separated addresses of one node group.
    pub server_ips_command: String,
    pub worker_ips_command: String,
    pub secondary_os_worker_ips_command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Budgets {
    pub node_readiness: PollBudget,
    pub pod_readiness: PollBudget,
    pub address_assignment: PollBudget,
    pub request: PollBudget,
}

impl Default for Budgets {
    fn default() -> Self {
        Budgets {
            node_readiness: PollBudget::from_secs(600, 5),
            pod_readiness: PollBudget::from_secs(600, 5),
            address_assignment: PollBudget::from_secs(120, 10),
            request: PollBudget::from_secs(120, 3),
        }
    }
}

// An application-level request issued from one workload against another's service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCheck {
    pub name: String,
    // kubectl exec target of the client side, e.g. "svc/client-curl".
    pub from: String,
    // host:port of the serving side.
    pub target: String,
    // Identifying text the serving side answers with.
    pub expect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectivityConfig {
    pub enabled: bool,
    pub manifests: Vec<PathBuf>,
    pub address_prefix: String,
    // Label selectors of the workloads that must have an address before requests are issued.
    pub selectors: Vec<String>,
    pub checks: Vec<RequestCheck>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            enabled: true,
            manifests: vec![
                PathBuf::from("manifests/pod_client.yaml"),
                PathBuf::from("manifests/windows_app_deployment.yaml"),
            ],
            address_prefix: "10.42".to_string(),
            selectors: vec!["app=client".to_string(), "app=windows-app".to_string()],
            checks: vec![
                RequestCheck {
                    name: "linux-to-windows".to_string(),
                    from: "svc/client-curl".to_string(),
                    target: "windows-app-svc:3000".to_string(),
                    expect: "Welcome to PSTools for K8s Debugging".to_string(),
                },
                RequestCheck {
                    name: "windows-to-linux".to_string(),
                    from: "svc/windows-app-svc".to_string(),
                    target: "client-curl:8080".to_string(),
                    expect: "Welcome to nginx!".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginConfig {
    pub enabled: bool,
    pub install_script: PathBuf,
    pub plugin_manifest: PathBuf,
    pub plugin_name: String,
    pub aggregator_node_selector: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            enabled: true,
            install_script: PathBuf::from("scripts/install_sonobuoy.sh"),
            plugin_manifest: PathBuf::from(
                "my-sonobuoy-plugins/mixed-workload-e2e/mixed-workload-e2e.yaml",
            ),
            plugin_name: "mixed-workload-e2e".to_string(),
            aggregator_node_selector: "kubernetes.io/os:linux".to_string(),
        }
    }
}

impl ValidationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let config: ValidationConfig = serde_yaml::from_str(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.kubeconfig.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid("kubeconfig path is empty".to_string()));
        }
        if self.cluster.server_count == 0 {
            return Err(Error::ConfigInvalid(
                "a cluster needs at least one server".to_string(),
            ));
        }
        let budgets = [
            ("nodeReadiness", self.budgets.node_readiness),
            ("podReadiness", self.budgets.pod_readiness),
            ("addressAssignment", self.budgets.address_assignment),
            ("request", self.budgets.request),
        ];
        for (name, budget) in budgets {
            if budget.interval.is_zero() {
                return Err(Error::ConfigInvalid(format!("{} interval must be positive", name)));
            }
        }
        for rule in &self.exemptions {
            let marker = match rule {
                ExemptionRule::Contains(m) | ExemptionRule::Prefix(m) => m,
            };
            if marker.is_empty() {
                return Err(Error::ConfigInvalid(
                    "exemption markers must not be empty".to_string(),
                ));
            }
        }
        if self.connectivity.enabled && self.connectivity.checks.is_empty() {
            return Err(Error::ConfigInvalid(
                "connectivity is enabled but no request checks are configured".to_string(),
            ));
        }
        Ok(())
    }
}
