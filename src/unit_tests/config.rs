use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::config::*;
use crate::conformance::ExemptionRule;
use crate::error::Error;
use crate::poller::PollBudget;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_defaults_match_reference_budgets() {
    let config = ValidationConfig::default();
    assert_eq!(config.budgets.node_readiness, PollBudget::from_secs(600, 5));
    assert_eq!(config.budgets.pod_readiness, PollBudget::from_secs(600, 5));
    assert_eq!(config.budgets.address_assignment, PollBudget::from_secs(120, 10));
    assert_eq!(config.budgets.request, PollBudget::from_secs(120, 3));
    assert_eq!(config.connectivity.address_prefix, "10.42");
    assert_eq!(config.connectivity.checks.len(), 2);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_partial_config() {
    let file = write_config(
        "
kubeconfig: /tmp/rke2.yaml
cluster:
  serverCount: 3
  workerCount: 2
  secondaryOsWorkerCount: 1
collector: api
budgets:
  nodeReadiness:
    timeout: 900
    interval: 10
exemptions:
  - contains: helm-install
  - prefix: sonobuoy-
conformancePlugin:
  enabled: false
",
    );
    let config = ValidationConfig::load(file.path()).unwrap();
    assert_eq!(config.kubeconfig, PathBuf::from("/tmp/rke2.yaml"));
    assert_eq!(config.cluster.expected_node_count(), 6);
    assert_eq!(config.collector, Backend::Api);
    assert_eq!(config.deployer, Backend::Kubectl);
    assert_eq!(config.budgets.node_readiness.timeout, Duration::from_secs(900));
    assert_eq!(config.budgets.pod_readiness, PollBudget::from_secs(600, 5));
    assert_eq!(
        config.exemptions,
        vec![
            ExemptionRule::Contains("helm-install".to_string()),
            ExemptionRule::Prefix("sonobuoy-".to_string()),
        ]
    );
    assert!(!config.conformance_plugin.enabled);
    assert_eq!(config.conformance_plugin.plugin_name, "mixed-workload-e2e");
    assert!(!config.destroy);
}

#[test]
fn test_zero_interval_is_rejected() {
    let file = write_config(
        "
budgets:
  request:
    timeout: 120
    interval: 0
",
    );
    match ValidationConfig::load(file.path()) {
        Err(Error::ConfigInvalid(msg)) => assert!(msg.contains("request")),
        other => panic!("expected invalid config, got {:?}", other),
    }
}

#[test]
fn test_empty_exemption_marker_is_rejected() {
    let config = ValidationConfig {
        exemptions: vec![ExemptionRule::Contains(String::new())],
        ..ValidationConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));
}

#[test]
fn test_connectivity_without_checks_is_rejected() {
    let mut config = ValidationConfig::default();
    config.connectivity.checks.clear();
    assert!(config.validate().is_err());
    config.connectivity.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_yaml_is_reported() {
    let file = write_config("cluster: [1, 2");
    assert!(matches!(
        ValidationConfig::load(file.path()),
        Err(Error::ParseYamlFailed(_))
    ));
}

#[test]
fn test_sample_config_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("validator.yaml");
    let config = ValidationConfig::load(&path).unwrap();
    assert_eq!(config.budgets, Budgets::default());
    assert_eq!(config.connectivity, ConnectivityConfig::default());
    assert!(config.lifecycle.build_command.ends_with("echo cluster created"));
    assert!(config.lifecycle.server_ips_command.ends_with("master_ips"));
    assert_eq!(
        config.exemptions,
        vec![ExemptionRule::Contains("helm-install".to_string())]
    );
}
