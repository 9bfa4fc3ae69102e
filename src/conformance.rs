use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{ClusterSpec, NodeRecord, PodRecord, PodStatus};

// A class of pods that run to completion instead of staying up, e.g. helm install jobs.
// Written in config as a single-key map: `contains: helm-install` or `prefix: sonobuoy-`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExemptionEntry", into = "ExemptionEntry")]
pub enum ExemptionRule {
    Contains(String),
    Prefix(String),
}

// Serialized form of an ExemptionRule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExemptionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl TryFrom<ExemptionEntry> for ExemptionRule {
    type Error = String;

    fn try_from(entry: ExemptionEntry) -> std::result::Result<Self, Self::Error> {
        match (entry.contains, entry.prefix) {
            (Some(marker), None) => Ok(ExemptionRule::Contains(marker)),
            (None, Some(prefix)) => Ok(ExemptionRule::Prefix(prefix)),
            _ => Err("an exemption needs exactly one of `contains` or `prefix`".to_string()),
        }
    }
}

impl From<ExemptionRule> for ExemptionEntry {
    fn from(rule: ExemptionRule) -> Self {
        match rule {
            ExemptionRule::Contains(marker) => ExemptionEntry {
                contains: Some(marker),
                ..ExemptionEntry::default()
            },
            ExemptionRule::Prefix(prefix) => ExemptionEntry {
                prefix: Some(prefix),
                ..ExemptionEntry::default()
            },
        }
    }
}

impl ExemptionRule {
    pub fn matches(&self, pod_name: &str) -> bool {
        match self {
            ExemptionRule::Contains(marker) => pod_name.contains(marker.as_str()),
            ExemptionRule::Prefix(prefix) => pod_name.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodConformance {
    exemptions: Vec<ExemptionRule>,
}

impl PodConformance {
    pub fn new(exemptions: Vec<ExemptionRule>) -> Self {
        PodConformance { exemptions }
    }

    pub fn is_exempt(&self, pod: &PodRecord) -> bool {
        self.exemptions.iter().any(|rule| rule.matches(&pod.name))
    }

    // Returns the reason a pod is not conformant, if any.
    pub fn violation(&self, pod: &PodRecord) -> Option<String> {
        if self.is_exempt(pod) {
            if pod.status != PodStatus::Completed {
                return Some(format!("{} is {}, expected Completed", pod.name, pod.status));
            }
            return None;
        }
        if pod.status != PodStatus::Running {
            return Some(format!("{} is {}, expected Running", pod.name, pod.status));
        }
        if pod.restart_count != 0 {
            return Some(format!("{} restarted {} times", pod.name, pod.restart_count));
        }
        if !pod.all_containers_ready() {
            return Some(format!(
                "{} has {}/{} containers ready, should have all containers running",
                pod.name, pod.ready_containers, pod.total_containers
            ));
        }
        None
    }

    pub fn is_conformant(&self, pod: &PodRecord) -> bool {
        self.violation(pod).is_none()
    }

    // Every pod must be conformant; all violations are reported together.
    pub fn check_pods(&self, pods: &[PodRecord]) -> Result<()> {
        let violations: Vec<String> = pods.iter().filter_map(|p| self.violation(p)).collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::NotConverged(violations.join("; ")))
        }
    }
}

impl Default for PodConformance {
    fn default() -> Self {
        PodConformance::new(vec![ExemptionRule::Contains("helm-install".to_string())])
    }
}

// The node set must have exactly the expected size and every node must be Ready and schedulable.
pub fn check_nodes(spec: &ClusterSpec, nodes: &[NodeRecord]) -> Result<()> {
    let expected = spec.expected_node_count();
    if nodes.len() != expected {
        return Err(Error::NotConverged(format!(
            "Number of nodes should match the spec: found {}, expected {}",
            nodes.len(),
            expected
        )));
    }
    let not_ready: Vec<String> = nodes
        .iter()
        .filter(|n| !n.is_ready() || !n.schedulable)
        .map(|n| {
            if n.schedulable {
                format!("{} ({})", n.name, n.status)
            } else {
                format!("{} ({},SchedulingDisabled)", n.name, n.status)
            }
        })
        .collect();
    if not_ready.is_empty() {
        Ok(())
    } else {
        Err(Error::NotConverged(format!(
            "Nodes should all be in Ready state: {}",
            not_ready.join(", ")
        )))
    }
}
