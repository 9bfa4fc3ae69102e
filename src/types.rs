use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;

// The shape of the cluster handed over by the lifecycle controller.
// It is fixed once the cluster is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub server_count: u32,
    pub worker_count: u32,
    pub secondary_os_worker_count: u32,
}

impl ClusterSpec {
    pub fn new(server_count: u32, worker_count: u32, secondary_os_worker_count: u32) -> Self {
        ClusterSpec {
            server_count,
            worker_count,
            secondary_os_worker_count,
        }
    }

    pub fn expected_node_count(&self) -> usize {
        self.server_count as usize
            + self.worker_count as usize
            + self.secondary_os_worker_count as usize
    }
}

impl Default for ClusterSpec {
    fn default() -> Self {
        ClusterSpec::new(1, 1, 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Ready,
    NotReady,
    Unknown,
    Other(String),
}

impl NodeStatus {
    // Parses the kubectl STATUS column, e.g. "Ready" or "Ready,SchedulingDisabled".
    // Returns the status and whether the node is schedulable.
    pub fn parse(column: &str) -> (NodeStatus, bool) {
        let mut parts = column.split(',');
        let status = match parts.next().unwrap_or_default() {
            "Ready" => NodeStatus::Ready,
            "NotReady" => NodeStatus::NotReady,
            "Unknown" => NodeStatus::Unknown,
            other => NodeStatus::Other(other.to_string()),
        };
        let schedulable = !parts.any(|p| p == "SchedulingDisabled");
        (status, schedulable)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "Ready"),
            NodeStatus::NotReady => write!(f, "NotReady"),
            NodeStatus::Unknown => write!(f, "Unknown"),
            NodeStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub name: String,
    pub status: NodeStatus,
    pub schedulable: bool,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>, status: NodeStatus) -> Self {
        NodeRecord {
            name: name.into(),
            status,
            schedulable: true,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == NodeStatus::Ready
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodStatus {
    Running,
    Completed,
    Pending,
    Failed,
    Unknown,
    Other(String),
}

impl PodStatus {
    pub fn parse(column: &str) -> PodStatus {
        match column {
            "Running" => PodStatus::Running,
            "Completed" | "Succeeded" => PodStatus::Completed,
            "Pending" => PodStatus::Pending,
            "Failed" | "Error" => PodStatus::Failed,
            "Unknown" => PodStatus::Unknown,
            other => PodStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodStatus::Running => write!(f, "Running"),
            PodStatus::Completed => write!(f, "Completed"),
            PodStatus::Pending => write!(f, "Pending"),
            PodStatus::Failed => write!(f, "Failed"),
            PodStatus::Unknown => write!(f, "Unknown"),
            PodStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    pub status: PodStatus,
    pub ready_containers: u32,
    pub total_containers: u32,
    pub restart_count: u32,
}

impl PodRecord {
    // Parses the kubectl READY column. Both sides must be plain integers.
    pub fn parse_ready(field: &str) -> Result<(u32, u32), Error> {
        let (ready, total) = field
            .split_once('/')
            .ok_or_else(|| Error::parse("ready/total", field))?;
        let ready = ready
            .parse::<u32>()
            .map_err(|_| Error::parse("ready/total", field))?;
        let total = total
            .parse::<u32>()
            .map_err(|_| Error::parse("ready/total", field))?;
        Ok((ready, total))
    }

    pub fn all_containers_ready(&self) -> bool {
        self.ready_containers == self.total_containers
    }
}

// Diagnostic dump of the cluster, taken when a stage fails.
// Each half keeps the collection error instead of the records when the query failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub nodes: Result<Vec<NodeRecord>, String>,
    pub pods: Result<Vec<PodRecord>, String>,
}

impl fmt::Display for ClusterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes:")?;
        match &self.nodes {
            Ok(nodes) => {
                writeln!(f, "{:<40} {}", "NAME", "STATUS")?;
                for node in nodes {
                    let status = if node.schedulable {
                        node.status.to_string()
                    } else {
                        format!("{},SchedulingDisabled", node.status)
                    };
                    writeln!(f, "{:<40} {}", node.name, status)?;
                }
            }
            Err(e) => writeln!(f, "Error retrieving nodes: {}", e)?,
        }
        writeln!(f, "Pods:")?;
        match &self.pods {
            Ok(pods) => {
                writeln!(
                    f,
                    "{:<20} {:<50} {:<7} {:<18} {}",
                    "NAMESPACE", "NAME", "READY", "STATUS", "RESTARTS"
                )?;
                for pod in pods {
                    writeln!(
                        f,
                        "{:<20} {:<50} {:<7} {:<18} {}",
                        pod.namespace,
                        pod.name,
                        format!("{}/{}", pod.ready_containers, pod.total_containers),
                        pod.status.to_string(),
                        pod.restart_count
                    )?;
                }
            }
            Err(e) => writeln!(f, "Error retrieving pods: {}", e)?,
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct ConnectivityResult {
    pub response_text: String,
    pub error: Option<Error>,
}

impl ConnectivityResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
