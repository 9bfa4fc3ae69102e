pub mod kube_api;
pub mod kubectl;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ClusterSnapshot, NodeRecord, PodRecord};

pub use kube_api::KubeApiCollector;
pub use kubectl::KubectlCollector;

// Normalizes node and pod queries against the orchestrator into typed records.
// Every call issues a fresh read-only query; nothing is cached between calls.
#[async_trait]
pub trait StateCollector: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>>;

    async fn list_pods(&self) -> Result<Vec<PodRecord>>;

    // Addresses assigned to the pods matching a label selector, e.g. "app=client".
    async fn pod_addresses(&self, selector: &str) -> Result<Vec<String>>;
}

// Collects the full node and pod state for a failure report.
// Collection errors are kept in the snapshot instead of being propagated.
pub async fn snapshot(collector: &dyn StateCollector) -> ClusterSnapshot {
    let nodes = collector.list_nodes().await.map_err(|e| e.to_string());
    let pods = collector.list_pods().await.map_err(|e| e.to_string());
    ClusterSnapshot { nodes, pods }
}
