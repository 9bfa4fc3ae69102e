use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, ResourceExt,
};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use crate::collector::StateCollector;
use crate::error::{Error, Result};
use crate::types::{NodeRecord, NodeStatus, PodRecord, PodStatus};

// Builds a client from the kubeconfig file written by the lifecycle controller.
pub async fn client_from_kubeconfig(path: &Path) -> Result<Client> {
    let kubeconfig = Kubeconfig::read_from(path)?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    Ok(Client::try_from(config)?)
}

// Collects state straight from the API server.
// The client is created on first use since the kubeconfig only exists once the cluster is built.
pub struct KubeApiCollector {
    kubeconfig: PathBuf,
    client: OnceCell<Client>,
}

impl KubeApiCollector {
    pub fn new(kubeconfig: impl Into<PathBuf>) -> Self {
        KubeApiCollector {
            kubeconfig: kubeconfig.into(),
            client: OnceCell::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        KubeApiCollector {
            kubeconfig: PathBuf::new(),
            client: OnceCell::new_with(Some(client)),
        }
    }

    async fn client(&self, what: &'static str) -> Result<Client> {
        self.client
            .get_or_try_init(|| client_from_kubeconfig(&self.kubeconfig))
            .await
            .cloned()
            .map_err(|e| Error::collection(what, e))
    }
}

#[async_trait]
impl StateCollector for KubeApiCollector {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let node_api: Api<Node> = Api::all(self.client("nodes").await?);
        let nodes = node_api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::collection("nodes", e))?;
        Ok(nodes.items.iter().map(node_record).collect())
    }

    async fn list_pods(&self) -> Result<Vec<PodRecord>> {
        let pod_api: Api<Pod> = Api::all(self.client("pods").await?);
        let pods = pod_api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::collection("pods", e))?;
        Ok(pods.items.iter().map(pod_record).collect())
    }

    async fn pod_addresses(&self, selector: &str) -> Result<Vec<String>> {
        let pod_api: Api<Pod> = Api::default_namespaced(self.client("pod addresses").await?);
        let pods = pod_api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| Error::collection("pod addresses", e))?;
        let mut addresses = Vec::new();
        for pod in pods.items.iter() {
            addresses.extend(pod_ips(pod));
        }
        Ok(addresses)
    }
}

// Ready condition of the node, the same value kubectl prints in STATUS.
pub fn node_record(node: &Node) -> NodeRecord {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"));
    let status = match ready.map(|c| c.status.as_str()) {
        Some("True") => NodeStatus::Ready,
        Some("False") => NodeStatus::NotReady,
        _ => NodeStatus::Unknown,
    };
    let schedulable = !node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false);
    NodeRecord {
        name: node.name_any(),
        status,
        schedulable,
    }
}

// Mirrors kubectl's READY, STATUS and RESTARTS columns.
// A waiting container's reason (e.g. CrashLoopBackOff) takes precedence over the pod phase.
pub fn pod_record(pod: &Pod) -> PodRecord {
    let total_containers = pod.spec.as_ref().map(|s| s.containers.len()).unwrap_or(0) as u32;
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.clone())
        .unwrap_or_default();
    let ready_containers = statuses.iter().filter(|c| c.ready).count() as u32;
    let restart_count = statuses
        .iter()
        .map(|c| c.restart_count.max(0) as u32)
        .sum();
    let waiting_reason = statuses
        .iter()
        .filter_map(|c| c.state.as_ref()?.waiting.as_ref()?.reason.clone())
        .next();
    let phase = pod.status.as_ref().and_then(|s| s.phase.clone());
    let status = match (waiting_reason, phase) {
        (Some(reason), _) => PodStatus::parse(&reason),
        (None, Some(phase)) => PodStatus::parse(&phase),
        (None, None) => PodStatus::Unknown,
    };
    PodRecord {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
        status,
        ready_containers,
        total_containers,
        restart_count,
    }
}

// Addresses from `status.podIPs`, falling back to `status.podIP`.
pub fn pod_ips(pod: &Pod) -> Vec<String> {
    let status = match pod.status.as_ref() {
        Some(status) => status,
        None => return Vec::new(),
    };
    let mut ips: Vec<String> = status
        .pod_ips
        .iter()
        .flatten()
        .map(|entry| entry.ip.clone())
        .filter(|ip| !ip.is_empty())
        .collect();
    if ips.is_empty() {
        ips.extend(status.pod_ip.clone());
    }
    ips
}
