use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collector::StateCollector;
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::types::{NodeRecord, NodeStatus, PodRecord, PodStatus};

// Collects state by running kubectl against the cluster's kubeconfig and parsing its tables.
pub struct KubectlCollector {
    executor: Arc<dyn CommandExecutor>,
    kubeconfig: PathBuf,
}

impl KubectlCollector {
    pub fn new(executor: Arc<dyn CommandExecutor>, kubeconfig: impl Into<PathBuf>) -> Self {
        KubectlCollector {
            executor,
            kubeconfig: kubeconfig.into(),
        }
    }

    // Only stdout is parsed; kubectl reports discovery and deprecation warnings on stderr.
    async fn kubectl(&self, what: &'static str, args: &str) -> Result<String> {
        let cmd = format!("kubectl {} --kubeconfig={}", args, self.kubeconfig.display());
        self.executor
            .run_stdout(&cmd)
            .await
            .map_err(|e| Error::collection(what, e))
    }
}

#[async_trait]
impl StateCollector for KubectlCollector {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let out = self.kubectl("nodes", "get nodes --no-headers").await?;
        parse_nodes(&out)
    }

    async fn list_pods(&self) -> Result<Vec<PodRecord>> {
        let out = self.kubectl("pods", "get pods -A --no-headers").await?;
        parse_pods(&out)
    }

    async fn pod_addresses(&self, selector: &str) -> Result<Vec<String>> {
        let args = format!(
            "get pods -l {} -o=jsonpath='{{range .items[*]}}{{.status.podIPs[*].ip}}{{\" \"}}{{end}}'",
            selector
        );
        let out = self.kubectl("pod addresses", &args).await?;
        Ok(parse_addresses(&out))
    }
}

fn rows(out: &str) -> impl Iterator<Item = &str> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("No resources found"))
}

// Parses `kubectl get nodes --no-headers`: NAME STATUS ROLES AGE VERSION.
pub fn parse_nodes(out: &str) -> Result<Vec<NodeRecord>> {
    rows(out)
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                return Err(Error::parse("node row", line));
            }
            let (status, schedulable) = NodeStatus::parse(fields[1]);
            Ok(NodeRecord {
                name: fields[0].to_string(),
                status,
                schedulable,
            })
        })
        .collect()
}

// Parses `kubectl get pods -A --no-headers`: NAMESPACE NAME READY STATUS RESTARTS AGE.
// RESTARTS may be followed by "(5m ago)" which is ignored.
pub fn parse_pods(out: &str) -> Result<Vec<PodRecord>> {
    rows(out)
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                return Err(Error::parse("pod row", line));
            }
            let (ready_containers, total_containers) = PodRecord::parse_ready(fields[2])?;
            let restart_count = fields[4]
                .parse::<u32>()
                .map_err(|_| Error::parse("restarts", fields[4]))?;
            Ok(PodRecord {
                namespace: fields[0].to_string(),
                name: fields[1].to_string(),
                status: PodStatus::parse(fields[3]),
                ready_containers,
                total_containers,
                restart_count,
            })
        })
        .collect()
}

// Parses the space separated address list printed by the jsonpath query.
pub fn parse_addresses(out: &str) -> Vec<String> {
    out.split_whitespace()
        .map(|s| s.trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
