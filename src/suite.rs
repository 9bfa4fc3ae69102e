use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::*;

use crate::collector::{self, StateCollector};
use crate::config::ValidationConfig;
use crate::conformance::{check_nodes, PodConformance};
use crate::deploy::{with_workloads, WorkloadDeployer};
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::lifecycle::{
    check_node_addresses, expect_status, LifecycleController, CLUSTER_CREATED, CLUSTER_DESTROYED,
};
use crate::plugin::ConformancePlugin;
use crate::probe::ConnectivityProbe;
use crate::types::ClusterSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    NodeReady,
    PodReady,
    Connectivity,
    WorkloadConformance,
    Destroy,
}

impl Stage {
    pub const VALIDATION: [Stage; 5] = [
        Stage::Build,
        Stage::NodeReady,
        Stage::PodReady,
        Stage::Connectivity,
        Stage::WorkloadConformance,
    ];

    // Stages that look at a running cluster dump its state when they fail.
    fn dumps_state(&self) -> bool {
        !matches!(self, Stage::Build | Stage::Destroy)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Build => "Starts up with no issues",
            Stage::NodeReady => "Checks Node Status",
            Stage::PodReady => "Checks Pod Status",
            Stage::Connectivity => "Verifies internode connectivity over the vxlan tunnel",
            Stage::WorkloadConformance => "Runs the mixed os sonobuoy plugin",
            Stage::Destroy => "Destroys the cluster",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    NotBuilt,
    Building,
    Validating(Stage),
    Done(Verdict),
    Destroying,
    Destroyed,
}

#[derive(Debug)]
pub enum StageResult {
    Passed,
    Failed(Error),
    Skipped(String),
}

#[derive(Debug)]
pub struct StageOutcome {
    pub stage: Stage,
    pub result: StageResult,
    pub elapsed: Duration,
    // Full node and pod state taken when the stage failed.
    pub snapshot: Option<ClusterSnapshot>,
}

impl StageOutcome {
    pub fn passed(&self) -> bool {
        matches!(self.result, StageResult::Passed)
    }

    pub fn failed(&self) -> bool {
        matches!(self.result, StageResult::Failed(_))
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.result {
            StageResult::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<StageOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        !self.outcomes.iter().any(StageOutcome::failed)
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.stage == stage)
    }

    pub fn first_failure(&self) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.failed())
    }
}

// The external systems a validation run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub lifecycle: Arc<dyn LifecycleController>,
    pub collector: Arc<dyn StateCollector>,
    pub executor: Arc<dyn CommandExecutor>,
    pub deployer: Arc<dyn WorkloadDeployer>,
}

// Runs the stages of one validation in a fixed order and stops at the first failure.
// In destroy mode no validation stage runs; the cluster is only torn down.
pub struct ValidationSuite {
    config: ValidationConfig,
    ports: Collaborators,
    conformance: PodConformance,
    state: SuiteState,
    history: Vec<SuiteState>,
}

impl ValidationSuite {
    pub fn new(config: ValidationConfig, ports: Collaborators) -> Self {
        let conformance = PodConformance::new(config.exemptions.clone());
        ValidationSuite {
            config,
            ports,
            conformance,
            state: SuiteState::NotBuilt,
            history: vec![SuiteState::NotBuilt],
        }
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    // Every state the suite went through, starting with NotBuilt.
    pub fn history(&self) -> &[SuiteState] {
        &self.history
    }

    fn transition(&mut self, state: SuiteState) {
        debug!("{:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    pub async fn run(&mut self) -> SuiteReport {
        if self.config.destroy {
            self.run_destroy().await
        } else {
            self.run_validation().await
        }
    }

    async fn run_validation(&mut self) -> SuiteReport {
        let mut report = SuiteReport::default();
        let order = Stage::VALIDATION;
        let mut stages = order.iter();
        while let Some(&stage) = stages.next() {
            if let Some(reason) = self.disabled_reason(stage) {
                info!("SKIPPED! {}: {}", stage, reason);
                report.outcomes.push(skipped(stage, reason));
                continue;
            }
            let next = match stage {
                Stage::Build => SuiteState::Building,
                _ => SuiteState::Validating(stage),
            };
            self.transition(next);
            let outcome = self.run_stage(stage).await;
            let failed = outcome.failed();
            report.outcomes.push(outcome);
            if failed {
                for &rest in stages.by_ref() {
                    report
                        .outcomes
                        .push(skipped(rest, format!("aborted after {:?} failed", stage)));
                }
                self.transition(SuiteState::Done(Verdict::Failed));
                return report;
            }
        }
        self.transition(SuiteState::Done(Verdict::Passed));
        report
    }

    async fn run_destroy(&mut self) -> SuiteReport {
        let mut report = SuiteReport::default();
        for stage in Stage::VALIDATION {
            info!("SKIPPED! {}: Cluster is being Deleted", stage);
            report
                .outcomes
                .push(skipped(stage, "Cluster is being Deleted".to_string()));
        }
        self.transition(SuiteState::Destroying);
        let outcome = self.run_stage(Stage::Destroy).await;
        if outcome.passed() {
            self.transition(SuiteState::Destroyed);
        } else {
            self.transition(SuiteState::Done(Verdict::Failed));
        }
        report.outcomes.push(outcome);
        report
    }

    fn disabled_reason(&self, stage: Stage) -> Option<String> {
        match stage {
            Stage::Connectivity if !self.config.connectivity.enabled => {
                Some("connectivity checks are disabled".to_string())
            }
            Stage::WorkloadConformance if !self.config.conformance_plugin.enabled => {
                Some("conformance plugin is disabled".to_string())
            }
            _ => None,
        }
    }

    async fn run_stage(&self, stage: Stage) -> StageOutcome {
        let start = Instant::now();
        let result = match stage {
            Stage::Build => self.build().await,
            Stage::NodeReady => self.node_ready().await,
            Stage::PodReady => self.pod_ready().await,
            Stage::Connectivity => self.connectivity().await,
            Stage::WorkloadConformance => self.workload_conformance().await,
            Stage::Destroy => self.destroy().await,
        };
        let elapsed = start.elapsed();
        match result {
            Ok(()) => {
                info!("PASSED! {}", stage);
                StageOutcome {
                    stage,
                    result: StageResult::Passed,
                    elapsed,
                    snapshot: None,
                }
            }
            Err(e) => {
                error!("FAILED! {}: {}", stage, e);
                let snapshot = if stage.dumps_state() {
                    Some(self.dump_state().await)
                } else {
                    None
                };
                StageOutcome {
                    stage,
                    result: StageResult::Failed(e),
                    elapsed,
                    snapshot,
                }
            }
        }
    }

    async fn dump_state(&self) -> ClusterSnapshot {
        info!("Fetching node and pod status");
        let snapshot = collector::snapshot(self.ports.collector.as_ref()).await;
        error!("Cluster state at failure:\n{}", snapshot);
        snapshot
    }

    async fn build(&self) -> Result<()> {
        let status = self.ports.lifecycle.build().await?;
        expect_status(&status, CLUSTER_CREATED)?;
        let addresses = self.ports.lifecycle.node_addresses().await?;
        info!("Server Node IPs: {:?}", addresses.servers);
        info!("Agent Node IPs: {:?}", addresses.workers);
        info!("Secondary OS Agent Node IPs: {:?}", addresses.secondary_os_workers);
        check_node_addresses(&self.config.cluster, &addresses)?;
        let kubeconfig = &self.config.kubeconfig;
        let contents = std::fs::read_to_string(kubeconfig).map_err(|e| Error::ContractViolated {
            expected: format!("kubeconfig at {}", kubeconfig.display()),
            actual: e.to_string(),
        })?;
        if contents.trim().is_empty() {
            return Err(Error::ContractViolated {
                expected: format!("kubeconfig at {}", kubeconfig.display()),
                actual: "empty file".to_string(),
            });
        }
        info!(
            "Cluster created: {} servers, {} workers, {} secondary OS workers.",
            self.config.cluster.server_count,
            self.config.cluster.worker_count,
            self.config.cluster.secondary_os_worker_count
        );
        debug!("kubeconfig {}:\n{}", kubeconfig.display(), contents);
        Ok(())
    }

    async fn node_ready(&self) -> Result<()> {
        let spec = self.config.cluster;
        let collector = self.ports.collector.as_ref();
        self.config
            .budgets
            .node_readiness
            .wait_for("node readiness", |_| async move {
                let nodes = collector.list_nodes().await?;
                check_nodes(&spec, &nodes)
            })
            .await
            .into_result("node readiness")
    }

    async fn pod_ready(&self) -> Result<()> {
        let conformance = &self.conformance;
        let collector = self.ports.collector.as_ref();
        self.config
            .budgets
            .pod_readiness
            .wait_for("pod readiness", |_| async move {
                let pods = collector.list_pods().await?;
                conformance.check_pods(&pods)
            })
            .await
            .into_result("pod readiness")
    }

    async fn connectivity(&self) -> Result<()> {
        let connectivity = &self.config.connectivity;
        let probe = ConnectivityProbe::new(
            self.ports.executor.clone(),
            self.ports.collector.clone(),
            self.config.kubeconfig.clone(),
            connectivity.address_prefix.clone(),
            self.config.budgets.address_assignment,
            self.config.budgets.request,
        );
        with_workloads(self.ports.deployer.as_ref(), &connectivity.manifests, || {
            probe.verify(&connectivity.selectors, &connectivity.checks)
        })
        .await
    }

    async fn workload_conformance(&self) -> Result<()> {
        ConformancePlugin::new(
            self.ports.executor.clone(),
            self.config.kubeconfig.clone(),
            self.config.conformance_plugin.clone(),
        )
        .run()
        .await
    }

    async fn destroy(&self) -> Result<()> {
        let status = self.ports.lifecycle.destroy().await?;
        expect_status(&status, CLUSTER_DESTROYED)
    }
}

fn skipped(stage: Stage, reason: String) -> StageOutcome {
    StageOutcome {
        stage,
        result: StageResult::Skipped(reason),
        elapsed: Duration::ZERO,
        snapshot: None,
    }
}
