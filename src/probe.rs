use std::path::PathBuf;
use std::sync::Arc;
use tracing::*;

use crate::collector::StateCollector;
use crate::config::RequestCheck;
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::poller::PollBudget;
use crate::types::ConnectivityResult;

// Verifies that workloads on different node operating systems can reach each other.
pub struct ConnectivityProbe {
    executor: Arc<dyn CommandExecutor>,
    collector: Arc<dyn StateCollector>,
    kubeconfig: PathBuf,
    address_prefix: String,
    address_budget: PollBudget,
    request_budget: PollBudget,
}

impl ConnectivityProbe {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        collector: Arc<dyn StateCollector>,
        kubeconfig: impl Into<PathBuf>,
        address_prefix: impl Into<String>,
        address_budget: PollBudget,
        request_budget: PollBudget,
    ) -> Self {
        ConnectivityProbe {
            executor,
            collector,
            kubeconfig: kubeconfig.into(),
            address_prefix: address_prefix.into(),
            address_budget,
            request_budget,
        }
    }

    // Runs one command and captures its output and error.
    pub async fn probe(&self, command: &str) -> ConnectivityResult {
        match self.executor.run(command).await {
            Ok(response_text) => ConnectivityResult {
                response_text,
                error: None,
            },
            Err(e) => {
                let response_text = match &e {
                    Error::CommandFailed { output, .. } => output.clone(),
                    _ => String::new(),
                };
                ConnectivityResult {
                    response_text,
                    error: Some(e),
                }
            }
        }
    }

    pub fn request_command(&self, check: &RequestCheck) -> String {
        format!(
            "kubectl exec {} --kubeconfig={} -- curl -m7 {}",
            check.from,
            self.kubeconfig.display(),
            check.target
        )
    }

    // Waits until every pod matching selector has an address in the expected range.
    pub async fn wait_for_address(&self, selector: &str) -> Result<Vec<String>> {
        let what = format!("addresses of {}", selector);
        self.address_budget
            .wait_for(&what, |_| async move {
                let addresses = self.collector.pod_addresses(selector).await?;
                check_addresses(&addresses, &self.address_prefix)?;
                Ok(addresses)
            })
            .await
            .into_result(&what)
    }

    // Waits until a request from check.from to check.target answers with the expected text.
    pub async fn wait_for_response(&self, check: &RequestCheck) -> Result<String> {
        let cmd = self.request_command(check);
        let cmd = cmd.as_str();
        self.request_budget
            .wait_for(&check.name, |_| async move {
                let result = self.probe(cmd).await;
                if let Some(e) = result.error {
                    return Err(e);
                }
                if result.response_text.contains(&check.expect) {
                    Ok(result.response_text)
                } else {
                    Err(Error::NotConverged(format!(
                        "failed cmd: {}: response does not contain {:?}",
                        cmd, check.expect
                    )))
                }
            })
            .await
            .into_result(&check.name)
    }

    // Every workload must get an address, then each direction must succeed on its own.
    pub async fn verify(&self, selectors: &[String], checks: &[RequestCheck]) -> Result<()> {
        for selector in selectors {
            let addresses = self.wait_for_address(selector).await?;
            info!("Pods {} have addresses {:?}.", selector, addresses);
        }
        for check in checks {
            self.wait_for_response(check).await?;
            info!("Request check {} passed.", check.name);
        }
        Ok(())
    }
}

// An empty address list has not converged yet. Every address is checked, not only the first.
pub fn check_addresses(addresses: &[String], prefix: &str) -> Result<()> {
    if addresses.is_empty() {
        return Err(Error::NotConverged("no pod address assigned yet".to_string()));
    }
    let outside: Vec<&str> = addresses
        .iter()
        .filter(|a| !a.starts_with(prefix))
        .map(String::as_str)
        .collect();
    if outside.is_empty() {
        Ok(())
    } else {
        Err(Error::NotConverged(format!(
            "addresses {:?} are outside {}",
            outside, prefix
        )))
    }
}
