use std::path::PathBuf;
use std::sync::Arc;
use tracing::*;

use crate::config::PluginConfig;
use crate::error::{Error, Result};
use crate::executor::{last_line, CommandExecutor};

// Runs the mixed-workload sonobuoy plugin against the cluster and checks its verdict.
// The plugin's aggregator is pinned to Linux nodes.
pub struct ConformancePlugin {
    executor: Arc<dyn CommandExecutor>,
    kubeconfig: PathBuf,
    config: PluginConfig,
}

impl ConformancePlugin {
    pub fn new(executor: Arc<dyn CommandExecutor>, kubeconfig: impl Into<PathBuf>, config: PluginConfig) -> Self {
        ConformancePlugin {
            executor,
            kubeconfig: kubeconfig.into(),
            config,
        }
    }

    pub fn commands(&self) -> [String; 3] {
        let kubeconfig = self.kubeconfig.display();
        let script = self.config.install_script.display();
        [
            format!("chmod +x {} && sh {}", script, script),
            format!(
                "sonobuoy run --kubeconfig={} --plugin {} --aggregator-node-selector {} --wait",
                kubeconfig,
                self.config.plugin_manifest.display(),
                self.config.aggregator_node_selector
            ),
            format!("sonobuoy retrieve --kubeconfig={}", kubeconfig),
        ]
    }

    pub async fn run(&self) -> Result<()> {
        let [install, run, retrieve] = self.commands();
        info!("Installing sonobuoy: {}", install);
        self.executor.run(&install).await?;
        info!("Running plugin {}", self.config.plugin_name);
        self.executor.run(&run).await?;
        let tarball = last_line(&self.executor.run(&retrieve).await?);
        let results = self
            .executor
            .run(&format!("sonobuoy results {}", tarball))
            .await?;
        check_results(&self.config.plugin_name, &results)
    }
}

pub fn check_results(plugin: &str, results: &str) -> Result<()> {
    let verdict = format!("Plugin: {}\nStatus: passed\n", plugin);
    if results.contains(&verdict) {
        info!("Plugin {} passed.", plugin);
        Ok(())
    } else {
        Err(Error::PluginFailed {
            plugin: plugin.to_string(),
            results: results.to_string(),
        })
    }
}
