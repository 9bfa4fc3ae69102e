use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to collect {what}: {reason}")]
    CollectionFailed { what: &'static str, reason: String },

    #[error("Failed to parse {field} from {input:?}")]
    ParseFailed { field: &'static str, input: String },

    #[error("Timeout after {elapsed:?} ({attempts} attempts) waiting for {stage}: {reason}")]
    Timeout {
        stage: String,
        elapsed: Duration,
        attempts: u32,
        reason: String,
    },

    #[error("Lifecycle controller returned {actual:?}, expected {expected:?}")]
    ContractViolated { expected: String, actual: String },

    #[error("Not converged: {0}")]
    NotConverged(String),

    #[error("Command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },

    #[error("Plugin {plugin} did not pass:\n{results}")]
    PluginFailed { plugin: String, results: String },

    #[error("Failed to deploy workload {manifest}: {reason}")]
    DeployFailed { manifest: String, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Failed to get kube client: {0}")]
    KubeClient(#[from] kube::Error),

    #[error("Failed to read kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Failed to parse the yaml file: {0}")]
    ParseYamlFailed(#[from] serde_yaml::Error),

    #[error("Failed to parse the json format: {0}")]
    ParseJsonFailed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn collection(what: &'static str, reason: impl ToString) -> Self {
        Error::CollectionFailed {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn parse(field: &'static str, input: impl Into<String>) -> Self {
        Error::ParseFailed {
            field,
            input: input.into(),
        }
    }

    // Parse and contract errors abort the run; everything else is retried by the poller.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::ParseFailed { .. } | Error::ContractViolated { .. } | Error::ConfigInvalid(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
