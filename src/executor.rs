use async_trait::async_trait;
use tokio::process::Command;
use tracing::*;

use crate::error::{Error, Result};

// Runs a command string and returns its combined output.
// Calls are synchronous from the caller's point of view: the future resolves when the command exits.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &str) -> Result<String>;

    // Like run, but a successful call returns stdout alone, so diagnostics printed to
    // stderr never reach a parser. A failure still carries the combined output.
    async fn run_stdout(&self, command: &str) -> Result<String> {
        self.run(command).await
    }
}

// Spawns `sh -c <command>` on the machine running the validator.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        ShellExecutor {
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        ShellExecutor {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellExecutor {
    // Returns (stdout, stdout followed by stderr) of a successful command.
    async fn output(&self, command: &str) -> Result<(String, String)> {
        debug!("{} -c {}", self.shell, command);
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let mut combined = stdout.clone();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("cmd output: {}", combined);
        if output.status.success() {
            Ok((stdout, combined))
        } else {
            Err(Error::CommandFailed {
                command: command.to_string(),
                output: combined,
            })
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(&self, command: &str) -> Result<String> {
        let (_, combined) = self.output(command).await?;
        Ok(combined)
    }

    async fn run_stdout(&self, command: &str) -> Result<String> {
        let (stdout, combined) = self.output(command).await?;
        if stdout.len() != combined.len() {
            debug!("stderr of {} ignored: {}", command, &combined[stdout.len()..]);
        }
        Ok(stdout)
    }
}

// The last non-empty line of a command's output.
pub fn last_line(out: &str) -> String {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}
