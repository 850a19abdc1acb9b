// src/exec/command.rs

//! Shell-command task bodies.
//!
//! Each configured module runs its `cmd` through the platform shell with
//! the account in the environment:
//!
//! - `ROUTEWEAVE_ACCOUNT`: account address
//! - `ROUTEWEAVE_PRIVATE_KEY`: account private key
//! - `ROUTEWEAVE_MODULE`: module name
//!
//! Exit status 0 is success. The message is the last non-empty stdout line,
//! or a description of the exit status when the command printed nothing.

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::store::Account;
use crate::types::{ModuleName, TaskOutcome};

use super::backend::{TaskFactory, TaskRunner};

pub const ENV_ACCOUNT: &str = "ROUTEWEAVE_ACCOUNT";
pub const ENV_PRIVATE_KEY: &str = "ROUTEWEAVE_PRIVATE_KEY";
pub const ENV_MODULE: &str = "ROUTEWEAVE_MODULE";

/// Factory for one configured module.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    module: ModuleName,
    cmd: String,
    timeout: Option<Duration>,
}

impl CommandFactory {
    pub fn new(module: impl Into<ModuleName>, cmd: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            cmd: cmd.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TaskFactory for CommandFactory {
    fn build(&self, account: &Account) -> Result<Box<dyn TaskRunner>> {
        Ok(Box::new(CommandTask {
            module: self.module.clone(),
            cmd: self.cmd.clone(),
            address: account.address.clone(),
            private_key: account.private_key.clone(),
            timeout: self.timeout,
        }))
    }
}

#[derive(Debug)]
pub struct CommandTask {
    module: ModuleName,
    cmd: String,
    address: String,
    private_key: String,
    timeout: Option<Duration>,
}

impl TaskRunner for CommandTask {
    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<TaskOutcome>> + Send + '_>> {
        Box::pin(self.run_inner())
    }
}

impl CommandTask {
    async fn run_inner(&self) -> Result<TaskOutcome> {
        info!(
            account = %self.address,
            module = %self.module,
            cmd = %self.cmd,
            "starting task command"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env(ENV_ACCOUNT, &self.address)
            .env(ENV_PRIVATE_KEY, &self.private_key)
            .env(ENV_MODULE, &self.module)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for module '{}'", self.module))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain stderr so the pipe never fills up.
        if let Some(stderr) = stderr {
            let module = self.module.clone();
            let address = self.address.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(account = %address, module = %module, "stderr: {}", line);
                }
            });
        }

        let wait = async {
            let mut last_line = None;
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Some(line) = lines.next_line().await? {
                    let line = line.trim();
                    if !line.is_empty() {
                        debug!(account = %self.address, module = %self.module, "stdout: {}", line);
                        last_line = Some(line.to_string());
                    }
                }
            }
            let status = child.wait().await?;
            Ok::<(ExitStatus, Option<String>), std::io::Error>((status, last_line))
        };

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => Some(result),
                Err(_) => None,
            },
            None => Some(wait.await),
        };

        let Some(waited) = waited else {
            let limit = self.timeout.unwrap_or_default();
            warn!(
                account = %self.address,
                module = %self.module,
                timeout_secs = limit.as_secs(),
                "task command timed out; killing process"
            );
            if let Err(e) = child.kill().await {
                warn!(module = %self.module, error = %e, "failed to kill timed out process");
            }
            return Ok(TaskOutcome::Failed(format!(
                "timed out after {}s",
                limit.as_secs()
            )));
        };

        let (status, last_line) = waited
            .with_context(|| format!("waiting for process of module '{}'", self.module))?;

        info!(
            account = %self.address,
            module = %self.module,
            exit_code = status.code().unwrap_or(-1),
            success = status.success(),
            "task command exited"
        );

        let message = last_line.unwrap_or_else(|| describe_status(&status));
        Ok(TaskOutcome::from_parts(status.success(), message))
    }
}

fn describe_status(status: &ExitStatus) -> String {
    match status.code() {
        Some(0) => "completed successfully".to_string(),
        Some(code) => format!("exited with status {code}"),
        None => "terminated by signal".to_string(),
    }
}
