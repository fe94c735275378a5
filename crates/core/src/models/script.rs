//! Script bridge
//!
//! Runs an external bridge program per prompt: the prompt goes to stdin, the
//! reply is read from stdout, stderr is inherited. A non-zero exit status is
//! a failure.

use super::bridge::ModelBridge;
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Bridge backed by an external program
pub struct ScriptBridge {
    interpreter: Option<String>,
    script: PathBuf,
    model: String,
    timeout: Duration,
}

impl ScriptBridge {
    pub fn new(
        interpreter: Option<String>,
        script: PathBuf,
        model: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            interpreter,
            script,
            model: model.to_string(),
            timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(&self.script);
                cmd
            }
            None => Command::new(&self.script),
        };
        cmd.arg("--model")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, prompt: &str) -> anyhow::Result<String> {
        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("Failed to start bridge {}", self.script.display()))?;

        // stdin is fed from its own task while stdout is drained here
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            })
        });

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read bridge output")?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Bridge closed stdin before the prompt ended")
                }
                Err(e) => tracing::warn!(error = %e, "Prompt writer task failed"),
            }
        }

        if !output.status.success() {
            anyhow::bail!("Bridge exited with {}", output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ModelBridge for ScriptBridge {
    fn name(&self) -> &str {
        "script"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        tracing::debug!(
            script = %self.script.display(),
            model = %self.model,
            "Calling bridge script"
        );
        tokio::time::timeout(self.timeout, self.run(prompt))
            .await
            .with_context(|| format!("Bridge timed out after {:?}", self.timeout))?
    }
}
