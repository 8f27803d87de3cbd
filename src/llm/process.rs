//! The llama.cpp server child process.

use crate::config::LocalBackendConfig;
use anyhow::{Context as _, bail};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt as _;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

/// Bytes of server stderr kept for startup diagnostics.
const STDERR_CAPTURE_LIMIT: u64 = 64 * 1024;

/// Grace period between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

/// A running llama.cpp server.
pub struct LlamaServerProcess {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl LlamaServerProcess {
    /// Spawn the server bound to 127.0.0.1 on the configured port.
    pub fn spawn(config: &LocalBackendConfig) -> anyhow::Result<Self> {
        if config.server_binary.trim().is_empty() {
            bail!("llama.cpp server binary is empty");
        }

        let mut command = Command::new(&config.server_binary);
        command
            .arg("--model")
            .arg(&config.model_path)
            .args(["--host", "127.0.0.1"])
            .arg("--port")
            .arg(config.port.to_string())
            .arg("--ctx-size")
            .arg(config.context_size.to_string());

        let process = Self::launch(command).with_context(|| {
            format!("failed to spawn llama.cpp server: {}", config.server_binary)
        })?;
        tracing::info!(
            pid = ?process.child.id(),
            port = config.port,
            binary = %config.server_binary,
            "llama.cpp server spawned"
        );
        Ok(process)
    }

    fn launch(mut command: Command) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(capture(pipe)));
        Ok(Self { child, stderr })
    }

    /// Ask the server to exit, escalating to SIGKILL after the grace period.
    pub async fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
            // SAFETY: signalling our own child by pid.
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }

        if tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await.is_err() {
            tracing::warn!("llama.cpp server ignored SIGTERM, killing");
            if let Err(error) = self.child.kill().await {
                tracing::warn!(%error, "failed to kill llama.cpp server");
            }
        }
        tracing::info!("llama.cpp server stopped");
    }

    /// Captured stderr. Only complete once the server has exited.
    pub async fn stderr_output(&mut self) -> String {
        match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Exit status if the server has already stopped.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }
}

/// Keep the head of the stream and discard the rest so the pipe never fills.
async fn capture(pipe: ChildStderr) -> String {
    let mut head = pipe.take(STDERR_CAPTURE_LIMIT);
    let mut buf = Vec::new();
    let _ = head.read_to_end(&mut buf).await;
    let _ = tokio::io::copy(&mut head.into_inner(), &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buf).into_owned()
}
