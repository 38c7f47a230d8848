//! Plugin subprocess lifecycle

use crate::error::{PluginError, Result};
use crate::handshake::{Handshake, SUPPORTED_PROTOCOL_VERSIONS, plugin_env};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// How long an exiting plugin is given before it is killed
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Number of trailing stderr lines kept for launch error messages
const STDERR_TAIL_LINES: usize = 20;

/// Lifecycle state of a plugin process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unstarted,
    Launching,
    Ready,
    Terminated,
}

impl PluginState {
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Unstarted, Launching) | (Launching, Ready) | (Launching, Terminated) | (Ready, Terminated)
        )
    }
}

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// A running provider binary that completed the go-plugin handshake
pub struct PluginProcess {
    name: String,
    child: Child,
    state: PluginState,
    handshake: Option<Handshake>,
    /// Private directory for the plugin's unix socket, removed on termination
    socket_dir: Option<TempDir>,
}

impl PluginProcess {
    /// Start the binary at `path` and wait up to `timeout` for its handshake.
    ///
    /// `client_cert_pem` is handed to the plugin so it serves TLS and only
    /// accepts that certificate. On any failure the child is killed and its
    /// socket directory removed before the error is returned.
    pub async fn launch(
        name: &str,
        path: &Path,
        protocol_version: u32,
        client_cert_pem: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&protocol_version) {
            return Err(PluginError::ProtocolMismatch {
                expected: format!("protocol version {:?}", SUPPORTED_PROTOCOL_VERSIONS),
                got: format!("protocol version {}", protocol_version),
            });
        }

        let socket_dir = create_socket_dir()?;

        let mut cmd = Command::new(path);
        cmd.envs(plugin_env(protocol_version, client_cert_pem, Some(socket_dir.path())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| PluginError::Spawn {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            "started plugin {} from {} (pid {:?})",
            name,
            path.display(),
            child.id()
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut process = Self {
            name: name.to_string(),
            child,
            state: PluginState::Unstarted,
            handshake: None,
            socket_dir: Some(socket_dir),
        };
        process.transition(PluginState::Launching)?;

        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            process.kill().await;
            return Err(PluginError::Handshake(
                "failed to capture plugin output".to_string(),
            ));
        };

        let tail: StderrTail = Arc::new(Mutex::new(VecDeque::new()));
        let stderr_task = tokio::spawn(forward_stderr(name.to_string(), stderr, tail.clone()));

        let mut lines = BufReader::new(stdout).lines();
        match process
            .read_handshake(&mut lines, protocol_version, timeout, stderr_task, &tail)
            .await
        {
            Ok(handshake) => {
                tracing::debug!("plugin {} listening on {}", name, handshake.address);
                process.handshake = Some(handshake);
                process.transition(PluginState::Ready)?;
                tokio::spawn(forward_stdout(name.to_string(), lines));
                Ok(process)
            }
            Err(err) => {
                process.kill().await;
                Err(err)
            }
        }
    }

    async fn read_handshake(
        &mut self,
        lines: &mut Lines<BufReader<ChildStdout>>,
        protocol_version: u32,
        timeout: Duration,
        stderr_task: tokio::task::JoinHandle<()>,
        tail: &StderrTail,
    ) -> Result<Handshake> {
        let line = match tokio::time::timeout(timeout, lines.next_line()).await {
            Err(_) => return Err(PluginError::HandshakeTimeout(timeout)),
            Ok(Err(e)) => return Err(PluginError::Io(e)),
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                let status = match tokio::time::timeout(Duration::from_secs(1), self.child.wait()).await
                {
                    Ok(Ok(status)) => status.to_string(),
                    _ => "unknown exit status".to_string(),
                };
                // stderr reaches EOF once the process is gone
                let _ = tokio::time::timeout(Duration::from_secs(1), stderr_task).await;
                return Err(PluginError::ExitedEarly {
                    status,
                    stderr: tail_message(tail),
                });
            }
        };

        Handshake::parse(&line, protocol_version)
    }

    fn transition(&mut self, next: PluginState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PluginError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("plugin {}: {:?} -> {:?}", self.name, self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PluginState::Ready
    }

    /// Handshake announced by the plugin; present once ready
    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.as_ref()
    }

    /// Directory the plugin was told to put its unix socket in
    pub fn socket_dir(&self) -> Option<&Path> {
        self.socket_dir.as_ref().map(|dir| dir.path())
    }

    /// Wait up to `grace` for the plugin to exit on its own, then kill it.
    ///
    /// Terminating an already terminated plugin is a no-op.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.state == PluginState::Terminated {
            return Ok(());
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("plugin {} exited ({})", self.name, status),
            _ => {
                tracing::debug!("plugin {} did not exit in time, killing it", self.name);
                if let Err(e) = self.child.kill().await {
                    tracing::warn!("failed to kill plugin {}: {}", self.name, e);
                }
            }
        }

        self.remove_socket_dir();
        self.transition(PluginState::Terminated)
    }

    async fn kill(&mut self) {
        let _ = self.child.kill().await;
        self.remove_socket_dir();
        if self.state.can_transition_to(PluginState::Terminated) {
            self.state = PluginState::Terminated;
        }
    }

    fn remove_socket_dir(&mut self) {
        if let Some(dir) = self.socket_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove plugin socket dir {}: {}", path.display(), e);
            }
        }
    }
}

/// Temp directory only the current user can enter
fn create_socket_dir() -> Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("terradozer-plugin")
        .tempdir()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(dir)
}

async fn forward_stdout(name: String, mut lines: Lines<BufReader<ChildStdout>>) {
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "plugin", "{}: {}", name, line);
    }
}

async fn forward_stderr(name: String, stderr: ChildStderr, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "plugin", "{}: {}", name, line);
        if let Ok(mut tail) = tail.lock() {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }
}

fn tail_message(tail: &StderrTail) -> String {
    match tail.lock() {
        Ok(tail) if !tail.is_empty() => {
            format!(": {}", tail.iter().cloned().collect::<Vec<_>>().join("; "))
        }
        _ => String::new(),
    }
}
