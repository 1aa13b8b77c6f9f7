//! JSON-RPC over a child process's stdio.
//!
//! Requests are written to stdin one per line. Replies are read from stdout
//! through a [`JsonFramer`], so a reply may arrive split across reads or
//! surrounded by log noise. A watcher task owns the `Child` and flags the
//! connection when the process exits; closing the connection asks the
//! watcher to kill it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::config::{OrchestratorSettings, ProcessTransportConfig, TransportKind};

use super::errors::ConnectionError;
use super::framer::JsonFramer;
use super::transport::{
    extract_result, next_request_id, tools_call_params, tools_from_list_result, Connection,
};
use super::types::{JsonRpcRequest, JsonRpcResponse, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST};

/// Size of each stdout read.
const READ_CHUNK: usize = 8192;

struct ProcessIo {
    stdin: ChildStdin,
    stdout: ChildStdout,
    framer: JsonFramer,
}

/// A tool server running as a child process.
pub struct ProcessConnection {
    server: String,
    /// Held for the whole write-then-read exchange.
    io: Mutex<ProcessIo>,
    exited: Arc<AtomicBool>,
    closed: AtomicBool,
    shutdown_tx: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    watcher: std::sync::Mutex<Option<JoinHandle<()>>>,
    discovery_timeout: Duration,
    shutdown_grace: Duration,
}

impl ProcessConnection {
    /// Start the process and wire up its pipes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        server: &str,
        config: &ProcessTransportConfig,
        settings: &OrchestratorSettings,
    ) -> Result<Self, ConnectionError> {
        let command = config.command.trim();
        if command.is_empty() {
            return Err(ConnectionError::InvalidDescriptor {
                server: server.to_string(),
                reason: "command is empty".into(),
            });
        }

        let mut cmd = Command::new(command);
        cmd.args(&config.args);
        cmd.envs(&config.env);
        if let Some(dir) = config.cwd.as_deref().filter(|d| !d.is_empty()) {
            cmd.current_dir(dir);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| ConnectionError::SpawnFailed {
            server: server.to_string(),
            reason: format!("{command}: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ConnectionError::SpawnFailed {
            server: server.to_string(),
            reason: "failed to capture stdin".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| ConnectionError::SpawnFailed {
            server: server.to_string(),
            reason: "failed to capture stdout".into(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let name = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %name, stderr = %line, "tool server stderr");
                }
            });
        }

        tracing::info!(server, command, pid = ?child.id(), "tool server process started");

        let exited = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch_process(
            server.to_string(),
            child,
            shutdown_rx,
            exited.clone(),
            settings.shutdown_grace(),
        ));

        Ok(Self {
            server: server.to_string(),
            io: Mutex::new(ProcessIo {
                stdin,
                stdout,
                framer: JsonFramer::new(settings.max_frame_bytes),
            }),
            exited,
            closed: AtomicBool::new(false),
            shutdown_tx: std::sync::Mutex::new(Some(shutdown_tx)),
            watcher: std::sync::Mutex::new(Some(watcher)),
            discovery_timeout: settings.process_discovery_timeout(),
            shutdown_grace: settings.shutdown_grace(),
        })
    }

    fn closed_error(&self) -> ConnectionError {
        ConnectionError::Closed {
            server: self.server.clone(),
        }
    }

    fn transport_error(&self, reason: String) -> ConnectionError {
        ConnectionError::Transport {
            server: self.server.clone(),
            reason,
        }
    }

    /// Write one request and read until the reply with the same id.
    ///
    /// Replies carrying other ids (left over from a call that timed out)
    /// and messages that are not responses are skipped.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ConnectionError> {
        if self.closed.load(Ordering::SeqCst) || self.exited.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        let id = next_request_id();
        let mut line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;

        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            while let Some(message) =
                io.framer
                    .next_value()
                    .map_err(|e| ConnectionError::FrameOverflow {
                        server: self.server.clone(),
                        buffered: e.buffered,
                        limit: e.limit,
                    })?
            {
                match serde_json::from_value::<JsonRpcResponse>(message) {
                    Ok(resp) if resp.id == Some(id) => return extract_result(&self.server, resp),
                    Ok(resp) => {
                        tracing::debug!(server = %self.server, expected = id, got = ?resp.id, "skipping unrelated reply");
                    }
                    Err(_) => {
                        tracing::debug!(server = %self.server, "skipping non-response message");
                    }
                }
            }

            let n = io
                .stdout
                .read(&mut chunk)
                .await
                .map_err(|e| self.transport_error(format!("failed to read from stdout: {e}")))?;
            if n == 0 {
                return Err(self.closed_error());
            }
            io.framer.push(&chunk[..n]);
        }
    }
}

/// Own the child until it exits or the connection asks for it to stop.
async fn watch_process(
    server: String,
    mut child: Child,
    shutdown_rx: oneshot::Receiver<()>,
    exited: Arc<AtomicBool>,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => tracing::warn!(server = %server, %status, "tool server process exited"),
                Err(e) => tracing::warn!(server = %server, error = %e, "failed to wait on tool server process"),
            }
        }
        // Fires on explicit close and when the connection is dropped.
        _ = shutdown_rx => {
            let _ = child.start_kill();
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(_) => tracing::debug!(server = %server, "tool server process stopped"),
                Err(_) => tracing::warn!(
                    server = %server,
                    grace_ms = grace.as_millis() as u64,
                    "tool server process did not exit after kill"
                ),
            }
        }
    }
    exited.store(true, Ordering::SeqCst);
}

#[async_trait]
impl Connection for ProcessConnection {
    fn kind(&self) -> TransportKind {
        TransportKind::Process
    }

    fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    async fn discover(&self) -> Result<Vec<serde_json::Value>, ConnectionError> {
        let result = self.request(METHOD_TOOLS_LIST, None).await?;
        tools_from_list_result(&self.server, result)
    }

    async fn call(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectionError> {
        self.request(METHOD_TOOLS_CALL, Some(tools_call_params(name, arguments)))
            .await
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let shutdown = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(tx) = shutdown {
            let _ = tx.send(());
        }

        let watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = watcher {
            // The watcher bounds its own wait by the grace period.
            let bound = self.shutdown_grace + Duration::from_millis(500);
            if tokio::time::timeout(bound, handle).await.is_err() {
                tracing::warn!(server = %self.server, "timed out waiting for process watcher");
            }
        }
        tracing::debug!(server = %self.server, "process connection closed");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
