//! Worker subprocess handles.
//!
//! A [`WorkerHandle`] owns a spawned worker: its child process, the ready
//! flag, and a bounded outbound queue drained by a dedicated stdin writer
//! task. Frames are enqueued whole; under sustained overload, event-class
//! frames are dropped whole rather than blocking dispatch, so a receiver
//! never sees a torn frame.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::MarigraphError;
use crate::ipc::frame::{encode_frame, FrameFlags, MessageType};
use crate::router::wiring::Column;

/// Outbound queue capacity per worker, in frames.
pub const OUTBOUND_QUEUE_FRAMES: usize = 256;

/// How the supervisor launches worker processes.
///
/// Defaults to re-executing the current binary in worker mode; tests point
/// this at a specific binary path.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Launch the running executable with the `worker` subcommand.
    pub fn current_exe() -> crate::error::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec!["worker".into()],
        })
    }

    /// Launch a specific program (integration tests, external workers).
    pub fn program(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: path.into(),
            args,
        }
    }
}

/// A live worker subprocess owned by the supervisor.
#[derive(Debug)]
pub struct WorkerHandle {
    id: String,
    kind: String,
    child: Child,
    outbound: mpsc::Sender<Vec<u8>>,
    ready: Arc<AtomicBool>,
}

impl WorkerHandle {
    /// Spawn a worker for a template column.
    ///
    /// stdin/stdout are piped for framing; stderr passes through as
    /// diagnostic text. The worker learns its identity and options from
    /// `WORKER_ID`, `WORKER_OPTIONS`, and `INSTANCE_DIR`.
    ///
    /// Returns the handle and the child's stdout for the caller's reader
    /// task.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Worker`] when the process cannot be
    /// spawned or its pipes are missing.
    pub fn spawn(
        column: &Column,
        command: &WorkerCommand,
        instance_dir: &Path,
    ) -> crate::error::Result<(Self, ChildStdout)> {
        let options_json = serde_json::to_string(&column.options)?;
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .env("WORKER_ID", &column.id)
            .env("WORKER_OPTIONS", &options_json)
            .env("INSTANCE_DIR", instance_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MarigraphError::Worker {
                id: column.id.clone(),
                message: format!("spawn failed: {e}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| MarigraphError::Worker {
            id: column.id.clone(),
            message: "stdin pipe missing".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| MarigraphError::Worker {
            id: column.id.clone(),
            message: "stdout pipe missing".into(),
        })?;

        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
        tokio::spawn(writer_loop(column.id.clone(), stdin, rx));

        debug!(worker = %column.id, kind = %column.kind, "worker spawned");
        Ok((
            Self {
                id: column.id.clone(),
                kind: column.kind.clone(),
                child,
                outbound: tx,
                ready: Arc::new(AtomicBool::new(false)),
            },
            stdout,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub(crate) fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Encode and enqueue a frame for this worker's stdin.
    ///
    /// Event-class frames are dropped (whole) when the queue is full; all
    /// other types apply backpressure.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Worker`] once the writer task has stopped
    /// (worker exited or its stdin closed).
    pub async fn send(
        &self,
        msg_type: MessageType,
        payload: &[u8],
        flags: FrameFlags,
        seq: u16,
    ) -> crate::error::Result<()> {
        let bytes = encode_frame(msg_type, payload, flags, seq)?;
        if msg_type.is_event() {
            match self.outbound.try_send(bytes) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(worker = %self.id, r#type = msg_type.name(), "outbound queue full, event dropped");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(self.gone()),
            }
        } else {
            self.outbound
                .send(bytes)
                .await
                .map_err(|_| self.gone())
        }
    }

    fn gone(&self) -> MarigraphError {
        MarigraphError::Worker {
            id: self.id.clone(),
            message: "stdin writer stopped".into(),
        }
    }

    /// Await exit within the grace period; kill on expiry.
    ///
    /// Returns the exit code when the worker exited by itself.
    pub async fn wait_or_kill(&mut self, grace: Duration) -> Option<i32> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(e)) => {
                warn!(worker = %self.id, error = %e, "wait failed");
                None
            }
            Err(_) => {
                warn!(worker = %self.id, "did not exit within grace period, killing");
                let _ = self.child.kill().await;
                None
            }
        }
    }

    /// Whether the process has already exited, and its code if so.
    pub fn try_exit_code(&mut self) -> Option<i32> {
        self.child.try_wait().ok().flatten().and_then(|s| s.code())
    }
}

async fn writer_loop(
    id: String,
    mut stdin: tokio::process::ChildStdin,
    mut rx: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = stdin.write_all(&bytes).await {
            warn!(worker = %id, error = %e, "stdin write failed");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!(worker = %id, error = %e, "stdin flush failed");
            break;
        }
    }
    debug!(worker = %id, "stdin writer stopped");
}
