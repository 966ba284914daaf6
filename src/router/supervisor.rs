//! Worker supervisor: startup handshake, frame dispatch, and shutdown.
//!
//! The supervisor owns every worker subprocess. One reader task per worker
//! stdout feeds a single dispatch queue; the wiring table is consulted
//! under a short mutex so `WIRING_UPDATE` swaps serialize with dispatch.
//! Per-worker failures are reported and contained; the rest of the
//! dashboard keeps running.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::ChildStdout;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::MarigraphError;
use crate::ipc::frame::{Frame, FrameFlags, MessageType};
use crate::ipc::reader::FrameReader;
use crate::router::wiring::{Template, WiringRule};
use crate::router::worker::{WorkerCommand, WorkerHandle};

/// Default handshake deadline.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default grace period before a straggler is killed at shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// Dispatch queue capacity, in frames across all workers.
const DISPATCH_QUEUE_FRAMES: usize = 1024;
/// Read chunk size for worker stdout.
const READ_CHUNK: usize = 8192;

/// Supervisor tuning knobs.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub ready_timeout: Duration,
    pub shutdown_grace: Duration,
    /// How worker processes are launched.
    pub command: WorkerCommand,
}

impl SupervisorConfig {
    pub fn new(command: WorkerCommand) -> Self {
        Self {
            ready_timeout: READY_TIMEOUT,
            shutdown_grace: SHUTDOWN_GRACE,
            command,
        }
    }
}

/// What a single dispatch step did, for callers that observe the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A worker completed its handshake.
    Ready { worker: String },
    /// An event was routed through the wiring table.
    Event {
        source: String,
        event: MessageType,
        targets: Vec<String>,
    },
    /// A `PONG` was recorded for `seq` correlation.
    Pong { source: String, seq: u16 },
    /// A worker reported an `ERROR` frame.
    WorkerError { source: String },
    /// The wiring table was swapped.
    WiringUpdated { rules: usize },
    /// A registered per-worker/per-type handler consumed the frame.
    Handled { source: String, type_byte: u8 },
    /// No route and no handler; the frame was dropped.
    Dropped { source: String, type_byte: u8 },
    /// A worker's stdout reached EOF.
    WorkerExited { worker: String },
    /// Every reader task has finished; no more frames will arrive.
    QueueClosed,
}

enum Inbound {
    Frame(String, Frame),
    Eof(String),
}

type Handler = Box<dyn FnMut(&Frame) + Send>;

/// Owner of the worker fleet and the dispatch loop.
pub struct Supervisor {
    workers: HashMap<String, WorkerHandle>,
    /// Spawn order, for deterministic broadcast fan-out.
    order: Vec<String>,
    wiring: Arc<Mutex<Vec<WiringRule>>>,
    inbound: mpsc::Receiver<Inbound>,
    handlers: HashMap<(String, u8), Handler>,
    pongs: HashMap<u16, Vec<u8>>,
    next_seq: u16,
    instance_dir: TempDir,
    reader_tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn every column of a template and complete the READY handshake.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Worker`] if a spawn fails and
    /// [`MarigraphError::Timeout`] naming the laggards if any worker misses
    /// the handshake deadline.
    pub async fn start(template: &Template, config: &SupervisorConfig) -> crate::error::Result<Self> {
        let instance_dir = tempfile::Builder::new()
            .prefix("marigraph-")
            .tempdir()?;
        let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_FRAMES);

        let mut workers = HashMap::new();
        let mut order = Vec::new();
        let mut reader_tasks = Vec::new();
        for column in &template.columns {
            let (handle, stdout) =
                WorkerHandle::spawn(column, &config.command, instance_dir.path())?;
            reader_tasks.push(spawn_reader(column.id.clone(), stdout, tx.clone()));
            order.push(column.id.clone());
            workers.insert(column.id.clone(), handle);
        }
        drop(tx);

        let mut supervisor = Self {
            workers,
            order,
            wiring: Arc::new(Mutex::new(template.wiring.clone())),
            inbound: rx,
            handlers: HashMap::new(),
            pongs: HashMap::new(),
            next_seq: 1,
            instance_dir,
            reader_tasks,
        };
        supervisor.await_ready(config.ready_timeout).await?;
        info!(
            workers = supervisor.order.len(),
            template = %template.name,
            "all workers ready"
        );
        Ok(supervisor)
    }

    async fn await_ready(&mut self, deadline: Duration) -> crate::error::Result<()> {
        let start = tokio::time::Instant::now();
        while !self.all_ready() {
            let remaining = deadline.checked_sub(start.elapsed()).unwrap_or_default();
            if remaining.is_zero() {
                return Err(self.ready_timeout_error(deadline));
            }
            match tokio::time::timeout(remaining, self.dispatch_next()).await {
                Ok(Ok(Dispatched::QueueClosed)) => {
                    return Err(MarigraphError::Worker {
                        id: self.not_ready_ids().join(", "),
                        message: "exited before completing the READY handshake".into(),
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(self.ready_timeout_error(deadline)),
            }
        }
        Ok(())
    }

    fn ready_timeout_error(&self, deadline: Duration) -> MarigraphError {
        MarigraphError::Timeout {
            message: format!(
                "workers not ready: {}",
                self.not_ready_ids().join(", ")
            ),
            millis: deadline.as_millis() as u64,
        }
    }

    fn not_ready_ids(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| !self.workers[*id].is_ready())
            .cloned()
            .collect()
    }

    fn all_ready(&self) -> bool {
        self.workers.values().all(WorkerHandle::is_ready)
    }

    /// Whether a specific worker has completed its handshake.
    pub fn is_ready(&self, id: &str) -> bool {
        self.workers.get(id).is_some_and(WorkerHandle::is_ready)
    }

    /// Ids of all workers in spawn order.
    pub fn worker_ids(&self) -> &[String] {
        &self.order
    }

    /// The per-instance working directory hosting worker sockets.
    pub fn instance_dir(&self) -> &Path {
        self.instance_dir.path()
    }

    /// Register a callback for `(worker, message type)` frames that have no
    /// built-in route.
    pub fn register_handler(
        &mut self,
        worker: &str,
        msg_type: MessageType,
        handler: impl FnMut(&Frame) + Send + 'static,
    ) {
        self.handlers
            .insert((worker.to_owned(), msg_type as u8), Box::new(handler));
    }

    /// Replace the wiring table.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Config`] if a rule references an unknown
    /// worker or event; the old table stays in place.
    pub fn update_wiring(&self, rules: Vec<WiringRule>) -> crate::error::Result<()> {
        for rule in &rules {
            if !self.workers.contains_key(&rule.on.column) {
                return Err(MarigraphError::config(format!(
                    "wiring source '{}' is not a running worker",
                    rule.on.column
                )));
            }
            if rule.action.column != "*" && !self.workers.contains_key(&rule.action.column) {
                return Err(MarigraphError::config(format!(
                    "wiring target '{}' is not a running worker",
                    rule.action.column
                )));
            }
            if MessageType::from_name(&rule.on.event).is_none()
                || MessageType::from_name(&rule.action.action).is_none()
            {
                return Err(MarigraphError::config(
                    "wiring rule names an unknown event or action".to_string(),
                ));
            }
        }
        *self.wiring.lock() = rules;
        Ok(())
    }

    /// Encode and send one frame to one worker.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Worker`] for unknown ids or a stopped
    /// worker.
    pub async fn send_to_column(
        &self,
        id: &str,
        msg_type: MessageType,
        payload: &[u8],
        flags: FrameFlags,
        seq: u16,
    ) -> crate::error::Result<()> {
        let worker = self.workers.get(id).ok_or_else(|| MarigraphError::Worker {
            id: id.to_owned(),
            message: "unknown worker".into(),
        })?;
        worker.send(msg_type, payload, flags, seq).await
    }

    /// Send one frame to every worker, in spawn order.
    ///
    /// Per-worker failures are logged, not propagated.
    pub async fn broadcast(&self, msg_type: MessageType, payload: &[u8]) {
        for id in &self.order {
            if let Some(worker) = self.workers.get(id) {
                if let Err(e) = worker
                    .send(msg_type, payload, FrameFlags::BROADCAST, 0)
                    .await
                {
                    warn!(worker = %id, error = %e, "broadcast send failed");
                }
            }
        }
    }

    /// Round-trip a `PING` to one worker, returning the echoed payload.
    ///
    /// Uses the frame `seq` for correlation; other frames arriving in the
    /// meantime are dispatched normally.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Timeout`] when no matching `PONG` arrives
    /// in time.
    pub async fn ping(
        &mut self,
        id: &str,
        payload: &[u8],
        deadline: Duration,
    ) -> crate::error::Result<Vec<u8>> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1).max(1);
        self.send_to_column(id, MessageType::Ping, payload, FrameFlags::REQUEST, seq)
            .await?;

        let start = tokio::time::Instant::now();
        loop {
            if let Some(echo) = self.pongs.remove(&seq) {
                return Ok(echo);
            }
            let remaining = deadline.checked_sub(start.elapsed()).unwrap_or_default();
            if remaining.is_zero() {
                return Err(MarigraphError::Timeout {
                    message: format!("no PONG from '{id}' for seq {seq}"),
                    millis: deadline.as_millis() as u64,
                });
            }
            match tokio::time::timeout(remaining, self.dispatch_next()).await {
                Ok(Ok(Dispatched::QueueClosed)) => {
                    return Err(MarigraphError::Worker {
                        id: id.to_owned(),
                        message: "worker stream closed while waiting for PONG".into(),
                    });
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(MarigraphError::Timeout {
                        message: format!("no PONG from '{id}' for seq {seq}"),
                        millis: deadline.as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Receive and dispatch the next inbound frame.
    ///
    /// Protocol errors inside a worker stream are contained by the reader
    /// tasks; this only fails on send errors to *other* workers, which are
    /// logged and reported per worker, never escalated.
    pub async fn dispatch_next(&mut self) -> crate::error::Result<Dispatched> {
        match self.inbound.recv().await {
            None => Ok(Dispatched::QueueClosed),
            Some(Inbound::Eof(worker)) => {
                warn!(worker = %worker, "stdout closed");
                if let Some(handle) = self.workers.get_mut(&worker) {
                    if let Some(code) = handle.try_exit_code() {
                        warn!(worker = %worker, code, "worker exited");
                    }
                }
                Ok(Dispatched::WorkerExited { worker })
            }
            Some(Inbound::Frame(source, frame)) => self.handle_frame(source, frame).await,
        }
    }

    async fn handle_frame(
        &mut self,
        source: String,
        frame: Frame,
    ) -> crate::error::Result<Dispatched> {
        let Some(msg_type) = frame.header.message_type() else {
            debug!(worker = %source, type_byte = frame.header.type_byte, "unknown frame type dropped");
            return Ok(Dispatched::Dropped {
                source,
                type_byte: frame.header.type_byte,
            });
        };

        match msg_type {
            MessageType::Ready => {
                if let Some(worker) = self.workers.get(&source) {
                    worker.mark_ready();
                }
                debug!(worker = %source, "ready");
                Ok(Dispatched::Ready { worker: source })
            }
            MessageType::Error => {
                warn!(
                    worker = %source,
                    payload = %String::from_utf8_lossy(&frame.payload),
                    "worker reported an error"
                );
                Ok(Dispatched::WorkerError { source })
            }
            MessageType::Pong => {
                self.pongs.insert(frame.header.seq, frame.payload);
                Ok(Dispatched::Pong {
                    source,
                    seq: frame.header.seq,
                })
            }
            MessageType::WiringUpdate => {
                // A bad update is contained: log, keep the old table.
                let swapped = serde_json::from_slice::<Vec<WiringRule>>(&frame.payload)
                    .map_err(MarigraphError::from)
                    .and_then(|rules| {
                        let count = rules.len();
                        self.update_wiring(rules).map(|()| count)
                    });
                match swapped {
                    Ok(count) => {
                        info!(rules = count, from = %source, "wiring table updated");
                        Ok(Dispatched::WiringUpdated { rules: count })
                    }
                    Err(e) => {
                        warn!(from = %source, error = %e, "wiring update rejected");
                        Ok(Dispatched::Dropped {
                            source,
                            type_byte: MessageType::WiringUpdate as u8,
                        })
                    }
                }
            }
            t if t.is_event() => {
                let targets = self.route_event(&source, t, &frame).await;
                Ok(Dispatched::Event {
                    source,
                    event: t,
                    targets,
                })
            }
            _ => {
                if let Some(handler) = self
                    .handlers
                    .get_mut(&(source.clone(), frame.header.type_byte))
                {
                    handler(&frame);
                    Ok(Dispatched::Handled {
                        source,
                        type_byte: frame.header.type_byte,
                    })
                } else {
                    debug!(worker = %source, r#type = msg_type.name(), "unrouted frame dropped");
                    Ok(Dispatched::Dropped {
                        source,
                        type_byte: frame.header.type_byte,
                    })
                }
            }
        }
    }

    /// Consult the wiring table and forward the event payload.
    ///
    /// Rule firing follows table order; `(target, action)` duplicates are
    /// removed; `*` fans out to every worker except the source.
    async fn route_event(&self, source: &str, event: MessageType, frame: &Frame) -> Vec<String> {
        let sends: Vec<(String, MessageType, FrameFlags)> = {
            let table = self.wiring.lock();
            let mut sends = Vec::new();
            for rule in Template::matching_rules(&table, source, event.name()) {
                let action_type = rule.action_type();
                if rule.action.column == "*" {
                    for id in &self.order {
                        if id != source
                            && !sends
                                .iter()
                                .any(|(t, a, _)| t == id && *a == action_type)
                        {
                            sends.push((id.clone(), action_type, FrameFlags::BROADCAST));
                        }
                    }
                } else if !sends
                    .iter()
                    .any(|(t, a, _)| *t == rule.action.column && *a == action_type)
                {
                    sends.push((rule.action.column.clone(), action_type, FrameFlags::NONE));
                }
            }
            sends
        };

        let mut delivered = Vec::with_capacity(sends.len());
        for (target, action_type, flags) in sends {
            if let Some(worker) = self.workers.get(&target) {
                match worker
                    .send(action_type, &frame.payload, flags, frame.header.seq)
                    .await
                {
                    Ok(()) => delivered.push(target),
                    Err(e) => warn!(worker = %target, error = %e, "event forward failed"),
                }
            }
        }
        debug!(
            source = %source,
            event = event.name(),
            targets = ?delivered,
            "event routed"
        );
        delivered
    }

    /// Broadcast `SHUTDOWN`, await exits within the grace period, kill
    /// stragglers, and remove the instance directory.
    pub async fn shutdown(mut self, config: &SupervisorConfig) -> crate::error::Result<()> {
        info!("shutting down workers");
        self.broadcast(
            MessageType::Shutdown,
            br#"{"reason":"shutdown"}"#,
        )
        .await;

        for id in std::mem::take(&mut self.order) {
            if let Some(mut worker) = self.workers.remove(&id) {
                match worker.wait_or_kill(config.shutdown_grace).await {
                    Some(0) => debug!(worker = %id, "exited cleanly"),
                    Some(code) => warn!(worker = %id, code, "exited with non-zero code"),
                    None => {}
                }
            }
        }
        for task in self.reader_tasks.drain(..) {
            task.abort();
        }
        self.instance_dir.close()?;
        Ok(())
    }
}

/// Read a worker's stdout into frames and feed the dispatch queue.
///
/// Corrupt frames are discarded with a diagnostic; reading resumes at the
/// next header boundary. EOF enqueues a terminal marker.
fn spawn_reader(
    id: String,
    mut stdout: ChildStdout,
    tx: mpsc::Sender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = FrameReader::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    reader.append(&buf[..n]);
                    loop {
                        match reader.read() {
                            Ok(Some(frame)) => {
                                if tx.send(Inbound::Frame(id.clone(), frame)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                warn!(worker = %id, error = %e, "corrupt frame discarded");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(worker = %id, error = %e, "stdout read failed");
                    break;
                }
            }
        }
        let _ = tx.send(Inbound::Eof(id)).await;
    })
}
