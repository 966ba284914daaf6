//! Worker-side runtime.
//!
//! A worker reads framed messages from stdin and writes frames to stdout;
//! stderr stays free for diagnostics. The contract:
//!
//! 1. Emit `READY` after initialization.
//! 2. Answer `PING` with `PONG`, echoing payload and `seq`.
//! 3. Exit 0 promptly on `SHUTDOWN`.
//! 4. Treat unknown types as no-ops; never crash on them.
//! 5. Emit events with a JSON payload that includes the worker's own id.
//!
//! The runtime also hosts the display side of the dashboard: it applies
//! `SURFACE_FULL` / `SURFACE_DELTA` updates to a local surface, adjusts its
//! camera on `CONFIG_UPDATE`, and answers `RENDER_REQUEST` with an
//! ANSI-rendered frame.

pub mod rpc;

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::MarigraphError;
use crate::ipc::frame::{encode_frame, Frame, FrameFlags, MessageType};
use crate::ipc::payload::{decode_surface, SurfaceDelta};
use crate::ipc::reader::FrameReader;
use crate::render::{render_surface, Projection, SceneOptions};
use crate::surface::Surface;
use crate::worker::rpc::RpcCommand;

/// Options delivered through `WORKER_OPTIONS` (UTF-8 JSON).
///
/// Unknown keys are ignored so templates can carry widget options the
/// runtime does not interpret.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Acknowledge every `SET_DATA` with an `ACK` echoing the payload.
    pub ack_data: bool,
    /// Listen for JSON-RPC on `{INSTANCE_DIR}/{WORKER_ID}.sock`.
    pub rpc: bool,
    /// Per-segment lighting when rendering.
    pub lighting: bool,
}

/// Identity and options resolved from the environment.
#[derive(Debug, Clone)]
pub struct WorkerEnv {
    pub id: String,
    pub options: WorkerOptions,
    pub instance_dir: Option<PathBuf>,
}

impl WorkerEnv {
    /// Read `WORKER_ID`, `WORKER_OPTIONS`, and `INSTANCE_DIR`.
    ///
    /// # Errors
    /// Returns [`MarigraphError::Config`] when `WORKER_ID` is missing or
    /// the options JSON is malformed.
    pub fn from_env() -> crate::error::Result<Self> {
        let id = std::env::var("WORKER_ID")
            .map_err(|_| MarigraphError::config("WORKER_ID is not set"))?;
        let options = match std::env::var("WORKER_OPTIONS") {
            Ok(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => WorkerOptions::default(),
        };
        let instance_dir = std::env::var_os("INSTANCE_DIR").map(PathBuf::from);
        Ok(Self {
            id,
            options,
            instance_dir,
        })
    }
}

struct WorkerState {
    id: String,
    options: WorkerOptions,
    surface: Option<Surface>,
    projection: Projection,
    stdout: tokio::io::Stdout,
}

enum Flow {
    Continue,
    Exit,
}

impl WorkerState {
    async fn send(
        &mut self,
        msg_type: MessageType,
        payload: &[u8],
        flags: FrameFlags,
        seq: u16,
    ) -> crate::error::Result<()> {
        let bytes = encode_frame(msg_type, payload, flags, seq)?;
        self.stdout.write_all(&bytes).await?;
        self.stdout.flush().await?;
        Ok(())
    }

    /// Emit an event frame; the payload always carries this worker's id.
    async fn emit_event(&mut self, event: &str, data: Value) -> crate::error::Result<()> {
        let Some(msg_type) = MessageType::from_name(event) else {
            warn!(event, "refusing to emit unknown event type");
            return Ok(());
        };
        let mut payload = match data {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };
        payload["column"] = json!(self.id);
        let bytes = serde_json::to_vec(&payload)?;
        self.send(msg_type, &bytes, FrameFlags::NONE, 0).await
    }

    async fn handle_frame(&mut self, frame: Frame) -> crate::error::Result<Flow> {
        let Some(msg_type) = frame.header.message_type() else {
            debug!(type_byte = frame.header.type_byte, "unknown type ignored");
            return Ok(Flow::Continue);
        };
        match msg_type {
            MessageType::Shutdown => {
                debug!(worker = %self.id, "shutdown received");
                return Ok(Flow::Exit);
            }
            MessageType::Ping => {
                self.send(
                    MessageType::Pong,
                    &frame.payload,
                    FrameFlags::RESPONSE,
                    frame.header.seq,
                )
                .await?;
            }
            MessageType::SurfaceFull => match decode_surface(&frame.payload) {
                Ok(surface) => {
                    debug!(nx = surface.nx(), ny = surface.ny(), "surface replaced");
                    self.surface = Some(surface);
                }
                Err(e) => {
                    self.report_error(&format!("bad surface payload: {e}")).await?;
                }
            },
            MessageType::SurfaceDelta => match SurfaceDelta::decode(&frame.payload) {
                Ok(delta) => {
                    if let Some(surface) = self.surface.as_mut() {
                        if let Err(e) = surface.apply_delta(&delta.updates) {
                            self.report_error(&format!("bad delta: {e}")).await?;
                        }
                    }
                }
                Err(e) => {
                    self.report_error(&format!("bad delta payload: {e}")).await?;
                }
            },
            MessageType::ConfigUpdate => {
                if let Ok(config) = serde_json::from_slice::<Value>(&frame.payload) {
                    let d_az = config["rotate"]["azimuth"].as_f64().unwrap_or(0.0);
                    let d_el = config["rotate"]["elevation"].as_f64().unwrap_or(0.0);
                    self.projection = self.projection.rotate(d_az, d_el);
                    if let Some(factor) = config["zoom"].as_f64() {
                        self.projection = self.projection.zoom_by(factor);
                    }
                }
            }
            MessageType::RenderRequest => {
                self.render_reply(&frame).await?;
            }
            MessageType::SetData => {
                if self.options.ack_data {
                    self.send(
                        MessageType::Ack,
                        &frame.payload,
                        FrameFlags::RESPONSE,
                        frame.header.seq,
                    )
                    .await?;
                }
            }
            // Init and the remaining widget directives have no runtime
            // behavior here; a richer widget host would interpret them.
            _ => {}
        }
        Ok(Flow::Continue)
    }

    async fn render_reply(&mut self, frame: &Frame) -> crate::error::Result<()> {
        let request: Value = serde_json::from_slice(&frame.payload).unwrap_or(json!({}));
        let width = request["width"].as_u64().unwrap_or(80) as usize;
        let height = request["height"].as_u64().unwrap_or(24) as usize;

        let Some(surface) = self.surface.as_ref() else {
            return self.report_error("render requested with no surface loaded").await;
        };
        let opts = SceneOptions {
            lighting: self.options.lighting,
            ..SceneOptions::default()
        };
        let buffer = render_surface(surface, &self.projection, &opts, width, height);
        let payload = json!({
            "column": self.id,
            "width": width,
            "height": height,
            "text": buffer.to_ansi(),
        });
        self.send(
            MessageType::RenderResult,
            &serde_json::to_vec(&payload)?,
            FrameFlags::RESPONSE,
            frame.header.seq,
        )
        .await
    }

    async fn report_error(&mut self, message: &str) -> crate::error::Result<()> {
        warn!(worker = %self.id, message, "reporting error upstream");
        let payload = json!({"column": self.id, "message": message});
        self.send(
            MessageType::Error,
            &serde_json::to_vec(&payload)?,
            FrameFlags::NONE,
            0,
        )
        .await
    }
}

/// Read stdin into frames on a dedicated task.
///
/// Corrupt frames are discarded and reading continues at the next header
/// boundary; unknown types flow through for the main loop to ignore.
fn spawn_stdin_reader(tx: mpsc::Sender<Frame>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut reader = FrameReader::new();
        let mut buf = vec![0u8; 8192];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    reader.append(&buf[..n]);
                    loop {
                        match reader.read() {
                            Ok(Some(frame)) => {
                                if tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => warn!(error = %e, "corrupt inbound frame discarded"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    })
}

/// Run the worker loop to completion.
///
/// Returns the process exit code: 0 after a `SHUTDOWN` or clean EOF.
///
/// # Errors
/// Returns [`MarigraphError::Config`] for a missing/invalid environment
/// and I/O errors writing to stdout.
pub async fn run() -> crate::error::Result<i32> {
    let env = WorkerEnv::from_env()?;
    debug!(worker = %env.id, "worker starting");

    let mut state = WorkerState {
        id: env.id.clone(),
        options: env.options.clone(),
        surface: None,
        projection: Projection::default(),
        stdout: tokio::io::stdout(),
    };

    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(64);
    let stdin_task = spawn_stdin_reader(frame_tx);

    let (rpc_tx, mut rpc_rx) = mpsc::channel::<RpcCommand>(64);
    // Hold a sender even with rpc disabled so the select arm below pends
    // instead of seeing a closed channel.
    let _rpc_keepalive = rpc_tx.clone();
    if env.options.rpc {
        if let Some(dir) = &env.instance_dir {
            let socket = dir.join(format!("{}.sock", env.id));
            tokio::spawn(async move {
                if let Err(e) = rpc::serve(socket, rpc_tx).await {
                    warn!(error = %e, "rpc endpoint stopped");
                }
            });
        } else {
            warn!("rpc requested but INSTANCE_DIR is not set");
        }
    }

    let ready_payload = serde_json::to_vec(&json!({"column": env.id}))?;
    state
        .send(MessageType::Ready, &ready_payload, FrameFlags::NONE, 0)
        .await?;

    loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if let Flow::Exit = state.handle_frame(frame).await? {
                            break;
                        }
                    }
                    // Supervisor closed our stdin: treat like SHUTDOWN.
                    None => break,
                }
            }
            command = rpc_rx.recv() => {
                if let Some(RpcCommand::EmitEvent { event, data }) = command {
                    state.emit_event(&event, data).await?;
                }
            }
        }
    }

    stdin_task.abort();
    debug!(worker = %env.id, "worker exiting");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_inert() {
        let options: WorkerOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.ack_data);
        assert!(!options.rpc);
        assert!(!options.lighting);
    }

    #[test]
    fn options_parse_probe_flags() {
        let options: WorkerOptions =
            serde_json::from_str(r#"{"ack_data":true,"lighting":true}"#).unwrap();
        assert!(options.ack_data);
        assert!(options.lighting);
        assert!(!options.rpc);
    }

    #[test]
    fn options_ignore_unknown_keys() {
        let options: WorkerOptions =
            serde_json::from_str(r#"{"rotate_deg":5,"interval_ms":200,"rpc":true}"#).unwrap();
        assert!(options.rpc);
    }
}
