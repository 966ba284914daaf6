//! Optional per-worker unix-socket endpoint.
//!
//! Line-delimited JSON-RPC 2.0 on `{INSTANCE_DIR}/{WORKER_ID}.sock`.
//! Requests carrying an `id` get a result or error line back;
//! notifications (no `id`) trigger a state change and produce no reply.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A state change requested over the socket, handled by the worker loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcCommand {
    /// Emit an event frame upstream on the worker's behalf.
    EmitEvent { event: String, data: Value },
}

#[derive(Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    id: Option<i64>,
}

fn error_reply(id: Value, code: i32, message: &str) -> String {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}).to_string()
}

fn result_reply(id: i64, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

/// Parse one request line into an optional command and an optional reply.
///
/// Kept free of I/O so the protocol is testable in isolation.
fn process_line(line: &str) -> (Option<RpcCommand>, Option<String>) {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(_) => {
            return (
                None,
                Some(error_reply(Value::Null, -32700, "parse error")),
            );
        }
    };

    match request.method.as_str() {
        "emit_event" => {
            let event = request.params["event"].as_str().unwrap_or_default().to_owned();
            if event.is_empty() {
                let reply = request
                    .id
                    .map(|id| error_reply(json!(id), -32602, "missing 'event' param"));
                return (None, reply);
            }
            let data = request.params.get("data").cloned().unwrap_or(json!({}));
            let reply = request.id.map(|id| result_reply(id, json!("ok")));
            (Some(RpcCommand::EmitEvent { event, data }), reply)
        }
        "ping" => {
            let reply = request.id.map(|id| result_reply(id, json!("pong")));
            (None, reply)
        }
        _ => {
            let reply = request
                .id
                .map(|id| error_reply(json!(id), -32601, "method not found"));
            (None, reply)
        }
    }
}

/// Accept connections on the worker socket forever.
///
/// Each connection gets its own task; commands funnel into the worker loop
/// through `tx`.
pub async fn serve(path: PathBuf, tx: mpsc::Sender<RpcCommand>) -> crate::error::Result<()> {
    let listener = UnixListener::bind(&path)?;
    debug!(socket = %path.display(), "rpc endpoint listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let (command, reply) = process_line(&line);
                        if let Some(command) = command {
                            if tx.send(command).await.is_err() {
                                return;
                            }
                        }
                        if let Some(reply) = reply {
                            if write_half.write_all(reply.as_bytes()).await.is_err()
                                || write_half.write_all(b"\n").await.is_err()
                            {
                                return;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        warn!(error = %e, "rpc connection read failed");
                        return;
                    }
                }
            }
        });
    }
}
