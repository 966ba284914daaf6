//! marigraph CLI: dashboard supervisor and worker entry points.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use marigraph::analytics::{self, SviParams};
use marigraph::ipc::{encode_surface, FrameFlags, MessageType};
use marigraph::router::{Supervisor, SupervisorConfig, Template, WorkerCommand};
use marigraph::surface::{compute_slope, AxisLabels, Surface};

/// Auto-rotation step applied to surface columns, degrees.
const ROTATE_STEP_DEG: f64 = 5.0;
/// Auto-rotation cadence.
const ROTATE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "marigraph")]
#[command(version)]
#[command(about = "Terminal dashboard for time-indexed volatility surfaces")]
struct Cli {
    /// Template file describing columns and wiring (JSON).
    #[arg(short, long, value_name = "PATH")]
    template: Option<PathBuf>,

    /// Run without attaching a display (no render loop).
    #[arg(long)]
    headless: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Internal: run as a worker process (spawned by the supervisor).
    #[command(hide = true)]
    Worker,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Worker logs must not pollute the framed stdout stream.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Some(Commands::Worker) => run_worker().await,
        None => run_dashboard(cli).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("marigraph: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_worker() -> anyhow::Result<ExitCode> {
    let code = marigraph::worker::run().await.context("worker failed")?;
    Ok(if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Built-in single-chart template used when no file is given.
fn demo_template() -> anyhow::Result<Template> {
    Template::from_json(
        r#"{
            "name": "demo",
            "columns": [
                {"id": "chart", "type": "surface3d", "options": {"lighting": false}},
                {"id": "risk", "type": "metrics", "options": {}}
            ],
            "wiring": [
                {"on": {"column": "chart", "event": "SELECTED"},
                 "do": {"column": "risk", "action": "SET_DATA"}}
            ]
        }"#,
    )
    .context("built-in demo template")
}

/// Synthetic SVI-driven surface for the demo dashboard.
fn demo_surface() -> anyhow::Result<Surface> {
    let expiries = marigraph::grid::linspace(0.1, 2.0, 12)?;
    let strikes = marigraph::grid::linspace(70.0, 130.0, 16)?;
    let smile = SviParams::new(0.02, 0.35, -0.45, 0.0, 0.2)?;
    let surface = Surface::from_fn(
        expiries,
        strikes,
        AxisLabels::default(),
        |t, strike| {
            let k = (strike / 100.0_f64).ln();
            smile.implied_vol(k, t.max(1e-6)).0
        },
    )?;
    Ok(surface)
}

async fn run_dashboard(cli: Cli) -> anyhow::Result<ExitCode> {
    let template = match &cli.template {
        Some(path) => Template::load(path)
            .with_context(|| format!("loading template {}", path.display()))?,
        None => demo_template()?,
    };

    let config = SupervisorConfig::new(WorkerCommand::current_exe()?);
    let mut supervisor = Supervisor::start(&template, &config)
        .await
        .context("supervisor startup")?;
    info!(workers = supervisor.worker_ids().len(), "dashboard up");

    // Seed every surface column and log the derived risk picture once.
    let surface = demo_surface()?;
    let metrics = analytics::risk_metrics(&compute_slope(&surface));
    info!(
        risk_score = metrics.risk_score,
        max_slope = metrics.max_slope,
        "initial surface analytics"
    );
    let surface_payload = encode_surface(&surface)?;
    let chart_ids: Vec<String> = template
        .columns
        .iter()
        .filter(|c| c.kind == "surface3d")
        .map(|c| c.id.clone())
        .collect();
    for id in &chart_ids {
        supervisor
            .send_to_column(id, MessageType::SurfaceFull, &surface_payload, FrameFlags::NONE, 0)
            .await?;
    }

    if !cli.headless {
        for id in &chart_ids {
            supervisor.register_handler(id, MessageType::RenderResult, |frame| {
                if let Ok(body) = serde_json::from_slice::<serde_json::Value>(&frame.payload) {
                    if let Some(text) = body["text"].as_str() {
                        use std::io::Write;
                        // Repaint from the top-left without clearing scrollback.
                        print!("\x1b[H{text}");
                        let _ = std::io::stdout().flush();
                    }
                }
            });
        }
    }

    let rotate_payload = serde_json::to_vec(&json!({
        "rotate": {"azimuth": ROTATE_STEP_DEG, "elevation": 0.0}
    }))?;
    let render_payload = serde_json::to_vec(&json!({"width": 80, "height": 24}))?;
    let mut ticker = tokio::time::interval(ROTATE_INTERVAL);
    let mut render_seq: u16 = 1;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            outcome = supervisor.dispatch_next() => {
                match outcome {
                    Ok(marigraph::router::Dispatched::QueueClosed) => {
                        warn!("all workers gone, stopping");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "dispatch error"),
                }
            }
            _ = ticker.tick(), if !cli.headless => {
                render_seq = render_seq.wrapping_add(1).max(1);
                for id in &chart_ids {
                    let _ = supervisor
                        .send_to_column(id, MessageType::ConfigUpdate, &rotate_payload, FrameFlags::NONE, 0)
                        .await;
                    let _ = supervisor
                        .send_to_column(id, MessageType::RenderRequest, &render_payload, FrameFlags::REQUEST, render_seq)
                        .await;
                }
            }
        }
    }

    supervisor.shutdown(&config).await.context("shutdown")?;
    Ok(ExitCode::SUCCESS)
}
