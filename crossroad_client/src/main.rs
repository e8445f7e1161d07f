//! Headless visual client.
//!
//! Usage:
//!   cargo run -p crossroad_client -- [--config client.json] [--url http://127.0.0.1:8585]
//!                                    [--step 2.0] [--frame-hz 60] [--timeout 5]
//!
//! Runs the step/interpolation loop against a simulation server and reports
//! scene changes through `tracing` (set `RUST_LOG=debug` to see every entity
//! update). Exits when the server stops the session, on transport failure or
//! on a protocol violation.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossroad_client::{
    protocol::ProtocolState,
    transport::{HttpTransport, Transport},
    SimulationClient,
};
use crossroad_shared::{config::ClientConfig, render::LogScene};
use tracing::{error, info};

/// Steps between two status lines.
const STATUS_EVERY: u64 = 10;

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ClientConfig::load(&args[i + 1])?,
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--url" if i + 1 < args.len() => {
                cfg.server_url = args[i + 1].clone();
                i += 2;
            }
            "--step" if i + 1 < args.len() => {
                cfg.step_duration_secs = args[i + 1].parse().context("--step")?;
                i += 2;
            }
            "--frame-hz" if i + 1 < args.len() => {
                cfg.frame_hz = args[i + 1].parse().context("--frame-hz")?;
                i += 2;
            }
            "--timeout" if i + 1 < args.len() => {
                cfg.request_timeout_secs = Some(args[i + 1].parse().context("--timeout")?);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        server = %cfg.server_url,
        step = cfg.step_duration(),
        frame_hz = cfg.frame_hz,
        "Starting client"
    );

    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::from_config(&cfg).context("transport")?);
    let mut sim = SimulationClient::from_config(&cfg, transport, LogScene::new());
    sim.start();

    let frame = cfg.frame_interval();
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(frame));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_reported = 0;

    loop {
        ticker.tick().await;

        if let Err(violation) = sim.poll_responses() {
            error!(error = %violation, "Simulation desynchronised");
            return Err(violation.into());
        }

        sim.advance(frame);

        let status = sim.status();
        if status.steps_applied >= last_reported + STATUS_EVERY {
            last_reported = status.steps_applied;
            info!(
                steps = status.steps_applied,
                signals = status.signals,
                vehicles = status.vehicles,
                "Status"
            );
        }

        match sim.state() {
            ProtocolState::Paused => {
                info!(steps = status.steps_applied, "Server ended the session");
                break;
            }
            ProtocolState::Stopped => {
                info!(steps = status.steps_applied, "Client stopped");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
