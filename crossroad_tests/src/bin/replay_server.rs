//! Scripted simulation server.
//!
//! Usage:
//!   cargo run -p crossroad_tests --bin replay_server -- [--addr 127.0.0.1:8585]
//!
//! Serves a short recorded intersection session to `crossroad-client`, then
//! answers every further request with a stop order.

use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use crossroad_tests::{Replay, StubServer};
use tracing::info;

fn parse_args() -> anyhow::Result<SocketAddr> {
    let args: Vec<String> = env::args().collect();
    let mut addr = "127.0.0.1:8585".to_string();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                addr = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    addr.parse().with_context(|| format!("invalid --addr {addr}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = parse_args()?;
    let replay = Replay::demo()?;
    info!(steps = replay.remaining(), "Loaded replay");

    let mut server = StubServer::bind(addr, replay.into_handler()).await?;
    info!(url = %server.url(), "Replay server listening");
    server.wait().await
}
