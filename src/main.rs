// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use quizgate::config::{self, ConfigSource};
use quizgate::proxy;
use quizgate::upstream::ReqwestHttpSender;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often idle quiz sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser)]
#[command(name = "quizgate-engine", about = "Quiz chat router and streaming gateway")]
struct Cli {
    /// Path to the quizgate.yaml config file
    #[arg(long, default_value = "quizgate.yaml", env = "QUIZGATE_CONFIG")]
    config: String,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "QUIZGATE_HOST")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 9810, env = "QUIZGATE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let addr = SocketAddr::new(cli.host, cli.port);
    tracing::info!(%addr, "quizgate starting");

    let source = config::FileSource {
        path: std::path::PathBuf::from(cli.config),
    };
    let config = match config::load_config(&source) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        source = %source.describe(),
        version = %config.version,
        environment = %config.environment,
        premium_models = config.models.premium.len(),
        fallback_models = config.models.fallback.len(),
        platform_key = config.upstream.platform_key.is_some(),
        byok = config.byok_encryption_key.is_some(),
        config_hash = %config.config_hash,
        "config loaded"
    );

    let client = match reqwest::Client::builder().build() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let http = Arc::new(ReqwestHttpSender::new(client));
    let state = match proxy::AppState::in_memory(config.clone(), http) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to initialize application state: {e}");
            std::process::exit(1);
        }
    };

    let sessions = state.sessions.clone();
    let ttl = config.sessions.ttl;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sessions.cleanup(ttl);
        }
    });

    let app = proxy::build_router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(%addr, "quizgate listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }
}
