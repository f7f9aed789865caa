//! tunnel-server: reverse HTTP tunnel server.
//!
//! Runs two listeners — the control plane (client handshakes) and the public HTTP frontend —
//! sharing one [`Registry`] of live client sessions.

use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tunnel_server::acceptor::{self, AcceptorConfig};
use tunnel_server::config::{Cli, ServerConfig};
use tunnel_server::frontend;
use tunnel_server::registry::Registry;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let config = match ServerConfig::from_cli(cli) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to resolve server config");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        tunnel_port = config.tunnel_port,
        http_port = config.http_port,
        host = %config.host,
        "starting tunnel-server"
    );

    let tunnel_listener = match TcpListener::bind(("0.0.0.0", config.tunnel_port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, port = config.tunnel_port, "failed to bind control plane");
            std::process::exit(1);
        }
    };
    let http_listener = match TcpListener::bind(("0.0.0.0", config.http_port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, port = config.http_port, "failed to bind http frontend");
            std::process::exit(1);
        }
    };

    let registry = Registry::new();
    let shutdown = CancellationToken::new();

    let acceptor_config = AcceptorConfig { api_key: config.api_key, allow_no_auth: config.allow_no_auth };

    let acceptor_task = tokio::spawn(acceptor::run(
        tunnel_listener,
        registry.clone(),
        acceptor_config,
        shutdown.clone(),
    ));
    let frontend_task = tokio::spawn(frontend::run(http_listener, registry, shutdown.clone()));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("received shutdown signal");
            shutdown.cancel();
        }
    }

    let _ = tokio::join!(acceptor_task, frontend_task);
    info!("tunnel-server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
