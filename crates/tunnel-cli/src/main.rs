//! godig — reverse HTTP tunnel client CLI.
//!
//! Exposes a local service through a tunnel server, printing the public URL (and optionally a
//! QR code) once the handshake succeeds.

mod qr;
mod resolve;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tunnel_client::config::{GlobalConfig, TunnelConfig};
use tunnel_client::connector::{self, ConnectorConfig};
use tunnel_core::token;

#[derive(Parser)]
#[command(name = "godig", version, about = "Reverse HTTP tunnel client")]
struct Cli {
    /// Tunnel server address (host:port).
    #[arg(long)]
    server: Option<String>,

    /// Local service address to expose (host:port).
    #[arg(long, default_value = "localhost:3000")]
    local: String,

    /// API key for the tunnel server. Falls back to GODIG_API_KEY, then the global config.
    #[arg(long)]
    api_key: Option<String>,

    /// Persist the generated tunnel ID and bearer to ./godig-tunnel.yaml so they survive
    /// restarts.
    #[arg(long)]
    persist_config: bool,

    /// Print the public tunnel URL as a terminal QR code.
    #[arg(long)]
    generate_qr: bool,

    /// Disable per-request bearer authorization for this tunnel.
    #[arg(long)]
    disable_auth: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read or write a value in the global config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a config value (valid keys: api-key, server).
    Set { key: String, value: String },
    /// Print a config value (valid keys: api-key, server).
    Get { key: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "godig failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Config { action }) = cli.command {
        return run_config_command(action);
    }

    let mut global = GlobalConfig::load()?;
    // The API key is the handshake shared secret, always required by the acceptor regardless of
    // --disable-auth; that flag only waives the per-request bearer below.
    let api_key = resolve::resolve_api_key(&cli.api_key, &global)?;
    let server_addr = resolve::resolve_server(&cli.server, &global);

    let tunnel_config = if cli.persist_config {
        TunnelConfig::load()?
    } else {
        None
    };
    let (tunnel_id, bearer) = match tunnel_config {
        Some(cfg) => (cfg.tunnel_id, cfg.bearer),
        None => {
            let tunnel_id = token::generate_tunnel_id()?;
            let bearer = if cli.disable_auth { String::new() } else { token::generate_bearer()? };
            if cli.persist_config {
                TunnelConfig { tunnel_id: tunnel_id.clone(), bearer: bearer.clone() }.save()?;
            }
            (tunnel_id, bearer)
        }
    };

    if global.server.is_none() {
        global.server = Some(server_addr.clone());
    }

    let base_host = server_addr.split(':').next().unwrap_or("localhost");
    let public_url = format!("http://{tunnel_id}.{base_host}");
    info!(tunnel_id = %tunnel_id, public_url = %public_url, local = %cli.local, "starting tunnel");
    println!("forwarding {public_url} -> {}", cli.local);
    if !bearer.is_empty() {
        println!("bearer: {bearer}");
    }

    if cli.generate_qr {
        match qr::render_qr_unicode(&public_url) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => error!(error = %e, "failed to render QR code"),
        }
    }

    let shutdown = CancellationToken::new();
    let connector_config = ConnectorConfig {
        server_addr,
        local_addr: cli.local,
        api_key,
        tunnel_id,
        bearer,
    };

    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_for_signal.cancel();
    });

    connector::run(connector_config, shutdown).await;
    Ok(())
}

fn run_config_command(action: ConfigAction) -> anyhow::Result<()> {
    let mut global = GlobalConfig::load()?;
    match action {
        ConfigAction::Set { key, value } => {
            global.set(&key, &value)?;
            global.save()?;
            println!("{key} = {value}");
        }
        ConfigAction::Get { key } => match global.get(&key)? {
            Some(value) => println!("{value}"),
            None => println!("(unset)"),
        },
    }
    Ok(())
}
