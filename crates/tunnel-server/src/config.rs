//! Server configuration: CLI flags merged with environment variables.
//!
//! Unlike the client, the server has no persisted config file — its identity is the API key and
//! the two listen ports, all resolved from flags or environment at startup.

use clap::Parser;

const ENV_API_KEY: &str = "GODIG_API_KEY";
const ENV_HOST: &str = "GODIG_HOST";

#[derive(Parser, Debug)]
#[command(name = "tunnel-server", version, about = "Reverse HTTP tunnel server")]
pub struct Cli {
    /// Control-plane port (client connections).
    #[arg(long, default_value_t = 8080)]
    pub tunnel_port: u16,

    /// Public HTTP frontend port.
    #[arg(long, default_value_t = 8081)]
    pub http_port: u16,

    /// Shared API key clients must present during handshake. Falls back to GODIG_API_KEY.
    #[arg(long, env = "GODIG_API_KEY")]
    pub api_key: Option<String>,

    /// Permit tunnels registered with an empty bearer (no per-request authorization).
    #[arg(long)]
    pub allow_no_auth: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

pub struct ServerConfig {
    pub tunnel_port: u16,
    pub http_port: u16,
    pub api_key: String,
    pub allow_no_auth: bool,
    pub log_level: String,
    pub host: String,
}

impl ServerConfig {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let api_key = cli
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("api key must be provided through the {ENV_API_KEY} environment variable or --api-key"))?;

        let host = std::env::var(ENV_HOST).unwrap_or_else(|_| "localhost".to_string());

        Ok(Self {
            tunnel_port: cli.tunnel_port,
            http_port: cli.http_port,
            api_key,
            allow_no_auth: cli.allow_no_auth,
            log_level: cli.log_level,
            host,
        })
    }
}
