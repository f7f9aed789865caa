//! Client Connector: dial the server, perform the handshake, and keep a tunnel alive, retrying
//! with capped exponential backoff across disconnects.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunnel_core::{Handshake, HandshakeAck, MuxMode, TunnelMux};

use crate::stream_handler::{self, StreamHandlerConfig};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct ConnectorConfig {
    pub server_addr: String,
    pub local_addr: String,
    pub api_key: String,
    pub tunnel_id: String,
    pub bearer: String,
}

/// Run the connect/serve/reconnect loop until `shutdown` is cancelled.
pub async fn run(config: ConnectorConfig, shutdown: CancellationToken) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        info!(server = %config.server_addr, tunnel_id = %config.tunnel_id, "connecting to server");
        match connect_and_handshake(&config).await {
            Ok(mux) => {
                backoff = INITIAL_BACKOFF;
                let handler_config = StreamHandlerConfig { local_addr: config.local_addr.clone() };
                stream_handler::serve(mux, handler_config, shutdown.clone()).await;
                if shutdown.is_cancelled() {
                    return;
                }
                warn!("control connection closed, reconnecting");
            }
            Err(e) => {
                warn!(error = %e, "connect failed, retrying");
            }
        }

        if sleep_or_cancelled(backoff, &shutdown).await {
            return;
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn sleep_or_cancelled(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.cancelled() => true,
    }
}

async fn connect_and_handshake(config: &ConnectorConfig) -> anyhow::Result<TunnelMux> {
    let mut socket = TcpStream::connect(&config.server_addr).await?;

    let handshake = Handshake {
        tunnel_id: config.tunnel_id.clone(),
        api_key: config.api_key.clone(),
        bearer: config.bearer.clone(),
    };
    let payload = serde_json::to_vec(&handshake)?;
    socket.write_all(&payload).await?;

    let ack = read_ack(&mut socket).await?;
    if !ack.is_ok() {
        anyhow::bail!("server rejected handshake: {}", ack.status);
    }

    Ok(TunnelMux::new(socket, MuxMode::Client))
}

async fn read_ack(socket: &mut TcpStream) -> anyhow::Result<HandshakeAck> {
    let mut buf = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        let n = socket.read(&mut byte).await?;
        if n == 0 {
            anyhow::bail!("connection closed while waiting for handshake ack");
        }
        buf.push(byte[0]);
        if let Ok(ack) = serde_json::from_slice::<HandshakeAck>(&buf) {
            return Ok(ack);
        }
        if buf.len() > 4096 {
            anyhow::bail!("handshake ack too large");
        }
    }
}
