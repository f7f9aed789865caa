//! Server Acceptor: the control-plane listener.
//!
//! Accepts one TCP connection per client, runs the handshake, and — on success — registers a
//! [`ClientSession`] and blocks until the multiplexer closes.

use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunnel_core::{Handshake, HandshakeAck, MuxMode, TunnelMux};

use crate::registry::{ClientSession, Registry};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AcceptorConfig {
    pub api_key: String,
    pub allow_no_auth: bool,
}

/// Run the control-plane accept loop until `shutdown` is cancelled.
pub async fn run(
    listener: TcpListener,
    registry: Registry,
    config: AcceptorConfig,
    shutdown: CancellationToken,
) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "control plane listening");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("acceptor loop cancelled");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let registry = registry.clone();
                        let api_key = config.api_key.clone();
                        let allow_no_auth = config.allow_no_auth;
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            debug!(%peer, "control connection accepted");
                            handle_connection(socket, registry, &api_key, allow_no_auth, shutdown).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    registry: Registry,
    api_key: &str,
    allow_no_auth: bool,
    shutdown: CancellationToken,
) {
    let handshake = match read_handshake(&mut socket).await {
        Ok(hs) => hs,
        Err(e) => {
            debug!(error = %e, "handshake failed");
            return;
        }
    };

    if handshake.api_key != api_key {
        debug!(tunnel_id = %handshake.tunnel_id, "api key mismatch");
        return;
    }
    if handshake.tunnel_id.is_empty() {
        debug!("empty tunnel id rejected");
        return;
    }
    if handshake.bearer.is_empty() && !allow_no_auth {
        debug!(tunnel_id = %handshake.tunnel_id, "bearer required but absent");
        return;
    }

    if let Err(e) = write_ack(&mut socket).await {
        debug!(error = %e, "failed to send handshake ack");
        return;
    }

    let tunnel_id = handshake.tunnel_id.to_lowercase();
    let mut mux = TunnelMux::new(socket, MuxMode::Server);
    let session = ClientSession {
        tunnel_id: tunnel_id.clone(),
        bearer: handshake.bearer,
        control: mux.control_handle(),
        closed: mux.closed_watch(),
        connected_at: Instant::now(),
    };
    let connected_at = session.connected_at;

    // The new session is inserted before the superseded one is closed, rather than the other way
    // around, so a lookup never observes a gap where the tunnel ID resolves to nothing. This is
    // still safe for invariant 2 (old session's close is invoked exactly once, before it is
    // "new"): the `connected_at` generation guard in `Registry::unregister` means the superseded
    // session's own unregister, once its closed-close resolves, can never evict this new entry.
    if let Some(mut previous) = registry.register(session) {
        let _ = previous.control.close().await;
    }

    tokio::select! {
        _ = mux.closed() => {
            info!(tunnel_id = %tunnel_id, "control connection closed");
        }
        _ = shutdown.cancelled() => {
            let _ = mux.close().await;
        }
    }

    registry.unregister(&tunnel_id, connected_at);
}

async fn read_handshake(socket: &mut TcpStream) -> anyhow::Result<Handshake> {
    let mut buf = Vec::with_capacity(512);
    let mut byte = [0u8; 1];
    timeout(HANDSHAKE_TIMEOUT, async {
        loop {
            let n = socket.read(&mut byte).await?;
            if n == 0 {
                anyhow::bail!("connection closed during handshake");
            }
            buf.push(byte[0]);
            if let Ok(hs) = serde_json::from_slice::<Handshake>(&buf) {
                return Ok(hs);
            }
            if buf.len() > 8192 {
                anyhow::bail!("handshake message too large");
            }
        }
    })
    .await?
}

async fn write_ack(socket: &mut TcpStream) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(&HandshakeAck::ok())?;
    socket.write_all(&payload).await?;
    Ok(())
}
