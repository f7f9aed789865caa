//! HTTP Frontend: the public-facing listener that routes by subdomain and forwards requests
//! over the matching client's multiplexed stream.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tunnel_core::headers::{add_forwarding_headers, remove_hop_by_hop, HeaderList};
use tunnel_core::httpmsg::{self, is_chunked, write_request_line, write_status_line, RequestHead};

use crate::forwarder::{is_streaming_response, relay_streaming};
use crate::registry::Registry;

const STREAM_DEADLINE: Duration = Duration::from_secs(30);

pub async fn run(listener: TcpListener, registry: Registry, shutdown: CancellationToken) {
    debug!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "http frontend listening");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => {
                match result {
                    Ok((socket, peer)) => {
                        let registry = registry.clone();
                        tokio::spawn(async move {
                            serve_connection(socket, peer, registry).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }
    }
}

async fn serve_connection(mut socket: TcpStream, peer: SocketAddr, registry: Registry) {
    loop {
        let (head, prefix) = match httpmsg::read_request_head(&mut socket).await {
            Ok(v) => v,
            Err(_) => return,
        };

        match forward_request(&mut socket, peer, &head, prefix, &registry).await {
            Ok(keep_alive) if keep_alive => continue,
            _ => return,
        }
    }
}

fn subdomain(host: &str) -> Option<String> {
    let host = host.split(':').next().unwrap_or(host);
    let mut labels = host.split('.');
    let first = labels.next()?;
    if first.is_empty() || labels.next().is_none() {
        return None;
    }
    Some(first.to_lowercase())
}

fn header(headers: &HeaderList, name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.clone())
}

fn bearer_token(headers: &HeaderList) -> Option<String> {
    header(headers, "Authorization").and_then(|v| v.strip_prefix("Bearer ").map(|s| s.to_string()))
}

async fn reject(socket: &mut TcpStream, status: u16, reason: &str) {
    let body = format!("{status} {reason}\n");
    let line = write_status_line(
        status,
        reason,
        &[
            ("Content-Length".to_string(), body.len().to_string()),
            ("Connection".to_string(), "close".to_string()),
        ],
    );
    let _ = socket.write_all(&line).await;
    let _ = socket.write_all(body.as_bytes()).await;
}

/// Forward one request/response over the tunnel. Returns `Ok(true)` if the downstream
/// connection should stay open for another request.
async fn forward_request(
    socket: &mut TcpStream,
    peer: SocketAddr,
    head: &RequestHead,
    prefix: Vec<u8>,
    registry: &Registry,
) -> anyhow::Result<bool> {
    let Some(host) = header(&head.headers, "Host") else {
        reject(socket, 400, "Bad Request").await;
        anyhow::bail!("missing Host header");
    };
    let Some(tunnel_id) = subdomain(&host) else {
        reject(socket, 400, "Bad Request").await;
        anyhow::bail!("malformed subdomain");
    };

    let Some(session) = registry.lookup(&tunnel_id) else {
        reject(socket, 503, "Service Unavailable").await;
        anyhow::bail!("unknown tunnel {tunnel_id}");
    };

    if session.has_bearer() {
        let provided = bearer_token(&head.headers).unwrap_or_default();
        if provided != session.bearer {
            reject(socket, 502, "Bad Gateway").await;
            anyhow::bail!("bearer mismatch for {tunnel_id}");
        }
    }

    let mut control = session.control.clone();
    let stream = match timeout(STREAM_DEADLINE, control.open_stream()).await {
        Ok(Ok(s)) => s,
        _ => {
            reject(socket, 502, "Bad Gateway").await;
            anyhow::bail!("failed to open stream for {tunnel_id}");
        }
    };
    let mut stream = stream.compat();

    // Determine body framing from the headers as received — hop-by-hop removal strips
    // Transfer-Encoding below, but the body bytes on the wire are still chunked and must be
    // relayed verbatim, so the outgoing header is re-added rather than dropped.
    let was_chunked = is_chunked(&head.headers);

    let mut headers = head.headers.clone();
    remove_hop_by_hop(&mut headers);
    add_forwarding_headers(&mut headers, &peer.ip().to_string(), false, &host);
    if was_chunked {
        headers.push(("Transfer-Encoding".to_string(), "chunked".to_string()));
    }

    let request_bytes = write_request_line(&head.method, &head.path, &headers);
    stream.write_all(&request_bytes).await?;
    httpmsg::copy_body(socket, &mut stream, &prefix, &head.headers).await?;

    let (resp_head, resp_prefix) =
        timeout(STREAM_DEADLINE, httpmsg::read_response_head(&mut stream)).await??;

    let status_line = write_status_line(resp_head.status, &resp_head.reason, &resp_head.headers);
    socket.write_all(&status_line).await?;

    if is_streaming_response(&resp_head.headers) {
        relay_streaming(&mut stream, socket, &resp_prefix, &resp_head.headers).await?;
    } else {
        httpmsg::copy_response_body(&mut stream, socket, &resp_prefix, &resp_head.headers).await?;
    }

    let keep_alive = header(&head.headers, "Connection")
        .map(|v| !v.eq_ignore_ascii_case("close"))
        .unwrap_or(true);
    Ok(keep_alive)
}
