//! Client Stream Handler: accept inbound multiplexed streams and relay each one to the local
//! service.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tunnel_core::httpmsg::{self, write_request_line};
use tunnel_core::TunnelMux;

const INITIAL_READ_DEADLINE: Duration = Duration::from_secs(30);
const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\n\r\n";

pub struct StreamHandlerConfig {
    pub local_addr: String,
}

/// Accept streams from `mux` until it closes or `shutdown` fires, spawning one worker per
/// stream.
pub async fn serve(mut mux: TunnelMux, config: StreamHandlerConfig, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = mux.close().await;
                return;
            }
            stream = mux.accept_stream() => {
                match stream {
                    Some(stream) => {
                        let local_addr = config.local_addr.clone();
                        let child_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_stream(stream, local_addr, child_shutdown).await;
                        });
                    }
                    None => return,
                }
            }
        }
    }
}

async fn handle_stream(stream: tunnel_core::MuxStream, local_addr: String, shutdown: CancellationToken) {
    let mut stream = stream.compat();

    let (head, prefix) = match timeout(INITIAL_READ_DEADLINE, httpmsg::read_request_head(&mut stream)).await {
        Ok(Ok(v)) => v,
        _ => {
            debug!("failed to read forwarded request within deadline");
            return;
        }
    };

    let mut local = match TcpStream::connect(&local_addr).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, local_addr = %local_addr, "failed to dial local service");
            let _ = stream.write_all(BAD_GATEWAY).await;
            return;
        }
    };

    let request_bytes = write_request_line(&head.method, &head.path, &head.headers);
    if local.write_all(&request_bytes).await.is_err() {
        return;
    }
    if httpmsg::copy_body(&mut stream, &mut local, &prefix, &head.headers).await.is_err() {
        return;
    }

    let (mut local_read, mut local_write) = local.into_split();
    let (mut stream_read, mut stream_write) = tokio::io::split(stream);

    let response_relay = tokio::spawn(async move {
        let _ = tokio::io::copy(&mut local_read, &mut stream_write).await;
        let _ = stream_write.shutdown().await;
    });

    tokio::select! {
        _ = tokio::io::copy(&mut stream_read, &mut local_write) => {}
        _ = shutdown.cancelled() => {}
    }
    let _ = local_write.shutdown().await;
    let _ = response_relay.await;
}
