//! Response Forwarder: detects streaming responses (SSE, chunked, keep-alive) and relays them
//! with a periodic keepalive so intermediaries don't time out an idle long-lived connection.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{interval, timeout};
use tunnel_core::headers::HeaderList;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);
const IDLE_DEADLINE: Duration = Duration::from_secs(60);
const SSE_KEEPALIVE_COMMENT: &[u8] = b": keepalive\n\n";

pub fn is_streaming_response(headers: &HeaderList) -> bool {
    let get = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.to_ascii_lowercase())
    };

    get("content-type").map(|v| v.starts_with("text/event-stream")).unwrap_or(false)
        || get("transfer-encoding").map(|v| v.contains("chunked")).unwrap_or(false)
        || get("connection").map(|v| v == "keep-alive").unwrap_or(false)
}

fn is_event_stream(headers: &HeaderList) -> bool {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        .map(|(_, v)| v.to_ascii_lowercase().starts_with("text/event-stream"))
        .unwrap_or(false)
}

/// Relay a streaming response body from `src` to `dst`, already having written `prefix` (body
/// bytes captured alongside the response head). Emits an SSE keepalive comment every 25 s when
/// `headers` names `text/event-stream`; for other streaming kinds the periodic tick only resets
/// the idle deadline.
pub async fn relay_streaming<R, W>(
    src: &mut R,
    dst: &mut W,
    prefix: &[u8],
    headers: &HeaderList,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    relay_streaming_with(src, dst, prefix, is_event_stream(headers)).await
}

async fn relay_streaming_with<R, W>(
    src: &mut R,
    dst: &mut W,
    prefix: &[u8],
    send_sse_comments: bool,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    use tokio::io::AsyncReadExt;

    dst.write_all(prefix).await?;
    dst.flush().await?;

    let mut ticker = interval(KEEPALIVE_INTERVAL);
    ticker.tick().await; // first tick fires immediately

    let mut buf = [0u8; 8192];
    loop {
        tokio::select! {
            read = timeout(IDLE_DEADLINE, src.read(&mut buf)) => {
                let n = read.map_err(|_| anyhow::anyhow!("streaming response idle for {:?}", IDLE_DEADLINE))??;
                if n == 0 {
                    break;
                }
                dst.write_all(&buf[..n]).await?;
                dst.flush().await?;
            }
            _ = ticker.tick() => {
                if send_sse_comments {
                    dst.write_all(SSE_KEEPALIVE_COMMENT).await?;
                    dst.flush().await?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(pairs: &[(&str, &str)]) -> HeaderList {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn detects_event_stream_content_type() {
        assert!(is_streaming_response(&h(&[("Content-Type", "text/event-stream; charset=utf-8")])));
    }

    #[test]
    fn detects_chunked_transfer_encoding() {
        assert!(is_streaming_response(&h(&[("Transfer-Encoding", "chunked")])));
    }

    #[test]
    fn detects_keep_alive_connection() {
        assert!(is_streaming_response(&h(&[("Connection", "keep-alive")])));
    }

    #[test]
    fn ordinary_response_is_not_streaming() {
        assert!(!is_streaming_response(&h(&[("Content-Type", "application/json")])));
    }

    #[test]
    fn is_event_stream_requires_exact_prefix() {
        assert!(is_event_stream(&h(&[("Content-Type", "text/event-stream")])));
        assert!(!is_event_stream(&h(&[("Content-Type", "application/json")])));
    }

    #[tokio::test]
    async fn relay_copies_body_and_prefix() {
        use std::io::Cursor;
        let mut src = Cursor::new(b"world".to_vec());
        let mut dst = Vec::new();
        relay_streaming(&mut src, &mut dst, b"hello", &h(&[])).await.unwrap();
        assert_eq!(dst, b"helloworld");
    }
}
