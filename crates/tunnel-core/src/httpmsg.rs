//! Minimal HTTP/1.1 message framing shared by the server's frontend and the client's stream
//! handler: parsing a request/response head with `httparse`, and copying a body according to
//! `Content-Length`, chunked transfer-encoding, or close-delimited framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TunnelError, TunnelResult};
use crate::headers::HeaderList;

const MAX_HEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: HeaderList,
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
}

/// Reads from `r` until the end of a header block (`\r\n\r\n`), then parses it as a request.
/// Returns the parsed head plus any body bytes that were already read past the header block.
pub async fn read_request_head<R: AsyncRead + Unpin>(
    r: &mut R,
) -> TunnelResult<(RequestHead, Vec<u8>)> {
    let raw = read_until_head_end(r).await?;
    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut header_storage);
    let status = req
        .parse(&raw)
        .map_err(|e| TunnelError::InvalidMessage(e.to_string()))?;
    let body_offset = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            return Err(TunnelError::InvalidMessage("incomplete request head".into()))
        }
    };

    let head = RequestHead {
        method: req.method.unwrap_or("GET").to_string(),
        path: req.path.unwrap_or("/").to_string(),
        headers: req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
    };
    Ok((head, raw[body_offset..].to_vec()))
}

/// Same as [`read_request_head`] but for an HTTP response.
pub async fn read_response_head<R: AsyncRead + Unpin>(
    r: &mut R,
) -> TunnelResult<(ResponseHead, Vec<u8>)> {
    let raw = read_until_head_end(r).await?;
    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut resp = httparse::Response::new(&mut header_storage);
    let status = resp
        .parse(&raw)
        .map_err(|e| TunnelError::InvalidMessage(e.to_string()))?;
    let body_offset = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            return Err(TunnelError::InvalidMessage("incomplete response head".into()))
        }
    };

    let head = ResponseHead {
        status: resp.code.unwrap_or(502),
        reason: resp.reason.unwrap_or("").to_string(),
        headers: resp
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect(),
    };
    Ok((head, raw[body_offset..].to_vec()))
}

async fn read_until_head_end<R: AsyncRead + Unpin>(r: &mut R) -> TunnelResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];
    loop {
        let n = r.read(&mut byte).await?;
        if n == 0 {
            return Err(TunnelError::Stream("connection closed while reading headers".into()));
        }
        buf.push(byte[0]);
        if buf.len() >= 4 && &buf[buf.len() - 4..] == b"\r\n\r\n" {
            return Ok(buf);
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(TunnelError::InvalidMessage("header block too large".into()));
        }
    }
}

pub fn write_request_line(method: &str, path: &str, headers: &HeaderList) -> Vec<u8> {
    let mut out = format!("{method} {path} HTTP/1.1\r\n").into_bytes();
    write_headers(&mut out, headers);
    out
}

pub fn write_status_line(status: u16, reason: &str, headers: &HeaderList) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    write_headers(&mut out, headers);
    out
}

fn write_headers(out: &mut Vec<u8>, headers: &HeaderList) {
    for (k, v) in headers {
        out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

pub fn content_length(headers: &HeaderList) -> Option<usize> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

pub fn is_chunked(headers: &HeaderList) -> bool {
    headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked"))
}

/// Copy a request body from `src` to `dst`, having already consumed `prefix` bytes (the portion
/// of the body that was read along with the head). Per RFC 7230 §3.3.3, a request carrying
/// neither `Content-Length` nor a chunked `Transfer-Encoding` has no body.
pub async fn copy_body<R, W>(
    src: &mut R,
    dst: &mut W,
    prefix: &[u8],
    headers: &HeaderList,
) -> TunnelResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(len) = content_length(headers) {
        copy_exact(src, dst, prefix, len).await
    } else if is_chunked(headers) {
        copy_chunked(src, dst, prefix).await
    } else {
        dst.write_all(prefix).await?;
        Ok(())
    }
}

/// Copy a response body from `src` to `dst`. Unlike [`copy_body`], a response with neither
/// framing header present is delimited by the connection closing, so the fallback reads to EOF.
pub async fn copy_response_body<R, W>(
    src: &mut R,
    dst: &mut W,
    prefix: &[u8],
    headers: &HeaderList,
) -> TunnelResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(len) = content_length(headers) {
        copy_exact(src, dst, prefix, len).await
    } else if is_chunked(headers) {
        copy_chunked(src, dst, prefix).await
    } else {
        dst.write_all(prefix).await?;
        tokio::io::copy(src, dst).await.map(|_| ()).map_err(TunnelError::from)
    }
}

async fn copy_exact<R, W>(src: &mut R, dst: &mut W, prefix: &[u8], total: usize) -> TunnelResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let write_now = prefix.len().min(total);
    dst.write_all(&prefix[..write_now]).await?;
    let mut remaining = total.saturating_sub(prefix.len());
    let mut buf = [0u8; 16 * 1024];
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = src.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(TunnelError::Stream("body truncated before Content-Length".into()));
        }
        dst.write_all(&buf[..n]).await?;
        remaining -= n;
    }
    Ok(())
}

/// Relays chunked-encoded framing verbatim: parse chunk-size lines to know how many raw bytes to
/// forward, but forward the chunk markers themselves unchanged so the downstream peer sees
/// identical chunk boundaries.
async fn copy_chunked<R, W>(src: &mut R, dst: &mut W, prefix: &[u8]) -> TunnelResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut pending = prefix.to_vec();
    loop {
        let (size, line_len) = read_chunk_size(src, &mut pending).await?;
        dst.write_all(&pending[..line_len]).await?;
        consume(&mut pending, line_len);

        if size == 0 {
            // Trailing headers (rare) followed by a final CRLF; forward until we see it.
            let trailer = read_until(src, &mut pending, b"\r\n\r\n").await?;
            dst.write_all(&trailer).await?;
            return Ok(());
        }

        let chunk_and_crlf = size + 2;
        ensure_buffered(src, &mut pending, chunk_and_crlf).await?;
        dst.write_all(&pending[..chunk_and_crlf]).await?;
        consume(&mut pending, chunk_and_crlf);
    }
}

async fn read_chunk_size<R: AsyncRead + Unpin>(
    src: &mut R,
    pending: &mut Vec<u8>,
) -> TunnelResult<(usize, usize)> {
    let line = read_until(src, pending, b"\r\n").await?;
    let text = std::str::from_utf8(&line)
        .map_err(|_| TunnelError::InvalidMessage("non-utf8 chunk size".into()))?;
    let size_part = text.trim_end_matches("\r\n").split(';').next().unwrap_or("0");
    let size = usize::from_str_radix(size_part.trim(), 16)
        .map_err(|_| TunnelError::InvalidMessage("invalid chunk size".into()))?;
    Ok((size, line.len()))
}

/// Ensure `pending` contains at least `needle`-terminated data from the front, reading more from
/// `src` as needed; returns the bytes up to and including the needle.
async fn read_until<R: AsyncRead + Unpin>(
    src: &mut R,
    pending: &mut Vec<u8>,
    needle: &[u8],
) -> TunnelResult<Vec<u8>> {
    loop {
        if let Some(pos) = find(pending, needle) {
            let end = pos + needle.len();
            return Ok(pending[..end].to_vec());
        }
        let mut buf = [0u8; 4096];
        let n = src.read(&mut buf).await?;
        if n == 0 {
            return Err(TunnelError::Stream("truncated chunked body".into()));
        }
        pending.extend_from_slice(&buf[..n]);
    }
}

async fn ensure_buffered<R: AsyncRead + Unpin>(
    src: &mut R,
    pending: &mut Vec<u8>,
    needed: usize,
) -> TunnelResult<()> {
    while pending.len() < needed {
        let mut buf = [0u8; 16 * 1024];
        let n = src.read(&mut buf).await?;
        if n == 0 {
            return Err(TunnelError::Stream("truncated chunk data".into()));
        }
        pending.extend_from_slice(&buf[..n]);
    }
    Ok(())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn consume(pending: &mut Vec<u8>, n: usize) {
    pending.drain(..n);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn parses_simple_get_request() {
        let raw = b"GET /hello HTTP/1.1\r\nHost: abcde.example.com\r\n\r\n".to_vec();
        let mut cursor = Cursor::new(raw);
        let (head, leftover) = read_request_head(&mut cursor).await.unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.path, "/hello");
        assert!(leftover.is_empty());
        assert!(head.headers.iter().any(|(k, v)| k == "Host" && v == "abcde.example.com"));
    }

    #[tokio::test]
    async fn parses_response_with_body_in_same_read() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello".to_vec();
        let mut cursor = Cursor::new(raw);
        let (head, leftover) = read_response_head(&mut cursor).await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(leftover, b"hello");
    }

    #[tokio::test]
    async fn copy_body_respects_content_length() {
        let body_tail = b"world";
        let mut src = Cursor::new(body_tail.to_vec());
        let mut dst = Vec::new();
        let headers = vec![("Content-Length".to_string(), "10".to_string())];
        copy_body(&mut src, &mut dst, b"hello", &headers).await.unwrap();
        assert_eq!(dst, b"helloworld");
    }

    #[tokio::test]
    async fn copy_body_handles_chunked_framing() {
        let raw = b"5\r\nhello\r\n0\r\n\r\n".to_vec();
        let mut src = Cursor::new(raw.clone());
        let mut dst = Vec::new();
        let headers = vec![("Transfer-Encoding".to_string(), "chunked".to_string())];
        copy_body(&mut src, &mut dst, b"", &headers).await.unwrap();
        assert_eq!(dst, raw);
    }
}
