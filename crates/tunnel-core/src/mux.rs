//! Stream multiplexer wrapper around the `yamux` crate.
//!
//! `yamux::Connection<T>` is not `Clone` and drives both inbound-stream acceptance and the
//! underlying socket's I/O from a single `&mut self`, so it cannot be shared directly between
//! the task that wants to open new outbound streams and the task that wants to accept inbound
//! ones. We drive the connection from one background task and expose two cheap, cloneable
//! handles: [`Control`] (open streams) is yamux's own handle, already `Clone`; inbound streams
//! are forwarded over an `mpsc` channel so callers can `accept` without touching the connection.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use yamux::{Config, Connection, ConnectionError, Control, Mode, Stream as YamuxStream};

use crate::error::{TunnelError, TunnelResult};

/// A running multiplexer session: an outbound-open handle, an inbound-stream receiver, and a
/// signal that flips once the underlying connection has closed (cleanly or with an error).
pub struct TunnelMux {
    control: Control,
    inbound: mpsc::Receiver<YamuxStream>,
    closed: watch::Receiver<bool>,
}

impl TunnelMux {
    /// Wrap a TCP connection as one side of the multiplexer and spawn the background driver
    /// task. `mode` determines which side generates odd vs. even stream IDs.
    pub fn new(socket: TcpStream, mode: Mode) -> Self {
        Self::with_config(socket, mode, Config::default())
    }

    pub fn with_config(socket: TcpStream, mode: Mode, config: Config) -> Self {
        let compat = socket.compat();
        let mut connection = Connection::new(compat, config, mode);
        let control = connection.control();
        let (inbound_tx, inbound) = mpsc::channel(32);
        let (closed_tx, closed) = watch::channel(false);

        tokio::spawn(async move {
            drive(&mut connection, inbound_tx).await;
            let _ = closed_tx.send(true);
        });

        Self { control, inbound, closed }
    }

    /// Open a new outbound logical stream. Resolves once the peer has acknowledged it.
    pub async fn open_stream(&mut self) -> TunnelResult<YamuxStream> {
        self.control
            .open_stream()
            .await
            .map_err(|e| TunnelError::Stream(e.to_string()))
    }

    /// Accept the next inbound logical stream. Returns `None` once the connection has closed.
    pub async fn accept_stream(&mut self) -> Option<YamuxStream> {
        self.inbound.recv().await
    }

    /// A cloneable handle for opening outbound streams concurrently from other tasks, independent
    /// of the `TunnelMux` itself.
    pub fn control_handle(&self) -> Control {
        self.control.clone()
    }

    /// A cloneable watch of the connection's closed state; resolves/observes `true` once the
    /// background driver has stopped.
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.closed.clone()
    }

    /// Resolve once the background driver has stopped, i.e. the connection is closed.
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|c| *c).await;
    }

    /// Ask the peer to close the connection and stop the driver task.
    pub async fn close(&mut self) -> TunnelResult<()> {
        self.control
            .close()
            .await
            .map_err(|e| TunnelError::Stream(e.to_string()))
    }
}

async fn drive<T>(connection: &mut Connection<Compat<T>>, inbound_tx: mpsc::Sender<YamuxStream>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match connection.next_stream().await {
            Ok(Some(stream)) => {
                if inbound_tx.send(stream).await.is_err() {
                    // No one is listening for inbound streams any more; keep driving so
                    // outbound opens and keepalives still work, but drop the stream.
                    continue;
                }
            }
            Ok(None) => break,
            Err(ConnectionError::Closed) => break,
            Err(_) => break,
        }
    }
}

pub use yamux::{Config as MuxConfig, Control as MuxControl, Mode as MuxMode, Stream as MuxStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_server_handshake_and_stream_round_trip() {
        use futures::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut mux = TunnelMux::new(socket, Mode::Server);
            let mut stream = mux.accept_stream().await.expect("inbound stream");
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hello");
            stream.write_all(b"world").await.unwrap();
            stream.close().await.unwrap();
        });

        let socket = TcpStream::connect(addr).await.unwrap();
        let mut mux = TunnelMux::new(socket, Mode::Client);
        let mut stream = mux.open_stream().await.unwrap();
        stream.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        server.await.unwrap();
    }
}
