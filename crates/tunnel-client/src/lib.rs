//! tunnel-client: client library for the reverse HTTP tunnel.
//!
//! Dials the server's control port, runs the handshake, and relays each inbound multiplexed
//! stream to a local service, reconnecting with backoff across disconnects.

pub mod config;
pub mod connector;
pub mod stream_handler;

pub use config::{GlobalConfig, TunnelConfig};
pub use connector::{run, ConnectorConfig};

pub use tunnel_core::{TunnelError, TunnelResult};
