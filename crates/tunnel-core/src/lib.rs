//! tunnel-core: shared protocol library for the reverse HTTP tunnel.
//!
//! Provides the control-plane handshake wire types, header hygiene helpers, the stream
//! multiplexer wrapper, and token generation shared by the server and client binaries.

pub mod error;
pub mod headers;
pub mod httpmsg;
pub mod mux;
pub mod token;
pub mod wire;

pub use error::{TunnelError, TunnelResult};
pub use headers::HeaderList;
pub use mux::{MuxConfig, MuxControl, MuxMode, MuxStream, TunnelMux};
pub use wire::{Handshake, HandshakeAck};
