//! Control-plane wire types.
//!
//! A client opens one TCP connection to the server's control port and sends a single
//! [`Handshake`] as a JSON object. The server answers with a single [`HandshakeAck`],
//! also JSON. Everything after that belongs to the multiplexer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Handshake {
    #[serde(rename = "tunnelID")]
    pub tunnel_id: String,
    #[serde(rename = "apiKey")]
    pub api_key: String,
    /// Empty string means "no bearer" — the tunnel serves unauthenticated requests if the
    /// server's policy allows it.
    #[serde(default)]
    pub bearer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeAck {
    pub status: String,
}

impl HandshakeAck {
    pub fn ok() -> Self {
        Self { status: "ok".to_string() }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trips_through_json() {
        let hs = Handshake {
            tunnel_id: "abcde".into(),
            api_key: "secret".into(),
            bearer: "tok123".into(),
        };
        let encoded = serde_json::to_string(&hs).unwrap();
        assert!(encoded.contains("\"tunnelID\""));
        let decoded: Handshake = serde_json::from_str(&encoded).unwrap();
        assert_eq!(hs, decoded);
    }

    #[test]
    fn handshake_bearer_defaults_to_empty() {
        let decoded: Handshake =
            serde_json::from_str(r#"{"tunnelID":"abcde","apiKey":"secret"}"#).unwrap();
        assert_eq!(decoded.bearer, "");
    }

    #[test]
    fn ack_ok_round_trips() {
        let ack = HandshakeAck::ok();
        assert!(ack.is_ok());
        let encoded = serde_json::to_string(&ack).unwrap();
        assert_eq!(encoded, r#"{"status":"ok"}"#);
    }
}
