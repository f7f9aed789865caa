//! Opaque token generation for tunnel IDs and bearer secrets.
//!
//! Tokens are random bytes encoded as lowercase, unpadded base32 (RFC 4648), matching the
//! reference implementation's `auth.GenerateString`.

use crate::error::{TunnelError, TunnelResult};
use base32::Alphabet;
use rand::RngCore;

const TUNNEL_ID_BYTES: usize = 5;
const BEARER_BYTES: usize = 20;

/// Generate a random opaque string encoding `length` random bytes.
pub fn generate_string(length: usize) -> TunnelResult<String> {
    if length == 0 {
        return Err(TunnelError::Other("token length must be greater than 0".into()));
    }

    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);

    let encoded = base32::encode(Alphabet::Rfc4648 { padding: false }, &bytes);
    Ok(encoded.to_lowercase())
}

/// Generate a tunnel ID (5 decoded bytes).
pub fn generate_tunnel_id() -> TunnelResult<String> {
    generate_string(TUNNEL_ID_BYTES)
}

/// Generate a bearer token (20 decoded bytes).
pub fn generate_bearer() -> TunnelResult<String> {
    generate_string(BEARER_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_string_rejects_zero_length() {
        let err = generate_string(0).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn generate_string_is_lowercase_base32() {
        let token = generate_string(16).unwrap();
        assert_eq!(token, token.to_lowercase());
        let upper = token.to_uppercase();
        assert!(base32::decode(Alphabet::Rfc4648 { padding: false }, &upper).is_some());
    }

    #[test]
    fn generate_string_decodes_to_requested_length() {
        for length in [1usize, 8, 16, 32, 64] {
            let token = generate_string(length).unwrap();
            let decoded =
                base32::decode(Alphabet::Rfc4648 { padding: false }, &token.to_uppercase())
                    .unwrap();
            assert_eq!(decoded.len(), length);
        }
    }

    #[test]
    fn generate_tunnel_id_has_documented_length() {
        let id = generate_tunnel_id().unwrap();
        let decoded =
            base32::decode(Alphabet::Rfc4648 { padding: false }, &id.to_uppercase()).unwrap();
        assert_eq!(decoded.len(), TUNNEL_ID_BYTES);
    }

    #[test]
    fn generate_bearer_has_documented_length() {
        let bearer = generate_bearer().unwrap();
        let decoded =
            base32::decode(Alphabet::Rfc4648 { padding: false }, &bearer.to_uppercase()).unwrap();
        assert_eq!(decoded.len(), BEARER_BYTES);
    }

    #[test]
    fn successive_tokens_differ() {
        assert_ne!(generate_tunnel_id().unwrap(), generate_tunnel_id().unwrap());
    }
}
