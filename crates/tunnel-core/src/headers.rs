//! Header hygiene for forwarded requests.
//!
//! Mirrors RFC 7230 §6.1's hop-by-hop set plus the extra names a `Connection` header can list.

/// An owned, order-preserving header list, since both the request parser and the multiplexed
/// wire format need to re-serialize headers verbatim after mutation.
pub type HeaderList = Vec<(String, String)>;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str, extra: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str()) || extra.iter().any(|e| e.eq_ignore_ascii_case(&lower))
}

/// Remove hop-by-hop headers in place, including any header named in a comma-separated
/// `Connection` value.
pub fn remove_hop_by_hop(headers: &mut HeaderList) {
    let extra: Vec<String> = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("connection"))
        .map(|(_, v)| v.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_default();

    headers.retain(|(k, _)| !is_hop_by_hop(k, &extra));
}

fn find(headers: &HeaderList, name: &str) -> Option<usize> {
    headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Append proxy-forwarding headers. `client_ip` is the address of the peer the request arrived
/// from; `is_tls` reflects the incoming connection's scheme.
pub fn add_forwarding_headers(headers: &mut HeaderList, client_ip: &str, is_tls: bool, host: &str) {
    match find(headers, "x-forwarded-for") {
        Some(idx) => {
            let (_, existing) = &headers[idx];
            headers[idx].1 = format!("{existing}, {client_ip}");
        }
        None => headers.push(("X-Forwarded-For".to_string(), client_ip.to_string())),
    }

    let proto = if is_tls { "https" } else { "http" };
    match find(headers, "x-forwarded-proto") {
        Some(idx) => headers[idx].1 = proto.to_string(),
        None => headers.push(("X-Forwarded-Proto".to_string(), proto.to_string())),
    }

    if find(headers, "x-forwarded-host").is_none() {
        headers.push(("X-Forwarded-Host".to_string(), host.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(pairs: &[(&str, &str)]) -> HeaderList {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn removes_static_hop_by_hop_set() {
        let mut headers = h(&[
            ("Connection", "keep-alive"),
            ("Keep-Alive", "timeout=5"),
            ("Content-Type", "text/plain"),
            ("Upgrade", "websocket"),
        ]);
        remove_hop_by_hop(&mut headers);
        assert_eq!(headers, h(&[("Content-Type", "text/plain")]));
    }

    #[test]
    fn removes_headers_named_in_connection_value() {
        let mut headers = h(&[
            ("Connection", "X-Custom-Hop, Keep-Alive"),
            ("X-Custom-Hop", "drop-me"),
            ("Content-Length", "4"),
        ]);
        remove_hop_by_hop(&mut headers);
        assert_eq!(headers, h(&[("Content-Length", "4")]));
    }

    #[test]
    fn removal_is_idempotent() {
        let mut headers = h(&[("Connection", "close"), ("Content-Type", "text/plain")]);
        remove_hop_by_hop(&mut headers);
        let once = headers.clone();
        remove_hop_by_hop(&mut headers);
        assert_eq!(headers, once);
    }

    #[test]
    fn x_forwarded_for_accumulates_across_hops() {
        let mut headers = h(&[]);
        add_forwarding_headers(&mut headers, "10.0.0.1", false, "abcde.example.com");
        add_forwarding_headers(&mut headers, "10.0.0.2", false, "abcde.example.com");
        add_forwarding_headers(&mut headers, "10.0.0.3", false, "abcde.example.com");
        let (_, xff) = headers.iter().find(|(k, _)| k == "X-Forwarded-For").unwrap();
        assert_eq!(xff, "10.0.0.1, 10.0.0.2, 10.0.0.3");
    }

    #[test]
    fn x_forwarded_host_not_overwritten_if_present() {
        let mut headers = h(&[("X-Forwarded-Host", "original.example.com")]);
        add_forwarding_headers(&mut headers, "10.0.0.1", true, "abcde.example.com");
        let (_, v) = headers.iter().find(|(k, _)| k == "X-Forwarded-Host").unwrap();
        assert_eq!(v, "original.example.com");
    }

    #[test]
    fn x_forwarded_proto_reflects_tls() {
        let mut headers = h(&[]);
        add_forwarding_headers(&mut headers, "10.0.0.1", true, "abcde.example.com");
        let (_, v) = headers.iter().find(|(k, _)| k == "X-Forwarded-Proto").unwrap();
        assert_eq!(v, "https");
    }
}
