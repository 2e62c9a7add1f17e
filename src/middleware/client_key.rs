//! Client identity for rate limiting.
//!
//! The key is the connecting peer's address taken from Axum's `ConnectInfo`.
//! `X-Forwarded-For` (first entry) and `X-Real-IP` replace it only when the
//! peer falls inside a `TRUSTED_PROXIES` range. With no ranges configured no
//! peer is trusted and forwarding headers are ignored.
//!
//! Requests without a peer address share the [`UNKNOWN_CLIENT`] key.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use tracing::{debug, warn};

/// Key shared by requests whose origin cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Parsed CIDR network range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `"10.0.0.0/8"`, `"::1/128"`, or a bare address (full-length prefix).
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = match cidr.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr.trim(), None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p.parse().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Networks whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxies {
    ranges: Vec<CidrRange>,
}

impl TrustedProxies {
    /// Invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();
        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Nobody is trusted when no ranges are configured.
    pub fn trusts(&self, peer: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(peer))
    }
}

/// Address claimed by forwarding headers, if any parses.
fn forwarded_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    let headers = req.headers();
    let from_xff = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    from_xff.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}

/// Rate-limit key for a request.
pub fn client_key<B>(req: &Request<B>, trusted: &TrustedProxies) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match (peer, forwarded_ip(req)) {
        (Some(peer), Some(forwarded)) if trusted.trusts(&peer) => forwarded.to_string(),
        (Some(peer), Some(forwarded)) => {
            debug!(
                peer = %peer,
                claimed = %forwarded,
                "Ignoring forwarding header from untrusted peer"
            );
            peer.to_string()
        }
        (Some(peer), None) => peer.to_string(),
        (None, _) => UNKNOWN_CLIENT.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(peer: Option<&str>, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/v1/watches");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut()
                .insert(ConnectInfo::<SocketAddr>(peer.parse().unwrap()));
        }
        req
    }

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let everything = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(everything.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_peer_address_is_default_key() {
        let req = request(Some("203.0.113.7:5123"), &[]);
        assert_eq!(client_key(&req, &TrustedProxies::default()), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_header_from_trusted_proxy() {
        let trusted = TrustedProxies::new(&["10.0.0.0/8".to_string()]);
        let req = request(
            Some("10.1.2.3:443"),
            &[("x-forwarded-for", "198.51.100.4, 10.1.2.3")],
        );
        assert_eq!(client_key(&req, &trusted), "198.51.100.4");
    }

    #[test]
    fn test_forwarded_header_from_untrusted_peer_ignored() {
        let trusted = TrustedProxies::new(&["10.0.0.0/8".to_string()]);
        let req = request(Some("203.0.113.7:5123"), &[("x-real-ip", "198.51.100.4")]);
        assert_eq!(client_key(&req, &trusted), "203.0.113.7");
    }

    #[test]
    fn test_forwarded_header_ignored_without_trusted_ranges() {
        let trusted = TrustedProxies::default();
        assert!(!trusted.is_enabled());
        assert!(!trusted.trusts(&"203.0.113.7".parse().unwrap()));

        let req = request(
            Some("203.0.113.7:5123"),
            &[("x-forwarded-for", "198.51.100.4"), ("x-real-ip", "198.51.100.5")],
        );
        assert_eq!(client_key(&req, &trusted), "203.0.113.7");
    }

    #[test]
    fn test_unknown_without_peer() {
        let req = request(None, &[]);
        assert_eq!(client_key(&req, &TrustedProxies::default()), UNKNOWN_CLIENT);

        let req = request(None, &[("x-forwarded-for", "198.51.100.4")]);
        assert_eq!(client_key(&req, &TrustedProxies::default()), UNKNOWN_CLIENT);

        let trusted = TrustedProxies::new(&["10.0.0.0/8".to_string()]);
        let req = request(None, &[("x-real-ip", "198.51.100.4")]);
        assert_eq!(client_key(&req, &trusted), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_garbage_header_falls_back_to_peer() {
        let req = request(Some("203.0.113.7:5123"), &[("x-forwarded-for", "nonsense")]);
        assert_eq!(client_key(&req, &TrustedProxies::default()), "203.0.113.7");
    }
}
