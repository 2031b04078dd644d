//! Client address extraction for the admission gate.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::state::AppState;

/// The address a request is attributed to.
///
/// Forwarding headers are only believed when the socket peer is a trusted
/// proxy (`server.trusted_proxies`). From a trusted peer the order is: first
/// `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address. Any
/// other peer is attributed to its own socket address. Requests without a
/// known peer are attributed to `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    /// Resolve from headers, the peer address and the trusted proxy list.
    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxies: &[String]) -> Self {
        let Some(peer) = peer else {
            return Self("unknown".to_string());
        };

        if !is_trusted(peer.ip(), trusted_proxies) {
            return Self(peer.ip().to_string());
        }

        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let ip = forwarded
            .or_else(real_ip)
            .map(str::to_string)
            .unwrap_or_else(|| peer.ip().to_string());

        Self(ip)
    }
}

fn is_trusted(peer: IpAddr, trusted_proxies: &[String]) -> bool {
    let peer = peer.to_canonical();
    trusted_proxies
        .iter()
        .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
        .any(|trusted| trusted.to_canonical() == peer)
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::resolve(
            &parts.headers,
            peer,
            &state.config.server.trusted_proxies,
        ))
    }
}
