use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};

use crate::error::ProxyError;

/// Caller address: `x-real-ip`, then the first non-empty `x-forwarded-for`
/// entry, then the socket peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let remote_ip = peer.map(|addr| addr.ip().to_string());

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .trim_start_matches("::ffff:")
        .to_string()
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        Ok(ClientIp(resolve_client_ip(&parts.headers, peer)))
    }
}

/// Loopback callers have no useful location, so they are looked up as
/// `substitute` instead.
pub fn substitute_loopback(ip: &str, substitute: &str) -> String {
    match ip {
        "127.0.0.1" | "::1" | "localhost" => substitute.to_string(),
        other => other.to_string(),
    }
}

/// First non-empty value among `names`.
pub fn first_param<'a>(params: &'a BTreeMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| params.get(*name))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

pub fn require_param<'a>(
    params: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, ProxyError> {
    first_param(params, &[name]).ok_or(ProxyError::MissingParameter(name))
}

/// Drops parameters whose value is empty; they must not reach upstream or
/// change the cache key.
pub fn non_empty_params(params: BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .collect()
}
