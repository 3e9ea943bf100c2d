//! Determining the network address a request came from

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, response::IntoResponse};
use http::{request::Parts, HeaderMap};

use crate::error::ApiError;

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Resolves the address a request should be attributed to
///
/// A parseable `X-Real-IP` header wins. Otherwise the first entry of
/// `X-Forwarded-For` that parses as an address is used, and failing that the
/// address of the connected peer.
pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let real_ip: Option<IpAddr> = headers
        .get(X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok());

    let forwarded = || {
        headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .find_map(|entry| entry.trim().parse::<IpAddr>().ok())
    };

    real_ip
        .or_else(forwarded)
        .or_else(|| peer.map(|p| p.ip()))
}

/// The resolved source address of a request
///
/// Rejects the request with `403 Forbidden` if no address can be determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceAddress(pub IpAddr);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for SourceAddress
where
    S: Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request_parts(req: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = req
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        resolve(&req.headers, peer)
            .map(SourceAddress)
            .ok_or_else(|| ApiError::UndeterminedAddress.into_response())
    }
}
