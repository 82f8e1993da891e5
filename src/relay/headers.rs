//! Header rules shared by every forwarding path.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers (RFC 7230 §6.1) from outbound requests and
//!   relayed responses
//! - Maintain the X-Forwarded-For chain
//!
//! # Design Decisions
//! - `HeaderMap` names are already case-normalized, so removal by name is
//!   case-insensitive regardless of how the peer spelled them
//! - Prior X-Forwarded-For values are folded into a single header

use std::net::IpAddr;

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Connection-scoped headers that never cross a relay hop.
pub const HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    HeaderName::from_static("trailers"),
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Returns true if `name` belongs to the hop-by-hop set.
pub fn is_hop_header(name: &HeaderName) -> bool {
    HOP_HEADERS.iter().any(|hop| hop == name)
}

/// Remove every hop-by-hop header.
pub fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in &HOP_HEADERS {
        headers.remove(name);
    }
}

/// Append `client_ip` to the X-Forwarded-For chain.
///
/// Existing values (possibly spread over several header lines) are joined
/// with ", " and the current hop's IP goes last.
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client_ip)
    };

    match HeaderValue::from_str(&chain) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unrepresentable X-Forwarded-For"),
    }
}
