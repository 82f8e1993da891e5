//! Relay middleware.
//! Decides per request whether this node serves it or a remote node does.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, FromRequestParts, State},
    http::{header, Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::request::RequestIdExt;
use crate::observability::metrics;
use crate::relay::headers::append_forwarded_for;
use crate::relay::http::target_uri;
use crate::relay::{Relay, RelayError, RelayTarget};

pub async fn relay_middleware(
    State(relay): State<Arc<Relay>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let target = relay.targets().resolve(request.uri(), request.headers()).await;
    let websocket = is_websocket_upgrade(&request);
    let kind = if websocket { "websocket" } else { "http" };

    let (node_id, address) = match target {
        RelayTarget::Local => return next.run(request).await,
        RelayTarget::Unknown { node_id } => {
            tracing::warn!(
                request_id = %request.request_id(),
                node_id = %node_id,
                "Relay target node not known"
            );
            let err = RelayError::NodeUnknown(node_id);
            metrics::record_relay(kind, err.outcome(), start);
            return err.into_response();
        }
        RelayTarget::Remote { node_id, address } => (node_id, address),
    };

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    tracing::debug!(
        request_id = %request.request_id(),
        method = %request.method(),
        path = %request.uri().path(),
        node_id = %node_id,
        address = %address,
        kind,
        "Relaying request"
    );

    if websocket {
        return upgrade_and_relay(relay, request, &address, client_ip, start).await;
    }

    let request_id = request.request_id().to_string();
    match relay.http().forward(request, &address, client_ip).await {
        Ok(response) => {
            metrics::record_relay(kind, "ok", start);
            response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, node_id = %node_id, error = %e, "Relay request failed");
            metrics::record_relay(kind, e.outcome(), start);
            e.into_response()
        }
    }
}

/// Dial the remote node, then answer the client's upgrade with the
/// subprotocol the remote selected and hand both sockets to the tunnel.
async fn upgrade_and_relay(
    relay: Arc<Relay>,
    request: Request<Body>,
    address: &str,
    client_ip: Option<IpAddr>,
    start: Instant,
) -> Response {
    let target = match target_uri("ws", address, request.uri()) {
        Ok(uri) => uri.to_string(),
        Err(e) => return e.into_response(),
    };

    let mut headers = request.headers().clone();
    if let Some(ip) = client_ip {
        append_forwarded_for(&mut headers, ip);
    }

    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    let upgrade = upgrade.on_failed_upgrade(|e| tracing::warn!(error = %e, "Client WebSocket upgrade failed"));

    match relay.websocket().dial(&target, &headers).await {
        Ok(remote) => {
            let selected: Vec<String> = remote.protocol().map(str::to_owned).into_iter().collect();
            upgrade.protocols(selected).on_upgrade(move |socket| async move {
                relay.websocket().tunnel(socket, remote, start).await;
            })
        }
        Err(e) => upgrade.on_upgrade(move |socket| async move {
            relay.websocket().reject(socket, e, start).await;
        }),
    }
}

fn is_websocket_upgrade(request: &Request<Body>) -> bool {
    request.method() == Method::GET
        && request
            .headers()
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').any(|p| p.trim().eq_ignore_ascii_case("websocket")))
            .unwrap_or(false)
}
