//! HTTP request/response relaying.
//!
//! # Data Flow
//! ```text
//! Client request ──▶ strip hop headers, X-Forwarded-For ──▶ remote node
//! Client ◀── strip hop headers, status + body verbatim ◀── remote response
//! ```
//!
//! # Design Decisions
//! - Bodies are streamed in both directions, never buffered
//! - Path and raw query are copied verbatim into the target URL
//! - One attempt per request; failures map to a 500 with a plain-text body
//! - The client lives behind an `ArcSwap` so a config reload can replace it
//!   while other relays are in flight

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{header, Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::headers::{append_forwarded_for, strip_hop_headers};

/// Client used for outbound relay requests.
pub type RelayClient = Client<HttpConnector, Body>;

#[derive(Debug)]
struct ClientSettings {
    client: RelayClient,
    timeout: Duration,
}

/// Forwards single HTTP exchanges to remote nodes.
#[derive(Debug)]
pub struct HttpRelay {
    settings: ArcSwap<ClientSettings>,
}

impl HttpRelay {
    pub fn new(config: &RelayConfig) -> Self {
        Self::with_client(build_client(config), config.request_timeout())
    }

    /// Use an externally built client.
    pub fn with_client(client: RelayClient, timeout: Duration) -> Self {
        Self {
            settings: ArcSwap::from_pointee(ClientSettings { client, timeout }),
        }
    }

    /// Replace the client and timeout. In-flight relays keep the old ones.
    pub fn reconfigure(&self, config: &RelayConfig) {
        self.settings.store(Arc::new(ClientSettings {
            client: build_client(config),
            timeout: config.request_timeout(),
        }));
        tracing::info!(
            request_timeout = ?config.request_timeout(),
            connect_timeout = ?config.connect_timeout(),
            "HTTP relay client reconfigured"
        );
    }

    pub fn timeout(&self) -> Duration {
        self.settings.load().timeout
    }

    /// Forward `request` to the node at `address`.
    ///
    /// `client_ip` is appended to X-Forwarded-For when known.
    pub async fn forward(
        &self,
        request: Request<Body>,
        address: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<Response<Body>, RelayError> {
        let (parts, body) = request.into_parts();
        let uri = target_uri("http", address, &parts.uri)?;

        let mut headers = parts.headers;
        // The client derives Host from the target authority.
        headers.remove(header::HOST);
        strip_hop_headers(&mut headers);
        if let Some(ip) = client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        let mut outbound = Request::new(body);
        *outbound.method_mut() = parts.method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        let settings = self.settings.load_full();
        let response = match tokio::time::timeout(settings.timeout, settings.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(RelayError::Unreachable {
                    address: address.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(RelayError::Timeout {
                    address: address.to_string(),
                    after: settings.timeout,
                })
            }
        };

        tracing::debug!(address = %address, status = %response.status(), "Relay response received");

        let (mut parts, body) = response.into_parts();
        strip_hop_headers(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

fn build_client(config: &RelayConfig) -> RelayClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout()));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// `scheme://address` + the original path and raw query, verbatim.
pub fn target_uri(scheme: &str, address: &str, original: &Uri) -> Result<Uri, RelayError> {
    let mut target = format!("{scheme}://{address}{}", original.path());
    if let Some(query) = original.query().filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    target.parse::<Uri>().map_err(|e| RelayError::InvalidTarget {
        reason: e.to_string(),
        target,
    })
}
