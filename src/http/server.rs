//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the node's local routes
//! - Wire up middleware (tracing, timeout, request ID, relay)
//! - Bind server to listener and serve until shutdown
//! - Apply reloaded relay settings while running
//!
//! # Layer order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → relay ─┬─ remote node
//!                                                    └─ Timeout → local routes
//! ```
//!
//! The request timeout only bounds local handlers. Relayed exchanges are
//! bounded by the relay's own timeouts and keep their 500 responses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{StatusCode, Uri},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::RelayNodeConfig;
use crate::directory::NodeAddressResolver;
use crate::http::middleware::relay_middleware;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown::{drain_tunnels, DEFAULT_DRAIN_WINDOW};
use crate::relay::{LocalIdentity, Relay, TunnelTracker};

/// HTTP server for a relay node.
pub struct HttpServer {
    config: RelayNodeConfig,
    relay: Arc<Relay>,
    local_routes: Router,
}

impl HttpServer {
    /// Create a server that resolves node ids through `directory`.
    pub fn new(config: RelayNodeConfig, directory: Arc<dyn NodeAddressResolver>) -> Self {
        let local = LocalIdentity::from_config(&config);
        let relay = Arc::new(Relay::new(&config.relay, directory, local));
        Self {
            config,
            relay,
            local_routes: Router::new(),
        }
    }

    /// Add application routes served when a request targets this node.
    ///
    /// `/ping` is reserved.
    pub fn with_local_routes(mut self, routes: Router) -> Self {
        self.local_routes = self.local_routes.merge(routes);
        self
    }

    pub fn config(&self) -> &RelayNodeConfig {
        &self.config
    }

    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    pub fn tunnels(&self) -> TunnelTracker {
        self.relay.websocket().tunnels().clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ping", get(ping))
            .merge(self.local_routes.clone())
            .fallback(not_found)
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(from_fn_with_state(Arc::clone(&self.relay), relay_middleware))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configs received on `config_updates` retune the relay clients. The
    /// server stops accepting once `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<RelayNodeConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        self.relay
            .targets()
            .set_local_identity(LocalIdentity::for_listener(addr, &self.config.relay.local_aliases));
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router();

        let relay = Arc::clone(&self.relay);
        let bind_address = self.config.listener.bind_address.clone();
        let updates = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if config.listener.bind_address != bind_address {
                    tracing::warn!(
                        current = %bind_address,
                        requested = %config.listener.bind_address,
                        "Bind address change requires a restart"
                    );
                }
                relay.reconfigure(&config.relay);
                relay
                    .targets()
                    .set_local_identity(LocalIdentity::for_listener(addr, &config.relay.local_aliases));
                tracing::info!("Relay settings reloaded");
            }
        });

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        updates.abort();
        drain_tunnels(&self.tunnels(), DEFAULT_DRAIN_WINDOW).await;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("No route for {}", uri.path()))
}
