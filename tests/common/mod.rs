//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use node_relay::config::RelayNodeConfig;
use node_relay::directory::NodeAddressResolver;
use node_relay::http::HttpServer;
use node_relay::lifecycle::Shutdown;
use node_relay::relay::TunnelTracker;

/// A request as a mock backend saw it on the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start a backend that records each request and answers with `body` plus
/// `extra_headers` (raw `Name: value\r\n` lines).
pub async fn start_recording_backend(
    extra_headers: &'static str,
    body: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(socket);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
                    return;
                }

                let mut headers = Vec::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
                    }
                }

                let length = headers
                    .iter()
                    .find(|(n, _)| n == "content-length")
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                let mut request_body = vec![0u8; length];
                if reader.read_exact(&mut request_body).await.is_err() {
                    return;
                }

                let _ = tx.send(RecordedRequest {
                    request_line: request_line.trim_end().to_string(),
                    headers,
                    body: request_body,
                });

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
                    body.len(),
                    extra_headers,
                    body
                );
                let mut socket = reader.into_inner();
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Local routes that count how often they were hit.
pub fn counting_routes(counter: Arc<AtomicUsize>, body: &'static str) -> Router {
    Router::new().route(
        "/api/items",
        axum::routing::any(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                body
            }
        }),
    )
}

/// A relay node running on an ephemeral loopback port.
pub struct TestNode {
    pub addr: SocketAddr,
    pub tunnels: TunnelTracker,
    pub shutdown: Shutdown,
}

/// Start a node that resolves ids through `directory` and serves `routes`
/// locally.
pub async fn start_node(
    directory: Arc<dyn NodeAddressResolver>,
    routes: Router,
    tweak: impl FnOnce(&mut RelayNodeConfig),
) -> TestNode {
    start_node_on("127.0.0.1:0", directory, routes, tweak).await
}

/// Like [`start_node`] but listening on `bind`. `TestNode::addr` is always
/// a connectable loopback address.
pub async fn start_node_on(
    bind: &str,
    directory: Arc<dyn NodeAddressResolver>,
    routes: Router,
    tweak: impl FnOnce(&mut RelayNodeConfig),
) -> TestNode {
    let listener = TcpListener::bind(bind).await.unwrap();
    let bound = listener.local_addr().unwrap();
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), bound.port());

    let mut config = RelayNodeConfig::default();
    config.listener.bind_address = bound.to_string();
    tweak(&mut config);

    let server = HttpServer::new(config, directory).with_local_routes(routes);
    let tunnels = server.tunnels();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    TestNode {
        addr,
        tunnels,
        shutdown,
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
