//! End-to-end tests for WebSocket tunnels between a client and a remote node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use node_relay::directory::StaticDirectory;

mod common;

enum RemoteEvent {
    Handshake { path: String, cookie: Option<String> },
    Frame(Message),
    Closed,
}

/// A remote WebSocket endpoint that greets each peer and reports what it sees.
async fn start_remote() -> (SocketAddr, mpsc::UnboundedReceiver<RemoteEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let handshake_tx = tx.clone();
                let callback = move |request: &Request, response: Response| {
                    let cookie = request
                        .headers()
                        .get("cookie")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    let path = request
                        .uri()
                        .path_and_query()
                        .map(|p| p.to_string())
                        .unwrap_or_default();
                    let _ = handshake_tx.send(RemoteEvent::Handshake { path, cookie });
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    return;
                };
                let _ = ws.send(text("hello from remote")).await;

                while let Some(message) = ws.next().await {
                    match message {
                        Ok(Message::Close(_)) | Err(_) => break,
                        Ok(message) => {
                            let _ = tx.send(RemoteEvent::Frame(message));
                        }
                    }
                }
                let _ = tx.send(RemoteEvent::Closed);
            });
        }
    });

    (addr, rx)
}

fn text(s: &str) -> Message {
    Message::Text(s.to_owned().into())
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<RemoteEvent>) -> RemoteEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("remote event timed out")
        .expect("remote stopped")
}

#[tokio::test]
async fn frames_cross_the_tunnel_in_order() {
    let (remote, mut events) = start_remote().await;
    let directory = Arc::new(StaticDirectory::new());
    directory.insert("nodeD", remote.to_string());
    let node = common::start_node(directory, Router::new(), |_| {}).await;

    let mut request = format!("ws://{}/socket?nodeId=nodeD&room=7", node.addr)
        .into_client_request()
        .unwrap();
    request.headers_mut().insert("cookie", "session=abc".parse().unwrap());
    let (mut client, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    match next_event(&mut events).await {
        RemoteEvent::Handshake { path, cookie } => {
            assert_eq!(path, "/socket?nodeId=nodeD&room=7");
            assert_eq!(cookie.as_deref(), Some("session=abc"));
        }
        _ => panic!("expected handshake first"),
    }

    let greeting = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(greeting, text("hello from remote"));

    let payload: Vec<u8> = (0u8..=255).collect();
    client.send(text("one")).await.unwrap();
    client.send(Message::Binary(payload.clone().into())).await.unwrap();
    client.send(text("two")).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        match next_event(&mut events).await {
            RemoteEvent::Frame(message) => received.push(message),
            _ => panic!("expected a frame"),
        }
    }
    assert_eq!(
        received,
        vec![
            text("one"),
            Message::Binary(payload.into()),
            text("two"),
        ]
    );
    assert_eq!(node.tunnels.active_count(), 1);

    client.close(None).await.unwrap();
    assert!(matches!(next_event(&mut events).await, RemoteEvent::Closed));
    assert!(node.tunnels.wait_idle(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn remote_close_ends_client_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let remote = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws.send(text("bye")).await;
                let _ = ws.close(None).await;
                while ws.next().await.is_some() {}
            }
        }
    });

    let directory = Arc::new(StaticDirectory::new());
    directory.insert("nodeD", remote.to_string());
    let node = common::start_node(directory, Router::new(), |_| {}).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/?nodeId=nodeD", node.addr))
        .await
        .unwrap();

    let mut texts = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(message)) = client.next().await {
            if let Message::Text(text) = message {
                texts.push(text.as_str().to_owned());
            }
        }
    })
    .await;

    assert!(drained.is_ok(), "client connection stayed open");
    assert_eq!(texts, vec!["bye".to_string()]);
    assert!(node.tunnels.wait_idle(Duration::from_secs(10)).await);
}

#[tokio::test]
async fn dial_failure_is_reported_on_the_client_socket() {
    let directory = Arc::new(StaticDirectory::new());
    directory.insert("nodeD", common::closed_port().await.to_string());
    let node = common::start_node(directory, Router::new(), |_| {}).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/?nodeId=nodeD", node.addr))
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(10), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match first {
        Message::Text(text) => assert!(text.as_str().starts_with("dial ")),
        other => panic!("expected an error text frame, got {other:?}"),
    }

    let rest = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(message)) = client.next().await {
            if message.is_close() {
                return true;
            }
        }
        true
    })
    .await;
    assert!(rest.is_ok());
    assert!(node.tunnels.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn unknown_node_rejects_the_upgrade() {
    let node = common::start_node(Arc::new(StaticDirectory::new()), Router::new(), |_| {}).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{}/?nodeId=nobody", node.addr))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 500);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn client_gets_the_subprotocol_the_remote_selected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let remote = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let callback = |_: &Request, mut response: Response| {
                response
                    .headers_mut()
                    .insert("sec-websocket-protocol", "v2".parse().unwrap());
                Ok::<_, ErrorResponse>(response)
            };
            if let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await {
                let _ = ws.send(text("negotiated")).await;
                while ws.next().await.is_some() {}
            }
        }
    });

    let directory = Arc::new(StaticDirectory::new());
    directory.insert("nodeD", remote.to_string());
    let node = common::start_node(directory, Router::new(), |_| {}).await;

    let mut request = format!("ws://{}/?nodeId=nodeD", node.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "v1, v2".parse().unwrap());
    let (mut client, response) = tokio_tungstenite::connect_async(request).await.unwrap();

    assert_eq!(response.headers().get("sec-websocket-protocol").unwrap(), "v2");
    let greeting = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(greeting, text("negotiated"));

    client.close(None).await.unwrap();
    assert!(node.tunnels.wait_idle(Duration::from_secs(10)).await);
}
