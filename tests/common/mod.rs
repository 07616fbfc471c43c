//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response},
};
use hop_trace::{HttpServer, ServiceConfig, Shutdown};
use tokio::net::TcpListener;

/// Host address used by test servers. Keeps classification independent of the machine.
pub const TEST_HOST: &str = "198.51.100.10";

/// Default config with a fixed host address.
pub fn test_config(host: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.propagation.host_address = Some(host.parse().unwrap());
    config
}

/// Build a request as if it arrived from `peer`.
pub fn request_from(peer: &str, builder: axum::http::request::Builder) -> Request<Body> {
    let mut req = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = format!("{peer}:40000").parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

/// Same as [`request_from`] for IPv6 peers.
#[allow(dead_code)]
pub fn request_from_v6(peer: &str, builder: axum::http::request::Builder) -> Request<Body> {
    let mut req = builder.body(Body::empty()).unwrap();
    let addr: SocketAddr = format!("[{peer}]:40000").parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

/// Read a JSON body.
#[allow(dead_code)]
pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a server on an ephemeral loopback port.
#[allow(dead_code)]
pub async fn spawn_server(config: ServiceConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let signal = shutdown.signalled();

    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, shutdown)
}
