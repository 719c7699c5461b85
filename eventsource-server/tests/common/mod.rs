//! Shared test utilities for eventsource-server integration tests

#![allow(dead_code)]

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eventsource_core::Event;
use eventsource_server::http::HealthResponse;
use eventsource_server::{AppState, EventSourceServer, ServerConfig};
use tokio::net::TcpListener;

/// Creates a test server over in-memory backends, returns state and address
pub async fn create_test_server() -> (Arc<AppState>, SocketAddr) {
    create_test_server_with_state(AppState::new_for_testing()).await
}

/// Creates a test server over custom state
pub async fn create_test_server_with_state(state: AppState) -> (Arc<AppState>, SocketAddr) {
    let state = Arc::new(state);
    let server = EventSourceServer::with_state(ServerConfig::default(), Arc::clone(&state));
    let addr = spawn_server(server).await;

    (state, addr)
}

/// Spawns server in background task, returns bound address
pub async fn spawn_server(server: EventSourceServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}

/// Publish a Ping through the HTTP trigger endpoint
pub async fn trigger(addr: SocketAddr) -> Event {
    let response = reqwest::get(format!("http://{}/triggerEvent", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    response.json().await.unwrap()
}

pub async fn health(addr: SocketAddr) -> HealthResponse {
    reqwest::get(format!("http://{}/api/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Poll health until `live_subscriptions` reaches `expected`
pub async fn wait_for_subscriptions(addr: SocketAddr, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = health(addr).await.live_subscriptions;
        if current == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {expected} live subscriptions, still {current}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn ids(events: &[Event]) -> Vec<u64> {
    events.iter().map(|e| e.id).collect()
}
