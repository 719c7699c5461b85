//! HTTP server module

mod api;
mod sse;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::AppState;

pub use api::{HealthResponse, PartialPublishResponse, PublishRequest};
pub use sse::{LAST_EVENT_ID, ResumeQuery, parse_resume_token};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sse/historic", get(sse::historic))
        .route("/sse/live", get(sse::live))
        .route("/sse/replay", get(sse::replay))
        .route("/triggerEvent", get(api::trigger_event).post(api::trigger_event))
        .route("/api/events", post(api::publish_event))
        .route("/api/health", get(api::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use eventsource_core::{Event, PING};
    use serde_json::json;

    use crate::error::ErrorResponse;

    fn test_server() -> (Arc<AppState>, TestServer) {
        let state = Arc::new(AppState::new_for_testing());
        let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();
        (state, server)
    }

    #[tokio::test]
    async fn test_router_has_health_endpoint() {
        let (_state, server) = test_server();

        let response = server.get("/api/health").await;
        response.assert_status_ok();

        let health: HealthResponse = response.json();
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_sessions, 0);
        assert_eq!(health.live_subscriptions, 0);
    }

    #[tokio::test]
    async fn trigger_event_publishes_ping() {
        let (_state, server) = test_server();

        let first: Event = server.get("/triggerEvent").await.json();
        let second: Event = server.get("/triggerEvent").await.json();

        assert_eq!(first.kind, PING);
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.payload, json!({}));
    }

    #[tokio::test]
    async fn trigger_event_accepts_post() {
        let (_state, server) = test_server();
        server.get("/triggerEvent").await.assert_status_ok();

        let response = server.post("/triggerEvent").await;
        response.assert_status_ok();

        let event: Event = response.json();
        assert_eq!(event.id, 2);
        assert_eq!(event.kind, PING);
    }

    #[tokio::test]
    async fn publish_event_returns_created() {
        let (_state, server) = test_server();

        let response = server
            .post("/api/events")
            .json(&json!({"type": "OrderPlaced", "payload": {"order": 7}}))
            .await;
        response.assert_status(StatusCode::CREATED);

        let event: Event = response.json();
        assert_eq!(event.id, 1);
        assert_eq!(event.kind, "OrderPlaced");
        assert_eq!(event.payload["order"], 7);
    }

    #[tokio::test]
    async fn publish_event_without_payload_defaults_to_null() {
        let (_state, server) = test_server();

        let event: Event = server
            .post("/api/events")
            .json(&json!({"type": "Marker"}))
            .await
            .json();
        assert!(event.payload.is_null());
    }

    #[tokio::test]
    async fn publish_event_rejects_multiline_type() {
        let (_state, server) = test_server();

        let response = server
            .post("/api/events")
            .json(&json!({"type": "a\nb"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json();
        assert!(body.error.contains("line breaks"));
    }

    #[tokio::test]
    async fn publish_event_rejects_empty_type() {
        let (_state, server) = test_server();

        let response = server
            .post("/api/events")
            .json(&json!({"type": " "}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_resume_token_is_rejected() {
        let (state, server) = test_server();

        let response = server
            .get("/sse/historic")
            .add_header(
                axum::http::HeaderName::from_static(LAST_EVENT_ID),
                axum::http::HeaderValue::from_static("not-a-number"),
            )
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body: ErrorResponse = response.json();
        assert!(body.error.contains("invalid resume token"));
        assert_eq!(state.live_subscriptions(), 0);
    }

    #[tokio::test]
    async fn malformed_query_token_is_rejected() {
        let (_state, server) = test_server();

        let response = server.get("/sse/replay?lastEventId=x1").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
