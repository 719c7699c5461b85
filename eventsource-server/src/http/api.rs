//! REST API handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use eventsource_core::{Event, PublishError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::AppState;
use crate::error::ApiError;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Number of open SSE streams
    pub active_sessions: usize,
    /// Number of live subscriptions held by those streams
    pub live_subscriptions: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.active_sessions(),
        live_subscriptions: state.live_subscriptions(),
    })
}

/// Body of POST /api/events
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Response when the event was stored but live subscribers missed it
#[derive(Debug, Serialize, Deserialize)]
pub struct PartialPublishResponse {
    pub event: Event,
    pub warning: String,
}

/// GET /triggerEvent
///
/// Publishes a `Ping` event with an empty payload.
pub async fn trigger_event(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    publish_response(state.publisher.ping().await, StatusCode::OK)
}

/// POST /api/events
pub async fn publish_event(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> Result<Response, ApiError> {
    if request.kind.trim().is_empty() {
        return Err(ApiError::bad_request("event type must not be empty"));
    }
    if request.kind.contains(['\r', '\n']) {
        return Err(ApiError::bad_request(
            "event type must not contain line breaks",
        ));
    }

    publish_response(
        state.publisher.publish(request.kind, request.payload).await,
        StatusCode::CREATED,
    )
}

fn publish_response(
    result: Result<Event, PublishError>,
    status: StatusCode,
) -> Result<Response, ApiError> {
    match result {
        Ok(event) => Ok((status, Json(event)).into_response()),
        Err(PublishError::Broadcast { event, source }) => {
            warn!(event_id = event.id, error = %source, "Responding with partial publish");
            Ok((
                StatusCode::ACCEPTED,
                Json(PartialPublishResponse {
                    event: *event,
                    warning: format!("stored but not broadcast: {source}"),
                }),
            )
                .into_response())
        }
        Err(e) => Err(ApiError::from(e)),
    }
}
