//! Server-sent event streams
//!
//! Each request opens a [`StreamSession`] that runs in the background and
//! writes into a bounded channel. The receiving half is the response body, so
//! a client that goes away drops the receiver and the session notices.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use eventsource_core::{ChannelSink, Event, EventId, StreamMode, StreamSession};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::ApiError;

/// Header browsers send when an `EventSource` reconnects
pub const LAST_EVENT_ID: &str = "last-event-id";

/// Frames buffered between a session and the response body
const SESSION_BUFFER: usize = 64;

type SseFrame = Result<SseEvent, Infallible>;

/// Query params shared by the stream endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ResumeQuery {
    /// Resume token for clients that cannot set headers
    #[serde(rename = "lastEventId")]
    pub last_event_id: Option<String>,
}

/// GET /sse/historic
///
/// Stored events after the resume token, then live events, without gaps or
/// repeats at the seam.
pub async fn historic(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResumeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token = resume_token(&headers, &query)?;
    open_stream(&state, StreamMode::Merged(token)).await
}

/// GET /sse/live
pub async fn live(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResumeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Ok(Some(token)) = resume_token(&headers, &query) {
        debug!(resume = token, "Live stream ignores resume token");
    }
    open_stream(&state, StreamMode::Live).await
}

/// GET /sse/replay
///
/// Stored events after the resume token; the response ends once the store
/// is drained.
pub async fn replay(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ResumeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let token = resume_token(&headers, &query)?;
    open_stream(&state, StreamMode::Replay(token)).await
}

async fn open_stream(state: &AppState, mode: StreamMode) -> Result<impl IntoResponse + use<>, ApiError> {
    let (tx, rx) = mpsc::channel(SESSION_BUFFER);
    let sink = ChannelSink::new(tx, sse_frame);

    let session = StreamSession::open(
        &state.coordinator,
        mode,
        sink,
        state.shutdown.child_token(),
    )
    .await
    .map_err(|e| {
        warn!(mode = mode.as_str(), error = %e, "Failed to open stream");
        ApiError::from(e)
    })?;

    state.spawn_session(session);

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}

/// Resume token from the `Last-Event-ID` header, falling back to the
/// `lastEventId` query parameter.
fn resume_token(headers: &HeaderMap, query: &ResumeQuery) -> Result<Option<EventId>, ApiError> {
    let header = headers
        .get(LAST_EVENT_ID)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::bad_request("Last-Event-ID header is not valid text"))
        })
        .transpose()?;

    parse_resume_token(header.or(query.last_event_id.as_deref()))
}

/// An empty token means "no token", like a fresh `EventSource`.
pub fn parse_resume_token(raw: Option<&str>) -> Result<Option<EventId>, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(token) => token
            .parse::<EventId>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("invalid resume token: {token:?}"))),
    }
}

fn sse_frame(event: &Event) -> SseFrame {
    let frame = SseEvent::default().id(event.id.to_string());
    // axum rejects event names containing line breaks
    let frame = if event.kind.contains(['\r', '\n']) {
        frame
    } else {
        frame.event(&event.kind)
    };

    let frame = match serde_json::to_string(event) {
        Ok(json) => frame.data(json),
        Err(e) => {
            warn!(event_id = event.id, error = %e, "Failed to serialize event");
            frame.comment("unserializable event")
        }
    };

    Ok(frame)
}
