//! Server-sent events test client
//!
//! Reads the streamed response body chunk by chunk and splits it into frames.
//!
//! Note: Some methods may appear unused because they're only used in specific
//! test files and clippy checks each test independently.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use eventsource_core::Event;
use reqwest::Response;
use reqwest::header::HeaderMap;

/// One dispatched SSE frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseFrame {
    pub id: Option<String>,
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Deserialize the data field as an event
    pub fn decode(&self) -> Event {
        serde_json::from_str(&self.data).expect("frame data is not an event")
    }
}

/// Streaming SSE connection
pub struct SseClient {
    response: Response,
    buffer: Vec<u8>,
}

impl SseClient {
    /// Open `path`, optionally sending a `Last-Event-ID` header
    pub async fn connect(addr: SocketAddr, path: &str, last_event_id: Option<&str>) -> Self {
        let mut request = reqwest::Client::new().get(format!("http://{}{}", addr, path));
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }
        let response = request.send().await.expect("Failed to connect");
        assert!(
            response.status().is_success(),
            "stream request failed: {}",
            response.status()
        );

        Self {
            response,
            buffer: Vec::new(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Next frame carrying data, skipping keep-alive comments.
    /// Returns None when the server ends the response.
    pub async fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            if let Some(raw) = self.take_raw_frame() {
                let frame = parse_frame(&raw);
                if frame.id.is_some() || !frame.data.is_empty() {
                    return Some(frame);
                }
                continue;
            }

            match self.response.chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => return None,
                Err(e) => panic!("SSE body error: {}", e),
            }
        }
    }

    /// Next event, panicking if the stream ends first
    pub async fn next_event(&mut self) -> Event {
        self.next_frame().await.expect("stream ended").decode()
    }

    /// Next event, or None if nothing arrives within `duration`
    pub async fn next_event_timeout(&mut self, duration: Duration) -> Option<Event> {
        tokio::time::timeout(duration, self.next_frame())
            .await
            .ok()
            .flatten()
            .map(|frame| frame.decode())
    }

    /// Collect the next `n` events
    pub async fn events(&mut self, n: usize) -> Vec<Event> {
        let mut events = Vec::with_capacity(n);
        for _ in 0..n {
            let event = tokio::time::timeout(Duration::from_secs(5), self.next_event())
                .await
                .expect("timed out waiting for event");
            events.push(event);
        }
        events
    }

    /// Read until the server ends the response
    pub async fn remaining_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.next_frame())
                .await
                .expect("timed out waiting for end of stream");
            match frame {
                Some(frame) => events.push(frame.decode()),
                None => return events,
            }
        }
    }

    fn take_raw_frame(&mut self) -> Option<String> {
        let end = self.buffer.windows(2).position(|w| w == b"\n\n")?;
        let raw: Vec<u8> = self.buffer.drain(..end + 2).collect();
        Some(String::from_utf8(raw).expect("frame is not UTF-8"))
    }
}

fn parse_frame(raw: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "id" => frame.id = Some(value.to_string()),
            "event" => frame.event = Some(value.to_string()),
            "data" => data.push(value.to_string()),
            _ => {}
        }
    }

    frame.data = data.join("\n");
    frame
}

