//! eventsource-server - HTTP server streaming the event log to browsers
//!
//! Serves the merged historic+live stream, the live tail and bounded replay
//! as server-sent events, plus endpoints that publish into the log. Every
//! stream runs as a [`StreamSession`](eventsource_core::StreamSession) owned
//! by the shared [`AppState`].

mod error;
pub mod http;
mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use eventsource_core::{DEFAULT_BATCH_SIZE, EventLog};
use tokio::net::TcpListener;
use tokio::signal;

pub use error::{ApiError, ErrorResponse, ServerError};
pub use http::create_router;
pub use state::{AppState, DEFAULT_KEEP_ALIVE};

/// The eventsource HTTP server
pub struct EventSourceServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl EventSourceServer {
    /// Create a server over an opened event log
    pub fn new(config: ServerConfig, log: &EventLog) -> Self {
        let state = AppState::new(log)
            .with_keep_alive(config.keep_alive)
            .with_batch_size(config.replay_batch_size);

        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("eventsource server listening on {}", addr);

        self.run_with_listener(listener).await
    }

    /// Run on an already bound listener until Ctrl-C, SIGTERM or
    /// [`AppState::shutdown`] is requested.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let token = self.state.shutdown.clone();
        self.run_until(listener, async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = token.cancelled() => {}
            }
        })
        .await
    }

    /// Run on `listener` until `signal` resolves, then drain every stream
    /// session before axum finishes outstanding connections.
    pub async fn run_until<F>(self, listener: TcpListener, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let router = create_router(self.state);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            signal.await;
            state.shutdown().await;
        })
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM and SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
    /// Stored events fetched per page during historic replay
    pub replay_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            keep_alive: DEFAULT_KEEP_ALIVE,
            replay_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:3000")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
