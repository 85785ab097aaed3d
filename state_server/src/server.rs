//! State Server Implementation
//!
//! Uses Axum as its HTTP framework and shares an `Arc<StateStore>` across all request
//! handlers. The server itself holds no entry state; every request is answered from the
//! storage directory.
//!
//! # Example
//!
//! ```no_run
//! use state_server::{ServerConfig, StateServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig {
//!         storage_root: "./states".into(),
//!         address: "127.0.0.1:3001".to_string(),
//!         ..Default::default()
//!     };
//!     let server = StateServer::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{any, get};
use state_store::StateStore;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::handlers::{self, ServerState};

pub struct StateServer {
    config: ServerConfig,
    store: Arc<StateStore>,
}

impl StateServer {
    /// Opens the storage root named in `config` and prepares a server over it.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let store = Arc::new(StateStore::open(&config.storage_root)?);
        Ok(Self { config, store })
    }

    /// Creates a server over an already opened store. `config.storage_root` is ignored.
    pub fn from_store(store: Arc<StateStore>, config: ServerConfig) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the router.
    ///
    /// `/` only answers GET (and HEAD); `/{name}` accepts every method and leaves the
    /// method check to the handler, since LOCK and UNLOCK are not standard methods.
    /// Both routes answer other methods with the same plain-text 405.
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::list_states).fallback(handlers::method_not_allowed))
            .route("/{name}", any(handlers::handle_state))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, self.config.request_timeout))
            .layer(TraceLayer::new_for_http())
            .with_state(ServerState {
                store: self.store.clone(),
            })
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.bind_addr()?;
        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Other(format!("Failed to bind to {addr}: {e}")))
    }

    /// Runs the server until Ctrl-C or SIGTERM.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.run_with_listener(listener, shutdown_signal()).await
    }

    /// Runs the server until a message (or hang-up) arrives on `shutdown_rx`.
    pub async fn run_until_stopped(&self, shutdown_rx: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        let listener = self.bind().await?;
        self.run_with_listener(listener, async {
            let _ = shutdown_rx.await;
        })
        .await
    }

    /// Serves on an existing listener until `shutdown` completes.
    pub async fn run_with_listener<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!("state backend listening on {addr}, storage at {:?}", self.store.root());

        axum::serve(listener, self.create_router().into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Other(format!("Server error: {e}")))
    }
}

/// Resolves on Ctrl-C, or on SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
