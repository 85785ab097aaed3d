//! A running server over a temporary storage root, for integration tests.

use std::path::Path;
use std::sync::Arc;

use state_store::StateStore;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::server::StateServer;

/// Serves a fresh, temporary storage root on an ephemeral localhost port.
///
/// Gives access both to the HTTP endpoint and to the underlying [`StateStore`], so tests can
/// check server behavior against the files on disk. The server is stopped and the directory
/// removed when this is dropped.
pub struct TestServer {
    endpoint: String,
    config: ServerConfig,
    store: Arc<StateStore>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
    _tmp_dir: TempDir,
}

type Launched = (String, Arc<StateStore>, oneshot::Sender<()>, JoinHandle<Result<()>>);

/// Opens the store named by `config`, binds an ephemeral port and serves it in the background.
async fn launch(config: &mut ServerConfig) -> Launched {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().expect("Listener has no local address");
    config.address = addr.to_string();

    let server = StateServer::new(config.clone()).expect("Failed to open state store");
    let store = server.store();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        server
            .run_with_listener(listener, async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    (format!("http://{addr}"), store, shutdown_tx, handle)
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_config(|_| {}).await
    }

    /// Starts a server after letting `configure` adjust the default configuration.
    /// The storage root and address are always replaced by temporary ones.
    pub async fn start_with_config(configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let tmp_dir = TempDir::new().expect("Failed to create temporary storage root");

        let mut config = ServerConfig::default();
        configure(&mut config);
        config.storage_root = tmp_dir.path().to_path_buf();

        let (endpoint, store, shutdown_tx, handle) = launch(&mut config).await;

        Self {
            endpoint,
            config,
            store,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            _tmp_dir: tmp_dir,
        }
    }

    /// Stops the running server and starts a new one over the same storage root.
    /// The new server opens its own store and listens on a new port.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;

        let (endpoint, store, shutdown_tx, handle) = launch(&mut self.config).await;
        self.endpoint = endpoint;
        self.store = store;
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Base URL, without a trailing slash.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// URL of the state called `name`.
    pub fn url(&self, name: &str) -> String {
        format!("{}/{name}", self.endpoint)
    }

    pub fn store(&self) -> Arc<StateStore> {
        self.store.clone()
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Stops the server and waits for it to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop().await
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| ServerError::Other(format!("Server task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
