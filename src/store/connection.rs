//! Store connection and its one-shot readiness signal.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::info;

use super::memory::MemoryStore;
use crate::config::DbConfig;
use crate::error::StoreError;

/// A pending store connection.
///
/// The store is opened on a background task; [`Connection::ready`] resolves
/// once it is usable. `ready` consumes the connection, so readiness can be
/// observed at most once.
pub struct Connection {
    ready_rx: oneshot::Receiver<Result<Arc<MemoryStore>, StoreError>>,
}

impl Connection {
    /// Wait for the store to become ready.
    pub async fn ready(self) -> Result<Arc<MemoryStore>, StoreError> {
        self.ready_rx
            .await
            .map_err(|_| StoreError::Read("store connection closed before ready".into()))?
    }
}

/// Start connecting to the store described by `config`.
///
/// Must be called inside a Tokio runtime.
pub fn connect(config: &DbConfig) -> Connection {
    let (ready_tx, ready_rx) = oneshot::channel();
    let emulate = config.emulate;
    let path = config.path.clone();

    tokio::spawn(async move {
        let opened = if emulate {
            info!("emulating identity store in memory");
            Ok(MemoryStore::new())
        } else {
            info!(path = %path.display(), "opening identity store snapshot");
            MemoryStore::open(&path).await
        };
        // Receiver gone means nobody is waiting for readiness any more.
        let _ = ready_tx.send(opened.map(Arc::new));
    });

    Connection { ready_rx }
}
