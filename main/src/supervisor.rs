use crate::session::Candidate;
use crate::session::DeviceConnector;
use crate::session::DeviceSession;
use crate::session::SessionError;
use crate::store::DeviceStore;
use crate::store::RegistryEntry;
use crate::store::StoreError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Open session of a registered device, `None` if connecting failed.
type LiveConnection = Option<Arc<dyn DeviceSession + Send + Sync>>;

/// Keeps a session open with every registered device.
pub struct Supervisor {
    connector: Arc<dyn DeviceConnector + Send + Sync>,
    store: Arc<dyn DeviceStore + Send + Sync>,
    timeout: Duration,
    connections: RwLock<HashMap<String, LiveConnection>>,
}

impl Supervisor {
    pub fn new(
        connector: Arc<dyn DeviceConnector + Send + Sync>,
        store: Arc<dyn DeviceStore + Send + Sync>,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            store,
            timeout,
            connections: Default::default(),
        }
    }

    /// Replaces all live connections with fresh sessions for the registered devices.
    ///
    /// Failed connections are logged and not retried.
    pub async fn refresh_connections(&self) -> Result<(), StoreError> {
        let entries = self.store.list_devices().await?;
        let total = entries.len();
        let connections: HashMap<_, _> =
            futures_util::future::join_all(entries.into_iter().map(|e| self.connect(e)))
                .await
                .into_iter()
                .collect();
        let connected = connections.values().filter(|c| c.is_some()).count();
        log::info!("Connected to {} of {} devices", connected, total);
        *self.connections.write().await = connections;
        Ok(())
    }

    async fn connect(&self, entry: RegistryEntry) -> (String, LiveConnection) {
        self.mark(&entry.id, false).await;
        let candidate = Candidate {
            address: entry.data.address,
            port: entry.data.port,
            credentials: entry.data.credentials,
        };
        let session = crate::session::with_timeout(
            self.timeout,
            self.connector.connect(&candidate, self.timeout),
        )
        .await;
        match session {
            Ok(session) => {
                self.mark(&entry.id, true).await;
                (entry.id, Some(Arc::from(session)))
            }
            Err(e) => {
                log::warn!(
                    "Failed to connect to device {} at {}: {}",
                    entry.id,
                    candidate.name(),
                    e
                );
                (entry.id, None)
            }
        }
    }

    async fn mark(&self, id: &str, connected: bool) {
        let key = crate::store::connected_state(id);
        if let Err(e) = self.store.set_state(key, Value::Bool(connected)).await {
            log::warn!("Failed to record connectivity of device {}: {}", id, e);
        }
    }

    /// Requests one snapshot from a connected device.
    ///
    /// `None` means the device has no open session and nothing was requested.
    pub async fn get_snapshot(&self, id: &str) -> Option<Result<Vec<u8>, SessionError>> {
        let session = self
            .connections
            .read()
            .await
            .get(id)
            .and_then(Clone::clone)?;
        Some(crate::session::with_timeout(self.timeout, session.get_snapshot()).await)
    }

    /// Drops the live connection of a removed device.
    pub async fn remove(&self, id: &str) {
        self.connections.write().await.remove(id);
    }
}
