use crate::config::Config;
use crate::registry::Registry;
use crate::scanner::Scanner;
use crate::session::DeviceConnector;
use crate::store::DeviceStore;
use crate::store::StoreError;
use crate::supervisor::Supervisor;
use camfinder_protocol::Acknowledgement;
use camfinder_protocol::DeviceListing;
use camfinder_protocol::DiscoveryOptions;
use camfinder_protocol::DiscoveryReply;
use camfinder_protocol::Request;
use camfinder_protocol::Response;
use camfinder_protocol::Snapshot;
use std::sync::Arc;

/// Entry point for every command the discovery service accepts.
pub struct Service {
    config: Config,
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
    scanner: Scanner,
}

impl Service {
    pub fn new(
        config: Config,
        connector: Arc<dyn DeviceConnector + Send + Sync>,
        store: Arc<dyn DeviceStore + Send + Sync>,
    ) -> Self {
        let registry = Arc::new(Registry::new(
            store.clone(),
            config.namespace.clone(),
            config.rediscovery,
        ));
        let supervisor = Arc::new(Supervisor::new(
            connector.clone(),
            store.clone(),
            config.step_timeout,
        ));
        let scanner = Scanner::new(
            connector,
            store,
            registry.clone(),
            supervisor.clone(),
            config.step_timeout,
        );
        Self {
            config,
            registry,
            supervisor,
            scanner,
        }
    }

    /// Resets leftovers of a previous run and connects to the registered devices.
    pub async fn start(&self) -> Result<(), StoreError> {
        self.scanner.abandon().await;
        self.supervisor.refresh_connections().await
    }

    pub async fn shutdown(&self) {
        self.scanner.abandon().await;
        log::info!("Cleaned everything up");
    }

    pub async fn discovery(&self, options: DiscoveryOptions) -> DiscoveryReply {
        let request = self.config.scan_request(options);
        match self.scanner.start_scan(request).await {
            Ok(report) => DiscoveryReply {
                error: None,
                devices: report.devices,
                new_instances: report.new_devices,
            },
            Err(e) => {
                log::info!("Discovery not performed: {}", e);
                DiscoveryReply {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    pub async fn get_devices(&self) -> Result<Vec<DeviceListing>, StoreError> {
        self.registry.list_devices().await
    }

    pub async fn delete_device(&self, id: &str) -> Result<(), StoreError> {
        if let Some(id) = self.registry.delete_device(id).await? {
            self.supervisor.remove(&id).await;
        }
        Ok(())
    }

    /// `None` if the device has no live connection.
    pub async fn get_snapshot(&self, id: &str) -> Option<Snapshot> {
        let id = crate::id::unqualify(&self.config.namespace, id);
        let snapshot = match self.supervisor.get_snapshot(id).await? {
            Ok(image) => Snapshot {
                image: Some(image),
                error: None,
            },
            Err(e) => Snapshot {
                image: None,
                error: Some(e.to_string()),
            },
        };
        Some(snapshot)
    }

    /// Executes one command. `None` means the command produces no response.
    pub async fn handle(&self, request: Request) -> Result<Option<Response>, StoreError> {
        let response = match request {
            Request::Discovery(options) => {
                log::debug!("Received a discovery command");
                Response::Discovery(self.discovery(options).await)
            }
            Request::GetDevices => Response::GetDevices(self.get_devices().await?),
            Request::DeleteDevice(device) => {
                self.delete_device(&device.id).await?;
                Response::DeleteDevice(Acknowledgement {})
            }
            Request::GetSnapshot(device) => match self.get_snapshot(&device.id).await {
                Some(snapshot) => Response::GetSnapshot(snapshot),
                None => return Ok(None),
            },
        };
        Ok(Some(response))
    }
}
