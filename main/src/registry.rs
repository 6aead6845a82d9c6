use crate::config::Rediscovery;
use crate::store::DeviceStore;
use crate::store::RegistryEntry;
use crate::store::StoreError;
use camfinder_protocol::DeviceListing;
use camfinder_protocol::DeviceProfile;
use std::collections::HashSet;
use std::sync::Arc;

/// Reconciles scan results with the persisted devices.
pub struct Registry {
    store: Arc<dyn DeviceStore + Send + Sync>,
    namespace: String,
    rediscovery: Rediscovery,
}

impl Registry {
    pub fn new(
        store: Arc<dyn DeviceStore + Send + Sync>,
        namespace: String,
        rediscovery: Rediscovery,
    ) -> Self {
        Self {
            store,
            namespace,
            rediscovery,
        }
    }

    /// Registers every profile whose ID is unknown and returns those.
    ///
    /// Known IDs are left alone unless [`Rediscovery::Replace`] is configured.
    pub async fn reconcile(
        &self,
        profiles: &[DeviceProfile],
    ) -> Result<Vec<DeviceProfile>, StoreError> {
        let mut known: HashSet<String> = self
            .store
            .list_devices()
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect();

        let mut new_devices = vec![];
        for profile in profiles {
            if known.contains(&profile.id) {
                if self.rediscovery == Rediscovery::Replace {
                    log::debug!("Replacing data of device {}", profile.id);
                    self.store
                        .extend_device(profile.id.clone(), profile.clone())
                        .await?;
                }
                continue;
            }
            if self
                .store
                .create_device_if_absent(RegistryEntry::device(profile.clone()))
                .await?
            {
                log::info!("Registered new device {}", profile.name);
                new_devices.push(profile.clone());
            }
            known.insert(profile.id.clone());
        }
        Ok(new_devices)
    }

    /// All registered devices with the names of the rooms they belong to.
    pub async fn list_devices(&self) -> Result<Vec<DeviceListing>, StoreError> {
        let rooms = match self.store.list_rooms().await {
            Ok(rooms) => rooms,
            Err(e) => {
                log::warn!("Failed to load rooms: {}", e);
                vec![]
            }
        };
        let listings: Vec<_> = self
            .store
            .list_devices()
            .await?
            .into_iter()
            .map(|entry| {
                let id = crate::id::qualify(&self.namespace, &entry.id);
                let rooms = rooms
                    .iter()
                    .filter(|room| room.members.contains(&id))
                    .map(|room| room.name.clone())
                    .collect();
                DeviceListing {
                    id,
                    name: entry.name,
                    data: entry.data,
                    rooms,
                }
            })
            .collect();
        log::debug!("Listing {} devices", listings.len());
        Ok(listings)
    }

    /// Removes a device by bare or qualified ID, along with its states and room
    /// memberships.
    ///
    /// Returns the bare ID if something was removed. Unknown IDs are a no-op.
    pub async fn delete_device(&self, id: &str) -> Result<Option<String>, StoreError> {
        let id = crate::id::unqualify(&self.namespace, id).to_owned();
        let member = crate::id::qualify(&self.namespace, &id);
        if self.store.delete_device_tree(id.clone(), member).await? {
            log::info!("Deleted device {}", id);
            Ok(Some(id))
        } else {
            log::warn!("Cannot delete unknown device {}", id);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::JsonStore;
    use crate::store::MockDeviceStore;
    use crate::store::Room;
    use crate::test::profile;
    use futures_util::FutureExt;

    fn registry(store: &JsonStore, rediscovery: Rediscovery) -> Registry {
        Registry::new(Arc::new(store.clone()), "camfinder.0".into(), rediscovery)
    }

    #[tokio::test]
    async fn new_device_is_registered() {
        crate::test::init();

        let store = JsonStore::in_memory();
        let scanned = profile("192.168.1.5", 80);

        // When
        let new_devices = registry(&store, Rediscovery::Keep)
            .reconcile(&[scanned.clone()])
            .await
            .unwrap();

        // Then
        assert_eq!(new_devices, vec![scanned.clone()]);
        let entries = store.list_devices().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "192_168_1_5_80");
        assert_eq!(entries[0].name, "192.168.1.5:80");
        assert_eq!(entries[0].data, scanned);
    }

    #[tokio::test]
    async fn existing_device_is_untouched() {
        crate::test::init();

        let store = JsonStore::in_memory();
        let mut existing = RegistryEntry::device(profile("192.168.1.5", 80));
        existing.name = "Front door".into();
        store.create_device_if_absent(existing.clone()).await.unwrap();
        let before = serde_json::to_vec(&store.list_devices().await.unwrap()).unwrap();

        let mut rescanned = profile("192.168.1.5", 80);
        rescanned.credentials.password = "changed".into();

        // When
        let new_devices = registry(&store, Rediscovery::Keep)
            .reconcile(&[rescanned])
            .await
            .unwrap();

        // Then
        assert!(new_devices.is_empty());
        let after = serde_json::to_vec(&store.list_devices().await.unwrap()).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn existing_device_is_replaced_on_request() {
        crate::test::init();

        let store = JsonStore::in_memory();
        let mut existing = RegistryEntry::device(profile("192.168.1.5", 80));
        existing.name = "Front door".into();
        store.create_device_if_absent(existing).await.unwrap();

        let mut rescanned = profile("192.168.1.5", 80);
        rescanned.credentials.password = "changed".into();

        // When
        let new_devices = registry(&store, Rediscovery::Replace)
            .reconcile(&[rescanned.clone()])
            .await
            .unwrap();

        // Then
        assert!(new_devices.is_empty());
        let entry = store
            .get_device("192_168_1_5_80".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "Front door");
        assert_eq!(entry.data, rescanned);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        crate::test::init();

        let mut store = MockDeviceStore::new();
        store.expect_list_devices().return_once(|| {
            async { Err(StoreError::FileSystem(std::io::ErrorKind::Other.into())) }.boxed()
        });
        store.expect_create_device_if_absent().never();
        let registry = Registry::new(Arc::new(store), "camfinder.0".into(), Rediscovery::Keep);

        // When
        let result = registry.reconcile(&[profile("192.168.1.5", 80)]).await;

        // Then
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn listing_resolves_rooms() {
        crate::test::init();

        let store = JsonStore::in_memory();
        store
            .create_device_if_absent(RegistryEntry::device(profile("192.168.1.5", 80)))
            .await
            .unwrap();
        store
            .create_device_if_absent(RegistryEntry::device(profile("192.168.1.6", 80)))
            .await
            .unwrap();
        for (id, name) in [("hall", "Hall"), ("garage", "Garage"), ("attic", "Attic")] {
            let members = if id == "attic" {
                vec![]
            } else {
                vec!["camfinder.0.192_168_1_5_80".into()]
            };
            store
                .put_room(Room {
                    id: format!("enum.rooms.{}", id),
                    name: name.into(),
                    members,
                })
                .await
                .unwrap();
        }

        // When
        let listings = registry(&store, Rediscovery::Keep)
            .list_devices()
            .await
            .unwrap();

        // Then
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, "camfinder.0.192_168_1_5_80");
        assert_eq!(listings[0].rooms, vec!["Hall", "Garage"]);
        assert_eq!(listings[1].id, "camfinder.0.192_168_1_6_80");
        assert!(listings[1].rooms.is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        crate::test::init();

        let store = JsonStore::in_memory();
        store
            .create_device_if_absent(RegistryEntry::device(profile("192.168.1.5", 80)))
            .await
            .unwrap();
        store
            .put_room(Room {
                id: "enum.rooms.hall".into(),
                name: "Hall".into(),
                members: vec!["camfinder.0.192_168_1_5_80".into()],
            })
            .await
            .unwrap();
        let registry = registry(&store, Rediscovery::Keep);

        // When
        let first = registry
            .delete_device("camfinder.0.192_168_1_5_80")
            .await
            .unwrap();
        let second = registry
            .delete_device("camfinder.0.192_168_1_5_80")
            .await
            .unwrap();

        // Then
        assert_eq!(first, Some("192_168_1_5_80".into()));
        assert_eq!(second, None);
        assert!(registry.list_devices().await.unwrap().is_empty());
        assert!(store.list_rooms().await.unwrap()[0].members.is_empty());

        // Rediscovery starts without the old membership
        registry
            .reconcile(&[profile("192.168.1.5", 80)])
            .await
            .unwrap();
        let listings = registry.list_devices().await.unwrap();
        assert!(listings[0].rooms.is_empty());
    }
}
