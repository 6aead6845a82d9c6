use super::DeviceStore;
use super::RegistryEntry;
use super::Room;
use super::StoreError;
use camfinder_protocol::DeviceProfile;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory [`DeviceStore`], optionally mirrored to a JSON file.
///
/// The file is rewritten after every mutation through a temporary file and a
/// rename, so readers never see a half-written registry.
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: Option<PathBuf>,
    contents: Mutex<Contents>,
}

#[derive(Serialize, Deserialize, Default, Clone)]
struct Contents {
    #[serde(default)]
    devices: BTreeMap<String, RegistryEntry>,
    #[serde(default)]
    rooms: Vec<Room>,
    #[serde(default)]
    states: BTreeMap<String, Value>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self::new(None, Contents::default())
    }

    /// Loads the registry at `path`, starting empty if the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let contents = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            serde_json::from_slice(&bytes)?
        } else {
            log::info!("Creating a new registry at {}", path.display());
            Contents::default()
        };
        Ok(Self::new(Some(path), contents))
    }

    fn new(path: Option<PathBuf>, contents: Contents) -> Self {
        Self {
            inner: Arc::new(Inner {
                path,
                contents: Mutex::new(contents),
            }),
        }
    }

    /// Adds or replaces a room enumeration.
    pub async fn put_room(&self, room: Room) -> Result<(), StoreError> {
        self.inner
            .mutate(move |contents| {
                contents.rooms.retain(|r| r.id != room.id);
                contents.rooms.push(room);
            })
            .await
    }
}

impl Inner {
    async fn read<R>(&self, f: impl FnOnce(&Contents) -> R) -> R {
        f(&*self.contents.lock().await)
    }

    /// Applies `f` to a copy of the contents and commits it once persisted.
    ///
    /// A failed write leaves the visible contents unchanged.
    async fn mutate<R>(&self, f: impl FnOnce(&mut Contents) -> R) -> Result<R, StoreError> {
        let mut contents = self.contents.lock().await;
        let mut updated = contents.clone();
        let result = f(&mut updated);
        if let Some(path) = &self.path {
            let temp_path = path.with_extension("tmp");
            tokio::fs::write(&temp_path, serde_json::to_vec_pretty(&updated)?).await?;
            tokio::fs::rename(&temp_path, path).await?;
        }
        *contents = updated;
        Ok(result)
    }
}

impl DeviceStore for JsonStore {
    fn list_devices(&self) -> BoxFuture<'static, Result<Vec<RegistryEntry>, StoreError>> {
        let inner = self.inner.clone();
        async move {
            let devices = inner
                .read(|c| c.devices.values().cloned().collect())
                .await;
            Ok(devices)
        }
        .boxed()
    }

    fn get_device(
        &self,
        id: String,
    ) -> BoxFuture<'static, Result<Option<RegistryEntry>, StoreError>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read(|c| c.devices.get(&id).cloned()).await) }.boxed()
    }

    fn create_device_if_absent(
        &self,
        entry: RegistryEntry,
    ) -> BoxFuture<'static, Result<bool, StoreError>> {
        let inner = self.inner.clone();
        async move {
            inner
                .mutate(move |c| {
                    if c.devices.contains_key(&entry.id) {
                        false
                    } else {
                        c.devices.insert(entry.id.clone(), entry);
                        true
                    }
                })
                .await
        }
        .boxed()
    }

    fn extend_device(
        &self,
        id: String,
        data: DeviceProfile,
    ) -> BoxFuture<'static, Result<bool, StoreError>> {
        let inner = self.inner.clone();
        async move {
            inner
                .mutate(move |c| match c.devices.get_mut(&id) {
                    Some(entry) => {
                        entry.data = data;
                        true
                    }
                    None => false,
                })
                .await
        }
        .boxed()
    }

    fn delete_device_tree(
        &self,
        id: String,
        room_member: String,
    ) -> BoxFuture<'static, Result<bool, StoreError>> {
        let inner = self.inner.clone();
        async move {
            inner
                .mutate(move |c| {
                    let state_prefix = format!("{}.", id);
                    c.states.retain(|key, _| !key.starts_with(&state_prefix));
                    for room in c.rooms.iter_mut() {
                        room.members.retain(|member| *member != room_member);
                    }
                    c.devices.remove(&id).is_some()
                })
                .await
        }
        .boxed()
    }

    fn list_rooms(&self) -> BoxFuture<'static, Result<Vec<Room>, StoreError>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read(|c| c.rooms.clone()).await) }.boxed()
    }

    fn get_state(&self, key: String) -> BoxFuture<'static, Result<Option<Value>, StoreError>> {
        let inner = self.inner.clone();
        async move { Ok(inner.read(|c| c.states.get(&key).cloned()).await) }.boxed()
    }

    fn set_state(&self, key: String, value: Value) -> BoxFuture<'static, Result<(), StoreError>> {
        let inner = self.inner.clone();
        async move {
            inner
                .mutate(move |c| {
                    c.states.insert(key, value);
                })
                .await
        }
        .boxed()
    }
}
