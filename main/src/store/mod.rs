//! Persistence of registered devices, rooms and runtime states.

mod json;

pub use self::json::JsonStore;

use camfinder_protocol::DeviceProfile;
use futures_util::future::BoxFuture;
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// State mirroring whether a scan is in flight.
pub const DISCOVERY_RUNNING_STATE: &str = "discoveryRunning";

/// Key of the connectivity state of a device.
pub fn connected_state(device_id: &str) -> String {
    format!("{}.connected", device_id)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Device,
}

/// A persisted device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub name: String,
    pub data: DeviceProfile,
}

impl RegistryEntry {
    pub fn device(profile: DeviceProfile) -> Self {
        Self {
            id: profile.id.clone(),
            kind: EntryKind::Device,
            name: profile.name.clone(),
            data: profile,
        }
    }
}

/// A room enumeration. Members are namespace-qualified device IDs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[automock]
pub trait DeviceStore {
    fn list_devices(&self) -> BoxFuture<'static, Result<Vec<RegistryEntry>, StoreError>>;
    fn get_device(&self, id: String)
        -> BoxFuture<'static, Result<Option<RegistryEntry>, StoreError>>;

    /// Stores `entry` unless its ID is taken. Returns whether it was stored.
    fn create_device_if_absent(
        &self,
        entry: RegistryEntry,
    ) -> BoxFuture<'static, Result<bool, StoreError>>;

    /// Replaces the data of an existing entry. Returns whether the entry exists.
    fn extend_device(
        &self,
        id: String,
        data: DeviceProfile,
    ) -> BoxFuture<'static, Result<bool, StoreError>>;

    /// Removes an entry together with its states and its room memberships, listed
    /// as `room_member`. Returns whether the entry existed.
    fn delete_device_tree(
        &self,
        id: String,
        room_member: String,
    ) -> BoxFuture<'static, Result<bool, StoreError>>;

    fn list_rooms(&self) -> BoxFuture<'static, Result<Vec<Room>, StoreError>>;
    fn get_state(&self, key: String) -> BoxFuture<'static, Result<Option<Value>, StoreError>>;
    fn set_state(&self, key: String, value: Value) -> BoxFuture<'static, Result<(), StoreError>>;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Error in file system")]
    FileSystem(#[from] std::io::Error),

    #[error("Failed to (de)serialize the registry")]
    Json(#[from] serde_json::Error),
}
