use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Answer of `GetDeviceInformation`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MediaUri {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStreamUris {
    /// RTSP over TCP, RTP unicast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp: Option<MediaUri>,

    /// RTP unicast over UDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub udp: Option<MediaUri>,

    /// RTP multicast over UDP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast: Option<MediaUri>,
}

/// Which capability queries a device answered while being probed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub date_time: bool,
    pub device_information: bool,
    pub live_streams: bool,
    pub recordings: bool,
    pub replay: bool,
}

/// Everything learned about a device that accepted a session during a scan.
///
/// Only `id`, `name`, `address`, `port` and `credentials` are guaranteed. The
/// rest stays empty when the corresponding query failed or timed out.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_date_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_information: Option<DeviceInformation>,

    #[serde(default)]
    pub live_stream_uris: LiveStreamUris,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_uri: Option<MediaUri>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

/// A registered device as reported by `getDevices`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    /// Namespace-qualified ID.
    pub id: String,
    pub name: String,
    pub data: DeviceProfile,

    /// Names of the rooms listing this device as a member.
    #[serde(default)]
    pub rooms: Vec<String>,
}
