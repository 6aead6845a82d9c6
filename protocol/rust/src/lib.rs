//! Commands accepted by the discovery service and the device model they carry.
//!
//! Messages travel as one JSON document per line.

mod device;

pub use device::*;

use bytes::BufMut;
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use std::marker::PhantomData;
use thiserror::Error;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;
use tokio_util::codec::LinesCodec;
use tokio_util::codec::LinesCodecError;

const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "command", content = "message", rename_all = "camelCase")]
pub enum Request {
    Discovery(DiscoveryOptions),
    GetDevices,
    DeleteDevice(DeviceRef),
    GetSnapshot(DeviceRef),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "command", content = "message", rename_all = "camelCase")]
pub enum Response {
    Discovery(DiscoveryReply),
    GetDevices(Vec<DeviceListing>),
    DeleteDevice(Acknowledgement),
    GetSnapshot(Snapshot),
}

/// Parameters of a discovery run. Missing fields fall back to the service configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    pub start_range: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_range: Option<String>,

    /// Comma-separated port list, e.g. `"80, 8080"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub devices: Vec<DeviceProfile>,

    #[serde(default, rename = "newInstances")]
    pub new_instances: Vec<DeviceProfile>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceRef {
    pub id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Acknowledgement {}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Line-delimited JSON codec decoding `I` and encoding `O`.
///
/// Lines that are not valid JSON for `I` or exceed the length limit are logged
/// and skipped so that one bad message does not end the connection.
pub struct MessageCodec<I, O> {
    lines: LinesCodec,
    _marker: PhantomData<fn(O) -> I>,
}

impl<I, O> Default for MessageCodec<I, O> {
    fn default() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            _marker: PhantomData,
        }
    }
}

impl<I: DeserializeOwned, O> Decoder for MessageCodec<I, O> {
    type Item = I;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = skip_overlong(self.lines.decode(src))? {
            if let Some(message) = parse_line(&line) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        Ok(skip_overlong(self.lines.decode_eof(src))?.and_then(|line| parse_line(&line)))
    }
}

/// Turns an overlong line into an empty one, which is then skipped.
///
/// `LinesCodec` discards the rest of such a line on the next call.
fn skip_overlong(
    result: Result<Option<String>, LinesCodecError>,
) -> Result<Option<String>, LinesCodecError> {
    match result {
        Err(LinesCodecError::MaxLineLengthExceeded) => {
            log::warn!("Dropping a message longer than {} bytes", MAX_LINE_LENGTH);
            Ok(Some(String::new()))
        }
        other => other,
    }
}

fn parse_line<I: DeserializeOwned>(line: &str) -> Option<I> {
    if line.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(message) => Some(message),
        Err(e) => {
            log::warn!("Dropping an invalid message: {}", e);
            None
        }
    }
}

impl<I, O: Serialize> Encoder<O> for MessageCodec<I, O> {
    type Error = CodecError;

    fn encode(&mut self, item: O, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer(dst.writer(), &item)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Error from network I/O")]
    Io(#[from] std::io::Error),

    #[error("Failed to split the input into lines")]
    Line(#[from] LinesCodecError),

    #[error("Failed to encode as JSON")]
    Json(#[from] serde_json::Error),
}
