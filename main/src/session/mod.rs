//! Client side of the device-management protocol.

mod tcp;

pub use self::tcp::TcpConnector;

use camfinder_protocol::Credentials;
use camfinder_protocol::DeviceInformation;
use camfinder_protocol::MediaUri;
use chrono::DateTime;
use chrono::Utc;
use futures_util::future::BoxFuture;
use mockall::automock;
use std::fmt::Display;
use std::fmt::Formatter;
use std::time::Duration;
use thiserror::Error;

pub type BoxedSession = Box<dyn DeviceSession + Send + Sync>;

/// One (address, port, credentials) tuple considered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl Candidate {
    /// Display string of the endpoint, `address:port`.
    pub fn name(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Rtsp,
    Udp,
}

impl Display for TransportProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rtsp => f.write_str("RTSP"),
            Self::Udp => f.write_str("UDP"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    RtpUnicast,
    RtpMulticast,
}

impl Display for StreamType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RtpUnicast => f.write_str("RTP-Unicast"),
            Self::RtpMulticast => f.write_str("RTP-Multicast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub token: String,
}

#[automock]
pub trait DeviceConnector {
    /// Opens a session with the device behind `candidate`.
    fn connect(
        &self,
        candidate: &Candidate,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<BoxedSession, SessionError>>;
}

/// An open session with one device.
#[automock]
pub trait DeviceSession {
    fn get_system_date_time(&self) -> BoxFuture<'static, Result<DateTime<Utc>, SessionError>>;
    fn get_device_information(&self)
        -> BoxFuture<'static, Result<DeviceInformation, SessionError>>;
    fn get_stream_uri(
        &self,
        protocol: TransportProtocol,
        stream: StreamType,
    ) -> BoxFuture<'static, Result<MediaUri, SessionError>>;
    fn get_recordings(&self) -> BoxFuture<'static, Result<Vec<Recording>, SessionError>>;
    fn get_replay_uri(
        &self,
        protocol: TransportProtocol,
        recording_token: String,
    ) -> BoxFuture<'static, Result<MediaUri, SessionError>>;
    fn get_snapshot(&self) -> BoxFuture<'static, Result<Vec<u8>, SessionError>>;
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to reach the device")]
    Connect(#[from] std::io::Error),

    #[error("Device did not answer in time")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Operation not supported by this client")]
    Unsupported,

    #[error("Device rejected the request: {0}")]
    Rejected(String),
}

/// Awaits a protocol call, giving up after `timeout`.
pub async fn with_timeout<T>(
    timeout: Duration,
    call: BoxFuture<'_, Result<T, SessionError>>,
) -> Result<T, SessionError> {
    tokio::time::timeout(timeout, call).await?
}
