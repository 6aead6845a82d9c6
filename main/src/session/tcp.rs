use super::BoxedSession;
use super::Candidate;
use super::DeviceConnector;
use super::DeviceSession;
use super::Recording;
use super::SessionError;
use super::StreamType;
use super::TransportProtocol;
use camfinder_protocol::DeviceInformation;
use camfinder_protocol::MediaUri;
use chrono::DateTime;
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::time::Duration;
use tokio::net::TcpStream;

/// Connector that only establishes reachability.
///
/// A session opens once a TCP connection to the candidate succeeds. All
/// capability queries answer [`SessionError::Unsupported`], so profiles built
/// through this connector carry the endpoint and nothing else.
pub struct TcpConnector;

impl TcpConnector {
    async fn open(
        address: String,
        port: u16,
        timeout: Duration,
    ) -> Result<BoxedSession, SessionError> {
        let stream =
            tokio::time::timeout(timeout, TcpStream::connect((address.as_str(), port))).await??;
        log::debug!(
            "Reached {}:{} from {:?}",
            address,
            port,
            stream.local_addr()?
        );
        Ok(Box::new(TcpSession))
    }
}

impl DeviceConnector for TcpConnector {
    fn connect(
        &self,
        candidate: &Candidate,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<BoxedSession, SessionError>> {
        Self::open(candidate.address.clone(), candidate.port, timeout).boxed()
    }
}

struct TcpSession;

fn unsupported<T: Send + 'static>() -> BoxFuture<'static, Result<T, SessionError>> {
    async { Err(SessionError::Unsupported) }.boxed()
}

impl DeviceSession for TcpSession {
    fn get_system_date_time(&self) -> BoxFuture<'static, Result<DateTime<Utc>, SessionError>> {
        unsupported()
    }

    fn get_device_information(
        &self,
    ) -> BoxFuture<'static, Result<DeviceInformation, SessionError>> {
        unsupported()
    }

    fn get_stream_uri(
        &self,
        _: TransportProtocol,
        _: StreamType,
    ) -> BoxFuture<'static, Result<MediaUri, SessionError>> {
        unsupported()
    }

    fn get_recordings(&self) -> BoxFuture<'static, Result<Vec<Recording>, SessionError>> {
        unsupported()
    }

    fn get_replay_uri(
        &self,
        _: TransportProtocol,
        _: String,
    ) -> BoxFuture<'static, Result<MediaUri, SessionError>> {
        unsupported()
    }

    fn get_snapshot(&self) -> BoxFuture<'static, Result<Vec<u8>, SessionError>> {
        unsupported()
    }
}
