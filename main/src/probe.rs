use crate::session::BoxedSession;
use crate::session::Candidate;
use crate::session::DeviceConnector;
use crate::session::Recording;
use crate::session::SessionError;
use crate::session::StreamType;
use crate::session::TransportProtocol;
use camfinder_protocol::Capabilities;
use camfinder_protocol::DeviceInformation;
use camfinder_protocol::DeviceProfile;
use camfinder_protocol::LiveStreamUris;
use camfinder_protocol::MediaUri;
use chrono::DateTime;
use chrono::Utc;
use futures_util::future::BoxFuture;
use std::time::Duration;

/// Result of probing one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found(Box<DeviceProfile>),

    /// Nothing accepted a session at this endpoint.
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Connect,
    DateTime,
    Info,
    StreamTcp,
    StreamUdp,
    StreamMulticast,
    Recordings,
    ReplayUri,
    Done,
}

impl Step {
    fn next(self) -> Self {
        match self {
            Self::Connect => Self::DateTime,
            Self::DateTime => Self::Info,
            Self::Info => Self::StreamTcp,
            Self::StreamTcp => Self::StreamUdp,
            Self::StreamUdp => Self::StreamMulticast,
            Self::StreamMulticast => Self::Recordings,
            Self::Recordings => Self::ReplayUri,
            Self::ReplayUri | Self::Done => Self::Done,
        }
    }
}

/// Runs the handshake against one candidate.
///
/// Every call to the device is bounded by `step_timeout`. Only a failed
/// connection makes the candidate [`ProbeOutcome::Absent`], later failures just
/// leave the matching profile field empty.
pub async fn probe(
    connector: &(dyn DeviceConnector + Send + Sync),
    candidate: Candidate,
    step_timeout: Duration,
) -> ProbeOutcome {
    let mut state = Probe {
        candidate,
        step_timeout,
        session: None,
        findings: Findings::default(),
    };
    let mut step = Step::Connect;
    while step != Step::Done {
        step = state.advance(step, connector).await;
    }
    state.finish()
}

#[derive(Default)]
struct Findings {
    system_date_time: Option<DateTime<Utc>>,
    device_information: Option<DeviceInformation>,
    live_stream_uris: LiveStreamUris,
    recordings: Option<Vec<Recording>>,
    replay_uri: Option<MediaUri>,
}

struct Probe {
    candidate: Candidate,
    step_timeout: Duration,
    session: Option<BoxedSession>,
    findings: Findings,
}

impl Probe {
    async fn advance(
        &mut self,
        step: Step,
        connector: &(dyn DeviceConnector + Send + Sync),
    ) -> Step {
        if step == Step::Connect {
            let connection = crate::session::with_timeout(
                self.step_timeout,
                connector.connect(&self.candidate, self.step_timeout),
            );
            return match connection.await {
                Ok(session) => {
                    self.session = Some(session);
                    step.next()
                }
                Err(e) => {
                    log::debug!("No device at {}: {}", self.candidate.name(), e);
                    Step::Done
                }
            };
        }

        let Some(session) = &self.session else {
            return Step::Done;
        };
        let findings = &mut self.findings;
        let name = self.candidate.name();
        let timeout = self.step_timeout;
        match step {
            Step::DateTime => {
                findings.system_date_time =
                    query(step, &name, timeout, session.get_system_date_time()).await;
            }
            Step::Info => {
                findings.device_information =
                    query(step, &name, timeout, session.get_device_information()).await;
            }
            Step::StreamTcp => {
                let call = session.get_stream_uri(TransportProtocol::Rtsp, StreamType::RtpUnicast);
                findings.live_stream_uris.tcp = query(step, &name, timeout, call).await;
            }
            Step::StreamUdp => {
                let call = session.get_stream_uri(TransportProtocol::Udp, StreamType::RtpUnicast);
                findings.live_stream_uris.udp = query(step, &name, timeout, call).await;
            }
            Step::StreamMulticast => {
                let call =
                    session.get_stream_uri(TransportProtocol::Udp, StreamType::RtpMulticast);
                findings.live_stream_uris.multicast = query(step, &name, timeout, call).await;
            }
            Step::Recordings => {
                findings.recordings = query(step, &name, timeout, session.get_recordings()).await;
            }
            Step::ReplayUri => {
                // Replay of the first recording only
                let first_token = findings
                    .recordings
                    .as_ref()
                    .and_then(|recordings| recordings.first())
                    .map(|recording| recording.token.clone());
                if let Some(token) = first_token {
                    let call = session.get_replay_uri(TransportProtocol::Rtsp, token);
                    findings.replay_uri = query(step, &name, timeout, call).await;
                }
            }
            Step::Connect | Step::Done => {}
        }
        step.next()
    }

    fn finish(self) -> ProbeOutcome {
        if self.session.is_none() {
            return ProbeOutcome::Absent;
        }

        let Candidate {
            address,
            port,
            credentials,
        } = self.candidate;
        let findings = self.findings;
        let uris = &findings.live_stream_uris;
        let capabilities = Capabilities {
            date_time: findings.system_date_time.is_some(),
            device_information: findings.device_information.is_some(),
            live_streams: uris.tcp.is_some() || uris.udp.is_some() || uris.multicast.is_some(),
            recordings: findings.recordings.is_some(),
            replay: findings.replay_uri.is_some(),
        };
        let profile = DeviceProfile {
            id: crate::id::device_id(&address, port),
            name: format!("{}:{}", address, port),
            address,
            port,
            credentials,
            system_date_time: findings.system_date_time,
            device_information: findings.device_information,
            live_stream_uris: findings.live_stream_uris,
            replay_uri: findings.replay_uri,
            // Unset when the device answered nothing but the connection
            capabilities: Some(capabilities).filter(|c| *c != Capabilities::default()),
        };
        log_profile(&profile);
        ProbeOutcome::Found(Box::new(profile))
    }
}

async fn query<T>(
    step: Step,
    candidate: &str,
    timeout: Duration,
    call: BoxFuture<'static, Result<T, SessionError>>,
) -> Option<T> {
    match crate::session::with_timeout(timeout, call).await {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("Step {:?} failed for {}: {}", step, candidate, e);
            None
        }
    }
}

fn log_profile(profile: &DeviceProfile) {
    log::debug!("Found device {}", profile.name);
    log::debug!("Date: {:?}", profile.system_date_time);
    log::debug!("Info: {:?}", profile.device_information);
    let uris = &profile.live_stream_uris;
    if let Some(uri) = &uris.tcp {
        log::debug!("First live TCP stream: {}", uri.uri);
    }
    if let Some(uri) = &uris.udp {
        log::debug!("First live UDP stream: {}", uri.uri);
    }
    if let Some(uri) = &uris.multicast {
        log::debug!("First live multicast stream: {}", uri.uri);
    }
    if let Some(uri) = &profile.replay_uri {
        log::debug!("First replay stream: {}", uri.uri);
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::session::MockDeviceConnector;
    use crate::session::MockDeviceSession;
    use camfinder_protocol::Credentials;
    use futures_util::FutureExt;
    use mockall::predicate::eq;
    use mockall::Sequence;

    const TIMEOUT: Duration = Duration::from_millis(5000);

    pub fn candidate(address: &str, port: u16) -> Candidate {
        Candidate {
            address: address.into(),
            port,
            credentials: Credentials {
                username: "admin".into(),
                password: "admin".into(),
            },
        }
    }

    fn uri(uri: &str) -> MediaUri {
        MediaUri {
            uri: uri.into(),
            timeout: None,
        }
    }

    fn fail<T: Send + 'static>() -> BoxFuture<'static, Result<T, SessionError>> {
        async { Err(SessionError::Rejected("test".into())) }.boxed()
    }

    /// A session whose every query never answers.
    pub fn silent_session() -> MockDeviceSession {
        let mut session = MockDeviceSession::new();
        session
            .expect_get_system_date_time()
            .returning(|| futures_util::future::pending().boxed());
        session
            .expect_get_device_information()
            .returning(|| futures_util::future::pending().boxed());
        session
            .expect_get_stream_uri()
            .returning(|_, _| futures_util::future::pending().boxed());
        session
            .expect_get_recordings()
            .returning(|| futures_util::future::pending().boxed());
        session.expect_get_replay_uri().never();
        session
    }

    fn connector_with(session: MockDeviceSession) -> MockDeviceConnector {
        let mut connector = MockDeviceConnector::new();
        connector
            .expect_connect()
            .return_once(move |_, _| async move { Ok(Box::new(session) as BoxedSession) }.boxed());
        connector
    }

    #[tokio::test]
    async fn connection_refused() {
        crate::test::init();

        let mut connector = MockDeviceConnector::new();
        connector.expect_connect().return_once(|_, _| {
            async { Err(SessionError::Connect(std::io::ErrorKind::ConnectionRefused.into())) }
                .boxed()
        });

        // When
        let outcome = probe(&connector, candidate("192.168.1.10", 80), TIMEOUT).await;

        // Then
        assert_eq!(outcome, ProbeOutcome::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_hangs() {
        crate::test::init();

        let mut connector = MockDeviceConnector::new();
        connector
            .expect_connect()
            .return_once(|_, _| futures_util::future::pending().boxed());

        // When
        let outcome = probe(&connector, candidate("192.168.1.10", 80), TIMEOUT).await;

        // Then
        assert_eq!(outcome, ProbeOutcome::Absent);
    }

    #[tokio::test]
    async fn full_profile() {
        crate::test::init();

        let date: DateTime<Utc> = "2024-03-01T12:00:00Z".parse().unwrap();
        let info = DeviceInformation {
            manufacturer: "Acme".into(),
            model: "NVR-8".into(),
            firmware_version: "1.2".into(),
            serial_number: "0001".into(),
            hardware_id: "hw".into(),
        };

        let mut sequence = Sequence::new();
        let mut session = MockDeviceSession::new();
        session
            .expect_get_system_date_time()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(move || async move { Ok(date) }.boxed());
        let info_clone = info.clone();
        session
            .expect_get_device_information()
            .times(1)
            .in_sequence(&mut sequence)
            .return_once(move || async move { Ok(info_clone) }.boxed());
        session
            .expect_get_stream_uri()
            .with(eq(TransportProtocol::Rtsp), eq(StreamType::RtpUnicast))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| async { Ok(uri("rtsp://tcp")) }.boxed());
        session
            .expect_get_stream_uri()
            .with(eq(TransportProtocol::Udp), eq(StreamType::RtpUnicast))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| async { Ok(uri("rtsp://udp")) }.boxed());
        session
            .expect_get_stream_uri()
            .with(eq(TransportProtocol::Udp), eq(StreamType::RtpMulticast))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| async { Ok(uri("rtsp://multicast")) }.boxed());
        session
            .expect_get_recordings()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| {
                async {
                    Ok(vec![
                        Recording { token: "rec-1".into() },
                        Recording { token: "rec-2".into() },
                    ])
                }
                .boxed()
            });
        session
            .expect_get_replay_uri()
            .with(eq(TransportProtocol::Rtsp), eq("rec-1".to_owned()))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _| async { Ok(uri("rtsp://replay")) }.boxed());

        // When
        let outcome = probe(
            &connector_with(session),
            candidate("192.168.1.5", 80),
            TIMEOUT,
        )
        .await;

        // Then
        let ProbeOutcome::Found(profile) = outcome else {
            panic!("Expecting a device");
        };
        assert_eq!(profile.id, "192_168_1_5_80");
        assert_eq!(profile.name, "192.168.1.5:80");
        assert_eq!(profile.system_date_time, Some(date));
        assert_eq!(profile.device_information, Some(info));
        assert_eq!(profile.live_stream_uris.tcp, Some(uri("rtsp://tcp")));
        assert_eq!(profile.live_stream_uris.udp, Some(uri("rtsp://udp")));
        assert_eq!(
            profile.live_stream_uris.multicast,
            Some(uri("rtsp://multicast"))
        );
        assert_eq!(profile.replay_uri, Some(uri("rtsp://replay")));
        assert_eq!(
            profile.capabilities,
            Some(Capabilities {
                date_time: true,
                device_information: true,
                live_streams: true,
                recordings: true,
                replay: true,
            })
        );
    }

    #[tokio::test]
    async fn failing_steps_are_skipped() {
        crate::test::init();

        let mut session = MockDeviceSession::new();
        session.expect_get_system_date_time().returning(fail);
        session.expect_get_device_information().returning(fail);
        session
            .expect_get_stream_uri()
            .with(eq(TransportProtocol::Udp), eq(StreamType::RtpUnicast))
            .returning(|_, _| async { Ok(uri("rtsp://udp")) }.boxed());
        session
            .expect_get_stream_uri()
            .withf(|protocol, stream| {
                (*protocol, *stream) != (TransportProtocol::Udp, StreamType::RtpUnicast)
            })
            .returning(|_, _| fail());
        session
            .expect_get_recordings()
            .returning(|| async { Ok(vec![]) }.boxed());
        session.expect_get_replay_uri().never();

        // When
        let outcome = probe(
            &connector_with(session),
            candidate("192.168.1.5", 8080),
            TIMEOUT,
        )
        .await;

        // Then
        let ProbeOutcome::Found(profile) = outcome else {
            panic!("Expecting a device");
        };
        assert_eq!(profile.system_date_time, None);
        assert_eq!(profile.device_information, None);
        assert_eq!(profile.live_stream_uris.tcp, None);
        assert_eq!(profile.live_stream_uris.udp, Some(uri("rtsp://udp")));
        assert_eq!(profile.live_stream_uris.multicast, None);
        assert_eq!(profile.replay_uri, None);
        let capabilities = profile.capabilities.unwrap();
        assert!(capabilities.live_streams);
        assert!(capabilities.recordings);
        assert!(!capabilities.replay);
    }

    #[tokio::test(start_paused = true)]
    async fn every_query_times_out() {
        crate::test::init();

        // When
        let outcome = probe(
            &connector_with(silent_session()),
            candidate("192.168.1.5", 80),
            TIMEOUT,
        )
        .await;

        // Then
        let ProbeOutcome::Found(profile) = outcome else {
            panic!("Expecting a device");
        };
        assert_eq!(profile.id, "192_168_1_5_80");
        assert_eq!(profile.address, "192.168.1.5");
        assert_eq!(profile.port, 80);
        assert_eq!(profile.system_date_time, None);
        assert_eq!(profile.device_information, None);
        assert_eq!(profile.live_stream_uris, LiveStreamUris::default());
        assert_eq!(profile.replay_uri, None);
        assert_eq!(profile.capabilities, None);
    }
}
