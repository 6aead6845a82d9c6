use crate::probe::ProbeOutcome;
use crate::range::AddressRange;
use crate::registry::Registry;
use crate::session::Candidate;
use crate::session::DeviceConnector;
use crate::store::DeviceStore;
use crate::store::StoreError;
use crate::supervisor::Supervisor;
use camfinder_protocol::Credentials;
use camfinder_protocol::DeviceProfile;
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub start: String,
    pub end: String,
    pub ports: Vec<u16>,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Every device that answered, in the order their probes finished.
    pub devices: Vec<DeviceProfile>,

    /// Devices that were not registered before this scan.
    pub new_devices: Vec<DeviceProfile>,
}

/// Whether a scan is in flight. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    running: Arc<AtomicBool>,
}

impl ScanState {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Clears the running flag if a scan is cancelled or panics.
struct RunningGuard(ScanState);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

pub struct Scanner {
    connector: Arc<dyn DeviceConnector + Send + Sync>,
    store: Arc<dyn DeviceStore + Send + Sync>,
    registry: Arc<Registry>,
    supervisor: Arc<Supervisor>,
    step_timeout: Duration,
    state: ScanState,
}

impl Scanner {
    pub fn new(
        connector: Arc<dyn DeviceConnector + Send + Sync>,
        store: Arc<dyn DeviceStore + Send + Sync>,
        registry: Arc<Registry>,
        supervisor: Arc<Supervisor>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            store,
            registry,
            supervisor,
            step_timeout,
            state: Default::default(),
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Probes every (address, port) pair of `request` and registers the new devices.
    ///
    /// Only one scan runs at a time, a concurrent call fails with
    /// [`ScanError::AlreadyRunning`] without side effects.
    pub async fn start_scan(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        if !self.state.try_begin() {
            return Err(ScanError::AlreadyRunning);
        }
        let guard = RunningGuard(self.state.clone());
        self.mirror_running(true).await;

        let result = self.scan(request).await;

        // The mirror must be written while the flag still blocks the next scan
        self.mirror_running(false).await;
        drop(guard);
        result
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        let space = CandidateSpace::new(request);
        let total = space.len();
        log::info!(
            "Scanning {} candidates ({} addresses, {} ports)",
            total,
            space.address_count(),
            space.ports.len()
        );

        let (sender, receiver) = futures_channel::mpsc::unbounded();
        for candidate in space.candidates() {
            log::debug!("Probing {}", candidate.name());
            let sender = sender.clone();
            let connector = self.connector.clone();
            let step_timeout = self.step_timeout;
            tokio::spawn(async move {
                let outcome = crate::probe::probe(connector.as_ref(), candidate, step_timeout).await;
                if sender.unbounded_send(outcome).is_err() {
                    log::debug!("Scan no longer collecting results");
                }
            });
        }
        drop(sender);

        let devices = join_outcomes(receiver, total).await;
        log::info!("Scan finished, {} devices answered", devices.len());

        let new_devices = self.registry.reconcile(&devices).await?;
        if let Err(e) = self.supervisor.refresh_connections().await {
            log::warn!("Failed to refresh connections after a scan: {}", e);
        }
        Ok(ScanReport {
            devices,
            new_devices,
        })
    }

    /// Clears the running flag and its persisted mirror, e.g. after an
    /// interrupted scan or a restart.
    pub async fn abandon(&self) {
        if self.state.is_running() {
            log::warn!("Abandoning a running scan");
        }
        self.state.finish();
        self.mirror_running(false).await;
    }

    async fn mirror_running(&self, running: bool) {
        let key = crate::store::DISCOVERY_RUNNING_STATE.to_owned();
        if let Err(e) = self.store.set_state(key, Value::Bool(running)).await {
            log::warn!("Failed to record the scan state: {}", e);
        }
    }
}

/// Waits until `total` probes have reported.
///
/// Ends early only if every sender is gone, i.e. some probe task died
/// without reporting.
async fn join_outcomes(
    mut receiver: UnboundedReceiver<ProbeOutcome>,
    total: u64,
) -> Vec<DeviceProfile> {
    let mut devices = vec![];
    let mut completed = 0;
    while completed < total {
        match receiver.next().await {
            Some(ProbeOutcome::Found(profile)) => devices.push(*profile),
            Some(ProbeOutcome::Absent) => {}
            None => {
                log::error!("{} of {} probes never reported", total - completed, total);
                break;
            }
        }
        completed += 1;
    }
    devices
}

enum Addresses {
    Range(AddressRange),

    /// The start address as given, used when it does not parse as a range.
    Literal(String),
}

struct CandidateSpace {
    addresses: Addresses,
    ports: Vec<u16>,
    credentials: Credentials,
}

impl CandidateSpace {
    fn new(request: ScanRequest) -> Self {
        let range = AddressRange::new(&request.start, &request.end);
        let addresses = if range.is_placeholder() {
            Addresses::Literal(request.start.trim().to_owned())
        } else {
            Addresses::Range(range)
        };
        Self {
            addresses,
            ports: request.ports,
            credentials: request.credentials,
        }
    }

    fn address_count(&self) -> u64 {
        match &self.addresses {
            Addresses::Range(range) => range.address_count(),
            Addresses::Literal(_) => 1,
        }
    }

    fn len(&self) -> u64 {
        self.address_count() * self.ports.len() as u64
    }

    fn candidates(&self) -> impl Iterator<Item = Candidate> + '_ {
        let addresses: Box<dyn Iterator<Item = String>> = match &self.addresses {
            Addresses::Range(range) => Box::new(range.iter().map(|a| a.to_string())),
            Addresses::Literal(address) => Box::new(std::iter::once(address.clone())),
        };
        addresses.flat_map(move |address| {
            self.ports.iter().map(move |&port| Candidate {
                address: address.clone(),
                port,
                credentials: self.credentials.clone(),
            })
        })
    }
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan already running")]
    AlreadyRunning,

    #[error("Failed to update the registry")]
    Registry(#[from] StoreError),
}
