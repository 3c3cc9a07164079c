//! Discovery engine that sweeps local subnets for MTConnect agents

use anyhow::Result;
use mtsniff_core::{DiscoveredDevice, MacAddress, ProbeContext};
use mtsniff_mtconnect::client::DEFAULT_PROBE_TIMEOUT_MS;
use mtsniff_mtconnect::{probe_url, HttpProbeClient, ProbeOutcome, ProtocolClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

use crate::arp::{HardwareAddressResolver, NeighborTableResolver};
use crate::interfaces::{InterfaceEnumerator, SystemInterfaces};
use crate::ping::{PingProber, ReachabilityProber};
use crate::ports::{PortScanner, TcpConnectScanner};
use crate::subnet::{Subnet, SubnetError, DEFAULT_PREFIX_LEN, MIN_PREFIX_LEN};
use crate::tracker::{CompletionTracker, RunCounters, RunSummary};

/// Capacity of the event channel
const EVENT_CAPACITY: usize = 1024;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Port range is empty")]
    EmptyPortRange,
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,
    #[error(transparent)]
    Subnet(#[from] SubnetError),
    #[error("Event channel closed before the run completed")]
    EventsClosed,
}

/// Sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnifferConfig {
    /// Deadline for each ping and each TCP connect, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Candidate agent ports, tested in order
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Mask applied to each interface address
    #[serde(default = "default_prefix_len")]
    pub prefix_len: u8,
    /// Deadline for each MTConnect probe request, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for SnifferConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            ports: default_ports(),
            prefix_len: default_prefix_len(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_ports() -> Vec<u16> {
    (5000..5020).collect()
}

fn default_prefix_len() -> u8 {
    DEFAULT_PREFIX_LEN
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

impl SnifferConfig {
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.ports.is_empty() {
            return Err(DiscoveryError::EmptyPortRange);
        }
        if self.timeout_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(DiscoveryError::ZeroTimeout);
        }
        if !(MIN_PREFIX_LEN..=32).contains(&self.prefix_len) {
            return Err(SubnetError::InvalidPrefix(self.prefix_len).into());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Drop repeated ports, keeping first-seen order
fn dedup_ports(ports: Vec<u16>) -> Vec<u16> {
    let mut seen = BTreeSet::new();
    ports.into_iter().filter(|p| seen.insert(*p)).collect()
}

/// Signals emitted by a run
#[derive(Debug, Clone)]
pub enum SnifferEvent {
    /// A run has been dispatched
    RunStarted,
    /// An agent reported a device
    DeviceFound(DiscoveredDevice),
    /// Every ping and probe of the run has resolved
    RunCompleted(RunSummary),
}

/// Everything a completed run reported
#[derive(Debug, Clone)]
pub struct Sweep {
    pub devices: Vec<DiscoveredDevice>,
    pub summary: RunSummary,
    /// Events dropped because the collector fell behind; nonzero means
    /// `devices` is incomplete
    pub missed: u64,
}

/// Collaborators used by a run
#[derive(Clone)]
pub struct Backends {
    pub interfaces: Arc<dyn InterfaceEnumerator>,
    pub reachability: Arc<dyn ReachabilityProber>,
    pub ports: Arc<dyn PortScanner>,
    pub protocol: Arc<dyn ProtocolClient>,
    pub hardware: Arc<dyn HardwareAddressResolver>,
}

impl Backends {
    /// Platform implementations: ping, TCP connect, HTTP, neighbor table
    pub fn system(config: &SnifferConfig) -> Result<Self> {
        Ok(Self {
            interfaces: Arc::new(SystemInterfaces),
            reachability: Arc::new(PingProber),
            ports: Arc::new(TcpConnectScanner),
            protocol: Arc::new(HttpProbeClient::new(config.probe_timeout())?),
            hardware: Arc::new(NeighborTableResolver),
        })
    }
}

/// State shared by every task of one run
struct Run {
    tracker: CompletionTracker,
    backends: Backends,
    timeout: Duration,
    ports: Arc<[u16]>,
    events: broadcast::Sender<SnifferEvent>,
}

impl Run {
    fn complete(&self, summary: RunSummary) {
        info!(
            elapsed_ms = summary.elapsed_ms,
            pinged = summary.counters.sent_reachability,
            probed = summary.counters.sent_probe,
            "Discovery run complete"
        );
        let _ = self.events.send(SnifferEvent::RunCompleted(summary));
    }
}

/// MTConnect discovery engine
///
/// `start()` dispatches a run and returns immediately; results arrive on the
/// channel returned by `subscribe()`. Runs are single-flight: wait for
/// `RunCompleted` before starting the next one.
pub struct Sniffer {
    config: SnifferConfig,
    backends: Backends,
    event_tx: broadcast::Sender<SnifferEvent>,
    current: Mutex<Option<Arc<Run>>>,
}

impl Sniffer {
    /// Create an engine using the platform backends
    pub fn new(config: SnifferConfig) -> Result<Self> {
        config.validate()?;
        let backends = Backends::system(&config)?;
        Ok(Self::with_backends(config, backends)?)
    }

    /// Create an engine with custom backends
    pub fn with_backends(
        mut config: SnifferConfig,
        backends: Backends,
    ) -> Result<Self, DiscoveryError> {
        config.ports = dedup_ports(config.ports);
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            backends,
            event_tx,
            current: Mutex::new(None),
        })
    }

    /// Set the ping/connect timeout and the candidate ports for later runs
    ///
    /// Timeouts are kept at millisecond resolution, so anything under 1 ms
    /// is rejected as zero.
    pub fn configure(&mut self, timeout: Duration, ports: Vec<u16>) -> Result<(), DiscoveryError> {
        let config = SnifferConfig {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ports: dedup_ports(ports),
            ..self.config.clone()
        };
        config.validate()?;

        self.config = config;
        info!(
            timeout_ms = self.config.timeout_ms,
            ports = ?self.config.ports,
            "Sniffer configured"
        );
        Ok(())
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<SnifferEvent> {
        self.event_tx.subscribe()
    }

    /// Counters of the latest run, if one was started
    pub fn progress(&self) -> Option<RunCounters> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|run| run.tracker.snapshot())
    }

    /// Dispatch a discovery run
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let run = Arc::new(Run {
            tracker: CompletionTracker::new(),
            backends: self.backends.clone(),
            timeout: self.config.timeout(),
            ports: self.config.ports.clone().into(),
            events: self.event_tx.clone(),
        });
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(run.clone());

        let _ = self.event_tx.send(SnifferEvent::RunStarted);

        let locals = self.backends.interfaces.local_ipv4_addresses();
        let subnets: BTreeSet<Subnet> = locals
            .iter()
            .filter_map(|&ip| match Subnet::from_interface(ip, self.config.prefix_len) {
                Ok(subnet) => Some(subnet),
                Err(e) => {
                    warn!(ip = %ip, error = %e, "Skipping interface");
                    None
                }
            })
            .collect();

        info!(
            interfaces = locals.len(),
            subnets = subnets.len(),
            ports = run.ports.len(),
            "Starting discovery run"
        );

        for subnet in &subnets {
            debug!(subnet = %subnet, hosts = subnet.len(), "Sweeping subnet");
            for host in subnet.hosts() {
                run.tracker.record_reachability_sent();
                tokio::spawn(check_host(run.clone(), host));
            }
        }

        if let Some(summary) = run.tracker.seal() {
            run.complete(summary);
        }
    }

    /// Run one sweep to completion and collect its results
    pub async fn sweep(&self) -> Result<Sweep, DiscoveryError> {
        let mut rx = self.subscribe();
        self.start();

        let mut devices = Vec::new();
        let mut missed = 0;
        loop {
            match rx.recv().await {
                Ok(SnifferEvent::DeviceFound(device)) => devices.push(device),
                Ok(SnifferEvent::RunCompleted(summary)) => {
                    return Ok(Sweep {
                        devices,
                        summary,
                        missed,
                    })
                }
                Ok(SnifferEvent::RunStarted) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event receiver lagged, some devices were dropped");
                    missed += skipped;
                }
                Err(RecvError::Closed) => return Err(DiscoveryError::EventsClosed),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Reachability,
    Probe,
}

/// Records one operation as received when dropped
///
/// Held for the whole body of a ping or probe task so the operation still
/// resolves if a backend panics and the task unwinds.
struct Settle<'a> {
    run: &'a Run,
    stage: Stage,
}

impl<'a> Settle<'a> {
    fn new(run: &'a Run, stage: Stage) -> Self {
        Self { run, stage }
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!(stage = ?self.stage, "Discovery task panicked, counting it as resolved");
        }

        let summary = match self.stage {
            Stage::Reachability => self.run.tracker.record_reachability_received(),
            Stage::Probe => self.run.tracker.record_probe_received(),
        };
        if let Some(summary) = summary {
            self.run.complete(summary);
        }
    }
}

/// Ping one host, then scan and probe it if it answered
async fn check_host(run: Arc<Run>, host: Ipv4Addr) {
    // Dropped last, after any probes for this host are recorded as sent
    let _settle = Settle::new(&run, Stage::Reachability);

    let reachability = run.backends.reachability.probe(host, run.timeout).await;

    if reachability.is_reachable() {
        trace!(ip = %host, "Host reachable");
        scan_host(&run, host).await;
    } else {
        trace!(ip = %host, outcome = ?reachability, "Host dropped");
    }
}

/// Test each configured port in turn, probing the open ones
async fn scan_host(run: &Arc<Run>, host: Ipv4Addr) {
    for &port in run.ports.iter() {
        let addr = SocketAddrV4::new(host, port);
        if run.backends.ports.is_open(addr, run.timeout).await {
            debug!(ip = %host, port = port, "Port open");
            dispatch_probe(run, ProbeContext::new(host, port));
        }
    }
}

fn dispatch_probe(run: &Arc<Run>, context: ProbeContext) {
    run.tracker.record_probe_sent();
    tokio::spawn(probe_agent(run.clone(), context));
}

async fn probe_agent(run: Arc<Run>, context: ProbeContext) {
    // Dropped last, after every device of the response is out
    let _settle = Settle::new(&run, Stage::Probe);

    let url = probe_url(context.address, context.port);

    match run.backends.protocol.probe(&url, context).await {
        ProbeOutcome::Success { document, context } => {
            let mac = resolve_mac(&run, context.address).await;
            for descriptor in document.devices {
                let device = DiscoveredDevice::new(context.address, context.port, mac, descriptor.name)
                    .with_identity(descriptor.id, descriptor.uuid);
                info!(
                    name = %device.name(),
                    ip = %context.address,
                    port = context.port,
                    mac = ?mac,
                    "Found MTConnect device"
                );
                let _ = run.events.send(SnifferEvent::DeviceFound(device));
            }
        }
        ProbeOutcome::ProtocolError { document, context } => {
            debug!(agent = %context, errors = document.errors.len(), "Agent returned an error document");
        }
        ProbeOutcome::TransportError { cause } => {
            debug!(error = %cause, "Probe failed");
        }
    }
}

/// Best-effort hardware address lookup off the async workers
async fn resolve_mac(run: &Run, ip: Ipv4Addr) -> Option<MacAddress> {
    let resolver = run.backends.hardware.clone();
    match tokio::task::spawn_blocking(move || resolver.resolve(ip)).await {
        Ok(mac) => mac,
        Err(e) => {
            debug!(ip = %ip, error = %e, "Hardware address lookup aborted");
            None
        }
    }
}
