//! mtsniff Discovery - Subnet sweeps for MTConnect agents
//!
//! A run walks every local IPv4 interface, expands it to a subnet and pipes
//! each candidate host through three stages:
//! - ICMP reachability (`ping`)
//! - TCP connect scan of the configured agent ports
//! - MTConnect `probe` request against every open port
//!
//! Devices are reported as they are found and a single completion event is
//! sent once every ping and probe of the run has resolved.

pub mod arp;
pub mod interfaces;
pub mod ping;
pub mod ports;
pub mod sniffer;
pub mod subnet;
pub mod tracker;

pub use arp::{HardwareAddressResolver, NeighborTableResolver};
pub use interfaces::{InterfaceEnumerator, SystemInterfaces};
pub use ping::{PingProber, Reachability, ReachabilityProber};
pub use ports::{PortScanner, TcpConnectScanner};
pub use sniffer::{Backends, DiscoveryError, Sniffer, SnifferConfig, SnifferEvent, Sweep};
pub use subnet::{Subnet, SubnetError};
pub use tracker::{CompletionTracker, RunCounters, RunSummary};
