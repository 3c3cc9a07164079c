//! mtsniff MTConnect - Probe client for MTConnect agents
//!
//! This crate issues the MTConnect `probe` request against an agent and
//! classifies the reply:
//! - `MTConnectDevices` documents list the devices served by the agent
//! - `MTConnectError` documents are protocol-level failures
//! - anything else (refused connection, timeout, garbage body) is a transport error

pub mod client;
pub mod document;

pub use client::{probe_url, HttpProbeClient, ProbeError, ProbeOutcome, ProtocolClient};
pub use document::{
    parse_document, AgentError, DeviceDescriptor, DevicesDocument, Document, DocumentError,
    ErrorDocument, Header,
};
