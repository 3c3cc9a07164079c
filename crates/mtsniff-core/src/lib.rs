//! mtsniff Core - Shared types for MTConnect device discovery
//!
//! This crate provides the value types passed between the discovery engine,
//! the MTConnect protocol client and callers:
//! - `DiscoveredDevice` for each device reported by an agent
//! - `MacAddress` for best-effort link-layer enrichment
//! - `ProbeContext` for correlating an in-flight probe with its origin

pub mod device;

pub use device::{DiscoveredDevice, MacAddress, MacAddressError, ProbeContext};
