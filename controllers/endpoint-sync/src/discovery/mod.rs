//! Discovery provider abstraction
//!
//! A discovery provider lists externally managed endpoints (e.g. cloud VMs)
//! as provider-neutral records. Providers may apply server-side filter hints
//! to reduce wire volume, but the rule evaluator re-filters authoritatively,
//! so a provider that ignores hints is still correct.

pub mod openstack;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Transport protocol of an endpoint port
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    /// Kubernetes wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl FromStr for Protocol {
    type Err = PortParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(PortParseError::Protocol(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (protocol, port) pair of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub port: u16,
}

/// Failure to parse a `proto:port` entry
#[derive(Debug, Error)]
pub enum PortParseError {
    /// Unknown protocol name
    #[error("unknown protocol: {0}")]
    Protocol(String),

    /// Missing or non-numeric port number
    #[error("invalid port entry: {0}")]
    Port(String),
}

impl FromStr for PortSpec {
    type Err = PortParseError;

    /// Parses a `proto:port` entry, e.g. `tcp:8080`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (proto, port) = s
            .split_once(':')
            .ok_or_else(|| PortParseError::Port(s.to_string()))?;
        let protocol = proto.trim().parse::<Protocol>()?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| PortParseError::Port(s.to_string()))?;
        Ok(PortSpec { protocol, port })
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

/// One discovered endpoint, as reported by a provider before rule evaluation
///
/// `id` is unique within one discovery cycle's result set. A usable record
/// has at least one address; providers skip addressless records themselves
/// (record-local, non-fatal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecord {
    pub id: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub ports: BTreeSet<PortSpec>,
}

/// Provider-side filter hints
///
/// Hints reduce over-the-wire volume only; correctness never depends on a
/// provider applying them.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilters {
    /// Name filter hint (literal substring/prefix, not a regex)
    pub name: Option<String>,
}

/// Errors surfaced by a discovery provider
///
/// A provider failure aborts the current cycle and leaves the managed
/// target untouched; the next scheduled cycle retries from scratch.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Backend unreachable or rejected the request
    #[error("discovery backend unavailable: {0}")]
    Unavailable(String),
}

/// Polymorphic discovery capability
///
/// New backends implement this trait and get selected by `ProviderKind`;
/// the reconciler never branches on the concrete backend type.
#[async_trait::async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// List the current external records, best-effort applying `filters`
    async fn list(&self, filters: &DiscoveryFilters)
    -> Result<Vec<ExternalRecord>, DiscoveryError>;
}

/// Configuration enumeration of available discovery backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenStack,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openstack" => Ok(ProviderKind::OpenStack),
            other => Err(format!("unknown endpoint type: {other}")),
        }
    }
}
