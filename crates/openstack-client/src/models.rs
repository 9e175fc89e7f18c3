//! OpenStack API models
//!
//! These models match the subset of the Keystone v3 and Nova (compute)
//! wire formats the endpoint-sync controller consumes: server identity,
//! status, per-network addresses, and free-form metadata.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Nova server listing response (`GET /servers/detail`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerListResponse {
    pub servers: Vec<Server>,
    /// Pagination links; a `rel == "next"` entry points at the next page
    #[serde(default)]
    pub servers_links: Vec<ServerLink>,
}

/// Pagination link entry in a server listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLink {
    pub rel: String,
    pub href: String,
}

/// Nova server (compute instance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    /// Server state, e.g. `ACTIVE`, `SHUTOFF`, `ERROR`
    pub status: String,
    /// Addresses keyed by network name
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
    /// Free-form instance metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One address entry under a server's network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    /// IP version, 4 or 6
    pub version: u8,
}

/// Keystone v3 token response body (`POST /auth/tokens`)
///
/// The subject token itself arrives in the `X-Subject-Token` header;
/// the body carries the service catalog used to resolve the compute URL.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: TokenBody,
}

/// Inner `token` object of a Keystone token response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBody {
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

/// One service in the Keystone catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// One endpoint of a catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    pub url: String,
}
