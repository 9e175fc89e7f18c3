//! OpenStack discovery backend
//!
//! Maps Nova compute instances onto external records. Instance metadata
//! drives address selection and optional port declarations:
//!
//! - a key ending in `endpoint.network.name` names the network whose
//!   addresses are used; without it, all networks contribute
//! - a key ending in `endpoint.network.version` restricts the IP version
//!   (default 4)
//! - a key ending in `endpoint.ports` declares a comma-separated
//!   `proto:port` list, e.g. `tcp:8080,udp:53`

use crate::discovery::{
    DiscoveryError, DiscoveryFilters, DiscoveryProvider, ExternalRecord, PortSpec,
};
use openstack_client::{ComputeClientTrait, Server};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

const NETWORK_NAME_KEY: &str = "endpoint.network.name";
const NETWORK_VERSION_KEY: &str = "endpoint.network.version";
const PORTS_KEY: &str = "endpoint.ports";

/// Discovery provider backed by the OpenStack compute API
pub struct OpenStackProvider {
    client: Arc<dyn ComputeClientTrait>,
}

impl OpenStackProvider {
    /// Creates a provider over an authenticated compute client
    pub fn new(client: Arc<dyn ComputeClientTrait>) -> Self {
        Self { client }
    }

    /// Finds the first metadata value whose key ends with `suffix`
    ///
    /// Namespaced keys like `acme.io/endpoint.network.name` match alongside
    /// the bare form. Iteration over the sorted map keeps the pick stable.
    fn metadata_suffix<'a>(metadata: &'a BTreeMap<String, String>, suffix: &str) -> Option<&'a str> {
        metadata
            .iter()
            .find(|(key, _)| key.ends_with(suffix))
            .map(|(_, value)| value.as_str())
    }

    /// Maps one server to a record; `None` when the server is unusable
    /// (not ACTIVE, or no address survives selection)
    fn map_server(server: &Server) -> Option<ExternalRecord> {
        if server.status != "ACTIVE" {
            debug!(
                "Skipping server {} ({}): status {}",
                server.name, server.id, server.status
            );
            return None;
        }

        let metadata: BTreeMap<String, String> = server
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let version = match Self::metadata_suffix(&metadata, NETWORK_VERSION_KEY) {
            Some(raw) => match raw.parse::<u8>() {
                Ok(v) => v,
                Err(_) => {
                    warn!(
                        "Server {}: invalid {} value {:?}, defaulting to 4",
                        server.name, NETWORK_VERSION_KEY, raw
                    );
                    4
                }
            },
            None => 4,
        };

        let named_network = Self::metadata_suffix(&metadata, NETWORK_NAME_KEY);
        let addresses = Self::select_addresses(server, named_network, version);
        if addresses.is_empty() {
            warn!(
                "Skipping malformed record: server {} ({}) has no IPv{} address{}",
                server.name,
                server.id,
                version,
                named_network
                    .map(|n| format!(" on network {n:?}"))
                    .unwrap_or_default()
            );
            return None;
        }

        let ports = Self::parse_ports(&server.name, &metadata);

        Some(ExternalRecord {
            id: server.id.clone(),
            name: server.name.clone(),
            addresses,
            metadata,
            ports,
        })
    }

    /// Collects addresses of the requested IP version, restricted to the
    /// named network when one is declared and present on the server.
    /// Networks are visited in name order so the result is deterministic.
    fn select_addresses(server: &Server, named_network: Option<&str>, version: u8) -> Vec<String> {
        let networks: BTreeMap<&str, _> = server
            .addresses
            .iter()
            .map(|(name, addrs)| (name.as_str(), addrs))
            .collect();

        let selected: Vec<&str> = match named_network {
            Some(name) if networks.contains_key(name) => vec![name],
            _ => networks.keys().copied().collect(),
        };

        let mut addresses = Vec::new();
        for network in selected {
            if let Some(addrs) = networks.get(network) {
                for addr in addrs.iter() {
                    if addr.version == version && !addresses.contains(&addr.addr) {
                        addresses.push(addr.addr.clone());
                    }
                }
            }
        }
        addresses
    }

    /// Parses the `endpoint.ports` declaration; malformed entries are
    /// skipped with a warning (record-local, never fails the record)
    fn parse_ports(server_name: &str, metadata: &BTreeMap<String, String>) -> BTreeSet<PortSpec> {
        let mut ports = BTreeSet::new();
        let Some(declared) = Self::metadata_suffix(metadata, PORTS_KEY) else {
            return ports;
        };

        for entry in declared.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<PortSpec>() {
                Ok(port) => {
                    ports.insert(port);
                }
                Err(e) => {
                    warn!("Server {}: ignoring port entry {:?}: {}", server_name, entry, e);
                }
            }
        }
        ports
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for OpenStackProvider {
    async fn list(
        &self,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<ExternalRecord>, DiscoveryError> {
        let servers = self
            .client
            .list_servers(filters.name.as_deref())
            .await
            .map_err(|e| DiscoveryError::Unavailable(e.to_string()))?;

        let total = servers.len();
        let records: Vec<ExternalRecord> = servers.iter().filter_map(Self::map_server).collect();

        let skipped = total - records.len();
        if skipped > 0 {
            warn!("Discovery skipped {} of {} servers", skipped, total);
        }
        debug!("Discovered {} usable records", records.len());

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Protocol;
    use openstack_client::MockComputeClient;

    fn active_server(
        id: &str,
        name: &str,
        addresses: &[(&str, &[(&str, u8)])],
        metadata: &[(&str, &str)],
    ) -> Server {
        MockComputeClient::server(id, name, addresses, metadata)
    }

    #[tokio::test]
    async fn test_maps_server_to_record() {
        let client = MockComputeClient::new("https://keystone.test:5000/v3");
        client.set_servers(vec![active_server(
            "id-1",
            "api-1",
            &[("internal", &[("10.0.0.1", 4)])],
            &[("service.name", "api")],
        )]);

        let provider = OpenStackProvider::new(Arc::new(client));
        let records = provider.list(&DiscoveryFilters::default()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "id-1");
        assert_eq!(records[0].name, "api-1");
        assert_eq!(records[0].addresses, vec!["10.0.0.1".to_string()]);
        assert_eq!(records[0].metadata["service.name"], "api");
        assert!(records[0].ports.is_empty());
    }

    #[tokio::test]
    async fn test_named_network_restricts_addresses() {
        let server = active_server(
            "id-1",
            "api-1",
            &[
                ("internal", &[("10.0.0.1", 4)]),
                ("public", &[("203.0.113.9", 4)]),
            ],
            &[("acme.io/endpoint.network.name", "internal")],
        );
        let record = OpenStackProvider::map_server(&server).unwrap();
        assert_eq!(record.addresses, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn test_version_selection_defaults_to_v4() {
        let server = active_server(
            "id-1",
            "api-1",
            &[("internal", &[("fd00::1", 6), ("10.0.0.1", 4)])],
            &[],
        );
        let record = OpenStackProvider::map_server(&server).unwrap();
        assert_eq!(record.addresses, vec!["10.0.0.1".to_string()]);

        let server = active_server(
            "id-2",
            "api-2",
            &[("internal", &[("fd00::1", 6), ("10.0.0.1", 4)])],
            &[("endpoint.network.version", "6")],
        );
        let record = OpenStackProvider::map_server(&server).unwrap();
        assert_eq!(record.addresses, vec!["fd00::1".to_string()]);
    }

    #[tokio::test]
    async fn test_addressless_server_is_skipped_not_fatal() {
        let client = MockComputeClient::new("https://keystone.test:5000/v3");
        client.set_servers(vec![
            active_server("id-1", "broken-1", &[], &[]),
            active_server("id-2", "api-1", &[("internal", &[("10.0.0.1", 4)])], &[]),
        ]);

        let provider = OpenStackProvider::new(Arc::new(client));
        let records = provider.list(&DiscoveryFilters::default()).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "api-1");
    }

    #[tokio::test]
    async fn test_inactive_server_is_skipped() {
        let mut server = active_server("id-1", "api-1", &[("internal", &[("10.0.0.1", 4)])], &[]);
        server.status = "SHUTOFF".to_string();
        assert!(OpenStackProvider::map_server(&server).is_none());
    }

    #[tokio::test]
    async fn test_port_metadata_parsed_with_bad_entries_skipped() {
        let server = active_server(
            "id-1",
            "api-1",
            &[("internal", &[("10.0.0.1", 4)])],
            &[("endpoint.ports", "tcp:8080, udp:53, bogus, sctp:1")],
        );
        let record = OpenStackProvider::map_server(&server).unwrap();
        let ports: Vec<PortSpec> = record.ports.into_iter().collect();
        assert_eq!(
            ports,
            vec![
                PortSpec { protocol: Protocol::Tcp, port: 8080 },
                PortSpec { protocol: Protocol::Udp, port: 53 },
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_backend_surfaces_error() {
        let client = MockComputeClient::new("https://keystone.test:5000/v3");
        client.set_fail_listing(true);

        let provider = OpenStackProvider::new(Arc::new(client));
        let result = provider.list(&DiscoveryFilters::default()).await;
        assert!(matches!(result, Err(DiscoveryError::Unavailable(_))));
    }
}
