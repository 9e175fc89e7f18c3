//! Mock compute client for unit testing
//!
//! This module provides a mock implementation of ComputeClientTrait that can
//! be used in unit tests without requiring a running OpenStack deployment.

use crate::compute_trait::ComputeClientTrait;
use crate::error::OpenStackError;
use crate::models::Server;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock compute client for testing
///
/// This mock stores servers in memory and can be configured to fail the
/// listing call, ignore the name hint, or count calls for assertions.
#[derive(Debug, Clone)]
pub struct MockComputeClient {
    auth_url: String,
    servers: Arc<Mutex<Vec<Server>>>,
    fail_listing: Arc<Mutex<bool>>,
    honor_name_hint: Arc<Mutex<bool>>,
    list_calls: Arc<Mutex<u32>>,
}

impl MockComputeClient {
    /// Create a new mock client
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            servers: Arc::new(Mutex::new(Vec::new())),
            fail_listing: Arc::new(Mutex::new(false)),
            honor_name_hint: Arc::new(Mutex::new(true)),
            list_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Replace the in-memory server inventory (for test setup)
    pub fn set_servers(&self, servers: Vec<Server>) {
        *self.servers.lock().unwrap() = servers;
    }

    /// Make subsequent listing calls fail as unavailable (for test setup)
    pub fn set_fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    /// Control whether the name hint is applied server-side
    ///
    /// Hints are an optimization only, so tests can disable them to verify
    /// that callers re-filter authoritatively.
    pub fn set_honor_name_hint(&self, honor: bool) {
        *self.honor_name_hint.lock().unwrap() = honor;
    }

    /// Number of listing calls made so far
    pub fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }

    /// Convenience constructor for a test server
    pub fn server(
        id: &str,
        name: &str,
        addresses: &[(&str, &[(&str, u8)])],
        metadata: &[(&str, &str)],
    ) -> Server {
        let addresses = addresses
            .iter()
            .map(|(network, addrs)| {
                (
                    (*network).to_string(),
                    addrs
                        .iter()
                        .map(|(addr, version)| crate::models::ServerAddress {
                            addr: (*addr).to_string(),
                            version: *version,
                        })
                        .collect(),
                )
            })
            .collect::<HashMap<_, _>>();
        let metadata = metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<HashMap<_, _>>();
        Server {
            id: id.to_string(),
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            addresses,
            metadata,
        }
    }
}

#[async_trait::async_trait]
impl ComputeClientTrait for MockComputeClient {
    fn auth_url(&self) -> &str {
        &self.auth_url
    }

    async fn validate_auth(&self) -> Result<(), OpenStackError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(OpenStackError::Authentication(
                "mock auth failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn list_servers(&self, name_hint: Option<&str>) -> Result<Vec<Server>, OpenStackError> {
        *self.list_calls.lock().unwrap() += 1;

        if *self.fail_listing.lock().unwrap() {
            return Err(OpenStackError::Api("mock listing failure".to_string()));
        }

        let servers = self.servers.lock().unwrap().clone();
        if !*self.honor_name_hint.lock().unwrap() {
            return Ok(servers);
        }

        Ok(match name_hint {
            Some(hint) => servers
                .into_iter()
                .filter(|s| s.name.contains(hint))
                .collect(),
            None => servers,
        })
    }
}
