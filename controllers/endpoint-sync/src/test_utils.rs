//! Test utilities for unit testing the reconciler
//!
//! This module provides record builders and in-memory doubles for the
//! discovery provider and the managed target accessor.

use crate::discovery::{
    DiscoveryError, DiscoveryFilters, DiscoveryProvider, ExternalRecord, PortSpec,
};
use crate::target::{ApplyOutcome, EndpointsTarget, TargetError, TargetState};
use crate::translate::DesiredSubset;
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Builds a test record without ports
pub fn record(
    id: &str,
    name: &str,
    addresses: &[&str],
    metadata: &[(&str, &str)],
) -> ExternalRecord {
    record_with_ports(id, name, addresses, metadata, &[])
}

/// Builds a test record with explicit ports
pub fn record_with_ports(
    id: &str,
    name: &str,
    addresses: &[&str],
    metadata: &[(&str, &str)],
    ports: &[PortSpec],
) -> ExternalRecord {
    ExternalRecord {
        id: id.to_string(),
        name: name.to_string(),
        addresses: addresses.iter().map(|a| (*a).to_string()).collect(),
        metadata: metadata
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        ports: ports.iter().copied().collect(),
    }
}

/// Discovery provider double returning a scripted record set
pub struct ScriptedProvider {
    records: Mutex<Vec<ExternalRecord>>,
    unavailable: Mutex<bool>,
    list_calls: Mutex<u32>,
    last_filters: Mutex<Option<DiscoveryFilters>>,
}

impl ScriptedProvider {
    pub fn new(records: Vec<ExternalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            unavailable: Mutex::new(false),
            list_calls: Mutex::new(0),
            last_filters: Mutex::new(None),
        }
    }

    pub fn set_records(&self, records: Vec<ExternalRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }

    pub fn last_filters(&self) -> Option<DiscoveryFilters> {
        self.last_filters.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DiscoveryProvider for ScriptedProvider {
    async fn list(
        &self,
        filters: &DiscoveryFilters,
    ) -> Result<Vec<ExternalRecord>, DiscoveryError> {
        *self.list_calls.lock().unwrap() += 1;
        *self.last_filters.lock().unwrap() = Some(filters.clone());
        if *self.unavailable.lock().unwrap() {
            return Err(DiscoveryError::Unavailable("scripted outage".to_string()));
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Write-counting in-memory target with conflict injection
///
/// Mimics the optimistic-concurrency behavior of the live accessor: a write
/// whose token does not match the stored version is a conflict, and each
/// successful write bumps the version.
pub struct InMemoryTarget {
    stored: Mutex<Option<(u64, Vec<DesiredSubset>)>>,
    write_count: Mutex<u32>,
    read_count: Mutex<u32>,
    conflicts_to_inject: Mutex<u32>,
    deny: Mutex<bool>,
    fail_create: Mutex<bool>,
}

impl InMemoryTarget {
    /// Target that does not exist yet
    pub fn absent() -> Self {
        Self {
            stored: Mutex::new(None),
            write_count: Mutex::new(0),
            read_count: Mutex::new(0),
            conflicts_to_inject: Mutex::new(0),
            deny: Mutex::new(false),
            fail_create: Mutex::new(false),
        }
    }

    /// Target pre-populated with subsets at version 1
    pub fn with_subsets(subsets: Vec<DesiredSubset>) -> Self {
        let target = Self::absent();
        *target.stored.lock().unwrap() = Some((1, subsets));
        target
    }

    /// Target that exists with no subsets
    pub fn empty() -> Self {
        Self::with_subsets(Vec::new())
    }

    pub fn write_count(&self) -> u32 {
        *self.write_count.lock().unwrap()
    }

    pub fn read_count(&self) -> u32 {
        *self.read_count.lock().unwrap()
    }

    /// Makes the next `count` applies fail with a conflict, each one
    /// simulating a concurrent external write by bumping the version
    pub fn inject_conflicts(&self, count: u32) {
        *self.conflicts_to_inject.lock().unwrap() = count;
    }

    pub fn set_deny(&self, deny: bool) {
        *self.deny.lock().unwrap() = deny;
    }

    /// Makes creation fail as not-found (namespace gone)
    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn stored_subsets(&self) -> Option<Vec<DesiredSubset>> {
        self.stored
            .lock()
            .unwrap()
            .as_ref()
            .map(|(_, subsets)| subsets.clone())
    }
}

#[async_trait::async_trait]
impl EndpointsTarget for InMemoryTarget {
    fn target_ref(&self) -> String {
        "test/endpoints".to_string()
    }

    async fn read(&self) -> Result<Option<TargetState>, TargetError> {
        *self.read_count.lock().unwrap() += 1;
        if *self.deny.lock().unwrap() {
            return Err(TargetError::Denied("test denial".to_string()));
        }
        Ok(self
            .stored
            .lock()
            .unwrap()
            .as_ref()
            .map(|(version, subsets)| TargetState {
                resource_version: Some(version.to_string()),
                subsets: subsets.clone(),
            }))
    }

    async fn apply(
        &self,
        desired: &[DesiredSubset],
        resource_version: Option<String>,
    ) -> Result<ApplyOutcome, TargetError> {
        if *self.deny.lock().unwrap() {
            return Err(TargetError::Denied("test denial".to_string()));
        }

        let mut stored = self.stored.lock().unwrap();

        {
            let mut pending = self.conflicts_to_inject.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                // Concurrent writer raced us: bump the stored version
                if let Some((version, _)) = stored.as_mut() {
                    *version += 1;
                }
                return Err(TargetError::Conflict);
            }
        }

        match (stored.as_mut(), resource_version) {
            (Some((version, subsets)), Some(provided)) => {
                if provided != version.to_string() {
                    return Err(TargetError::Conflict);
                }
                *version += 1;
                *subsets = desired.to_vec();
                *self.write_count.lock().unwrap() += 1;
                Ok(ApplyOutcome::Updated(version.to_string()))
            }
            (Some(_), None) => Err(TargetError::Conflict),
            // Deleted between read and write: the live accessor falls back
            // to create, and so does the double
            (None, _) => {
                if *self.fail_create.lock().unwrap() {
                    return Err(TargetError::NotFound);
                }
                *stored = Some((1, desired.to_vec()));
                *self.write_count.lock().unwrap() += 1;
                Ok(ApplyOutcome::Created("1".to_string()))
            }
        }
    }
}

/// Subsets stored by `InMemoryTarget` keep whatever keys the writer used;
/// build one directly when a test needs pre-existing state
pub fn subset(key: &str, addresses: &[&str], ports: &[PortSpec]) -> DesiredSubset {
    DesiredSubset {
        key: key.to_string(),
        addresses: addresses.iter().map(|a| (*a).to_string()).collect(),
        ports: ports.iter().copied().collect::<BTreeSet<_>>(),
    }
}
