//! Managed target accessor
//!
//! Read-modify-write contract against the single managed `Endpoints`
//! object. Writes are guarded by the object's resourceVersion (an opaque
//! concurrency token, compared, never interpreted); a conflict means the
//! object changed since it was read and the caller must re-read and
//! recompute before retrying. The object is never deleted here.

use crate::discovery::{PortSpec, Protocol};
use crate::error::ControllerError;
use crate::translate::DesiredSubset;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::Api;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Last-read state of the managed target
#[derive(Debug, Clone)]
pub struct TargetState {
    /// Concurrency token of the read object
    pub resource_version: Option<String>,
    /// Currently stored subsets, in stored order
    pub subsets: Vec<DesiredSubset>,
}

/// Result of a successful conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Existing object replaced; carries the new concurrency token
    Updated(String),
    /// Object was absent and has been created
    Created(String),
}

/// Errors surfaced by the target accessor
#[derive(Debug, Error)]
pub enum TargetError {
    /// The stored object changed since it was read
    #[error("conflict: managed target changed since last read")]
    Conflict,

    /// The target is gone and could not be (re)created
    #[error("managed target not found and could not be created")]
    NotFound,

    /// Authorization failure (fatal for the process)
    #[error("authorization denied: {0}")]
    Denied(String),

    /// Any other Kubernetes API failure
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl TargetError {
    /// Maps failures onto the controller taxonomy.
    ///
    /// The reconciler consumes conflicts in its bounded retry loop before
    /// converting; a conflict reaching this path is one failed attempt and
    /// stays cycle-transient.
    pub fn into_controller_error(self) -> ControllerError {
        match self {
            TargetError::Denied(msg) => ControllerError::Denied(msg),
            TargetError::NotFound => {
                ControllerError::WriteFatal("managed target cannot be created".to_string())
            }
            TargetError::Api(e) => ControllerError::Kube(e),
            TargetError::Conflict => ControllerError::ConflictExhausted { attempts: 1 },
        }
    }
}

/// Read/apply contract against the managed target
///
/// Abstracted as a trait so tests can substitute write-counting and
/// conflict-injecting doubles for the live cluster.
#[async_trait::async_trait]
pub trait EndpointsTarget: Send + Sync {
    /// `namespace/name` of the managed object, for logging
    fn target_ref(&self) -> String;

    /// Current state, or `None` when the object does not exist
    async fn read(&self) -> Result<Option<TargetState>, TargetError>;

    /// Conditional write guarded by `resource_version`
    ///
    /// `None` means the target was absent at read time and a create is
    /// attempted directly. A replace hitting a deleted object falls back
    /// to create; when even the create fails with not-found (namespace
    /// gone), `TargetError::NotFound` surfaces and is write-fatal.
    async fn apply(
        &self,
        desired: &[DesiredSubset],
        resource_version: Option<String>,
    ) -> Result<ApplyOutcome, TargetError>;
}

/// Live accessor over `Api<Endpoints>`
pub struct KubeEndpointsTarget {
    api: Api<Endpoints>,
    namespace: String,
    name: String,
}

impl KubeEndpointsTarget {
    pub fn new(api: Api<Endpoints>, namespace: String, name: String) -> Self {
        Self { api, namespace, name }
    }

    fn classify(err: kube::Error) -> TargetError {
        if let kube::Error::Api(ae) = &err {
            match ae.code {
                401 | 403 => return TargetError::Denied(ae.message.clone()),
                404 => return TargetError::NotFound,
                409 => return TargetError::Conflict,
                _ => {}
            }
        }
        TargetError::Api(err)
    }

    fn build_object(&self, desired: &[DesiredSubset], resource_version: Option<String>) -> Endpoints {
        Endpoints {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version,
                ..Default::default()
            },
            subsets: Some(desired.iter().map(to_k8s_subset).collect()),
        }
    }

    async fn create(&self, desired: &[DesiredSubset]) -> Result<ApplyOutcome, TargetError> {
        let object = self.build_object(desired, None);
        let created = self
            .api
            .create(&PostParams::default(), &object)
            .await
            .map_err(Self::classify)?;
        let version = created.metadata.resource_version.unwrap_or_default();
        info!("Created managed target {}", self.target_ref());
        Ok(ApplyOutcome::Created(version))
    }
}

#[async_trait::async_trait]
impl EndpointsTarget for KubeEndpointsTarget {
    fn target_ref(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    async fn read(&self) -> Result<Option<TargetState>, TargetError> {
        let object = self.api.get_opt(&self.name).await.map_err(Self::classify)?;
        Ok(object.map(|endpoints| TargetState {
            resource_version: endpoints.metadata.resource_version.clone(),
            subsets: from_k8s_subsets(endpoints.subsets.as_deref().unwrap_or_default()),
        }))
    }

    async fn apply(
        &self,
        desired: &[DesiredSubset],
        resource_version: Option<String>,
    ) -> Result<ApplyOutcome, TargetError> {
        let Some(version) = resource_version else {
            return self.create(desired).await;
        };

        let object = self.build_object(desired, Some(version));
        match self.api.replace(&self.name, &PostParams::default(), &object).await {
            Ok(replaced) => {
                let new_version = replaced.metadata.resource_version.unwrap_or_default();
                debug!("Replaced managed target {}", self.target_ref());
                Ok(ApplyOutcome::Updated(new_version))
            }
            Err(err) => match Self::classify(err) {
                TargetError::NotFound => {
                    // Deleted between read and write; recreate from desired
                    warn!(
                        "Managed target {} deleted since last read, recreating",
                        self.target_ref()
                    );
                    self.create(desired).await
                }
                other => Err(other),
            },
        }
    }
}

/// Converts one desired subset to the wire shape
fn to_k8s_subset(subset: &DesiredSubset) -> EndpointSubset {
    let addresses: Vec<EndpointAddress> = subset
        .addresses
        .iter()
        .map(|ip| EndpointAddress { ip: ip.clone(), ..Default::default() })
        .collect();
    let ports: Vec<EndpointPort> = subset
        .ports
        .iter()
        .map(|p| EndpointPort {
            port: i32::from(p.port),
            protocol: Some(p.protocol.as_str().to_string()),
            ..Default::default()
        })
        .collect();
    EndpointSubset {
        addresses: Some(addresses),
        ports: if ports.is_empty() { None } else { Some(ports) },
        ..Default::default()
    }
}

/// Converts stored subsets back into the comparison shape
///
/// Ports with protocols this controller does not manage (e.g. SCTP) are
/// dropped from the comparison view; a foreign port still shows up as a
/// difference through the addresses/ports it displaces.
fn from_k8s_subsets(subsets: &[EndpointSubset]) -> Vec<DesiredSubset> {
    subsets
        .iter()
        .enumerate()
        .map(|(index, subset)| {
            let addresses: Vec<String> = subset
                .addresses
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|a| a.ip.clone())
                .collect();
            let ports: BTreeSet<PortSpec> = subset
                .ports
                .as_deref()
                .unwrap_or_default()
                .iter()
                .filter_map(|p| {
                    let protocol = match p.protocol.as_deref().unwrap_or("TCP") {
                        "TCP" => Protocol::Tcp,
                        "UDP" => Protocol::Udp,
                        other => {
                            debug!("Ignoring unmanaged protocol {} on stored target", other);
                            return None;
                        }
                    };
                    u16::try_from(p.port).ok().map(|port| PortSpec { protocol, port })
                })
                .collect();
            DesiredSubset { key: index.to_string(), addresses, ports }
        })
        .collect()
}
