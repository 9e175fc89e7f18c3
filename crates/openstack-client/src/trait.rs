//! ComputeClientTrait for mocking
//!
//! This trait abstracts the OpenStack client to enable mocking in unit tests.
//! The concrete OpenStackClient implements this trait, and tests can use mock
//! implementations.

use crate::error::OpenStackError;
use crate::models::Server;

/// Trait for OpenStack compute API operations
///
/// This trait enables mocking of OpenStack API calls for unit testing.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ComputeClientTrait: Send + Sync {
    /// Get the Keystone auth URL
    fn auth_url(&self) -> &str;

    /// Validate credentials and connectivity by acquiring a token
    async fn validate_auth(&self) -> Result<(), OpenStackError>;

    /// List servers in the authenticated project
    ///
    /// `name_hint` is a server-side name filter passed through to Nova as an
    /// optimization; callers must not rely on it being applied.
    async fn list_servers(&self, name_hint: Option<&str>) -> Result<Vec<Server>, OpenStackError>;
}
