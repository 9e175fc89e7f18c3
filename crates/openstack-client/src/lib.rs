//! OpenStack compute API client
//!
//! A Rust client library for the slice of the OpenStack API the
//! endpoint-sync controller needs: Keystone v3 password authentication
//! and Nova server listing.
//!
//! # Example
//!
//! ```no_run
//! use openstack_client::{AuthConfig, ComputeClientTrait, OpenStackClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenStackClient::new(AuthConfig {
//!     auth_url: "https://keystone.example:5000/v3".to_string(),
//!     username: "svc-endpoint-sync".to_string(),
//!     password: "secret".to_string(),
//!     project_name: "infra".to_string(),
//!     user_domain_id: None,
//!     project_domain_id: None,
//! })?;
//!
//! // List all servers in the project, with an optional server-side name hint
//! let servers = client.list_servers(Some("api-")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Token caching**: authenticates lazily and re-authenticates once on 401
//! - **Catalog resolution**: the compute endpoint is taken from the Keystone
//!   service catalog returned with the token
//! - **Pagination**: follows `servers_links` until the listing is exhausted

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod compute_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{AuthConfig, OpenStackClient};
pub use compute_trait::ComputeClientTrait;
pub use error::OpenStackError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockComputeClient;
