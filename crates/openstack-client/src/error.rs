//! OpenStack client errors

use thiserror::Error;

/// Errors that can occur when interacting with the OpenStack APIs
#[derive(Debug, Error)]
pub enum OpenStackError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OpenStack API returned an error
    #[error("OpenStack API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (bad credentials, expired token, etc.)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The service catalog has no usable endpoint for a required service
    #[error("Service catalog error: {0}")]
    Catalog(String),
}
