//! OpenStack API client
//!
//! Implements Keystone v3 password authentication and the Nova server
//! listing endpoint (`GET /servers/detail`). The compute base URL is
//! resolved from the service catalog returned alongside the token.

use crate::compute_trait::ComputeClientTrait;
use crate::error::OpenStackError;
use crate::models::{Server, ServerListResponse, TokenResponse};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Keystone v3 password authentication parameters
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Keystone base URL, e.g. `https://keystone.example:5000/v3`
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    /// User domain id, defaults to `default`
    pub user_domain_id: Option<String>,
    /// Project domain id, defaults to `default`
    pub project_domain_id: Option<String>,
}

/// Cached authentication state: subject token plus resolved compute URL
#[derive(Debug, Clone)]
struct Session {
    token: String,
    compute_url: String,
}

/// OpenStack API client
#[derive(Debug)]
pub struct OpenStackClient {
    client: Client,
    auth: AuthConfig,
    session: Mutex<Option<Session>>,
}

impl OpenStackClient {
    /// Create a new OpenStack client
    ///
    /// # Arguments
    /// * `auth` - Keystone v3 password authentication parameters
    pub fn new(auth: AuthConfig) -> Result<Self, OpenStackError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(OpenStackError::Http)?;

        Ok(Self {
            client,
            auth: AuthConfig {
                auth_url: auth.auth_url.trim_end_matches('/').to_string(),
                ..auth
            },
            session: Mutex::new(None),
        })
    }

    /// Authenticate against Keystone and resolve the compute endpoint
    ///
    /// Returns the fresh session and replaces any cached one.
    async fn authenticate(&self) -> Result<Session, OpenStackError> {
        let url = format!("{}/auth/tokens", self.auth.auth_url);
        debug!("Requesting Keystone token from {}", url);

        let user_domain = self.auth.user_domain_id.as_deref().unwrap_or("default");
        let project_domain = self.auth.project_domain_id.as_deref().unwrap_or("default");
        let body = serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.auth.username,
                            "domain": {"id": user_domain},
                            "password": self.auth.password,
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.auth.project_name,
                        "domain": {"id": project_domain},
                    }
                }
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(OpenStackError::Http)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Authentication(format!(
                "Keystone rejected credentials: {} - {}",
                status, text
            )));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Api(format!(
                "Failed to acquire token: {} - {}",
                status, text
            )));
        }

        let token = response
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                OpenStackError::Authentication("token response missing X-Subject-Token".to_string())
            })?;

        let token_body: TokenResponse = response.json().await?;
        let compute_url = Self::resolve_compute_url(&token_body)?;

        debug!("Authenticated; compute endpoint is {}", compute_url);
        let session = Session { token, compute_url };
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    /// Pick the public compute endpoint from the service catalog,
    /// falling back to internal when no public interface is published.
    fn resolve_compute_url(token: &TokenResponse) -> Result<String, OpenStackError> {
        let compute = token
            .token
            .catalog
            .iter()
            .find(|entry| entry.service_type == "compute")
            .ok_or_else(|| {
                OpenStackError::Catalog("no compute service in catalog".to_string())
            })?;

        compute
            .endpoints
            .iter()
            .find(|e| e.interface == "public")
            .or_else(|| compute.endpoints.iter().find(|e| e.interface == "internal"))
            .map(|e| e.url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                OpenStackError::Catalog("compute service has no usable endpoint".to_string())
            })
    }

    /// Get the cached session, authenticating if none exists
    async fn session(&self) -> Result<Session, OpenStackError> {
        if let Some(session) = self.session.lock().await.clone() {
            return Ok(session);
        }
        self.authenticate().await
    }

    /// Fetch all pages of a server listing
    async fn fetch_all_servers(
        &self,
        session: &Session,
        mut url: String,
    ) -> Result<Vec<Server>, OpenStackError> {
        let mut all_servers = Vec::new();

        loop {
            debug!("Fetching server page: {}", url);

            let response = self
                .client
                .get(&url)
                .header("X-Auth-Token", &session.token)
                .header("Accept", "application/json")
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(OpenStackError::Authentication(
                    "compute API rejected token".to_string(),
                ));
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(OpenStackError::Api(format!(
                    "Failed to list servers: {} - {}",
                    status, text
                )));
            }

            let response_text = response.text().await?;
            let page: ServerListResponse = serde_json::from_str(&response_text).map_err(|e| {
                OpenStackError::Api(format!(
                    "error decoding server listing: {} - Response (first 500 chars): {}",
                    e,
                    response_text.chars().take(500).collect::<String>()
                ))
            })?;
            all_servers.extend(page.servers);

            match page.servers_links.iter().find(|link| link.rel == "next") {
                Some(next) => {
                    url = if next.href.starts_with("http") {
                        next.href.clone()
                    } else {
                        format!("{}{}", session.compute_url, next.href)
                    };
                }
                None => break,
            }
        }

        Ok(all_servers)
    }
}

#[async_trait::async_trait]
impl ComputeClientTrait for OpenStackClient {
    fn auth_url(&self) -> &str {
        &self.auth.auth_url
    }

    /// Validate credentials by acquiring a fresh token.
    ///
    /// Used at startup to distinguish fatal authentication errors from
    /// transient unavailability before the sync loop starts.
    async fn validate_auth(&self) -> Result<(), OpenStackError> {
        self.authenticate().await?;
        Ok(())
    }

    /// List servers in the authenticated project
    ///
    /// `name_hint` is passed to Nova as the `name` query parameter, which the
    /// API treats as a server-side name filter. It is an optimization only;
    /// callers re-filter the result authoritatively.
    ///
    /// Retries once with a fresh token if the cached one has expired.
    async fn list_servers(&self, name_hint: Option<&str>) -> Result<Vec<Server>, OpenStackError> {
        let session = self.session().await?;

        let mut url = format!("{}/servers/detail", session.compute_url);
        if let Some(name) = name_hint {
            url = format!("{}?name={}", url, urlencoding::encode(name));
        }

        match self.fetch_all_servers(&session, url.clone()).await {
            Err(OpenStackError::Authentication(_)) => {
                // Cached token expired; re-authenticate once and retry
                debug!("Token expired, re-authenticating");
                let session = self.authenticate().await?;
                let mut url = format!("{}/servers/detail", session.compute_url);
                if let Some(name) = name_hint {
                    url = format!("{}?name={}", url, urlencoding::encode(name));
                }
                self.fetch_all_servers(&session, url).await
            }
            other => other,
        }
    }
}
