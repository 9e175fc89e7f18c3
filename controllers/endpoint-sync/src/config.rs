//! Process configuration
//!
//! The whole configuration surface is environment variables, parsed once
//! at startup. Any parse failure (missing required variable, bad number,
//! bad port syntax) is a fatal startup error; regex patterns are carried
//! as raw strings here and compiled (also fatally) by the rule evaluator.

use crate::discovery::{PortSpec, ProviderKind};
use crate::error::ControllerError;
use crate::rules::FilterConfig;
use openstack_client::AuthConfig;
use std::time::Duration;

/// Parsed controller configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discovery backend selector (`ENDPOINT_TYPE`)
    pub provider: ProviderKind,
    /// Sync loop period (`SYNC_PERIOD`, seconds, default 5)
    pub sync_period: Duration,
    /// Managed Endpoints namespace (`K8S_NAMESPACE`)
    pub namespace: String,
    /// Managed Endpoints name (`K8S_ENDPOINT`)
    pub endpoint_name: String,
    /// Filter and grouping patterns, uncompiled
    pub filters: FilterConfig,
    /// Port applied to records that declare none (`DEFAULT_PORT`)
    pub default_port: Option<PortSpec>,
    /// OpenStack credentials, present when the backend needs them
    pub openstack: Option<AuthConfig>,
}

impl Config {
    /// Loads configuration from process environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ControllerError> {
        let provider = required(&lookup, "ENDPOINT_TYPE")?
            .parse::<ProviderKind>()
            .map_err(ControllerError::InvalidConfig)?;

        let sync_period = parse_period(lookup("SYNC_PERIOD"))?;
        let namespace = required(&lookup, "K8S_NAMESPACE")?;
        let endpoint_name = required(&lookup, "K8S_ENDPOINT")?;

        let name_pattern = lookup("FILTER_NAME");
        let metadata_patterns = parse_metadata_filters(lookup("FILTER_METADATA"))?;
        let group_key_pattern = lookup("GROUP_METADATA_KEY");

        // With no filters configured at all, select instances labeled for
        // this endpoint: metadata keys ending in service.name /
        // service.namespace must name the managed object exactly
        let filters = if name_pattern.is_none() && metadata_patterns.is_empty() {
            FilterConfig {
                name_pattern: None,
                metadata_patterns: vec![
                    (".*service\\.name$".to_string(), format!("^{endpoint_name}$")),
                    (".*service\\.namespace$".to_string(), format!("^{namespace}$")),
                ],
                group_key_pattern,
            }
        } else {
            FilterConfig { name_pattern, metadata_patterns, group_key_pattern }
        };

        let default_port = lookup("DEFAULT_PORT")
            .map(|raw| {
                raw.parse::<PortSpec>().map_err(|e| {
                    ControllerError::InvalidConfig(format!("invalid DEFAULT_PORT {raw:?}: {e}"))
                })
            })
            .transpose()?;

        let openstack = match provider {
            ProviderKind::OpenStack => Some(AuthConfig {
                auth_url: required(&lookup, "OS_AUTH_URL")?,
                username: required(&lookup, "OS_USERNAME")?,
                password: required(&lookup, "OS_PASSWORD")?,
                project_name: required(&lookup, "OS_PROJECT")?,
                user_domain_id: lookup("OS_USER_DOMAIN_ID"),
                project_domain_id: lookup("OS_PROJECT_DOMAIN_ID"),
            }),
        };

        Ok(Self {
            provider,
            sync_period,
            namespace,
            endpoint_name,
            filters,
            default_port,
            openstack,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ControllerError> {
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            ControllerError::InvalidConfig(format!("{key} environment variable is required"))
        })
}

fn parse_period(raw: Option<String>) -> Result<Duration, ControllerError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(5));
    };
    let seconds = raw.parse::<f64>().map_err(|_| {
        ControllerError::InvalidConfig(format!("invalid SYNC_PERIOD {raw:?}: not a number"))
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ControllerError::InvalidConfig(format!(
            "invalid SYNC_PERIOD {raw:?}: must be a positive number of seconds"
        )));
    }
    Ok(Duration::from_secs_f64(seconds))
}

/// Parses `FILTER_METADATA`: comma-separated `key_regex:value_regex` pairs.
/// The key pattern must not itself contain `:` or `,`; the value pattern
/// may contain `:` (only the first colon splits).
fn parse_metadata_filters(
    raw: Option<String>,
) -> Result<Vec<(String, String)>, ControllerError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let mut pairs = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once(':').ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "invalid FILTER_METADATA entry {entry:?}: expected key_regex:value_regex"
            ))
        })?;
        if key.trim().is_empty() {
            return Err(ControllerError::InvalidConfig(format!(
                "invalid FILTER_METADATA entry {entry:?}: empty key pattern"
            )));
        }
        pairs.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}
