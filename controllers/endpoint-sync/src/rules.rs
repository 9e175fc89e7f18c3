//! Rule evaluator
//!
//! Compiles the user-supplied filter and grouping configuration once at
//! startup into an immutable rule set. Regex compile failures are fatal
//! configuration errors, never per-cycle errors.
//!
//! Selection semantics: all configured rule categories are ANDed; an
//! unconfigured category imposes no restriction. A record with no metadata
//! never matches a configured metadata rule.
//!
//! Patterns match from the start of the subject: `api-.*` selects `api-1`
//! but not `edge-api-1`. Matching a suffix needs an explicit leading `.*`,
//! and a full match an explicit trailing `$`.

use crate::discovery::ExternalRecord;
use crate::error::ControllerError;
use regex::Regex;

/// Raw filter configuration, as parsed from the environment
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Regex over record names (`FILTER_NAME`)
    pub name_pattern: Option<String>,
    /// `(key_regex, value_regex)` pairs (`FILTER_METADATA`)
    pub metadata_patterns: Vec<(String, String)>,
    /// Regex over metadata keys designating the group-key source
    /// (`GROUP_METADATA_KEY`)
    pub group_key_pattern: Option<String>,
}

/// One compiled metadata matching rule
#[derive(Debug)]
struct MetadataRule {
    key: Regex,
    value: Regex,
}

/// Compiled, immutable rule set
#[derive(Debug)]
pub struct RuleSet {
    name: Option<Regex>,
    metadata: Vec<MetadataRule>,
    group_key: Option<Regex>,
    name_hint: Option<String>,
}

impl RuleSet {
    /// Compiles the configuration; any invalid regex is fatal
    pub fn compile(config: &FilterConfig) -> Result<Self, ControllerError> {
        let name = config
            .name_pattern
            .as_deref()
            .map(|p| Self::compile_one("FILTER_NAME", p))
            .transpose()?;

        let mut metadata = Vec::with_capacity(config.metadata_patterns.len());
        for (key, value) in &config.metadata_patterns {
            metadata.push(MetadataRule {
                key: Self::compile_one("FILTER_METADATA key", key)?,
                value: Self::compile_one("FILTER_METADATA value", value)?,
            });
        }

        let group_key = config
            .group_key_pattern
            .as_deref()
            .map(|p| Self::compile_one("GROUP_METADATA_KEY", p))
            .transpose()?;

        let name_hint = config.name_pattern.as_deref().and_then(literal_hint);

        Ok(Self { name, metadata, group_key, name_hint })
    }

    /// Compiles `pattern` anchored at the start of the subject
    fn compile_one(what: &str, pattern: &str) -> Result<Regex, ControllerError> {
        Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
            ControllerError::InvalidConfig(format!("invalid {what} regex {pattern:?}: {e}"))
        })
    }

    /// Whether the record passes every configured rule
    pub fn selects(&self, record: &ExternalRecord) -> bool {
        if let Some(name) = &self.name {
            if !name.is_match(&record.name) {
                return false;
            }
        }

        self.metadata.iter().all(|rule| {
            record
                .metadata
                .iter()
                .any(|(key, value)| rule.key.is_match(key) && rule.value.is_match(value))
        })
    }

    /// Group key of a record, when grouping is configured and the record
    /// carries a matching, non-empty metadata value
    ///
    /// Must only be called for records that already passed `selects`;
    /// grouping never resurrects excluded records.
    pub fn group_key(&self, record: &ExternalRecord) -> Option<String> {
        let pattern = self.group_key.as_ref()?;
        record
            .metadata
            .iter()
            .find(|(key, value)| pattern.is_match(key) && !value.is_empty())
            .map(|(_, value)| value.clone())
    }

    /// Provider-side name hint, when the name pattern is a plain literal
    ///
    /// The hint is an optimization only, `selects` stays authoritative.
    pub fn name_hint(&self) -> Option<String> {
        self.name_hint.clone()
    }
}

/// Extracts a literal from a name pattern: anchors are stripped, and any
/// remaining regex metacharacter disables the hint
fn literal_hint(pattern: &str) -> Option<String> {
    let literal = pattern.strip_prefix('^').unwrap_or(pattern);
    let literal = literal.strip_suffix('$').unwrap_or(literal);
    if literal.is_empty() || literal.contains(|c| ".*+?()[]{}|\\^$".contains(c)) {
        return None;
    }
    Some(literal.to_string())
}
