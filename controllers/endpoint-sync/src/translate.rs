//! Endpoint translator
//!
//! Pure translation of filtered records into the desired subset list.
//! Records sharing a group key merge into one subset (address union in
//! first-appearance order, port union); records without a key each become
//! their own subset. Output is sorted by key (group key, or record id for
//! ungrouped records) so diffs and tests are reproducible.

use crate::discovery::{ExternalRecord, PortSpec};
use crate::rules::RuleSet;
use std::collections::{BTreeMap, BTreeSet};

/// One desired endpoint subset
///
/// `key` orders the desired state deterministically; it does not take part
/// in equality. Two subsets are equal iff their address sets and port sets
/// are equal, order-independent.
#[derive(Debug, Clone)]
pub struct DesiredSubset {
    pub key: String,
    pub addresses: Vec<String>,
    pub ports: BTreeSet<PortSpec>,
}

impl DesiredSubset {
    fn address_set(&self) -> BTreeSet<&str> {
        self.addresses.iter().map(String::as_str).collect()
    }
}

/// Set-equality over two desired states, ignoring subset order and
/// address order within a subset
pub fn subsets_equal(left: &[DesiredSubset], right: &[DesiredSubset]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let normalize = |subsets: &[DesiredSubset]| {
        let mut normalized: Vec<(BTreeSet<String>, BTreeSet<PortSpec>)> = subsets
            .iter()
            .map(|s| {
                (
                    s.address_set().iter().map(|a| (*a).to_string()).collect(),
                    s.ports.clone(),
                )
            })
            .collect();
        normalized.sort();
        normalized
    };
    normalize(left) == normalize(right)
}

/// Translates already-filtered records into the desired subset list
///
/// `default_port` fills in for records that declare no ports of their own.
/// A subset whose members declare no ports and with no default configured
/// keeps an empty port set: valid but inert, left to the operator to make
/// meaningful.
pub fn translate(
    selected: &[ExternalRecord],
    rules: &RuleSet,
    default_port: Option<PortSpec>,
) -> Vec<DesiredSubset> {
    let mut subsets: BTreeMap<String, DesiredSubset> = BTreeMap::new();

    for record in selected {
        let key = rules
            .group_key(record)
            .unwrap_or_else(|| record.id.clone());

        let mut ports = record.ports.clone();
        if ports.is_empty() {
            if let Some(default) = default_port {
                ports.insert(default);
            }
        }

        let subset = subsets.entry(key.clone()).or_insert_with(|| DesiredSubset {
            key,
            addresses: Vec::new(),
            ports: BTreeSet::new(),
        });
        for address in &record.addresses {
            if !subset.addresses.contains(address) {
                subset.addresses.push(address.clone());
            }
        }
        subset.ports.extend(ports);
    }

    // BTreeMap iteration yields ascending key order
    subsets.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Protocol;
    use crate::rules::{FilterConfig, RuleSet};
    use crate::test_utils::{record, record_with_ports};

    fn grouping_rules() -> RuleSet {
        RuleSet::compile(&FilterConfig {
            group_key_pattern: Some(".*endpoint\\.group$".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    fn no_rules() -> RuleSet {
        RuleSet::compile(&FilterConfig::default()).unwrap()
    }

    #[test]
    fn test_shared_group_key_merges_into_one_subset() {
        let records = vec![
            record("1", "web-1", &["10.0.0.1"], &[("endpoint.group", "web")]),
            record("2", "web-2", &["10.0.0.2"], &[("endpoint.group", "web")]),
            record("3", "lonely", &["10.0.0.3"], &[]),
        ];

        let desired = translate(&records, &grouping_rules(), None);

        assert_eq!(desired.len(), 2);
        // "3" (record id) sorts before "web" (group key)
        assert_eq!(desired[0].key, "3");
        assert_eq!(desired[0].addresses, vec!["10.0.0.3".to_string()]);
        assert_eq!(desired[1].key, "web");
        assert_eq!(
            desired[1].addresses,
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
    }

    #[test]
    fn test_merged_subset_unions_ports_and_dedups_addresses() {
        let tcp = PortSpec { protocol: Protocol::Tcp, port: 8080 };
        let udp = PortSpec { protocol: Protocol::Udp, port: 53 };
        let records = vec![
            record_with_ports("1", "a", &["10.0.0.1"], &[("endpoint.group", "g")], &[tcp]),
            record_with_ports(
                "2",
                "b",
                &["10.0.0.1", "10.0.0.2"],
                &[("endpoint.group", "g")],
                &[udp],
            ),
        ];

        let desired = translate(&records, &grouping_rules(), None);

        assert_eq!(desired.len(), 1);
        assert_eq!(
            desired[0].addresses,
            vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]
        );
        assert_eq!(desired[0].ports, BTreeSet::from([tcp, udp]));
    }

    #[test]
    fn test_default_port_applied_to_portless_records_only() {
        let tcp = PortSpec { protocol: Protocol::Tcp, port: 443 };
        let declared = PortSpec { protocol: Protocol::Tcp, port: 8080 };
        let records = vec![
            record("1", "a", &["10.0.0.1"], &[]),
            record_with_ports("2", "b", &["10.0.0.2"], &[], &[declared]),
        ];

        let desired = translate(&records, &no_rules(), Some(tcp));

        assert_eq!(desired[0].ports, BTreeSet::from([tcp]));
        assert_eq!(desired[1].ports, BTreeSet::from([declared]));
    }

    #[test]
    fn test_portless_subset_is_kept_not_dropped() {
        let records = vec![record("1", "a", &["10.0.0.1"], &[])];
        let desired = translate(&records, &no_rules(), None);
        assert_eq!(desired.len(), 1);
        assert!(desired[0].ports.is_empty());
    }

    #[test]
    fn test_output_order_is_deterministic_regardless_of_input_order() {
        use crate::discovery::ExternalRecord;

        let a = record("b-id", "b", &["10.0.0.2"], &[]);
        let b = record("a-id", "a", &["10.0.0.1"], &[]);

        let keys = |records: &[ExternalRecord]| {
            translate(records, &no_rules(), None)
                .into_iter()
                .map(|s| s.key)
                .collect::<Vec<_>>()
        };

        assert_eq!(keys(&[a.clone(), b.clone()]), vec!["a-id", "b-id"]);
        assert_eq!(keys(&[b, a]), vec!["a-id", "b-id"]);
    }

    #[test]
    fn test_subsets_equal_ignores_order() {
        let tcp = PortSpec { protocol: Protocol::Tcp, port: 80 };
        let left = vec![
            DesiredSubset {
                key: "a".to_string(),
                addresses: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
                ports: BTreeSet::from([tcp]),
            },
            DesiredSubset {
                key: "b".to_string(),
                addresses: vec!["10.0.0.3".to_string()],
                ports: BTreeSet::new(),
            },
        ];
        let right = vec![
            DesiredSubset {
                key: "other".to_string(),
                addresses: vec!["10.0.0.3".to_string()],
                ports: BTreeSet::new(),
            },
            DesiredSubset {
                key: "names-do-not-matter".to_string(),
                addresses: vec!["10.0.0.2".to_string(), "10.0.0.1".to_string()],
                ports: BTreeSet::from([tcp]),
            },
        ];

        assert!(subsets_equal(&left, &right));
        assert!(!subsets_equal(&left, &right[..1].to_vec()));
    }

    #[test]
    fn test_subsets_equal_detects_address_difference() {
        let left = vec![DesiredSubset {
            key: "a".to_string(),
            addresses: vec!["10.0.0.1".to_string()],
            ports: BTreeSet::new(),
        }];
        let right = vec![DesiredSubset {
            key: "a".to_string(),
            addresses: vec!["10.0.0.9".to_string()],
            ports: BTreeSet::new(),
        }];
        assert!(!subsets_equal(&left, &right));
    }
}
