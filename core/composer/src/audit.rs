use lifegraph_ingestion::{contains_ignore_case, is_minor, surname_after_minor};
use lifegraph_schemas::{Allowlist, GENERIC_PERSON_LABEL};
use serde_json::{Number, Value};
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::PrivacyConfig;

/// Outcome of the final privacy gate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Any entry here blocks publication
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Audit the assembled documents as a whole before anything is published.
///
/// `serialized` is the exact text that would be written, so forbidden
/// substrings are caught wherever they end up.
pub fn audit(
    graph: &Value,
    layout: &Value,
    serialized: &str,
    allowlist: &Allowlist,
    config: &PrivacyConfig,
) -> AuditReport {
    let mut report = AuditReport::default();
    let nodes = graph
        .get("nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut node_ids = BTreeSet::new();
    for node in nodes {
        let id = node.get("id").and_then(Value::as_str).unwrap_or("?");
        node_ids.insert(id);
        audit_node(id, node, allowlist, config, &mut report);
    }

    for pattern in &config.forbidden_substrings {
        if pattern.trim().is_empty() {
            continue;
        }
        if contains_ignore_case(serialized, pattern) {
            report
                .violations
                .push(format!("output contains forbidden substring {:?}", pattern));
        }
    }

    let positions = layout.get("positions").and_then(Value::as_object);
    if let Some(positions) = positions {
        for id in positions.keys() {
            if !node_ids.contains(id.as_str()) {
                report
                    .warnings
                    .push(format!("layout position for unknown node {}", id));
            }
        }
    }
    for id in &node_ids {
        if !positions.is_some_and(|p| p.contains_key(*id)) {
            report.warnings.push(format!("node {} has no layout position", id));
        }
    }

    for violation in &report.violations {
        warn!("Privacy violation: {}", violation);
    }
    info!(
        "Privacy audit: {} violations, {} warnings",
        report.violations.len(),
        report.warnings.len()
    );

    report
}

fn audit_node(
    id: &str,
    node: &Value,
    allowlist: &Allowlist,
    config: &PrivacyConfig,
    report: &mut AuditReport,
) {
    if node.get("visibility").and_then(Value::as_str) == Some("private") {
        report.violations.push(format!("node {} is private", id));
    }

    let location = node.get("location").filter(|l| !l.is_null());
    if let Some(location) = location {
        for key in ["lat", "lng"] {
            if let Some(Value::Number(n)) = location.get(key) {
                let places = decimal_places(n);
                if places > config.max_gps_decimals {
                    report.violations.push(format!(
                        "node {} {} has {} decimals (max {})",
                        id, key, places, config.max_gps_decimals
                    ));
                }
            }
        }
    }

    let people: Vec<&str> = node
        .pointer("/entities/people")
        .and_then(Value::as_array)
        .map(|people| people.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let flagged = node.get("isMinor").and_then(Value::as_bool).unwrap_or(false);

    if !flagged && people.iter().any(|p| is_minor(p, allowlist)) {
        report
            .violations
            .push(format!("node {} names a minor but is not flagged", id));
    }

    if flagged {
        if location.is_some() {
            report
                .violations
                .push(format!("minor node {} has a location", id));
        }
        for field in ["title", "description"] {
            let text = node.get(field).and_then(Value::as_str).unwrap_or("");
            if let Some(surname) = surname_after_minor(text, &allowlist.minors.first_names) {
                report.violations.push(format!(
                    "minor node {} {} keeps surname {:?}",
                    id, field, surname
                ));
            }
            for pattern in &allowlist.minors.blocked_patterns {
                if !pattern.trim().is_empty() && contains_ignore_case(text, pattern) {
                    report.violations.push(format!(
                        "minor node {} {} contains blocked pattern {:?}",
                        id, field, pattern
                    ));
                }
            }
        }
    }

    for person in people {
        if person == GENERIC_PERSON_LABEL || person.split_whitespace().count() < 2 {
            continue;
        }
        if !is_public_full_name(person, &allowlist.public) {
            report
                .violations
                .push(format!("node {} names {:?} who is not public", id, person));
        }
    }
}

/// Digits after the decimal point in a JSON number's text form
pub fn decimal_places(n: &Number) -> usize {
    let text = n.to_string();
    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i64>().unwrap_or(0)),
        None => (text.as_str(), 0),
    };
    let fraction = mantissa
        .split_once('.')
        .map(|(_, f)| f.trim_end_matches('0'))
        .unwrap_or("");
    (fraction.len() as i64 - exponent).max(0) as usize
}

/// Whether a multi-token name is covered by the public list.
///
/// Beyond an exact case-insensitive match, a name matches when one token list
/// is a prefix of the other (at least two tokens shared), or when first and
/// last tokens agree, so a missing middle name on either side still matches.
pub fn is_public_full_name(name: &str, public: &[String]) -> bool {
    let tokens = name_tokens(name);
    public.iter().any(|entry| {
        let entry = name_tokens(entry);
        if entry.is_empty() {
            return false;
        }
        if entry == tokens {
            return true;
        }
        let shared = entry.len().min(tokens.len());
        if shared >= 2 && entry[..shared] == tokens[..shared] {
            return true;
        }
        entry.len() >= 2
            && entry.first() == tokens.first()
            && entry.last() == tokens.last()
    })
}

fn name_tokens(name: &str) -> Vec<String> {
    name.split_whitespace().map(str::to_lowercase).collect()
}
