use lifegraph_schemas::{CanonicalRecord, Evidence, Signal, GENERIC_PERSON_LABEL};
use std::collections::HashSet;

/// Largest day gap that still counts as temporal proximity
pub const TEMPORAL_WINDOW_DAYS: i64 = 30;

/// Compute every piece of "why connected" evidence between two records.
///
/// Evidence is emitted in a fixed order: same-day, temporal-proximity,
/// shared-project, shared-entity, shared-tags, shared-place, shared-client.
pub fn calculate_signals(a: &CanonicalRecord, b: &CanonicalRecord) -> Vec<Evidence> {
    let mut evidence = Vec::new();

    if a.date == b.date {
        evidence.push(make(Signal::SameDay, format!("Both on {}", a.date)));
    }

    if let (Some(day_a), Some(day_b)) = (a.day(), b.day()) {
        let days = (day_a - day_b).num_days().abs();
        // A zero-day gap is never proximity, even when the strings differ
        if days > 0 && days <= TEMPORAL_WINDOW_DAYS {
            evidence.push(make(
                Signal::TemporalProximity,
                format!("{} day{} apart", days, if days == 1 { "" } else { "s" }),
            ));
        }
    }

    let projects = shared(&a.entities.projects, &b.entities.projects);
    if !projects.is_empty() {
        evidence.push(make(
            Signal::SharedProject,
            format!("Shared project: {}", projects.join(", ")),
        ));
    }

    let people: Vec<String> = shared(&a.entities.people, &b.entities.people)
        .into_iter()
        .filter(|p| p != GENERIC_PERSON_LABEL)
        .collect();
    if !people.is_empty() {
        evidence.push(make(
            Signal::SharedEntity,
            format!("Both involve {}", people.join(", ")),
        ));
    }

    let tags = shared(&a.entities.tags, &b.entities.tags);
    if !tags.is_empty() {
        evidence.push(make(Signal::SharedTags, format!("Shared tags: {}", tags.join(", "))));
    }

    let places = shared(&a.entities.places, &b.entities.places);
    if !places.is_empty() {
        evidence.push(make(Signal::SharedPlace, format!("Both at {}", places.join(", "))));
    }

    let clients = shared(&a.entities.clients, &b.entities.clients);
    if !clients.is_empty() {
        evidence.push(make(
            Signal::SharedClient,
            format!("Same client: {}", clients.join(", ")),
        ));
    }

    evidence
}

fn make(signal: Signal, description: String) -> Evidence {
    Evidence {
        kind: signal.kind(),
        signal,
        description,
        weight: signal.weight(),
    }
}

/// Case-insensitive intersection, deduplicated, keeping the first-seen casing from `a`
pub fn shared(a: &[String], b: &[String]) -> Vec<String> {
    let other: HashSet<String> = b.iter().map(|s| s.trim().to_lowercase()).collect();
    let mut seen = HashSet::new();

    a.iter()
        .filter(|item| {
            let key = item.trim().to_lowercase();
            !key.is_empty() && other.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}
