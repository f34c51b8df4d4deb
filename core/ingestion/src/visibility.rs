use lifegraph_schemas::{Allowlist, CanonicalRecord, Curation, Visibility, GENERIC_PERSON_LABEL};
use tracing::debug;

/// Resolve the access tier for a record.
///
/// The producer's tier is the starting point and a curation override, when
/// present, replaces it outright. Every person entity that is not on the public
/// list then caps the tier at `friends`. The cap is a `min`, so the result
/// does not depend on entity order and can only narrow.
pub fn assign_visibility(
    record: &CanonicalRecord,
    allowlist: &Allowlist,
    curation: &Curation,
) -> Visibility {
    let mut tier = curation.override_for(&record.id).unwrap_or(record.visibility);

    for person in &record.entities.people {
        if !allowlist.is_public(person) {
            tier = tier.restrict(Visibility::Friends);
        }
    }

    tier
}

/// Tier assignment phase: returns the record with its resolved tier
pub fn resolve_visibility(
    mut record: CanonicalRecord,
    allowlist: &Allowlist,
    curation: &Curation,
) -> CanonicalRecord {
    let tier = assign_visibility(&record, allowlist, curation);
    if tier != record.visibility {
        debug!(
            "Visibility of {} resolved {} -> {}",
            record.id,
            record.visibility.as_str(),
            tier.as_str()
        );
    }
    record.visibility = tier;
    record
}

/// Replace every person not on the public or friends list with a generic label
pub fn rewrite_people(mut record: CanonicalRecord, allowlist: &Allowlist) -> CanonicalRecord {
    record.entities.people = record
        .entities
        .people
        .into_iter()
        .map(|person| {
            if allowlist.is_public(&person) || allowlist.is_friend(&person) {
                person
            } else {
                GENERIC_PERSON_LABEL.to_string()
            }
        })
        .collect();
    record
}

pub fn apply_allowlist(records: Vec<CanonicalRecord>, allowlist: &Allowlist) -> Vec<CanonicalRecord> {
    records
        .into_iter()
        .map(|record| rewrite_people(record, allowlist))
        .collect()
}
