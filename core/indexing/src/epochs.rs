use chrono::NaiveDate;
use lifegraph_schemas::{parse_day, CanonicalRecord, EpochDefinition, EpochSummary};
use std::collections::BTreeMap;
use tracing::debug;

/// Label for records outside every configured epoch
pub const FALLBACK_EPOCH: &str = "Uncharted";

/// Epoch with parsed bounds
#[derive(Debug, Clone)]
struct Span<'a> {
    def: &'a EpochDefinition,
    start: NaiveDate,
    end: NaiveDate,
}

/// Parse and order configured epochs by start date. Entries with
/// unparseable bounds never match anything.
fn spans(epochs: &[EpochDefinition]) -> Vec<Span<'_>> {
    let mut spans: Vec<Span> = epochs
        .iter()
        .filter_map(|def| {
            Some(Span {
                def,
                start: parse_day(&def.start)?,
                end: parse_day(&def.end)?,
            })
        })
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.def.label.cmp(&b.def.label)));
    spans
}

/// Label of the first epoch containing `day` (bounds inclusive)
pub fn assign_epoch(day: NaiveDate, epochs: &[EpochDefinition]) -> String {
    spans(epochs)
        .into_iter()
        .find(|span| span.start <= day && day <= span.end)
        .map(|span| span.def.label.clone())
        .unwrap_or_else(|| FALLBACK_EPOCH.to_string())
}

/// Label every record, keeping a non-empty label set by its producer
pub fn assign_epochs(
    records: Vec<CanonicalRecord>,
    epochs: &[EpochDefinition],
) -> Vec<CanonicalRecord> {
    records
        .into_iter()
        .map(|mut record| {
            if record.epoch.trim().is_empty() {
                record.epoch = match record.day() {
                    Some(day) => assign_epoch(day, epochs),
                    None => FALLBACK_EPOCH.to_string(),
                };
            }
            record
        })
        .collect()
}

/// Per-epoch node counts for the graph document.
///
/// Configured epochs come first in start order, each listed even when empty.
/// Any other label in use follows, ordered by its earliest record.
pub fn summarize_epochs(
    records: &[CanonicalRecord],
    epochs: &[EpochDefinition],
) -> Vec<EpochSummary> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.epoch.as_str()).or_insert(0) += 1;
    }

    let mut summaries: Vec<EpochSummary> = spans(epochs)
        .into_iter()
        .map(|span| EpochSummary {
            label: span.def.label.clone(),
            start: span.def.start.clone(),
            end: span.def.end.clone(),
            count: counts.get(span.def.label.as_str()).copied().unwrap_or(0),
        })
        .collect();

    let mut ordered: Vec<&CanonicalRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.day()
            .cmp(&b.day())
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.id.cmp(&b.id))
    });

    for record in ordered {
        if summaries.iter().any(|s| s.label == record.epoch) {
            continue;
        }
        debug!("Epoch label outside configuration: {}", record.epoch);
        summaries.push(EpochSummary {
            label: record.epoch.clone(),
            start: String::new(),
            end: String::new(),
            count: counts.get(record.epoch.as_str()).copied().unwrap_or(0),
        });
    }

    summaries
}
