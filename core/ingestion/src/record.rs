use lifegraph_schemas::{
    parse_day, CanonicalRecord, Entities, Location, NodeId, NodeType, Visibility,
};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::RecordError;
use crate::report::RunReport;
use crate::source::RawRecord;

/// Validate and normalize one raw record into its canonical form.
///
/// Required fields are never synthesized: a record without `id` or `date`,
/// or with a date that does not parse, is rejected. A missing `visibility`
/// falls back to `private`; a missing `type` falls back to `moment`.
pub fn normalize_record(value: &Value) -> Result<CanonicalRecord, RecordError> {
    let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

    let id = required_string(obj, "id")?;
    let date = required_string(obj, "date")?;
    if parse_day(&date).is_none() {
        return Err(RecordError::InvalidDate { id, date });
    }

    let kind = match obj.get("type").and_then(Value::as_str) {
        None => NodeType::Moment,
        Some(raw) => NodeType::parse(raw.trim()).ok_or_else(|| RecordError::InvalidType {
            id: id.clone(),
            value: raw.to_string(),
        })?,
    };

    let visibility = match obj.get("visibility").and_then(Value::as_str) {
        None => Visibility::Private,
        Some(raw) => Visibility::parse(raw.trim()).ok_or_else(|| {
            RecordError::InvalidVisibility {
                id: id.clone(),
                value: raw.to_string(),
            }
        })?,
    };

    let size = obj
        .get("size")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(1.0);

    Ok(CanonicalRecord {
        id: NodeId(id),
        kind,
        title: optional_string(obj, "title"),
        date,
        epoch: optional_string(obj, "epoch"),
        description: optional_string(obj, "description"),
        media: string_list(obj.get("media")),
        connections: Vec::new(),
        size,
        is_hub: obj.get("isHub").and_then(Value::as_bool).unwrap_or(false),
        source: optional_string(obj, "source"),
        source_id: optional_string(obj, "sourceId"),
        visibility,
        entities: entities(obj.get("entities")),
        location: location(obj.get("location")),
        is_minor: obj.get("isMinor").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Normalize every raw record, dropping invalid ones and duplicate ids (first wins)
pub fn normalize_all(raw: &[RawRecord], report: &mut RunReport) -> Vec<CanonicalRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(raw.len());

    for item in raw {
        match normalize_record(&item.value) {
            Ok(record) => {
                if !seen.insert(record.id.clone()) {
                    report.drop_record(&item.origin, &RecordError::DuplicateId(record.id.0));
                    continue;
                }
                debug!("Normalized record {} from {}", record.id, item.origin);
                records.push(record);
            }
            Err(e) => report.drop_record(&item.origin, &e),
        }
    }

    info!(
        "Normalized {} of {} raw records ({} dropped)",
        records.len(),
        raw.len(),
        raw.len() - records.len()
    );

    records
}

fn required_string(obj: &Map<String, Value>, key: &'static str) -> Result<String, RecordError> {
    let value = match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    if value.is_empty() {
        return Err(RecordError::MissingField(key));
    }
    Ok(value)
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn entities(value: Option<&Value>) -> Entities {
    let Some(obj) = value.and_then(Value::as_object) else {
        return Entities::default();
    };

    Entities {
        people: string_list(obj.get("people")),
        places: string_list(obj.get("places")),
        tags: string_list(obj.get("tags")),
        clients: string_list(obj.get("clients")),
        projects: string_list(obj.get("projects")),
    }
}

fn location(value: Option<&Value>) -> Option<Location> {
    let obj = value?.as_object()?;
    let lat = obj.get("lat")?.as_f64()?;
    let lng = obj.get("lng")?.as_f64()?;
    Some(Location { lat, lng })
}
