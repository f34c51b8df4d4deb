use lifegraph_schemas::{round_to, CanonicalRecord, Location, Visibility};

/// Default number of decimal places a published coordinate may carry
pub const DEFAULT_MAX_DECIMALS: usize = 2;

/// Truncate or null a coordinate pair.
///
/// Minors, private records and incomplete pairs get no location. Otherwise
/// each coordinate is rounded to `max_decimals` places with the
/// round-then-reparse helper.
pub fn redact_gps(
    lat: Option<f64>,
    lng: Option<f64>,
    visibility: Visibility,
    is_minor: bool,
    max_decimals: usize,
) -> Option<Location> {
    if is_minor || visibility == Visibility::Private {
        return None;
    }

    let (lat, lng) = (lat?, lng?);
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }

    Some(Location {
        lat: round_to(lat, max_decimals),
        lng: round_to(lng, max_decimals),
    })
}

/// Location redaction phase for a single record
pub fn redact_record_location(mut record: CanonicalRecord, max_decimals: usize) -> CanonicalRecord {
    record.location = redact_gps(
        record.location.map(|l| l.lat),
        record.location.map(|l| l.lng),
        record.visibility,
        record.is_minor,
        max_decimals,
    );
    record
}
