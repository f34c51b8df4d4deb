use lifegraph_schemas::{round_to, Bounds, CanonicalRecord, HelixParams, LayoutDocument, Position};
use std::collections::BTreeMap;
use std::f64::consts::{PI, TAU};
use tracing::info;

use crate::rng::Mulberry32;

/// Decimal places kept on every layout coordinate
pub const COORDINATE_DECIMALS: usize = 4;

/// Place records on a seeded double helix.
///
/// Records are ordered by date and grouped into buckets by epoch label, in
/// order of first appearance. Each bucket spans one full turn of the helix
/// over `pitch` vertical units, and consecutive buckets are separated by
/// `epoch_gap`. Non-hub records alternate between the two strands.
///
/// The vertical allowance per bucket is always `pitch`, however many records
/// the bucket holds, so sparse and dense epochs occupy equal height.
pub fn compute_layout(records: &[CanonicalRecord], params: &HelixParams) -> LayoutDocument {
    let mut ordered: Vec<&CanonicalRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        a.day()
            .cmp(&b.day())
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut buckets: Vec<(&str, Vec<&CanonicalRecord>)> = Vec::new();
    for record in ordered {
        match buckets.iter_mut().find(|(label, _)| *label == record.epoch) {
            Some((_, members)) => members.push(record),
            None => buckets.push((record.epoch.as_str(), vec![record])),
        }
    }

    let mut rng = Mulberry32::new(params.seed);
    let mut positions = BTreeMap::new();
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut cursor = 0.0;

    for (index, (_, members)) in buckets.iter().enumerate() {
        if index > 0 {
            cursor += params.epoch_gap;
        }
        let start = cursor;
        let n = members.len() as f64;

        for (i, record) in members.iter().enumerate() {
            let strand = if record.is_hub { 0.0 } else { (i % 2) as f64 };
            let t = i as f64 / n;
            let angle = t * TAU + strand * PI;

            let jx = (rng.next_f64() * 2.0 - 1.0) * params.jitter_radius;
            let jz = (rng.next_f64() * 2.0 - 1.0) * params.jitter_radius;

            let position = Position {
                x: coordinate(params.radius * angle.cos() + jx),
                y: coordinate(start + t * params.pitch),
                z: coordinate(params.radius * angle.sin() + jz),
            };
            min_y = min_y.min(position.y);
            max_y = max_y.max(position.y);
            positions.insert(record.id.as_str().to_string(), position);
        }

        cursor = start + params.pitch;
    }

    let bounds = if positions.is_empty() {
        Bounds::default()
    } else {
        Bounds { min_y, max_y }
    };

    info!(
        "Laid out {} nodes in {} epoch buckets (y {}..{})",
        positions.len(),
        buckets.len(),
        bounds.min_y,
        bounds.max_y
    );

    LayoutDocument {
        positions,
        helix_params: *params,
        bounds,
    }
}

fn coordinate(value: f64) -> f64 {
    // Adding zero folds -0.0 into 0.0
    round_to(value, COORDINATE_DECIMALS) + 0.0
}
