use tracing::warn;

use crate::error::{AssetError, RecordError};

/// A record that was dropped during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    pub origin: String,
    pub reason: String,
}

/// A media asset that was not published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedAsset {
    pub node: String,
    pub path: String,
    pub reason: String,
}

/// Per-run reporting context threaded through every phase.
///
/// Recoverable record and asset problems are collected here instead of in
/// process-wide counters, and the orchestrator summarizes them into the
/// status document at the end of the run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub dropped: Vec<DroppedRecord>,
    pub skipped_assets: Vec<SkippedAsset>,
    pub warnings: Vec<String>,
    pub media_written: usize,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drop_record(&mut self, origin: impl Into<String>, error: &RecordError) {
        let origin = origin.into();
        warn!("Dropping record {}: {}", origin, error);
        self.dropped.push(DroppedRecord {
            origin,
            reason: error.to_string(),
        });
    }

    pub fn skip_asset(&mut self, node: &str, path: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Skipping media {} on {}: {}", path, node, reason);
        self.skipped_assets.push(SkippedAsset {
            node: node.to_string(),
            path: path.to_string(),
            reason,
        });
    }

    pub fn skip_asset_error(&mut self, node: &str, path: &str, error: &AssetError) {
        self.skip_asset(node, path, error.to_string());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_collects_entries() {
        let mut report = RunReport::new();
        report.drop_record("events.json#3", &RecordError::MissingField("date"));
        report.skip_asset("moment-1", "photos/a.jpg", "missing file");
        report.warn("remote media left unverified");

        assert_eq!(report.dropped.len(), 1);
        assert_eq!(
            report.dropped[0].reason,
            "record is missing required field 'date'"
        );
        assert_eq!(report.skipped_assets[0].node, "moment-1");
        assert_eq!(report.warnings.len(), 1);
    }
}
