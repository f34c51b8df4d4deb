use chrono::{SecondsFormat, Utc};
use lifegraph_schemas::{RunId, RunStats, RunStatus, StatusDocument};

use crate::error::FatalError;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn success_status(run_id: RunId, stats: RunStats) -> StatusDocument {
    StatusDocument {
        run_id,
        last_run: timestamp(),
        status: RunStatus::Success,
        stats: Some(stats),
        error: None,
    }
}

pub fn failure_status(run_id: RunId, error: &FatalError) -> StatusDocument {
    StatusDocument {
        run_id,
        last_run: timestamp(),
        status: RunStatus::Failed,
        stats: None,
        error: Some(error.to_string()),
    }
}
