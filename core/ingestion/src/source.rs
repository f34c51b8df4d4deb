use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::report::RunReport;

/// A raw record as handed over by an upstream producer, tagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub origin: String,
    pub value: Value,
}

/// Producer-facing interface: anything that can hand over raw canonical records
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// Load all raw records. Unreadable inputs are reported and skipped;
    /// an `Err` is reserved for failures of the source itself.
    async fn load(&self, report: &mut RunReport) -> Result<Vec<RawRecord>>;
}

/// Reads every `*.json` file in a directory. Each file holds either a JSON
/// array of records or an object with a `records` array.
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list records directory {}", self.dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().map(|e| e == "json").unwrap_or(false) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl RecordSource for JsonDirSource {
    fn name(&self) -> &str {
        "json-dir"
    }

    async fn load(&self, report: &mut RunReport) -> Result<Vec<RawRecord>> {
        if !self.dir.is_dir() {
            report.warn(format!(
                "Records directory {} does not exist",
                self.dir.display()
            ));
            return Ok(Vec::new());
        }

        let files = self.list_files()?;
        info!("Reading {} record files from {}", files.len(), self.dir.display());

        let mut tasks = JoinSet::new();
        for (index, path) in files.into_iter().enumerate() {
            tasks.spawn(async move {
                let parsed = read_record_file(&path).await;
                (index, path, parsed)
            });
        }

        // Completion order is arbitrary; restore file order before flattening.
        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.context("Record file reader task failed")?);
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut records = Vec::new();
        for (_, path, parsed) in results {
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            match parsed {
                Ok(values) => {
                    debug!("{}: {} raw records", label, values.len());
                    records.extend(values.into_iter().enumerate().map(|(i, value)| RawRecord {
                        origin: format!("{}#{}", label, i),
                        value,
                    }));
                }
                Err(e) => report.warn(format!("Skipping record file {}: {:#}", label, e)),
            }
        }

        Ok(records)
    }
}

async fn read_record_file(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    match document {
        Value::Array(values) => Ok(values),
        Value::Object(mut map) => match map.remove("records") {
            Some(Value::Array(values)) => Ok(values),
            _ => anyhow::bail!("{} has no records array", path.display()),
        },
        _ => anyhow::bail!("{} is not a JSON array", path.display()),
    }
}

/// In-memory source, used when records are produced by the caller
pub struct MemorySource {
    records: Vec<Value>,
}

impl MemorySource {
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, _report: &mut RunReport) -> Result<Vec<RawRecord>> {
        Ok(self
            .records
            .iter()
            .enumerate()
            .map(|(i, value)| RawRecord {
                origin: format!("memory#{}", i),
                value: value.clone(),
            })
            .collect())
    }
}
