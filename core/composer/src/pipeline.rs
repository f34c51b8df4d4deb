//! Build orchestrator.
//!
//! One call to [`Pipeline::run`] performs a whole batch build: load, privacy
//! phases, edges, layout, validation, audit and publication. Publication is
//! all-or-nothing. Every fatal error leaves the previously published graph
//! and layout documents and their media byte-identical; only `status.json`
//! changes.

use anyhow::{Context, Result};
use lifegraph_indexing::{
    apply_connections, assign_epochs, build_edges, compute_layout, summarize_epochs,
};
use lifegraph_ingestion::{
    enforce_minors_policy, normalize_all, process_media, published_file_name,
    redact_record_location, resolve_visibility, rewrite_people, JsonDirSource, RecordSource,
    RunReport, MEDIA_DIR,
};
use lifegraph_schemas::{
    generate_run_id, Allowlist, CanonicalRecord, Curation, GraphDocument, RunStats,
    StatusDocument, Visibility,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::assemble::assemble_graph;
use crate::audit::audit;
use crate::config::BuildConfig;
use crate::error::FatalError;
use crate::schema::{validate_graph, validate_layout};
use crate::serializer::{serialize_document, to_canonical_string};
use crate::status::{failure_status, success_status};

pub const GRAPH_FILE: &str = "graph.json";
pub const LAYOUT_FILE: &str = "layout.json";
pub const STATUS_FILE: &str = "status.json";

/// Directory under the output directory where stripped media waits for publication
pub const MEDIA_STAGING_DIR: &str = ".media-staging";

pub struct Pipeline {
    config: BuildConfig,
    source: Box<dyn RecordSource>,
}

impl Pipeline {
    /// Pipeline reading records from the configured records directory
    pub fn new(config: BuildConfig) -> Self {
        let source = JsonDirSource::new(config.paths.records_dir.clone());
        Self::with_source(config, Box::new(source))
    }

    pub fn with_source(config: BuildConfig, source: Box<dyn RecordSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run one build and record its outcome in `status.json`
    pub async fn run(&self) -> Result<RunStats, FatalError> {
        let run_id = generate_run_id();
        info!("Starting build {}", run_id.0);

        let result = self.execute().await;
        let status = match &result {
            Ok(stats) => success_status(run_id, stats.clone()),
            Err(e) => {
                error!("Build failed: {}", e);
                failure_status(run_id, e)
            }
        };

        if let Err(e) = write_status(&self.config.paths.output_dir, &status).await {
            error!("Failed to write status: {:#}", e);
            if result.is_ok() {
                return Err(FatalError::Unexpected(e));
            }
        }

        result
    }

    async fn execute(&self) -> Result<RunStats, FatalError> {
        let staging = self.config.paths.output_dir.join(MEDIA_STAGING_DIR);
        discard_staging(&staging).await?;

        let result = self.build(&staging).await;
        if let Err(e) = discard_staging(&staging).await {
            warn!("{:#}", e);
        }
        result
    }

    async fn build(&self, staging: &Path) -> Result<RunStats, FatalError> {
        let paths = &self.config.paths;
        let graph_path = paths.output_dir.join(GRAPH_FILE);
        let layout_path = paths.output_dir.join(LAYOUT_FILE);

        let mut snapshot = Snapshot::capture(&[graph_path.clone(), layout_path.clone()]).await?;

        let allowlist: Allowlist = read_json(&paths.allowlist)
            .await?
            .with_context(|| format!("Allowlist {} not found", paths.allowlist.display()))?;
        let curation: Curation = read_json(&paths.curation).await?.unwrap_or_default();

        // Phase: load
        let mut report = RunReport::new();
        info!("Loading records from {}", self.source.name());
        let raw = self.source.load(&mut report).await?;
        let records = normalize_all(&raw, &mut report);
        if records.is_empty() {
            return Err(FatalError::NoRecords);
        }
        info!("Loaded {} records ({} dropped)", records.len(), report.dropped.len());

        let mut stats = RunStats {
            records_in: raw.len(),
            records_dropped: report.dropped.len(),
            ..RunStats::default()
        };

        // Phase: privacy transforms, strictly per record
        let mut published = Vec::with_capacity(records.len());
        for record in records {
            let record = resolve_visibility(record, &allowlist, &curation);
            let record = enforce_minors_policy(record, &allowlist);
            let record = rewrite_people(record, &allowlist);

            if curation.is_hidden(&record.id) {
                debug!("Hiding curated record {}", record.id);
                stats.records_hidden += 1;
                continue;
            }
            if record.visibility == Visibility::Private {
                debug!("Dropping private record {}", record.id);
                stats.records_private += 1;
                continue;
            }

            published.push(redact_record_location(
                record,
                self.config.privacy.max_gps_decimals,
            ));
        }
        info!(
            "{} records pass visibility ({} private, {} hidden)",
            published.len(),
            stats.records_private,
            stats.records_hidden
        );

        let published =
            process_media(published, paths.media_root.as_deref(), staging, &mut report).await?;

        // Phase: graph and layout over an immutable snapshot of the records
        let published = assign_epochs(published, &self.config.epochs);
        let edge_set = build_edges(&published);
        let published = apply_connections(published, &edge_set);
        let layout = compute_layout(&published, &self.config.layout.helix_params());
        let epochs = summarize_epochs(&published, &self.config.epochs);
        let graph = assemble_graph(published, &edge_set, epochs);

        // Phase: structural gate
        let graph_value = serde_json::to_value(&graph).context("Failed to encode graph")?;
        let layout_value = serde_json::to_value(&layout).context("Failed to encode layout")?;

        let mut schema_errors = validate_graph(&graph_value);
        schema_errors.extend(validate_layout(&layout_value));
        if !schema_errors.is_empty() {
            return Err(FatalError::Schema(schema_errors));
        }

        // Phase: privacy gate over the exact text to be published
        let graph_text = to_canonical_string(&graph_value)?;
        let layout_text = to_canonical_string(&layout_value)?;
        let combined = format!("{}{}", graph_text, layout_text);

        let audit_report = audit(
            &graph_value,
            &layout_value,
            &combined,
            &allowlist,
            &self.config.privacy,
        );
        for warning in &audit_report.warnings {
            report.warn(warning.clone());
        }
        if !audit_report.passed() {
            return Err(FatalError::Privacy(audit_report.violations));
        }

        // Phase: publish media first so the new graph never points at a missing file
        let mut artifacts = staged_media(&graph, &paths.output_dir, staging);
        let media_targets: Vec<PathBuf> = artifacts.iter().map(|(path, _)| path.clone()).collect();
        snapshot.extend(&media_targets).await?;
        artifacts.push((graph_path, Artifact::Text(graph_text)));
        artifacts.push((layout_path, Artifact::Text(layout_text)));
        publish_atomically(&artifacts, &snapshot).await?;

        fill_graph_stats(&mut stats, &graph);
        stats.edges = edge_set.edges.len();
        stats.edges_before_prune = edge_set.candidates;
        stats.edges_pruned = edge_set.pruned;
        stats.media_written = report.media_written;
        stats.media_skipped = report.skipped_assets.len();
        stats.audit_violations = audit_report.violations.len();
        stats.audit_warnings = audit_report.warnings.len();

        info!(
            "Published {} nodes and {} edges to {}",
            stats.nodes_published,
            stats.edges,
            paths.output_dir.display()
        );
        Ok(stats)
    }
}

fn fill_graph_stats(stats: &mut RunStats, graph: &GraphDocument) {
    stats.nodes_published = graph.nodes.len();
    stats.by_source = count_by(&graph.nodes, |n| {
        if n.source.is_empty() {
            "unknown".to_string()
        } else {
            n.source.clone()
        }
    });
    stats.by_type = count_by(&graph.nodes, |n| n.kind.as_str().to_string());
    stats.by_visibility = count_by(&graph.nodes, |n| n.visibility.as_str().to_string());
}

fn count_by<F>(nodes: &[CanonicalRecord], key: F) -> BTreeMap<String, usize>
where
    F: Fn(&CanonicalRecord) -> String,
{
    let mut counts = BTreeMap::new();
    for node in nodes {
        *counts.entry(key(node)).or_insert(0) += 1;
    }
    counts
}

/// Read a JSON document, `None` if the file does not exist
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let Some(bytes) = read_if_exists(path).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Publication targets for every staged asset the graph references
fn staged_media(
    graph: &GraphDocument,
    output_dir: &Path,
    staging: &Path,
) -> Vec<(PathBuf, Artifact)> {
    let media_dir = output_dir.join(MEDIA_DIR);
    graph
        .nodes
        .iter()
        .flat_map(|node| node.media.iter())
        .filter_map(|item| published_file_name(item))
        .map(|name| (media_dir.join(name), Artifact::Staged(staging.join(name))))
        .collect()
}

async fn discard_staging(staging: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(staging).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("Failed to clear {}", staging.display()))
        }
        _ => Ok(()),
    }
}

async fn write_status(output_dir: &Path, status: &StatusDocument) -> Result<()> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = output_dir.join(STATUS_FILE);
    tokio::fs::write(&path, serialize_document(status)?)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ============================================================================
// Publication
// ============================================================================

/// In-memory copy of the published files, taken before anything replaces them
#[derive(Debug, Clone)]
pub struct Snapshot {
    documents: Vec<(PathBuf, Option<Vec<u8>>)>,
}

impl Snapshot {
    pub async fn capture(paths: &[PathBuf]) -> Result<Self> {
        let mut snapshot = Self { documents: Vec::with_capacity(paths.len()) };
        snapshot.extend(paths).await?;
        Ok(snapshot)
    }

    /// Add more files to the snapshot; paths already held keep their first copy
    pub async fn extend(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if self.documents.iter().any(|(p, _)| p == path) {
                continue;
            }
            let bytes = read_if_exists(path).await?;
            self.documents.push((path.clone(), bytes));
        }
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&[u8]> {
        self.documents
            .iter()
            .find(|(p, _)| p == path)
            .and_then(|(_, bytes)| bytes.as_deref())
    }

    /// Put a document back the way it was before the run
    async fn restore(&self, path: &Path) -> Result<()> {
        match self.get(path) {
            Some(bytes) => tokio::fs::write(path, bytes)
                .await
                .with_context(|| format!("Failed to restore {}", path.display())),
            None => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(e).with_context(|| format!("Failed to remove {}", path.display()))
                }
                _ => Ok(()),
            },
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn remove_temps(temps: &[PathBuf]) {
    for temp in temps {
        let _ = tokio::fs::remove_file(temp).await;
    }
}

/// Content for one published file
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Document text, written to a sibling temp file first
    Text(String),
    /// A file already written elsewhere on the same filesystem
    Staged(PathBuf),
}

/// Bring every artifact next to its target, then rename them into place in
/// order.
///
/// If any rename fails, files already renamed are restored from the
/// snapshot so the published set never mixes two runs.
pub async fn publish_atomically(documents: &[(PathBuf, Artifact)], snapshot: &Snapshot) -> Result<()> {
    let mut temps = Vec::with_capacity(documents.len());
    for (path, artifact) in documents {
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                remove_temps(&temps).await;
                return Err(e).with_context(|| format!("Failed to create {}", dir.display()));
            }
        }
        let temp = match artifact {
            Artifact::Text(text) => {
                let temp = temp_path(path);
                if let Err(e) = tokio::fs::write(&temp, text).await {
                    remove_temps(&temps).await;
                    return Err(e).with_context(|| format!("Failed to write {}", temp.display()));
                }
                temp
            }
            Artifact::Staged(staged) => staged.clone(),
        };
        temps.push(temp);
    }

    for (i, ((path, _), temp)) in documents.iter().zip(&temps).enumerate() {
        if let Err(e) = tokio::fs::rename(temp, path).await {
            error!("Failed to publish {}: {}", path.display(), e);
            for (done, _) in &documents[..i] {
                if let Err(restore_err) = snapshot.restore(done).await {
                    error!("{:#}", restore_err);
                }
            }
            remove_temps(&temps[i..]).await;
            return Err(e).with_context(|| format!("Failed to publish {}", path.display()));
        }
        debug!("Published {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_publish_replaces_documents() {
        let dir = TempDir::new().unwrap();
        let graph = dir.path().join(GRAPH_FILE);
        let layout = dir.path().join(LAYOUT_FILE);
        std::fs::write(&graph, "old graph\n").unwrap();

        let snapshot = Snapshot::capture(&[graph.clone(), layout.clone()]).await.unwrap();
        assert_eq!(snapshot.get(&graph), Some(&b"old graph\n"[..]));
        assert_eq!(snapshot.get(&layout), None);

        publish_atomically(
            &[
                (graph.clone(), Artifact::Text("new graph\n".into())),
                (layout.clone(), Artifact::Text("new layout\n".into())),
            ],
            &snapshot,
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(&graph).unwrap(), "new graph\n");
        assert_eq!(std::fs::read_to_string(&layout).unwrap(), "new layout\n");
        assert!(!temp_path(&graph).exists());
        assert!(!temp_path(&layout).exists());
    }

    #[tokio::test]
    async fn test_failed_second_rename_restores_first_document() {
        let dir = TempDir::new().unwrap();
        let graph = dir.path().join(GRAPH_FILE);
        let layout = dir.path().join(LAYOUT_FILE);
        std::fs::write(&graph, "old graph\n").unwrap();

        let snapshot = Snapshot::capture(&[graph.clone(), layout.clone()]).await.unwrap();

        // A non-empty directory in the way makes the second rename fail
        std::fs::create_dir(&layout).unwrap();
        std::fs::write(layout.join("blocker"), "x").unwrap();

        let result = publish_atomically(
            &[
                (graph.clone(), Artifact::Text("new graph\n".into())),
                (layout.clone(), Artifact::Text("new layout\n".into())),
            ],
            &snapshot,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&graph).unwrap(), "old graph\n");
        assert!(!temp_path(&layout).exists());
    }

    #[tokio::test]
    async fn test_failed_publish_restores_replaced_media() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join(MEDIA_STAGING_DIR);
        let asset = dir.path().join(MEDIA_DIR).join("a-0.png");
        let layout = dir.path().join(LAYOUT_FILE);
        std::fs::create_dir_all(asset.parent().unwrap()).unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(&asset, "old pixels").unwrap();
        std::fs::write(staging.join("a-0.png"), "new pixels").unwrap();

        let snapshot = Snapshot::capture(&[asset.clone(), layout.clone()]).await.unwrap();
        std::fs::create_dir(&layout).unwrap();
        std::fs::write(layout.join("blocker"), "x").unwrap();

        let result = publish_atomically(
            &[
                (asset.clone(), Artifact::Staged(staging.join("a-0.png"))),
                (layout.clone(), Artifact::Text("new layout\n".into())),
            ],
            &snapshot,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&asset).unwrap(), "old pixels");
    }

    #[tokio::test]
    async fn test_snapshot_extend_keeps_first_copy() {
        let dir = TempDir::new().unwrap();
        let graph = dir.path().join(GRAPH_FILE);
        std::fs::write(&graph, "first").unwrap();

        let mut snapshot = Snapshot::capture(&[graph.clone()]).await.unwrap();
        std::fs::write(&graph, "second").unwrap();
        snapshot.extend(&[graph.clone()]).await.unwrap();

        assert_eq!(snapshot.get(&graph), Some(&b"first"[..]));
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let path = PathBuf::from("out/graph.json");
        assert_eq!(temp_path(&path), PathBuf::from("out/graph.json.tmp"));
    }
}
