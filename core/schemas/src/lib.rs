use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// ID Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    #[serde(rename = "milestone")]
    Milestone,
    #[serde(rename = "person")]
    Person,
    #[serde(rename = "moment")]
    Moment,
    #[serde(rename = "idea")]
    Idea,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "place")]
    Place,
}

impl NodeType {
    pub const ALL: [&'static str; 6] = ["milestone", "person", "moment", "idea", "project", "place"];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Milestone => "milestone",
            NodeType::Person => "person",
            NodeType::Moment => "moment",
            NodeType::Idea => "idea",
            NodeType::Project => "project",
            NodeType::Place => "place",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "milestone" => Some(NodeType::Milestone),
            "person" => Some(NodeType::Person),
            "moment" => Some(NodeType::Moment),
            "idea" => Some(NodeType::Idea),
            "project" => Some(NodeType::Project),
            "place" => Some(NodeType::Place),
            _ => None,
        }
    }
}

/// Access tier. Variant order is restrictiveness: `Private < Friends < Public`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Visibility {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "friends")]
    Friends,
    #[serde(rename = "public")]
    Public,
}

impl Visibility {
    pub const ALL: [&'static str; 3] = ["public", "friends", "private"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Friends => "friends",
            Visibility::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Visibility::Private),
            "friends" => Some(Visibility::Friends),
            "public" => Some(Visibility::Public),
            _ => None,
        }
    }

    /// Most-restrictive-wins combination of two tiers
    pub fn restrict(self, cap: Visibility) -> Visibility {
        self.min(cap)
    }
}

/// Named connection rule that produced a piece of evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "same-day")]
    SameDay,
    #[serde(rename = "shared-project")]
    SharedProject,
    #[serde(rename = "shared-entity")]
    SharedEntity,
    #[serde(rename = "shared-tags")]
    SharedTags,
    #[serde(rename = "temporal-proximity")]
    TemporalProximity,
    #[serde(rename = "shared-place")]
    SharedPlace,
    #[serde(rename = "shared-client")]
    SharedClient,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::SameDay => "same-day",
            Signal::SharedProject => "shared-project",
            Signal::SharedEntity => "shared-entity",
            Signal::SharedTags => "shared-tags",
            Signal::TemporalProximity => "temporal-proximity",
            Signal::SharedPlace => "shared-place",
            Signal::SharedClient => "shared-client",
        }
    }

    /// Fixed contribution of this signal to an edge's weight
    pub fn weight(&self) -> f64 {
        match self {
            Signal::SameDay => 0.8,
            Signal::SharedProject => 0.7,
            Signal::SharedEntity => 0.6,
            Signal::SharedTags => 0.4,
            Signal::TemporalProximity => 0.3,
            Signal::SharedPlace => 0.25,
            Signal::SharedClient => 0.35,
        }
    }

    pub fn kind(&self) -> EvidenceKind {
        match self {
            Signal::SameDay | Signal::TemporalProximity => EvidenceKind::Temporal,
            Signal::SharedProject => EvidenceKind::Project,
            Signal::SharedEntity => EvidenceKind::People,
            Signal::SharedTags => EvidenceKind::Tags,
            Signal::SharedPlace => EvidenceKind::Place,
            Signal::SharedClient => EvidenceKind::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceKind {
    #[serde(rename = "temporal")]
    Temporal,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "people")]
    People,
    #[serde(rename = "tags")]
    Tags,
    #[serde(rename = "place")]
    Place,
    #[serde(rename = "client")]
    Client,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Temporal => "temporal",
            EvidenceKind::Project => "project",
            EvidenceKind::People => "people",
            EvidenceKind::Tags => "tags",
            EvidenceKind::Place => "place",
            EvidenceKind::Client => "client",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
}

// ============================================================================
// Canonical Record (graph node)
// ============================================================================

/// Generic label substituted for people who are on neither allowlist
pub const GENERIC_PERSON_LABEL: &str = "Friend";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub title: String,
    pub date: String, // ISO 8601
    pub epoch: String,
    pub description: String,
    pub media: Vec<String>,
    pub connections: Vec<NodeId>,
    pub size: f64,
    pub is_hub: bool,
    pub source: String,
    pub source_id: String,
    pub visibility: Visibility,
    pub entities: Entities,
    pub location: Option<Location>,
    pub is_minor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entities {
    pub people: Vec<String>,
    pub places: Vec<String>,
    pub tags: Vec<String>,
    pub clients: Vec<String>,
    pub projects: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

// ============================================================================
// Edges
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub signal: Signal,
    pub description: String,
    pub weight: f64,
}

/// Undirected edge; `source` always holds the lexicographically smaller id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: f64,
    pub evidence: Vec<Evidence>,
}

impl Edge {
    pub fn other(&self, id: &NodeId) -> &NodeId {
        if &self.source == id {
            &self.target
        } else {
            &self.source
        }
    }

    pub fn touches(&self, id: &NodeId) -> bool {
        &self.source == id || &self.target == id
    }

    pub fn has_signal(&self, signal: Signal) -> bool {
        self.evidence.iter().any(|e| e.signal == signal)
    }
}

// ============================================================================
// Privacy Inputs (read-only documents)
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Allowlist {
    pub public: Vec<String>,
    pub friends: Vec<String>,
    pub minors: MinorsPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinorsPolicy {
    pub first_names: Vec<String>,
    pub blocked_patterns: Vec<String>,
}

impl Allowlist {
    pub fn is_public(&self, name: &str) -> bool {
        contains_name(&self.public, name)
    }

    pub fn is_friend(&self, name: &str) -> bool {
        contains_name(&self.friends, name)
    }
}

fn contains_name(list: &[String], name: &str) -> bool {
    let needle = name.trim().to_lowercase();
    list.iter().any(|entry| entry.trim().to_lowercase() == needle)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Curation {
    pub hidden: Vec<NodeId>,
    pub visibility_overrides: BTreeMap<String, Visibility>,
}

impl Curation {
    pub fn is_hidden(&self, id: &NodeId) -> bool {
        self.hidden.contains(id)
    }

    pub fn override_for(&self, id: &NodeId) -> Option<Visibility> {
        self.visibility_overrides.get(id.as_str()).copied()
    }
}

// ============================================================================
// Epochs
// ============================================================================

/// Configured, date-bounded life period (inclusive bounds, `YYYY-MM-DD`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochDefinition {
    pub label: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub label: String,
    pub start: String,
    pub end: String,
    pub count: usize,
}

// ============================================================================
// Output Documents
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<CanonicalRecord>,
    pub edges: Vec<Edge>,
    pub epochs: Vec<EpochSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub positions: BTreeMap<String, Position>,
    pub helix_params: HelixParams,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelixParams {
    pub radius: f64,
    pub pitch: f64,
    pub epoch_gap: f64,
    pub jitter_radius: f64,
    pub seed: u32,
}

impl Default for HelixParams {
    fn default() -> Self {
        Self {
            radius: 30.0,
            pitch: 40.0,
            epoch_gap: 12.0,
            jitter_radius: 2.5,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_y: f64,
    pub max_y: f64,
}

// ============================================================================
// Status Document
// ============================================================================

/// Per-run status record; the only artifact carrying wall-clock time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    pub run_id: RunId,
    pub last_run: String, // RFC3339
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub records_in: usize,
    pub records_dropped: usize,
    pub records_hidden: usize,
    pub records_private: usize,
    pub nodes_published: usize,
    pub by_source: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_visibility: BTreeMap<String, usize>,
    pub edges: usize,
    pub edges_before_prune: usize,
    pub edges_pruned: usize,
    pub media_written: usize,
    pub media_skipped: usize,
    pub audit_violations: usize,
    pub audit_warnings: usize,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Calendar day of an ISO date string: `YYYY-MM-DD`, RFC3339, or a naive
/// `YYYY-MM-DDTHH:MM:SS` timestamp.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|ts| ts.date())
}

impl CanonicalRecord {
    pub fn day(&self) -> Option<NaiveDate> {
        parse_day(&self.date)
    }
}

pub fn generate_run_id() -> RunId {
    RunId(format!("run_{}", ulid::Ulid::new()))
}

/// Largest power of ten that is exact in an f64
const MAX_EXACT_DECIMALS: usize = 22;

/// Round to `decimals` places by formatting then parsing back, so the
/// rounded value prints without binary representation artifacts.
///
/// Exact midpoints round half away from zero (`28.125` -> `28.13`), the way
/// `Number.prototype.toFixed` does. `format!` alone would round them to even.
pub fn round_to(value: f64, decimals: usize) -> f64 {
    let value = if decimals <= MAX_EXACT_DECIMALS && value.is_finite() {
        let factor = 10f64.powi(decimals as i32);
        let scaled = value * factor;
        // fma recovers the product's rounding error; zero means `scaled` is exact
        let exact = value.mul_add(factor, -scaled) == 0.0;
        if exact && scaled.abs().fract() == 0.5 {
            scaled.round() / factor
        } else {
            value
        }
    } else {
        value
    };
    format!("{:.*}", decimals, value)
        .parse::<f64>()
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CanonicalRecord {
        CanonicalRecord {
            id: NodeId("moment-001".to_string()),
            kind: NodeType::Moment,
            title: "First apartment".to_string(),
            date: "2015-08-01".to_string(),
            epoch: "College".to_string(),
            description: String::new(),
            media: vec![],
            connections: vec![],
            size: 1.0,
            is_hub: false,
            source: "journal".to_string(),
            source_id: "j-1".to_string(),
            visibility: Visibility::Friends,
            entities: Entities::default(),
            location: None,
            is_minor: false,
        }
    }

    #[test]
    fn test_run_id_generation() {
        let run_id = generate_run_id();
        assert!(run_id.0.starts_with("run_"));
        assert_eq!(run_id.0.len(), 30); // "run_" + 26 chars
    }

    #[test]
    fn test_visibility_ordering() {
        assert!(Visibility::Private < Visibility::Friends);
        assert!(Visibility::Friends < Visibility::Public);
        assert_eq!(
            Visibility::Public.restrict(Visibility::Friends),
            Visibility::Friends
        );
        assert_eq!(
            Visibility::Private.restrict(Visibility::Friends),
            Visibility::Private
        );
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(sample_record()).unwrap();
        assert_eq!(json["type"], "moment");
        assert_eq!(json["isHub"], false);
        assert_eq!(json["sourceId"], "j-1");
        assert_eq!(json["isMinor"], false);
        assert!(json["location"].is_null());
        assert_eq!(json["visibility"], "friends");
    }

    #[test]
    fn test_allowlist_deserializes_with_defaults() {
        let allowlist: Allowlist = serde_json::from_str(
            r#"{"public": ["Alice Smith"], "minors": {"firstNames": ["Jace"]}}"#,
        )
        .unwrap();
        assert!(allowlist.is_public("alice smith"));
        assert!(!allowlist.is_friend("Alice Smith"));
        assert_eq!(allowlist.minors.first_names, vec!["Jace".to_string()]);
        assert!(allowlist.minors.blocked_patterns.is_empty());
    }

    #[test]
    fn test_curation_overrides() {
        let curation: Curation = serde_json::from_str(
            r#"{"hidden": ["a"], "visibility_overrides": {"b": "public"}}"#,
        )
        .unwrap();
        assert!(curation.is_hidden(&NodeId("a".into())));
        assert_eq!(
            curation.override_for(&NodeId("b".into())),
            Some(Visibility::Public)
        );
        assert_eq!(curation.override_for(&NodeId("c".into())), None);
    }

    #[test]
    fn test_parse_day_formats() {
        let expected = NaiveDate::from_ymd_opt(2020, 5, 1);
        assert_eq!(parse_day("2020-05-01"), expected);
        assert_eq!(parse_day("2020-05-01T23:10:00Z"), expected);
        assert_eq!(parse_day("2020-05-01T08:00:00-04:00"), expected);
        assert_eq!(parse_day("2020-05-01T08:00:00"), expected);
        assert_eq!(parse_day("May 1st"), None);
        assert_eq!(parse_day("2020-13-01"), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(28.541234, 2), 28.54);
        assert_eq!(round_to(-81.383456, 2), -81.38);
        assert_eq!(round_to(0.1 + 0.2, 2).to_string(), "0.3");
    }

    #[test]
    fn test_round_to_midpoints_go_away_from_zero() {
        assert_eq!(round_to(28.125, 2), 28.13);
        assert_eq!(round_to(-81.375, 2), -81.38);
        assert_eq!(round_to(0.5, 0), 1.0);
        assert_eq!(round_to(2.5, 0), 3.0);
        assert_eq!(round_to(1.03125, 4), 1.0313);
        // 1.005 is stored just below the midpoint, so it is not a tie
        assert_eq!(round_to(1.005, 2), 1.0);
    }

    #[test]
    fn test_signal_table() {
        assert_eq!(Signal::SameDay.weight(), 0.8);
        assert_eq!(Signal::SharedPlace.kind(), EvidenceKind::Place);
        let json = serde_json::to_value(Signal::TemporalProximity).unwrap();
        assert_eq!(json, "temporal-proximity");
    }
}
