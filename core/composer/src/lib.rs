pub mod assemble;
pub mod audit;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod schema;
pub mod serializer;
pub mod status;

pub use assemble::assemble_graph;
pub use audit::{audit, decimal_places, is_public_full_name, AuditReport};
pub use config::{BuildConfig, LayoutConfig, PathsConfig, PrivacyConfig, DEFAULT_CONFIG_FILE};
pub use error::{ConfigError, FatalError};
pub use pipeline::{
    publish_atomically, Artifact, Pipeline, Snapshot, GRAPH_FILE, LAYOUT_FILE, MEDIA_STAGING_DIR,
    STATUS_FILE,
};
pub use schema::{validate_graph, validate_layout};
pub use serializer::{canonicalize, serialize_document, to_canonical_string};
pub use status::{failure_status, success_status};
