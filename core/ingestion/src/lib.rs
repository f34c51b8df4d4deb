pub mod error;
pub mod gps;
pub mod media;
pub mod minors;
pub mod record;
pub mod report;
pub mod source;
pub mod visibility;

pub use error::{AssetError, RecordError};
pub use gps::{redact_gps, redact_record_location, DEFAULT_MAX_DECIMALS};
pub use media::{
    process_media, published_file_name, read_gps_markers, strip_and_verify, MediaOutcome, MEDIA_DIR,
};
pub use minors::{
    contains_ignore_case, enforce_minors_policy, is_minor, surname_after_minor, REDACTION_TOKEN,
};
pub use record::{normalize_all, normalize_record};
pub use report::{DroppedRecord, RunReport, SkippedAsset};
pub use source::{JsonDirSource, MemorySource, RawRecord, RecordSource};
pub use visibility::{apply_allowlist, assign_visibility, resolve_visibility, rewrite_people};
