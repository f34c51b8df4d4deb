use std::path::PathBuf;
use thiserror::Error;

/// Record-level problems. The offending record is dropped and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("record {id} has unparseable date '{date}'")]
    InvalidDate { id: String, date: String },

    #[error("record {id} has unknown type '{value}'")]
    InvalidType { id: String, value: String },

    #[error("record {id} has unknown visibility '{value}'")]
    InvalidVisibility { id: String, value: String },

    #[error("duplicate record id {0}")]
    DuplicateId(String),
}

/// Asset-level problems. The asset is skipped for this run and never published.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unsupported media format for {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to re-encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to verify {path}: {source}")]
    Verify {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GPS metadata survived stripping in {path}: {markers}")]
    GpsSurvived { path: PathBuf, markers: String },
}
