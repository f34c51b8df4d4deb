//! Build configuration loaded from `lifegraph.toml`.

use lifegraph_ingestion::DEFAULT_MAX_DECIMALS;
use lifegraph_schemas::{parse_day, EpochDefinition, HelixParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "lifegraph.toml";

/// Upper bound on published GPS precision
pub const MAX_GPS_DECIMALS_LIMIT: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub paths: PathsConfig,
    pub layout: LayoutConfig,
    pub privacy: PrivacyConfig,
    pub epochs: Vec<EpochDefinition>,
}

impl BuildConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: BuildConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the given file, else `lifegraph.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            tracing::info!("Loading config from: {}", default_path.display());
            return Self::from_file(default_path);
        }

        tracing::info!("No config file found, using defaults");
        Ok(BuildConfig::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        if !(layout.radius.is_finite() && layout.radius > 0.0) {
            return Err(ConfigError::Invalid("layout.radius must be > 0".to_string()));
        }
        if !(layout.pitch.is_finite() && layout.pitch > 0.0) {
            return Err(ConfigError::Invalid("layout.pitch must be > 0".to_string()));
        }
        if !(layout.epoch_gap.is_finite() && layout.epoch_gap >= 0.0) {
            return Err(ConfigError::Invalid("layout.epoch_gap must be >= 0".to_string()));
        }
        if !(layout.jitter_radius.is_finite() && layout.jitter_radius >= 0.0) {
            return Err(ConfigError::Invalid(
                "layout.jitter_radius must be >= 0".to_string(),
            ));
        }

        if self.privacy.max_gps_decimals > MAX_GPS_DECIMALS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "privacy.max_gps_decimals must be <= {}",
                MAX_GPS_DECIMALS_LIMIT
            )));
        }

        for epoch in &self.epochs {
            if epoch.label.trim().is_empty() {
                return Err(ConfigError::Invalid("epoch label must not be empty".to_string()));
            }
            let (Some(start), Some(end)) = (parse_day(&epoch.start), parse_day(&epoch.end)) else {
                return Err(ConfigError::Invalid(format!(
                    "epoch {} has an unparseable date range",
                    epoch.label
                )));
            };
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "epoch {} ends before it starts",
                    epoch.label
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory of `*.json` record files
    pub records_dir: PathBuf,
    pub allowlist: PathBuf,
    /// Missing file means no curation
    pub curation: PathBuf,
    /// Where graph.json, layout.json, status.json and media/ are written
    pub output_dir: PathBuf,
    /// Local media paths on records resolve against this directory
    pub media_root: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            records_dir: PathBuf::from("records"),
            allowlist: PathBuf::from("allowlist.json"),
            curation: PathBuf::from("curation.json"),
            output_dir: PathBuf::from("public/data"),
            media_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub radius: f64,
    pub pitch: f64,
    pub epoch_gap: f64,
    pub jitter_radius: f64,
    pub seed: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let params = HelixParams::default();
        Self {
            radius: params.radius,
            pitch: params.pitch,
            epoch_gap: params.epoch_gap,
            jitter_radius: params.jitter_radius,
            seed: params.seed,
        }
    }
}

impl LayoutConfig {
    pub fn helix_params(&self) -> HelixParams {
        HelixParams {
            radius: self.radius,
            pitch: self.pitch,
            epoch_gap: self.epoch_gap,
            jitter_radius: self.jitter_radius,
            seed: self.seed,
        }
    }
}

/// Redaction and audit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    pub max_gps_decimals: usize,
    /// Text that must never appear anywhere in published output
    pub forbidden_substrings: Vec<String>,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            max_gps_decimals: DEFAULT_MAX_DECIMALS,
            forbidden_substrings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuildConfig::from_str("").unwrap();
        assert_eq!(config.layout.helix_params(), HelixParams::default());
        assert_eq!(config.privacy.max_gps_decimals, 2);
        assert!(config.epochs.is_empty());
        assert_eq!(config.paths.output_dir, PathBuf::from("public/data"));
    }

    #[test]
    fn test_full_config() {
        let config = BuildConfig::from_str(
            r#"
            [paths]
            records_dir = "data/records"
            media_root = "data/media"

            [layout]
            seed = 7
            pitch = 25.0

            [privacy]
            forbidden_substrings = ["/Users/", "file://"]

            [[epochs]]
            label = "College"
            start = "2010-09-01"
            end = "2014-05-31"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.records_dir, PathBuf::from("data/records"));
        assert_eq!(config.paths.media_root, Some(PathBuf::from("data/media")));
        assert_eq!(config.paths.allowlist, PathBuf::from("allowlist.json"));
        assert_eq!(config.layout.seed, 7);
        assert_eq!(config.layout.pitch, 25.0);
        assert_eq!(config.layout.radius, 30.0);
        assert_eq!(config.privacy.forbidden_substrings.len(), 2);
        assert_eq!(config.epochs[0].label, "College");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(BuildConfig::from_str("[layout]\nradius = 0.0").is_err());
        assert!(BuildConfig::from_str("[layout]\njitter_radius = -1.0").is_err());
        assert!(BuildConfig::from_str("[privacy]\nmax_gps_decimals = 9").is_err());
        assert!(BuildConfig::from_str(
            "[[epochs]]\nlabel = \"Backwards\"\nstart = \"2020-01-01\"\nend = \"2019-01-01\""
        )
        .is_err());
        assert!(BuildConfig::from_str(
            "[[epochs]]\nlabel = \"Bad\"\nstart = \"someday\"\nend = \"2019-01-01\""
        )
        .is_err());
        assert!(matches!(
            BuildConfig::from_str("[layout\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
