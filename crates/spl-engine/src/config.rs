//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default, so an empty file (or
//! no file) gives a working in-memory engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use spl_xml::ExportFormat;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreSettings,
    pub jobs: JobSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Snapshot file loaded at startup and saved after each import.
    pub snapshot_path: Option<PathBuf>,
    /// Keep imported payloads for later comparison.
    pub keep_source: bool,
    /// Save the snapshot after every committed import.
    pub autosave: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            keep_source: true,
            autosave: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// How long terminal results stay queryable.
    pub retention_secs: u64,
    /// Operations running at once; the rest wait as `Queued`.
    pub max_concurrent: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            max_concurrent: 4,
        }
    }
}

impl JobSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: ExportFormat,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EngineError::Io {
            operation: "read",
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        tracing::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Load `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config {
            path: PathBuf::new(),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.store.keep_source);
        assert_eq!(config.jobs.retention(), Duration::from_secs(3600));
        assert_eq!(config.export.format, ExportFormat::Pretty);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[jobs]\nretention_secs = 5\n\n[export]\nformat = \"minified\""
        )
        .unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.jobs.retention_secs, 5);
        assert_eq!(config.jobs.max_concurrent, 4);
        assert_eq!(config.export.format, ExportFormat::Minified);
        assert!(config.store.snapshot_path.is_none());
    }

    #[test]
    fn test_round_trip() {
        let mut config = EngineConfig::default();
        config.store.snapshot_path = Some(PathBuf::from("store.json"));
        let parsed: EngineConfig = toml::from_str(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[jobs]\nretention_secs = \"soon\"").unwrap();
        let err = EngineConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }
}
