use std::{
    fs,
    path::{Path, PathBuf},
};

use color_drain_core::{LevelSnapshot, PuzzleConfig};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while loading JSON input files.
#[derive(Debug, Error)]
pub(crate) enum LoadError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file content is not valid for the expected document.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that was requested.
        path: PathBuf,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },
}

pub(crate) fn load_level(path: &Path) -> Result<LevelSnapshot, LoadError> {
    load_json(path)
}

pub(crate) fn load_config(path: &Path) -> Result<PuzzleConfig, LoadError> {
    load_json(path)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let contents = fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "color-drain-{}-{name}",
            std::process::id()
        ));
        fs::write(&path, contents).expect("scratch file written");
        path
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let path = scratch_file("config.json", r#"{"slot_count": 7}"#);

        let config = load_config(&path).expect("config loads");
        let _ = fs::remove_file(&path);

        assert_eq!(config.slot_count, 7);
        assert_eq!(config.fire_timeout_ms, PuzzleConfig::default().fire_timeout_ms);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let path = std::env::temp_dir().join("color-drain-definitely-missing.json");

        let error = load_level(&path).expect_err("missing file");

        assert!(matches!(error, LoadError::Read { .. }));
        assert!(error.to_string().contains("color-drain-definitely-missing.json"));
    }

    #[test]
    fn malformed_level_is_a_parse_error() {
        let path = scratch_file("level.json", r#"{"rows": "three"}"#);

        let error = load_level(&path).expect_err("malformed level");
        let _ = fs::remove_file(&path);

        assert!(matches!(error, LoadError::Parse { .. }));
    }
}
