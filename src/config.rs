//! Config module.
//! Reads and writes `capture_config.json` (board geometry, raster settings,
//! store location, analysis API endpoint). Every field has a default, so a
//! partial file or no file at all is fine.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "capture_config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Logical board image size in pixels (square).
    pub board_size: u32,
    pub board_padding: f64,
    pub square_size: f64,
    /// Oversampling factor applied when rasterizing.
    pub raster_scale: f32,
    pub image_timeout_ms: u64,
    /// Fewest pieces a reconstructed board may hold before it is discarded.
    pub min_reconstructed_pieces: usize,
    pub store_path: PathBuf,
    pub api_url: String,
    pub api_timeout_secs: u64,
    pub api_retries: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            board_size: 600,
            board_padding: 20.0,
            square_size: 70.0,
            raster_scale: 2.0,
            image_timeout_ms: 5000,
            min_reconstructed_pieces: 2,
            store_path: PathBuf::from("capture_store.json"),
            api_url: "https://api.beekayprecision.com".to_string(),
            api_timeout_secs: 30,
            api_retries: 2,
        }
    }
}

/// Loads config from `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<CaptureConfig> {
    if !path.exists() {
        return Ok(CaptureConfig::default());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {}", path.display()))
}

pub fn save_config(path: &Path, config: &CaptureConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.board_size, 600);
        assert_eq!(config.store_path, PathBuf::from("capture_store.json"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "raster_scale": 1.0, "api_retries": 0 }"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.raster_scale, 1.0);
        assert_eq!(config.api_retries, 0);
        assert_eq!(config.square_size, 70.0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = CaptureConfig { min_reconstructed_pieces: 5, ..CaptureConfig::default() };
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ board_size: ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
