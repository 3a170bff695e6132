//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::Path;

use poline_core::PolineConfig;
use tracing::debug;

/// Load configuration from an explicit path, the default config file, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<PolineConfig> {
    if let Some(path) = config_path {
        return Ok(PolineConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        debug!("Using config file {}", default_path.display());
        Ok(PolineConfig::from_file(&default_path)?)
    } else {
        Ok(PolineConfig::default())
    }
}

/// Input extensions accepted by `process` and `batch`.
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "json" | "txt"))
}
