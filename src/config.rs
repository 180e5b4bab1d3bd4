//! User configuration (`config.toml`)
//!
//! ```toml
//! log_level = "info"
//!
//! [engine]
//! max_rows = 1000
//! max_cols = 26
//! max_recalc_iterations = 50
//! ```

use directories::ProjectDirs;
use gridweave_core::EngineConfig;
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MAX_CONFIG_FILE_BYTES: u64 = 65_536;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: Option<String>,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Configured log level; unknown names fall back to `warn`.
    pub fn level(&self) -> LevelFilter {
        self.log_level
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(LevelFilter::Warn)
    }
}

fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridweave")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

/// Load the explicit config file, or the user's one when present.
/// Problems are reported as warnings and the defaults are used.
pub fn load_config(explicit: Option<&Path>) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();
    let Some(path) = explicit.map(Path::to_path_buf).or_else(user_config_path) else {
        return (AppConfig::default(), warnings);
    };

    if !path.exists() {
        if explicit.is_some() {
            warnings.push(format!("Config file not found: {}", path.display()));
        }
        return (AppConfig::default(), warnings);
    }

    let config = match std::fs::metadata(&path) {
        Ok(meta) if meta.len() > MAX_CONFIG_FILE_BYTES => {
            warnings.push(format!(
                "Refusing to read {}: file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_CONFIG_FILE_BYTES
            ));
            None
        }
        Ok(_) => match std::fs::read_to_string(&path) {
            Ok(content) => match parse_config(&content) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    warnings.push(format!("Failed to parse {}: {}", path.display(), err));
                    None
                }
            },
            Err(err) => {
                warnings.push(format!("Failed to read {}: {}", path.display(), err));
                None
            }
        },
        Err(err) => {
            warnings.push(format!("Failed to read metadata for {}: {}", path.display(), err));
            None
        }
    };
    (config.unwrap_or_default(), warnings)
}

pub fn parse_config(content: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(content)
}
