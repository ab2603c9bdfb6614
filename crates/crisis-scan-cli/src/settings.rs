use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use crisis_scan_core::{scanner::DEFAULT_CONTEXT_WINDOW, ScannerConfig};
use serde::Deserialize;

/// Layered CLI settings: optional config file, then `CRISIS_SCAN_*`
/// environment variables. Command-line flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Directory holding a `keywords.txt` pack; the built-in set when unset.
    #[serde(default)]
    pub keywords_dir: Option<PathBuf>,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keywords_dir: None,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}

impl Settings {
    pub const ENV_PREFIX: &'static str = "CRISIS_SCAN";

    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        let config = builder
            .add_source(Environment::with_prefix(Self::ENV_PREFIX).try_parsing(true))
            .build()
            .context("failed to build configuration")?;
        config
            .try_deserialize()
            .context("invalid crisis-scan configuration")
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            context_window: self.context_window,
        }
    }
}
