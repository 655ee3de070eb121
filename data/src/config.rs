use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{heatmap, kde};

const CONFIG_FILE: &str = "config.json";

/// Dashboard configuration, persisted as JSON under the platform data
/// dir. Missing file or fields fall back to defaults.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the metrics server to poll.
    pub server: String,
    pub intervals: Intervals,
    pub heatmap: heatmap::Layout,
    pub kde: kde::Layout,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: "http://127.0.0.1:8080".to_string(),
            intervals: Intervals::default(),
            heatmap: heatmap::Layout::default(),
            kde: kde::Layout::default(),
        }
    }
}

/// Poll cadences per metric class: table rows fastest, heatmaps at a
/// medium cadence, density curves slowest. The heatmap cadence is also
/// the scheduler's base tick.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Intervals {
    pub table_ms: u64,
    pub heatmap_ms: u64,
    pub kde_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Intervals {
            table_ms: 1000,
            heatmap_ms: 1000,
            kde_ms: 10000,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, Error> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Loads the config from the data dir, falling back to defaults on
    /// a missing or unreadable file.
    pub fn load_or_default() -> Config {
        let path = crate::data_path(CONFIG_FILE);

        match Config::from_file(&path) {
            Ok(config) => config,
            Err(Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(err) => {
                log::warn!("failed to load {}: {err}; using defaults", path.display());
                Config::default()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}
