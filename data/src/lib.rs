pub mod config;
pub mod format;
pub mod heatmap;
pub mod histogram;
pub mod kde;
pub mod log;
pub mod sample;
pub mod scale;

pub use config::Config;
pub use histogram::{HistogramColumn, Thresholds};
pub use sample::{Range, SampleWindow};

use std::path::PathBuf;

pub fn data_path(file_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var("PULSEBOARD_DATA_PATH") {
        PathBuf::from(path).join(file_name)
    } else {
        dirs_next::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pulseboard")
            .join(file_name)
    }
}
