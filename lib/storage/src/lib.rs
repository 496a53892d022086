//! # dprof Storage
//!
//! On-disk artifacts exchanged between pipeline stages:
//!
//! - **Matrix file**: the binary similarity matrix, with a `<file>.idx`
//!   companion listing `row<TAB>dataset path` per line
//! - **Estimator file**: a serialized estimator, matrix included
//! - **Cluster report**: JSON summary of a dendrogram, clusters per level
//!
//! Every write goes through a temporary file renamed into place, so readers
//! never observe a half-written artifact.

pub mod estimator_file;
pub mod matrix_file;
pub mod report;

pub use estimator_file::{load_estimator, save_estimator};
pub use matrix_file::{index_path, load_index, load_matrix, load_matrix_with_index, save_index, save_matrix};
pub use report::{ClusterReport, LevelReport};

use anyhow::{Context, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use std::io::Write;
use std::path::Path;

/// Replace `path` with `data` atomically
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(data))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
