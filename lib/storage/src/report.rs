//! JSON summary of a clustering run

use crate::write_atomic;
use anyhow::{Context, Result};
use dprof_cluster::Dendrogram;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    pub level: usize,
    /// Dataset paths of every cluster at this level
    pub clusters: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub datasets: usize,
    pub merges: usize,
    pub height_max: usize,
    pub height_min: usize,
    pub levels: Vec<LevelReport>,
}

impl ClusterReport {
    /// Summarize `dendrogram` at the given levels
    pub fn from_dendrogram<I>(dendrogram: &Dendrogram, levels: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let (height_max, height_min) = dendrogram.heights();
        let levels = levels
            .into_iter()
            .map(|level| LevelReport {
                level,
                clusters: dendrogram
                    .get_clusters(level)
                    .iter()
                    .map(|c| c.iter().map(|d| d.to_string()).collect())
                    .collect(),
            })
            .collect();
        Self {
            datasets: dendrogram.leaves(),
            merges: dendrogram.merges(),
            height_max,
            height_min,
            levels,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to encode cluster report")?;
        write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Malformed cluster report {}", path.display()))
    }
}
