use crate::write_atomic;
use anyhow::{Context, Result};
use dprof_similarity::{estimator_from_bytes, SimilarityEstimator};
use std::path::Path;
use tracing::info;

pub fn save_estimator(path: &Path, estimator: &dyn SimilarityEstimator) -> Result<()> {
    let data = estimator
        .serialize()
        .with_context(|| format!("Failed to serialize {} estimator", estimator.estimator_type()))?;
    write_atomic(path, &data)?;
    info!("Saved {} estimator to {}", estimator.estimator_type(), path.display());
    Ok(())
}

pub fn load_estimator(path: &Path) -> Result<Box<dyn SimilarityEstimator>> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    estimator_from_bytes(&data).with_context(|| format!("Malformed estimator file {}", path.display()))
}
