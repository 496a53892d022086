// Matrix file plus its dataset index. Row i of the matrix belongs to the
// dataset on index line i.

use crate::write_atomic;
use anyhow::{bail, Context, Result};
use dprof_core::{Dataset, SimilarityMatrix};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// `<path>.idx`
pub fn index_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".idx");
    PathBuf::from(name)
}

/// Write the matrix to `path` and the dataset index to `<path>.idx`
pub fn save_matrix(path: &Path, matrix: &SimilarityMatrix, datasets: &[Arc<Dataset>]) -> Result<()> {
    if matrix.capacity() != datasets.len() {
        bail!(
            "Matrix capacity {} does not match {} datasets",
            matrix.capacity(),
            datasets.len()
        );
    }
    write_atomic(path, &matrix.serialize())?;
    save_index(&index_path(path), datasets)?;
    info!(
        "Saved {}x{} matrix to {} ({} of {} pairs populated)",
        matrix.capacity(),
        matrix.capacity(),
        path.display(),
        matrix.populated_cells(),
        matrix.total_pairs()
    );
    Ok(())
}

pub fn load_matrix(path: &Path) -> Result<SimilarityMatrix> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    SimilarityMatrix::deserialize(&data)
        .with_context(|| format!("Malformed matrix file {}", path.display()))
}

pub fn save_index(path: &Path, datasets: &[Arc<Dataset>]) -> Result<()> {
    let mut out = String::new();
    for (row, d) in datasets.iter().enumerate() {
        out.push_str(&format!("{}\t{}\n", row, d.path().display()));
    }
    write_atomic(path, out.as_bytes())
}

/// Datasets of an index file, in row order
pub fn load_index(path: &Path) -> Result<Vec<Arc<Dataset>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut entries = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (row, dataset) = line
            .split_once('\t')
            .with_context(|| format!("{}:{}: expected <row>\\t<path>", path.display(), line_no + 1))?;
        let row: usize = row
            .trim()
            .parse()
            .with_context(|| format!("{}:{}: bad row {:?}", path.display(), line_no + 1, row))?;
        entries.push((row, dataset.to_string()));
    }
    entries.sort_by_key(|(row, _)| *row);
    for (expected, (row, _)) in entries.iter().enumerate() {
        if *row != expected {
            bail!("{}: row {} is missing or duplicated", path.display(), expected);
        }
    }
    Ok(entries
        .into_iter()
        .map(|(_, p)| Arc::new(Dataset::new(p)))
        .collect())
}

/// Matrix and datasets, the index defaulting to `<path>.idx`
pub fn load_matrix_with_index(
    path: &Path,
    index: Option<&Path>,
) -> Result<(SimilarityMatrix, Vec<Arc<Dataset>>)> {
    let matrix = load_matrix(path)?;
    let index = index.map(Path::to_path_buf).unwrap_or_else(|| index_path(path));
    let datasets = load_index(&index)?;
    if matrix.capacity() != datasets.len() {
        bail!(
            "{} holds a {}x{} matrix but {} lists {} datasets",
            path.display(),
            matrix.capacity(),
            matrix.capacity(),
            index.display(),
            datasets.len()
        );
    }
    Ok((matrix, datasets))
}
