// Fixtures shared by the strategy tests

use dprof_core::{Dataset, DatasetContent, DatasetTuple};
use std::sync::Arc;

/// In-memory dataset with a single-column header per value
pub fn dataset(name: &str, rows: &[&[f64]]) -> Arc<Dataset> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let content = DatasetContent {
        header: (0..width).map(|i| format!("c{}", i)).collect(),
        tuples: rows.iter().map(|r| DatasetTuple::new(r.to_vec())).collect(),
    };
    Arc::new(Dataset::from_content(format!("/mem/{}.csv", name), content))
}

pub fn column(name: &str, values: &[f64]) -> Arc<Dataset> {
    let rows: Vec<Vec<f64>> = values.iter().map(|v| vec![*v]).collect();
    let refs: Vec<&[f64]> = rows.iter().map(|r| r.as_slice()).collect();
    dataset(name, &refs)
}

pub fn testdata(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name)
}

/// Path of a checked-in script with its executable bit set
#[cfg(unix)]
pub fn script(name: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = testdata(name);
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    if perms.mode() & 0o111 != 0o111 {
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}
