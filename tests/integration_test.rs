// Integration tests for dprof: datasets on disk through estimation, storage and clustering
use dprof::prelude::*;
use dprof::{load_estimator, load_matrix_with_index, save_estimator, save_matrix, ClusterReport};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Eight small CSV files in two families: low values and high values
fn write_datasets(dir: &Path) {
    for i in 0..8 {
        let mut file = std::fs::File::create(dir.join(format!("set{}.csv", i))).unwrap();
        writeln!(file, "a,b").unwrap();
        let base = if i < 4 { 0.0 } else { 100.0 };
        for row in 0..(5 + i) {
            writeln!(file, "{},{}", base + row as f64, (row % 3) as f64).unwrap();
        }
    }
}

fn estimator_for(dir: &Path, t: EstimatorType, policy: &str) -> Box<dyn SimilarityEstimator> {
    let datasets = discover_datasets(dir).unwrap();
    let mut est = new_estimator(t, datasets);
    est.set_population_policy(policy.parse().unwrap());
    est.set_concurrency(3).unwrap();
    est
}

#[test]
fn test_full_population() {
    let dir = TempDir::new().unwrap();
    write_datasets(dir.path());

    for t in [
        EstimatorType::Jaccard,
        EstimatorType::Size,
        EstimatorType::Order,
        EstimatorType::Correlation,
    ] {
        let mut est = estimator_for(dir.path(), t, "FULL");
        est.compute().unwrap();
        let m = est.similarity_matrix();
        assert_eq!(m.capacity(), 8);
        assert_eq!(m.populated_cells(), m.total_pairs());
        assert_eq!(m.fully_calculated_nodes(), 8, "{}", t);
        for i in 0..8 {
            for j in 0..8 {
                let v = m.get(i, j).unwrap();
                assert!((0.0..=1.0).contains(&v));
                assert_eq!(v, m.get(j, i).unwrap());
            }
        }
    }
}

#[test]
fn test_approximate_count_bounds_degree() {
    let dir = TempDir::new().unwrap();
    write_datasets(dir.path());

    let mut est = estimator_for(dir.path(), EstimatorType::Size, "APRX,count=3");
    est.compute().unwrap();
    let m = est.similarity_matrix();
    assert!(m.populated_cells() > 0);
    assert!(m.populated_cells() < m.total_pairs());
    for i in 0..8 {
        assert!(m.row_populated(i) <= 3, "row {} has {} cells", i, m.row_populated(i));
    }
}

#[test]
fn test_approximate_threshold_coverage() {
    let dir = TempDir::new().unwrap();
    write_datasets(dir.path());

    let mut est = estimator_for(dir.path(), EstimatorType::Size, "APRX,threshold=0.5");
    est.compute().unwrap();
    let m = est.similarity_matrix();
    // 28 pairs, at least 14 covered by whole rows
    assert!(m.populated_cells() >= 14);
    assert!(m.populated_cells() < 28);
}

#[test]
fn test_estimate_store_and_cluster() {
    let data = TempDir::new().unwrap();
    write_datasets(data.path());
    let out = TempDir::new().unwrap();

    let mut est = estimator_for(data.path(), EstimatorType::Jaccard, "FULL");
    est.compute().unwrap();
    let matrix_path = out.path().join("jaccard.bin");
    save_matrix(&matrix_path, est.similarity_matrix(), est.datasets()).unwrap();

    let (matrix, datasets) = load_matrix_with_index(&matrix_path, None).unwrap();
    assert_eq!(matrix.serialize(), est.similarity_matrix().serialize());
    assert_eq!(datasets.len(), 8);

    let mut clustering = Clustering::new(matrix, datasets.clone())
        .unwrap()
        .with_concurrency(4);
    let dendrogram = clustering.compute().unwrap();
    assert_eq!(dendrogram.merges(), 7);

    // the two value families share no tuples and split at the root
    let families: Vec<HashSet<String>> = dendrogram
        .get_clusters(1)
        .iter()
        .map(|c| {
            c.iter()
                .map(|d| d.path().file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        })
        .collect();
    assert_eq!(families.len(), 2);
    let low: HashSet<String> = (0..4).map(|i| format!("set{}.csv", i)).collect();
    assert!(families.contains(&low));

    let (height_max, _) = dendrogram.heights();
    let report = ClusterReport::from_dendrogram(dendrogram, 0..=height_max);
    let report_path = out.path().join("report.json");
    report.save(&report_path).unwrap();
    assert_eq!(ClusterReport::load(&report_path).unwrap(), report);
    assert_eq!(report.levels.last().unwrap().clusters.len(), 8);
}

#[test]
fn test_estimator_file_round_trip() {
    let dir = TempDir::new().unwrap();
    write_datasets(dir.path());

    let mut est = estimator_for(dir.path(), EstimatorType::Correlation, "APRX,count=2");
    est.configure(&parse_options("column=1,correlation=spearman,normalization=abs").unwrap())
        .unwrap();
    est.compute().unwrap();
    // row counts differ, so every computed pair is uncorrelated
    let m = est.similarity_matrix();
    assert!(m.populated_cells() > 0);
    for i in 0..8 {
        for j in (i + 1)..8 {
            if let Some(v) = m.value(i, j) {
                assert_eq!(v, 0.0);
            }
        }
    }

    let path = dir.path().join("model.est");
    save_estimator(&path, est.as_ref()).unwrap();
    let restored = load_estimator(&path).unwrap();
    assert_eq!(restored.estimator_type(), EstimatorType::Correlation);
    assert_eq!(restored.datasets().len(), 8);
    assert_eq!(
        restored.similarity_matrix().serialize(),
        est.similarity_matrix().serialize()
    );
    assert_eq!(restored.serialize().unwrap(), est.serialize().unwrap());
}

#[test]
fn test_composite_over_files() {
    let dir = TempDir::new().unwrap();
    write_datasets(dir.path());

    let mut est = estimator_for(dir.path(), EstimatorType::Composite, "FULL");
    let options =
        dprof_core::parse_options_with("expression=(s + j) / 2|var.s=size|var.j=jaccard", '|')
            .unwrap();
    est.configure(&options).unwrap();
    est.compute().unwrap();
    let m = est.similarity_matrix();
    assert_eq!(m.fully_calculated_nodes(), 8);
    // set0 and set1 overlap on 5 of 6 tuples and differ by one row
    let expected = (5.0 / 6.0 + 5.0 / 6.0) / 2.0;
    assert!((m.get(0, 1).unwrap() - expected).abs() < 1e-12);
}
