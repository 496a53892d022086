//! # dprof
//!
//! Dataset profiler: pairwise similarity estimation over a collection of
//! tabular datasets, and hierarchical clustering driven by the resulting
//! similarity matrix.
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! dprof similarities -i data/ -o sims.bin -t size -p APRX,count=3 -c 4
//! dprof clusters -s sims.bin -l 2 -o report.json
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use dprof::prelude::*;
//!
//! let datasets = discover_datasets("data/").unwrap();
//! let mut estimator = new_estimator(EstimatorType::Jaccard, datasets.clone());
//! estimator.set_population_policy("APRX,threshold=0.5".parse().unwrap());
//! estimator.set_concurrency(4).unwrap();
//! estimator.compute().unwrap();
//!
//! let matrix = estimator.similarity_matrix().clone();
//! let mut clustering = Clustering::new(matrix, datasets).unwrap().with_concurrency(4);
//! let dendrogram = clustering.compute().unwrap();
//! for cluster in dendrogram.get_clusters(2) {
//!     println!("{} datasets", cluster.len());
//! }
//! ```
//!
//! ## Crate Structure
//!
//! - `dprof-core` - Datasets, similarity matrix, population policy, worker pool
//! - `dprof-similarity` - Similarity estimators
//! - `dprof-cluster` - Dendrogram and reciprocal nearest neighbor clustering
//! - `dprof-storage` - Matrix, estimator and report files

pub use dprof_core::{
    discover_datasets, parse_options, Dataset, DatasetContent, DatasetTuple, Error, Options,
    PolicyKind, PopulationPolicy, Result, SimilarityMatrix, WorkerPool,
};

pub use dprof_similarity::{
    estimator_from_bytes, new_estimator, EstimatorType, SimilarityEstimator,
};

pub use dprof_cluster::{Clustering, Dendrogram, DendrogramNode};

pub use dprof_storage::{
    load_estimator, load_matrix_with_index, save_estimator, save_matrix, ClusterReport,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        discover_datasets, estimator_from_bytes, new_estimator, parse_options, Clustering,
        Dataset, Dendrogram, Error, EstimatorType, PopulationPolicy, Result,
        SimilarityEstimator, SimilarityMatrix,
    };
}

/// Individual estimator strategies
pub mod estimators {
    pub use dprof_similarity::{
        CompositeEstimator, CorrelationEstimator, CorrelationKind, JaccardEstimator, Norm,
        Normalization, OrderEstimator, RandomEstimator, ScriptEstimator, ScriptPairEstimator,
        SizeEstimator,
    };
}
