//! # dprof Cluster
//!
//! Hierarchical clustering of datasets over a (possibly partial)
//! similarity matrix.
//!
//! [`Clustering`] merges reciprocal nearest clusters round by round until a
//! single root remains; the resulting [`Dendrogram`] is queried by level.
//!
//! ## Example
//!
//! ```rust
//! use dprof_cluster::Clustering;
//! use dprof_core::{Dataset, SimilarityMatrix};
//! use std::sync::Arc;
//!
//! let datasets: Vec<Arc<Dataset>> =
//!     (0..4).map(|i| Arc::new(Dataset::new(format!("d{}.csv", i)))).collect();
//! let matrix = SimilarityMatrix::new(4);
//! matrix.set(0, 1, 0.9).unwrap();
//! matrix.set(2, 3, 0.8).unwrap();
//! matrix.set(0, 2, 0.1).unwrap();
//!
//! let mut clustering = Clustering::new(matrix, datasets).unwrap().with_concurrency(2);
//! let dendrogram = clustering.compute().unwrap();
//! assert_eq!(dendrogram.merges(), 3);
//! assert_eq!(dendrogram.get_clusters(1).len(), 2);
//! ```

pub mod clustering;
pub mod dendrogram;

pub use clustering::Clustering;
pub use dendrogram::{Dendrogram, DendrogramNode};
