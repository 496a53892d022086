//! # dprof Core
//!
//! Core library for the dprof dataset profiler.
//!
//! This crate provides the building blocks shared by the estimators and the
//! clustering engine:
//!
//! - [`Dataset`] - Handle to a tabular file with lazily parsed, memoized contents
//! - [`SimilarityMatrix`] - Symmetric NxN store with populated/unpopulated cells
//! - [`PopulationPolicy`] - FULL or budgeted (APRX) matrix population
//! - [`WorkerPool`] - Bounded-concurrency job runner with a completion barrier
//!
//! ## Example
//!
//! ```rust
//! use dprof_core::{PopulationPolicy, SimilarityMatrix};
//!
//! let matrix = SimilarityMatrix::new(3);
//! matrix.set(0, 2, 0.75).unwrap();
//! assert_eq!(matrix.get(2, 0).unwrap(), 0.75);
//! assert!(matrix.get(0, 1).is_err());
//!
//! let bytes = matrix.serialize();
//! let restored = SimilarityMatrix::deserialize(&bytes).unwrap();
//! assert_eq!(restored.value(0, 2), Some(0.75));
//!
//! let policy: PopulationPolicy = "APRX,count=1".parse().unwrap();
//! assert_eq!(policy.plan(3).unwrap().len(), 1);
//! ```

pub mod codec;
pub mod config;
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod policy;
pub mod pool;

pub use config::{parse_options, parse_options_with, Options};
pub use dataset::{discover_datasets, Dataset, DatasetContent, DatasetTuple};
pub use error::{Error, Result};
pub use matrix::SimilarityMatrix;
pub use policy::{PolicyKind, PopulationPolicy, RowUnit};
pub use pool::WorkerPool;
