//! # dprof Similarity
//!
//! Pluggable similarity estimators over sets of datasets.
//!
//! Every strategy implements [`SimilarityEstimator`]: it defines the
//! similarity of two datasets, and the shared driver fills a
//! [`SimilarityMatrix`](dprof_core::SimilarityMatrix) according to the
//! estimator's [`PopulationPolicy`](dprof_core::PopulationPolicy), on a
//! bounded worker pool.
//!
//! ## Strategies
//!
//! - **Jaccard**: overlap of the tuple sets
//! - **Correlation**: Pearson, Spearman or Kendall over one column
//! - **Order**: agreement of the row orderings
//! - **Size**: ratio of the row counts
//! - **Script**: distance between coordinates an external script assigns
//! - **ScriptPair**: similarity printed by an external script per pair
//! - **Composite**: arithmetic expression over other estimators
//! - **Random**: uniform noise, a baseline
//!
//! ## Example
//!
//! ```rust
//! use dprof_core::{parse_options, Dataset, DatasetContent, DatasetTuple, PopulationPolicy};
//! use dprof_similarity::{estimator_from_bytes, new_estimator, EstimatorType};
//! use std::sync::Arc;
//!
//! let datasets: Vec<Arc<Dataset>> = (1..=4)
//!     .map(|n| {
//!         let content = DatasetContent {
//!             header: vec!["x".to_string()],
//!             tuples: (0..n).map(|v| DatasetTuple::new(vec![v as f64])).collect(),
//!         };
//!         Arc::new(Dataset::from_content(format!("d{}.csv", n), content))
//!     })
//!     .collect();
//!
//! let mut estimator = new_estimator(EstimatorType::Size, datasets);
//! estimator.configure(&parse_options("concurrency=2").unwrap()).unwrap();
//! estimator.set_population_policy(PopulationPolicy::full());
//! estimator.compute().unwrap();
//! assert_eq!(estimator.similarity_matrix().get(0, 3).unwrap(), 0.25);
//!
//! let restored = estimator_from_bytes(&estimator.serialize().unwrap()).unwrap();
//! assert_eq!(restored.similarity_matrix().get(1, 3).unwrap(), 0.5);
//! ```

pub mod composite;
pub mod correlation;
pub mod distance;
pub mod estimator;
pub mod expression;
pub mod jaccard;
pub mod order;
pub mod random;
pub mod runner;
pub mod script;
pub mod script_pair;
pub mod size;

#[cfg(test)]
mod testutil;

pub use composite::CompositeEstimator;
pub use correlation::{CorrelationEstimator, CorrelationKind, Normalization};
pub use distance::Norm;
pub use estimator::{
    estimator_from_bytes, new_estimator, populate, EstimatorBase, EstimatorType,
    SimilarityEstimator,
};
pub use expression::Expr;
pub use jaccard::JaccardEstimator;
pub use order::OrderEstimator;
pub use random::RandomEstimator;
pub use runner::{parse_script_output, ScriptRunner};
pub use script::ScriptEstimator;
pub use script_pair::ScriptPairEstimator;
pub use size::SizeEstimator;
