//! Agreement of the row orderings of two datasets.
//!
//! Both datasets are truncated to their common length `m`. Each row is
//! ranked within its own dataset and the squared rank differences of rows at
//! the same position are summed. The sum is normalized by the distance of a
//! fully reversed ordering, so identical orderings score 1 and opposite
//! orderings score 0.

use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use dprof_core::config::{Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, DatasetTuple, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct OrderEstimator {
    base: EstimatorBase,
}

impl OrderEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
        }
    }
}

/// Rank of every tuple under the total tuple order; ties keep row order
fn ranks(tuples: &[DatasetTuple]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..tuples.len()).collect();
    order.sort_by(|&x, &y| tuples[x].total_cmp(&tuples[y]));
    let mut ranks = vec![0; tuples.len()];
    for (rank, idx) in order.into_iter().enumerate() {
        ranks[idx] = rank;
    }
    ranks
}

/// Squared rank distance of the reversed permutation of `m` items
fn max_distance(m: usize) -> f64 {
    (0..m)
        .map(|i| {
            let d = 2.0 * i as f64 - m as f64 + 1.0;
            d * d
        })
        .sum()
}

impl SimilarityEstimator for OrderEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Order
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([(OPT_CONCURRENCY, "max number of threads to run in parallel")])
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        let (tuples_a, tuples_b) = (a.tuples()?, b.tuples()?);
        let m = tuples_a.len().min(tuples_b.len());
        if m < 2 {
            return Ok(1.0);
        }
        let ranks_a = ranks(&tuples_a[..m]);
        let ranks_b = ranks(&tuples_b[..m]);
        let distance: f64 = ranks_a
            .iter()
            .zip(&ranks_b)
            .map(|(&x, &y)| {
                let d = x as f64 - y as f64;
                d * d
            })
            .sum();
        let max = max_distance(m);
        Ok(1.0 - (distance.min(max) / max).sqrt())
    }
}
