//! Ratio of dataset sizes

use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use dprof_core::config::{Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SizeEstimator {
    base: EstimatorBase,
}

impl SizeEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
        }
    }
}

impl SimilarityEstimator for SizeEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Size
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
        let (len_a, len_b) = (a.len()?, b.len()?);
        let largest = len_a.max(len_b);
        if largest == 0 {
            return Ok(1.0);
        }
        Ok(len_a.min(len_b) as f64 / largest as f64)
    }
}
