//! Uniform noise in [0, 1), the baseline other strategies are compared with

use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use dprof_core::config::{self, Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const OPT_SEED: &str = "seed";

#[derive(Debug)]
pub struct RandomEstimator {
    base: EstimatorBase,
    rng: Mutex<StdRng>,
}

impl RandomEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Replace the generator, e.g. with a seeded one for reproducible runs
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }
}

impl SimilarityEstimator for RandomEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Random
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)?;
        if let Some(seed) = config::parse_option::<u64>(options, OPT_SEED)? {
            self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        }
        Ok(())
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            (OPT_CONCURRENCY, "max number of threads to run in parallel"),
            (OPT_SEED, "seed of the generator (default: from the OS)"),
        ])
    }

    fn prepare(&mut self) -> Result<()> {
        self.base.prepare(false)
    }

    fn similarity(&self, _a: &Dataset, _b: &Dataset) -> Result<f64> {
        Ok(self.rng.lock().random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::column;

    #[test]
    fn test_values_in_unit_interval() {
        let a = column("a", &[1.0]);
        let est = RandomEstimator::new(vec![a.clone()]).with_rng(StdRng::seed_from_u64(7));
        for _ in 0..1000 {
            let v = est.similarity(&a, &a).unwrap();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let datasets: Vec<_> = (0..6).map(|i| column(&i.to_string(), &[])).collect();
        let run = |seed: &str| {
            let mut est = RandomEstimator::new(datasets.clone());
            est.configure(&dprof_core::parse_options(seed).unwrap()).unwrap();
            est.compute().unwrap();
            est.similarity_matrix().serialize()
        };
        assert_eq!(run("seed=42"), run("seed=42"));
        assert_ne!(run("seed=42"), run("seed=43"));
    }
}
