//! Set overlap of the tuples of two datasets

use crate::distance;
use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use ahash::AHashSet;
use dprof_core::config::{Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

/// |A ∩ B| / |A ∪ B| over the canonical keys of the tuples
#[derive(Debug, Clone)]
pub struct JaccardEstimator {
    base: EstimatorBase,
    /// Key set per matrix row, `None` where the dataset could not be read
    keys: Vec<Option<AHashSet<String>>>,
}

impl JaccardEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            keys: Vec::new(),
        }
    }

    fn keys_of(&self, dataset: &Dataset) -> Result<Cow<'_, AHashSet<String>>> {
        match self.base.index_of(dataset).and_then(|idx| self.keys.get(idx)) {
            Some(Some(keys)) => Ok(Cow::Borrowed(keys)),
            Some(None) => Err(Error::Computation(format!("{} could not be read", dataset))),
            None => tuple_keys(dataset).map(Cow::Owned),
        }
    }
}

fn tuple_keys(dataset: &Dataset) -> Result<AHashSet<String>> {
    Ok(dataset.tuples()?.iter().map(|t| t.serialize()).collect())
}

impl SimilarityEstimator for JaccardEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Jaccard
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

    fn prepare(&mut self) -> Result<()> {
        self.base.prepare(true)?;
        let pool = self.base.pool()?;
        // read failures were already reported by the eager load
        self.keys = pool.run(self.base.datasets().to_vec(), |d| tuple_keys(&d).ok())?;
        Ok(())
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        let keys_a = self.keys_of(a)?;
        let keys_b = self.keys_of(b)?;
        Ok(distance::jaccard(&*keys_a, &*keys_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::dataset;

    #[test]
    fn test_jaccard_overlap() {
        let a = dataset("a", &[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let b = dataset("b", &[&[3.0, 4.0], &[5.0, 6.0], &[7.0, 8.0], &[9.0, 0.0]]);
        let est = JaccardEstimator::new(vec![a.clone(), b.clone()]);
        let ab = est.similarity(&a, &b).unwrap();
        assert!((ab - 2.0 / 5.0).abs() < 1e-12);
        assert_eq!(ab, est.similarity(&b, &a).unwrap());
        assert_eq!(est.similarity(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn test_duplicates_count_once() {
        let a = dataset("a", &[&[1.0], &[1.0], &[2.0]]);
        let b = dataset("b", &[&[1.0], &[2.0]]);
        let est = JaccardEstimator::new(vec![a.clone(), b.clone()]);
        assert_eq!(est.similarity(&a, &b).unwrap(), 1.0);
    }

    #[test]
    fn test_empty_datasets() {
        let a = dataset("a", &[]);
        let b = dataset("b", &[]);
        let c = dataset("c", &[&[1.0]]);
        let est = JaccardEstimator::new(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(est.similarity(&a, &b).unwrap(), 1.0);
        assert_eq!(est.similarity(&a, &c).unwrap(), 0.0);
    }

    #[test]
    fn test_compute_fills_matrix() {
        let datasets = vec![
            dataset("a", &[&[1.0], &[2.0]]),
            dataset("b", &[&[2.0], &[3.0]]),
            dataset("c", &[&[9.0]]),
        ];
        let mut est = JaccardEstimator::new(datasets);
        est.set_concurrency(2).unwrap();
        est.compute().unwrap();
        let m = est.similarity_matrix();
        assert_eq!(m.fully_calculated_nodes(), 3);
        assert!((m.get(0, 1).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.get(2, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_keys_built_once_per_dataset() {
        let missing = Arc::new(Dataset::new("/definitely/missing.csv"));
        let a = dataset("a", &[&[1.0], &[2.0]]);
        let b = dataset("b", &[&[2.0]]);
        let mut est = JaccardEstimator::new(vec![a.clone(), b.clone(), missing.clone()]);
        est.compute().unwrap();

        assert_eq!(est.keys.len(), 3);
        assert_eq!(est.keys[0].as_ref().map(|k| k.len()), Some(2));
        assert!(est.keys[2].is_none());
        assert!(matches!(est.keys_of(&a), Ok(Cow::Borrowed(_))));
        assert!(est.keys_of(&missing).is_err());

        let m = est.similarity_matrix();
        assert_eq!(m.get(0, 1).unwrap(), 0.5);
        assert!(!m.is_populated(0, 2));

        // a dataset outside the estimator is keyed on demand
        let c = dataset("c", &[&[1.0]]);
        assert!(matches!(est.keys_of(&c), Ok(Cow::Owned(_))));
        assert_eq!(est.similarity(&a, &c).unwrap(), 0.5);
    }
}
