//! Similarity of the coordinates an external script assigns to each dataset.
//!
//! The script is run once per dataset and prints a coordinate vector. Pairs
//! are compared under the configured [`Norm`]. A dataset whose analysis
//! fails keeps no coordinates and all of its pairs stay unpopulated.

use crate::distance::Norm;
use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use crate::runner::{self, ScriptRunner, OPT_SCRIPT, OPT_TIMEOUT};
use bytes::BufMut;
use dprof_core::codec;
use dprof_core::config::{Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const OPT_NORM: &str = "norm";

const MISSING_COORDINATES: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct ScriptEstimator {
    base: EstimatorBase,
    runner: Option<ScriptRunner>,
    norm: Norm,
    /// Coordinates per matrix row, `None` where the analysis failed
    coordinates: Vec<Option<Vec<f64>>>,
}

impl ScriptEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            runner: None,
            norm: Norm::default(),
            coordinates: Vec::new(),
        }
    }

    pub fn norm(&self) -> Norm {
        self.norm
    }

    pub fn coordinates(&self) -> &[Option<Vec<f64>>] {
        &self.coordinates
    }

    fn runner(&self) -> Result<&ScriptRunner> {
        self.runner
            .as_ref()
            .ok_or_else(|| Error::MissingOption(OPT_SCRIPT.to_string()))
    }

    fn analyze(&self, dataset: &Dataset) -> Result<Vec<f64>> {
        let coordinates = self.runner()?.run(&[dataset.path()])?;
        if coordinates.is_empty() {
            return Err(Error::Script(format!("no coordinates for {}", dataset)));
        }
        Ok(coordinates)
    }

    fn coordinates_of(&self, dataset: &Dataset) -> Result<Cow<'_, [f64]>> {
        match self
            .base
            .index_of(dataset)
            .and_then(|idx| self.coordinates.get(idx))
        {
            Some(Some(c)) => Ok(Cow::Borrowed(c.as_slice())),
            Some(None) => Err(Error::Script(format!("analysis of {} failed", dataset))),
            None => self.analyze(dataset).map(Cow::Owned),
        }
    }
}

impl SimilarityEstimator for ScriptEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Script
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)?;
        let script = dprof_core::config::require_option(options, OPT_SCRIPT)?;
        self.runner = Some(ScriptRunner::new(script, runner::parse_timeout(options)?));
        if let Some(raw) = options.get(OPT_NORM) {
            self.norm = raw.parse()?;
        }
        Ok(())
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            (OPT_CONCURRENCY, "max number of threads to run in parallel"),
            (OPT_SCRIPT, "path of the analysis script to be executed"),
            (OPT_NORM, "norm of the coordinate distance: 1, 2, ... or cosine (default 2)"),
            (OPT_TIMEOUT, "seconds before a script run is killed, 0 for no limit (default 0)"),
        ])
    }

    fn prepare(&mut self) -> Result<()> {
        self.base.prepare(false)?;
        self.runner()?;
        info!("Analyzing {} datasets", self.base.datasets().len());
        let pool = self.base.pool()?;
        let analyzed = pool.run(self.base.datasets().to_vec(), |d| {
            self.analyze(&d)
                .map_err(|e| warn!("Analysis of {} failed: {}", d, e))
                .ok()
        })?;
        self.coordinates = analyzed;
        Ok(())
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        let coords_a = self.coordinates_of(a)?;
        let coords_b = self.coordinates_of(b)?;
        self.norm.similarity(&coords_a, &coords_b)
    }

    fn write_fields(&self, buf: &mut Vec<u8>) -> Result<()> {
        let script = self
            .runner
            .as_ref()
            .map(|r| r.script().to_string_lossy().into_owned())
            .unwrap_or_default();
        codec::put_string(buf, &script);
        buf.put_u32(self.norm.tag());
        buf.put_f64(runner::timeout_secs(self.runner.as_ref().and_then(|r| r.timeout())));
        buf.put_u32(self.coordinates.len() as u32);
        for coordinates in &self.coordinates {
            match coordinates {
                Some(values) => {
                    buf.put_u32(values.len() as u32);
                    for v in values {
                        buf.put_f64(*v);
                    }
                }
                None => buf.put_u32(MISSING_COORDINATES),
            }
        }
        Ok(())
    }

    fn read_fields(&mut self, buf: &mut &[u8]) -> Result<()> {
        let script = codec::get_string(buf, "script path")?;
        self.norm = Norm::from_tag(codec::get_u32(buf, "norm")?);
        let timeout = runner::timeout_from_secs(codec::get_f64(buf, "timeout")?)?;
        self.runner = (!script.is_empty()).then(|| ScriptRunner::new(script, timeout));

        let count = codec::get_u32(buf, "coordinate count")? as usize;
        if count != 0 && count != self.base.datasets().len() {
            return Err(Error::Decode(format!(
                "{} coordinate vectors for {} datasets",
                count,
                self.base.datasets().len()
            )));
        }
        let mut coordinates = Vec::with_capacity(count);
        for _ in 0..count {
            let dimension = codec::get_u32(buf, "coordinate dimension")?;
            if dimension == MISSING_COORDINATES {
                coordinates.push(None);
                continue;
            }
            let values = (0..dimension)
                .map(|_| codec::get_f64(buf, "coordinate"))
                .collect::<Result<Vec<f64>>>()?;
            coordinates.push(Some(values));
        }
        self.coordinates = coordinates;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::estimator::estimator_from_bytes;
    use crate::testutil::{script, testdata};
    use dprof_core::parse_options;

    fn configured(datasets: Vec<Arc<Dataset>>, extra: &str) -> ScriptEstimator {
        let mut est = ScriptEstimator::new(datasets);
        let opts = format!("script={},{}", script("sum.sh").display(), extra);
        est.configure(&parse_options(&opts).unwrap()).unwrap();
        est
    }

    #[test]
    fn test_script_is_required() {
        let mut est = ScriptEstimator::new(Vec::new());
        assert!(matches!(
            est.configure(&parse_options("norm=1").unwrap()),
            Err(Error::MissingOption(_))
        ));
        let mut est = ScriptEstimator::new(vec![Arc::new(Dataset::new(testdata("numbers.csv")))]);
        assert!(matches!(est.compute(), Err(Error::MissingOption(_))));
    }

    #[test]
    fn test_minkowski_similarity() {
        // coordinates (10, 4) and (4, 2)
        let a = Arc::new(Dataset::new(testdata("numbers.csv")));
        let b = Arc::new(Dataset::new(testdata("other.csv")));
        let est = configured(vec![a.clone(), b.clone()], "norm=1");
        assert!((est.similarity(&a, &b).unwrap() - 1.0 / 9.0).abs() < 1e-12);

        let est = configured(vec![a.clone(), b.clone()], "norm=2");
        let expected = 1.0 / (1.0 + (40.0f64).sqrt());
        assert!((est.similarity(&a, &b).unwrap() - expected).abs() < 1e-12);
        assert_eq!(est.similarity(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn test_compute_caches_and_round_trips() {
        let a = Arc::new(Dataset::new(testdata("numbers.csv")));
        let b = Arc::new(Dataset::new(testdata("other.csv")));
        let broken = Arc::new(Dataset::new(testdata("missing.csv")));
        let mut est = configured(vec![a, b, broken], "norm=cosine,concurrency=2");
        est.compute().unwrap();

        assert_eq!(est.coordinates()[0].as_deref(), Some(&[10.0, 4.0][..]));
        let m = est.similarity_matrix();
        assert!(m.is_populated(0, 1));
        let expected = crate::distance::angular_similarity(
            crate::distance::cosine(&[10.0, 4.0], &[4.0, 2.0]).unwrap(),
        );
        assert!((m.get(0, 1).unwrap() - expected).abs() < 1e-12);
        // the script rejects the missing file, so its row has no cells
        assert!(!m.is_populated(0, 2));
        assert!(!m.is_populated(1, 2));

        let restored = estimator_from_bytes(&est.serialize().unwrap()).unwrap();
        assert_eq!(restored.estimator_type(), EstimatorType::Script);
        assert_eq!(restored.serialize().unwrap(), est.serialize().unwrap());
    }
}
