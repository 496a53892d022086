//! Pairwise similarity computed by an external script run as
//! `<script> <path-a> <path-b>`, which must print exactly one value.

use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use crate::runner::{self, ScriptRunner, OPT_SCRIPT, OPT_TIMEOUT};
use bytes::BufMut;
use dprof_core::codec;
use dprof_core::config::{self, Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ScriptPairEstimator {
    base: EstimatorBase,
    runner: Option<ScriptRunner>,
}

impl ScriptPairEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            runner: None,
        }
    }

    fn runner(&self) -> Result<&ScriptRunner> {
        self.runner
            .as_ref()
            .ok_or_else(|| Error::MissingOption(OPT_SCRIPT.to_string()))
    }
}

impl SimilarityEstimator for ScriptPairEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::ScriptPair
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)?;
        let script = config::require_option(options, OPT_SCRIPT)?;
        self.runner = Some(ScriptRunner::new(script, runner::parse_timeout(options)?));
        Ok(())
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            (OPT_CONCURRENCY, "max number of threads to run in parallel"),
            (OPT_SCRIPT, "path of the pairwise script to be executed"),
            (OPT_TIMEOUT, "seconds before a script run is killed, 0 for no limit (default 0)"),
        ])
    }

    fn prepare(&mut self) -> Result<()> {
        self.runner()?;
        self.base.prepare(false)
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        match self.runner()?.run(&[a.path(), b.path()])?.as_slice() {
            [value] => Ok(*value),
            values => Err(Error::Script(format!(
                "expected one similarity value, got {}",
                values.len()
            ))),
        }
    }

    fn write_fields(&self, buf: &mut Vec<u8>) -> Result<()> {
        let script = self
            .runner
            .as_ref()
            .map(|r| r.script().to_string_lossy().into_owned())
            .unwrap_or_default();
        codec::put_string(buf, &script);
        buf.put_f64(runner::timeout_secs(self.runner.as_ref().and_then(|r| r.timeout())));
        Ok(())
    }

    fn read_fields(&mut self, buf: &mut &[u8]) -> Result<()> {
        let script = codec::get_string(buf, "script path")?;
        let timeout = runner::timeout_from_secs(codec::get_f64(buf, "timeout")?)?;
        self.runner = (!script.is_empty()).then(|| ScriptRunner::new(script, timeout));
        Ok(())
    }
}
