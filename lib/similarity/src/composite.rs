//! Arithmetic combination of other estimators.
//!
//! Configured with an `expression` such as `0.7*s + 0.3*j` and one
//! `var.<name>` option per identifier, holding `<type>[:k=v;k=v]`:
//!
//! ```text
//! expression=0.7*s + 0.3*j,var.s=size,var.j=correlation:column=1;normalization=abs
//! ```
//!
//! Keeping the combined value inside [0, 1] is up to the expression.

use crate::estimator::{
    estimator_from_bytes, new_estimator, EstimatorBase, EstimatorType, SimilarityEstimator,
};
use crate::expression::Expr;
use ahash::AHashMap;
use bytes::BufMut;
use dprof_core::codec;
use dprof_core::config::{self, Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const OPT_EXPRESSION: &str = "expression";
pub const VAR_PREFIX: &str = "var.";

pub struct CompositeEstimator {
    base: EstimatorBase,
    source: String,
    expression: Option<Expr>,
    estimators: BTreeMap<String, Box<dyn SimilarityEstimator>>,
}

impl CompositeEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            source: String::new(),
            expression: None,
            estimators: BTreeMap::new(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.source
    }

    /// Sub-estimators keyed by the identifier they are bound to
    pub fn estimators(&self) -> &BTreeMap<String, Box<dyn SimilarityEstimator>> {
        &self.estimators
    }

    /// Build the sub-estimator of `var.<name>`
    fn build_variable(&self, name: &str, options: &Options) -> Result<Box<dyn SimilarityEstimator>> {
        let key = format!("{}{}", VAR_PREFIX, name);
        let definition = options.get(&key).ok_or_else(|| {
            Error::InvalidConfig(format!("unknown identifier {:?}: no {} option", name, key))
        })?;
        let (type_name, mut sub_options) = match definition.split_once(':') {
            Some((t, rest)) => (t, config::parse_options_with(rest, ';')?),
            None => (definition.as_str(), Options::new()),
        };
        sub_options
            .entry(OPT_CONCURRENCY.to_string())
            .or_insert_with(|| self.base.concurrency().to_string());
        let mut estimator = new_estimator(type_name.parse()?, self.base.datasets().to_vec());
        estimator.configure(&sub_options)?;
        debug!("Bound {} to {}", name, estimator.estimator_type());
        Ok(estimator)
    }
}

impl SimilarityEstimator for CompositeEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Composite
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)?;
        let source = config::require_option(options, OPT_EXPRESSION)?.to_string();
        let expression = Expr::parse(&source)?;
        let mut estimators = BTreeMap::new();
        for name in expression.variables() {
            let estimator = self.build_variable(&name, options)?;
            estimators.insert(name, estimator);
        }
        self.source = source;
        self.expression = Some(expression);
        self.estimators = estimators;
        Ok(())
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            (OPT_CONCURRENCY, "max number of threads to run in parallel"),
            (OPT_EXPRESSION, "arithmetic expression (+ - * / and parentheses) over identifiers"),
            (
                "var.<name>",
                "estimator bound to an identifier: <type>[:k=v;k=v]",
            ),
        ])
    }

    fn prepare(&mut self) -> Result<()> {
        if self.expression.is_none() {
            return Err(Error::MissingOption(OPT_EXPRESSION.to_string()));
        }
        self.base.prepare(false)?;
        let datasets = self.base.datasets().to_vec();
        for estimator in self.estimators.values_mut() {
            estimator.base_mut().bind_datasets(datasets.clone());
            estimator.prepare()?;
        }
        Ok(())
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        let expression = self
            .expression
            .as_ref()
            .ok_or_else(|| Error::MissingOption(OPT_EXPRESSION.to_string()))?;
        let mut values: AHashMap<&str, f64> = AHashMap::new();
        let value = expression.eval(&mut |name: &str| {
            if let Some(v) = values.get(name) {
                return Ok(*v);
            }
            let (key, estimator) = self.estimators.get_key_value(name).ok_or_else(|| {
                Error::Computation(format!("identifier {:?} is not bound", name))
            })?;
            let v = estimator.similarity(a, b)?;
            values.insert(key.as_str(), v);
            Ok(v)
        })?;
        if !value.is_finite() {
            return Err(Error::Computation(format!("expression evaluated to {}", value)));
        }
        Ok(value)
    }

    fn write_fields(&self, buf: &mut Vec<u8>) -> Result<()> {
        codec::put_string(buf, &self.source);
        buf.put_u32(self.estimators.len() as u32);
        for (name, estimator) in &self.estimators {
            codec::put_string(buf, name);
            codec::put_blob(buf, &estimator.serialize()?);
        }
        Ok(())
    }

    fn read_fields(&mut self, buf: &mut &[u8]) -> Result<()> {
        let source = codec::get_string(buf, "expression")?;
        let expression = if source.is_empty() {
            None
        } else {
            Some(Expr::parse(&source).map_err(|e| Error::Decode(e.to_string()))?)
        };
        let count = codec::get_u32(buf, "estimator count")?;
        let datasets = self.base.datasets().to_vec();
        let mut estimators = BTreeMap::new();
        for _ in 0..count {
            let name = codec::get_string(buf, "identifier")?;
            let mut estimator = estimator_from_bytes(&codec::get_blob(buf, "estimator")?)?;
            // share the composite's dataset handles so memoized rows are reused
            estimator.base_mut().bind_datasets(datasets.clone());
            estimators.insert(name, estimator);
        }
        self.source = source;
        self.expression = expression;
        self.estimators = estimators;
        Ok(())
    }
}
