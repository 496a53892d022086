//! The estimator framework: the [`SimilarityEstimator`] trait, the state
//! every strategy shares ([`EstimatorBase`]), the population driver and the
//! type-tag factory.

use crate::composite::CompositeEstimator;
use crate::correlation::CorrelationEstimator;
use crate::jaccard::JaccardEstimator;
use crate::order::OrderEstimator;
use crate::random::RandomEstimator;
use crate::script::ScriptEstimator;
use crate::script_pair::ScriptPairEstimator;
use crate::size::SizeEstimator;
use ahash::AHashMap;
use bytes::{Buf, BufMut};
use dprof_core::codec;
use dprof_core::config::{self, Options};
use dprof_core::{Dataset, Error, PopulationPolicy, Result, SimilarityMatrix, WorkerPool};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Type tag of a similarity strategy. The discriminant is the first field
/// of a serialized estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EstimatorType {
    Jaccard = 1,
    Correlation = 2,
    Order = 3,
    Size = 4,
    Script = 5,
    ScriptPair = 6,
    Composite = 7,
    Random = 8,
}

impl EstimatorType {
    pub const ALL: [EstimatorType; 8] = [
        EstimatorType::Jaccard,
        EstimatorType::Correlation,
        EstimatorType::Order,
        EstimatorType::Size,
        EstimatorType::Script,
        EstimatorType::ScriptPair,
        EstimatorType::Composite,
        EstimatorType::Random,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EstimatorType::Jaccard => "JACCARD",
            EstimatorType::Correlation => "CORRELATION",
            EstimatorType::Order => "ORDER",
            EstimatorType::Size => "SIZE",
            EstimatorType::Script => "SCRIPT",
            EstimatorType::ScriptPair => "SCRIPT_PAIR",
            EstimatorType::Composite => "COMPOSITE",
            EstimatorType::Random => "RANDOM",
        }
    }
}

impl fmt::Display for EstimatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EstimatorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        EstimatorType::ALL
            .iter()
            .copied()
            .find(|t| t.name().replace('_', "") == normalized)
            .ok_or_else(|| Error::UnknownEstimator(s.to_string()))
    }
}

impl TryFrom<u32> for EstimatorType {
    type Error = Error;

    fn try_from(tag: u32) -> Result<Self> {
        EstimatorType::ALL
            .iter()
            .copied()
            .find(|t| *t as u32 == tag)
            .ok_or_else(|| Error::Decode(format!("unknown estimator type tag {}", tag)))
    }
}

/// State shared by every strategy
#[derive(Debug, Clone)]
pub struct EstimatorBase {
    pub(crate) datasets: Vec<Arc<Dataset>>,
    pub(crate) concurrency: usize,
    pub(crate) policy: PopulationPolicy,
    pub(crate) inverse_index: AHashMap<Uuid, usize>,
    pub(crate) similarities: SimilarityMatrix,
    pub(crate) duration: Duration,
}

impl EstimatorBase {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        let similarities = SimilarityMatrix::new(datasets.len());
        Self {
            datasets,
            concurrency: 1,
            policy: PopulationPolicy::full(),
            inverse_index: AHashMap::new(),
            similarities,
            duration: Duration::ZERO,
        }
    }

    pub fn datasets(&self) -> &[Arc<Dataset>] {
        &self.datasets
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn policy(&self) -> &PopulationPolicy {
        &self.policy
    }

    /// Apply the options every strategy understands
    pub fn configure(&mut self, options: &Options) -> Result<()> {
        if let Some(concurrency) = config::parse_concurrency(options)? {
            self.concurrency = concurrency;
        }
        Ok(())
    }

    /// Row of a dataset in the matrix
    #[inline]
    pub fn index_of(&self, dataset: &Dataset) -> Option<usize> {
        self.inverse_index.get(&dataset.id()).copied()
    }

    pub fn pool(&self) -> Result<WorkerPool> {
        WorkerPool::new(self.concurrency)
    }

    /// Replace the dataset list and rebuild the inverse index. The matrix is
    /// reset unless its capacity already matches.
    pub fn bind_datasets(&mut self, datasets: Vec<Arc<Dataset>>) {
        if self.similarities.capacity() != datasets.len() {
            self.similarities = SimilarityMatrix::new(datasets.len());
        }
        self.datasets = datasets;
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.inverse_index = self
            .datasets
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.id(), idx))
            .collect();
    }

    /// Checks that must pass before any work is dispatched. With
    /// `load_rows` every dataset is parsed up front, on the worker pool.
    pub fn prepare(&mut self, load_rows: bool) -> Result<()> {
        if self.datasets.is_empty() {
            warn!("No datasets were given");
            return Err(Error::EmptyDatasets);
        }
        self.policy.validate()?;
        let pool = self.pool()?;
        if load_rows {
            info!("Fetching {} datasets in memory", self.datasets.len());
            let loaded = pool.run(self.datasets.clone(), |d| d.read().map(|_| ()))?;
            // an unreadable dataset fails its own pairs, not the run
            for (d, result) in self.datasets.iter().zip(loaded) {
                if let Err(e) = result {
                    warn!("Could not load {}: {}", d, e);
                }
            }
        }
        self.rebuild_index();
        Ok(())
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        codec::put_blob(buf, &self.similarities.serialize());
        buf.put_u32(self.concurrency as u32);
        codec::put_blob(buf, &self.policy.serialize()?);
        buf.put_u32(self.datasets.len() as u32);
        for d in &self.datasets {
            codec::put_string(buf, &d.path().to_string_lossy());
        }
        Ok(())
    }

    fn read_from(&mut self, buf: &mut &[u8]) -> Result<()> {
        let similarities =
            SimilarityMatrix::deserialize(&codec::get_blob(buf, "similarity matrix")?)?;
        let concurrency = codec::get_u32(buf, "concurrency")? as usize;
        let policy = PopulationPolicy::deserialize(&codec::get_blob(buf, "population policy")?)?;
        let count = codec::get_u32(buf, "dataset count")? as usize;
        let mut datasets = Vec::with_capacity(count.min(buf.remaining()));
        for _ in 0..count {
            let path = codec::get_string(buf, "dataset path")?;
            datasets.push(Arc::new(Dataset::new(path)));
        }
        if similarities.capacity() != datasets.len() {
            return Err(Error::CapacityMismatch {
                expected: datasets.len(),
                actual: similarities.capacity(),
            });
        }
        self.similarities = similarities;
        self.concurrency = concurrency.max(1);
        self.policy = policy;
        self.datasets = datasets;
        self.rebuild_index();
        Ok(())
    }
}

/// A similarity definition between two datasets.
///
/// Strategies implement [`similarity`](SimilarityEstimator::similarity) and
/// their configuration; the provided [`compute`](SimilarityEstimator::compute)
/// runs the shared population driver over the configured policy.
pub trait SimilarityEstimator: Send + Sync {
    fn estimator_type(&self) -> EstimatorType;

    fn base(&self) -> &EstimatorBase;

    fn base_mut(&mut self) -> &mut EstimatorBase;

    /// Apply options. A missing required option fails here, synchronously.
    fn configure(&mut self, options: &Options) -> Result<()>;

    /// Accepted options and their description
    fn options(&self) -> BTreeMap<&'static str, &'static str>;

    /// Similarity of two datasets, in [0, 1] for the built-in strategies
    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64>;

    /// Structural checks and data materialization ahead of population
    fn prepare(&mut self) -> Result<()> {
        self.base_mut().prepare(true)
    }

    /// Strategy specific fields appended after the common header
    fn write_fields(&self, _buf: &mut Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn read_fields(&mut self, _buf: &mut &[u8]) -> Result<()> {
        Ok(())
    }

    /// Fill the similarity matrix according to the population policy
    fn compute(&mut self) -> Result<()> {
        self.prepare()?;
        let start = Instant::now();
        let matrix = populate(self.base(), |a: &Dataset, b: &Dataset| self.similarity(a, b))?;
        let base = self.base_mut();
        base.similarities = matrix;
        base.duration = start.elapsed();
        info!(
            "{} estimation done in {:?} ({} of {} pairs populated)",
            self.estimator_type(),
            self.base().duration,
            self.base().similarities.populated_cells(),
            self.base().similarities.total_pairs()
        );
        Ok(())
    }

    fn similarity_matrix(&self) -> &SimilarityMatrix {
        &self.base().similarities
    }

    fn datasets(&self) -> &[Arc<Dataset>] {
        &self.base().datasets
    }

    /// Wall time of the last population pass
    fn duration(&self) -> Duration {
        self.base().duration
    }

    fn set_population_policy(&mut self, policy: PopulationPolicy) {
        self.base_mut().policy = policy;
    }

    fn set_concurrency(&mut self, concurrency: usize) -> Result<()> {
        if concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be positive".to_string()));
        }
        self.base_mut().concurrency = concurrency;
        Ok(())
    }

    /// `u32` type tag, the common header and the strategy fields
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.put_u32(self.estimator_type() as u32);
        self.base().write_to(&mut buf)?;
        self.write_fields(&mut buf)?;
        Ok(buf)
    }

    fn deserialize(&mut self, data: &[u8]) -> Result<()> {
        let mut buf = data;
        let tag = codec::get_u32(&mut buf, "estimator type")?;
        if tag != self.estimator_type() as u32 {
            return Err(Error::Decode(format!(
                "estimator type tag {} does not match {}",
                tag,
                self.estimator_type()
            )));
        }
        self.base_mut().read_from(&mut buf)?;
        self.read_fields(&mut buf)?;
        if buf.has_remaining() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after estimator",
                buf.remaining()
            )));
        }
        Ok(())
    }
}

/// Per-unit outcome of the population driver
#[derive(Debug, Default, Clone, Copy)]
struct UnitOutcome {
    populated: usize,
    failed: usize,
}

/// Compute the pairs selected by the base's policy on its worker pool and
/// return the resulting matrix. A failing pair is logged and left unpopulated.
pub fn populate<F>(base: &EstimatorBase, similarity: F) -> Result<SimilarityMatrix>
where
    F: Fn(&Dataset, &Dataset) -> Result<f64> + Sync,
{
    let n = base.datasets.len();
    let units = base.policy.plan(n)?;
    let pool = base.pool()?;
    let matrix = SimilarityMatrix::new(n);
    let pairs: usize = units.iter().map(|u| u.columns.len()).sum();
    info!(
        "Populating {} pairs over {} rows ({} policy, {} threads)",
        pairs,
        units.len(),
        base.policy,
        pool.concurrency()
    );

    let outcomes = pool.run(units, |unit| {
        let a = &base.datasets[unit.row];
        let mut outcome = UnitOutcome::default();
        for &column in &unit.columns {
            let b = &base.datasets[column];
            match similarity(a, b).and_then(|v| matrix.set(unit.row, column, v)) {
                Ok(()) => outcome.populated += 1,
                Err(e) => {
                    outcome.failed += 1;
                    warn!("Similarity between {} and {} failed: {}", a, b, e);
                }
            }
        }
        debug!("Row {} done: {:?}", unit.row, outcome);
        outcome
    })?;

    let failed: usize = outcomes.iter().map(|o| o.failed).sum();
    if failed > 0 {
        warn!("{} of {} pairs could not be computed", failed, pairs);
    }
    Ok(matrix)
}

/// Build an unconfigured estimator of the given type
pub fn new_estimator(
    estimator_type: EstimatorType,
    datasets: Vec<Arc<Dataset>>,
) -> Box<dyn SimilarityEstimator> {
    match estimator_type {
        EstimatorType::Jaccard => Box::new(JaccardEstimator::new(datasets)),
        EstimatorType::Correlation => Box::new(CorrelationEstimator::new(datasets)),
        EstimatorType::Order => Box::new(OrderEstimator::new(datasets)),
        EstimatorType::Size => Box::new(SizeEstimator::new(datasets)),
        EstimatorType::Script => Box::new(ScriptEstimator::new(datasets)),
        EstimatorType::ScriptPair => Box::new(ScriptPairEstimator::new(datasets)),
        EstimatorType::Composite => Box::new(CompositeEstimator::new(datasets)),
        EstimatorType::Random => Box::new(RandomEstimator::new(datasets)),
    }
}

/// Restore an estimator from [`SimilarityEstimator::serialize`] output,
/// dispatching on the leading type tag
pub fn estimator_from_bytes(data: &[u8]) -> Result<Box<dyn SimilarityEstimator>> {
    let mut peek = data;
    let tag = codec::get_u32(&mut peek, "estimator type")?;
    let mut estimator = new_estimator(EstimatorType::try_from(tag)?, Vec::new());
    estimator.deserialize(data)?;
    Ok(estimator)
}
