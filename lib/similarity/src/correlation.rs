//! Correlation of a single column across two datasets.
//!
//! The coefficient (Pearson, Spearman or Kendall) is computed over the values
//! of `column` taken row by row, then mapped into [0, 1] by the configured
//! normalization.

use crate::estimator::{EstimatorBase, EstimatorType, SimilarityEstimator};
use bytes::BufMut;
use dprof_core::codec;
use dprof_core::config::{self, Options, OPT_CONCURRENCY};
use dprof_core::{Dataset, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const OPT_COLUMN: &str = "column";
pub const OPT_CORRELATION: &str = "correlation";
pub const OPT_NORMALIZATION: &str = "normalization";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationKind {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationKind {
    /// Coefficient of two samples, clamped to [-1, 1]. Samples of different
    /// sizes, or with fewer than two values, are uncorrelated: 0.
    pub fn coefficient(&self, x: &[f64], y: &[f64]) -> f64 {
        if x.len() != y.len() || x.len() < 2 {
            return 0.0;
        }
        let r = match self {
            CorrelationKind::Pearson => pearson(x, y),
            CorrelationKind::Spearman => pearson(&rank(x), &rank(y)),
            CorrelationKind::Kendall => kendall(x, y),
        };
        r.clamp(-1.0, 1.0)
    }
}

impl FromStr for CorrelationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationKind::Pearson),
            "spearman" => Ok(CorrelationKind::Spearman),
            "kendall" => Ok(CorrelationKind::Kendall),
            _ => Err(Error::InvalidConfig(format!("unknown correlation: {}", s))),
        }
    }
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CorrelationKind::Pearson => "pearson",
            CorrelationKind::Spearman => "spearman",
            CorrelationKind::Kendall => "kendall",
        })
    }
}

/// Mapping of a coefficient in [-1, 1] to a similarity in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    /// |r|
    Abs,
    /// (r + 1) / 2
    #[default]
    Scale,
    /// max(r, 0)
    Pos,
}

impl Normalization {
    #[inline]
    pub fn apply(&self, r: f64) -> f64 {
        match self {
            Normalization::Abs => r.abs(),
            Normalization::Scale => (r + 1.0) / 2.0,
            Normalization::Pos => r.max(0.0),
        }
    }
}

impl FromStr for Normalization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abs" => Ok(Normalization::Abs),
            "scale" => Ok(Normalization::Scale),
            "pos" => Ok(Normalization::Pos),
            _ => Err(Error::InvalidConfig(format!("unknown normalization: {}", s))),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson product-moment coefficient; 0 when either sample is constant
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let (mean_x, mean_y) = (mean(x), mean(y));
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// 1-based ranks; tied values share the average of their positions
pub fn rank(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let shared = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = shared;
        }
        start = end;
    }
    ranks
}

#[inline]
fn sign(d: f64) -> f64 {
    if d > 0.0 {
        1.0
    } else if d < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Kendall tau-a over all pairs i < j
pub fn kendall(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    let mut score = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            score += sign(x[i] - x[j]) * sign(y[i] - y[j]);
        }
    }
    let pairs = (n * (n - 1) / 2) as f64;
    score / pairs
}

#[derive(Debug, Clone)]
pub struct CorrelationEstimator {
    base: EstimatorBase,
    column: usize,
    kind: CorrelationKind,
    normalization: Normalization,
}

impl CorrelationEstimator {
    pub fn new(datasets: Vec<Arc<Dataset>>) -> Self {
        Self {
            base: EstimatorBase::new(datasets),
            column: 0,
            kind: CorrelationKind::default(),
            normalization: Normalization::default(),
        }
    }

    fn column_values(&self, dataset: &Dataset) -> Result<Vec<f64>> {
        dataset
            .tuples()?
            .iter()
            .enumerate()
            .map(|(row, t)| {
                t.data.get(self.column).copied().ok_or_else(|| {
                    Error::Computation(format!(
                        "{}: row {} has no column {}",
                        dataset, row, self.column
                    ))
                })
            })
            .collect()
    }
}

impl SimilarityEstimator for CorrelationEstimator {
    fn estimator_type(&self) -> EstimatorType {
        EstimatorType::Correlation
    }

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn configure(&mut self, options: &Options) -> Result<()> {
        self.base.configure(options)?;
        if let Some(column) = config::parse_option::<usize>(options, OPT_COLUMN)? {
            self.column = column;
        }
        if let Some(raw) = options.get(OPT_CORRELATION) {
            self.kind = raw.parse()?;
        }
        if let Some(raw) = options.get(OPT_NORMALIZATION) {
            self.normalization = raw.parse()?;
        }
        Ok(())
    }

    fn options(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            (OPT_CONCURRENCY, "max number of threads to run in parallel"),
            (OPT_COLUMN, "index of the column to correlate (default 0)"),
            (OPT_CORRELATION, "pearson, spearman or kendall (default pearson)"),
            (
                OPT_NORMALIZATION,
                "abs: |r|, scale: (r+1)/2, pos: max(r,0) (default scale)",
            ),
        ])
    }

    fn similarity(&self, a: &Dataset, b: &Dataset) -> Result<f64> {
        let x = self.column_values(a)?;
        let y = self.column_values(b)?;
        let r = self.kind.coefficient(&x, &y);
        Ok(self.normalization.apply(r))
    }

    fn write_fields(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.put_u32(self.column as u32);
        codec::put_string(buf, &self.kind.to_string());
        buf.put_u32(match self.normalization {
            Normalization::Abs => 0,
            Normalization::Scale => 1,
            Normalization::Pos => 2,
        });
        Ok(())
    }

    fn read_fields(&mut self, buf: &mut &[u8]) -> Result<()> {
        self.column = codec::get_u32(buf, "column")? as usize;
        self.kind = codec::get_string(buf, "correlation")?
            .parse()
            .map_err(|e: Error| Error::Decode(e.to_string()))?;
        self.normalization = match codec::get_u32(buf, "normalization")? {
            0 => Normalization::Abs,
            1 => Normalization::Scale,
            2 => Normalization::Pos,
            other => return Err(Error::Decode(format!("unknown normalization tag {}", other))),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::estimator_from_bytes;
    use crate::testutil::{column, dataset};
    use dprof_core::parse_options;

    #[test]
    fn test_pearson_affine() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 7.0).collect();
        assert!((pearson(&x, &y) - 1.0).abs() < 1e-12);
        let z: Vec<f64> = x.iter().map(|v| -v).collect();
        assert!((pearson(&x, &z) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[5.0; 4]), 0.0);
    }

    #[test]
    fn test_average_ranks() {
        assert_eq!(rank(&[10.0, 30.0, 20.0, 20.0]), vec![1.0, 4.0, 2.5, 2.5]);
        assert_eq!(rank(&[1.0, 1.0, 1.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_spearman_monotone() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        let r = CorrelationKind::Spearman.coefficient(&x, &y);
        assert!((r - 1.0).abs() < 1e-12);
        assert!(CorrelationKind::Pearson.coefficient(&x, &y) < 1.0);
    }

    #[test]
    fn test_kendall() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(kendall(&x, &[1.0, 2.0, 3.0, 4.0]), 1.0);
        assert_eq!(kendall(&x, &[4.0, 3.0, 2.0, 1.0]), -1.0);
        // one discordant pair of six
        assert!((kendall(&x, &[2.0, 1.0, 3.0, 4.0]) - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_samples_are_uncorrelated() {
        assert_eq!(CorrelationKind::Pearson.coefficient(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(CorrelationKind::Spearman.coefficient(&[1.0, 2.0, 3.0], &[]), 0.0);
        assert_eq!(CorrelationKind::Kendall.coefficient(&[1.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_normalizations() {
        assert_eq!(Normalization::Abs.apply(-0.5), 0.5);
        assert_eq!(Normalization::Scale.apply(-1.0), 0.0);
        assert_eq!(Normalization::Scale.apply(0.0), 0.5);
        assert_eq!(Normalization::Pos.apply(-0.3), 0.0);
        assert_eq!(Normalization::Pos.apply(0.3), 0.3);
    }

    #[test]
    fn test_estimator_symmetric_and_affine() {
        let a = column("a", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = column("b", &[2.0, 4.0, 6.0, 8.0, 10.0]);
        let c = column("c", &[3.0, 1.0, 4.0, 1.0, 5.0]);
        let mut est = CorrelationEstimator::new(vec![a.clone(), b.clone(), c.clone()]);
        est.configure(&parse_options("normalization=pos").unwrap()).unwrap();
        assert!((est.similarity(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(est.similarity(&a, &c).unwrap(), est.similarity(&c, &a).unwrap());
    }

    #[test]
    fn test_column_option() {
        let a = dataset("a", &[&[0.0, 1.0], &[0.0, 2.0], &[0.0, 3.0]]);
        let b = dataset("b", &[&[5.0, 3.0], &[6.0, 2.0], &[7.0, 1.0]]);
        let mut est = CorrelationEstimator::new(vec![a.clone(), b.clone()]);
        est.configure(&parse_options("column=1,normalization=abs").unwrap()).unwrap();
        assert!((est.similarity(&a, &b).unwrap() - 1.0).abs() < 1e-12);

        est.configure(&parse_options("column=2").unwrap()).unwrap();
        assert!(est.similarity(&a, &b).is_err());
    }

    #[test]
    fn test_bad_options() {
        let mut est = CorrelationEstimator::new(Vec::new());
        assert!(est.configure(&parse_options("correlation=cosine").unwrap()).is_err());
        assert!(est.configure(&parse_options("normalization=sqrt").unwrap()).is_err());
        assert!(est.configure(&parse_options("column=-1").unwrap()).is_err());
    }

    #[test]
    fn test_mismatched_lengths_still_populate() {
        let datasets = vec![
            column("a", &[1.0, 2.0, 3.0, 4.0]),
            column("b", &[3.0, 2.0, 1.0, 0.0, 5.0]),
            column("c", &[1.0, 2.0, 3.0]),
        ];
        let mut est = CorrelationEstimator::new(datasets);
        est.compute().unwrap();
        let m = est.similarity_matrix();
        assert_eq!(m.populated_cells(), 3);
        assert_eq!(m.fully_calculated_nodes(), 3);
        // r = 0 under the default scale normalization
        assert_eq!(m.get(0, 1).unwrap(), 0.5);
        assert_eq!(m.get(1, 2).unwrap(), 0.5);
    }

    #[test]
    fn test_round_trip_keeps_options() {
        let datasets = vec![column("a", &[1.0, 2.0]), column("b", &[2.0, 1.0])];
        let mut est = CorrelationEstimator::new(datasets);
        est.configure(&parse_options("correlation=kendall,normalization=abs,column=0").unwrap())
            .unwrap();
        est.compute().unwrap();
        let restored = estimator_from_bytes(&est.serialize().unwrap()).unwrap();
        assert_eq!(restored.estimator_type(), EstimatorType::Correlation);
        assert_eq!(restored.similarity_matrix().get(0, 1).unwrap(), 1.0);
        assert_eq!(restored.serialize().unwrap(), est.serialize().unwrap());
    }
}
