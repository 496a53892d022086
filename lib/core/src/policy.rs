//! Population policies decide how much of a similarity matrix a compute
//! pass fills.
//!
//! - `Full` computes every off-diagonal pair.
//! - `Approximate` with `count = k` picks a pair set in which no dataset
//!   takes part in more than `k` pairs.
//! - `Approximate` with `threshold = t` computes whole rows, in index order,
//!   until at least `ceil(t * N(N-1)/2)` pairs are covered.
//!
//! When both knobs are present `count` wins.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const PARAM_COUNT: &str = "count";
pub const PARAM_THRESHOLD: &str = "threshold";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyKind {
    Full,
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationPolicy {
    pub kind: PolicyKind,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

/// One unit of dispatch: a matrix row and the columns to compute in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUnit {
    pub row: usize,
    pub columns: Vec<usize>,
}

/// Resolved budget of an approximate policy
#[derive(Debug, Clone, Copy, PartialEq)]
enum Budget {
    Count(usize),
    Threshold(f64),
}

impl PopulationPolicy {
    pub fn full() -> Self {
        Self {
            kind: PolicyKind::Full,
            parameters: BTreeMap::new(),
        }
    }

    pub fn approximate_count(count: usize) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(PARAM_COUNT.to_string(), count as f64);
        Self {
            kind: PolicyKind::Approximate,
            parameters,
        }
    }

    pub fn approximate_threshold(threshold: f64) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(PARAM_THRESHOLD.to_string(), threshold);
        Self {
            kind: PolicyKind::Approximate,
            parameters,
        }
    }

    pub fn is_full(&self) -> bool {
        self.kind == PolicyKind::Full
    }

    /// Check the parameters before any work is dispatched
    pub fn validate(&self) -> Result<()> {
        self.budget().map(|_| ())
    }

    fn budget(&self) -> Result<Option<Budget>> {
        if self.kind == PolicyKind::Full {
            return Ok(None);
        }
        if let Some(&count) = self.parameters.get(PARAM_COUNT) {
            if !count.is_finite() || count < 1.0 || count.fract() != 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "population count must be a positive integer, got {}",
                    count
                )));
            }
            return Ok(Some(Budget::Count(count as usize)));
        }
        if let Some(&threshold) = self.parameters.get(PARAM_THRESHOLD) {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "population threshold must be in (0, 1], got {}",
                    threshold
                )));
            }
            return Ok(Some(Budget::Threshold(threshold)));
        }
        Err(Error::InvalidConfig(
            "approximate population policy needs a count or threshold parameter".to_string(),
        ))
    }

    /// Enumerate the pairs to compute for `n` datasets, grouped by their
    /// lower row index. Every pair appears once; rows without work are omitted.
    pub fn plan(&self, n: usize) -> Result<Vec<RowUnit>> {
        let mut units = match self.budget()? {
            None => (0..n)
                .map(|row| RowUnit {
                    row,
                    columns: ((row + 1)..n).collect(),
                })
                .collect(),
            Some(Budget::Count(k)) => plan_by_count(n, k),
            Some(Budget::Threshold(t)) => plan_by_threshold(n, t),
        };
        units.retain(|u| !u.columns.is_empty());
        Ok(units)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Decode(format!("policy: {}", e)))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::Decode(format!("policy: {}", e)))
    }
}

impl Default for PopulationPolicy {
    fn default() -> Self {
        Self::full()
    }
}

/// Degree-bounded pair selection. Pairs are visited by growing circular
/// offset so the budget spreads evenly instead of filling the first rows.
fn plan_by_count(n: usize, k: usize) -> Vec<RowUnit> {
    let mut degree = vec![0usize; n];
    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); n];
    for offset in 1..=(n / 2) {
        for i in 0..n {
            let j = (i + offset) % n;
            // with even n the half-way offset reaches each pair twice
            if 2 * offset == n && j < i {
                continue;
            }
            if degree[i] < k && degree[j] < k {
                degree[i] += 1;
                degree[j] += 1;
                let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                columns[lo].push(hi);
            }
        }
    }
    columns
        .into_iter()
        .enumerate()
        .map(|(row, mut columns)| {
            columns.sort_unstable();
            RowUnit { row, columns }
        })
        .collect()
}

/// Whole rows in index order until the covered pairs reach the target
fn plan_by_threshold(n: usize, threshold: f64) -> Vec<RowUnit> {
    let total = n * n.saturating_sub(1) / 2;
    let target = (threshold * total as f64).ceil() as usize;
    let mut covered = 0;
    let mut units = Vec::new();
    for row in 0..n {
        if covered >= target {
            break;
        }
        let columns: Vec<usize> = ((row + 1)..n).collect();
        covered += columns.len();
        units.push(RowUnit { row, columns });
    }
    units
}

impl FromStr for PopulationPolicy {
    type Err = Error;

    /// `FULL` or `APRX,count=4` / `APRX,threshold=0.5`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, rest) = match s.find(',') {
            Some(idx) => (&s[..idx], &s[idx + 1..]),
            None => (s, ""),
        };
        let kind = match kind.trim().to_ascii_uppercase().as_str() {
            "FULL" => PolicyKind::Full,
            "APRX" | "APPROXIMATE" => PolicyKind::Approximate,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unknown population policy: {}",
                    other
                )))
            }
        };
        let mut parameters = BTreeMap::new();
        for (key, value) in crate::config::parse_options(rest)? {
            let value = value.parse::<f64>().map_err(|e| {
                Error::InvalidConfig(format!("population parameter {}: {}", key, e))
            })?;
            parameters.insert(key, value);
        }
        let policy = Self { kind, parameters };
        policy.validate()?;
        Ok(policy)
    }
}

impl fmt::Display for PopulationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PolicyKind::Full => f.write_str("FULL")?,
            PolicyKind::Approximate => f.write_str("APRX")?,
        }
        for (key, value) in &self.parameters {
            write!(f, ",{}={}", key, value)?;
        }
        Ok(())
    }
}
