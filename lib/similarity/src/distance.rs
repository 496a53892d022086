//! Distance and similarity functions over coordinate vectors and sets
//!
//! Used by the script estimator to compare the coordinates a script emits,
//! and by the Jaccard estimator over tuple sets.

use ahash::AHashSet;
use dprof_core::{Error, Result};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

/// How two coordinate vectors are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Norm {
    /// L-p distance, turned into a similarity with [`distance_to_similarity`]
    Minkowski(u32),
    /// Angle between the vectors, scaled to [0, 1]
    Cosine,
}

impl Norm {
    /// Wire tag: 0 for cosine, p otherwise
    pub fn tag(&self) -> u32 {
        match self {
            Norm::Minkowski(p) => *p,
            Norm::Cosine => 0,
        }
    }

    pub fn from_tag(tag: u32) -> Self {
        match tag {
            0 => Norm::Cosine,
            p => Norm::Minkowski(p),
        }
    }

    /// Similarity of two coordinate vectors under this norm
    pub fn similarity(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        match self {
            Norm::Minkowski(p) => minkowski(a, b, *p).map(distance_to_similarity),
            Norm::Cosine => cosine(a, b).map(angular_similarity),
        }
    }
}

impl Default for Norm {
    fn default() -> Self {
        Norm::Minkowski(2)
    }
}

impl FromStr for Norm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Norm::Cosine),
            "manhattan" => Ok(Norm::Minkowski(1)),
            "euclidean" => Ok(Norm::Minkowski(2)),
            other => match other.parse::<u32>() {
                Ok(p) if p >= 1 => Ok(Norm::Minkowski(p)),
                _ => Err(Error::InvalidConfig(format!("unknown norm: {}", s))),
            },
        }
    }
}

impl fmt::Display for Norm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Norm::Minkowski(p) => write!(f, "{}", p),
            Norm::Cosine => f.write_str("cosine"),
        }
    }
}

fn check_dimensions(a: &[f64], b: &[f64]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::Computation(format!(
            "coordinate dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

/// Minkowski distance of order `p`
///
/// # Arguments
/// * `a` - First coordinate vector
/// * `b` - Second coordinate vector, same length as `a`
/// * `p` - Order of the norm, at least 1
pub fn minkowski(a: &[f64], b: &[f64], p: u32) -> Result<f64> {
    check_dimensions(a, b)?;
    if p == 0 {
        return Err(Error::InvalidConfig("norm order must be at least 1".to_string()));
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs().powi(p as i32))
        .sum();
    Ok(sum.powf(1.0 / p as f64))
}

/// Cosine of the angle between two vectors. Fails on a zero vector.
pub fn cosine(a: &[f64], b: &[f64]) -> Result<f64> {
    check_dimensions(a, b)?;
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Err(Error::Computation("cosine of a zero vector".to_string()));
    }
    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Map a distance in [0, inf) to a similarity in (0, 1]
#[inline]
pub fn distance_to_similarity(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Map a cosine in [-1, 1] to an angular similarity in [0, 1]
#[inline]
pub fn angular_similarity(cosine: f64) -> f64 {
    1.0 - cosine.clamp(-1.0, 1.0).acos() / std::f64::consts::PI
}

/// Jaccard index of two sets; two empty sets are identical
pub fn jaccard<T: Eq + Hash>(a: &AHashSet<T>, b: &AHashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|x| large.contains(*x)).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
