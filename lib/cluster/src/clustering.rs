//! Agglomerative clustering by reciprocal nearest neighbors.
//!
//! Each round every unmerged cluster picks its most similar partner on the
//! worker pool, then all reciprocal pairs are merged on the calling thread.
//! Inter-cluster similarity is the mean over the populated matrix cells
//! between the two clusters' datasets; a pair with no populated cell ranks
//! below every other. Equal similarities are broken by the smaller
//! `(min id, max id)` pair. Each pair's score is summed with the lower-id
//! cluster's rows outermost, so both sides of a pair see the same bits and
//! candidates are totally ordered: the best pair overall is always
//! reciprocal and every round merges at least once.

use crate::dendrogram::Dendrogram;
use ahash::AHashMap;
use dprof_core::{Dataset, Error, Result, SimilarityMatrix, WorkerPool};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Best partner proposal of one cluster
#[derive(Debug, Clone, Copy)]
struct Candidate {
    partner: usize,
    pair: (usize, usize),
    similarity: Option<f64>,
}

impl Candidate {
    fn new(a: usize, b: usize, similarity: Option<f64>) -> Self {
        Self {
            partner: b,
            pair: (a.min(b), a.max(b)),
            similarity,
        }
    }

    fn score(&self) -> f64 {
        self.similarity.unwrap_or(f64::NEG_INFINITY)
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Greater is better: higher similarity, then the smaller pair
        self.score()
            .total_cmp(&other.score())
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Clustering of a dataset list over its similarity matrix. Dataset `i`
/// of the list is row `i` of the matrix.
#[derive(Debug)]
pub struct Clustering {
    matrix: SimilarityMatrix,
    datasets: Vec<Arc<Dataset>>,
    rows: AHashMap<Uuid, usize>,
    concurrency: usize,
    results: Option<Dendrogram>,
}

impl Clustering {
    pub fn new(matrix: SimilarityMatrix, datasets: Vec<Arc<Dataset>>) -> Result<Self> {
        if datasets.is_empty() {
            return Err(Error::EmptyDatasets);
        }
        if matrix.capacity() != datasets.len() {
            return Err(Error::CapacityMismatch {
                expected: datasets.len(),
                actual: matrix.capacity(),
            });
        }
        let rows = datasets
            .iter()
            .enumerate()
            .map(|(row, d)| (d.id(), row))
            .collect();
        Ok(Self {
            matrix,
            datasets,
            rows,
            concurrency: 1,
            results: None,
        })
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    /// Build the dendrogram, replacing any previous result
    pub fn compute(&mut self) -> Result<&Dendrogram> {
        let pool = WorkerPool::new(self.concurrency)?;
        let mut dendrogram = Dendrogram::new(&self.datasets);
        info!(
            "Clustering {} datasets ({} threads)",
            self.datasets.len(),
            pool.concurrency()
        );

        let mut round = 0;
        while !dendrogram.is_complete() {
            round += 1;
            let clusters: Vec<(usize, Vec<usize>)> = dendrogram
                .unmerged()
                .map(|node| self.rows_of(node.datasets()).map(|rows| (node.id(), rows)))
                .collect::<Result<_>>()?;

            let proposals = pool.run((0..clusters.len()).collect(), |i| {
                self.closest(&clusters, i)
            })?;

            let best: AHashMap<usize, usize> = clusters
                .iter()
                .zip(&proposals)
                .filter_map(|((id, _), c)| c.map(|c| (*id, c.partner)))
                .collect();
            let mut pairs: Vec<(usize, usize)> = best
                .iter()
                .filter(|&(&a, &b)| a < b && best.get(&b) == Some(&a))
                .map(|(&a, &b)| (a, b))
                .collect();
            pairs.sort_unstable();
            if pairs.is_empty() {
                // scores are symmetric so this only guards against a stall
                if let Some(top) = proposals.iter().flatten().max() {
                    pairs.push(top.pair);
                }
            }

            debug!("Round {}: {} clusters, {} merges", round, clusters.len(), pairs.len());
            for (a, b) in pairs {
                dendrogram.merge(a, b)?;
            }
        }

        let (max, min) = dendrogram.heights();
        info!(
            "Clustering done in {} rounds, {} merges, heights {}/{}",
            round,
            dendrogram.merges(),
            max,
            min
        );
        Ok(self.results.insert(dendrogram))
    }

    /// The dendrogram of the last [`compute`](Clustering::compute)
    pub fn results(&self) -> Option<&Dendrogram> {
        self.results.as_ref()
    }

    fn rows_of(&self, datasets: &[Arc<Dataset>]) -> Result<Vec<usize>> {
        datasets
            .iter()
            .map(|d| {
                self.rows
                    .get(&d.id())
                    .copied()
                    .ok_or_else(|| Error::Computation(format!("{} has no matrix row", d)))
            })
            .collect()
    }

    /// Mean similarity over the populated cells between two clusters. The
    /// summation order follows the argument order; see [`Self::pair_similarity`].
    fn cluster_similarity(&self, a: &[usize], b: &[usize]) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for &i in a {
            for &j in b {
                if let Some(v) = self.matrix.value(i, j) {
                    sum += v;
                    count += 1;
                }
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Score of two clusters, identical whichever side asks
    fn pair_similarity(&self, a: (usize, &[usize]), b: (usize, &[usize])) -> Option<f64> {
        let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        self.cluster_similarity(lo.1, hi.1)
    }

    fn closest(&self, clusters: &[(usize, Vec<usize>)], i: usize) -> Option<Candidate> {
        let (id, rows) = &clusters[i];
        clusters
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (other, other_rows))| {
                let similarity =
                    self.pair_similarity((*id, rows.as_slice()), (*other, other_rows.as_slice()));
                Candidate::new(*id, *other, similarity)
            })
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn datasets(n: usize) -> Vec<Arc<Dataset>> {
        (0..n).map(|i| Arc::new(Dataset::new(format!("d{}", i)))).collect()
    }

    fn random_matrix(n: usize, seed: u64) -> SimilarityMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let m = SimilarityMatrix::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                m.set(i, j, rng.random::<f64>()).unwrap();
            }
        }
        m
    }

    fn assert_partition(clusters: &[Vec<Arc<Dataset>>], all: &[Arc<Dataset>]) {
        let mut seen = HashSet::new();
        for d in clusters.iter().flatten() {
            assert!(seen.insert(d.id()), "{} appears twice", d);
        }
        assert_eq!(seen.len(), all.len());
        assert!(all.iter().all(|d| seen.contains(&d.id())));
    }

    #[test]
    fn test_constructor_checks() {
        assert!(matches!(
            Clustering::new(SimilarityMatrix::new(0), Vec::new()),
            Err(Error::EmptyDatasets)
        ));
        assert!(matches!(
            Clustering::new(SimilarityMatrix::new(3), datasets(4)),
            Err(Error::CapacityMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_zero_concurrency() {
        let mut c = Clustering::new(random_matrix(3, 1), datasets(3))
            .unwrap()
            .with_concurrency(0);
        assert!(matches!(c.compute(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_full_tree_properties() {
        let n = 10;
        let all = datasets(n);
        let mut c = Clustering::new(random_matrix(n, 42), all.clone()).unwrap();
        let d = c.compute().unwrap();
        assert_eq!(d.merges(), n - 1);
        assert!(d.root().is_some());
        assert_eq!(d.leaves(), n);
        assert_eq!(d.unmerged_count(), 0);

        let (max, min) = d.heights();
        assert!(max >= min && min >= 1);
        assert_eq!(d.get_clusters(0).len(), 1);
        assert_eq!(d.get_clusters(max).len(), n);
        for level in 0..=max + 1 {
            assert_partition(&d.get_clusters(level), &all);
        }
    }

    #[test]
    fn test_concurrency_does_not_change_result() {
        let n = 10;
        let all = datasets(n);
        let run = |concurrency| {
            let mut c = Clustering::new(random_matrix(n, 7), all.clone())
                .unwrap()
                .with_concurrency(concurrency);
            let d = c.compute().unwrap();
            (d.leaves(), d.heights(), d.to_string())
        };
        assert_eq!(run(1), run(8));
    }

    #[test]
    fn test_separated_groups() {
        // {0, 1, 2} and {3, 4} are similar within, dissimilar across
        let group = |i: usize| if i < 3 { 0 } else { 1 };
        let m = SimilarityMatrix::new(5);
        for i in 0..5 {
            for j in (i + 1)..5 {
                let v = if group(i) == group(j) { 0.9 - 0.01 * (i + j) as f64 } else { 0.1 };
                m.set(i, j, v).unwrap();
            }
        }
        let mut c = Clustering::new(m, datasets(5)).unwrap().with_concurrency(3);
        let d = c.compute().unwrap();
        let level1: Vec<Vec<String>> = d
            .get_clusters(1)
            .iter()
            .map(|c| {
                let mut paths: Vec<String> = c.iter().map(|d| d.to_string()).collect();
                paths.sort();
                paths
            })
            .collect();
        assert_eq!(level1.len(), 2);
        assert!(level1.contains(&vec!["d0".to_string(), "d1".to_string(), "d2".to_string()]));
        assert!(level1.contains(&vec!["d3".to_string(), "d4".to_string()]));
    }

    #[test]
    fn test_partial_matrix_still_completes() {
        let n = 6;
        let m = SimilarityMatrix::new(n);
        m.set(0, 1, 0.8).unwrap();
        m.set(2, 3, 0.6).unwrap();
        let all = datasets(n);
        let mut c = Clustering::new(m, all.clone()).unwrap().with_concurrency(2);
        let d = c.compute().unwrap();
        assert_eq!(d.merges(), n - 1);
        assert_partition(&d.get_clusters(2), &all);
        assert!(c.results().is_some());
    }

    #[test]
    fn test_single_dataset() {
        let mut c = Clustering::new(SimilarityMatrix::new(1), datasets(1)).unwrap();
        let d = c.compute().unwrap();
        assert_eq!(d.merges(), 0);
        assert_eq!(d.get_clusters(0).len(), 1);
    }

    fn tied_matrix(n: usize, seed: u64) -> SimilarityMatrix {
        const LEVELS: [f64; 5] = [0.1, 0.2, 0.3, 0.7, 0.6];
        let mut rng = StdRng::seed_from_u64(seed);
        let m = SimilarityMatrix::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                m.set(i, j, LEVELS[rng.random_range(0..LEVELS.len())]).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_pair_similarity_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(11);
        for seed in 0..2000 {
            let c = Clustering::new(random_matrix(6, seed), datasets(6)).unwrap();
            let (a, b) = ([0, 1, 2], [3, 4, 5]);
            let (id_a, id_b) = (rng.random_range(0..3), rng.random_range(3..6));
            assert_eq!(
                c.pair_similarity((id_a, &a[..]), (id_b, &b[..])).map(f64::to_bits),
                c.pair_similarity((id_b, &b[..]), (id_a, &a[..])).map(f64::to_bits)
            );
        }
    }

    #[test]
    fn test_tied_similarities_always_complete() {
        let mut rng = StdRng::seed_from_u64(5872);
        for seed in (0..1500).chain([5872]) {
            let n = rng.random_range(5..10);
            let all = datasets(n);
            let mut c = Clustering::new(tied_matrix(n, seed), all.clone())
                .unwrap()
                .with_concurrency(3);
            let d = c.compute().unwrap_or_else(|e| panic!("seed {}: {}", seed, e));
            assert_eq!(d.merges(), n - 1, "seed {}", seed);
            assert_partition(&d.get_clusters(1), &all);
        }
    }

    #[test]
    fn test_candidate_order() {
        let high = Candidate::new(0, 3, Some(0.9));
        let low = Candidate::new(0, 1, Some(0.2));
        let none = Candidate::new(0, 2, None);
        assert!(high > low && low > none);
        // equal similarity: the smaller pair wins
        assert!(Candidate::new(2, 1, Some(0.5)) > Candidate::new(2, 4, Some(0.5)));
    }
}
