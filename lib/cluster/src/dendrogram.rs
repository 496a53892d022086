// Binary merge tree over datasets, stored as an arena of nodes.
// Children are always created before their parent, so arena order is a
// valid bottom-up traversal.

use dprof_core::{Dataset, Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DendrogramNode {
    id: usize,
    datasets: Vec<Arc<Dataset>>,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,
}

impl DendrogramNode {
    /// Stable id the node held in the unmerged set
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Datasets below this node, left subtree first
    #[inline]
    pub fn datasets(&self) -> &[Arc<Dataset>] {
        &self.datasets
    }

    #[inline]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> Option<(usize, usize)> {
        self.left.zip(self.right)
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children().is_none()
    }
}

impl fmt::Display for DendrogramNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, d) in self.datasets.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", d)?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dendrogram {
    nodes: Vec<DendrogramNode>,
    /// stable id -> arena index of the mergeable nodes
    unmerged: BTreeMap<usize, usize>,
    root: Option<usize>,
    merges: usize,
}

impl Dendrogram {
    /// One leaf per dataset, leaf `i` holding stable id `i`. A single
    /// dataset is its own root.
    pub fn new(datasets: &[Arc<Dataset>]) -> Self {
        let nodes: Vec<DendrogramNode> = datasets
            .iter()
            .enumerate()
            .map(|(id, d)| DendrogramNode {
                id,
                datasets: vec![d.clone()],
                parent: None,
                left: None,
                right: None,
            })
            .collect();
        let mut dendrogram = Self {
            unmerged: (0..nodes.len()).map(|i| (i, i)).collect(),
            nodes,
            root: None,
            merges: 0,
        };
        if dendrogram.nodes.len() == 1 {
            dendrogram.unmerged.clear();
            dendrogram.root = Some(0);
        }
        dendrogram
    }

    /// True once a single node remains
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&DendrogramNode> {
        self.root.map(|idx| &self.nodes[idx])
    }

    pub fn node(&self, idx: usize) -> Option<&DendrogramNode> {
        self.nodes.get(idx)
    }

    /// Mergeable nodes by ascending stable id
    pub fn unmerged(&self) -> impl Iterator<Item = &DendrogramNode> + '_ {
        self.unmerged.values().map(move |&idx| &self.nodes[idx])
    }

    pub fn unmerged_count(&self) -> usize {
        self.unmerged.len()
    }

    /// Number of merges performed so far
    #[inline]
    pub fn merges(&self) -> usize {
        self.merges
    }

    pub fn leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Merge the unmerged nodes `a` and `b` (stable ids). The new node takes
    /// the lower id and returns its arena index.
    pub fn merge(&mut self, a: usize, b: usize) -> Result<usize> {
        if a == b {
            return Err(Error::NotMergeable(b));
        }
        let left = *self.unmerged.get(&a).ok_or(Error::NotMergeable(a))?;
        let right = *self.unmerged.get(&b).ok_or(Error::NotMergeable(b))?;
        self.unmerged.remove(&a);
        self.unmerged.remove(&b);

        let idx = self.nodes.len();
        let mut datasets = self.nodes[left].datasets.clone();
        datasets.extend(self.nodes[right].datasets.iter().cloned());
        self.nodes[left].parent = Some(idx);
        self.nodes[right].parent = Some(idx);
        let id = a.min(b);
        self.nodes.push(DendrogramNode {
            id,
            datasets,
            parent: None,
            left: Some(left),
            right: Some(right),
        });
        self.merges += 1;

        if self.unmerged.is_empty() {
            self.root = Some(idx);
        } else {
            self.unmerged.insert(id, idx);
        }
        Ok(idx)
    }

    /// Dataset groups at `level`: a depth-first descent from the root that
    /// stops after `level` steps or at a leaf. Level 0 is the whole tree.
    pub fn get_clusters(&self, level: usize) -> Vec<Vec<Arc<Dataset>>> {
        let mut clusters = Vec::new();
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, level)).into_iter().collect();
        while let Some((idx, remaining)) = stack.pop() {
            let node = &self.nodes[idx];
            match node.children() {
                Some((left, right)) if remaining > 0 => {
                    // right pushed first so the left subtree is emitted first
                    stack.push((right, remaining - 1));
                    stack.push((left, remaining - 1));
                }
                _ => clusters.push(node.datasets.clone()),
            }
        }
        clusters
    }

    /// Longest and shortest root-to-leaf path, (0, 0) for a single leaf or
    /// an unfinished tree
    pub fn heights(&self) -> (usize, usize) {
        let root = match self.root {
            Some(root) => root,
            None => return (0, 0),
        };
        let mut heights = vec![(0usize, 0usize); self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some((left, right)) = node.children() {
                let (l, r) = (heights[left], heights[right]);
                heights[idx] = (l.0.max(r.0) + 1, l.1.min(r.1) + 1);
            }
        }
        heights[root]
    }
}

impl fmt::Display for Dendrogram {
    /// One node per line, children indented by a tab
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, 0)).into_iter().collect();
        while let Some((idx, depth)) = stack.pop() {
            let node = &self.nodes[idx];
            writeln!(f, "{}{}", "\t".repeat(depth), node)?;
            if let Some((left, right)) = node.children() {
                stack.push((right, depth + 1));
                stack.push((left, depth + 1));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datasets(n: usize) -> Vec<Arc<Dataset>> {
        (0..n).map(|i| Arc::new(Dataset::new(format!("d{}", i)))).collect()
    }

    fn paths(cluster: &[Arc<Dataset>]) -> Vec<String> {
        cluster.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_single_dataset_is_root() {
        let d = Dendrogram::new(&datasets(1));
        assert!(d.is_complete());
        assert_eq!(d.merges(), 0);
        assert_eq!(d.heights(), (0, 0));
        assert_eq!(d.get_clusters(0).len(), 1);
        assert_eq!(d.get_clusters(5).len(), 1);
    }

    #[test]
    fn test_merge_keeps_lower_id() {
        let mut d = Dendrogram::new(&datasets(3));
        let idx = d.merge(2, 1).unwrap();
        assert_eq!(d.node(idx).unwrap().id(), 1);
        assert_eq!(d.unmerged_count(), 2);
        assert!(!d.is_complete());
        let ids: Vec<usize> = d.unmerged().map(|n| n.id()).collect();
        assert_eq!(ids, vec![0, 1]);

        d.merge(0, 1).unwrap();
        assert!(d.is_complete());
        assert_eq!(d.merges(), 2);
        assert_eq!(paths(d.root().unwrap().datasets()), vec!["d0", "d2", "d1"]);
    }

    #[test]
    fn test_merge_unknown_node() {
        let mut d = Dendrogram::new(&datasets(3));
        assert!(matches!(d.merge(0, 7), Err(Error::NotMergeable(7))));
        assert!(matches!(d.merge(1, 1), Err(Error::NotMergeable(1))));
        d.merge(0, 1).unwrap();
        // id 1 was folded into id 0
        assert!(matches!(d.merge(1, 2), Err(Error::NotMergeable(1))));
        assert_eq!(d.unmerged_count(), 2);
    }

    #[test]
    fn test_clusters_by_level() {
        // ((d0 d1) (d2 (d3 d4)))
        let mut d = Dendrogram::new(&datasets(5));
        d.merge(0, 1).unwrap();
        d.merge(3, 4).unwrap();
        d.merge(2, 3).unwrap();
        d.merge(0, 2).unwrap();

        assert_eq!(d.heights(), (3, 2));
        assert_eq!(d.leaves(), 5);

        let level0 = d.get_clusters(0);
        assert_eq!(level0.len(), 1);
        assert_eq!(level0[0].len(), 5);

        let level1: Vec<Vec<String>> = d.get_clusters(1).iter().map(|c| paths(c)).collect();
        assert_eq!(level1, vec![vec!["d0", "d1"], vec!["d2", "d3", "d4"]]);

        let level2: Vec<Vec<String>> = d.get_clusters(2).iter().map(|c| paths(c)).collect();
        assert_eq!(level2, vec![vec!["d0"], vec!["d1"], vec!["d2"], vec!["d3", "d4"]]);

        assert_eq!(d.get_clusters(3).len(), 5);
        assert_eq!(d.get_clusters(10).len(), 5);
    }

    #[test]
    fn test_display_indents_children() {
        let mut d = Dendrogram::new(&datasets(2));
        d.merge(0, 1).unwrap();
        assert_eq!(d.to_string(), "{d0,d1}\n\t{d0}\n\t{d1}\n");
    }
}
