use crate::error::{MatchError, MatchResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use simsearch_core::{Descriptor, DESCRIPTOR_LEN};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Points sampled when estimating split variances
const VARIANCE_SAMPLE: usize = 100;
/// Split dimension is drawn among this many highest-variance dimensions
const TOP_DIMENSIONS: usize = 5;

/// Randomized k-d forest parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct IndexParams {
    /// Number of independently randomized trees
    pub trees: usize,
    /// Leaf points examined per query before the search stops
    pub checks: usize,
    /// Maximum points stored in one leaf
    pub leaf_size: usize,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            trees: 5,
            checks: 50,
            leaf_size: 1,
            seed: 0x5eed_5eed,
        }
    }
}

impl IndexParams {
    pub fn validate(&self) -> MatchResult<()> {
        if self.trees == 0 {
            return Err(MatchError::InvalidParams("trees must be at least 1".into()));
        }
        if self.checks == 0 {
            return Err(MatchError::InvalidParams("checks must be at least 1".into()));
        }
        if self.leaf_size == 0 {
            return Err(MatchError::InvalidParams("leaf_size must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { start: usize, end: usize },
    Split { dim: usize, value: f32, left: usize, right: usize },
}

/// One tree; leaves reference ranges of `order`
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
    order: Vec<usize>,
}

impl Tree {
    fn build(points: &[Descriptor], leaf_size: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(2 * points.len() / leaf_size + 1),
            order: (0..points.len()).collect(),
        };
        let mut order = std::mem::take(&mut tree.order);
        tree.build_node(points, &mut order, 0, leaf_size, rng);
        tree.order = order;
        tree
    }

    fn build_node(
        &mut self,
        points: &[Descriptor],
        idx: &mut [usize],
        offset: usize,
        leaf_size: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        let leaf = Node::Leaf {
            start: offset,
            end: offset + idx.len(),
        };
        self.nodes.push(leaf);
        if idx.len() <= leaf_size {
            return id;
        }

        let Some(dim) = Self::choose_dimension(points, idx, rng) else {
            return id;
        };
        let value = idx.iter().map(|&i| points[i][dim]).sum::<f32>() / idx.len() as f32;

        let mut split = 0;
        for j in 0..idx.len() {
            if points[idx[j]][dim] < value {
                idx.swap(split, j);
                split += 1;
            }
        }
        if split == 0 || split == idx.len() {
            return id;
        }

        let (lo, hi) = idx.split_at_mut(split);
        let left = self.build_node(points, lo, offset, leaf_size, rng);
        let right = self.build_node(points, hi, offset + split, leaf_size, rng);
        self.nodes[id] = Node::Split { dim, value, left, right };
        id
    }

    /// Random pick among the highest-variance dimensions; `None` when all sampled points coincide
    fn choose_dimension(points: &[Descriptor], idx: &[usize], rng: &mut StdRng) -> Option<usize> {
        let sample = &idx[..idx.len().min(VARIANCE_SAMPLE)];
        let n = sample.len() as f32;
        let mut mean = [0.0f32; DESCRIPTOR_LEN];
        for &i in sample {
            for (m, v) in mean.iter_mut().zip(points[i].iter()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = [0.0f32; DESCRIPTOR_LEN];
        for &i in sample {
            for ((acc, v), m) in var.iter_mut().zip(points[i].iter()).zip(mean.iter()) {
                *acc += (v - m) * (v - m);
            }
        }

        let mut dims: Vec<usize> = (0..DESCRIPTOR_LEN).collect();
        dims.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then(a.cmp(&b)));
        let top: Vec<usize> = dims
            .into_iter()
            .take(TOP_DIMENSIONS)
            .filter(|&d| var[d] > 0.0)
            .collect();
        if top.is_empty() {
            return None;
        }
        Some(top[rng.random_range(0..top.len())])
    }
}

/// Unexplored subtree, ordered by its accumulated split distance
#[derive(Debug, Clone, Copy)]
struct Branch {
    bound: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl Ord for Branch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .total_cmp(&other.bound)
            .then(self.tree.cmp(&other.tree))
            .then(self.node.cmp(&other.node))
    }
}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Two closest points seen so far, squared distances
#[derive(Debug, Default)]
struct BestTwo {
    hits: Vec<(usize, f32)>,
}

impl BestTwo {
    fn offer(&mut self, index: usize, dist: f32) {
        if self.hits.len() == 2 && dist >= self.hits[1].1 {
            return;
        }
        let pos = self.hits.iter().position(|&(_, d)| dist < d).unwrap_or(self.hits.len());
        self.hits.insert(pos, (index, dist));
        self.hits.truncate(2);
    }

    fn is_full(&self) -> bool {
        self.hits.len() == 2
    }
}

/// Per-query search state
struct Search<'q> {
    query: &'q Descriptor,
    heap: BinaryHeap<Reverse<Branch>>,
    best: BestTwo,
    seen: HashSet<usize>,
    checks: usize,
}

/// Approximate nearest-neighbour index over one descriptor set
#[derive(Debug, Clone)]
pub struct DescriptorIndex {
    points: Vec<Descriptor>,
    trees: Vec<Tree>,
    checks: usize,
}

impl DescriptorIndex {
    /// Build a forest over `points`; trees are built in parallel from per-tree seeds
    pub fn build(points: &[Descriptor], params: &IndexParams) -> MatchResult<Self> {
        params.validate()?;
        let trees = if points.is_empty() {
            Vec::new()
        } else {
            (0..params.trees)
                .into_par_iter()
                .map(|t| {
                    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(t as u64));
                    Tree::build(points, params.leaf_size, &mut rng)
                })
                .collect()
        };
        Ok(Self {
            points: points.to_vec(),
            trees,
            checks: params.checks,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Two nearest indexed points as `(index, euclidean distance)`, nearest first.
    /// `None` when fewer than two points were reached.
    pub fn knn2(&self, query: &Descriptor) -> Option<[(usize, f32); 2]> {
        if self.points.len() < 2 {
            return None;
        }
        let mut search = Search {
            query,
            heap: BinaryHeap::new(),
            best: BestTwo::default(),
            seen: HashSet::new(),
            checks: 0,
        };

        for t in 0..self.trees.len() {
            self.descend(&mut search, t, 0, 0.0);
        }
        while let Some(Reverse(branch)) = search.heap.pop() {
            if search.checks >= self.checks && search.best.is_full() {
                break;
            }
            self.descend(&mut search, branch.tree, branch.node, branch.bound);
        }

        match search.best.hits.as_slice() {
            [(a, da), (b, db)] => Some([(*a, da.sqrt()), (*b, db.sqrt())]),
            _ => None,
        }
    }

    /// Follow the closer child to a leaf, queueing the farther ones
    fn descend(&self, search: &mut Search<'_>, tree: usize, mut node: usize, bound: f32) {
        let nodes = &self.trees[tree].nodes;
        loop {
            match nodes[node] {
                Node::Split { dim, value, left, right } => {
                    let diff = search.query[dim] - value;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    search.heap.push(Reverse(Branch {
                        bound: bound + diff * diff,
                        tree,
                        node: far,
                    }));
                    node = near;
                }
                Node::Leaf { start, end } => {
                    if search.checks >= self.checks && search.best.is_full() {
                        return;
                    }
                    for &i in &self.trees[tree].order[start..end] {
                        if search.seen.insert(i) {
                            search.checks += 1;
                            search.best.offer(i, squared_distance(search.query, &self.points[i]));
                        }
                    }
                    return;
                }
            }
        }
    }
}

#[inline]
pub fn squared_distance(a: &Descriptor, b: &Descriptor) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}
