//! CART decision trees shared by the bagged and boosted ensembles.
//!
//! Trees are stored as a flat node array rooted at index 0. Every node keeps
//! its cover (the weight of training rows that reached it), which the Tree
//! SHAP explainer needs to weigh unseen branches.
//!
//! Two split criteria are supported:
//!
//! - **Gini** over per-row `(legitimate weight, fraud weight)` pairs. Leaves
//!   hold the weighted fraud fraction, so a tree predicts a probability.
//! - **Newton** over per-row `(gradient, hessian)` pairs of the logistic
//!   loss. Leaves hold the shrunken Newton step, so a tree predicts a
//!   log-odds increment.

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Smallest gain that justifies a split
const MIN_SPLIT_GAIN: f64 = 1e-12;

/// A node of a fitted tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `x[feature] <= threshold` go left, the rest go right
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// A fitted binary tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Build a tree from nodes; index 0 must be the root
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Leaf value reached by a single row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Longest root-to-leaf path, counted in splits
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
            }
        }
        walk(&self.nodes, 0)
    }

    /// Cover-weighted mean of the leaf values
    pub fn expected_value(&self) -> f64 {
        let root_cover = self.nodes[0].cover();
        if root_cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Leaf { value, cover } => Some(value * cover),
                Node::Split { .. } => None,
            })
            .sum::<f64>()
            / root_cover
    }
}

/// Per-node sufficient statistics: a pair of summed per-row quantities
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SplitStats {
    pub a: f64,
    pub b: f64,
}

impl SplitStats {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }
}

impl Add for SplitStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.a + other.a, self.b + other.b)
    }
}

impl Sub for SplitStats {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.a - other.a, self.b - other.b)
    }
}

/// How candidate splits are scored and leaves are valued
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitCriterion {
    /// Stats are `(legitimate weight, fraud weight)`
    Gini,
    /// Stats are `(gradient, hessian)`
    Newton {
        reg_lambda: f64,
        min_child_weight: f64,
        learning_rate: f64,
    },
}

impl SplitCriterion {
    /// Node score; a split gains `score(left) + score(right) - score(parent)`
    fn score(&self, stats: SplitStats) -> f64 {
        match *self {
            SplitCriterion::Gini => {
                let total = stats.a + stats.b;
                if total <= 0.0 {
                    0.0
                } else {
                    (stats.a * stats.a + stats.b * stats.b) / total
                }
            }
            SplitCriterion::Newton { reg_lambda, .. } => {
                0.5 * stats.a * stats.a / (stats.b + reg_lambda)
            }
        }
    }

    fn leaf_value(&self, stats: SplitStats) -> f64 {
        match *self {
            SplitCriterion::Gini => {
                let total = stats.a + stats.b;
                if total <= 0.0 {
                    0.0
                } else {
                    stats.b / total
                }
            }
            SplitCriterion::Newton {
                reg_lambda,
                learning_rate,
                ..
            } => -learning_rate * stats.a / (stats.b + reg_lambda),
        }
    }

    fn cover(&self, stats: SplitStats) -> f64 {
        match self {
            SplitCriterion::Gini => stats.a + stats.b,
            SplitCriterion::Newton { .. } => stats.b,
        }
    }

    fn child_allowed(&self, stats: SplitStats) -> bool {
        match *self {
            SplitCriterion::Gini => stats.a + stats.b > 0.0,
            SplitCriterion::Newton {
                min_child_weight, ..
            } => stats.b >= min_child_weight,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Greedy depth-first CART builder over a borrowed feature matrix
pub struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    stats: &'a [SplitStats],
    criterion: SplitCriterion,
    max_depth: usize,
    features: Vec<usize>,
    max_features: Option<usize>,
}

impl<'a> TreeBuilder<'a> {
    /// `stats[i]` holds the per-row statistics of row `i` of `x`
    pub fn new(
        x: ArrayView2<'a, f64>,
        stats: &'a [SplitStats],
        criterion: SplitCriterion,
        max_depth: usize,
    ) -> Self {
        Self {
            features: (0..x.ncols()).collect(),
            x,
            stats,
            criterion,
            max_depth,
            max_features: None,
        }
    }

    /// Restrict the columns this tree may split on
    pub fn with_features(mut self, features: Vec<usize>) -> Self {
        self.features = features;
        self
    }

    /// Draw this many candidate columns at every node
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Grow a tree over the given training rows
    pub fn build<R: Rng>(&self, rows: &[usize], rng: &mut R) -> Tree {
        let mut rows = rows.to_vec();
        let mut nodes = Vec::new();
        self.grow(&mut rows, 0, &mut nodes, rng);
        Tree { nodes }
    }

    fn grow<R: Rng>(
        &self,
        rows: &mut [usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut R,
    ) -> usize {
        let total = rows
            .iter()
            .fold(SplitStats::default(), |acc, &r| acc + self.stats[r]);
        let cover = self.criterion.cover(total);
        let idx = nodes.len();
        nodes.push(Node::Leaf {
            value: self.criterion.leaf_value(total),
            cover,
        });

        if depth >= self.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.best_split(rows, total, rng) else {
            return idx;
        };

        let mid = partition(rows, |r| self.x[[r, split.feature]] <= split.threshold);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1, nodes, rng);
        let right = self.grow(right_rows, depth + 1, nodes, rng);

        nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            cover,
        };
        idx
    }

    fn best_split<R: Rng>(&self, rows: &[usize], total: SplitStats, rng: &mut R) -> Option<Split> {
        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < self.features.len() => {
                rand::seq::index::sample(rng, self.features.len(), k)
                    .into_iter()
                    .map(|i| self.features[i])
                    .collect()
            }
            _ => self.features.clone(),
        };

        let parent_score = self.criterion.score(total);

        // Ties keep the earliest candidate so the result is order-stable
        candidates
            .par_iter()
            .filter_map(|&feature| self.best_split_for_feature(rows, feature, total, parent_score))
            .reduce_with(|best, next| if next.gain > best.gain { next } else { best })
    }

    fn best_split_for_feature(
        &self,
        rows: &[usize],
        feature: usize,
        total: SplitStats,
        parent_score: f64,
    ) -> Option<Split> {
        let column = self.x.column(feature);
        let mut order = rows.to_vec();
        order.sort_unstable_by(|&a, &b| column[a].total_cmp(&column[b]));

        let mut left = SplitStats::default();
        let mut best: Option<Split> = None;

        for pos in 0..order.len() - 1 {
            left = left + self.stats[order[pos]];
            let value = column[order[pos]];
            let next = column[order[pos + 1]];
            if next <= value {
                continue;
            }

            let right = total - left;
            if !self.criterion.child_allowed(left) || !self.criterion.child_allowed(right) {
                continue;
            }

            let gain = self.criterion.score(left) + self.criterion.score(right) - parent_score;
            if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(Split {
                    feature,
                    threshold,
                    gain,
                });
            }
        }

        best
    }
}

/// Move rows matching `goes_left` to the front; returns how many matched
fn partition<F: Fn(usize) -> bool>(rows: &mut [usize], goes_left: F) -> usize {
    let mut boundary = 0;
    for i in 0..rows.len() {
        if goes_left(rows[i]) {
            rows.swap(boundary, i);
            boundary += 1;
        }
    }
    boundary
}
