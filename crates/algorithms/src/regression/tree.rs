//! CART regression tree
//!
//! Splits minimise the sum of squared errors of the two children. Each node
//! considers a random subset of the features, as in a random forest.

use rand::rngs::StdRng;
use rand::seq::index;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits of a single tree
#[derive(Debug, Clone)]
pub(crate) struct TreeParams {
    /// Features examined per split
    pub max_features: usize,
    /// Minimum rows in each child
    pub min_leaf: usize,
    pub max_depth: Option<usize>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A fitted regression tree, stored as a flat node array rooted at 0
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree on the rows `rows` of (`x`, `y`).
    ///
    /// `rows` may repeat indices (bootstrap). The SSE decrease of every
    /// split is added to `importance[feature]`.
    pub(crate) fn fit(
        x: &[&[f64]],
        y: &[f64],
        rows: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
        importance: &mut [f64],
    ) -> Self {
        let n_features = importance.len();
        let mut nodes = vec![Node::Leaf(0.0)];
        // (node id, rows reaching it, depth)
        let mut stack = vec![(0usize, rows, 0usize)];

        while let Some((id, rows, depth)) = stack.pop() {
            let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len().max(1) as f64;
            let can_split = rows.len() >= 2 * params.min_leaf.max(1)
                && params.max_depth.map_or(true, |d| depth < d);
            let split = if can_split {
                best_split(x, y, &rows, params, n_features, rng)
            } else {
                None
            };

            match split {
                Some(s) => {
                    importance[s.feature] += s.gain;
                    let (l, r): (Vec<usize>, Vec<usize>) =
                        rows.into_iter().partition(|&i| x[i][s.feature] <= s.threshold);
                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf(0.0));
                    nodes.push(Node::Leaf(0.0));
                    nodes[id] = Node::Split {
                        feature: s.feature,
                        threshold: s.threshold,
                        left,
                        right,
                    };
                    stack.push((right, r, depth + 1));
                    stack.push((left, l, depth + 1));
                }
                None => nodes[id] = Node::Leaf(mean),
            }
        }

        Self { nodes }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf(_)))
            .count()
    }
}

fn best_split(
    x: &[&[f64]],
    y: &[f64],
    rows: &[usize],
    params: &TreeParams,
    n_features: usize,
    rng: &mut StdRng,
) -> Option<Split> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
    let parent = total * total / n as f64;
    let parent_sse = total_sq - parent;
    if parent_sse <= 1e-12 * total_sq.max(1.0) {
        return None;
    }

    let min_leaf = params.min_leaf.max(1);
    let mtry = params.max_features.clamp(1, n_features);
    let mut best: Option<Split> = None;
    let mut best_gain = 1e-9 * parent_sse;
    let mut order = rows.to_vec();

    for feature in index::sample(rng, n_features, mtry).iter() {
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += y[order[k]];
            let n_left = k + 1;
            let n_right = n - n_left;
            if n_left < min_leaf {
                continue;
            }
            if n_right < min_leaf {
                break;
            }
            let (a, b) = (x[order[k]][feature], x[order[k + 1]][feature]);
            if a >= b {
                continue;
            }

            let right_sum = total - left_sum;
            let gain =
                left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64 - parent;
            if gain > best_gain {
                let mid = 0.5 * (a + b);
                best_gain = gain;
                best = Some(Split {
                    feature,
                    threshold: if mid < b { mid } else { a },
                    gain,
                });
            }
        }
    }

    best
}
