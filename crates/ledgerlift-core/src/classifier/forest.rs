//! Random forest over dense feature vectors
//!
//! CART-style trees with Gini impurity, bootstrap bagging, and per-node
//! feature subsampling. Everything is driven by a caller-seeded RNG so a
//! given training set always produces the same forest.

use rand::rngs::StdRng;
use rand::Rng;

/// Forest hyperparameters
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 25,
            max_depth: 16,
            min_samples_split: 2,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Trained ensemble
#[derive(Debug)]
pub struct RandomForest {
    trees: Vec<Node>,
    n_classes: usize,
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let mut sum_sq = 0.0;
    for &c in counts {
        let p = c as f64 / total as f64;
        sum_sq += p * p;
    }
    1.0 - sum_sq
}

fn class_counts(y: &[usize], idx: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in idx {
        counts[y[i]] += 1;
    }
    counts
}

fn majority(counts: &[usize]) -> usize {
    let mut best = 0;
    for (class, &c) in counts.iter().enumerate() {
        if c > counts[best] {
            best = class;
        }
    }
    best
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    n_feature_candidates: usize,
    config: &'a ForestConfig,
}

impl<'a> TreeBuilder<'a> {
    fn build(&self, idx: &[usize], depth: usize, rng: &mut StdRng) -> Node {
        let counts = class_counts(self.y, idx, self.n_classes);
        let node_gini = gini(&counts, idx.len());

        if node_gini == 0.0
            || depth >= self.config.max_depth
            || idx.len() < self.config.min_samples_split
        {
            return Node::Leaf {
                class: majority(&counts),
            };
        }

        let n_features = self.x[0].len();
        if n_features == 0 {
            return Node::Leaf {
                class: majority(&counts),
            };
        }
        let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, gain)

        for _ in 0..self.n_feature_candidates {
            let feature = rng.gen_range(0..n_features);

            let mut values: Vec<f64> = idx.iter().map(|&i| self.x[i][feature]).collect();
            values.sort_by(f64::total_cmp);
            values.dedup();
            if values.len() < 2 {
                continue;
            }

            // Cap candidate thresholds to keep node cost bounded
            let step = (values.len() / 8).max(1);
            for w in (0..values.len() - 1).step_by(step) {
                let threshold = (values[w] + values[w + 1]) / 2.0;

                let mut left_counts = vec![0; self.n_classes];
                let mut right_counts = vec![0; self.n_classes];
                let mut left_total = 0;
                let mut right_total = 0;
                for &i in idx {
                    if self.x[i][feature] <= threshold {
                        left_counts[self.y[i]] += 1;
                        left_total += 1;
                    } else {
                        right_counts[self.y[i]] += 1;
                        right_total += 1;
                    }
                }
                if left_total == 0 || right_total == 0 {
                    continue;
                }

                let weighted = (left_total as f64 * gini(&left_counts, left_total)
                    + right_total as f64 * gini(&right_counts, right_total))
                    / idx.len() as f64;
                let gain = node_gini - weighted;
                if gain > best.map(|(_, _, g)| g).unwrap_or(1e-12) {
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let (feature, threshold, _) = match best {
            Some(b) => b,
            None => {
                return Node::Leaf {
                    class: majority(&counts),
                }
            }
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = idx
            .iter()
            .copied()
            .partition(|&i| self.x[i][feature] <= threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&left_idx, depth + 1, rng)),
            right: Box::new(self.build(&right_idx, depth + 1, rng)),
        }
    }
}

impl RandomForest {
    /// Train on dense rows `x` with class ids `y` in `0..n_classes`
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        config: &ForestConfig,
        rng: &mut StdRng,
    ) -> Self {
        assert!(!x.is_empty() && x.len() == y.len());
        let n_features = x[0].len();
        let builder = TreeBuilder {
            x,
            y,
            n_classes,
            // sqrt(n_features) candidates per node, the usual forest default
            n_feature_candidates: ((n_features as f64).sqrt().ceil() as usize).max(1),
            config,
        };

        let mut trees = Vec::with_capacity(config.n_trees);
        for _ in 0..config.n_trees {
            let bootstrap: Vec<usize> = (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect();
            trees.push(builder.build(&bootstrap, 0, rng));
        }

        Self { trees, n_classes }
    }

    fn descend(node: &Node, row: &[f64]) -> usize {
        match node {
            Node::Leaf { class } => *class,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    Self::descend(left, row)
                } else {
                    Self::descend(right, row)
                }
            }
        }
    }

    /// Majority vote across trees; ties resolve to the lowest class id
    pub fn predict(&self, row: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[Self::descend(tree, row)] += 1;
        }
        majority(&votes)
    }
}
