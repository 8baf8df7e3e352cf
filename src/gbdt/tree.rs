use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    // rows with `x[feature] < threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: NodeId,
        right: NodeId,
    },
    Leaf(f64),
}

/// A regression tree stored as a flat node arena rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => id = if row[feature] < threshold { left } else { right },
                Node::Leaf(value) => return value,
            }
        }
    }

    /// Children always come after their parent, so a well-formed tree has no cycles.
    pub fn is_well_formed(&self, num_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(id, node)| match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    feature < num_features
                        && !threshold.is_nan()
                        && left > id
                        && right > id
                        && left < self.nodes.len()
                        && right < self.nodes.len()
                }
                Node::Leaf(value) => value.is_finite(),
            })
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf(_)))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: NodeId) -> usize {
            match nodes[id] {
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
                Node::Leaf(_) => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one second-order tree from per-row gradients and hessians.
pub struct TreeBuilder<'a> {
    params: TreeParams,
    rows: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    num_features: usize,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(params: TreeParams, rows: &'a [Vec<f64>], grad: &'a [f64], hess: &'a [f64]) -> Self {
        let num_features = rows.first().map(Vec::len).unwrap_or(0);
        Self {
            params,
            rows,
            grad,
            hess,
            num_features,
        }
    }

    pub fn build(&self) -> Tree {
        let indices: Vec<usize> = (0..self.rows.len()).collect();
        let mut nodes = vec![];
        self.grow(&mut nodes, &indices, 0);
        Tree::new(nodes)
    }

    fn grow(&self, nodes: &mut Vec<Node>, indices: &[usize], depth: usize) -> NodeId {
        let (g, h) = self.sums(indices);
        let id = nodes.len();
        nodes.push(Node::Leaf(self.leaf_weight(g, h)));

        if depth >= self.params.max_depth || indices.len() < 2 {
            return id;
        }
        let Some(best) = self.best_split(indices, g, h) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.rows[i][best.feature] < best.threshold);
        let left = self.grow(nodes, &left, depth + 1);
        let right = self.grow(nodes, &right, depth + 1);
        nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    // Features are searched in parallel; ties keep the lowest feature index.
    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let candidates: Vec<Option<Candidate>> = (0..self.num_features)
            .into_par_iter()
            .map(|feature| self.best_split_for(feature, indices, g, h))
            .collect();

        candidates
            .into_iter()
            .flatten()
            .fold(None, |best: Option<Candidate>, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            })
    }

    fn best_split_for(&self, feature: usize, indices: &[usize], g: f64, h: f64) -> Option<Candidate> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

        let parent = self.score(g, h);
        let mut best: Option<Candidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for pair in sorted.windows(2) {
            let (i, next) = (pair[0], pair[1]);
            gl += self.grad[i];
            hl += self.hess[i];

            let lo = self.rows[i][feature];
            let hi = self.rows[next][feature];
            if lo == hi {
                continue;
            }
            let (gr, hr) = (g - gl, h - hl);
            if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                continue;
            }

            let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
            if gain <= 0.0 || best.is_some_and(|b| b.gain >= gain) {
                continue;
            }
            let mut threshold = lo + (hi - lo) / 2.0;
            if threshold <= lo {
                threshold = hi;
            }
            best = Some(Candidate {
                feature,
                threshold,
                gain,
            });
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 3,
            min_child_weight: 1.0,
            reg_lambda: 0.0,
            gamma: 0.0,
            learning_rate: 1.0,
        }
    }

    #[test]
    fn test_predict_traversal() {
        // x0 < 5 ? (x1 < 1 ? 10 : 20) : 30
        let tree = Tree::new(vec![
            Node::Split {
                feature: 0,
                threshold: 5.0,
                left: 1,
                right: 4,
            },
            Node::Split {
                feature: 1,
                threshold: 1.0,
                left: 2,
                right: 3,
            },
            Node::Leaf(10.0),
            Node::Leaf(20.0),
            Node::Leaf(30.0),
        ]);
        assert_eq!(tree.predict(&[4.0, 0.0]), 10.0);
        assert_eq!(tree.predict(&[4.0, 1.0]), 20.0);
        assert_eq!(tree.predict(&[5.0, 0.0]), 30.0);
        assert_eq!(tree.num_leaves(), 3);
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_builder_learns_step() {
        // squared error with prediction 0: grad = -y, hess = 1
        let rows: Vec<Vec<f64>> = (0..8).map(|x| vec![x as f64]).collect();
        let labels = [1.0, 1.0, 1.0, 1.0, 9.0, 9.0, 9.0, 9.0];
        let grad: Vec<f64> = labels.iter().map(|y| -y).collect();
        let hess = vec![1.0; 8];

        let tree = TreeBuilder::new(params(), &rows, &grad, &hess).build();
        match tree.nodes()[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(feature, 0);
                assert_eq!(threshold, 3.5);
            }
            Node::Leaf(_) => panic!("expected a split at the root"),
        }
        assert_eq!(tree.predict(&[0.0]), 1.0);
        assert_eq!(tree.predict(&[7.0]), 9.0);
    }

    #[test]
    fn test_picks_informative_feature() {
        // feature 0 is noise, feature 1 carries the signal
        let rows = vec![
            vec![3.0, 0.0],
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 1.0],
            vec![1.0, 1.0],
            vec![2.0, 1.0],
        ];
        let grad = vec![2.0, 2.0, 2.0, -2.0, -2.0, -2.0];
        let hess = vec![1.0; 6];
        let tree = TreeBuilder::new(params(), &rows, &grad, &hess).build();
        assert!(matches!(tree.nodes()[0], Node::Split { feature: 1, .. }));
    }

    #[test]
    fn test_constant_gradients_make_a_stump() {
        let rows: Vec<Vec<f64>> = (0..4).map(|x| vec![x as f64]).collect();
        let grad = vec![-2.0; 4];
        let hess = vec![1.0; 4];
        let tree = TreeBuilder::new(params(), &rows, &grad, &hess).build();
        assert_eq!(tree.nodes(), &[Node::Leaf(2.0)]);
    }

    #[test]
    fn test_respects_max_depth() {
        let rows: Vec<Vec<f64>> = (0..64).map(|x| vec![x as f64]).collect();
        let grad: Vec<f64> = (0..64).map(|x| -((x * 7 % 13) as f64)).collect();
        let hess = vec![1.0; 64];
        let tree = TreeBuilder::new(
            TreeParams {
                max_depth: 2,
                ..params()
            },
            &rows,
            &grad,
            &hess,
        )
        .build();
        assert!(tree.depth() <= 2);
    }
}
