use std::collections::VecDeque;
use std::fmt;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a `Vec<Node>` arena.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node in a tree arena.
///
/// Leaves carry a scalar: the positive-class fraction for forest trees, the
/// additive raw-score update for boosted trees.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Samples with `feature <= threshold` go left.
        threshold: f64,
        /// Index of the left child.
        left: NodeIndex,
        /// Index of the right child.
        right: NodeIndex,
        /// Number of training samples that reached this node.
        n_samples: usize,
    },
    /// A terminal leaf node.
    Leaf {
        /// Leaf output.
        value: f64,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

/// A fitted binary tree stored as an arena with the root at index 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
}

impl Tree {
    /// Return the leaf value reached by `sample`.
    ///
    /// The caller guarantees `sample` has the training feature count.
    #[must_use]
    pub fn value(&self, sample: &[f64]) -> f64 {
        let mut idx = 0usize;
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
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
            }
        }
    }

    /// Return the total number of nodes.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaves.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth. A single root leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0usize;
        let mut queue = VecDeque::from([(0usize, 0usize)]);
        while let Some((idx, d)) = queue.pop_front() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(d),
                Node::Split { left, right, .. } => {
                    queue.push_back((left.index(), d + 1));
                    queue.push_back((right.index(), d + 1));
                }
            }
        }
        max_depth
    }
}

/// Arena builder: reserve a slot for a split before its children exist.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub(crate) fn leaf(&mut self, value: f64, n_samples: usize) -> NodeIndex {
        self.nodes.push(Node::Leaf { value, n_samples });
        NodeIndex::new(self.nodes.len() - 1)
    }

    /// Push a placeholder to be overwritten by [`Arena::set_split`].
    pub(crate) fn reserve(&mut self, n_samples: usize) -> NodeIndex {
        self.leaf(0.0, n_samples)
    }

    pub(crate) fn set_split(
        &mut self,
        at: NodeIndex,
        feature: FeatureIndex,
        threshold: f64,
        left: NodeIndex,
        right: NodeIndex,
    ) {
        let n_samples = self.nodes[at.index()].n_samples();
        self.nodes[at.index()] = Node::Split {
            feature,
            threshold,
            left,
            right,
            n_samples,
        };
    }

    pub(crate) fn finish(self) -> Tree {
        Tree { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree {
        let mut arena = Arena::default();
        let root = arena.reserve(10);
        let left = arena.leaf(0.2, 6);
        let right = arena.leaf(0.9, 4);
        arena.set_split(root, FeatureIndex::new(1), 3.5, left, right);
        arena.finish()
    }

    #[test]
    fn feature_index_display() {
        assert_eq!(format!("{}", FeatureIndex::new(3)), "3");
    }

    #[test]
    fn stump_routes_on_threshold() {
        let tree = stump();
        assert_eq!(tree.value(&[0.0, 3.5]), 0.2);
        assert_eq!(tree.value(&[0.0, 3.6]), 0.9);
    }

    #[test]
    fn stump_shape() {
        let tree = stump();
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.nodes[0].n_samples(), 10);
        assert!(!tree.nodes[0].is_leaf());
    }
}
