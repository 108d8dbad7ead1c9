use crate::tree::{BranchNode, BranchSplit, LeafNode, Node, NominalSplit, OrderedSplit, Tree};
use pine_util::compare;
use std::cmp::Ordering;

/**
Return a copy of `tree` in which every annotated branch whose alpha is greater than `alpha`, or whose sample count is at most `min_samples`, is replaced by a leaf predicting the branch's best class. Other branches are kept and their children pruned the same way. Branches without a pruning annotation are never collapsed. A child shared by several codes of a nominal split stays shared in the result.
*/
pub fn prune(tree: &Tree, alpha: f64, min_samples: usize) -> Tree {
	let mut pruner = Pruner {
		tree,
		alpha,
		min_samples,
		nodes: Vec::new(),
		new_indices: vec![None; tree.nodes.len()],
	};
	pruner.add_node(0);
	Tree {
		nodes: pruner.nodes,
	}
}

struct Pruner<'a> {
	tree: &'a Tree,
	alpha: f64,
	min_samples: usize,
	nodes: Vec<Node>,
	/// The index each node of the original tree was given in `nodes`.
	new_indices: Vec<Option<usize>>,
}

impl<'a> Pruner<'a> {
	fn collapses(&self, branch: &BranchNode) -> bool {
		match branch.pruning {
			Some(pruning) => {
				compare(pruning.alpha, self.alpha) == Ordering::Greater
					|| pruning.n_samples <= self.min_samples
			}
			None => false,
		}
	}

	fn add_node(&mut self, node_index: usize) -> usize {
		if let Some(new_index) = self.new_indices[node_index] {
			return new_index;
		}
		let new_index = self.nodes.len();
		self.new_indices[node_index] = Some(new_index);
		let tree = self.tree;
		let branch = match &tree.nodes[node_index] {
			Node::Leaf(leaf) => {
				self.nodes.push(Node::Leaf(leaf.clone()));
				return new_index;
			}
			Node::Branch(branch) => branch,
		};
		// Reserve the slot so that the node precedes its children.
		self.nodes.push(Node::Leaf(LeafNode {
			class_index: branch.prediction,
		}));
		if self.collapses(branch) {
			return new_index;
		}
		// Children are added in their original order so that an unpruned tree is reproduced exactly.
		let mut child_indices = branch.child_indices();
		child_indices.sort_unstable();
		for child_index in child_indices {
			self.add_node(child_index);
		}
		let split = match &branch.split {
			BranchSplit::Nominal(split) => BranchSplit::Nominal(NominalSplit {
				attribute_index: split.attribute_index,
				child_indices: split
					.child_indices
					.iter()
					.map(|child_index| child_index.map(|child_index| self.add_node(child_index)))
					.collect(),
			}),
			BranchSplit::Ordered(split) => BranchSplit::Ordered(OrderedSplit {
				attribute_index: split.attribute_index,
				threshold: split.threshold,
				left_child_index: self.add_node(split.left_child_index),
				right_child_index: self.add_node(split.right_child_index),
			}),
		};
		self.nodes[new_index] = Node::Branch(BranchNode {
			split,
			prediction: branch.prediction,
			pruning: branch.pruning,
		});
		new_index
	}
}

#[cfg(test)]
use crate::tree::{Pruning, SplitRule, TrainBranchNode, TrainNode};

#[cfg(test)]
fn annotated_branch(
	attribute_index: usize,
	rule: SplitRule,
	children: Vec<TrainNode>,
	prediction: usize,
	alpha: f64,
	n_samples: usize,
) -> TrainNode {
	TrainNode::Branch(TrainBranchNode {
		attribute_index,
		attribute_size: 3,
		rule,
		children,
		prediction,
		pruning: Some(Pruning { alpha, n_samples }),
	})
}

#[cfg(test)]
fn annotated() -> Tree {
	annotated_branch(
		0,
		SplitRule::Ordered { threshold: 0 },
		vec![
			annotated_branch(
				1,
				SplitRule::NominalBinary { code: 2 },
				vec![TrainNode::leaf(0), TrainNode::leaf(1)],
				1,
				0.8,
				10,
			),
			annotated_branch(
				1,
				SplitRule::Ordered { threshold: 1 },
				vec![TrainNode::leaf(1), TrainNode::leaf(0)],
				0,
				0.5,
				30,
			),
		],
		0,
		0.2,
		40,
	)
	.into()
}

#[test]
fn test_prune() {
	let tree = annotated();
	assert_eq!(prune(&tree, 1.0, 0), tree);
	assert_eq!(prune(&tree, 0.6, 0).size(), 5);
	assert_eq!(prune(&tree, 0.4, 0).size(), 3);
	assert_eq!(prune(&tree, 0.1, 0).size(), 1);
	assert_eq!(prune(&tree, 1.0, 10).size(), 5);
	assert_eq!(prune(&tree, 1.0, 40).size(), 1);
	// The original is untouched.
	assert_eq!(tree.size(), 7);
}

#[test]
fn test_prune_keeps_shared_children() {
	let tree = annotated();
	let pruned = prune(&tree, 0.6, 0);
	let branch = match &pruned.nodes[0] {
		Node::Branch(branch) => branch,
		Node::Leaf(_) => panic!("expected a branch"),
	};
	let right = match &pruned.nodes[branch.child_indices()[1]] {
		Node::Branch(branch) => branch,
		Node::Leaf(_) => panic!("expected a branch"),
	};
	match &right.split {
		BranchSplit::Ordered(split) => assert_eq!(split.threshold, 1),
		BranchSplit::Nominal(_) => panic!("expected an ordered split"),
	}
	let unpruned = prune(&tree, 1.0, 0);
	let left = match &unpruned.nodes[1] {
		Node::Branch(branch) => branch,
		Node::Leaf(_) => panic!("expected a branch"),
	};
	match &left.split {
		BranchSplit::Nominal(split) => {
			assert_eq!(split.child_indices, vec![Some(3), Some(3), Some(2)]);
		}
		BranchSplit::Ordered(_) => panic!("expected a nominal split"),
	}
}

#[test]
fn test_prune_is_monotonic() {
	let tree = annotated();
	let alphas = [0.0, 0.1, 0.2, 0.3, 0.5, 0.7, 0.8, 0.9, 1.0];
	let min_samples = [0, 5, 10, 20, 30, 40, 50];
	for min_samples in min_samples.iter() {
		let sizes: Vec<usize> = alphas
			.iter()
			.map(|alpha| prune(&tree, *alpha, *min_samples).size())
			.collect();
		assert!(sizes.windows(2).all(|pair| pair[0] <= pair[1]));
	}
	for alpha in alphas.iter() {
		let sizes: Vec<usize> = min_samples
			.iter()
			.map(|min_samples| prune(&tree, *alpha, *min_samples).size())
			.collect();
		assert!(sizes.windows(2).all(|pair| pair[0] >= pair[1]));
	}
}
