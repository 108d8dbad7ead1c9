use pine_dataset::Sample;
use serde::{Deserialize, Serialize};

/// Trees are stored as a `Vec` of `Node`s with the root at index 0. Branches refer to their children by index into the `Vec`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
	pub nodes: Vec<Node>,
}

/// A node is either a branch or a leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
	Branch(BranchNode),
	Leaf(LeafNode),
}

/// A `BranchNode` tests one attribute and sends each sample to one of its children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchNode {
	pub split: BranchSplit,
	/// The best class of the training samples that reached this node. Pruning turns the branch into a leaf predicting this class.
	pub prediction: usize,
	/// Builders that support pruning record the node's alpha and sample count here.
	pub pruning: Option<Pruning>,
}

/// The values pruning compares against its thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pruning {
	pub alpha: f64,
	pub n_samples: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BranchSplit {
	Nominal(NominalSplit),
	Ordered(OrderedSplit),
}

/// A nominal split maps each attribute code to a child. Several codes may share a child, and a code with no child is a code the node has no answer for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NominalSplit {
	pub attribute_index: usize,
	pub child_indices: Vec<Option<usize>>,
}

/// An ordered split sends samples whose code is `<= threshold` left and the rest right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderedSplit {
	pub attribute_index: usize,
	pub threshold: usize,
	pub left_child_index: usize,
	pub right_child_index: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafNode {
	pub class_index: usize,
}

impl BranchNode {
	pub fn attribute_index(&self) -> usize {
		match &self.split {
			BranchSplit::Nominal(split) => split.attribute_index,
			BranchSplit::Ordered(split) => split.attribute_index,
		}
	}

	/// The indices of this node's distinct children, in code order.
	pub fn child_indices(&self) -> Vec<usize> {
		match &self.split {
			BranchSplit::Nominal(split) => {
				let mut child_indices = Vec::new();
				for child_index in split.child_indices.iter().flatten() {
					if !child_indices.contains(child_index) {
						child_indices.push(*child_index);
					}
				}
				child_indices
			}
			BranchSplit::Ordered(split) => vec![split.left_child_index, split.right_child_index],
		}
	}

	/// The child a sample with `code` is sent to, if any.
	pub fn child_for_code(&self, code: usize) -> Option<usize> {
		match &self.split {
			BranchSplit::Nominal(split) => split.child_indices.get(code).copied().flatten(),
			BranchSplit::Ordered(split) => Some(if code <= split.threshold {
				split.left_child_index
			} else {
				split.right_child_index
			}),
		}
	}
}

impl Tree {
	/// Predict the class for a sample. Returns `None` if the sample reaches a nominal branch with no child for its code.
	pub fn classify(&self, sample: &Sample) -> Option<usize> {
		let mut node_index = 0;
		loop {
			match &self.nodes[node_index] {
				Node::Branch(branch) => {
					node_index = branch.child_for_code(sample.code(branch.attribute_index()))?;
				}
				Node::Leaf(leaf) => return Some(leaf.class_index),
			}
		}
	}

	/// The number of nodes. Children shared by several codes are counted once.
	pub fn size(&self) -> usize {
		self.nodes.len()
	}

	/// The number of branches on the longest path from the root to a leaf.
	pub fn depth(&self) -> usize {
		fn depth(tree: &Tree, node_index: usize) -> usize {
			match &tree.nodes[node_index] {
				Node::Leaf(_) => 0,
				Node::Branch(branch) => {
					1 + branch
						.child_indices()
						.into_iter()
						.map(|child_index| depth(tree, child_index))
						.max()
						.unwrap_or(0)
				}
			}
		}
		depth(self, 0)
	}
}

/// How a branch assigns attribute codes to children while a tree is being grown.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitRule {
	/// One child per code.
	Nominal,
	/// Samples with `code` go to the first child and all others to the second.
	NominalBinary { code: usize },
	/// Samples with a code `<= threshold` go to the first child and all others to the second.
	Ordered { threshold: usize },
}

impl SplitRule {
	pub fn n_children(&self, attribute_size: usize) -> usize {
		match self {
			SplitRule::Nominal => attribute_size,
			SplitRule::NominalBinary { .. } | SplitRule::Ordered { .. } => 2,
		}
	}

	pub fn child_index(&self, code: usize) -> usize {
		match self {
			SplitRule::Nominal => code,
			SplitRule::NominalBinary { code: split_code } => {
				if code == *split_code {
					0
				} else {
					1
				}
			}
			SplitRule::Ordered { threshold } => {
				if code <= *threshold {
					0
				} else {
					1
				}
			}
		}
	}
}

/// The recursive form builders grow before it is flattened into a `Tree`.
#[derive(Clone, Debug)]
pub enum TrainNode {
	Branch(TrainBranchNode),
	Leaf(TrainLeafNode),
}

#[derive(Clone, Debug)]
pub struct TrainBranchNode {
	pub attribute_index: usize,
	pub attribute_size: usize,
	pub rule: SplitRule,
	pub children: Vec<TrainNode>,
	pub prediction: usize,
	pub pruning: Option<Pruning>,
}

#[derive(Clone, Debug)]
pub struct TrainLeafNode {
	pub class_index: usize,
}

impl TrainNode {
	pub fn leaf(class_index: usize) -> TrainNode {
		TrainNode::Leaf(TrainLeafNode { class_index })
	}
}

impl From<TrainNode> for Tree {
	fn from(root: TrainNode) -> Tree {
		let mut nodes = Vec::new();
		add_node(&mut nodes, root);
		Tree { nodes }
	}
}

/// Append `node` and its descendants in preorder and return its index.
fn add_node(nodes: &mut Vec<Node>, node: TrainNode) -> usize {
	let node_index = nodes.len();
	match node {
		TrainNode::Leaf(TrainLeafNode { class_index }) => {
			nodes.push(Node::Leaf(LeafNode { class_index }));
		}
		TrainNode::Branch(TrainBranchNode {
			attribute_index,
			attribute_size,
			rule,
			children,
			prediction,
			pruning,
		}) => {
			// Reserve this node's slot so that it precedes its children.
			nodes.push(Node::Leaf(LeafNode {
				class_index: prediction,
			}));
			let child_indices: Vec<usize> = children
				.into_iter()
				.map(|child| add_node(nodes, child))
				.collect();
			let split = match rule {
				SplitRule::Nominal => BranchSplit::Nominal(NominalSplit {
					attribute_index,
					child_indices: (0..attribute_size)
						.map(|code| child_indices.get(code).copied())
						.collect(),
				}),
				SplitRule::NominalBinary { code: split_code } => BranchSplit::Nominal(NominalSplit {
					attribute_index,
					child_indices: (0..attribute_size)
						.map(|code| {
							if code == split_code {
								Some(child_indices[0])
							} else {
								Some(child_indices[1])
							}
						})
						.collect(),
				}),
				SplitRule::Ordered { threshold } => BranchSplit::Ordered(OrderedSplit {
					attribute_index,
					threshold,
					left_child_index: child_indices[0],
					right_child_index: child_indices[1],
				}),
			};
			nodes[node_index] = Node::Branch(BranchNode {
				split,
				prediction,
				pruning,
			});
		}
	}
	node_index
}

#[cfg(test)]
fn two_level() -> Tree {
	TrainNode::Branch(TrainBranchNode {
		attribute_index: 0,
		attribute_size: 3,
		rule: SplitRule::NominalBinary { code: 1 },
		children: vec![
			TrainNode::leaf(1),
			TrainNode::Branch(TrainBranchNode {
				attribute_index: 1,
				attribute_size: 4,
				rule: SplitRule::Ordered { threshold: 1 },
				children: vec![TrainNode::leaf(0), TrainNode::leaf(1)],
				prediction: 0,
				pruning: None,
			}),
		],
		prediction: 0,
		pruning: None,
	})
	.into()
}

#[test]
fn test_flatten() {
	let tree = two_level();
	assert_eq!(tree.size(), 5);
	assert_eq!(tree.depth(), 2);
	match &tree.nodes[0] {
		Node::Branch(branch) => {
			assert_eq!(branch.child_indices(), vec![2, 1]);
			assert_eq!(branch.child_for_code(0), Some(2));
			assert_eq!(branch.child_for_code(1), Some(1));
			assert_eq!(branch.child_for_code(3), None);
		}
		Node::Leaf(_) => panic!("expected a branch"),
	}
}

#[test]
fn test_classify() {
	use ndarray::prelude::*;
	let tree = two_level();
	let benefits = arr1(&[0.0, 0.0]);
	let classify = |codes: &[usize]| {
		let codes = arr1(codes);
		tree.classify(&Sample {
			id: 0,
			codes: codes.view(),
			benefits: benefits.view(),
		})
	};
	assert_eq!(classify(&[1, 3]), Some(1));
	assert_eq!(classify(&[0, 1]), Some(0));
	assert_eq!(classify(&[2, 2]), Some(1));
	// A code the nominal branch has never seen.
	assert_eq!(classify(&[5, 0]), None);
}

#[test]
fn test_serialize() {
	let tree = two_level();
	let json = serde_json::to_string(&tree).unwrap();
	let parsed: Tree = serde_json::from_str(&json).unwrap();
	assert_eq!(parsed, tree);
}
