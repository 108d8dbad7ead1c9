use crate::tree::{Pruning, SplitRule, TrainBranchNode, TrainNode};
use pine_dataset::Dataset;
use rayon::prelude::*;

/// The split a `ChooseSplit` strategy picked for a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChosenSplit {
	pub attribute_index: usize,
	pub rule: SplitRule,
	/// The value pruning compares against its alpha threshold.
	pub alpha: f64,
}

/// A split selection strategy for `grow`. Returning `None` turns the node into a leaf.
pub trait ChooseSplit: Sync {
	fn choose_split(&self, dataset: &Dataset) -> Option<ChosenSplit>;
}

/// Grow a tree by recursively partitioning `dataset` with the splits `chooser` picks. A node becomes a leaf predicting its best class when the height is exhausted, when all of its samples share a best class, when it has no more than `min_leaf` samples (if `min_leaf` is nonzero), or when the chooser finds nothing worth splitting on. Sibling subtrees are grown in parallel.
pub fn grow<C>(dataset: &Dataset, height: usize, min_leaf: usize, chooser: &C) -> TrainNode
where
	C: ChooseSplit,
{
	let (prediction, _) = dataset.best_class();
	if height == 0
		|| dataset.is_all_same_class()
		|| (min_leaf > 0 && dataset.len() <= min_leaf)
	{
		return TrainNode::leaf(prediction);
	}
	let ChosenSplit {
		attribute_index,
		rule,
		alpha,
	} = match chooser.choose_split(dataset) {
		Some(chosen) => chosen,
		None => return TrainNode::leaf(prediction),
	};
	let attribute_size = dataset.attribute_size(attribute_index);
	let children = dataset.partition(rule.n_children(attribute_size), |sample| {
		rule.child_index(sample.code(attribute_index))
	});
	let children = children
		.par_iter()
		.map(|child| grow(child, height - 1, min_leaf, chooser))
		.collect();
	TrainNode::Branch(TrainBranchNode {
		attribute_index,
		attribute_size,
		rule,
		children,
		prediction,
		pruning: Some(Pruning {
			alpha,
			n_samples: dataset.len(),
		}),
	})
}
