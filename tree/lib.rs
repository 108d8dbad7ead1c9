/*!
This crate grows decision trees that maximize benefit. Every sample carries a benefit for each class, and a tree is judged by the total benefit of the classes it assigns.

There are five builders. `train_greedy` picks the split whose children's best class benefits sum to the most. `train_impurity` picks the split with the largest drop in a two class impurity. `train_pair` picks the split whose pairwise separation score is least likely under random assignment, judged by one of three tail bounds. `train_backbone` searches over chains of splits. `train_draw` splits on the first attribute that beats a number of random reassignments. Trees from the first three builders carry the annotations `prune` needs to derive smaller trees without retraining.
*/

#![allow(clippy::tabs_in_doc_comments)]

mod backbone;
mod bound;
mod draw;
mod fenwick;
mod greedy;
mod grow;
mod impurity;
mod outline;
mod pair;
mod prune;
mod tree;

pub use self::backbone::{train_backbone, BackboneOptions, BackboneValues};
pub use self::bound::{bernstein_bound, hoeffding_bound, matching_sums, matching_sums_bound, BoundType};
pub use self::draw::{train_draw, DrawOptions};
pub use self::fenwick::Fenwick;
pub use self::greedy::{train_greedy, GreedyOptions};
pub use self::grow::{grow, ChooseSplit, ChosenSplit};
pub use self::impurity::{
	attribute_gain, node_impurity, train_impurity, BenefitScale, ImpurityOptions, ImpurityStats,
};
pub use self::pair::{train_pair, PairContext, PairOptions, RandomScore, SampleInfo, SplitScore};
pub use self::prune::prune;
pub use self::tree::{
	BranchNode, BranchSplit, LeafNode, Node, NominalSplit, OrderedSplit, Pruning, SplitRule,
	TrainBranchNode, TrainLeafNode, TrainNode, Tree,
};

use pine_dataset::Dataset;

/// The builder to train with and its options.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainOptions {
	Greedy(GreedyOptions),
	Impurity(ImpurityOptions),
	Pair(PairOptions),
	Backbone(BackboneOptions),
	Draw(DrawOptions),
}

impl TrainOptions {
	/// Whether trees from this builder carry pruning annotations.
	pub fn is_prunable(&self) -> bool {
		match self {
			TrainOptions::Greedy(_) | TrainOptions::Impurity(_) | TrainOptions::Pair(_) => true,
			TrainOptions::Backbone(_) | TrainOptions::Draw(_) => false,
		}
	}
}

/// Train a tree on `dataset` with the builder `options` selects. The impurity and pair builders require exactly two classes.
pub fn train(dataset: &Dataset, options: &TrainOptions) -> Tree {
	assert!(dataset.n_classes() > 0, "the dataset has no classes");
	match options {
		TrainOptions::Greedy(options) => train_greedy(dataset, options),
		TrainOptions::Impurity(options) => train_impurity(dataset, options),
		TrainOptions::Pair(options) => train_pair(dataset, options),
		TrainOptions::Backbone(options) => train_backbone(dataset, options),
		TrainOptions::Draw(options) => train_draw(dataset, options),
	}
}

#[cfg(test)]
fn mixed() -> Dataset {
	let mut csv = "size,color,weight,c0,c1\n".to_owned();
	for i in 0..80 {
		csv.push_str(&format!(
			"{},{},{}.5,{},{}\n",
			i % 5,
			["red", "green", "blue"][(i * 7) % 3],
			(i * 37) % 23,
			(i * 13) % 17,
			(i * 29) % 19
		));
	}
	Dataset::from_reader(
		csv.as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start: 3 },
		},
	)
	.unwrap()
}

#[cfg(test)]
fn all_options() -> Vec<TrainOptions> {
	vec![
		TrainOptions::Greedy(GreedyOptions::default()),
		TrainOptions::Greedy(GreedyOptions {
			use_nominal_binary: true,
			percentiles: 0,
			..Default::default()
		}),
		TrainOptions::Impurity(ImpurityOptions::default()),
		TrainOptions::Pair(PairOptions {
			max_bound: 0.5,
			..Default::default()
		}),
		TrainOptions::Pair(PairOptions {
			max_bound: 0.5,
			bound: BoundType::Bernstein,
			use_score: true,
			use_nominal_binary: true,
			..Default::default()
		}),
		TrainOptions::Backbone(BackboneOptions {
			height: 2,
			values: BackboneValues::All,
		}),
		TrainOptions::Backbone(BackboneOptions {
			height: 2,
			values: BackboneValues::MostFrequent,
		}),
		TrainOptions::Draw(DrawOptions {
			seed: Some(7),
			..Default::default()
		}),
	]
}

/// Walk the tree alongside the samples, checking that every sample reaching a leaf is classified as that leaf's class.
#[cfg(test)]
fn check_partition(tree: &Tree, dataset: &Dataset, node_index: usize, sample_ids: Vec<usize>) {
	match &tree.nodes[node_index] {
		Node::Leaf(leaf) => {
			for id in sample_ids {
				assert_eq!(tree.classify(&dataset.sample(id)), Some(leaf.class_index));
			}
		}
		Node::Branch(branch) => {
			assert!(!branch.child_indices().is_empty());
			assert!(branch.child_indices().iter().all(|child_index| *child_index > node_index));
			for child_index in branch.child_indices() {
				let child_sample_ids = sample_ids
					.iter()
					.cloned()
					.filter(|id| {
						branch.child_for_code(dataset.code(*id, branch.attribute_index())) == Some(child_index)
					})
					.collect();
				check_partition(tree, dataset, child_index, child_sample_ids);
			}
		}
	}
}

#[test]
fn test_every_builder() {
	let dataset = mixed();
	for options in all_options() {
		let tree = train(&dataset, &options);
		check_partition(&tree, &dataset, 0, dataset.sample_ids().to_owned());
		assert!(tree.depth() <= 3);
		assert!(dataset
			.samples()
			.all(|sample| tree.classify(&sample).is_some()));
		assert_eq!(tree, train(&dataset, &options));
		let is_annotated = tree.nodes.iter().all(|node| match node {
			Node::Branch(branch) => branch.pruning.is_some() == options.is_prunable(),
			Node::Leaf(_) => true,
		});
		assert!(is_annotated);
	}
}

#[test]
fn test_height_zero_is_a_leaf() {
	let dataset = mixed();
	let (best_class, _) = dataset.best_class();
	for options in all_options() {
		let options = match options {
			TrainOptions::Greedy(options) => TrainOptions::Greedy(GreedyOptions { height: 0, ..options }),
			TrainOptions::Impurity(options) => {
				TrainOptions::Impurity(ImpurityOptions { height: 0, ..options })
			}
			TrainOptions::Pair(options) => TrainOptions::Pair(PairOptions { height: 0, ..options }),
			TrainOptions::Backbone(options) => {
				TrainOptions::Backbone(BackboneOptions { height: 0, ..options })
			}
			TrainOptions::Draw(options) => TrainOptions::Draw(DrawOptions { height: 0, ..options }),
		};
		let tree = train(&dataset, &options);
		assert_eq!(tree.nodes, vec![Node::Leaf(LeafNode { class_index: best_class })]);
	}
}
