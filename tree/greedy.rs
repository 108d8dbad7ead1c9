use crate::{
	grow::{grow, ChooseSplit, ChosenSplit},
	tree::SplitRule,
	Tree,
};
use ndarray::prelude::*;
use pine_dataset::{best_class, Dataset};
use pine_util::compare;
use rayon::prelude::*;
use std::cmp::Ordering;

/// These are the options for `train_greedy`.
#[derive(Clone, Debug, PartialEq)]
pub struct GreedyOptions {
	/// The maximum number of branches on any path from the root to a leaf.
	pub height: usize,
	/// A node with no more than this many samples becomes a leaf. Zero disables the check.
	pub min_leaf: usize,
	/// A split is only made if its gain, relative to the root's best class benefit, is at least this value.
	pub min_gain: f64,
	/// Ordered attributes are only split at roughly this many evenly spaced codes. Zero tries every code.
	pub percentiles: usize,
	/// If true, nominal attributes are split into one value versus the rest instead of one child per value.
	pub use_nominal_binary: bool,
}

impl Default for GreedyOptions {
	fn default() -> Self {
		Self {
			height: 3,
			min_leaf: 0,
			min_gain: 0.0,
			percentiles: 100,
			use_nominal_binary: false,
		}
	}
}

/// Train a tree that greedily picks, at each node, the split whose children's best class benefits sum to the most.
pub fn train_greedy(dataset: &Dataset, options: &GreedyOptions) -> Tree {
	let chooser = GreedySplitChooser {
		options,
		root_benefit: dataset.best_class().1,
	};
	grow(dataset, options.height, options.min_leaf, &chooser).into()
}

struct GreedySplitChooser<'a> {
	options: &'a GreedyOptions,
	root_benefit: f64,
}

impl<'a> ChooseSplit for GreedySplitChooser<'a> {
	fn choose_split(&self, dataset: &Dataset) -> Option<ChosenSplit> {
		let (_, node_benefit) = dataset.best_class();
		let scores: Vec<Option<(f64, SplitRule)>> = (0..dataset.n_attributes())
			.into_par_iter()
			.map(|attribute_index| self.attribute_score(dataset, attribute_index))
			.collect();
		// Attributes must strictly beat not splitting at all. Ties go to the lowest attribute index.
		let mut best: Option<(usize, f64, SplitRule)> = None;
		let mut best_score = node_benefit;
		for (attribute_index, score) in scores.into_iter().enumerate() {
			if let Some((score, rule)) = score {
				if compare(score, best_score) == Ordering::Greater {
					best = Some((attribute_index, score, rule));
					best_score = score;
				}
			}
		}
		let (attribute_index, score, rule) = best?;
		let gain = self.gain(score, node_benefit);
		if compare(gain, self.options.min_gain) == Ordering::Less {
			return None;
		}
		Some(ChosenSplit {
			attribute_index,
			rule,
			alpha: 1.0 - gain,
		})
	}
}

impl<'a> GreedySplitChooser<'a> {
	fn gain(&self, score: f64, node_benefit: f64) -> f64 {
		if compare(self.root_benefit, 0.0) == Ordering::Equal {
			0.0
		} else {
			(score - node_benefit) / self.root_benefit.abs()
		}
	}

	fn attribute_score(&self, dataset: &Dataset, attribute_index: usize) -> Option<(f64, SplitRule)> {
		if dataset.attribute_type(attribute_index).is_ordered() {
			ordered_score(dataset, attribute_index, self.options.percentiles)
		} else if self.options.use_nominal_binary {
			nominal_binary_score(dataset, attribute_index)
		} else {
			Some((dataset.partition_benefit(attribute_index), SplitRule::Nominal))
		}
	}
}

/// Score every "one value versus the rest" split of a nominal attribute and return the best.
fn nominal_binary_score(dataset: &Dataset, attribute_index: usize) -> Option<(f64, SplitRule)> {
	let sums = dataset.class_benefits_by_code(attribute_index);
	let total = dataset.class_benefits();
	let mut best: Option<(f64, SplitRule)> = None;
	for (code, inside) in sums.genrows().into_iter().enumerate() {
		let outside = &total - &inside;
		let score = best_class(inside.iter().cloned()).1 + best_class(outside.iter().cloned()).1;
		match best {
			Some((best_score, _)) if compare(score, best_score) != Ordering::Greater => {}
			_ => best = Some((score, SplitRule::NominalBinary { code })),
		}
	}
	best
}

/// Sweep the samples in code order, trying thresholds spaced `attribute_size / percentiles` codes apart.
fn ordered_score(
	dataset: &Dataset,
	attribute_index: usize,
	percentiles: usize,
) -> Option<(f64, SplitRule)> {
	let attribute_size = dataset.attribute_size(attribute_index);
	let step = if percentiles == 0 {
		1
	} else {
		(attribute_size / percentiles).max(1)
	};
	let mut samples: Vec<(usize, ArrayView1<f64>)> = dataset
		.samples()
		.map(|sample| (sample.code(attribute_index), sample.benefits))
		.collect();
	samples.sort_by_key(|(code, _)| *code);
	let mut left: Array1<f64> = Array1::zeros(dataset.n_classes());
	let mut right = dataset.class_benefits();
	let mut best_score = best_class(right.iter().cloned()).1;
	let mut best_first_right_code = None;
	let mut limit = 0;
	while limit < samples.len() {
		let score = best_class(left.iter().cloned()).1 + best_class(right.iter().cloned()).1;
		if compare(score, best_score) == Ordering::Greater {
			best_score = score;
			best_first_right_code = Some(samples[limit].0);
		}
		let next_code = samples[limit].0 + step;
		while limit < samples.len() && samples[limit].0 < next_code {
			left += &samples[limit].1;
			right -= &samples[limit].1;
			limit += 1;
		}
	}
	// The first candidate has every sample on the right and can never improve on the initial score, so the first right code is never the smallest code.
	best_first_right_code.map(|code| {
		(
			best_score,
			SplitRule::Ordered {
				threshold: code - 1,
			},
		)
	})
}

#[cfg(test)]
fn load(csv: &str, start: usize) -> Dataset {
	Dataset::from_reader(
		csv.as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start },
		},
	)
	.unwrap()
}

#[cfg(test)]
fn training_score(tree: &Tree, dataset: &Dataset) -> f64 {
	dataset
		.samples()
		.map(|sample| sample.benefit(tree.classify(&sample).unwrap()))
		.sum()
}

#[test]
fn test_separable() {
	let dataset = load("a,c0,c1\n0,10,0\n0,10,0\n1,0,10\n1,0,10\n", 1);
	let tree = train_greedy(
		&dataset,
		&GreedyOptions {
			height: 1,
			..Default::default()
		},
	);
	assert_eq!(tree.size(), 3);
	assert_eq!(training_score(&tree, &dataset), 40.0);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	a <= 0 : c0
	a > 0 : c1
	"###);
}

#[test]
fn test_nominal() {
	let dataset = load("a,c0,c1\nx,10,0\nx,10,0\ny,0,10\ny,0,10\n", 1);
	let tree = train_greedy(&dataset, &GreedyOptions::default());
	assert_eq!(training_score(&tree, &dataset), 40.0);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	a = x : c0
	a = y : c1
	"###);
}

#[test]
fn test_height_zero() {
	let dataset = load("a,c0,c1\n0,10,0\n0,10,0\n1,0,10\n1,0,10\n", 1);
	let tree = train_greedy(
		&dataset,
		&GreedyOptions {
			height: 0,
			..Default::default()
		},
	);
	assert_eq!(tree.size(), 1);
	assert_eq!(training_score(&tree, &dataset), 20.0);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @": c0");
}

#[test]
fn test_all_same_class() {
	let dataset = load("a,c0,c1\n0,10,0\n1,5,1\n2,7,3\n", 1);
	let tree = train_greedy(&dataset, &GreedyOptions::default());
	assert_eq!(tree.size(), 1);
}

#[test]
fn test_min_gain() {
	// Splitting on a gains 2 over a root benefit of 20.
	let dataset = load("a,c0,c1\n0,10,0\n0,10,0\n1,0,2\n1,0,0\n", 1);
	let options = GreedyOptions {
		min_gain: 0.2,
		..Default::default()
	};
	assert_eq!(train_greedy(&dataset, &options).size(), 1);
	let options = GreedyOptions {
		min_gain: 0.05,
		..Default::default()
	};
	let tree = train_greedy(&dataset, &options);
	assert_eq!(tree.size(), 3);
	match &tree.nodes[0] {
		crate::Node::Branch(branch) => {
			let pruning = branch.pruning.unwrap();
			assert!((pruning.alpha - 0.9).abs() < 1e-12);
			assert_eq!(pruning.n_samples, 4);
		}
		crate::Node::Leaf(_) => panic!("expected a branch"),
	}
}

#[test]
fn test_nominal_binary() {
	let dataset = load("a,c0,c1\nx,10,0\ny,0,10\nz,0,10\nz,0,10\n", 1);
	let tree = train_greedy(
		&dataset,
		&GreedyOptions {
			height: 1,
			use_nominal_binary: true,
			..Default::default()
		},
	);
	assert_eq!(tree.size(), 3);
	assert_eq!(training_score(&tree, &dataset), 40.0);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	a = x : c0
	a in {y, z} : c1
	"###);
}

#[test]
fn test_percentiles() {
	// With a candidate threshold every three codes, the best threshold between codes 4 and 5 is skipped.
	let mut csv = "a,c0,c1\n".to_owned();
	for value in 0..10 {
		let benefits = if value < 5 { "1,0" } else { "0,1" };
		csv.push_str(&format!("{},{}\n", value, benefits));
	}
	let dataset = load(&csv, 1);
	let exact = train_greedy(
		&dataset,
		&GreedyOptions {
			height: 1,
			percentiles: 0,
			..Default::default()
		},
	);
	assert_eq!(training_score(&exact, &dataset), 10.0);
	let coarse = train_greedy(
		&dataset,
		&GreedyOptions {
			height: 1,
			percentiles: 3,
			..Default::default()
		},
	);
	assert_eq!(training_score(&coarse, &dataset), 9.0);
}

#[test]
fn test_deterministic() {
	let mut csv = "a,b,c,c0,c1\n".to_owned();
	for i in 0..60 {
		csv.push_str(&format!(
			"{},{},{},{},{}\n",
			i % 7,
			["p", "q", "r"][i % 3],
			(i * 13) % 11,
			(i * 17) % 10,
			(i * 31) % 9
		));
	}
	let dataset = load(&csv, 3);
	let options = GreedyOptions {
		height: 4,
		..Default::default()
	};
	assert_eq!(train_greedy(&dataset, &options), train_greedy(&dataset, &options));
}
