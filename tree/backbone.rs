use crate::{
	tree::{SplitRule, TrainBranchNode, TrainNode},
	Tree,
};
use pine_dataset::Dataset;
use pine_util::compare;
use rayon::prelude::*;
use std::cmp::Ordering;

/// These are the options for `train_backbone`.
#[derive(Clone, Debug, PartialEq)]
pub struct BackboneOptions {
	pub height: usize,
	pub values: BackboneValues,
}

impl Default for BackboneOptions {
	fn default() -> Self {
		Self {
			height: 3,
			values: BackboneValues::All,
		}
	}
}

/// Which values a backbone may continue on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackboneValues {
	/// Try every value of every backbone attribute.
	All,
	/// Always continue on the attribute's most frequent value.
	MostFrequent,
}

/// One level of a backbone: the attribute it splits on and the code of the child that continues the backbone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Position {
	attribute_index: usize,
	code: usize,
}

/**
Train a tree by searching over backbones.

A backbone is a chain of k-way nominal splits on distinct attributes in which exactly one child of every level but the last continues to the next level. Every other child is a dead end, as are all children of the last level. At each node the builder enumerates every backbone as long as the remaining height allows, scores each one by the summed best class benefit of its dead ends, keeps the best, and then grows a new backbone search off every dead end.
*/
pub fn train_backbone(dataset: &Dataset, options: &BackboneOptions) -> Tree {
	let available = vec![true; dataset.n_attributes()];
	grow_backbone(dataset, options.height, &available, options.values).into()
}

fn grow_backbone(dataset: &Dataset, height: usize, available: &[bool], values: BackboneValues) -> TrainNode {
	let (prediction, _) = dataset.best_class();
	let length = height.min(available.iter().filter(|available| **available).count());
	if length == 0 || dataset.is_all_same_class() {
		return TrainNode::leaf(prediction);
	}
	let states = enumerate_states(dataset, length, available, values);
	let scores: Vec<f64> = states
		.par_iter()
		.map(|state| backbone_score(dataset, state))
		.collect();
	// Ties go to the backbone enumerated first.
	let mut best_index = 0;
	for (index, score) in scores.iter().enumerate().skip(1) {
		if compare(*score, scores[best_index]) == Ordering::Greater {
			best_index = index;
		}
	}
	build_backbone(dataset, &states[best_index], height, available, values)
}

fn start_code(dataset: &Dataset, attribute_index: usize, values: BackboneValues) -> usize {
	match values {
		BackboneValues::All => 0,
		BackboneValues::MostFrequent => dataset
			.attribute(attribute_index)
			.most_frequent_code()
			.unwrap_or(0),
	}
}

fn enumerate_states(
	dataset: &Dataset,
	length: usize,
	available: &[bool],
	values: BackboneValues,
) -> Vec<Vec<Position>> {
	let mut state: Vec<Position> = available
		.iter()
		.enumerate()
		.filter(|(_, available)| **available)
		.take(length)
		.map(|(attribute_index, _)| Position {
			attribute_index,
			code: start_code(dataset, attribute_index, values),
		})
		.collect();
	let mut states = vec![state.clone()];
	while next_state(dataset, &mut state, available, values) {
		states.push(state.clone());
	}
	states
}

/// Advance `state` like an odometer, last position first. A position first tries its next continuing value, then the next unused attribute, and otherwise releases its attribute and carries to the previous position. Positions after the one that changed are refilled with the lowest unused attributes. Returns false once every state has been visited.
fn next_state(
	dataset: &Dataset,
	state: &mut [Position],
	available: &[bool],
	values: BackboneValues,
) -> bool {
	let n_attributes = available.len();
	let mut used: Vec<bool> = available.iter().map(|available| !available).collect();
	for position in state.iter() {
		used[position.attribute_index] = true;
	}
	let last = state.len() - 1;
	let mut changed = None;
	for index in (0..state.len()).rev() {
		let position = &mut state[index];
		// The last position has no continuing child, so its value does not matter.
		if index < last
			&& values == BackboneValues::All
			&& position.code + 1 < dataset.attribute_size(position.attribute_index)
		{
			position.code += 1;
			changed = Some(index);
			break;
		}
		let next_attribute_index =
			(position.attribute_index + 1..n_attributes).find(|attribute_index| !used[*attribute_index]);
		used[position.attribute_index] = false;
		if let Some(attribute_index) = next_attribute_index {
			used[attribute_index] = true;
			*position = Position {
				attribute_index,
				code: start_code(dataset, attribute_index, values),
			};
			changed = Some(index);
			break;
		}
	}
	let changed = match changed {
		Some(changed) => changed,
		None => return false,
	};
	for position in state[changed + 1..].iter_mut() {
		let attribute_index = match (0..n_attributes).find(|attribute_index| !used[*attribute_index]) {
			Some(attribute_index) => attribute_index,
			None => return false,
		};
		used[attribute_index] = true;
		*position = Position {
			attribute_index,
			code: start_code(dataset, attribute_index, values),
		};
	}
	true
}

/// The summed best class benefit of every dead end of the backbone.
fn backbone_score(dataset: &Dataset, state: &[Position]) -> f64 {
	let mut score = 0.0;
	let mut current = dataset.clone();
	for (level, position) in state.iter().enumerate() {
		let is_last = level + 1 == state.len();
		let children = current.partition(current.attribute_size(position.attribute_index), |sample| {
			sample.code(position.attribute_index)
		});
		for (code, child) in children.iter().enumerate() {
			if is_last || code != position.code {
				score += child.best_class().1;
			}
		}
		if let Some(next) = children.into_iter().nth(position.code) {
			current = next;
		}
	}
	score
}

fn build_backbone(
	dataset: &Dataset,
	state: &[Position],
	height: usize,
	available: &[bool],
	values: BackboneValues,
) -> TrainNode {
	let Position {
		attribute_index,
		code: continuing_code,
	} = state[0];
	let mut available = available.to_owned();
	available[attribute_index] = false;
	let attribute_size = dataset.attribute_size(attribute_index);
	let children = dataset.partition(attribute_size, |sample| sample.code(attribute_index));
	let children = children
		.par_iter()
		.enumerate()
		.map(|(code, child)| {
			if code == continuing_code && state.len() > 1 {
				build_backbone(child, &state[1..], height - 1, &available, values)
			} else {
				grow_backbone(child, height - 1, &available, values)
			}
		})
		.collect();
	TrainNode::Branch(TrainBranchNode {
		attribute_index,
		attribute_size,
		rule: SplitRule::Nominal,
		children,
		prediction: dataset.best_class().0,
		pruning: None,
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
fn xor() -> Dataset {
	load("a,b,c0,c1\n0,0,10,0\n0,1,0,10\n1,0,0,10\n1,1,10,0\n", 2)
}

#[test]
fn test_enumerate_states() {
	let dataset = load("a,b,c,c0,c1\n0,0,0,1,0\n1,1,1,0,1\n", 3);
	let available = vec![true; 3];
	let states = enumerate_states(&dataset, 2, &available, BackboneValues::All);
	assert_eq!(states.len(), 12);
	for (index, state) in states.iter().enumerate() {
		assert_ne!(state[0].attribute_index, state[1].attribute_index);
		assert!(!states[..index].contains(state));
	}
	let states = enumerate_states(&dataset, 2, &available, BackboneValues::MostFrequent);
	assert_eq!(states.len(), 6);
	let available = vec![true, false, true];
	let states = enumerate_states(&dataset, 2, &available, BackboneValues::All);
	assert_eq!(states.len(), 4);
	assert!(states
		.iter()
		.flatten()
		.all(|position| position.attribute_index != 1));
}

#[test]
fn test_backbone_score() {
	let dataset = xor();
	let state = vec![
		Position {
			attribute_index: 0,
			code: 0,
		},
		Position {
			attribute_index: 1,
			code: 0,
		},
	];
	assert_eq!(backbone_score(&dataset, &state), 30.0);
	assert_eq!(backbone_score(&dataset, &state[..1]), 20.0);
}

#[test]
fn test_xor() {
	let dataset = xor();
	let tree = train_backbone(
		&dataset,
		&BackboneOptions {
			height: 2,
			..Default::default()
		},
	);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	a = 0
	| b = 0 : c0
	| b = 1 : c1
	a = 1
	| b = 0 : c1
	| b = 1 : c0
	"###);
	let score: f64 = dataset
		.samples()
		.map(|sample| sample.benefit(tree.classify(&sample).unwrap()))
		.sum();
	assert_eq!(score, 40.0);
	assert!(tree.nodes.iter().all(|node| match node {
		crate::Node::Branch(branch) => branch.pruning.is_none(),
		crate::Node::Leaf(_) => true,
	}));
}

#[test]
fn test_height_limits() {
	let dataset = xor();
	let tree = train_backbone(
		&dataset,
		&BackboneOptions {
			height: 0,
			..Default::default()
		},
	);
	assert_eq!(tree.size(), 1);
	// The height exceeds the number of attributes, so the backbone stops after both are used.
	let options = BackboneOptions {
		height: 5,
		values: BackboneValues::MostFrequent,
	};
	let tree = train_backbone(&dataset, &options);
	assert_eq!(tree.depth(), 2);
	assert_eq!(tree, train_backbone(&dataset, &options));
}
