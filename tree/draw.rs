use crate::{
	tree::{SplitRule, TrainBranchNode, TrainNode},
	Tree,
};
use pine_dataset::{best_class, Dataset};
use pine_util::compare;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::cmp::Ordering;

/// These are the options for `train_draw`.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawOptions {
	pub height: usize,
	/// A node with no more than this many samples becomes a leaf. Zero disables the check.
	pub min_leaf: usize,
	/// The number of random reassignments an attribute must beat to be split on.
	pub total_draws: usize,
	/// Seed for the random reassignments. Without one, every run draws differently.
	pub seed: Option<u64>,
}

impl Default for DrawOptions {
	fn default() -> Self {
		Self {
			height: 3,
			min_leaf: 0,
			total_draws: 10,
			seed: None,
		}
	}
}

/**
Train a tree with a permutation test at every node. Attributes are tried in order of increasing number of values, and the first one whose partition benefit is strictly greater than the partition benefit of every one of `total_draws` random reassignments of samples to its values is split on. An attribute is used at most once on any path. If no attribute passes, the node becomes a leaf.
*/
pub fn train_draw(dataset: &Dataset, options: &DrawOptions) -> Tree {
	let mut rng = match options.seed {
		Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
		None => Xoshiro256Plus::from_entropy(),
	};
	let mut attribute_order: Vec<usize> = (0..dataset.n_attributes()).collect();
	attribute_order.sort_by_key(|attribute_index| (dataset.attribute_size(*attribute_index), *attribute_index));
	let available = vec![true; dataset.n_attributes()];
	grow_draw(
		dataset,
		options,
		&attribute_order,
		&available,
		options.height,
		&mut rng,
	)
	.into()
}

fn grow_draw<R>(
	dataset: &Dataset,
	options: &DrawOptions,
	attribute_order: &[usize],
	available: &[bool],
	height: usize,
	rng: &mut R,
) -> TrainNode
where
	R: Rng,
{
	let (prediction, _) = dataset.best_class();
	if height == 0
		|| dataset.is_all_same_class()
		|| (options.min_leaf > 0 && dataset.len() <= options.min_leaf)
	{
		return TrainNode::leaf(prediction);
	}
	let attribute_index = attribute_order
		.iter()
		.cloned()
		.filter(|attribute_index| available[*attribute_index])
		.find(|attribute_index| is_significant(dataset, *attribute_index, options.total_draws, rng));
	let attribute_index = match attribute_index {
		Some(attribute_index) => attribute_index,
		None => return TrainNode::leaf(prediction),
	};
	let mut available = available.to_owned();
	available[attribute_index] = false;
	let attribute_size = dataset.attribute_size(attribute_index);
	// The children share the generator, so they are grown one after another.
	let children = dataset
		.partition(attribute_size, |sample| sample.code(attribute_index))
		.iter()
		.map(|child| grow_draw(child, options, attribute_order, &available, height - 1, rng))
		.collect();
	TrainNode::Branch(TrainBranchNode {
		attribute_index,
		attribute_size,
		rule: SplitRule::Nominal,
		children,
		prediction,
		pruning: None,
	})
}

fn is_significant<R>(dataset: &Dataset, attribute_index: usize, total_draws: usize, rng: &mut R) -> bool
where
	R: Rng,
{
	let score = dataset.partition_benefit(attribute_index);
	let counts = dataset.counts_by_code(attribute_index);
	let mut sample_ids = dataset.sample_ids().to_owned();
	(0..total_draws).all(|_| {
		sample_ids.shuffle(rng);
		compare(score, chunked_partition_benefit(dataset, &counts, &sample_ids)) == Ordering::Greater
	})
}

/// Assign the first `counts[0]` of `sample_ids` to the first value, the next `counts[1]` to the second, and so on, and return the summed best class benefit of the groups.
fn chunked_partition_benefit(dataset: &Dataset, counts: &[usize], sample_ids: &[usize]) -> f64 {
	let mut start = 0;
	let mut score = 0.0;
	for count in counts {
		let chunk = &sample_ids[start..start + count];
		start += count;
		let benefits = (0..dataset.n_classes())
			.map(|class_index| chunk.iter().map(|id| dataset.benefit(*id, class_index)).sum::<f64>());
		score += best_class(benefits).1;
	}
	score
}

#[cfg(test)]
fn signal_with_noise() -> Dataset {
	let mut csv = "noise,signal,c0,c1\n".to_owned();
	for i in 0..20 {
		let benefits = if i < 10 { "10,0" } else { "0,10" };
		csv.push_str(&format!("{},{},{}\n", i % 2, i / 10, benefits));
	}
	Dataset::from_reader(
		csv.as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start: 2 },
		},
	)
	.unwrap()
}

#[test]
fn test_chunked_partition_benefit() {
	let dataset = signal_with_noise();
	for attribute_index in 0..2 {
		let mut sample_ids = dataset.sample_ids().to_owned();
		sample_ids.sort_by_key(|id| dataset.code(*id, attribute_index));
		let counts = dataset.counts_by_code(attribute_index);
		assert_eq!(
			chunked_partition_benefit(&dataset, &counts, &sample_ids),
			dataset.partition_benefit(attribute_index)
		);
	}
}

#[test]
fn test_noise_is_never_significant() {
	// Every half of the samples has a best class benefit of at least 50, so no reassignment scores below the noise attribute's 100.
	let dataset = signal_with_noise();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	assert!(!is_significant(&dataset, 0, 5, &mut rng));
	assert!(is_significant(&dataset, 0, 0, &mut rng));
}

#[test]
fn test_train_draw() {
	let dataset = signal_with_noise();
	let options = DrawOptions {
		total_draws: 20,
		seed: Some(42),
		..Default::default()
	};
	let tree = train_draw(&dataset, &options);
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	signal = 0 : c0
	signal = 1 : c1
	"###);
	assert_eq!(tree, train_draw(&dataset, &options));
}

#[test]
fn test_height_zero() {
	let dataset = signal_with_noise();
	let tree = train_draw(
		&dataset,
		&DrawOptions {
			height: 0,
			seed: Some(0),
			..Default::default()
		},
	);
	assert_eq!(tree.size(), 1);
}
