use crate::{
	grow::{grow, ChooseSplit, ChosenSplit},
	tree::SplitRule,
	Tree,
};
use num_traits::ToPrimitive;
use pine_dataset::Dataset;
use pine_util::compare;
use rayon::prelude::*;
use std::{
	cmp::Ordering,
	ops::{AddAssign, Sub, SubAssign},
};

/// These are the options for `train_impurity`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpurityOptions {
	pub height: usize,
	/// A node with no more than this many samples becomes a leaf. Zero disables the check.
	pub min_leaf: usize,
	/// A split is only made if its impurity reduction, relative to the root's impurity, is at least this value.
	pub min_gain: f64,
	pub use_nominal_binary: bool,
}

impl Default for ImpurityOptions {
	fn default() -> Self {
		Self {
			height: 3,
			min_leaf: 0,
			min_gain: 0.0,
			use_nominal_binary: false,
		}
	}
}

/// Benefits are rescaled into [0, 1] using the smallest and largest benefit of the root dataset before any impurity is computed. The impurity is not scale invariant, so this keeps split choices independent of the unit benefits are measured in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BenefitScale {
	pub min: f64,
	pub range: f64,
}

impl Default for BenefitScale {
	fn default() -> Self {
		BenefitScale {
			min: 0.0,
			range: 1.0,
		}
	}
}

impl BenefitScale {
	/// The scale of the two class benefits of every sample in `dataset`. If they are all equal, the benefits are left as they are.
	pub fn from_dataset(dataset: &Dataset) -> BenefitScale {
		let mut min = f64::INFINITY;
		let mut max = f64::NEG_INFINITY;
		for sample in dataset.samples() {
			for class_index in 0..2 {
				min = min.min(sample.benefit(class_index));
				max = max.max(sample.benefit(class_index));
			}
		}
		if compare(max, min) != Ordering::Greater {
			return BenefitScale::default();
		}
		BenefitScale {
			min,
			range: max - min,
		}
	}

	pub fn apply(&self, benefit_0: f64, benefit_1: f64) -> (f64, f64) {
		(
			(benefit_0 - self.min) / self.range,
			(benefit_1 - self.min) / self.range,
		)
	}
}

/// The running sums the impurity of a set of samples is computed from. For each sample, `d` is the absolute difference between its two benefits. Samples whose class 0 benefit is at least their class 1 benefit are in set A, the others in set B.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImpurityStats {
	pub n_samples: usize,
	pub sum: f64,
	pub sum_a: f64,
	pub sum_b: f64,
	pub sum_squares_a: f64,
	pub sum_squares_b: f64,
}

impl ImpurityStats {
	pub fn from_dataset(dataset: &Dataset, scale: BenefitScale) -> ImpurityStats {
		let mut stats = ImpurityStats::default();
		for sample in dataset.samples() {
			stats += scale.apply(sample.benefit(0), sample.benefit(1));
		}
		stats
	}

	/// `0.5 * ((sum_squares_a + sum_squares_b) / sum - (sum_squares_a^2 + sum_squares_b^2) / sum^2)`, or zero if `sum` is zero.
	pub fn impurity(&self) -> f64 {
		if compare(self.sum, 0.0) == Ordering::Equal {
			return 0.0;
		}
		0.5 * ((self.sum_squares_a + self.sum_squares_b) / self.sum
			- (self.sum_squares_a * self.sum_squares_a + self.sum_squares_b * self.sum_squares_b)
				/ (self.sum * self.sum))
	}
}

impl AddAssign<(f64, f64)> for ImpurityStats {
	fn add_assign(&mut self, (benefit_0, benefit_1): (f64, f64)) {
		let d = (benefit_0 - benefit_1).abs();
		self.n_samples += 1;
		self.sum += d;
		if compare(benefit_0, benefit_1) != Ordering::Less {
			self.sum_a += d;
			self.sum_squares_a += d * d;
		} else {
			self.sum_b += d;
			self.sum_squares_b += d * d;
		}
	}
}

impl SubAssign<(f64, f64)> for ImpurityStats {
	fn sub_assign(&mut self, (benefit_0, benefit_1): (f64, f64)) {
		let d = (benefit_0 - benefit_1).abs();
		self.n_samples -= 1;
		self.sum -= d;
		if compare(benefit_0, benefit_1) != Ordering::Less {
			self.sum_a -= d;
			self.sum_squares_a -= d * d;
		} else {
			self.sum_b -= d;
			self.sum_squares_b -= d * d;
		}
	}
}

impl Sub for ImpurityStats {
	type Output = ImpurityStats;
	fn sub(self, other: ImpurityStats) -> ImpurityStats {
		ImpurityStats {
			n_samples: self.n_samples - other.n_samples,
			sum: self.sum - other.sum,
			sum_a: self.sum_a - other.sum_a,
			sum_b: self.sum_b - other.sum_b,
			sum_squares_a: self.sum_squares_a - other.sum_squares_a,
			sum_squares_b: self.sum_squares_b - other.sum_squares_b,
		}
	}
}

/// The impurity of the samples in `dataset`, with benefits rescaled by `scale`.
pub fn node_impurity(dataset: &Dataset, scale: BenefitScale) -> f64 {
	ImpurityStats::from_dataset(dataset, scale).impurity()
}

/// The average impurity of `children` weighted by each child's share of `n_samples`.
fn weighted_impurity(children: &[ImpurityStats], n_samples: usize) -> f64 {
	let n_samples = n_samples.to_f64().unwrap();
	children
		.iter()
		.filter(|child| child.n_samples > 0)
		.map(|child| child.n_samples.to_f64().unwrap() / n_samples * child.impurity())
		.sum()
}

/// Compute the best impurity reduction splitting on `attribute_index` can achieve, along with the split that achieves it. Ordered attributes are swept over every boundary between distinct codes. Nominal attributes are split one child per code, or if `use_nominal_binary` is set, into the best single code versus the rest.
pub fn attribute_gain(
	dataset: &Dataset,
	attribute_index: usize,
	parent_impurity: f64,
	scale: BenefitScale,
	use_nominal_binary: bool,
) -> Option<(f64, SplitRule)> {
	let n_samples = dataset.len();
	if n_samples == 0 {
		return None;
	}
	let (impurity, rule) = if dataset.attribute_type(attribute_index).is_ordered() {
		ordered_impurity(dataset, attribute_index, scale)?
	} else {
		let mut stats = vec![ImpurityStats::default(); dataset.attribute_size(attribute_index)];
		for sample in dataset.samples() {
			stats[sample.code(attribute_index)] += scale.apply(sample.benefit(0), sample.benefit(1));
		}
		if use_nominal_binary {
			let total = ImpurityStats::from_dataset(dataset, scale);
			let mut best: Option<(f64, SplitRule)> = None;
			for (code, inside) in stats.iter().enumerate() {
				if inside.n_samples == 0 || inside.n_samples == n_samples {
					continue;
				}
				let impurity = weighted_impurity(&[*inside, total - *inside], n_samples);
				match best {
					Some((best_impurity, _)) if compare(impurity, best_impurity) != Ordering::Less => {}
					_ => best = Some((impurity, SplitRule::NominalBinary { code })),
				}
			}
			best?
		} else {
			(weighted_impurity(&stats, n_samples), SplitRule::Nominal)
		}
	};
	Some((parent_impurity - impurity, rule))
}

/// Move samples from the right side to the left side one group of equal codes at a time and return the lowest weighted impurity seen at a boundary with samples on both sides.
fn ordered_impurity(
	dataset: &Dataset,
	attribute_index: usize,
	scale: BenefitScale,
) -> Option<(f64, SplitRule)> {
	let n_samples = dataset.len();
	let mut samples: Vec<(usize, f64, f64)> = dataset
		.samples()
		.map(|sample| {
			let (benefit_0, benefit_1) = scale.apply(sample.benefit(0), sample.benefit(1));
			(sample.code(attribute_index), benefit_0, benefit_1)
		})
		.collect();
	samples.sort_by_key(|(code, _, _)| *code);
	let mut left = ImpurityStats::default();
	let mut right = ImpurityStats::from_dataset(dataset, scale);
	let mut best: Option<(f64, SplitRule)> = None;
	let mut index = 0;
	while index < n_samples {
		let code = samples[index].0;
		while index < n_samples && samples[index].0 == code {
			let (_, benefit_0, benefit_1) = samples[index];
			left += (benefit_0, benefit_1);
			right -= (benefit_0, benefit_1);
			index += 1;
		}
		if index == n_samples {
			break;
		}
		let impurity = weighted_impurity(&[left, right], n_samples);
		match best {
			Some((best_impurity, _)) if compare(impurity, best_impurity) != Ordering::Less => {}
			_ => best = Some((impurity, SplitRule::Ordered { threshold: code })),
		}
	}
	best
}

/// Train a tree that picks, at each node, the split with the largest reduction in benefit impurity. Requires exactly two classes.
pub fn train_impurity(dataset: &Dataset, options: &ImpurityOptions) -> Tree {
	assert_eq!(
		dataset.n_classes(),
		2,
		"impurity trees require exactly two classes"
	);
	let scale = BenefitScale::from_dataset(dataset);
	let chooser = ImpuritySplitChooser {
		options,
		scale,
		root_impurity: node_impurity(dataset, scale),
	};
	grow(dataset, options.height, options.min_leaf, &chooser).into()
}

struct ImpuritySplitChooser<'a> {
	options: &'a ImpurityOptions,
	scale: BenefitScale,
	root_impurity: f64,
}

impl<'a> ChooseSplit for ImpuritySplitChooser<'a> {
	fn choose_split(&self, dataset: &Dataset) -> Option<ChosenSplit> {
		let parent_impurity = node_impurity(dataset, self.scale);
		let gains: Vec<Option<(f64, SplitRule)>> = (0..dataset.n_attributes())
			.into_par_iter()
			.map(|attribute_index| {
				attribute_gain(
					dataset,
					attribute_index,
					parent_impurity,
					self.scale,
					self.options.use_nominal_binary,
				)
			})
			.collect();
		let mut best: Option<(usize, f64, SplitRule)> = None;
		let mut best_gain = 0.0;
		for (attribute_index, gain) in gains.into_iter().enumerate() {
			if let Some((gain, rule)) = gain {
				if compare(gain, best_gain) == Ordering::Greater {
					best = Some((attribute_index, gain, rule));
					best_gain = gain;
				}
			}
		}
		let (attribute_index, gain, rule) = best?;
		let gain = if compare(self.root_impurity, 0.0) == Ordering::Equal {
			0.0
		} else {
			gain / self.root_impurity.abs()
		};
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

#[cfg(test)]
fn load(csv: &str) -> Dataset {
	load_with_start(csv, 1)
}

#[cfg(test)]
fn load_with_start(csv: &str, start: usize) -> Dataset {
	Dataset::from_reader(
		csv.as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start },
		},
	)
	.unwrap()
}

#[test]
fn test_impurity() {
	// d = 4 and 2 in set A, d = 1 in set B.
	let dataset = load("a,c0,c1\n0,5,1\n0,3,1\n1,0,1\n");
	let stats = ImpurityStats::from_dataset(&dataset, BenefitScale::default());
	assert_eq!(stats.sum, 7.0);
	assert_eq!(stats.sum_a, 6.0);
	assert_eq!(stats.sum_squares_a, 20.0);
	assert_eq!(stats.sum_squares_b, 1.0);
	let expected = 0.5 * (21.0 / 7.0 - 401.0 / 49.0);
	assert!((stats.impurity() - expected).abs() < 1e-12);
	// Samples with equal benefits have no separation to measure.
	let dataset = load("a,c0,c1\n0,2,2\n1,1,1\n");
	assert_eq!(node_impurity(&dataset, BenefitScale::from_dataset(&dataset)), 0.0);
}

#[test]
fn test_benefit_scale() {
	// Benefits range over [0, 5], so d = 4, 2, and 1 become 0.8, 0.4, and 0.2.
	let dataset = load("a,c0,c1\n0,5,1\n0,3,1\n1,0,1\n");
	let scale = BenefitScale::from_dataset(&dataset);
	assert_eq!(scale, BenefitScale { min: 0.0, range: 5.0 });
	let stats = ImpurityStats::from_dataset(&dataset, scale);
	assert!((stats.sum - 1.4).abs() < 1e-12);
	assert!((stats.sum_squares_a - 0.8).abs() < 1e-12);
	// Measuring benefits in other units and shifting them does not change the impurity.
	let shifted = load("a,c0,c1\n0,-50,-90\n0,-70,-90\n1,-100,-90\n");
	let shifted_impurity = node_impurity(&shifted, BenefitScale::from_dataset(&shifted));
	assert!((shifted_impurity - stats.impurity()).abs() < 1e-12);
}

#[test]
fn test_split_choice_is_scale_invariant() {
	let mut csv = "a,b,c0,c1\n".to_owned();
	let mut scaled_csv = csv.clone();
	for i in 0..60 {
		let (a, b) = ((i * 7) % 5, (i * 3) % 4);
		let (c0, c1) = ((i * 5) % 9, (i * 11) % 7);
		csv.push_str(&format!("{},{},{},{}\n", a, b, c0, c1));
		scaled_csv.push_str(&format!("{},{},{},{}\n", a, b, c0 * 1000, c1 * 1000));
	}
	let dataset = load_with_start(&csv, 2);
	let scaled = load_with_start(&scaled_csv, 2);
	let options = ImpurityOptions::default();
	let tree = train_impurity(&dataset, &options);
	let scaled_tree = train_impurity(&scaled, &options);
	assert_eq!(tree.outline(dataset.schema()), scaled_tree.outline(scaled.schema()));
}

#[test]
fn test_ordered_sweep_matches_recomputation() {
	let mut csv = "a,c0,c1\n".to_owned();
	for i in 0..40 {
		csv.push_str(&format!("{},{},{}\n", (i * 7) % 9, (i * 5) % 8, (i * 3) % 7));
	}
	let dataset = load(&csv);
	let scale = BenefitScale::from_dataset(&dataset);
	let parent = node_impurity(&dataset, scale);
	let (gain, rule) = attribute_gain(&dataset, 0, parent, scale, false).unwrap();
	// Recompute every threshold from scratch and find the lowest weighted impurity.
	let mut best = f64::INFINITY;
	for threshold in 0..dataset.attribute_size(0) - 1 {
		let children = dataset.partition(2, |sample| if sample.code(0) <= threshold { 0 } else { 1 });
		let impurity = weighted_impurity(
			&[
				ImpurityStats::from_dataset(&children[0], scale),
				ImpurityStats::from_dataset(&children[1], scale),
			],
			dataset.len(),
		);
		best = best.min(impurity);
	}
	assert!((parent - gain - best).abs() < 1e-9);
	match rule {
		SplitRule::Ordered { threshold } => assert!(threshold + 1 < dataset.attribute_size(0)),
		_ => panic!("expected an ordered split"),
	}
}

#[test]
fn test_never_selects_negative_gain() {
	let mut csv = "a,b,c0,c1\n".to_owned();
	for i in 0..50 {
		csv.push_str(&format!(
			"{},{},{},{}\n",
			["x", "y", "z"][i % 3],
			i % 5,
			(i * 11) % 6,
			(i * 7) % 5
		));
	}
	let dataset = load_with_start(&csv, 2);
	let options = ImpurityOptions {
		height: 4,
		..Default::default()
	};
	let tree = train_impurity(&dataset, &options);
	for node in tree.nodes.iter() {
		if let crate::Node::Branch(branch) = node {
			// alpha is one minus the relative gain.
			assert!(branch.pruning.unwrap().alpha <= 1.0 + 1e-9);
		}
	}
	assert_eq!(tree, train_impurity(&dataset, &options));
}

#[test]
fn test_separable() {
	let dataset = load("a,c0,c1\nx,10,0\nx,10,0\ny,0,10\ny,0,10\n");
	let tree = train_impurity(&dataset, &ImpurityOptions::default());
	insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
	a = x : c0
	a = y : c1
	"###);
}
