use crate::{
	bound::{bernstein_bound, hoeffding_bound, matching_sums, matching_sums_bound, BoundType},
	fenwick::Fenwick,
	grow::{grow, ChooseSplit, ChosenSplit},
	tree::SplitRule,
	Tree,
};
use num_traits::ToPrimitive;
use pine_dataset::Dataset;
use pine_util::{compare, compare_with_epsilon, BOUND_EPSILON};
use rayon::prelude::*;
use std::cmp::Ordering;

/// These are the options for `train_pair`.
#[derive(Clone, Debug, PartialEq)]
pub struct PairOptions {
	pub height: usize,
	/// A node with no more than this many samples becomes a leaf. Zero disables the check.
	pub min_leaf: usize,
	/// A split is only made if its bound is below this value.
	pub max_bound: f64,
	pub bound: BoundType,
	/// If true, pick the split with the highest score among those below `max_bound` instead of the one with the lowest bound.
	pub use_score: bool,
	pub use_nominal_binary: bool,
}

impl Default for PairOptions {
	fn default() -> Self {
		Self {
			height: 3,
			min_leaf: 0,
			max_bound: 0.05,
			bound: BoundType::Hoeffding,
			use_score: false,
			use_nominal_binary: false,
		}
	}
}

/// A sample as the pairwise selector sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleInfo {
	pub id: usize,
	/// The class with the larger benefit. Ties go to class 0.
	pub best_class: usize,
	/// The absolute difference between the two benefits.
	pub diff: f64,
}

/// The observed separation score of a split and the fraction of samples in each of its bins.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitScore {
	pub score: f64,
	pub distribution: Vec<f64>,
	/// The sum of the squared weights of the pairs the split separates. It scales the Hoeffding bound.
	pub separated_squares: f64,
}

/// The mean and variance of the separation score when bins are assigned at random with a given distribution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomScore {
	pub expected: f64,
	pub variance: f64,
}

/**
The per node state of the pairwise split selector.

For a pair of samples with different best classes, the pair's weight is the smaller of their two diffs. A split's separation score is the total weight of the pairs it sends to different bins. Samples are kept sorted by diff ascending, so the weight of a pair is always the diff of the sample that comes first.
*/
pub struct PairContext {
	infos: Vec<SampleInfo>,
	/// For each sample in `infos`, the number of samples with the other best class that come after it.
	opposite_after: Vec<usize>,
	class_counts: [usize; 2],
	t_squared: f64,
	max_diff: f64,
}

impl PairContext {
	pub fn new(dataset: &Dataset) -> PairContext {
		let mut infos: Vec<SampleInfo> = dataset
			.samples()
			.map(|sample| SampleInfo {
				id: sample.id,
				best_class: sample.best_class(),
				diff: (sample.benefit(0) - sample.benefit(1)).abs(),
			})
			.collect();
		// Any consistent ascending order works for pair weights, so this needs a total order rather than the epsilon comparison.
		infos.sort_by(|a, b| a.diff.total_cmp(&b.diff));
		let mut class_counts = [0, 0];
		for info in infos.iter() {
			class_counts[info.best_class] += 1;
		}
		let mut remaining = class_counts;
		let mut opposite_after = Vec::with_capacity(infos.len());
		for info in infos.iter() {
			opposite_after.push(remaining[1 - info.best_class]);
			remaining[info.best_class] -= 1;
		}
		let diffs_by_class = |class: usize| -> Vec<f64> {
			infos
				.iter()
				.filter(|info| info.best_class == class)
				.map(|info| info.diff)
				.collect()
		};
		let (diffs_0, diffs_1) = (diffs_by_class(0), diffs_by_class(1));
		let t_squared = matching_sums(&diffs_0, &diffs_1) + matching_sums(&diffs_1, &diffs_0);
		let max_diff = infos.last().map(|info| info.diff).unwrap_or(0.0);
		PairContext {
			infos,
			opposite_after,
			class_counts,
			t_squared,
			max_diff,
		}
	}

	pub fn infos(&self) -> &[SampleInfo] {
		&self.infos
	}

	/// Score a split that sends each sample to one of `n_bins` bins.
	pub fn nominal_score<F>(&self, n_bins: usize, bin: F) -> SplitScore
	where
		F: Fn(&SampleInfo) -> usize,
	{
		let bins: Vec<usize> = self.infos.iter().map(|info| bin(info)).collect();
		let mut remaining = self.class_counts;
		let mut remaining_by_bin = vec![[0usize; 2]; n_bins];
		for (info, bin) in self.infos.iter().zip(bins.iter()) {
			remaining_by_bin[*bin][info.best_class] += 1;
		}
		let mut distribution: Vec<f64> = remaining_by_bin
			.iter()
			.map(|counts| (counts[0] + counts[1]).to_f64().unwrap())
			.collect();
		let mut score = 0.0;
		let mut separated_squares = 0.0;
		for (info, bin) in self.infos.iter().zip(bins.iter()) {
			let opposite = 1 - info.best_class;
			let separated = (remaining[opposite] - remaining_by_bin[*bin][opposite]).to_f64().unwrap();
			score += info.diff * separated;
			separated_squares += info.diff * info.diff * separated;
			remaining[info.best_class] -= 1;
			remaining_by_bin[*bin][info.best_class] -= 1;
		}
		let n_samples = self.infos.len().to_f64().unwrap();
		if n_samples > 0.0 {
			for fraction in distribution.iter_mut() {
				*fraction /= n_samples;
			}
		}
		SplitScore {
			score,
			distribution,
			separated_squares,
		}
	}

	/// Find the threshold on an ordered attribute with the highest separation score. Samples are swept from the lowest code to the highest while Fenwick trees indexed by diff rank keep the per side, per class benefit sums and counts, so moving one sample across updates the score in O(log n). The winning threshold is then scored as a two bin split.
	pub fn ordered_score(&self, dataset: &Dataset, attribute_index: usize) -> Option<(SplitScore, usize)> {
		let n_samples = self.infos.len();
		if n_samples < 2 {
			return None;
		}
		let codes: Vec<usize> = self
			.infos
			.iter()
			.map(|info| dataset.code(info.id, attribute_index))
			.collect();
		let mut order: Vec<usize> = (0..n_samples).collect();
		order.sort_by_key(|index| codes[*index]);
		let mut left = SideSums::new(n_samples);
		let mut right = SideSums::new(n_samples);
		for (index, info) in self.infos.iter().enumerate() {
			right.update(index + 1, info.best_class, self.benefits(dataset, info), 1.0);
		}
		let mut score = 0.0;
		let mut best: Option<usize> = None;
		let mut best_score = 0.0;
		for (position, index) in order.iter().enumerate() {
			let info = &self.infos[*index];
			let rank = index + 1;
			let opposite = 1 - info.best_class;
			// Pairs with samples still on the right become separated and pairs with samples already on the left stop being separated.
			score += right.weight_with(opposite, rank, info.diff) - left.weight_with(opposite, rank, info.diff);
			let benefits = self.benefits(dataset, info);
			right.update(rank, info.best_class, benefits, -1.0);
			left.update(rank, info.best_class, benefits, 1.0);
			let is_boundary = position + 1 < n_samples && codes[order[position + 1]] != codes[*index];
			if is_boundary && compare(score, best_score) == Ordering::Greater {
				best_score = score;
				best = Some(codes[*index]);
			}
		}
		best.map(|threshold| {
			let split = self.nominal_score(2, |info| {
				if dataset.code(info.id, attribute_index) <= threshold {
					0
				} else {
					1
				}
			});
			(split, threshold)
		})
	}

	fn benefits(&self, dataset: &Dataset, info: &SampleInfo) -> [f64; 2] {
		[dataset.benefit(info.id, 0), dataset.benefit(info.id, 1)]
	}

	/// The expectation and variance of the separation score if each sample were assigned to a bin at random with probabilities `distribution`. A pair is separated with probability `q = sum(p * (1 - p))`, so a pair of weight `w` contributes `w * q` to the expectation and `w^2 * q * (1 - q)` to the variance.
	pub fn random_score(&self, distribution: &[f64]) -> RandomScore {
		let q: f64 = distribution.iter().map(|p| p * (1.0 - p)).sum();
		let mut expected = 0.0;
		let mut variance = 0.0;
		for (info, opposite) in self.infos.iter().zip(self.opposite_after.iter()) {
			let opposite = opposite.to_f64().unwrap();
			expected += info.diff * opposite * q;
			variance += info.diff * info.diff * opposite * q * (1.0 - q);
		}
		RandomScore { expected, variance }
	}

	/// Bound the probability that a random split with the same distribution would score at least as well.
	pub fn bound(&self, bound_type: BoundType, split: &SplitScore) -> f64 {
		let random = self.random_score(&split.distribution);
		let t = split.score - random.expected;
		match bound_type {
			BoundType::Hoeffding => {
				let xstar = self.class_counts[0].max(self.class_counts[1]).to_f64().unwrap();
				hoeffding_bound(t, xstar, split.separated_squares)
			}
			BoundType::MatchingSums => matching_sums_bound(t, self.t_squared),
			BoundType::Bernstein => bernstein_bound(t, random.variance, self.max_diff),
		}
	}
}

/// The Fenwick trees for the samples on one side of an ordered split, indexed by diff rank. `benefits[c][k]` sums benefit `k` over samples whose best class is `c`.
struct SideSums {
	benefits: [[Fenwick; 2]; 2],
	counts: [Fenwick; 2],
}

impl SideSums {
	fn new(n_samples: usize) -> SideSums {
		SideSums {
			benefits: [
				[Fenwick::new(n_samples), Fenwick::new(n_samples)],
				[Fenwick::new(n_samples), Fenwick::new(n_samples)],
			],
			counts: [Fenwick::new(n_samples), Fenwick::new(n_samples)],
		}
	}

	fn update(&mut self, rank: usize, best_class: usize, benefits: [f64; 2], sign: f64) {
		self.benefits[best_class][0].update(rank, sign * benefits[0]);
		self.benefits[best_class][1].update(rank, sign * benefits[1]);
		self.counts[best_class].update(rank, sign);
	}

	/// The total weight of the pairs a sample with this `rank` and `diff` forms with the samples of best class `class` on this side. Samples ranked before it contribute their own diff and samples ranked after it contribute `diff`.
	fn weight_with(&self, class: usize, rank: usize, diff: f64) -> f64 {
		let before = rank - 1;
		let diffs_before =
			self.benefits[class][class].prefix_sum(before) - self.benefits[class][1 - class].prefix_sum(before);
		let count_after = self.counts[class].total() - self.counts[class].prefix_sum(rank);
		diffs_before + diff * count_after
	}
}

/// A scored split of one attribute.
#[derive(Clone, Debug, PartialEq)]
struct Candidate {
	rule: SplitRule,
	score: f64,
	bound: f64,
}

/// Train a tree whose splits are chosen by how unlikely their pairwise separation score is under random assignment. Requires exactly two classes.
pub fn train_pair(dataset: &Dataset, options: &PairOptions) -> Tree {
	assert_eq!(dataset.n_classes(), 2, "pair trees require exactly two classes");
	grow(dataset, options.height, options.min_leaf, &PairSplitChooser { options }).into()
}

struct PairSplitChooser<'a> {
	options: &'a PairOptions,
}

impl<'a> ChooseSplit for PairSplitChooser<'a> {
	fn choose_split(&self, dataset: &Dataset) -> Option<ChosenSplit> {
		let context = PairContext::new(dataset);
		let candidates: Vec<Option<Candidate>> = (0..dataset.n_attributes())
			.into_par_iter()
			.map(|attribute_index| self.evaluate_attribute(&context, dataset, attribute_index))
			.collect();
		let mut best: Option<(usize, Candidate)> = None;
		for (attribute_index, candidate) in candidates.into_iter().enumerate() {
			let candidate = match candidate {
				Some(candidate) => candidate,
				None => continue,
			};
			let is_significant = compare_with_epsilon(candidate.bound, self.options.max_bound, BOUND_EPSILON)
				== Ordering::Less
				&& compare_with_epsilon(candidate.bound, 1.0, BOUND_EPSILON) == Ordering::Less;
			if is_significant && self.is_better(&candidate, best.as_ref().map(|(_, best)| best)) {
				best = Some((attribute_index, candidate));
			}
		}
		best.map(|(attribute_index, candidate)| ChosenSplit {
			attribute_index,
			rule: candidate.rule,
			alpha: candidate.bound,
		})
	}
}

impl<'a> PairSplitChooser<'a> {
	fn is_better(&self, candidate: &Candidate, current: Option<&Candidate>) -> bool {
		match current {
			None => true,
			Some(current) if self.options.use_score => {
				compare(candidate.score, current.score) == Ordering::Greater
			}
			Some(current) => {
				compare_with_epsilon(candidate.bound, current.bound, BOUND_EPSILON) == Ordering::Less
			}
		}
	}

	fn candidate(&self, context: &PairContext, rule: SplitRule, split: SplitScore) -> Candidate {
		Candidate {
			rule,
			bound: context.bound(self.options.bound, &split),
			score: split.score,
		}
	}

	/// Score the nominal split of an attribute, and for ordered attributes also the best threshold, keeping whichever is better.
	fn evaluate_attribute(
		&self,
		context: &PairContext,
		dataset: &Dataset,
		attribute_index: usize,
	) -> Option<Candidate> {
		let attribute_size = dataset.attribute_size(attribute_index);
		let code = |info: &SampleInfo| dataset.code(info.id, attribute_index);
		let mut best: Option<Candidate> = None;
		if self.options.use_nominal_binary {
			for split_code in 0..attribute_size {
				let split = context.nominal_score(2, |info| if code(info) == split_code { 0 } else { 1 });
				let candidate =
					self.candidate(context, SplitRule::NominalBinary { code: split_code }, split);
				if self.is_better(&candidate, best.as_ref()) {
					best = Some(candidate);
				}
			}
		} else {
			let split = context.nominal_score(attribute_size, code);
			best = Some(self.candidate(context, SplitRule::Nominal, split));
		}
		if dataset.attribute_type(attribute_index).is_ordered() {
			if let Some((split, threshold)) = context.ordered_score(dataset, attribute_index) {
				let candidate = self.candidate(context, SplitRule::Ordered { threshold }, split);
				if self.is_better(&candidate, best.as_ref()) {
					best = Some(candidate);
				}
			}
		}
		best
	}
}

#[cfg(test)]
fn load(csv: &str) -> Dataset {
	Dataset::from_reader(
		csv.as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start: 1 },
		},
	)
	.unwrap()
}

#[cfg(test)]
fn random_dataset(seed: u64, n_samples: usize, n_values: usize) -> Dataset {
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	let mut rng = Xoshiro256Plus::seed_from_u64(seed);
	let mut csv = "a,c0,c1\n".to_owned();
	for _ in 0..n_samples {
		csv.push_str(&format!(
			"{},{},{}\n",
			rng.gen_range(0, n_values),
			rng.gen_range(0, 20),
			rng.gen_range(0, 20)
		));
	}
	load(&csv)
}

#[test]
fn test_nominal_score_brute_force() {
	let dataset = random_dataset(1, 30, 4);
	let context = PairContext::new(&dataset);
	let split = context.nominal_score(4, |info| dataset.code(info.id, 0));
	let infos = context.infos();
	let mut expected = 0.0;
	for (i, p) in infos.iter().enumerate() {
		for q in infos[i + 1..].iter() {
			if p.best_class != q.best_class && dataset.code(p.id, 0) != dataset.code(q.id, 0) {
				expected += p.diff.min(q.diff);
			}
		}
	}
	assert!((split.score - expected).abs() < 1e-9);
	assert!((split.distribution.iter().sum::<f64>() - 1.0).abs() < 1e-12);
}

#[test]
fn test_ordered_score_matches_nominal_score() {
	for seed in 0..10 {
		let dataset = random_dataset(seed, 50, 8);
		let context = PairContext::new(&dataset);
		let mut expected: Option<(f64, usize)> = None;
		for threshold in 0..dataset.attribute_size(0) - 1 {
			let split = context.nominal_score(2, |info| {
				if dataset.code(info.id, 0) <= threshold {
					0
				} else {
					1
				}
			});
			let best_score = expected.map(|(score, _)| score).unwrap_or(0.0);
			if compare(split.score, best_score) == Ordering::Greater {
				expected = Some((split.score, threshold));
			}
		}
		let actual = context.ordered_score(&dataset, 0);
		match (expected, actual) {
			(Some((expected_score, expected_threshold)), Some((split, threshold))) => {
				assert!((split.score - expected_score).abs() < 1e-6);
				assert_eq!(threshold, expected_threshold);
			}
			(None, None) => {}
			_ => panic!("the sweep and the recomputation disagree"),
		}
	}
}

#[test]
fn test_random_score() {
	// Two samples of each class, all with diff 10, so there are 4 pairs of weight 10.
	let dataset = load("a,c0,c1\n0,10,0\n0,10,0\n1,0,10\n1,0,10\n");
	let context = PairContext::new(&dataset);
	let random = context.random_score(&[0.5, 0.5]);
	assert!((random.expected - 20.0).abs() < 1e-12);
	assert!((random.variance - 100.0).abs() < 1e-12);
	// A split with a single bin never separates anything.
	let random = context.random_score(&[1.0]);
	assert_eq!(random.expected, 0.0);
}

#[cfg(test)]
fn separable_with_noise() -> Dataset {
	let mut csv = "signal,noise,c0,c1\n".to_owned();
	for i in 0..20 {
		let benefits = if i < 10 { "10,0" } else { "0,10" };
		csv.push_str(&format!("{},{},{}\n", i / 10, i % 2, benefits));
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
fn test_bounds_for_separating_split() {
	let dataset = separable_with_noise();
	let context = PairContext::new(&dataset);
	let signal = context.nominal_score(2, |info| dataset.code(info.id, 0));
	assert_eq!(signal.score, 1000.0);
	let noise = context.nominal_score(2, |info| dataset.code(info.id, 1));
	assert_eq!(noise.score, 500.0);
	for bound_type in &[BoundType::Hoeffding, BoundType::MatchingSums, BoundType::Bernstein] {
		assert!(context.bound(*bound_type, &signal) < 0.1);
		assert_eq!(context.bound(*bound_type, &noise), 1.0);
	}
	assert!((context.bound(BoundType::Hoeffding, &signal) - (-5.0f64).exp()).abs() < 1e-12);
}

#[test]
fn test_hoeffding_bound_for_partial_split() {
	// Bin 0 holds the five class 0 samples with signal 0 and noise 0. Only their 50 pairs with class 1 samples are separated.
	let dataset = separable_with_noise();
	let context = PairContext::new(&dataset);
	let bin = |info: &SampleInfo| {
		if dataset.code(info.id, 0) == 0 && dataset.code(info.id, 1) == 0 {
			0
		} else {
			1
		}
	};
	let split = context.nominal_score(2, bin);
	assert_eq!(split.score, 500.0);
	assert_eq!(split.distribution, vec![0.25, 0.75]);
	let infos = context.infos();
	let mut expected_squares = 0.0;
	for (i, p) in infos.iter().enumerate() {
		for q in infos[i + 1..].iter() {
			if p.best_class != q.best_class && bin(p) != bin(q) {
				expected_squares += p.diff * p.diff;
			}
		}
	}
	assert_eq!(split.separated_squares, expected_squares);
	assert_eq!(split.separated_squares, 5000.0);
	// The random score expects 100 pairs * 10 * 0.375, so t = 125 and the bound is exp(-2 * 125^2 / (10 * 5000)).
	let bound = context.bound(BoundType::Hoeffding, &split);
	assert!((bound - (-0.625f64).exp()).abs() < 1e-12);
}

#[test]
fn test_near_equal_diffs_sort() {
	use rand::{seq::SliceRandom, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	// Consecutive diffs are closer than the comparison epsilon but the first and last are not.
	let mut rows: Vec<String> = (0..200)
		.map(|k| format!("{},{},0", k % 3, 1.0 + k as f64 * 0.6e-9))
		.collect();
	rows.shuffle(&mut Xoshiro256Plus::seed_from_u64(7));
	let csv = format!("a,c0,c1\n{}\n", rows.join("\n"));
	let dataset = load(&csv);
	let context = PairContext::new(&dataset);
	assert_eq!(context.infos().len(), 200);
	assert!(context.infos().windows(2).all(|pair| pair[0].diff <= pair[1].diff));
}

#[test]
fn test_train_pair() {
	let dataset = separable_with_noise();
	for bound in &[BoundType::Hoeffding, BoundType::MatchingSums, BoundType::Bernstein] {
		for use_score in &[false, true] {
			let options = PairOptions {
				max_bound: 0.1,
				bound: *bound,
				use_score: *use_score,
				..Default::default()
			};
			let tree = train_pair(&dataset, &options);
			insta::allow_duplicates! {
				insta::assert_snapshot!(tree.outline(dataset.schema()), @r###"
				signal = 0 : c0
				signal = 1 : c1
				"###);
			}
			assert_eq!(tree, train_pair(&dataset, &options));
		}
	}
}

#[test]
fn test_train_pair_without_signal() {
	let dataset = load("a,c0,c1\n0,10,0\n1,10,0\n0,0,10\n1,0,10\n");
	let tree = train_pair(&dataset, &PairOptions::default());
	assert_eq!(tree.size(), 1);
}
