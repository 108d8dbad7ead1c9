use num_traits::ToPrimitive;
use pine_dataset::Dataset;
use pine_tree::Tree;
use pine_util::compare;
use rayon::prelude::*;
use std::cmp::Ordering;

/// How a tree did on a test set.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct TestResult {
	/// The total benefit of the classes the tree assigned.
	pub score: f64,
	/// `1 - score / best`, where `best` is the benefit of assigning every sample to the test set's single best class. `None` when `best` is zero.
	pub savings: Option<f64>,
	/// The number of nodes in the tree.
	pub size: usize,
	/// The number of samples that reached a branch with no child for their code. They add nothing to the score.
	pub n_unmatched: usize,
}

/// The running totals `test` accumulates. Totals from disjoint sets of samples can be merged.
#[derive(Clone, Copy, Debug, Default)]
struct BenefitMetrics {
	score: f64,
	n_unmatched: usize,
}

impl BenefitMetrics {
	fn update(&mut self, benefit: Option<f64>) {
		match benefit {
			Some(benefit) => self.score += benefit,
			None => self.n_unmatched += 1,
		}
	}

	fn merge(&mut self, other: BenefitMetrics) {
		self.score += other.score;
		self.n_unmatched += other.n_unmatched;
	}

	fn finalize(self, tree: &Tree, best_benefit: f64) -> TestResult {
		let savings = if compare(best_benefit, 0.0) == Ordering::Equal {
			None
		} else {
			Some(1.0 - self.score / best_benefit)
		};
		TestResult {
			score: self.score,
			savings,
			size: tree.size(),
			n_unmatched: self.n_unmatched,
		}
	}
}

/// Classify every sample of `dataset` with `tree` and total the benefits of the assigned classes.
pub fn test(tree: &Tree, dataset: &Dataset) -> TestResult {
	let metrics = dataset
		.sample_ids()
		.par_iter()
		.fold(BenefitMetrics::default, |mut metrics, id| {
			let sample = dataset.sample(*id);
			metrics.update(tree.classify(&sample).map(|class_index| sample.benefit(class_index)));
			metrics
		})
		.reduce(BenefitMetrics::default, |mut a, b| {
			a.merge(b);
			a
		});
	let (_, best_benefit) = dataset.best_class();
	metrics.finalize(tree, best_benefit)
}

/// The mean of each field over several results. Savings are averaged over the results that have them.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct MeanTestResult {
	pub score: f64,
	pub savings: Option<f64>,
	pub size: f64,
	pub n_unmatched: f64,
}

impl MeanTestResult {
	pub fn compute(results: &[TestResult]) -> Option<MeanTestResult> {
		if results.is_empty() {
			return None;
		}
		let n = results.len().to_f64().unwrap();
		let savings: Vec<f64> = results.iter().filter_map(|result| result.savings).collect();
		let mean_savings = if savings.is_empty() {
			None
		} else {
			Some(savings.iter().sum::<f64>() / savings.len().to_f64().unwrap())
		};
		Some(MeanTestResult {
			score: results.iter().map(|result| result.score).sum::<f64>() / n,
			savings: mean_savings,
			size: results.iter().map(|result| result.size.to_f64().unwrap()).sum::<f64>() / n,
			n_unmatched: results
				.iter()
				.map(|result| result.n_unmatched.to_f64().unwrap())
				.sum::<f64>()
				/ n,
		})
	}
}

#[cfg(test)]
use pine_tree::{BranchNode, BranchSplit, LeafNode, Node, NominalSplit};

#[cfg(test)]
fn load() -> Dataset {
	Dataset::from_reader(
		"color,c0,c1\nred,4,1\nred,3,0\nblue,0,5\ngreen,2,2\n".as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start: 1 },
		},
	)
	.unwrap()
}

#[test]
fn test_leaf() {
	let dataset = load();
	let tree = Tree {
		nodes: vec![Node::Leaf(LeafNode { class_index: 0 })],
	};
	let result = test(&tree, &dataset);
	assert_eq!(result.score, 9.0);
	assert_eq!(result.savings, Some(0.0));
	assert_eq!(result.size, 1);
	assert_eq!(result.n_unmatched, 0);
}

#[test]
fn test_unmatched() {
	// The codes are blue, green, red. Green has no child.
	let dataset = load();
	let tree = Tree {
		nodes: vec![
			Node::Branch(BranchNode {
				split: BranchSplit::Nominal(NominalSplit {
					attribute_index: 0,
					child_indices: vec![Some(2), None, Some(1)],
				}),
				prediction: 0,
				pruning: None,
			}),
			Node::Leaf(LeafNode { class_index: 0 }),
			Node::Leaf(LeafNode { class_index: 1 }),
		],
	};
	let result = test(&tree, &dataset);
	assert_eq!(result.score, 12.0);
	assert!((result.savings.unwrap() - (1.0 - 12.0 / 9.0)).abs() < 1e-12);
	assert_eq!(result.n_unmatched, 1);
}

#[test]
fn test_zero_best_benefit() {
	let dataset = Dataset::from_reader(
		"a,c0,c1\n0,0,0\n1,0,0\n".as_bytes(),
		&pine_dataset::LoadOptions {
			labels: pine_dataset::LabelColumns::Benefits { start: 1 },
		},
	)
	.unwrap();
	let tree = Tree {
		nodes: vec![Node::Leaf(LeafNode { class_index: 1 })],
	};
	assert_eq!(test(&tree, &dataset).savings, None);
}

#[test]
fn test_mean() {
	let results = [
		TestResult {
			score: 10.0,
			savings: Some(0.5),
			size: 3,
			n_unmatched: 0,
		},
		TestResult {
			score: 20.0,
			savings: None,
			size: 6,
			n_unmatched: 2,
		},
	];
	let mean = MeanTestResult::compute(&results).unwrap();
	assert_eq!(mean.score, 15.0);
	assert_eq!(mean.savings, Some(0.5));
	assert_eq!(mean.size, 4.5);
	assert_eq!(mean.n_unmatched, 1.0);
	assert_eq!(MeanTestResult::compute(&[]), None);
}
