/*!
Tail bounds on the probability that a split's separation score exceeds its expected value by `t` when bins are assigned at random. Every bound returns 1 when `t` is not positive or when its denominator vanishes.
*/

use pine_util::compare;
use std::cmp::Ordering;

/// The tail bound the pairwise split selector uses to judge a split.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundType {
	/// `exp(-2t^2 / (xstar * s))`, where `s` sums the squared weights of the pairs the split separates and `xstar` is the size of the larger class.
	Hoeffding,
	/// `exp(-2t^2 / t_squared)`, where `t_squared` sums the squared maximum change in score from moving a single sample.
	MatchingSums,
	/// `exp(-(v / b^2) h(b t / v))` with `h(x) = (1 + x) ln(1 + x) - x`.
	Bernstein,
}

fn is_degenerate(t: f64, denominator: f64) -> bool {
	compare(t, 0.0) != Ordering::Greater || compare(denominator, 0.0) != Ordering::Greater
}

pub fn hoeffding_bound(t: f64, xstar: f64, separated_squares: f64) -> f64 {
	let denominator = xstar * separated_squares;
	if is_degenerate(t, denominator) {
		return 1.0;
	}
	(-2.0 * t * t / denominator).exp().min(1.0)
}

pub fn matching_sums_bound(t: f64, t_squared: f64) -> f64 {
	if is_degenerate(t, t_squared) {
		return 1.0;
	}
	(-2.0 * t * t / t_squared).exp().min(1.0)
}

pub fn bernstein_bound(t: f64, variance: f64, max_increment: f64) -> f64 {
	if is_degenerate(t, variance) || is_degenerate(t, max_increment) {
		return 1.0;
	}
	let x = max_increment * t / variance;
	let h = (1.0 + x) * x.ln_1p() - x;
	(-(variance / (max_increment * max_increment)) * h).exp().min(1.0)
}

/// For each value `x` in `a`, sum `min(x, y)` over every `y` in `b`, then return the sum of the squares of those sums. Both slices must be sorted ascending.
pub fn matching_sums(a: &[f64], b: &[f64]) -> f64 {
	let mut prefix_sums = Vec::with_capacity(b.len() + 1);
	prefix_sums.push(0.0);
	for value in b {
		prefix_sums.push(prefix_sums[prefix_sums.len() - 1] + value);
	}
	let mut n_smaller = 0;
	let mut total = 0.0;
	for x in a {
		while n_smaller < b.len() && b[n_smaller] < *x {
			n_smaller += 1;
		}
		let sum = prefix_sums[n_smaller] + x * (b.len() - n_smaller) as f64;
		total += sum * sum;
	}
	total
}

#[test]
fn test_bounds_are_one_without_signal() {
	assert_eq!(hoeffding_bound(0.0, 3.0, 10.0), 1.0);
	assert_eq!(hoeffding_bound(-5.0, 3.0, 10.0), 1.0);
	assert_eq!(hoeffding_bound(5.0, 0.0, 10.0), 1.0);
	assert_eq!(matching_sums_bound(-1.0, 10.0), 1.0);
	assert_eq!(matching_sums_bound(1.0, 0.0), 1.0);
	assert_eq!(bernstein_bound(0.0, 4.0, 2.0), 1.0);
	assert_eq!(bernstein_bound(3.0, 0.0, 2.0), 1.0);
	assert_eq!(bernstein_bound(3.0, 4.0, 0.0), 1.0);
}

#[test]
fn test_bounds_are_monotonic() {
	let bounds: Vec<Box<dyn Fn(f64) -> f64>> = vec![
		Box::new(|t| hoeffding_bound(t, 10.0, 10_000.0)),
		Box::new(|t| matching_sums_bound(t, 200_000.0)),
		Box::new(|t| bernstein_bound(t, 2_500.0, 10.0)),
	];
	for bound in bounds.iter() {
		let mut previous = 1.0;
		for step in 1..200 {
			let value = bound(step as f64 * 5.0);
			assert!(value <= previous);
			assert!(value >= 0.0);
			previous = value;
		}
		assert!(previous < 0.01);
	}
}

#[test]
fn test_matching_sums() {
	// min sums: for 1: 1 + 1 = 2, for 3: 2 + 3 = 5.
	assert_eq!(matching_sums(&[1.0, 3.0], &[2.0, 4.0]), 4.0 + 25.0);
	// min sums: for 2: 1 + 2 = 3, for 4: 1 + 3 = 4.
	assert_eq!(matching_sums(&[2.0, 4.0], &[1.0, 3.0]), 9.0 + 16.0);
	assert_eq!(matching_sums(&[], &[1.0]), 0.0);
}
