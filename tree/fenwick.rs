/// A Fenwick tree, also known as a binary indexed tree. It supports adding a value at a position and querying the sum of all values at positions `<=` an index, both in O(log n). Positions are 1-based. There is no removal, so subtract by adding a negative value.
#[derive(Clone, Debug)]
pub struct Fenwick {
	values: Vec<f64>,
}

impl Fenwick {
	pub fn new(size: usize) -> Fenwick {
		Fenwick {
			values: vec![0.0; size + 1],
		}
	}

	pub fn size(&self) -> usize {
		self.values.len() - 1
	}

	pub fn update(&mut self, index: usize, delta: f64) {
		assert!(index > 0 && index < self.values.len());
		let mut index = index;
		while index < self.values.len() {
			self.values[index] += delta;
			index += index & index.wrapping_neg();
		}
	}

	/// The sum of all updates at positions `<= index`. `prefix_sum(0)` is zero.
	pub fn prefix_sum(&self, index: usize) -> f64 {
		let mut index = index.min(self.size());
		let mut sum = 0.0;
		while index > 0 {
			sum += self.values[index];
			index -= index & index.wrapping_neg();
		}
		sum
	}

	pub fn total(&self) -> f64 {
		self.prefix_sum(self.size())
	}
}

#[test]
fn test_fenwick() {
	use rand::{Rng, SeedableRng};
	use rand_xoshiro::Xoshiro256Plus;
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	for size in &[1, 2, 7, 64, 100] {
		let size = *size;
		let mut fenwick = Fenwick::new(size);
		let mut brute = vec![0.0; size + 1];
		for _ in 0..200 {
			let index = rng.gen_range(1, size + 1);
			let delta = rng.gen_range(-10i32, 10i32) as f64;
			fenwick.update(index, delta);
			brute[index] += delta;
			for query in 0..=size {
				let expected: f64 = brute[..=query].iter().sum();
				assert_eq!(fenwick.prefix_sum(query), expected);
			}
		}
		assert_eq!(fenwick.total(), brute.iter().sum::<f64>());
	}
}

#[test]
#[should_panic]
fn test_fenwick_zero_index() {
	Fenwick::new(4).update(0, 1.0);
}
