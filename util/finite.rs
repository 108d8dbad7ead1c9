use std::{
	cmp::Ordering,
	hash::{Hash, Hasher},
};
use thiserror::Error;

/// A real attribute value. It is never NaN or infinite, so unlike a raw `f64` it is totally ordered and can key a hash map.
#[derive(Clone, Copy, Debug)]
pub struct Finite(f64);

#[derive(Debug, Error, PartialEq)]
#[error("{0} is not a finite number")]
pub struct NotFiniteError(pub f64);

impl Finite {
	pub fn new(value: f64) -> Result<Finite, NotFiniteError> {
		if value.is_finite() {
			Ok(Finite(value))
		} else {
			Err(NotFiniteError(value))
		}
	}

	pub fn get(self) -> f64 {
		self.0
	}
}

impl std::fmt::Display for Finite {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl PartialEq for Finite {
	fn eq(&self, other: &Finite) -> bool {
		self.0 == other.0
	}
}

impl Eq for Finite {}

impl PartialOrd for Finite {
	fn partial_cmp(&self, other: &Finite) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Finite {
	fn cmp(&self, other: &Finite) -> Ordering {
		// Neither side can be NaN.
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

impl Hash for Finite {
	fn hash<H: Hasher>(&self, state: &mut H) {
		// 0.0 and -0.0 are equal.
		let value = if self.0 == 0.0 { 0.0 } else { self.0 };
		value.to_bits().hash(state);
	}
}

#[test]
fn test_finite() {
	assert_eq!(Finite::new(f64::NAN).map(Finite::get).ok(), None);
	assert_eq!(
		Finite::new(f64::NEG_INFINITY).unwrap_err(),
		NotFiniteError(f64::NEG_INFINITY)
	);
	let mut values: Vec<Finite> = [2.5, -1.0, 0.0]
		.iter()
		.map(|value| Finite::new(*value).unwrap())
		.collect();
	values.sort();
	let values: Vec<f64> = values.into_iter().map(Finite::get).collect();
	assert_eq!(values, vec![-1.0, 0.0, 2.5]);
}

#[test]
fn test_finite_hash_zero() {
	use std::collections::HashSet;
	let mut set = HashSet::new();
	set.insert(Finite::new(0.0).unwrap());
	assert!(set.contains(&Finite::new(-0.0).unwrap()));
}
