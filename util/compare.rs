use std::cmp::Ordering;

/// The tolerance used when comparing scores, benefits, gains, and impurities.
pub const EPSILON: f64 = 1e-9;

/// The tolerance used when comparing statistical bounds with each other and with a maximum bound.
pub const BOUND_EPSILON: f64 = 1e-7;

/// Compare two floats, treating them as equal if they are within `EPSILON` of each other.
pub fn compare(a: f64, b: f64) -> Ordering {
	compare_with_epsilon(a, b, EPSILON)
}

/// Compare two floats, treating them as equal if they are within `epsilon` of each other.
pub fn compare_with_epsilon(a: f64, b: f64, epsilon: f64) -> Ordering {
	if (a - b).abs() <= epsilon {
		Ordering::Equal
	} else if a < b {
		Ordering::Less
	} else {
		Ordering::Greater
	}
}

#[test]
fn test_compare() {
	assert_eq!(compare(1.0, 1.0 + 1e-10), Ordering::Equal);
	assert_eq!(compare(1.0, 1.0 + 1e-8), Ordering::Less);
	assert_eq!(compare(-3.0, -4.0), Ordering::Greater);
	assert_eq!(compare(0.0, -0.0), Ordering::Equal);
}

#[test]
fn test_compare_with_epsilon() {
	assert_eq!(compare_with_epsilon(0.05, 0.05 + 1e-8, BOUND_EPSILON), Ordering::Equal);
	assert_eq!(compare_with_epsilon(0.05, 0.05 + 1e-8, EPSILON), Ordering::Less);
	assert_eq!(compare_with_epsilon(0.2, 0.1, BOUND_EPSILON), Ordering::Greater);
}
