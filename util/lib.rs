/*!
This crate contains the small numeric helpers shared by every pine crate: the epsilon-tolerant comparator that all score, gain, and bound comparisons go through, and a finite float wrapper that can be used as a hash map key.
*/

pub mod compare;
pub mod finite;

pub use self::compare::{compare, compare_with_epsilon, BOUND_EPSILON, EPSILON};
pub use self::finite::{Finite, NotFiniteError};
