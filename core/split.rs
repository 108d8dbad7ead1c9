use anyhow::{Context, Result};
use num_traits::ToPrimitive;
use pine_dataset::Dataset;
use rand::{seq::SliceRandom, Rng};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The training and test partitions of one fold. Both are views of the same arena.
#[derive(Clone, Debug)]
pub struct Fold {
	pub train: Dataset,
	pub test: Dataset,
}

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
	#[error("the index file is empty")]
	MissingCount,
	#[error("\"{0}\" is not a sample index")]
	InvalidIndex(String),
	#[error("the index file declares {expected} samples but lists {found}")]
	CountMismatch { expected: usize, found: usize },
	#[error("sample index {index} is out of range for a dataset of {n_samples} samples")]
	OutOfRange { index: usize, n_samples: usize },
}

/// Shuffle the samples and train on the first `ratio` of them, rounded down, testing on the rest. The ids in both partitions are sorted.
pub fn random_split<R>(dataset: &Dataset, ratio: f64, rng: &mut R) -> Fold
where
	R: Rng,
{
	let mut sample_ids = dataset.sample_ids().to_owned();
	sample_ids.shuffle(rng);
	let n_train = (dataset.len().to_f64().unwrap() * ratio)
		.floor()
		.to_usize()
		.unwrap()
		.min(sample_ids.len());
	let mut test_ids = sample_ids.split_off(n_train);
	sample_ids.sort_unstable();
	test_ids.sort_unstable();
	Fold {
		train: dataset.with_sample_ids(sample_ids),
		test: dataset.with_sample_ids(test_ids),
	}
}

/// The index files for fold `fold` of the dataset at `path`: `<stem>_train_<fold>.txt` and `<stem>_val_<fold>.txt`, next to the dataset.
pub fn fold_paths(path: &Path, fold: usize) -> (PathBuf, PathBuf) {
	let stem = path
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_default();
	(
		path.with_file_name(format!("{}_train_{}.txt", stem, fold)),
		path.with_file_name(format!("{}_val_{}.txt", stem, fold)),
	)
}

/// Parse an index file. The first number is the count of sample indices that follow. Numbers are separated by any whitespace. The indices are returned sorted.
pub fn parse_indices(text: &str, n_samples: usize) -> Result<Vec<usize>, SplitError> {
	let mut numbers = text.split_whitespace().map(|token| {
		lexical::parse::<usize, _>(token).map_err(|_| SplitError::InvalidIndex(token.to_owned()))
	});
	let expected = numbers.next().ok_or(SplitError::MissingCount)??;
	let mut indices = numbers.collect::<Result<Vec<_>, _>>()?;
	if indices.len() != expected {
		return Err(SplitError::CountMismatch {
			expected,
			found: indices.len(),
		});
	}
	if let Some(index) = indices.iter().find(|index| **index >= n_samples) {
		return Err(SplitError::OutOfRange {
			index: *index,
			n_samples,
		});
	}
	indices.sort_unstable();
	Ok(indices)
}

fn read_indices(path: &Path, n_samples: usize) -> Result<Vec<usize>> {
	let text = std::fs::read_to_string(path)
		.with_context(|| format!("failed to read index file {}", path.display()))?;
	let indices = parse_indices(&text, n_samples)
		.with_context(|| format!("failed to parse index file {}", path.display()))?;
	Ok(indices)
}

/// Read the precomputed folds of the dataset at `path`.
pub fn read_folds(dataset: &Dataset, path: &Path, n_folds: usize) -> Result<Vec<Fold>> {
	(0..n_folds)
		.map(|fold| {
			let (train_path, test_path) = fold_paths(path, fold);
			Ok(Fold {
				train: dataset.with_sample_ids(read_indices(&train_path, dataset.len())?),
				test: dataset.with_sample_ids(read_indices(&test_path, dataset.len())?),
			})
		})
		.collect()
}

#[test]
fn test_random_split() {
	use rand::SeedableRng;
	use rand_xoshiro::Xoshiro256Plus;
	let mut csv = "a,label\n".to_owned();
	for i in 0..10 {
		csv.push_str(&format!("{},{}\n", i, i % 2));
	}
	let dataset = Dataset::from_reader(csv.as_bytes(), &Default::default()).unwrap();
	let mut rng = Xoshiro256Plus::seed_from_u64(3);
	let fold = random_split(&dataset, 0.75, &mut rng);
	assert_eq!(fold.train.len(), 7);
	assert_eq!(fold.test.len(), 3);
	let mut all: Vec<usize> = fold
		.train
		.sample_ids()
		.iter()
		.chain(fold.test.sample_ids())
		.cloned()
		.collect();
	all.sort_unstable();
	assert_eq!(all, (0..10).collect::<Vec<_>>());
	assert!(fold.train.sample_ids().windows(2).all(|pair| pair[0] < pair[1]));
	let fold = random_split(&dataset, 1.0, &mut rng);
	assert_eq!(fold.train.len(), 10);
	assert!(fold.test.is_empty());
}

#[test]
fn test_fold_paths() {
	let (train, test) = fold_paths(Path::new("data/heart.csv"), 2);
	assert_eq!(train, PathBuf::from("data/heart_train_2.txt"));
	assert_eq!(test, PathBuf::from("data/heart_val_2.txt"));
}

#[test]
fn test_parse_indices() {
	assert_eq!(parse_indices("3\n4 0\n2\n", 5), Ok(vec![0, 2, 4]));
	assert_eq!(parse_indices("0", 5), Ok(vec![]));
	assert_eq!(parse_indices("  \n", 5), Err(SplitError::MissingCount));
	assert_eq!(
		parse_indices("3 1 2", 5),
		Err(SplitError::CountMismatch {
			expected: 3,
			found: 2
		})
	);
	assert_eq!(
		parse_indices("1 x", 5),
		Err(SplitError::InvalidIndex("x".to_owned()))
	);
	assert_eq!(
		parse_indices("2 1 5", 5),
		Err(SplitError::OutOfRange {
			index: 5,
			n_samples: 5
		})
	);
}
