/*!
This module defines the `Config` struct, which describes an experiment: the dataset to load, how to split it into training and test sets, and the trees to train and evaluate. Configs are written in YAML. Builder fields that are left out take the builder's defaults.

```yaml
name: heart
output: runs
dataset:
  path: heart.csv
  labels:
    type: costs
    start: 13
train_mode:
  type: random_split
  ratio: 0.8
  folds: 5
  seed: 42
trees:
  - name: greedy_3
    type: greedy
    height: 3
    prune:
      alphas: [0.9, 0.95, 1.0]
      min_samples: [0, 10]
  - name: pair_hoeffding
    type: pair
    max_bound: 0.05
    bound: hoeffding
```
*/

use anyhow::{Context, Result};
use pine_dataset::LabelColumns;
use pine_tree::{
	BackboneOptions, BackboneValues, BoundType, DrawOptions, GreedyOptions, ImpurityOptions,
	PairOptions, TrainOptions,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Config {
	pub name: String,
	/// The directory each run's directory is created in.
	#[serde(default = "default_output")]
	pub output: PathBuf,
	pub dataset: DatasetConfig,
	#[serde(default)]
	pub train_mode: TrainMode,
	pub trees: Vec<TreeConfig>,
}

fn default_output() -> PathBuf {
	PathBuf::from("output")
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct DatasetConfig {
	pub path: PathBuf,
	#[serde(default)]
	pub labels: Labels,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Labels {
	Class,
	Costs { start: usize },
	Benefits { start: usize },
}

impl Default for Labels {
	fn default() -> Self {
		Labels::Class
	}
}

impl From<&Labels> for LabelColumns {
	fn from(labels: &Labels) -> LabelColumns {
		match labels {
			Labels::Class => LabelColumns::Class,
			Labels::Costs { start } => LabelColumns::Costs { start: *start },
			Labels::Benefits { start } => LabelColumns::Benefits { start: *start },
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainMode {
	/// Train and test on the whole dataset.
	TrainingSet,
	/// Train on the whole dataset and test on the csv at `path`.
	TestSet { path: PathBuf },
	/// Repeat `folds` times: train on a random `ratio` of the samples and test on the rest.
	RandomSplit {
		ratio: f64,
		folds: usize,
		seed: Option<u64>,
	},
	/// Read the samples of each fold from index files next to the dataset.
	Split { folds: usize },
}

impl Default for TrainMode {
	fn default() -> Self {
		TrainMode::TrainingSet
	}
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct TreeConfig {
	pub name: String,
	#[serde(flatten)]
	pub builder: BuilderConfig,
	pub prune: Option<PruneConfig>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
pub struct PruneConfig {
	pub alphas: Vec<f64>,
	pub min_samples: Vec<usize>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuilderConfig {
	Greedy(GreedyConfig),
	Impurity(ImpurityConfig),
	Pair(PairConfig),
	Backbone(BackboneConfig),
	Draw(DrawConfig),
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct GreedyConfig {
	pub height: Option<usize>,
	pub min_leaf: Option<usize>,
	pub min_gain: Option<f64>,
	pub percentiles: Option<usize>,
	pub use_nominal_binary: Option<bool>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ImpurityConfig {
	pub height: Option<usize>,
	pub min_leaf: Option<usize>,
	pub min_gain: Option<f64>,
	pub use_nominal_binary: Option<bool>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct PairConfig {
	pub height: Option<usize>,
	pub min_leaf: Option<usize>,
	pub max_bound: Option<f64>,
	pub bound: Option<BoundConfig>,
	pub use_score: Option<bool>,
	pub use_nominal_binary: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundConfig {
	Hoeffding,
	MatchingSums,
	Bernstein,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct BackboneConfig {
	pub height: Option<usize>,
	pub values: Option<BackboneValuesConfig>,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackboneValuesConfig {
	All,
	MostFrequent,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct DrawConfig {
	pub height: Option<usize>,
	pub min_leaf: Option<usize>,
	pub total_draws: Option<usize>,
	pub seed: Option<u64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
	#[error("the config has no trees")]
	NoTrees,
	#[error("more than one tree is named \"{0}\"")]
	DuplicateTreeName(String),
	#[error("tree \"{0}\" is not annotated for pruning, so it cannot have a prune sweep")]
	PruneNotSupported(String),
	#[error("the prune sweep of tree \"{0}\" needs at least one alpha and one min_samples")]
	EmptyPruneSweep(String),
	#[error("the random split ratio must be in (0, 1] but is {0}")]
	InvalidRatio(f64),
	#[error("the train mode needs at least one fold")]
	NoFolds,
}

impl Config {
	/// Read, parse, and validate a config file. Relative dataset paths are resolved against the directory containing the config file.
	pub fn from_path(path: &Path) -> Result<Config> {
		let text = std::fs::read_to_string(path)
			.with_context(|| format!("failed to read config file {}", path.display()))?;
		let mut config = Self::from_yaml(&text)
			.with_context(|| format!("failed to parse config file {}", path.display()))?;
		if let Some(dir) = path.parent() {
			config.resolve_paths(dir);
		}
		Ok(config)
	}

	pub fn from_yaml(text: &str) -> Result<Config> {
		let config: Config = serde_yaml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	fn resolve_paths(&mut self, dir: &Path) {
		self.dataset.path = dir.join(&self.dataset.path);
		if let TrainMode::TestSet { path } = &mut self.train_mode {
			*path = dir.join(path.as_path());
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.trees.is_empty() {
			return Err(ConfigError::NoTrees);
		}
		for (index, tree) in self.trees.iter().enumerate() {
			if self.trees[..index].iter().any(|other| other.name == tree.name) {
				return Err(ConfigError::DuplicateTreeName(tree.name.clone()));
			}
			if let Some(prune) = &tree.prune {
				if !tree.train_options().is_prunable() {
					return Err(ConfigError::PruneNotSupported(tree.name.clone()));
				}
				if prune.alphas.is_empty() || prune.min_samples.is_empty() {
					return Err(ConfigError::EmptyPruneSweep(tree.name.clone()));
				}
			}
		}
		match self.train_mode {
			TrainMode::RandomSplit { ratio, .. } if !(ratio > 0.0 && ratio <= 1.0) => {
				Err(ConfigError::InvalidRatio(ratio))
			}
			TrainMode::RandomSplit { folds: 0, .. } | TrainMode::Split { folds: 0 } => {
				Err(ConfigError::NoFolds)
			}
			_ => Ok(()),
		}
	}
}

impl TreeConfig {
	/// The builder options this tree trains with, with unset fields taking the builder's defaults.
	pub fn train_options(&self) -> TrainOptions {
		match &self.builder {
			BuilderConfig::Greedy(config) => {
				let default = GreedyOptions::default();
				TrainOptions::Greedy(GreedyOptions {
					height: config.height.unwrap_or(default.height),
					min_leaf: config.min_leaf.unwrap_or(default.min_leaf),
					min_gain: config.min_gain.unwrap_or(default.min_gain),
					percentiles: config.percentiles.unwrap_or(default.percentiles),
					use_nominal_binary: config.use_nominal_binary.unwrap_or(default.use_nominal_binary),
				})
			}
			BuilderConfig::Impurity(config) => {
				let default = ImpurityOptions::default();
				TrainOptions::Impurity(ImpurityOptions {
					height: config.height.unwrap_or(default.height),
					min_leaf: config.min_leaf.unwrap_or(default.min_leaf),
					min_gain: config.min_gain.unwrap_or(default.min_gain),
					use_nominal_binary: config.use_nominal_binary.unwrap_or(default.use_nominal_binary),
				})
			}
			BuilderConfig::Pair(config) => {
				let default = PairOptions::default();
				TrainOptions::Pair(PairOptions {
					height: config.height.unwrap_or(default.height),
					min_leaf: config.min_leaf.unwrap_or(default.min_leaf),
					max_bound: config.max_bound.unwrap_or(default.max_bound),
					bound: config.bound.map(Into::into).unwrap_or(default.bound),
					use_score: config.use_score.unwrap_or(default.use_score),
					use_nominal_binary: config.use_nominal_binary.unwrap_or(default.use_nominal_binary),
				})
			}
			BuilderConfig::Backbone(config) => {
				let default = BackboneOptions::default();
				TrainOptions::Backbone(BackboneOptions {
					height: config.height.unwrap_or(default.height),
					values: config.values.map(Into::into).unwrap_or(default.values),
				})
			}
			BuilderConfig::Draw(config) => {
				let default = DrawOptions::default();
				TrainOptions::Draw(DrawOptions {
					height: config.height.unwrap_or(default.height),
					min_leaf: config.min_leaf.unwrap_or(default.min_leaf),
					total_draws: config.total_draws.unwrap_or(default.total_draws),
					seed: config.seed.or(default.seed),
				})
			}
		}
	}
}

impl From<BoundConfig> for BoundType {
	fn from(bound: BoundConfig) -> BoundType {
		match bound {
			BoundConfig::Hoeffding => BoundType::Hoeffding,
			BoundConfig::MatchingSums => BoundType::MatchingSums,
			BoundConfig::Bernstein => BoundType::Bernstein,
		}
	}
}

impl From<BackboneValuesConfig> for BackboneValues {
	fn from(values: BackboneValuesConfig) -> BackboneValues {
		match values {
			BackboneValuesConfig::All => BackboneValues::All,
			BackboneValuesConfig::MostFrequent => BackboneValues::MostFrequent,
		}
	}
}

#[test]
fn test_parse() {
	let config = Config::from_yaml(
		r#"
name: heart
dataset:
  path: heart.csv
  labels:
    type: costs
    start: 2
train_mode:
  type: random_split
  ratio: 0.8
  folds: 5
  seed: 42
trees:
  - name: greedy
    type: greedy
    height: 4
    use_nominal_binary: true
    prune:
      alphas: [0.9, 1.0]
      min_samples: [0, 10]
  - name: pair
    type: pair
    bound: matching_sums
  - name: backbone
    type: backbone
    values: most_frequent
"#,
	)
	.unwrap();
	assert_eq!(config.output, PathBuf::from("output"));
	assert_eq!(
		LabelColumns::from(&config.dataset.labels),
		LabelColumns::Costs { start: 2 }
	);
	assert_eq!(
		config.train_mode,
		TrainMode::RandomSplit {
			ratio: 0.8,
			folds: 5,
			seed: Some(42),
		}
	);
	assert_eq!(
		config.trees[0].train_options(),
		TrainOptions::Greedy(GreedyOptions {
			height: 4,
			use_nominal_binary: true,
			..Default::default()
		})
	);
	assert_eq!(
		config.trees[0].prune,
		Some(PruneConfig {
			alphas: vec![0.9, 1.0],
			min_samples: vec![0, 10],
		})
	);
	assert_eq!(
		config.trees[1].train_options(),
		TrainOptions::Pair(PairOptions {
			bound: BoundType::MatchingSums,
			..Default::default()
		})
	);
	assert_eq!(
		config.trees[2].train_options(),
		TrainOptions::Backbone(BackboneOptions {
			values: BackboneValues::MostFrequent,
			..Default::default()
		})
	);
}

#[test]
fn test_validate() {
	let errors = vec![
		(
			"name: a\ndataset: {path: a.csv}\ntrees: []\n",
			ConfigError::NoTrees,
		),
		(
			"name: a\ndataset: {path: a.csv}\ntrees:\n  - {name: t, type: greedy}\n  - {name: t, type: draw}\n",
			ConfigError::DuplicateTreeName("t".to_owned()),
		),
		(
			"name: a\ndataset: {path: a.csv}\ntrees:\n  - {name: t, type: draw, prune: {alphas: [1.0], min_samples: [0]}}\n",
			ConfigError::PruneNotSupported("t".to_owned()),
		),
		(
			"name: a\ndataset: {path: a.csv}\ntrees:\n  - {name: t, type: pair, prune: {alphas: [], min_samples: [0]}}\n",
			ConfigError::EmptyPruneSweep("t".to_owned()),
		),
		(
			"name: a\ndataset: {path: a.csv}\ntrain_mode: {type: random_split, ratio: 1.5, folds: 2}\ntrees:\n  - {name: t, type: greedy}\n",
			ConfigError::InvalidRatio(1.5),
		),
		(
			"name: a\ndataset: {path: a.csv}\ntrain_mode: {type: split, folds: 0}\ntrees:\n  - {name: t, type: greedy}\n",
			ConfigError::NoFolds,
		),
	];
	for (text, expected) in errors {
		let error = Config::from_yaml(text).unwrap_err();
		assert_eq!(error.downcast_ref::<ConfigError>(), Some(&expected));
	}
}
