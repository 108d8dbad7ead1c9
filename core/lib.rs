/*!
This crate runs experiments. An experiment is described by a YAML [`Config`](config::Config): a dataset, a train mode that splits it into folds, and a list of trees. [`train`] trains every tree on every fold, tests it, optionally sweeps prune parameters, and writes the results to a run directory.
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod split;
pub mod test;
pub mod train;

pub use self::config::{BuilderConfig, Config, ConfigError, Labels, PruneConfig, TrainMode, TreeConfig};
pub use self::split::{fold_paths, parse_indices, random_split, read_folds, Fold, SplitError};
pub use self::test::{test, MeanTestResult, TestResult};
pub use self::train::{load_folds, train, PruneSweep, TrainOutput, TreeSummary};
