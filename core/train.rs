use crate::{
	config::{Config, PruneConfig, TrainMode},
	split::{random_split, read_folds, Fold},
	test::{test, MeanTestResult, TestResult},
};
use anyhow::{format_err, Context, Result};
use itertools::iproduct;
use log::{debug, info};
use pine_dataset::{Dataset, LoadOptions};
use pine_tree::{prune, TrainOptions, Tree};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::{
	path::{Path, PathBuf},
	time::Instant,
};

/// What a run produced.
#[derive(Debug)]
pub struct TrainOutput {
	/// The directory every output file was written to.
	pub run_dir: PathBuf,
	pub summaries: Vec<TreeSummary>,
}

/// The results of one configured tree, averaged over the folds.
#[derive(Clone, Debug)]
pub struct TreeSummary {
	pub name: String,
	pub result: MeanTestResult,
	pub train_seconds: f64,
}

/**
Run the experiment described by the config file at `config_path`.

A run directory named after the config and the current time is created inside `output`, or the config's output directory if `output` is `None`. It receives a copy of the config, the outline and json of every trained tree, a `<tree>_sweep.csv` for every tree with a prune sweep, and a `summary.csv` with one row per tree.
*/
pub fn train(config_path: &Path, output: Option<&Path>) -> Result<TrainOutput> {
	let config = Config::from_path(config_path)?;
	let output = output.map(Path::to_path_buf).unwrap_or_else(|| config.output.clone());
	let run_dir = output.join(format!(
		"{}_{}",
		config.name,
		chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
	));
	std::fs::create_dir_all(&run_dir)
		.with_context(|| format!("failed to create run directory {}", run_dir.display()))?;
	info!("writing run \"{}\" to {}", config.name, run_dir.display());
	if let Some(file_name) = config_path.file_name() {
		std::fs::copy(config_path, run_dir.join(file_name))
			.with_context(|| format!("failed to copy {}", config_path.display()))?;
	}

	let folds = load_folds(&config)?;
	info!("loaded {} fold(s) from {}", folds.len(), config.dataset.path.display());

	let mut summaries = Vec::with_capacity(config.trees.len());
	for tree_config in config.trees.iter() {
		let options = tree_config.train_options();
		let run = run_tree(&tree_config.name, &options, tree_config.prune.as_ref(), &folds)?;
		run.write(&run_dir, &tree_config.name, &folds)?;
		let result = MeanTestResult::compute(&run.results)
			.ok_or_else(|| format_err!("tree \"{}\" was not tested on any fold", tree_config.name))?;
		info!(
			"finished tree \"{}\": mean score {}, mean savings {}, mean size {}, {:.3}s",
			tree_config.name,
			result.score,
			format_savings(result.savings),
			result.size,
			run.train_seconds
		);
		summaries.push(TreeSummary {
			name: tree_config.name.clone(),
			result,
			train_seconds: run.train_seconds,
		});
	}
	write_summary(&run_dir.join("summary.csv"), &summaries)?;
	Ok(TrainOutput { run_dir, summaries })
}

/// Load the dataset and split it into folds as the train mode says.
pub fn load_folds(config: &Config) -> Result<Vec<Fold>> {
	let options = LoadOptions {
		labels: (&config.dataset.labels).into(),
	};
	let path = &config.dataset.path;
	let folds = match &config.train_mode {
		TrainMode::TrainingSet => {
			let dataset = Dataset::from_path(path, &options)?;
			vec![Fold {
				train: dataset.clone(),
				test: dataset,
			}]
		}
		TrainMode::TestSet { path: test_path } => {
			let (_, parts) = Dataset::from_paths(&[path.as_path(), test_path.as_path()], &options)?;
			let mut parts = parts.into_iter();
			match (parts.next(), parts.next()) {
				(Some(train), Some(test)) => vec![Fold { train, test }],
				_ => return Err(format_err!("expected a training and a test partition")),
			}
		}
		TrainMode::RandomSplit { ratio, folds, seed } => {
			let dataset = Dataset::from_path(path, &options)?;
			let mut rng = match seed {
				Some(seed) => Xoshiro256Plus::seed_from_u64(*seed),
				None => Xoshiro256Plus::from_entropy(),
			};
			(0..*folds)
				.map(|_| random_split(&dataset, *ratio, &mut rng))
				.collect()
		}
		TrainMode::Split { folds } => {
			let dataset = Dataset::from_path(path, &options)?;
			read_folds(&dataset, path, *folds)?
		}
	};
	Ok(folds)
}

/// Everything one configured tree produced across the folds.
struct TreeRun {
	trees: Vec<Tree>,
	results: Vec<TestResult>,
	sweep: Option<PruneSweep>,
	train_seconds: f64,
}

fn run_tree(
	name: &str,
	options: &TrainOptions,
	prune_config: Option<&PruneConfig>,
	folds: &[Fold],
) -> Result<TreeRun> {
	let mut run = TreeRun {
		trees: Vec::with_capacity(folds.len()),
		results: Vec::with_capacity(folds.len()),
		sweep: prune_config.map(PruneSweep::new),
		train_seconds: 0.0,
	};
	for (fold_index, fold) in folds.iter().enumerate() {
		let n_classes = fold.train.n_classes();
		let requires_two_classes = matches!(options, TrainOptions::Impurity(_) | TrainOptions::Pair(_));
		if n_classes == 0 || (requires_two_classes && n_classes != 2) {
			return Err(format_err!(
				"tree \"{}\" cannot be trained on a dataset with {} classes",
				name,
				n_classes
			));
		}
		info!("training tree \"{}\" on fold {} of {}", name, fold_index + 1, folds.len());
		let start = Instant::now();
		let tree = pine_tree::train(&fold.train, options);
		let elapsed = start.elapsed().as_secs_f64();
		debug!("tree \"{}\" fold {} trained in {:.3}s", name, fold_index + 1, elapsed);
		run.train_seconds += elapsed;
		let result = test(&tree, &fold.test);
		info!(
			"tree \"{}\" fold {}: score {}, savings {}, size {}, unmatched {}",
			name,
			fold_index + 1,
			result.score,
			format_savings(result.savings),
			result.size,
			result.n_unmatched
		);
		if let Some(sweep) = &mut run.sweep {
			sweep.update(&tree, &fold.test);
		}
		run.trees.push(tree);
		run.results.push(result);
	}
	Ok(run)
}

impl TreeRun {
	fn write(&self, run_dir: &Path, name: &str, folds: &[Fold]) -> Result<()> {
		let outline = if self.trees.len() == 1 {
			self.trees[0].outline(folds[0].train.schema())
		} else {
			self.trees
				.iter()
				.zip(folds.iter())
				.enumerate()
				.map(|(fold_index, (tree, fold))| {
					format!("fold {}\n{}", fold_index + 1, tree.outline(fold.train.schema()))
				})
				.collect::<Vec<_>>()
				.join("\n\n")
		};
		let outline_path = run_dir.join(format!("{}.txt", name));
		std::fs::write(&outline_path, outline + "\n")
			.with_context(|| format!("failed to write {}", outline_path.display()))?;
		let json = if self.trees.len() == 1 {
			serde_json::to_string_pretty(&self.trees[0])?
		} else {
			serde_json::to_string_pretty(&self.trees)?
		};
		let json_path = run_dir.join(format!("{}.json", name));
		std::fs::write(&json_path, json)
			.with_context(|| format!("failed to write {}", json_path.display()))?;
		if let Some(sweep) = &self.sweep {
			sweep.write(&run_dir.join(format!("{}_sweep.csv", name)))?;
		}
		Ok(())
	}
}

/// The test results of every pruned version of the trees of each fold, one entry per (alpha, min_samples) pair in row major order.
#[derive(Debug)]
pub struct PruneSweep {
	pub alphas: Vec<f64>,
	pub min_samples: Vec<usize>,
	results: Vec<Vec<TestResult>>,
}

impl PruneSweep {
	pub fn new(config: &PruneConfig) -> PruneSweep {
		PruneSweep {
			alphas: config.alphas.clone(),
			min_samples: config.min_samples.clone(),
			results: vec![Vec::new(); config.alphas.len() * config.min_samples.len()],
		}
	}

	/// Prune `tree` for every pair and test each pruned tree on `test_set`.
	pub fn update(&mut self, tree: &Tree, test_set: &Dataset) {
		let pairs: Vec<(f64, usize)> =
			iproduct!(self.alphas.iter().cloned(), self.min_samples.iter().cloned()).collect();
		let results: Vec<TestResult> = pairs
			.par_iter()
			.map(|(alpha, min_samples)| test(&prune(tree, *alpha, *min_samples), test_set))
			.collect();
		for (results, result) in self.results.iter_mut().zip(results) {
			results.push(result);
		}
	}

	/// The mean savings for each alpha (rows) and min_samples (columns).
	pub fn mean_savings(&self) -> Vec<Vec<Option<f64>>> {
		self.results
			.chunks(self.min_samples.len().max(1))
			.map(|row| {
				row.iter()
					.map(|results| MeanTestResult::compute(results).and_then(|mean| mean.savings))
					.collect()
			})
			.collect()
	}

	fn write(&self, path: &Path) -> Result<()> {
		let mut writer = csv::Writer::from_path(path)
			.with_context(|| format!("failed to create {}", path.display()))?;
		let mut header = vec!["alpha".to_owned()];
		header.extend(self.min_samples.iter().map(|min_samples| min_samples.to_string()));
		writer.write_record(&header)?;
		for (alpha, row) in self.alphas.iter().zip(self.mean_savings()) {
			let mut record = vec![alpha.to_string()];
			record.extend(row.into_iter().map(format_savings));
			writer.write_record(&record)?;
		}
		writer.flush()?;
		Ok(())
	}
}

#[derive(serde::Serialize)]
struct SummaryRow<'a> {
	tree: &'a str,
	score: f64,
	savings: Option<f64>,
	size: f64,
	n_unmatched: f64,
	train_seconds: f64,
}

fn write_summary(path: &Path, summaries: &[TreeSummary]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)
		.with_context(|| format!("failed to create {}", path.display()))?;
	for summary in summaries {
		writer.serialize(SummaryRow {
			tree: &summary.name,
			score: summary.result.score,
			savings: summary.result.savings,
			size: summary.result.size,
			n_unmatched: summary.result.n_unmatched,
			train_seconds: summary.train_seconds,
		})?;
	}
	writer.flush()?;
	Ok(())
}

fn format_savings(savings: Option<f64>) -> String {
	savings.map(|savings| savings.to_string()).unwrap_or_default()
}

#[cfg(test)]
fn temp_dir(name: &str) -> PathBuf {
	let dir = std::env::temp_dir().join(format!("pine_core_{}_{}", name, std::process::id()));
	let _ = std::fs::remove_dir_all(&dir);
	std::fs::create_dir_all(&dir).unwrap();
	dir
}

#[cfg(test)]
fn write_dataset(dir: &Path) {
	let mut csv = "signal,noise,c0,c1\n".to_owned();
	for i in 0..40 {
		let costs = if i % 4 < 2 { "0,10" } else { "10,0" };
		csv.push_str(&format!("{},{},{}\n", i % 4 / 2, i % 3, costs));
	}
	std::fs::write(dir.join("data.csv"), csv).unwrap();
}

#[test]
fn test_train_random_split() {
	let dir = temp_dir("random_split");
	write_dataset(&dir);
	let config_path = dir.join("experiment.yaml");
	std::fs::write(
		&config_path,
		r#"
name: experiment
dataset:
  path: data.csv
  labels: {type: costs, start: 2}
train_mode: {type: random_split, ratio: 0.75, folds: 3, seed: 5}
trees:
  - name: greedy
    type: greedy
    prune: {alphas: [0.5, 1.0], min_samples: [0, 100]}
  - name: pair
    type: pair
    max_bound: 0.5
  - name: draw
    type: draw
    seed: 1
"#,
	)
	.unwrap();
	let output = train(&config_path, Some(&dir.join("runs"))).unwrap();
	assert!(output.run_dir.starts_with(dir.join("runs")));
	assert!(output.run_dir.join("experiment.yaml").exists());
	for name in &["greedy", "pair", "draw"] {
		assert!(output.run_dir.join(format!("{}.txt", name)).exists());
		assert!(output.run_dir.join(format!("{}.json", name)).exists());
	}
	assert!(output.run_dir.join("greedy_sweep.csv").exists());
	assert!(!output.run_dir.join("pair_sweep.csv").exists());
	let summary = std::fs::read_to_string(output.run_dir.join("summary.csv")).unwrap();
	let lines: Vec<&str> = summary.lines().collect();
	assert_eq!(lines.len(), 4);
	assert_eq!(lines[0], "tree,score,savings,size,n_unmatched,train_seconds");
	// The signal attribute separates the classes, so the greedy tree saves everything a single class would cost.
	let greedy = &output.summaries[0];
	assert_eq!(greedy.result.score, 0.0);
	assert_eq!(greedy.result.savings, Some(1.0));
	assert_eq!(greedy.result.size, 3.0);
	std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_prune_sweep() {
	let dir = temp_dir("sweep");
	write_dataset(&dir);
	let dataset = Dataset::from_path(
		&dir.join("data.csv"),
		&LoadOptions {
			labels: pine_dataset::LabelColumns::Costs { start: 2 },
		},
	)
	.unwrap();
	let tree = pine_tree::train(&dataset, &TrainOptions::Greedy(Default::default()));
	let mut sweep = PruneSweep::new(&PruneConfig {
		alphas: vec![-0.5, 1.0],
		min_samples: vec![0, 40],
	});
	sweep.update(&tree, &dataset);
	sweep.update(&tree, &dataset);
	// The root's alpha is 0 and it holds all 40 samples, so a negative alpha or a min_samples of 40 collapses it to a leaf that saves nothing.
	assert_eq!(
		sweep.mean_savings(),
		vec![vec![Some(0.0), Some(0.0)], vec![Some(1.0), Some(0.0)]]
	);
	let path = dir.join("sweep.csv");
	sweep.write(&path).unwrap();
	insta::assert_snapshot!(std::fs::read_to_string(&path).unwrap(), @r###"
	alpha,0,40
	-0.5,0,0
	1,1,0
	"###);
	std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_train_split_files() {
	let dir = temp_dir("split");
	write_dataset(&dir);
	let train_ids: Vec<String> = (0..30).map(|id| id.to_string()).collect();
	let test_ids: Vec<String> = (30..40).map(|id| id.to_string()).collect();
	for fold in 0..2 {
		std::fs::write(
			dir.join(format!("data_train_{}.txt", fold)),
			format!("30\n{}\n", train_ids.join("\n")),
		)
		.unwrap();
		std::fs::write(
			dir.join(format!("data_val_{}.txt", fold)),
			format!("10 {}", test_ids.join(" ")),
		)
		.unwrap();
	}
	let config_path = dir.join("split.yaml");
	std::fs::write(
		&config_path,
		"name: split\ndataset: {path: data.csv, labels: {type: costs, start: 2}}\ntrain_mode: {type: split, folds: 2}\ntrees:\n  - {name: backbone, type: backbone, height: 2}\n",
	)
	.unwrap();
	let config = Config::from_path(&config_path).unwrap();
	let folds = load_folds(&config).unwrap();
	assert_eq!(folds.len(), 2);
	assert_eq!(folds[0].train.len(), 30);
	assert_eq!(folds[1].test.sample_ids(), &(30..40).collect::<Vec<_>>()[..]);
	let output = train(&config_path, Some(&dir.join("runs"))).unwrap();
	assert_eq!(output.summaries.len(), 1);
	assert_eq!(output.summaries[0].result.savings, Some(1.0));
	std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_two_class_builders_reject_other_datasets() {
	let dir = temp_dir("classes");
	std::fs::write(dir.join("data.csv"), "a,label\n0,x\n1,y\n2,z\n").unwrap();
	let config_path = dir.join("classes.yaml");
	std::fs::write(
		&config_path,
		"name: classes\ndataset: {path: data.csv}\ntrees:\n  - {name: pair, type: pair}\n",
	)
	.unwrap();
	let error = train(&config_path, Some(&dir.join("runs"))).unwrap_err();
	assert!(error.to_string().contains("3 classes"));
	std::fs::remove_dir_all(&dir).unwrap();
}
