//! This module contains the main entrypoint to the pine cli.

use anyhow::{format_err, Result};
use clap::{ArgEnum, Parser};
use colored::Colorize;
use pine_dataset::{Dataset, LabelColumns, LoadOptions};
use pine_tree::{
	BackboneOptions, DrawOptions, GreedyOptions, ImpurityOptions, PairOptions, TrainOptions,
};
use std::path::PathBuf;

#[derive(Parser)]
#[clap(
	about = "Grow decision trees that maximize benefit.",
	disable_help_subcommand = true,
)]
enum Options {
	#[clap(name = "train")]
	Train(TrainArgs),
	#[clap(name = "tree")]
	Tree(TreeArgs),
}

/// run the experiment described by a config file
#[derive(Parser, Debug)]
struct TrainArgs {
	/// the path to the experiment's .yaml config file
	#[clap(short, long)]
	config: PathBuf,
	/// the directory to create the run directory in, overriding the config's output
	#[clap(short, long)]
	output: Option<PathBuf>,
}

/// train one tree on a csv file and print it
#[derive(Parser, Debug)]
struct TreeArgs {
	/// the path to your .csv file
	#[clap(short, long)]
	file: PathBuf,
	/// how the label columns of the csv file are laid out
	#[clap(long, arg_enum, default_value = "class")]
	labels: LabelsArg,
	/// the index of the first cost or benefit column
	#[clap(long)]
	start: Option<usize>,
	/// the builder to train with
	#[clap(short = 't', long = "type", arg_enum, default_value = "greedy")]
	builder: BuilderArg,
	/// the maximum height of the tree
	#[clap(long)]
	height: Option<usize>,
}

#[derive(ArgEnum, Clone, Copy, Debug)]
enum LabelsArg {
	Class,
	Costs,
	Benefits,
}

#[derive(ArgEnum, Clone, Copy, Debug)]
enum BuilderArg {
	Greedy,
	Impurity,
	Pair,
	Backbone,
	Draw,
}

fn main() {
	let env = env_logger::Env::default().default_filter_or("info");
	env_logger::Builder::from_env(env)
		.format_module_path(false)
		.format_timestamp(None)
		.init();
	let options = Options::parse();
	let result = match options {
		Options::Train(args) => cli_train(args),
		Options::Tree(args) => cli_tree(args),
	};
	if let Err(error) = result {
		eprintln!("{}: {:#}", "error".red().bold(), error);
		std::process::exit(1);
	}
}

fn cli_train(args: TrainArgs) -> Result<()> {
	let output = pine_core::train(&args.config, args.output.as_deref())?;
	for summary in output.summaries.iter() {
		let savings = summary
			.result
			.savings
			.map(|savings| format!("{:.4}", savings))
			.unwrap_or_else(|| "-".to_owned());
		eprintln!(
			"{} score {:.4} savings {} size {:.1} ({:.3}s)",
			summary.name.bold(),
			summary.result.score,
			savings,
			summary.result.size,
			summary.train_seconds
		);
	}
	eprintln!("The results were written to {}.", output.run_dir.display());
	Ok(())
}

fn cli_tree(args: TreeArgs) -> Result<()> {
	let labels = match (args.labels, args.start) {
		(LabelsArg::Class, _) => LabelColumns::Class,
		(LabelsArg::Costs, Some(start)) => LabelColumns::Costs { start },
		(LabelsArg::Benefits, Some(start)) => LabelColumns::Benefits { start },
		(_, None) => return Err(format_err!("--start is required for cost and benefit labels")),
	};
	let dataset = Dataset::from_path(&args.file, &LoadOptions { labels })?;
	if dataset.n_classes() == 0 {
		return Err(format_err!("{} has no samples", args.file.display()));
	}
	let options = train_options(args.builder, args.height);
	if matches!(options, TrainOptions::Impurity(_) | TrainOptions::Pair(_)) && dataset.n_classes() != 2 {
		return Err(format_err!(
			"this builder needs exactly 2 classes but the dataset has {}",
			dataset.n_classes()
		));
	}
	let tree = pine_tree::train(&dataset, &options);
	println!("{}", tree.outline(dataset.schema()));
	let result = pine_core::test(&tree, &dataset);
	let savings = result
		.savings
		.map(|savings| savings.to_string())
		.unwrap_or_else(|| "-".to_owned());
	eprintln!(
		"training set score {} savings {} size {} unmatched {}",
		result.score, savings, result.size, result.n_unmatched
	);
	Ok(())
}

fn train_options(builder: BuilderArg, height: Option<usize>) -> TrainOptions {
	match builder {
		BuilderArg::Greedy => {
			let default = GreedyOptions::default();
			TrainOptions::Greedy(GreedyOptions {
				height: height.unwrap_or(default.height),
				..default
			})
		}
		BuilderArg::Impurity => {
			let default = ImpurityOptions::default();
			TrainOptions::Impurity(ImpurityOptions {
				height: height.unwrap_or(default.height),
				..default
			})
		}
		BuilderArg::Pair => {
			let default = PairOptions::default();
			TrainOptions::Pair(PairOptions {
				height: height.unwrap_or(default.height),
				..default
			})
		}
		BuilderArg::Backbone => {
			let default = BackboneOptions::default();
			TrainOptions::Backbone(BackboneOptions {
				height: height.unwrap_or(default.height),
				..default
			})
		}
		BuilderArg::Draw => {
			let default = DrawOptions::default();
			TrainOptions::Draw(DrawOptions {
				height: height.unwrap_or(default.height),
				..default
			})
		}
	}
}
