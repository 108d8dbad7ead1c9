use super::*;
use anyhow::{format_err, Context, Result};
use std::{collections::BTreeSet, io::Read, path::Path};
use thiserror::Error;

/// Where the per-class benefits of each row come from.
#[derive(Clone, Debug, PartialEq)]
pub enum LabelColumns {
	/// The last column holds a class label. The classes are the sorted distinct labels and each sample has a benefit of 1 for its own class and 0 for the others.
	Class,
	/// The columns from `start` onward hold the cost of assigning the row to the class named by the column header. The benefit is the negated cost.
	Costs { start: usize },
	/// The columns from `start` onward hold the benefit of assigning the row to the class named by the column header.
	Benefits { start: usize },
}

impl Default for LabelColumns {
	fn default() -> Self {
		LabelColumns::Class
	}
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
	pub labels: LabelColumns,
}

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("the csv has no rows")]
	Empty,
	#[error("the csv has no attribute columns")]
	NoAttributes,
	#[error("label columns start at column {start} but the csv has {n_columns} columns")]
	LabelStart { start: usize, n_columns: usize },
	#[error("the header of {path} does not match the first file")]
	HeaderMismatch { path: String },
	#[error("row {row}, column \"{column}\": \"{value}\" is not a number")]
	InvalidBenefit {
		row: usize,
		column: String,
		value: String,
	},
}

fn read_headers<R>(reader: &mut csv::Reader<R>) -> Result<Vec<String>>
where
	R: Read,
{
	Ok(reader
		.headers()?
		.into_iter()
		.map(|column_name| column_name.to_owned())
		.collect())
}

impl Dataset {
	pub fn from_path(path: &Path, options: &LoadOptions) -> Result<Dataset> {
		let mut reader = csv::ReaderBuilder::new()
			.trim(csv::Trim::All)
			.from_path(path)
			.with_context(|| format!("failed to open {}", path.display()))?;
		Self::from_csv(&mut reader, options)
			.with_context(|| format!("failed to load {}", path.display()))
	}

	pub fn from_reader<R>(reader: R, options: &LoadOptions) -> Result<Dataset>
	where
		R: Read,
	{
		let mut reader = csv::ReaderBuilder::new()
			.trim(csv::Trim::All)
			.from_reader(reader);
		Self::from_csv(&mut reader, options)
	}

	/// Load a dataset from a csv with a header row. Attribute types are inferred per column and attribute codes are sorted into value order before any sample is stored.
	pub fn from_csv<R>(reader: &mut csv::Reader<R>, options: &LoadOptions) -> Result<Dataset>
	where
		R: Read,
	{
		let column_names = read_headers(reader)?;
		let records = reader.records().collect::<Result<Vec<_>, _>>()?;
		Self::from_records(&column_names, records, options)
	}

	/// Load several csvs with identical headers into one arena so that they share attribute codes and classes. Returns the dataset of all samples followed by one dataset per file.
	pub fn from_paths(paths: &[&Path], options: &LoadOptions) -> Result<(Dataset, Vec<Dataset>)> {
		let mut column_names: Option<Vec<String>> = None;
		let mut records = Vec::new();
		let mut ranges = Vec::with_capacity(paths.len());
		for path in paths {
			let mut reader = csv::ReaderBuilder::new()
				.trim(csv::Trim::All)
				.from_path(path)
				.with_context(|| format!("failed to open {}", path.display()))?;
			let headers = read_headers(&mut reader)?;
			match &column_names {
				Some(column_names) if *column_names != headers => {
					return Err(LoadError::HeaderMismatch {
						path: path.display().to_string(),
					}
					.into());
				}
				Some(_) => {}
				None => column_names = Some(headers),
			}
			let start = records.len();
			for record in reader.records() {
				records.push(record.with_context(|| format!("failed to read {}", path.display()))?);
			}
			ranges.push(start..records.len());
		}
		let column_names = column_names.ok_or(LoadError::Empty)?;
		let dataset = Self::from_records(&column_names, records, options)?;
		let parts = ranges
			.into_iter()
			.map(|range| dataset.with_sample_ids(range.collect()))
			.collect();
		Ok((dataset, parts))
	}

	fn from_records(
		column_names: &[String],
		records: Vec<csv::StringRecord>,
		options: &LoadOptions,
	) -> Result<Dataset> {
		let n_columns = column_names.len();
		let n_attributes = match options.labels {
			LabelColumns::Class => n_columns.saturating_sub(1),
			LabelColumns::Costs { start } | LabelColumns::Benefits { start } => {
				if start >= n_columns {
					return Err(LoadError::LabelStart { start, n_columns }.into());
				}
				start
			}
		};
		if n_attributes == 0 {
			return Err(LoadError::NoAttributes.into());
		}
		if records.is_empty() {
			return Err(LoadError::Empty.into());
		}
		let n_samples = records.len();

		// Build each attribute, then sort its codes into value order before filling in the codes of the samples.
		let mut attributes = Vec::with_capacity(n_attributes);
		let mut codes = Array2::zeros((n_samples, n_attributes));
		for (attribute_index, column_name) in column_names.iter().take(n_attributes).enumerate() {
			let attribute_type =
				AttributeType::infer(records.iter().map(|record| &record[attribute_index]));
			let mut attribute = Attribute::new(column_name.clone(), attribute_type);
			let mut column_codes = Vec::with_capacity(n_samples);
			for record in records.iter() {
				let raw = &record[attribute_index];
				let value = attribute_type
					.parse(raw)
					.ok_or_else(|| format_err!("failed to parse \"{}\" in column \"{}\"", raw, column_name))?;
				column_codes.push(attribute.insert(value));
			}
			let remap = attribute.sort_indexes();
			for (sample_index, code) in column_codes.into_iter().enumerate() {
				codes[(sample_index, attribute_index)] = remap[code];
			}
			attributes.push(attribute);
		}

		let (classes, benefits) = match options.labels {
			LabelColumns::Class => {
				let label_index = n_columns - 1;
				let classes: Vec<String> = records
					.iter()
					.map(|record| record[label_index].to_owned())
					.collect::<BTreeSet<_>>()
					.into_iter()
					.collect();
				let mut benefits = Array2::zeros((n_samples, classes.len()));
				for (sample_index, record) in records.iter().enumerate() {
					let class_index = classes
						.iter()
						.position(|class| class == &record[label_index])
						.unwrap();
					benefits[(sample_index, class_index)] = 1.0;
				}
				(classes, benefits)
			}
			LabelColumns::Costs { start } | LabelColumns::Benefits { start } => {
				let sign = if let LabelColumns::Costs { .. } = options.labels {
					-1.0
				} else {
					1.0
				};
				let classes: Vec<String> = column_names[start..].to_vec();
				let mut benefits = Array2::zeros((n_samples, classes.len()));
				for (sample_index, record) in records.iter().enumerate() {
					for (class_index, column_index) in (start..n_columns).enumerate() {
						let raw = &record[column_index];
						let value = lexical::parse::<f64, _>(raw)
							.ok()
							.filter(|value| value.is_finite())
							.ok_or_else(|| LoadError::InvalidBenefit {
								row: sample_index + 1,
								column: column_names[column_index].clone(),
								value: raw.to_owned(),
							})?;
						benefits[(sample_index, class_index)] = sign * value;
					}
				}
				(classes, benefits)
			}
		};

		Ok(Dataset::new(
			Schema {
				attributes,
				classes,
			},
			Samples { codes, benefits },
		))
	}
}

#[test]
fn test_load_class_labels() {
	let csv = "age,color,label\n30,red,no\n9,blue,yes\n10,red,yes\n";
	let dataset = Dataset::from_reader(csv.as_bytes(), &LoadOptions::default()).unwrap();
	let summary: Vec<(&str, AttributeType, Vec<String>)> = dataset
		.schema()
		.attributes
		.iter()
		.map(|attribute| {
			(
				attribute.name(),
				attribute.attribute_type(),
				(0..attribute.size())
					.map(|code| attribute.value(code).to_string())
					.collect(),
			)
		})
		.collect();
	insta::assert_debug_snapshot!(summary, @r###"
	[
	    (
	        "age",
	        Integer,
	        [
	            "9",
	            "10",
	            "30",
	        ],
	    ),
	    (
	        "color",
	        Categorical,
	        [
	            "blue",
	            "red",
	        ],
	    ),
	]
	"###);
	assert_eq!(dataset.classes(), &["no".to_owned(), "yes".to_owned()]);
	let first = dataset.sample(0);
	assert_eq!(first.codes.to_vec(), vec![2, 1]);
	assert_eq!(first.benefits.to_vec(), vec![1.0, 0.0]);
	assert_eq!(dataset.best_class(), (1, 2.0));
}

#[test]
fn test_load_costs() {
	let csv = "dose,treat_a,treat_b\n0.5,3,1\n1.5,2,4\n";
	let dataset = Dataset::from_reader(
		csv.as_bytes(),
		&LoadOptions {
			labels: LabelColumns::Costs { start: 1 },
		},
	)
	.unwrap();
	assert_eq!(dataset.attribute_type(0), AttributeType::Real);
	assert_eq!(dataset.classes(), &["treat_a".to_owned(), "treat_b".to_owned()]);
	assert_eq!(dataset.sample(0).benefits.to_vec(), vec![-3.0, -1.0]);
	assert_eq!(dataset.best_class(), (0, -5.0));
}

#[test]
fn test_load_errors() {
	let options = LoadOptions {
		labels: LabelColumns::Benefits { start: 1 },
	};
	let error = Dataset::from_reader("a,b\n1,oops\n".as_bytes(), &options).unwrap_err();
	assert!(matches!(
		error.downcast_ref::<LoadError>(),
		Some(LoadError::InvalidBenefit { row: 1, .. })
	));
	let error = Dataset::from_reader("a,b\n".as_bytes(), &options).unwrap_err();
	assert!(matches!(error.downcast_ref::<LoadError>(), Some(LoadError::Empty)));
	let options = LoadOptions {
		labels: LabelColumns::Benefits { start: 0 },
	};
	let error = Dataset::from_reader("a,b\n1,2\n".as_bytes(), &options).unwrap_err();
	assert!(matches!(error.downcast_ref::<LoadError>(), Some(LoadError::NoAttributes)));
}

#[test]
fn test_load_paths_share_codes() {
	let dir = std::env::temp_dir().join(format!("pine_dataset_{}", std::process::id()));
	std::fs::create_dir_all(&dir).unwrap();
	let train_path = dir.join("train.csv");
	let test_path = dir.join("test.csv");
	std::fs::write(&train_path, "color,label\nred,yes\nblue,no\n").unwrap();
	std::fs::write(&test_path, "color,label\ngreen,no\nred,yes\n").unwrap();
	let (dataset, parts) =
		Dataset::from_paths(&[train_path.as_path(), test_path.as_path()], &LoadOptions::default()).unwrap();
	assert_eq!(dataset.len(), 4);
	assert_eq!(dataset.attribute_size(0), 3);
	assert_eq!(parts[0].sample_ids(), &[0, 1]);
	assert_eq!(parts[1].sample_ids(), &[2, 3]);
	assert_eq!(dataset.code(0, 0), dataset.code(3, 0));
	std::fs::write(&test_path, "colour,label\ngreen,no\n").unwrap();
	let error = Dataset::from_paths(&[train_path.as_path(), test_path.as_path()], &LoadOptions::default()).unwrap_err();
	assert!(matches!(
		error.downcast_ref::<LoadError>(),
		Some(LoadError::HeaderMismatch { .. })
	));
	std::fs::remove_dir_all(&dir).unwrap();
}
