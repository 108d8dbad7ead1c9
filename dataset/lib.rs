/*!
This crate defines the `Dataset` that every tree builder consumes: a schema of attributes and classes, an arena of samples holding one code per attribute and one benefit per class, and a list of the sample ids that belong to this particular partition. Partitioning a dataset only ever produces a new list of ids. The schema and the samples are shared.
*/

use ndarray::prelude::*;
use pine_util::compare;
use std::{cmp::Ordering, sync::Arc};

mod attribute;
mod load;

pub use self::attribute::{Attribute, AttributeType, AttributeValue};
pub use self::load::{LabelColumns, LoadError, LoadOptions};

/// The attributes and class names shared by a dataset and all of its partitions.
#[derive(Debug)]
pub struct Schema {
	pub attributes: Vec<Attribute>,
	pub classes: Vec<String>,
}

/// The sample arena. Row `i` of `codes` holds the attribute codes of sample `i` and row `i` of `benefits` holds its per-class benefits.
#[derive(Debug)]
pub struct Samples {
	pub codes: Array2<usize>,
	pub benefits: Array2<f64>,
}

#[derive(Clone, Debug)]
pub struct Dataset {
	schema: Arc<Schema>,
	samples: Arc<Samples>,
	sample_ids: Vec<usize>,
}

/// A read only view of one sample in the arena.
#[derive(Clone, Copy, Debug)]
pub struct Sample<'a> {
	pub id: usize,
	pub codes: ArrayView1<'a, usize>,
	pub benefits: ArrayView1<'a, f64>,
}

impl<'a> Sample<'a> {
	pub fn code(&self, attribute_index: usize) -> usize {
		self.codes[attribute_index]
	}

	pub fn benefit(&self, class_index: usize) -> f64 {
		self.benefits[class_index]
	}

	/// The class this sample would most like to be assigned to.
	pub fn best_class(&self) -> usize {
		best_class(self.benefits.iter().cloned()).0
	}
}

/// Return the index and value of the largest benefit, comparing with the shared epsilon and breaking ties toward the lower index. An empty iterator yields `(0, 0.0)`.
pub fn best_class<I>(benefits: I) -> (usize, f64)
where
	I: IntoIterator<Item = f64>,
{
	let mut best: Option<(usize, f64)> = None;
	for (class_index, benefit) in benefits.into_iter().enumerate() {
		match best {
			Some((_, best_benefit)) if compare(benefit, best_benefit) != Ordering::Greater => {}
			_ => best = Some((class_index, benefit)),
		}
	}
	best.unwrap_or((0, 0.0))
}

impl Dataset {
	/// Create a dataset containing every sample in the arena.
	pub fn new(schema: Schema, samples: Samples) -> Dataset {
		let n_samples = samples.codes.nrows();
		assert_eq!(samples.codes.ncols(), schema.attributes.len());
		assert_eq!(samples.benefits.ncols(), schema.classes.len());
		assert_eq!(samples.benefits.nrows(), n_samples);
		for (attribute_index, attribute) in schema.attributes.iter().enumerate() {
			assert!(samples
				.codes
				.column(attribute_index)
				.iter()
				.all(|code| *code < attribute.size()));
		}
		Dataset {
			schema: Arc::new(schema),
			samples: Arc::new(samples),
			sample_ids: (0..n_samples).collect(),
		}
	}

	/// Create a dataset that shares this dataset's schema and arena but holds only `sample_ids`.
	pub fn with_sample_ids(&self, sample_ids: Vec<usize>) -> Dataset {
		let n_total = self.n_total_samples();
		assert!(sample_ids.iter().all(|id| *id < n_total));
		Dataset {
			schema: self.schema.clone(),
			samples: self.samples.clone(),
			sample_ids,
		}
	}

	pub fn schema(&self) -> &Schema {
		&self.schema
	}

	pub fn sample_ids(&self) -> &[usize] {
		&self.sample_ids
	}

	/// The number of samples in this partition.
	pub fn len(&self) -> usize {
		self.sample_ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sample_ids.is_empty()
	}

	/// The number of samples in the arena, regardless of partition.
	pub fn n_total_samples(&self) -> usize {
		self.samples.codes.nrows()
	}

	pub fn n_attributes(&self) -> usize {
		self.schema.attributes.len()
	}

	pub fn attribute(&self, attribute_index: usize) -> &Attribute {
		&self.schema.attributes[attribute_index]
	}

	pub fn attribute_type(&self, attribute_index: usize) -> AttributeType {
		self.attribute(attribute_index).attribute_type()
	}

	pub fn attribute_size(&self, attribute_index: usize) -> usize {
		self.attribute(attribute_index).size()
	}

	pub fn n_classes(&self) -> usize {
		self.schema.classes.len()
	}

	pub fn classes(&self) -> &[String] {
		&self.schema.classes
	}

	pub fn sample(&self, id: usize) -> Sample {
		Sample {
			id,
			codes: self.samples.codes.row(id),
			benefits: self.samples.benefits.row(id),
		}
	}

	pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
		self.sample_ids.iter().map(move |id| self.sample(*id))
	}

	pub fn code(&self, id: usize, attribute_index: usize) -> usize {
		self.samples.codes[(id, attribute_index)]
	}

	pub fn benefit(&self, id: usize, class_index: usize) -> f64 {
		self.samples.benefits[(id, class_index)]
	}

	/// The samples of this partition whose code for `attribute_index` is `code`.
	pub fn sub_dataset(&self, attribute_index: usize, code: usize) -> Dataset {
		let sample_ids = self
			.sample_ids
			.iter()
			.cloned()
			.filter(|id| self.code(*id, attribute_index) == code)
			.collect();
		self.with_sample_ids(sample_ids)
	}

	/// Split this partition into `n_children` partitions in one pass. `child_index` maps a sample to the partition it belongs to.
	pub fn partition<F>(&self, n_children: usize, child_index: F) -> Vec<Dataset>
	where
		F: Fn(Sample) -> usize,
	{
		let mut sample_ids = vec![Vec::new(); n_children];
		for sample in self.samples() {
			sample_ids[child_index(sample)].push(sample.id);
		}
		sample_ids
			.into_iter()
			.map(|sample_ids| self.with_sample_ids(sample_ids))
			.collect()
	}

	/// The total benefit of assigning every sample in this partition to `class_index`.
	pub fn class_benefit(&self, class_index: usize) -> f64 {
		self.sample_ids
			.iter()
			.map(|id| self.benefit(*id, class_index))
			.sum()
	}

	/// The total benefit of each class.
	pub fn class_benefits(&self) -> Array1<f64> {
		let mut sums = Array1::zeros(self.n_classes());
		for sample in self.samples() {
			sums += &sample.benefits;
		}
		sums
	}

	/// The class with the largest total benefit and that benefit. Ties go to the lower class index.
	pub fn best_class(&self) -> (usize, f64) {
		best_class(self.class_benefits().iter().cloned())
	}

	/// Whether every sample in this partition has the same best class. An empty partition counts as agreeing.
	pub fn is_all_same_class(&self) -> bool {
		let mut samples = self.samples();
		let first = match samples.next() {
			Some(sample) => sample.best_class(),
			None => return true,
		};
		samples.all(|sample| sample.best_class() == first)
	}

	/// The total benefit of each class for each code of `attribute_index`, with shape `(attribute_size, n_classes)`.
	pub fn class_benefits_by_code(&self, attribute_index: usize) -> Array2<f64> {
		let mut sums = Array2::zeros((self.attribute_size(attribute_index), self.n_classes()));
		for sample in self.samples() {
			let mut row = sums.row_mut(sample.code(attribute_index));
			row += &sample.benefits;
		}
		sums
	}

	/// The number of samples with each code of `attribute_index`.
	pub fn counts_by_code(&self, attribute_index: usize) -> Vec<usize> {
		let mut counts = vec![0; self.attribute_size(attribute_index)];
		for sample in self.samples() {
			counts[sample.code(attribute_index)] += 1;
		}
		counts
	}

	/// The sum over codes of each code's best class benefit. This is the benefit a k-way split on `attribute_index` would realize.
	pub fn partition_benefit(&self, attribute_index: usize) -> f64 {
		self.class_benefits_by_code(attribute_index)
			.genrows()
			.into_iter()
			.map(|row| best_class(row.iter().cloned()).1)
			.sum()
	}
}

#[cfg(test)]
fn separable() -> Dataset {
	let csv = "a,b,yes,no\n0,x,10,0\n0,y,10,0\n1,x,0,10\n1,y,0,10\n";
	Dataset::from_reader(
		csv.as_bytes(),
		&LoadOptions {
			labels: LabelColumns::Benefits { start: 2 },
		},
	)
	.unwrap()
}

#[test]
fn test_best_class_tie() {
	let dataset = separable();
	assert_eq!(dataset.best_class(), (0, 20.0));
	assert_eq!(best_class(vec![1.0, 1.0 + 1e-12, 0.5]), (0, 1.0));
	assert_eq!(best_class(vec![-3.0, -2.0]), (1, -2.0));
	assert_eq!(best_class(Vec::new()), (0, 0.0));
}

#[test]
fn test_sub_dataset() {
	let dataset = separable();
	let sub = dataset.sub_dataset(0, 1);
	assert_eq!(sub.sample_ids(), &[2, 3]);
	assert_eq!(sub.best_class(), (1, 20.0));
	assert_eq!(sub.class_benefit(0), 0.0);
	assert!(sub.is_all_same_class());
	assert!(!dataset.is_all_same_class());
	// The schema is shared, not copied.
	assert!(std::ptr::eq(sub.schema(), dataset.schema()));
	let sub = sub.sub_dataset(1, 0);
	assert_eq!(sub.sample_ids(), &[2]);
}

#[test]
fn test_partition() {
	let dataset = separable();
	let children = dataset.partition(2, |sample| if sample.code(1) == 0 { 0 } else { 1 });
	assert_eq!(children[0].sample_ids(), &[0, 2]);
	assert_eq!(children[1].sample_ids(), &[1, 3]);
	assert_eq!(dataset.partition_benefit(0), 40.0);
	assert_eq!(dataset.partition_benefit(1), 20.0);
	assert_eq!(dataset.counts_by_code(1), vec![2, 2]);
	let sums = dataset.class_benefits_by_code(0);
	for (row, expected) in sums.genrows().into_iter().zip(&[[20.0, 0.0], [0.0, 20.0]]) {
		assert_eq!(row.to_vec(), expected.to_vec());
	}
}
