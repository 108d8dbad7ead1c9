use fnv::FnvHashMap;
use pine_util::Finite;

/// The type of an attribute, inferred from the raw text of its column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
	Integer,
	Real,
	Categorical,
}

impl AttributeType {
	/// Integer and real attributes are ordered and can be split by a threshold. Categorical attributes are nominal.
	pub fn is_ordered(self) -> bool {
		match self {
			AttributeType::Integer | AttributeType::Real => true,
			AttributeType::Categorical => false,
		}
	}

	/// A column is an integer column if every value parses as an integer, a real column if every value parses as a finite float, and a categorical column otherwise.
	pub fn infer<'a, I>(values: I) -> AttributeType
	where
		I: IntoIterator<Item = &'a str>,
	{
		let mut attribute_type = AttributeType::Integer;
		for value in values {
			if attribute_type == AttributeType::Integer && lexical::parse::<i64, _>(value).is_err() {
				attribute_type = AttributeType::Real;
			}
			if attribute_type == AttributeType::Real
				&& !lexical::parse::<f64, _>(value)
					.map(|value| value.is_finite())
					.unwrap_or(false)
			{
				return AttributeType::Categorical;
			}
		}
		attribute_type
	}

	pub fn parse(self, raw: &str) -> Option<AttributeValue> {
		match self {
			AttributeType::Integer => lexical::parse::<i64, _>(raw)
				.ok()
				.map(AttributeValue::Integer),
			AttributeType::Real => lexical::parse::<f64, _>(raw)
				.ok()
				.and_then(|value| Finite::new(value).ok())
				.map(AttributeValue::Real),
			AttributeType::Categorical => Some(AttributeValue::Categorical(raw.to_owned())),
		}
	}
}

/// A single attribute value. All the values of one attribute have the same variant, so the derived ordering is the value order of the attribute.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeValue {
	Integer(i64),
	Real(Finite),
	Categorical(String),
}

impl std::fmt::Display for AttributeValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			AttributeValue::Integer(value) => write!(f, "{}", value),
			AttributeValue::Real(value) => write!(f, "{}", value),
			AttributeValue::Categorical(value) => write!(f, "{}", value),
		}
	}
}

/// An `Attribute` is a dictionary from the raw values of a column to dense integer codes. Codes are assigned in the order values are first seen and can be re-sorted into value order with `sort_indexes`.
#[derive(Clone, Debug)]
pub struct Attribute {
	name: String,
	attribute_type: AttributeType,
	values: Vec<AttributeValue>,
	frequencies: Vec<usize>,
	codes: FnvHashMap<AttributeValue, usize>,
}

impl Attribute {
	pub fn new(name: String, attribute_type: AttributeType) -> Attribute {
		Attribute {
			name,
			attribute_type,
			values: Vec::new(),
			frequencies: Vec::new(),
			codes: FnvHashMap::default(),
		}
	}

	/// Record one occurrence of `value` and return its code.
	pub fn insert(&mut self, value: AttributeValue) -> usize {
		if let Some(&code) = self.codes.get(&value) {
			self.frequencies[code] += 1;
			return code;
		}
		let code = self.values.len();
		self.codes.insert(value.clone(), code);
		self.values.push(value);
		self.frequencies.push(1);
		code
	}

	/// Reassign codes so that they follow value order. The codes, the frequencies, and the reverse lookup are remapped together. The return value maps each old code to its new code, so codes handed out before the sort must be translated with it.
	pub fn sort_indexes(&mut self) -> Vec<usize> {
		let mut order: Vec<usize> = (0..self.values.len()).collect();
		order.sort_by(|a, b| self.values[*a].cmp(&self.values[*b]));
		let mut remap = vec![0; order.len()];
		for (new_code, old_code) in order.iter().enumerate() {
			remap[*old_code] = new_code;
		}
		let values: Vec<AttributeValue> = order.iter().map(|code| self.values[*code].clone()).collect();
		let frequencies: Vec<usize> = order.iter().map(|code| self.frequencies[*code]).collect();
		for code in self.codes.values_mut() {
			*code = remap[*code];
		}
		self.values = values;
		self.frequencies = frequencies;
		remap
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn attribute_type(&self) -> AttributeType {
		self.attribute_type
	}

	/// The number of distinct values.
	pub fn size(&self) -> usize {
		self.values.len()
	}

	pub fn code(&self, value: &AttributeValue) -> Option<usize> {
		self.codes.get(value).copied()
	}

	/// Parse `raw` with this attribute's type and look up its code.
	pub fn code_of(&self, raw: &str) -> Option<usize> {
		self.attribute_type
			.parse(raw)
			.and_then(|value| self.code(&value))
	}

	pub fn value(&self, code: usize) -> &AttributeValue {
		&self.values[code]
	}

	/// The code with the highest frequency, ties going to the lowest code.
	pub fn most_frequent_code(&self) -> Option<usize> {
		let mut best: Option<usize> = None;
		for (code, frequency) in self.frequencies.iter().enumerate() {
			match best {
				Some(best_code) if self.frequencies[best_code] >= *frequency => {}
				_ => best = Some(code),
			}
		}
		best
	}
}

#[test]
fn test_infer() {
	assert_eq!(AttributeType::infer(vec!["1", "-2", "30"]), AttributeType::Integer);
	assert_eq!(AttributeType::infer(vec!["1", "2.5"]), AttributeType::Real);
	assert_eq!(AttributeType::infer(vec!["1", "red"]), AttributeType::Categorical);
	assert_eq!(AttributeType::infer(vec!["1.5", "inf"]), AttributeType::Categorical);
}

#[test]
fn test_sort_indexes() {
	let mut attribute = Attribute::new("color".to_owned(), AttributeType::Categorical);
	let raw = ["red", "blue", "red", "green", "blue", "red"];
	let codes: Vec<usize> = raw
		.iter()
		.map(|raw| attribute.insert(AttributeValue::Categorical(raw.to_string())))
		.collect();
	assert_eq!(codes, vec![0, 1, 0, 2, 1, 0]);
	let remap = attribute.sort_indexes();
	let codes: Vec<usize> = codes.iter().map(|code| remap[*code]).collect();
	assert_eq!(codes, vec![2, 0, 2, 1, 0, 2]);
	assert_eq!(attribute.code_of("blue"), Some(0));
	assert_eq!(attribute.code_of("green"), Some(1));
	assert_eq!(attribute.code_of("red"), Some(2));
	assert_eq!(attribute.code_of("purple"), None);
	assert_eq!(attribute.most_frequent_code(), Some(2));
	assert_eq!(attribute.value(1).to_string(), "green");
}

#[test]
fn test_sort_indexes_numeric() {
	let mut attribute = Attribute::new("age".to_owned(), AttributeType::Integer);
	for raw in &["10", "9", "100", "9"] {
		let value = AttributeType::Integer.parse(raw).unwrap();
		attribute.insert(value);
	}
	attribute.sort_indexes();
	// Numeric order, not lexicographic order.
	assert_eq!(attribute.code_of("9"), Some(0));
	assert_eq!(attribute.code_of("10"), Some(1));
	assert_eq!(attribute.code_of("100"), Some(2));
}
