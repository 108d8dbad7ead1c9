use crate::tree::{BranchSplit, Node, Tree};
use pine_dataset::Schema;

impl Tree {
	/// Render the tree as an indented text outline. Each line is one edge out of a branch, described by its attribute test. Edges into leaves end with ` : ` and the leaf's class name, and the edges of deeper branches are prefixed with one `| ` per level.
	pub fn outline(&self, schema: &Schema) -> String {
		let mut lines = Vec::new();
		match &self.nodes[0] {
			Node::Leaf(leaf) => lines.push(format!(": {}", schema.classes[leaf.class_index])),
			Node::Branch(_) => self.outline_node(schema, 0, "", &mut lines),
		}
		lines.join("\n")
	}

	fn outline_node(&self, schema: &Schema, node_index: usize, prefix: &str, lines: &mut Vec<String>) {
		let branch = match &self.nodes[node_index] {
			Node::Branch(branch) => branch,
			Node::Leaf(_) => return,
		};
		let attribute = &schema.attributes[branch.attribute_index()];
		let edges: Vec<(String, usize)> = match &branch.split {
			BranchSplit::Ordered(split) => {
				let value = attribute.value(split.threshold);
				vec![
					(format!("{} <= {}", attribute.name(), value), split.left_child_index),
					(format!("{} > {}", attribute.name(), value), split.right_child_index),
				]
			}
			BranchSplit::Nominal(split) => branch
				.child_indices()
				.into_iter()
				.map(|child_index| {
					let values: Vec<String> = split
						.child_indices
						.iter()
						.enumerate()
						.filter(|(_, code_child_index)| **code_child_index == Some(child_index))
						.map(|(code, _)| attribute.value(code).to_string())
						.collect();
					let test = if values.len() == 1 {
						format!("{} = {}", attribute.name(), values[0])
					} else {
						format!("{} in {{{}}}", attribute.name(), values.join(", "))
					};
					(test, child_index)
				})
				.collect(),
		};
		for (test, child_index) in edges {
			match &self.nodes[child_index] {
				Node::Leaf(leaf) => {
					lines.push(format!("{}{} : {}", prefix, test, schema.classes[leaf.class_index]))
				}
				Node::Branch(_) => {
					lines.push(format!("{}{}", prefix, test));
					self.outline_node(schema, child_index, &format!("{}| ", prefix), lines);
				}
			}
		}
	}
}
