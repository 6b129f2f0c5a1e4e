//! Component B: the small JSONPath subset allow-entries use — rooted field
//! access and `[*]` array flattening (spec.md §9). Compiled once at policy
//! compile time; evaluated against the checker's reference data at check
//! time. Memoization of evaluation results lives in `checker.rs`, not here.

use serde_json::Value;

use crate::error::JsonPathError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
	Field(String),
	Wildcard,
}

/// A compiled JSONPath expression, e.g. `.team[*].name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
	source: String,
	segments: Vec<PathSegment>,
}

impl CompiledPath {
	pub fn source(&self) -> &str {
		&self.source
	}
}

/// Compile a rooted path expression. Supports `.field`, chained
/// `.field.field2`, and a trailing `[*]` per field to flatten arrays, e.g.
/// `.team[*].name`.
pub fn compile(expr: &str) -> Result<CompiledPath, String> {
	let source = expr.to_string();
	let rest = expr
		.strip_prefix('.')
		.ok_or_else(|| format!("jsonpath must be rooted with '.': {expr}"))?;

	if rest.is_empty() {
		return Err(format!("empty jsonpath expression: {expr}"));
	}

	let mut segments = Vec::new();
	for token in rest.split('.') {
		if token.is_empty() {
			return Err(format!("empty path segment in jsonpath: {expr}"));
		}
		if let Some(field) = token.strip_suffix("[*]") {
			if !field.is_empty() {
				segments.push(PathSegment::Field(field.to_string()));
			}
			segments.push(PathSegment::Wildcard);
		} else if token.contains('[') || token.contains(']') {
			return Err(format!("unsupported jsonpath segment `{token}` in: {expr}"));
		} else {
			segments.push(PathSegment::Field(token.to_string()));
		}
	}

	Ok(CompiledPath { source, segments })
}

/// Evaluate `path` against `data`, returning every string leaf reached.
/// Non-string leaves are silently skipped per spec.md §4.B; a missing field
/// or a `[*]` applied to a non-array is an evaluation error.
pub fn eval_strings(path: &CompiledPath, data: &Value) -> Result<Vec<String>, JsonPathError> {
	let leaves = eval(data, &path.segments, &path.source)?;
	Ok(leaves
		.into_iter()
		.filter_map(|v| match v {
			Value::String(s) => Some(s),
			_ => None,
		})
		.collect())
}

fn eval(value: &Value, segments: &[PathSegment], expr: &str) -> Result<Vec<Value>, JsonPathError> {
	let Some((head, rest)) = segments.split_first() else {
		return Ok(vec![value.clone()]);
	};

	match head {
		PathSegment::Field(name) => match value {
			Value::Object(map) => match map.get(name) {
				Some(v) => eval(v, rest, expr),
				None => Err(JsonPathError::FieldNotFound {
					expr: expr.to_string(),
					field: name.clone(),
				}),
			},
			_ => Err(JsonPathError::NotAnObject {
				expr: expr.to_string(),
				field: name.clone(),
			}),
		},
		PathSegment::Wildcard => match value {
			Value::Array(items) => {
				let mut out = Vec::new();
				for item in items {
					out.extend(eval(item, rest, expr)?);
				}
				Ok(out)
			},
			_ => Err(JsonPathError::NotAnArray {
				expr: expr.to_string(),
			}),
		},
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn flattens_array_of_objects() {
		let path = compile(".team[*].name").unwrap();
		let data = json!({"team": [{"name": "client1"}, {"name": "client2"}]});
		assert_eq!(eval_strings(&path, &data).unwrap(), vec!["client1", "client2"]);
	}

	#[test]
	fn skips_non_string_leaves() {
		let path = compile(".team[*].name").unwrap();
		let data = json!({"team": [{"name": "client1"}, {"name": 42}]});
		assert_eq!(eval_strings(&path, &data).unwrap(), vec!["client1"]);
	}

	#[test]
	fn missing_field_is_an_error() {
		let path = compile(".team[*].name").unwrap();
		let data = json!({"other": []});
		assert!(eval_strings(&path, &data).is_err());
	}

	#[test]
	fn simple_field_path() {
		let path = compile(".user").unwrap();
		let data = json!({"user": "jhon"});
		assert_eq!(eval_strings(&path, &data).unwrap(), vec!["jhon"]);
	}
}
