//! The policy document's source form (spec.md §6), deserialized as-is from
//! YAML or JSON before [`crate::compiler::compile`] validates and lowers it.
//! Field names and shape are grounded on `sdk/policy/models.go`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `vars:` — name to list of allow-entry tokens.
pub type Variables = HashMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDocument {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub cn: Vec<CnSource>,
	#[serde(default)]
	pub vars: Variables,
	#[serde(default)]
	pub default: Vec<String>,
	#[serde(default)]
	pub policies: Vec<RuleDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CnSource {
	#[serde(default)]
	pub prefix: String,
	#[serde(default)]
	pub header: Option<String>,
	#[serde(default)]
	pub jwt: Option<CnJwt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CnJwt {
	pub payload: String,
	#[serde(default)]
	pub header: Option<String>,
	#[serde(default)]
	pub cookie: Option<String>,
	#[serde(rename = "keyFile", default)]
	pub key_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDoc {
	pub uri: Vec<String>,
	#[serde(default)]
	pub method: Vec<String>,
	#[serde(default)]
	pub allow: Vec<String>,
}

impl PolicyDocument {
	pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
		serde_yaml::from_slice(bytes)
	}

	pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
		serde_json::from_slice(bytes)
	}
}
