//! Component E: deciding whether a client name satisfies an allow list.
//! Each entry is tried in order and independently — a `{jsonpath}` entry
//! that fails to resolve does not abort the remaining entries, unlike
//! `sdk/policy/checker.go`'s `isAllowed`, which `break`s out of the whole
//! loop the moment one parser returns zero groups. Spec.md's documented
//! per-parser contract is implemented here instead; the deviation is
//! recorded in DESIGN.md.

use crate::compiler::{AllowEntry, AllowList};
use crate::error::JsonPathError;
use crate::jsonpath::CompiledPath;

/// Resolves a `{jsonpath}` allow entry's reference-data lookup, keyed by the
/// entry's cache key so the checker can memoize across calls. Implemented by
/// `checker.rs`, which owns the reference data and its memoization cache.
pub trait ReferenceLookup {
	fn resolve(&mut self, cache_key: &str, path: &CompiledPath) -> Result<Vec<String>, JsonPathError>;
}

/// Does `client_name` satisfy `allow`? `Ok(false)` means every entry was
/// checked and none matched. `Err` is only returned when no entry matched
/// *and* at least one `{jsonpath}` entry failed to resolve — the first such
/// error is reported, matching a request's single `CheckResult::error` slot.
pub fn is_allowed(
	allow: &AllowList,
	client_name: &str,
	lookup: &mut dyn ReferenceLookup,
) -> Result<bool, JsonPathError> {
	let mut first_error = None;

	for entry in &allow.entries {
		match entry {
			AllowEntry::Literal(token) => {
				if let Some(prefix) = token.strip_suffix('*') {
					if !prefix.is_empty() && client_name.starts_with(prefix) {
						return Ok(true);
					}
				} else if token == client_name {
					return Ok(true);
				}
			},
			AllowEntry::Lookup { prefix, cache_key, path } => match lookup.resolve(cache_key, path) {
				Ok(values) => {
					if values.iter().any(|v| client_name == format!("{prefix}{v}")) {
						return Ok(true);
					}
				},
				Err(e) => {
					first_error.get_or_insert(e);
				},
			},
		}
	}

	match first_error {
		Some(e) => Err(e),
		None => Ok(false),
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::jsonpath;

	struct FakeLookup(HashMap<String, Result<Vec<String>, JsonPathError>>);

	impl ReferenceLookup for FakeLookup {
		fn resolve(&mut self, cache_key: &str, _path: &CompiledPath) -> Result<Vec<String>, JsonPathError> {
			self.0
				.get(cache_key)
				.cloned()
				.unwrap_or_else(|| Ok(vec![]))
		}
	}

	#[test]
	fn literal_exact_match() {
		let allow = AllowList { entries: vec![AllowEntry::Literal("alice".to_string())] };
		let mut lookup = FakeLookup(HashMap::new());
		assert!(is_allowed(&allow, "alice", &mut lookup).unwrap());
		assert!(!is_allowed(&allow, "bob", &mut lookup).unwrap());
	}

	#[test]
	fn wildcard_entry_matches_by_prefix() {
		let allow = AllowList { entries: vec![AllowEntry::Literal("svc-*".to_string())] };
		let mut lookup = FakeLookup(HashMap::new());
		assert!(is_allowed(&allow, "svc-payments", &mut lookup).unwrap());
		assert!(!is_allowed(&allow, "other-payments", &mut lookup).unwrap());
	}

	#[test]
	fn jsonpath_entry_matches_resolved_value_with_prefix() {
		let path = jsonpath::compile(".team[*].name").unwrap();
		let allow = AllowList {
			entries: vec![AllowEntry::Lookup {
				prefix: "svc-".to_string(),
				cache_key: "svc-{.team[*].name}".to_string(),
				path,
			}],
		};
		let mut lookup =
			FakeLookup(HashMap::from([("svc-{.team[*].name}".to_string(), Ok(vec!["payments".to_string()]))]));
		assert!(is_allowed(&allow, "svc-payments", &mut lookup).unwrap());
	}

	#[test]
	fn a_failing_entry_does_not_block_a_later_matching_entry() {
		let path = jsonpath::compile(".team[*].name").unwrap();
		let allow = AllowList {
			entries: vec![
				AllowEntry::Lookup { prefix: "svc-".to_string(), cache_key: "bad".to_string(), path: path.clone() },
				AllowEntry::Literal("svc-payments".to_string()),
			],
		};
		let mut lookup = FakeLookup(HashMap::from([(
			"bad".to_string(),
			Err(JsonPathError::NoData { expr: ".team[*].name".to_string() }),
		)]));
		assert!(is_allowed(&allow, "svc-payments", &mut lookup).unwrap());
	}

	#[test]
	fn an_unresolved_entry_with_no_match_surfaces_its_error() {
		let path = jsonpath::compile(".team[*].name").unwrap();
		let allow = AllowList {
			entries: vec![AllowEntry::Lookup { prefix: "svc-".to_string(), cache_key: "bad".to_string(), path }],
		};
		let mut lookup = FakeLookup(HashMap::from([(
			"bad".to_string(),
			Err(JsonPathError::NoData { expr: ".team[*].name".to_string() }),
		)]));
		assert!(matches!(is_allowed(&allow, "svc-payments", &mut lookup), Err(JsonPathError::NoData { .. })));
	}

	#[test]
	fn no_entries_match_and_no_errors_is_a_plain_deny() {
		let allow = AllowList { entries: vec![AllowEntry::Literal("alice".to_string())] };
		let mut lookup = FakeLookup(HashMap::new());
		assert_eq!(is_allowed(&allow, "mallory", &mut lookup).unwrap(), false);
	}
}
