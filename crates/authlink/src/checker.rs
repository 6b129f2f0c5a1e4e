//! Component F: the `Checker` — the live, swappable policy state a request
//! is evaluated against. Configs and reference data are held in
//! [`authlink_core::Atomic`]/[`authlink_core::AtomicOption`] so a reload
//! never blocks a concurrent `check`, and a failed reload leaves the prior
//! state untouched (spec.md §4.F, §4.K). Grounded on the
//! `arc_swap`-backed state cells the teacher uses for its own hot-reloadable
//! router state, and on `sdk/policy/checker.go`'s `Checker` for the
//! multi-config evaluation order.

use std::collections::HashMap;
use std::sync::Arc;

use authlink_core::{atomic, atomic_option_empty, Atomic, AtomicOption};
use parking_lot::Mutex;
use serde_json::Value;

use crate::allow::{self, ReferenceLookup};
use crate::cn::{self, Headers};
use crate::compiler::{self, PolicyConfig};
use crate::error::{CheckError, ConfigError, DataError};
use crate::jsonpath::{self, CompiledPath};
use crate::matcher;
use crate::wire::PolicyDocument;

/// The outcome of checking one request against the checker's current state.
/// `error` is carried alongside `allowed = false` — it is never surfaced as
/// a `Result::Err`, since a single request is evaluated against every
/// loaded config and only the final, non-allowed outcome is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
	pub allowed: bool,
	pub client_name: Option<String>,
	pub matched_endpoint: String,
	pub error: Option<CheckError>,
}

/// Live, hot-reloadable policy evaluation state.
pub struct Checker {
	configs: Atomic<Vec<PolicyConfig>>,
	data: AtomicOption<Value>,
	data_cache: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for Checker {
	fn default() -> Self {
		Self::new()
	}
}

impl Checker {
	pub fn new() -> Self {
		Self {
			configs: atomic(Vec::new()),
			data: atomic_option_empty(),
			data_cache: Mutex::new(HashMap::new()),
		}
	}

	/// Compile and replace every loaded policy document atomically. On the
	/// first compile failure none of the new configs are applied — the
	/// checker keeps evaluating requests against whatever was loaded before.
	pub fn set_configs(&self, docs: &[PolicyDocument]) -> Result<(), ConfigError> {
		let mut compiled = Vec::with_capacity(docs.len());
		for doc in docs {
			compiled.push(compiler::compile(doc)?);
		}
		self.configs.store(Arc::new(compiled));
		Ok(())
	}

	/// Replace the reference data used by `{jsonpath}` allow entries.
	/// Invalidates the evaluation memoization cache; a malformed payload
	/// leaves the prior data (and cache) untouched.
	pub fn set_data(&self, bytes: &[u8]) -> Result<(), DataError> {
		let value: Value = serde_json::from_slice(bytes)?;
		self.data.store(Some(Arc::new(value)));
		self.data_cache.lock().clear();
		Ok(())
	}

	pub fn configs(&self) -> Arc<Vec<PolicyConfig>> {
		self.configs.load_full()
	}

	pub fn data(&self) -> Option<Arc<Value>> {
		self.data.load_full()
	}

	/// Evaluate a request against every loaded config in order. Stop at the
	/// first config whose result either allows or carries an error — a
	/// config that errors is never silently overridden by a later config's
	/// clean allow (spec.md §4.F, `sdk/policy/checker.go`'s `Check`: `if
	/// cres.Err != nil || cres.Allow { return cres, nil }`). If every config
	/// denies with no error, the result is a fresh neutral deny, not the
	/// first config's populated (but irrelevant) client name/endpoint.
	pub fn check(&self, method: &str, path: &str, headers: &Headers) -> CheckResult {
		let configs = self.configs.load();
		let data = self.data.load();
		let data = data.as_ref().map(|d| d.as_ref());

		for config in configs.iter() {
			let result = self.evaluate(config, method, path, headers, data);
			if result.allowed || result.error.is_some() {
				return result;
			}
		}

		CheckResult { allowed: false, client_name: None, matched_endpoint: String::new(), error: None }
	}

	fn evaluate(
		&self,
		config: &PolicyConfig,
		method: &str,
		path: &str,
		headers: &Headers,
		data: Option<&Value>,
	) -> CheckResult {
		let client_name = match cn::resolve(&config.client_sources, headers) {
			Ok(name) => name,
			Err(e) => {
				return CheckResult {
					allowed: false,
					client_name: None,
					matched_endpoint: String::new(),
					error: Some(e.into()),
				};
			},
		};

		let (allow_list, endpoint) = match matcher::find_rule(&config.rules, method, path) {
			Some(rule) => (&rule.allow, rule.uri.endpoint().to_string()),
			None => (&config.default_allow, "default".to_string()),
		};

		let mut lookup = CachedLookup { data, cache: &self.data_cache };
		match allow::is_allowed(allow_list, &client_name, &mut lookup) {
			Ok(allowed) => {
				CheckResult { allowed, client_name: Some(client_name), matched_endpoint: endpoint, error: None }
			},
			Err(e) => CheckResult {
				allowed: false,
				client_name: Some(client_name),
				matched_endpoint: endpoint,
				error: Some(e.into()),
			},
		}
	}
}

/// Bridges [`allow::is_allowed`] to the checker's reference data and
/// memoization cache, keyed by each allow entry's literal text (spec.md
/// §4.B: "memoized by expression text").
struct CachedLookup<'a> {
	data: Option<&'a Value>,
	cache: &'a Mutex<HashMap<String, Vec<String>>>,
}

impl ReferenceLookup for CachedLookup<'_> {
	fn resolve(&mut self, cache_key: &str, path: &CompiledPath) -> Result<Vec<String>, crate::error::JsonPathError> {
		if let Some(cached) = self.cache.lock().get(cache_key) {
			return Ok(cached.clone());
		}

		let Some(data) = self.data else {
			return Err(crate::error::JsonPathError::NoData { expr: path.source().to_string() });
		};

		let resolved = jsonpath::eval_strings(path, data)?;
		self.cache.lock().insert(cache_key.to_string(), resolved.clone());
		Ok(resolved)
	}
}
