//! Components A and K: lowering a [`crate::wire::PolicyDocument`] into the
//! compiled, immutable form the checker evaluates requests against, and the
//! validation rules that make that lowering fail loudly instead of silently
//! accepting a malformed policy. Grounded on `sdk/policy/parser.go`'s
//! `PrepareConfig`/`prepareAllow`.

use std::collections::BTreeSet;

use secrecy::{ExposeSecret, SecretBox};

use crate::error::ConfigError;
use crate::jsonpath::{self, CompiledPath};
use crate::wire::{CnSource, PolicyDocument, RuleDoc, Variables};

const STANDARD_METHODS: &[&str] = &[
	"GET", "POST", "PUT", "PATCH", "DELETE", "TRACE", "HEAD", "CONNECT", "OPTIONS",
];

/// A single entry a client name may be checked against: a literal name, or a
/// `prefix{jsonpath}` lookup into the checker's reference data.
#[derive(Debug, Clone)]
pub enum AllowEntry {
	Literal(String),
	Lookup { prefix: String, cache_key: String, path: CompiledPath },
}

impl PartialEq for AllowEntry {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Literal(a), Self::Literal(b)) => a == b,
			(Self::Lookup { prefix: p1, cache_key: c1, .. }, Self::Lookup { prefix: p2, cache_key: c2, .. }) => {
				p1 == p2 && c1 == c2
			},
			_ => false,
		}
	}
}

/// The flattened, variable-expanded allow list of a rule or the policy
/// default (spec.md §4.E).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowList {
	pub entries: Vec<AllowEntry>,
}

/// Where a client-name check should look for a bearer token (spec.md §4.C).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
	Header(String),
	Cookie(String),
}

/// The JWT half of a [`ClientSource`], when configured. The HMAC secret
/// loaded from `keyFile` is signing key material, not just config data, so
/// it's held behind [`SecretBox`] the way the teacher wraps bearer tokens in
/// `SecretString` (`http/jwt.rs`) — debug-formatting a [`JwtSource`] never
/// leaks the key bytes.
#[derive(Debug, Clone)]
pub struct JwtSource {
	pub payload_field: String,
	pub token_source: Option<TokenSource>,
	pub key: Option<SecretBox<[u8]>>,
}

impl PartialEq for JwtSource {
	fn eq(&self, other: &Self) -> bool {
		self.payload_field == other.payload_field
			&& self.token_source == other.token_source
			&& match (&self.key, &other.key) {
				(Some(a), Some(b)) => a.expose_secret() == b.expose_secret(),
				(None, None) => true,
				_ => false,
			}
	}
}

/// One entry of the `cn:` list. A single entry may carry both a header
/// lookup and a JWT lookup; at check time the header is tried first and the
/// JWT is only consulted if the header is absent from the request — this
/// mirrors `sdk/policy/checker.go`'s `defineCn`, which checks both fields of
/// a single `Cn` struct rather than treating them as alternative sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSource {
	pub prefix: String,
	pub header: Option<String>,
	pub jwt: Option<JwtSource>,
}

/// How a rule's `uri:` entry matches a request path (spec.md §4.D).
#[derive(Debug, Clone)]
pub enum UriMatcher {
	Exact(String),
	Regex(regex::Regex),
}

impl PartialEq for UriMatcher {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Exact(a), Self::Exact(b)) => a == b,
			(Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
			_ => false,
		}
	}
}

impl UriMatcher {
	pub fn endpoint(&self) -> &str {
		match self {
			Self::Exact(u) => u,
			Self::Regex(r) => r.as_str(),
		}
	}

	pub fn matches(&self, path: &str) -> bool {
		match self {
			Self::Exact(u) => u == path,
			Self::Regex(r) => r.is_match(path),
		}
	}
}

/// The set of HTTP methods a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Methods {
	Any,
	Only(BTreeSet<String>),
}

impl Methods {
	pub fn matches(&self, method: &str) -> bool {
		match self {
			Self::Any => true,
			Self::Only(set) => set.contains(method),
		}
	}
}

/// One compiled `(uri, methods, allow)` rule. Each `uri:` entry of a
/// `policies[*]` document item becomes its own `Rule`, sharing the allow
/// list compiled once for the whole item — matching the effect, if not the
/// literal repeated recompilation, of `PrepareConfig`'s per-uri loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
	pub uri: UriMatcher,
	pub methods: Methods,
	pub allow: AllowList,
	pub priority: i64,
	source_index: usize,
}

/// The fully compiled, immutable form of a policy document (component A).
/// Produced by [`compile`]; swapped into the checker as a whole on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
	pub name: Option<String>,
	pub client_sources: Vec<ClientSource>,
	pub default_allow: AllowList,
	pub rules: Vec<Rule>,
}

/// Lower a wire-format document into a [`PolicyConfig`], or report the first
/// validation failure (spec.md §4.A, §4.K). Rule order in the result is by
/// descending priority, ties broken by source order, so the checker's
/// first-match walk (component D) needs no further sorting.
pub fn compile(doc: &PolicyDocument) -> Result<PolicyConfig, ConfigError> {
	let client_sources = compile_client_sources(&doc.cn)?;
	let default_allow = compile_allow(&doc.default, None)?;

	let mut rules = Vec::new();
	let mut seen = BTreeSet::new();
	let mut source_index = 0usize;

	for rule_doc in &doc.policies {
		compile_rule(rule_doc, &doc.vars, &mut seen, &mut source_index, &mut rules)?;
	}

	rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.source_index.cmp(&b.source_index)));

	Ok(PolicyConfig {
		name: doc.name.clone(),
		client_sources,
		default_allow,
		rules,
	})
}

fn compile_client_sources(cn: &[CnSource]) -> Result<Vec<ClientSource>, ConfigError> {
	let mut out = Vec::with_capacity(cn.len());
	for source in cn {
		if source.header.is_none() && source.jwt.is_none() {
			return Err(ConfigError::AtLeastOneCnSource);
		}

		let jwt = match &source.jwt {
			None => None,
			Some(jwt) => {
				if jwt.header.is_some() && jwt.cookie.is_some() {
					return Err(ConfigError::HeaderOrCookieAsJwtSource);
				}
				let key = match &jwt.key_file {
					None => None,
					Some(path) => {
						let bytes = std::fs::read(path).map_err(|e| ConfigError::LoadJwtKeyFile {
							path: path.clone(),
							message: e.to_string(),
						})?;
						Some(SecretBox::new(bytes.into_boxed_slice()))
					},
				};
				let token_source = match (&jwt.header, &jwt.cookie) {
					(Some(h), None) => Some(TokenSource::Header(h.clone())),
					(None, Some(c)) => Some(TokenSource::Cookie(c.clone())),
					(None, None) => None,
					(Some(_), Some(_)) => unreachable!("checked above"),
				};
				Some(JwtSource {
					payload_field: jwt.payload.clone(),
					token_source,
					key,
				})
			},
		};

		out.push(ClientSource {
			prefix: source.prefix.clone(),
			header: source.header.clone(),
			jwt,
		});
	}
	Ok(out)
}

fn compile_rule(
	rule_doc: &RuleDoc,
	vars: &Variables,
	seen: &mut BTreeSet<String>,
	source_index: &mut usize,
	rules: &mut Vec<Rule>,
) -> Result<(), ConfigError> {
	if rule_doc.uri.is_empty() {
		return Err(ConfigError::AtLeastOneUri);
	}

	let methods = compile_methods(&rule_doc.method)?;
	let allow = compile_allow(&rule_doc.allow, Some(vars))?;

	for uri in &rule_doc.uri {
		if uri.is_empty() {
			return Err(ConfigError::EmptyUri);
		}

		for method_key in method_keys(&methods) {
			let dup_key = format!("{uri}:{method_key}");
			let wildcard_key = format!("{uri}:*");
			if seen.contains(&dup_key) || (method_key != "*" && seen.contains(&wildcard_key)) {
				return Err(ConfigError::DuplicatedUri(dup_key));
			}
			seen.insert(dup_key);
		}

		let uri_matcher = compile_uri(uri)?;
		let priority = match &uri_matcher {
			UriMatcher::Exact(_) => i64::MAX,
			UriMatcher::Regex(r) => r.as_str().len() as i64,
		};

		rules.push(Rule {
			uri: uri_matcher,
			methods: methods.clone(),
			allow: allow.clone(),
			priority,
			source_index: *source_index,
		});
		*source_index += 1;
	}

	Ok(())
}

/// The dup-check keys a compiled `Methods` contributes: `["*"]` for the
/// all-methods default, or each upper-cased method token otherwise.
fn method_keys(methods: &Methods) -> Vec<&str> {
	match methods {
		Methods::Any => vec!["*"],
		Methods::Only(set) => set.iter().map(String::as_str).collect(),
	}
}

fn compile_methods(method: &[String]) -> Result<Methods, ConfigError> {
	if method.is_empty() {
		return Ok(Methods::Any);
	}

	let mut set = BTreeSet::new();
	for m in method {
		let upper = m.to_uppercase();
		if !STANDARD_METHODS.contains(&upper.as_str()) {
			if upper == "*" {
				return Err(ConfigError::WildcardWithMethods);
			}
			return Err(ConfigError::UndefinedMethod(m.clone()));
		}
		set.insert(upper);
	}
	Ok(Methods::Only(set))
}

fn compile_uri(uri: &str) -> Result<UriMatcher, ConfigError> {
	if let Some(pattern) = uri.strip_prefix('~') {
		let pattern = pattern.trim_start_matches('~');
		let anchored = format!("^{pattern}$");
		let re = regex::Regex::new(&anchored).map_err(|e| ConfigError::JsonPathParse {
			token: uri.to_string(),
			message: e.to_string(),
		})?;
		Ok(UriMatcher::Regex(re))
	} else {
		Ok(UriMatcher::Exact(uri.to_string()))
	}
}

/// Compile an `allow:` (or `default:`) list: literal names pass through,
/// `prefix{jsonpath}` entries are compiled, and `$name` entries are expanded
/// inline from `vars`. `vars = None` means variable references are rejected
/// outright — used for the policy-level `default:` list, which spec.md §4.A
/// explicitly keeps variable-free even though `sdk/policy/parser.go` happens
/// to thread `config.Vars` through to it too.
fn compile_allow(tokens: &[String], vars: Option<&Variables>) -> Result<AllowList, ConfigError> {
	let mut entries = Vec::new();
	compile_allow_into(tokens, vars, &mut entries)?;
	Ok(AllowList { entries })
}

fn compile_allow_into(
	tokens: &[String],
	vars: Option<&Variables>,
	entries: &mut Vec<AllowEntry>,
) -> Result<(), ConfigError> {
	for token in tokens {
		if token.is_empty() {
			return Err(ConfigError::EmptyClientName);
		}

		if let Some(var_name) = token.strip_prefix('$') {
			let vars = vars.ok_or_else(|| ConfigError::VarNotAllowedHere(token.clone()))?;
			let expansion = vars
				.get(var_name)
				.ok_or_else(|| ConfigError::UndefinedVariable(var_name.to_string()))?;
			compile_allow_into(expansion, None, entries)?;
			continue;
		}

		if let Some(brace_idx) = token.find('{') {
			if !token.ends_with('}') {
				return Err(ConfigError::JsonPathParse {
					token: token.clone(),
					message: "unterminated jsonpath expression".to_string(),
				});
			}
			let prefix = token[..brace_idx].to_string();
			let inner = &token[brace_idx + 1..token.len() - 1];
			let path = jsonpath::compile(inner).map_err(|message| ConfigError::JsonPathParse {
				token: token.clone(),
				message,
			})?;
			entries.push(AllowEntry::Lookup {
				prefix,
				cache_key: token.clone(),
				path,
			});
			continue;
		}

		entries.push(AllowEntry::Literal(token.clone()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;
	use crate::wire::{CnJwt, PolicyDocument};

	fn doc_with_policies(policies: Vec<RuleDoc>) -> PolicyDocument {
		PolicyDocument {
			name: Some("test".to_string()),
			cn: vec![CnSource {
				prefix: "svc-".to_string(),
				header: Some("x-client".to_string()),
				jwt: None,
			}],
			vars: Variables::new(),
			default: vec![],
			policies,
		}
	}

	#[test]
	fn exact_uri_outranks_regex() {
		let doc = doc_with_policies(vec![
			RuleDoc { uri: vec!["~/user/[0-9]+".to_string()], method: vec![], allow: vec!["a".to_string()] },
			RuleDoc { uri: vec!["/user/42".to_string()], method: vec![], allow: vec!["b".to_string()] },
		]);
		let compiled = compile(&doc).unwrap();
		assert_eq!(compiled.rules[0].uri, UriMatcher::Exact("/user/42".to_string()));
	}

	#[test]
	fn longer_regex_outranks_shorter_regex() {
		let doc = doc_with_policies(vec![
			RuleDoc { uri: vec!["~/a".to_string()], method: vec![], allow: vec!["x".to_string()] },
			RuleDoc { uri: vec!["~/a/[0-9]+".to_string()], method: vec![], allow: vec!["x".to_string()] },
		]);
		let compiled = compile(&doc).unwrap();
		assert_eq!(compiled.rules[0].uri.endpoint(), "^/a/[0-9]+$");
	}

	#[test]
	fn duplicated_uri_method_is_rejected() {
		let doc = doc_with_policies(vec![
			RuleDoc { uri: vec!["/x".to_string()], method: vec!["GET".to_string()], allow: vec!["a".to_string()] },
			RuleDoc { uri: vec!["/x".to_string()], method: vec!["GET".to_string()], allow: vec!["b".to_string()] },
		]);
		assert_matches!(compile(&doc), Err(ConfigError::DuplicatedUri(_)));
	}

	#[test]
	fn duplicated_uri_against_wildcard_is_rejected_either_order() {
		let doc = doc_with_policies(vec![
			RuleDoc { uri: vec!["/x".to_string()], method: vec![], allow: vec!["a".to_string()] },
			RuleDoc { uri: vec!["/x".to_string()], method: vec!["GET".to_string()], allow: vec!["b".to_string()] },
		]);
		assert_matches!(compile(&doc), Err(ConfigError::DuplicatedUri(_)));
	}

	#[rstest]
	#[case::standard_get("GET")]
	#[case::standard_post("POST")]
	#[case::standard_delete("DELETE")]
	#[case::lowercase_is_upcased("patch")]
	fn standard_method_is_accepted(#[case] method: &str) {
		let doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec![method.to_string()],
			allow: vec!["a".to_string()],
		}]);
		let compiled = compile(&doc).unwrap();
		assert_eq!(compiled.rules[0].methods, Methods::Only(BTreeSet::from([method.to_uppercase()])));
	}

	#[test]
	fn explicit_wildcard_method_is_rejected() {
		let doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec!["*".to_string()],
			allow: vec!["a".to_string()],
		}]);
		assert_matches!(compile(&doc), Err(ConfigError::WildcardWithMethods));
	}

	#[test]
	fn unknown_method_is_rejected() {
		let doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec!["FETCH".to_string()],
			allow: vec!["a".to_string()],
		}]);
		assert_matches!(compile(&doc), Err(ConfigError::UndefinedMethod(_)));
	}

	#[test]
	fn variable_reference_in_default_is_rejected() {
		let mut doc = doc_with_policies(vec![]);
		doc.vars.insert("team".to_string(), vec!["alice".to_string()]);
		doc.default = vec!["$team".to_string()];
		assert_matches!(compile(&doc), Err(ConfigError::VarNotAllowedHere(_)));
	}

	#[test]
	fn variable_reference_in_rule_allow_expands_inline() {
		let mut doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec![],
			allow: vec!["$team".to_string()],
		}]);
		doc.vars.insert("team".to_string(), vec!["alice".to_string(), "bob".to_string()]);
		let compiled = compile(&doc).unwrap();
		assert_eq!(
			compiled.rules[0].allow.entries,
			vec![AllowEntry::Literal("alice".to_string()), AllowEntry::Literal("bob".to_string())]
		);
	}

	#[test]
	fn undefined_variable_is_rejected() {
		let doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec![],
			allow: vec!["$missing".to_string()],
		}]);
		assert_matches!(compile(&doc), Err(ConfigError::UndefinedVariable(_)));
	}

	#[test]
	fn jsonpath_allow_entry_compiles_with_prefix_and_cache_key() {
		let doc = doc_with_policies(vec![RuleDoc {
			uri: vec!["/x".to_string()],
			method: vec![],
			allow: vec!["svc-{.team[*].name}".to_string()],
		}]);
		let compiled = compile(&doc).unwrap();
		match &compiled.rules[0].allow.entries[0] {
			AllowEntry::Lookup { prefix, cache_key, path } => {
				assert_eq!(prefix, "svc-");
				assert_eq!(cache_key, "svc-{.team[*].name}");
				assert_eq!(path.source(), ".team[*].name");
			},
			other => panic!("expected a lookup entry, got {other:?}"),
		}
	}

	#[test]
	fn jwt_header_and_cookie_together_is_rejected() {
		let mut doc = doc_with_policies(vec![]);
		doc.cn.push(CnSource {
			prefix: String::new(),
			header: None,
			jwt: Some(CnJwt {
				payload: "sub".to_string(),
				header: Some("authorization".to_string()),
				cookie: Some("session".to_string()),
				key_file: None,
			}),
		});
		assert_matches!(compile(&doc), Err(ConfigError::HeaderOrCookieAsJwtSource));
	}

	#[test]
	fn cn_source_without_header_or_jwt_is_rejected() {
		let mut doc = doc_with_policies(vec![]);
		doc.cn = vec![CnSource { prefix: "x".to_string(), header: None, jwt: None }];
		assert_matches!(compile(&doc), Err(ConfigError::AtLeastOneCnSource));
	}
}
