//! Error taxonomy (spec.md §7). `ConfigError` and `DataError` are fatal to a
//! reload — the prior compiled state stays live (see `checker.rs`).
//! `CheckError` is never fatal to a request: it is carried on
//! `CheckResult::error` alongside `allowed = false`.

use thiserror::Error;

/// Errors raised while compiling a [`crate::wire::PolicyDocument`] into a
/// [`crate::compiler::PolicyConfig`]. Grounded on the error-kind constants in
/// `sdk/policy/parser.go`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
	#[error("empty uri")]
	EmptyUri,

	#[error("at least one uri must be in the rule")]
	AtLeastOneUri,

	#[error("undefined http method: {0}")]
	UndefinedMethod(String),

	#[error("http method wildcard must not be used with other methods")]
	WildcardWithMethods,

	#[error("duplicated method:uri found (wildcard including): {0}")]
	DuplicatedUri(String),

	#[error("header or cookie may be used at the same time as a jwt source")]
	HeaderOrCookieAsJwtSource,

	#[error("at least one client name source must exist")]
	AtLeastOneCnSource,

	#[error("variables is not allowed in this section: {0}")]
	VarNotAllowedHere(String),

	#[error("undefined variable: {0}")]
	UndefinedVariable(String),

	#[error("empty client name")]
	EmptyClientName,

	#[error("fail to parse jsonpath {token}: {message}")]
	JsonPathParse { token: String, message: String },

	#[error("loading JWT key file {path}: {message}")]
	LoadJwtKeyFile { path: String, message: String },
}

/// Reference-data reload failure: the data was not valid JSON.
#[derive(Debug, Error)]
#[error("invalid json format: {0}")]
pub struct DataError(#[from] pub serde_json::Error);

/// Client-name resolution failure (spec.md §4.C). Non-fatal to the request.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum InvalidClientName {
	#[error("parse cookie: {0}")]
	ParseCookie(String),

	#[error("parse jwt token: {0}")]
	ParseJwtToken(String),

	#[error("payload field `{field}` doesn't exist in token")]
	PayloadFieldMissing { field: String },

	#[error("payload field `{field}` isn't string type in token")]
	PayloadFieldNotString { field: String },

	#[error("undefined client name")]
	Undefined,
}

/// A JSONPath expression couldn't be resolved against the current reference
/// data (spec.md §4.B). Non-fatal: the allow evaluator denies and records
/// this as the reason.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum JsonPathError {
	#[error("jsonpath {expr}: field `{field}` not found")]
	FieldNotFound { expr: String, field: String },

	#[error("jsonpath {expr}: `{field}` is not an object")]
	NotAnObject { expr: String, field: String },

	#[error("jsonpath {expr}: value is not an array at a `[*]` segment")]
	NotAnArray { expr: String },

	#[error("jsonpath {expr}: no reference data loaded")]
	NoData { expr: String },
}

/// The error carried on `CheckResult::error`. Never returned from `check`'s
/// own `Result` channel — see spec.md §7 propagation policy.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CheckError {
	#[error(transparent)]
	InvalidClientName(#[from] InvalidClientName),
	#[error(transparent)]
	JsonPathEval(#[from] JsonPathError),
}
