//! `authlink` — the authorization sidecar's policy engine: compiling policy
//! documents (components A, K), resolving a request's client name
//! (component C) via header or JWT (component, via `cn`), evaluating
//! allow lists against literals, wildcards and reference-data lookups
//! (components B, E), matching requests to rules (component D), and
//! holding all of it behind a hot-reloadable [`Checker`] (component F).
//!
//! The policy lifecycle/watcher and discovery fan-out layer (components
//! G, H, I, J) live in `authlink-xds`; this crate only evaluates requests
//! against whatever policy state it's been handed.

pub mod allow;
pub mod checker;
pub mod cn;
pub mod compiler;
pub mod error;
pub mod jsonpath;
pub mod matcher;
pub mod wire;

pub use checker::{CheckResult, Checker};
pub use cn::Headers;
pub use compiler::{AllowEntry, AllowList, ClientSource, Methods, PolicyConfig, Rule, UriMatcher};
pub use error::{CheckError, ConfigError, DataError, InvalidClientName, JsonPathError};
pub use wire::{CnJwt, CnSource, PolicyDocument, RuleDoc, Variables};
