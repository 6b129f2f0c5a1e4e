//! Component D: picking the rule a request matches. Rules arrive from
//! [`crate::compiler::compile`] already sorted by descending priority with
//! source order as the tiebreak, so matching is a single linear walk taking
//! the first rule whose method and URI both match.

use crate::compiler::Rule;

/// The first rule, in priority order, whose method and URI both match.
/// `None` means the caller should fall back to the policy's `default:`
/// allow list, with `"default"` as the matched endpoint (spec.md §4.D).
pub fn find_rule<'a>(rules: &'a [Rule], method: &str, path: &str) -> Option<&'a Rule> {
	rules.iter().find(|rule| rule.methods.matches(method) && rule.uri.matches(path))
}
