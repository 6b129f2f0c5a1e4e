//! Component G: a namespaced, label-filterable cache of policy records held
//! by the control plane. Grounded on `controller/kube/policy_cache.go` plus
//! the label-matching semantics of `controller/kube/utils.go`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub type LabelSet = HashMap<String, String>;

/// A policy record as held by the control plane. `config` is the policy's
/// raw, uncompiled source form (whatever the producer sent) — the cache
/// only needs to store and filter it, not understand it, which keeps this
/// crate independent of the `authlink` compiler crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
	pub name: String,
	pub namespace: String,
	pub config: serde_json::Value,
	#[serde(default)]
	pub labels: LabelSet,
}

/// Returns whether `policy_labels` is satisfied by `subscriber_labels`: for
/// every key the policy advertises, the subscriber must advertise the same
/// value (or the policy is excluded). A policy with no labels matches every
/// subscriber.
pub fn labels_match(subscriber_labels: &LabelSet, policy_labels: &LabelSet) -> bool {
	policy_labels
		.iter()
		.all(|(k, v)| subscriber_labels.get(k).is_some_and(|have| have == v))
}

#[derive(Default)]
pub struct PolicyCache {
	// namespace -> (name -> Policy)
	items: Mutex<HashMap<String, HashMap<String, Policy>>>,
}

impl PolicyCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn put(&self, policy: Policy) {
		let mut items = self.items.lock();
		items
			.entry(policy.namespace.clone())
			.or_default()
			.insert(policy.name.clone(), policy);
	}

	pub fn delete(&self, namespace: &str, name: &str) {
		let mut items = self.items.lock();
		if let Some(ns) = items.get_mut(namespace) {
			ns.remove(name);
		}
	}

	/// Policies in `namespace` whose labels are matched by
	/// `subscriber_labels`, ordered deterministically by name.
	pub fn list(&self, namespace: &str, subscriber_labels: &LabelSet) -> Vec<Policy> {
		let items = self.items.lock();
		let Some(ns) = items.get(namespace) else {
			return Vec::new();
		};
		let mut matched: Vec<Policy> = ns
			.values()
			.filter(|p| labels_match(subscriber_labels, &p.labels))
			.cloned()
			.collect();
		matched.sort_by(|a, b| a.name.cmp(&b.name));
		matched
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn labels(pairs: &[(&str, &str)]) -> LabelSet {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	fn policy(ns: &str, name: &str, ls: &[(&str, &str)]) -> Policy {
		Policy {
			name: name.to_string(),
			namespace: ns.to_string(),
			config: serde_json::json!({}),
			labels: labels(ls),
		}
	}

	#[test]
	fn subset_label_match() {
		let l1 = labels(&[("l1", "v1")]);
		let subscriber = labels(&[("l1", "v1"), ("other", "x")]);
		assert!(labels_match(&subscriber, &l1));

		let l1l2 = labels(&[("l1", "v1"), ("l2", "v2")]);
		assert!(!labels_match(&subscriber, &l1l2));
		let subscriber_both = labels(&[("l1", "v1"), ("l2", "v2")]);
		assert!(labels_match(&subscriber_both, &l1l2));
	}

	#[test]
	fn list_is_sorted_and_filtered() {
		let cache = PolicyCache::new();
		cache.put(policy("ns-1", "b", &[]));
		cache.put(policy("ns-1", "a", &[("team", "x")]));
		cache.put(policy("ns-2", "c", &[]));

		let out = cache.list("ns-1", &labels(&[("team", "x")]));
		assert_eq!(out.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

		let out = cache.list("ns-1", &labels(&[]));
		assert_eq!(out.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["b"]);

		assert!(cache.list("missing", &labels(&[])).is_empty());
	}

	#[test]
	fn put_then_delete_restores_prior_listing() {
		let cache = PolicyCache::new();
		let before = cache.list("ns-1", &labels(&[]));
		cache.put(policy("ns-1", "p", &[]));
		cache.delete("ns-1", "p");
		let after = cache.list("ns-1", &labels(&[]));
		assert_eq!(before, after);
	}
}
