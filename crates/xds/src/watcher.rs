//! Component H: the event queue + subscriber registry that fans policy
//! cache mutations out to subscribers, filtered by label and delivered in
//! arrival order per subscriber.
//!
//! Grounded on `controller/kube/policy_watcher.go`. The source serializes
//! `Subscribe`/`onAdd`/`onUpdate`/`onDelete` under one mutex held across the
//! listener callback; this crate takes the other option spec.md §4.H
//! explicitly allows — a single background task draining an ordered
//! command queue — so that `Listener::update` is never invoked while a lock
//! is held (mirroring `authlink-core`'s preference for message passing over
//! lock-held callbacks, see `responsechannel`-style channels in the teacher
//! repo).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cache::{LabelSet, Policy, PolicyCache};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId {
	pub name: String,
	pub namespace: String,
}

/// Receives policy snapshots for one subscriber. Implementations must not
/// block: the actor invokes `update` inline and a slow listener would stall
/// delivery to every other subscriber.
pub trait Listener: Send + Sync {
	fn update(&self, snapshot: Vec<Policy>);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WatchError {
	#[error("listener {0}/{1} already exists")]
	AlreadyExists(String, String),
}

enum Command {
	Subscribe {
		client_id: ClientId,
		labels: LabelSet,
		listener: Arc<dyn Listener>,
		ack: oneshot::Sender<Result<(), WatchError>>,
	},
	Unsubscribe {
		client_id: ClientId,
	},
	Put(Policy),
	Delete {
		namespace: String,
		name: String,
	},
	CountSubscribers {
		ack: oneshot::Sender<usize>,
	},
}

/// Handle to a running watcher actor. Cheap to clone; every clone shares the
/// same underlying cache and subscriber registry.
#[derive(Clone)]
pub struct PolicyWatcher {
	cmd_tx: mpsc::UnboundedSender<Command>,
}

struct Subscriber {
	client_id: ClientId,
	labels: LabelSet,
	listener: Arc<dyn Listener>,
}

struct Actor {
	cache: PolicyCache,
	// namespace -> subscribers
	listeners: HashMap<String, Vec<Subscriber>>,
	cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl PolicyWatcher {
	/// Spawn the watcher's background actor and return a handle to it.
	pub fn spawn() -> (Self, tokio::task::JoinHandle<()>) {
		let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
		let actor = Actor {
			cache: PolicyCache::new(),
			listeners: HashMap::new(),
			cmd_rx,
		};
		let join = tokio::spawn(actor.run());
		(Self { cmd_tx }, join)
	}

	/// Register `listener` under `client_id`. The returned future resolves
	/// only after `listener.update` has been invoked exactly once with the
	/// snapshot observed at subscribe time (possibly empty) — spec.md §8
	/// invariant 5.
	pub async fn subscribe(
		&self,
		client_id: ClientId,
		labels: LabelSet,
		listener: Arc<dyn Listener>,
	) -> Result<(), WatchError> {
		let (ack_tx, ack_rx) = oneshot::channel();
		let _ = self.cmd_tx.send(Command::Subscribe {
			client_id,
			labels,
			listener,
			ack: ack_tx,
		});
		ack_rx.await.expect("watcher actor dropped before acking subscribe")
	}

	pub fn unsubscribe(&self, client_id: ClientId) {
		let _ = self.cmd_tx.send(Command::Unsubscribe { client_id });
	}

	pub fn on_add(&self, policy: Policy) {
		let _ = self.cmd_tx.send(Command::Put(policy));
	}

	pub fn on_update(&self, policy: Policy) {
		let _ = self.cmd_tx.send(Command::Put(policy));
	}

	pub fn on_delete(&self, namespace: impl Into<String>, name: impl Into<String>) {
		let _ = self.cmd_tx.send(Command::Delete {
			namespace: namespace.into(),
			name: name.into(),
		});
	}

	/// Total subscriber count across every namespace, for observability.
	pub async fn subscriber_count(&self) -> usize {
		let (ack, ack_rx) = oneshot::channel();
		let _ = self.cmd_tx.send(Command::CountSubscribers { ack });
		ack_rx.await.unwrap_or(0)
	}
}

impl Actor {
	async fn run(mut self) {
		while let Some(cmd) = self.cmd_rx.recv().await {
			self.handle(cmd);
		}
	}

	fn handle(&mut self, cmd: Command) {
		match cmd {
			Command::Subscribe {
				client_id,
				labels,
				listener,
				ack,
			} => {
				let existing = self
					.listeners
					.entry(client_id.namespace.clone())
					.or_default();
				if existing.iter().any(|s| s.client_id.name == client_id.name) {
					let _ = ack.send(Err(WatchError::AlreadyExists(
						client_id.namespace,
						client_id.name,
					)));
					return;
				}
				let snapshot = self.cache.list(&client_id.namespace, &labels);
				existing.push(Subscriber {
					client_id,
					labels,
					listener: listener.clone(),
				});
				listener.update(snapshot);
				let _ = ack.send(Ok(()));
			},
			Command::Unsubscribe { client_id } => {
				if let Some(subs) = self.listeners.get_mut(&client_id.namespace) {
					subs.retain(|s| s.client_id.name != client_id.name);
				}
			},
			Command::Put(policy) => {
				info!(namespace = %policy.namespace, name = %policy.name, "policy put");
				self.cache.put(policy.clone());
				self.fan_out(&policy.namespace);
			},
			Command::Delete { namespace, name } => {
				info!(%namespace, %name, "policy deleted");
				self.cache.delete(&namespace, &name);
				self.fan_out(&namespace);
			},
		}
	}

	fn fan_out(&self, namespace: &str) {
		let Some(subs) = self.listeners.get(namespace) else {
			return;
		};
		for sub in subs {
			let snapshot = self.cache.list(namespace, &sub.labels);
			sub.listener.update(snapshot);
		}
		if subs.is_empty() {
			warn!(%namespace, "policy change with no subscribers");
		}
	}
}
