//! Component I: one long-lived task per discovery-stream subscriber. Turns
//! watcher snapshots into wire-ready messages and handles cancellation and
//! the stream deadline. The actual gRPC transport is out of scope (spec.md
//! §1); this module stops at a `Receiver` the transport drains.
//!
//! Grounded on `controller/discovery.go`'s `pListener`/`Policy` RPC handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use authlink_core::signal::ShutdownWatcher;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{LabelSet, Policy};
use crate::watcher::{ClientId, Listener, PolicyWatcher, WatchError};

/// The source's hard stream lifetime ceiling.
pub const DEFAULT_STREAM_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct PolicySnapshotMessage {
	/// One JSON-encoded policy config string per policy in the snapshot.
	pub policy: Vec<String>,
}

struct ChannelListener {
	client_id: ClientId,
	tx: mpsc::Sender<PolicySnapshotMessage>,
	dropped: AtomicU64,
}

impl Listener for ChannelListener {
	fn update(&self, snapshot: Vec<Policy>) {
		let mut policy = Vec::with_capacity(snapshot.len());
		for p in snapshot {
			match serde_json::to_string(&p.config) {
				Ok(s) => policy.push(s),
				Err(e) => warn!(
					namespace = %p.namespace, name = %p.name, error = %e,
					"can't marshal policy to json, dropping it from snapshot"
				),
			}
		}
		match self.tx.try_send(PolicySnapshotMessage { policy }) {
			Ok(()) => {},
			Err(mpsc::error::TrySendError::Full(_)) => {
				let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
				warn!(
					namespace = %self.client_id.namespace, name = %self.client_id.name, dropped,
					"subscriber outbound channel full, dropping snapshot"
				);
			},
			Err(mpsc::error::TrySendError::Closed(_)) => {
				// Receiver already gone; the owning task will unsubscribe.
			},
		}
	}
}

/// A running per-subscriber discovery stream. Dropping the receiver side
/// (or letting the deadline/cancel fire) ends the subscription; the
/// background task unregisters the listener from the watcher either way.
pub struct DiscoverySubscription {
	rx: mpsc::Receiver<PolicySnapshotMessage>,
}

impl DiscoverySubscription {
	/// Register with `watcher` and start the per-subscriber lifecycle task.
	/// `cancel` is an additional external cancellation source (e.g. a
	/// server-wide shutdown); the stream also ends on `deadline` or when the
	/// caller drops the returned receiver.
	pub async fn start(
		watcher: PolicyWatcher,
		client_id: ClientId,
		labels: LabelSet,
		buffer: usize,
		deadline: Duration,
		mut cancel: ShutdownWatcher,
	) -> Result<Self, WatchError> {
		let (tx, rx) = mpsc::channel(buffer);
		let listener = Arc::new(ChannelListener {
			client_id: client_id.clone(),
			tx: tx.clone(),
			dropped: AtomicU64::new(0),
		});
		watcher.subscribe(client_id.clone(), labels, listener).await?;

		tokio::spawn(async move {
			tokio::select! {
				_ = tokio::time::sleep(deadline) => {
					info!(namespace = %client_id.namespace, name = %client_id.name, "stream done by timeout");
				},
				_ = cancel.shutdown() => {
					info!(namespace = %client_id.namespace, name = %client_id.name, "stream cancelled by shutdown");
				},
				_ = tx.closed() => {
					info!(namespace = %client_id.namespace, name = %client_id.name, "stream cancelled by client");
				},
			}
			watcher.unsubscribe(client_id);
		});

		Ok(Self { rx })
	}

	pub async fn recv(&mut self) -> Option<PolicySnapshotMessage> {
		self.rx.recv().await
	}
}
