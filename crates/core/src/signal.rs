//! Cooperative shutdown signalling.
//!
//! Mirrors the `context.WithCancel` + `close(stop)` pattern the source
//! runtime uses: a single [`ShutdownTrigger`] can be fired once (by the
//! supervisor, on first fatal error or external stop) and any number of
//! [`ShutdownWatcher`] clones observe it.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownTrigger {
	tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ShutdownWatcher {
	rx: watch::Receiver<bool>,
}

/// Create a linked trigger/watcher pair. `shutdown_channel` is the name used
/// in the source; kept here because "pair" reads oddly when one side fires
/// and the other only ever observes.
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownWatcher) {
	let (tx, rx) = watch::channel(false);
	(ShutdownTrigger { tx }, ShutdownWatcher { rx })
}

impl ShutdownTrigger {
	/// Fire the shutdown signal. Idempotent: firing twice is a no-op.
	pub fn fire(&self) {
		// `send_if_modified` avoids waking watchers on a redundant fire.
		self.tx.send_if_modified(|fired| {
			if *fired {
				false
			} else {
				*fired = true;
				true
			}
		});
	}

	pub fn watcher(&self) -> ShutdownWatcher {
		ShutdownWatcher {
			rx: self.tx.subscribe(),
		}
	}
}

impl ShutdownWatcher {
	pub fn is_shutting_down(&self) -> bool {
		*self.rx.borrow()
	}

	/// Resolves once the trigger has fired. Safe to call repeatedly and from
	/// multiple clones; never resolves before the first fire.
	pub async fn shutdown(&mut self) {
		if self.is_shutting_down() {
			return;
		}
		// changed() only errors if every sender was dropped, which can't
		// happen while the owning Supervisor is alive.
		while self.rx.changed().await.is_ok() {
			if *self.rx.borrow() {
				return;
			}
		}
	}
}
