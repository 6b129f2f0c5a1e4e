//! Runtime supervisor (Component J): starts named long-running tasks
//! concurrently and coordinates shutdown on first fatal error, an external
//! stop request, or a process signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::signal::{shutdown_channel, ShutdownTrigger, ShutdownWatcher};

/// Default bound for `Task::shutdown`, matching the 5s graceful-shutdown
/// default named in spec.md §5.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait::async_trait]
pub trait Task: Send + Sync {
	fn name(&self) -> &str;

	/// Run until either the task completes on its own or `shutdown` fires.
	/// Implementations poll `shutdown.is_shutting_down()` or race
	/// `shutdown.shutdown()` in a `tokio::select!` to exit promptly.
	async fn start(&self, shutdown: ShutdownWatcher) -> anyhow::Result<()>;

	/// Best-effort teardown invoked once shutdown begins. Bounded by the
	/// supervisor's shutdown timeout; a `shutdown` that never returns is
	/// logged and abandoned rather than blocking other tasks.
	async fn shutdown(&self) -> anyhow::Result<()> {
		Ok(())
	}
}

#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum SupervisorError {
	#[error("task {name} failed: {source}")]
	TaskFailed {
		name: String,
		#[source]
		source: anyhow::Error,
	},
	#[error("task {name} panicked")]
	TaskPanicked { name: String },
}

pub struct Supervisor {
	tasks: Vec<Arc<dyn Task>>,
	shutdown_timeout: Duration,
}

impl Supervisor {
	pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
		Self {
			tasks,
			shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
		}
	}

	pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
		self.shutdown_timeout = timeout;
		self
	}

	/// Start every task, wait for a stop condition, then tear everything
	/// down. Returns the first error observed (from a task's `start`, or
	/// from a caller-supplied `stop` trigger carrying an error reason);
	/// subsequent errors are logged, not returned.
	pub async fn run(&self, stop: ShutdownWatcher) -> Result<(), SupervisorError> {
		let (trigger, watcher) = shutdown_channel();

		// External stop (caller-provided watcher, e.g. a test harness or a
		// process-signal listener wired up by the binary).
		let mut stop_rx = stop;
		let stop_trigger = trigger.clone();
		let stop_task = tokio::spawn(async move {
			stop_rx.shutdown().await;
			stop_trigger.fire();
		});

		let mut joinset: JoinSet<(String, anyhow::Result<()>)> = JoinSet::new();
		for task in &self.tasks {
			let task = task.clone();
			let watcher = watcher.clone();
			let name = task.name().to_string();
			info!(task = %name, "starting task");
			joinset.spawn(async move {
				let res = task.start(watcher).await;
				(name, res)
			});
		}

		let mut first_error: Option<SupervisorError> = None;
		while let Some(joined) = joinset.join_next().await {
			match joined {
				Ok((name, Ok(()))) => {
					info!(task = %name, "task stopped");
				},
				Ok((name, Err(source))) => {
					error!(task = %name, error = %source, "task failed");
					if first_error.is_none() {
						first_error = Some(SupervisorError::TaskFailed {
							name: name.clone(),
							source,
						});
						trigger.fire();
						self.shutdown_all().await;
					}
				},
				Err(join_err) => {
					let name = join_err.to_string();
					error!(task = %name, "task panicked");
					if first_error.is_none() {
						first_error = Some(SupervisorError::TaskPanicked { name });
						trigger.fire();
						self.shutdown_all().await;
					}
				},
			}
		}

		// If we fell out of the loop because every task finished on its
		// own, still make sure shutdown() ran (covers the "external stop,
		// no task error" path).
		trigger.fire();
		self.shutdown_all().await;
		stop_task.abort();

		match first_error {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	async fn shutdown_all(&self) {
		for task in &self.tasks {
			let name = task.name();
			match tokio::time::timeout(self.shutdown_timeout, task.shutdown()).await {
				Ok(Ok(())) => info!(task = %name, "task shut down cleanly"),
				Ok(Err(e)) => warn!(task = %name, error = %e, "task shutdown returned an error"),
				Err(_) => warn!(task = %name, timeout = ?self.shutdown_timeout, "task shutdown timed out"),
			}
		}
	}
}
