//! Keyed, cancellable task scheduling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Schedules named tasks and keeps track of them.
///
/// At most one task is live per key: scheduling under a key that is already
/// live drops the new task instead of double-running it. A completed task
/// removes its own bookkeeping; [`Scheduler::cancel`] aborts a live one.
/// The scheduler's `name` distinguishes its log output when several
/// instances coexist.
pub struct Scheduler {
	name: &'static str,
	tasks: Arc<Mutex<HashMap<String, Scheduled>>>,
	generation: AtomicU64,
}

struct Scheduled {
	generation: u64,
	handle: JoinHandle<()>,
}

impl Scheduler {
	pub fn new(name: &'static str) -> Self {
		Self {
			name,
			tasks: Arc::new(Mutex::new(HashMap::new())),
			generation: AtomicU64::new(0),
		}
	}

	/// Whether a task with `task_id` is currently scheduled.
	pub fn contains(&self, task_id: &str) -> bool {
		self.tasks.lock().contains_key(task_id)
	}

	/// Spawn `task` under `task_id`; a live task under the same key wins and
	/// the new one is dropped.
	pub fn schedule<F>(&self, task_id: impl Into<String>, task: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let task_id = task_id.into();
		let mut tasks = self.tasks.lock();
		if tasks.contains_key(&task_id) {
			debug!(scheduler = self.name, task = %task_id, "task already scheduled, dropping");
			return;
		}

		let generation = self.generation.fetch_add(1, Ordering::Relaxed);
		let registry = Arc::clone(&self.tasks);
		let id = task_id.clone();
		let handle = tokio::spawn(async move {
			task.await;
			// Only the generation that actually ran may clean up; a cancel
			// plus re-schedule may have replaced the entry in the meantime.
			let mut tasks = registry.lock();
			if tasks.get(&id).is_some_and(|entry| entry.generation == generation) {
				tasks.remove(&id);
			}
		});
		debug!(scheduler = self.name, task = %task_id, "scheduled task");
		tasks.insert(task_id, Scheduled { generation, handle });
	}

	/// Spawn `task` under `task_id` once `delay` has elapsed.
	pub fn schedule_later<F>(&self, delay: Duration, task_id: impl Into<String>, task: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		self.schedule(task_id, async move {
			tokio::time::sleep(delay).await;
			task.await;
		});
	}

	/// Abort the task scheduled under `task_id`; warns when none exists.
	pub fn cancel(&self, task_id: &str) {
		let removed = self.tasks.lock().remove(task_id);
		match removed {
			Some(scheduled) => {
				scheduled.handle.abort();
				debug!(scheduler = self.name, task = %task_id, "cancelled task");
			}
			None => {
				warn!(scheduler = self.name, task = %task_id, "no scheduled task to cancel");
			}
		}
	}

	/// Abort every scheduled task.
	pub fn cancel_all(&self) {
		let drained: Vec<Scheduled> = {
			let mut tasks = self.tasks.lock();
			tasks.drain().map(|(_, scheduled)| scheduled).collect()
		};
		for scheduled in &drained {
			scheduled.handle.abort();
		}
		debug!(scheduler = self.name, count = drained.len(), "cancelled all tasks");
	}
}
