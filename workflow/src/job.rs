use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A unit of work dispatched onto a [`JobSystem`]'s worker pool.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Abstract task sink the workflow engine dispatches onto. The engine never
/// suspends on this trait's behalf; it only posts work.
pub trait JobSystem: Send + Sync + 'static {
	fn dispatch(&self, task: Task);
}

/// Default [`JobSystem`] backed by the global rayon thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonJobSystem;

impl JobSystem for RayonJobSystem {
	fn dispatch(&self, task: Task) {
		rayon::spawn(task);
	}
}

/// A grouping of tasks with a single completion callback, firing exactly once
/// after every task dispatched into the job (including the job's own main
/// task) has drained. Handed to a node's callable so it can dispatch further
/// work that the node's completion waits on.
#[derive(Clone)]
pub struct Job {
	pending: Arc<AtomicUsize>,
	job_system: Arc<dyn JobSystem>,
	on_complete: Arc<dyn Fn() + Send + Sync>,
}

impl Job {
	/// Creates a job biased by one pending unit, representing the main task
	/// that is about to be dispatched. Call [`Job::finish_main`] once that
	/// main task returns.
	pub(crate) fn create(job_system: Arc<dyn JobSystem>, on_complete: impl Fn() + Send + Sync + 'static) -> Self {
		Job {
			pending: Arc::new(AtomicUsize::new(1)),
			job_system,
			on_complete: Arc::new(on_complete),
		}
	}

	/// Dispatches `f` as an additional task inside this job. The job's
	/// completion will not fire until `f` (and anything it itself dispatches
	/// into the job) has returned.
	pub fn dispatch(&self, f: impl FnOnce() + Send + 'static) {
		self.pending.fetch_add(1, Ordering::AcqRel);
		let pending = self.pending.clone();
		let on_complete = self.on_complete.clone();

		self.job_system.dispatch(Box::new(move || {
			f();

			if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
				on_complete();
			}
		}));
	}

	/// Marks the job's bias unit as drained. Must be called exactly once,
	/// after the job's main task has finished running.
	pub(crate) fn finish_main(&self) {
		if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
			(self.on_complete)();
		}
	}
}
