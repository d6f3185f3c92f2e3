use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::intern::NodeName;
use crate::job::{Job, JobSystem, RayonJobSystem};

pub(crate) type NodeCallable = Arc<dyn Fn(&Job) + Send + Sync>;

/// Dense index of a node inside a compiled [`Graph`]. Opaque outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

pub(crate) struct CompiledNode {
	pub name: NodeName,
	pub callable: NodeCallable,
	pub incomes_count: u32,
	pub incomes_left: AtomicU32,
	pub out_edges: Box<[NodeId]>,
}

/// Immutable, compiled DAG of execution nodes. Produced by [`crate::Builder::finalize`];
/// may be [`Graph::execute`]d any number of times, sequentially.
pub struct Graph {
	pub(crate) nodes: Box<[CompiledNode]>,
	pub(crate) start_nodes: Box<[NodeId]>,
	left_to_execute: Mutex<usize>,
	left_signal: Condvar,
}

impl Graph {
	pub(crate) fn new(nodes: Box<[CompiledNode]>, start_nodes: Box<[NodeId]>) -> Arc<Self> {
		assert!(!start_nodes.is_empty(), "a compiled graph must always have at least one start node");

		Arc::new(Graph {
			nodes,
			start_nodes,
			left_to_execute: Mutex::new(0),
			left_signal: Condvar::new(),
		})
	}

	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	pub fn start_node_count(&self) -> usize {
		self.start_nodes.len()
	}

	pub fn node_names(&self) -> impl Iterator<Item = NodeName> + '_ {
		self.nodes.iter().map(|node| node.name)
	}

	/// Runs this graph to completion once, dispatching node work over the
	/// global rayon thread pool.
	#[tracing::instrument(skip_all, name = "workflow::Graph::execute")]
	pub fn execute(self: &Arc<Self>) {
		self.execute_on(Arc::new(RayonJobSystem));
	}

	/// Runs this graph to completion once, dispatching node work through
	/// `job_system` instead of the default rayon-backed one. The calling
	/// thread blocks until every node has finished.
	pub fn execute_on(self: &Arc<Self>, job_system: Arc<dyn JobSystem>) {
		*self.left_to_execute.lock() = self.nodes.len();

		for &start in self.start_nodes.iter() {
			run_node(self.clone(), start, job_system.clone());
		}

		let mut left = self.left_to_execute.lock();
		while *left != 0 {
			self.left_signal.wait(&mut left);
		}
	}

	fn on_node_finished(&self) {
		let mut left = self.left_to_execute.lock();
		*left -= 1;

		if *left == 0 {
			self.left_signal.notify_one();
		}
	}
}

fn run_node(graph: Arc<Graph>, id: NodeId, job_system: Arc<dyn JobSystem>) {
	let completion_graph = graph.clone();
	let completion_job_system = job_system.clone();

	let job = Job::create(job_system.clone(), move || {
		finish_node(&completion_graph, id, completion_job_system.clone());
	});

	let callable = graph.nodes[id.0 as usize].callable.clone();
	let main_job = job.clone();

	job_system.dispatch(Box::new(move || {
		callable(&main_job);
		main_job.finish_main();
	}));
}

fn finish_node(graph: &Arc<Graph>, id: NodeId, job_system: Arc<dyn JobSystem>) {
	let node = &graph.nodes[id.0 as usize];
	// Re-runnable: restore this node's in-degree counter for the next execute().
	node.incomes_left.store(node.incomes_count, Ordering::Release);

	for &out_id in node.out_edges.iter() {
		let out_node = &graph.nodes[out_id.0 as usize];

		if out_node.incomes_left.fetch_sub(1, Ordering::AcqRel) == 1 {
			run_node(graph.clone(), out_id, job_system.clone());
		}
	}

	graph.on_node_finished();
}
