use std::collections::HashMap;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use parking_lot::Mutex;
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;

use crate::graph::{CompiledNode, Graph, NodeId};
use crate::intern::{NodeName, ResourceName, intern};
use crate::job::Job;

pub(crate) type NodeCallable = Arc<dyn Fn(&Job) + Send + Sync>;

/// One of the three resource access classes a node can declare (§5: INSERT,
/// WRITE, READ). Determines which pairs of concurrent nodes the builder's
/// race-verification pass rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccess {
	Insert,
	Write,
	Read,
}

/// An unsubmitted, owned workflow node. Created with [`Builder::node_create`],
/// configured with the setters below, then handed to [`Builder::node_submit`].
/// A handle with no function attached is a checkpoint: a pure synchronization
/// label with no callable, elided away when the graph is compiled.
#[derive(Clone)]
pub struct NodeHandle {
	pub(crate) name: NodeName,
	pub(crate) function: Option<NodeCallable>,
	pub(crate) depends_on: Vec<NodeName>,
	pub(crate) dependency_of: Vec<NodeName>,
	pub(crate) resource_insert_access: Vec<ResourceName>,
	pub(crate) resource_write_access: Vec<ResourceName>,
	pub(crate) resource_read_access: Vec<ResourceName>,
}

impl NodeHandle {
	fn new(name: NodeName) -> Self {
		NodeHandle {
			name,
			function: None,
			depends_on: Vec::new(),
			dependency_of: Vec::new(),
			resource_insert_access: Vec::new(),
			resource_write_access: Vec::new(),
			resource_read_access: Vec::new(),
		}
	}

	pub fn name(&self) -> NodeName {
		self.name
	}

	pub fn is_checkpoint(&self) -> bool {
		self.function.is_none()
	}

	/// Attaches the node's callable. A node without one submits as a checkpoint
	/// and will be rejected by [`Builder::node_submit`].
	pub fn set_function(&mut self, f: impl Fn(&Job) + Send + Sync + 'static) -> &mut Self {
		self.function = Some(Arc::new(f));
		self
	}

	pub fn insert_resource(&mut self, resource_name: &str) -> &mut Self {
		push_unique(&mut self.resource_insert_access, intern(resource_name));
		self
	}

	pub fn write_resource(&mut self, resource_name: &str) -> &mut Self {
		push_unique(&mut self.resource_write_access, intern(resource_name));
		self
	}

	pub fn read_resource(&mut self, resource_name: &str) -> &mut Self {
		push_unique(&mut self.resource_read_access, intern(resource_name));
		self
	}

	/// Declares that this node depends on (must run strictly after) `name`.
	pub fn depend_on(&mut self, name: &str) -> &mut Self {
		push_unique(&mut self.depends_on, intern(name));
		self
	}

	/// Declares that this node is a dependency of (must run strictly before) `name`.
	pub fn make_dependency_of(&mut self, name: &str) -> &mut Self {
		push_unique(&mut self.dependency_of, intern(name));
		self
	}

	/// Drops an unsubmitted handle. Only meaningful before submission; a
	/// handle consumed by [`Builder::node_submit`] is already owned by the
	/// builder.
	pub fn destroy(self) {}
}

fn push_unique(array: &mut Vec<NodeName>, name: NodeName) {
	if !array.contains(&name) {
		array.push(name);
	}
}

/// Details of one race-verification failure between two concurrent nodes.
#[derive(Debug, Clone)]
pub struct Conflict {
	pub node_a: NodeName,
	pub node_b: NodeName,
	/// `(a's access, b's access, colliding resource names)` triples.
	pub collisions: Vec<(ResourceAccess, ResourceAccess, Vec<ResourceName>)>,
}

/// Accepts node submissions and standalone checkpoint-to-checkpoint edges and
/// compiles them into a verified, immutable [`Graph`]. Submission is
/// serialized by an internal lock so background scanners may register nodes
/// concurrently with a driver that finalizes at the end.
pub struct Builder {
	group: String,
	nodes: Mutex<HashMap<NodeName, NodeHandle>>,
}

impl Builder {
	pub fn create(allocation_group: impl Into<String>) -> Self {
		Builder {
			group: allocation_group.into(),
			nodes: Mutex::new(HashMap::new()),
		}
	}

	pub fn allocation_group(&self) -> &str {
		&self.group
	}

	pub fn node_create(&self, name: &str) -> NodeHandle {
		NodeHandle::new(intern(name))
	}

	/// Records a checkpoint-scoped edge `from_checkpoint -> to_checkpoint`.
	/// Both endpoints are auto-created as checkpoints if absent. Fails if
	/// `from_checkpoint` already exists as a non-checkpoint node.
	pub fn add_checkpoint_edge(&self, from_checkpoint: &str, to_checkpoint: &str) -> anyhow::Result<()> {
		let from = intern(from_checkpoint);
		let to = intern(to_checkpoint);

		let mut nodes = self.nodes.lock();
		let from_node = nodes.entry(from).or_insert_with(|| NodeHandle::new(from));

		if !from_node.is_checkpoint() {
			log::error!(target: "workflow_graph_builder",
				"Caught attempt to register checkpoint dependency where dependency \"{from_checkpoint}\" is not a checkpoint.");
			anyhow::bail!("\"{from_checkpoint}\" is not a checkpoint");
		}

		push_unique(&mut from_node.dependency_of, to);
		Ok(())
	}

	/// Submits a configured node. Fails if the handle has no function (it
	/// would be a checkpoint) or if a node with that name already exists.
	/// On failure the handle is returned to the caller, who owns it.
	pub fn node_submit(&self, node: NodeHandle) -> Result<(), NodeHandle> {
		if node.is_checkpoint() {
			log::error!(target: "workflow_graph_builder",
				"Failed to submit workflow node \"{}\" as it has no function and therefore simulates a checkpoint.", node.name);
			return Err(node);
		}

		let mut nodes = self.nodes.lock();
		if nodes.contains_key(&node.name) {
			log::error!(target: "workflow_graph_builder",
				"Failed to submit workflow node \"{}\" as there is already a node with the same name.", node.name);
			return Err(node);
		}

		nodes.insert(node.name, node);
		Ok(())
	}

	pub fn node_count(&self) -> usize {
		self.nodes.lock().len()
	}

	/// Runs the same compilation checks as [`Builder::finalize`] without
	/// consuming the builder's submitted nodes. Always cheap enough to run
	/// (O(N^2) over nodes with small bitsets, per the resource count).
	pub fn validate(&self) -> anyhow::Result<()> {
		let snapshot = self.nodes.lock().clone();
		compile(snapshot).map(|_| ())
	}

	/// Compiles all submitted nodes and checkpoint edges into a [`Graph`].
	/// Drains the builder's node set regardless of success, so the builder
	/// may be reused immediately afterwards.
	#[tracing::instrument(skip_all, name = "workflow::Builder::finalize")]
	pub fn finalize(&self) -> anyhow::Result<Arc<Graph>> {
		let snapshot = std::mem::take(&mut *self.nodes.lock());
		compile(snapshot)
	}
}

fn compile(mut nodes: HashMap<NodeName, NodeHandle>) -> anyhow::Result<Arc<Graph>> {
	if nodes.is_empty() {
		log::error!(target: "workflow_graph_builder", "Caught attempt to finalize empty graph.");
		anyhow::bail!("cannot finalize an empty workflow graph");
	}

	// Step 1: materialize checkpoints referenced by name but never created.
	let mut missing = Vec::new();
	for node in nodes.values() {
		for &name in node.depends_on.iter().chain(node.dependency_of.iter()) {
			if !nodes.contains_key(&name) {
				missing.push(name);
			}
		}
	}

	for name in missing {
		nodes.entry(name).or_insert_with(|| NodeHandle::new(name));
	}

	// Step 2: intermediate adjacency, deduplicated, both by name (used for
	// checkpoint elision) and as a petgraph DAG (used for verification).
	let mut incomes: HashMap<NodeName, Vec<NodeName>> = HashMap::new();
	let mut outcomes: HashMap<NodeName, Vec<NodeName>> = HashMap::new();

	for &name in nodes.keys() {
		incomes.entry(name).or_default();
		outcomes.entry(name).or_default();
	}

	for node in nodes.values() {
		for &dependency in &node.depends_on {
			push_unique(outcomes.get_mut(&dependency).unwrap(), node.name);
			push_unique(incomes.get_mut(&node.name).unwrap(), dependency);
		}

		for &dependant in &node.dependency_of {
			push_unique(outcomes.get_mut(&node.name).unwrap(), dependant);
			push_unique(incomes.get_mut(&dependant).unwrap(), node.name);
		}
	}

	let mut pg = DiGraph::<NodeName, ()>::new();
	let mut index_of = HashMap::new();

	for &name in nodes.keys() {
		index_of.insert(name, pg.add_node(name));
	}

	for (&name, deps) in &incomes {
		for &dep in deps {
			pg.add_edge(index_of[&dep], index_of[&name], ());
		}
	}

	// Step 3: verification. Always run (cheap: O(N^2) over small bitsets).
	let topo = match toposort(&pg, None) {
		Ok(order) => order,
		Err(_) => {
			log::error!(target: "workflow_graph_builder", "Caught cycle in workflow graph. Dumping node stack:");
			for scc in tarjan_scc(&pg) {
				if scc.len() > 1 {
					for idx in scc {
						log::error!(target: "workflow_graph_builder", "- \"{}\"", pg[idx]);
					}
				}
			}
			anyhow::bail!("cycle detected in workflow graph");
		}
	};

	let node_count = pg.node_count();
	let mut reachability = vec![FixedBitSet::with_capacity(node_count); node_count];

	for &idx in topo.iter().rev() {
		let mut bits = FixedBitSet::with_capacity(node_count);
		for succ in pg.neighbors_directed(idx, Outgoing) {
			bits.insert(succ.index());
			bits.union_with(&reachability[succ.index()]);
		}
		reachability[idx.index()] = bits;
	}

	let mut resource_ids: HashMap<ResourceName, usize> = HashMap::new();
	for node in nodes.values() {
		for &r in node.resource_insert_access.iter()
			.chain(&node.resource_write_access)
			.chain(&node.resource_read_access)
		{
			let next_id = resource_ids.len();
			resource_ids.entry(r).or_insert(next_id);
		}
	}

	let resource_count = resource_ids.len();
	let access_mask = |names: &[ResourceName]| -> FixedBitSet {
		let mut bits = FixedBitSet::with_capacity(resource_count);
		for name in names {
			bits.insert(resource_ids[name]);
		}
		bits
	};

	struct Access {
		insert: FixedBitSet,
		write: FixedBitSet,
		read: FixedBitSet,
	}

	let mut access_by_index: HashMap<petgraph::graph::NodeIndex, Access> = HashMap::new();
	for (&name, node) in &nodes {
		access_by_index.insert(index_of[&name], Access {
			insert: access_mask(&node.resource_insert_access),
			write: access_mask(&node.resource_write_access),
			read: access_mask(&node.resource_read_access),
		});
	}

	let id_to_resource_name: Vec<ResourceName> = {
		let mut v = vec![ResourceName::from_ref(""); resource_count];
		for (&name, &id) in &resource_ids {
			v[id] = name;
		}
		v
	};

	let mut conflicts = Vec::new();
	let node_indices: Vec<_> = pg.node_indices().collect();

	for (i, &a_idx) in node_indices.iter().enumerate() {
		for &b_idx in &node_indices[i + 1..] {
			let concurrent = !reachability[a_idx.index()].contains(b_idx.index())
				&& !reachability[b_idx.index()].contains(a_idx.index());

			if !concurrent {
				continue;
			}

			let a = &access_by_index[&a_idx];
			let b = &access_by_index[&b_idx];

			use ResourceAccess::*;
			let checks: [(ResourceAccess, ResourceAccess, &FixedBitSet, &FixedBitSet); 7] = [
				(Read, Write, &a.read, &b.write),
				(Write, Read, &a.write, &b.read),
				(Read, Insert, &a.read, &b.insert),
				(Insert, Read, &a.insert, &b.read),
				(Insert, Write, &a.insert, &b.write),
				(Write, Insert, &a.write, &b.insert),
				(Write, Write, &a.write, &b.write),
			];

			let mut collisions = Vec::new();
			for (ka, kb, sa, sb) in checks {
				let mut inter = sa.clone();
				inter.intersect_with(sb);

				if inter.count_ones(..) > 0 {
					let names = inter.ones().map(|id| id_to_resource_name[id]).collect::<Vec<_>>();
					collisions.push((ka, kb, names));
				}
			}

			if !collisions.is_empty() {
				let node_a = pg[a_idx];
				let node_b = pg[b_idx];

				log::error!(target: "workflow_graph_builder",
					"Found race collision between nodes \"{node_a}\" and \"{node_b}\", enumerating collisions:");

				for (ka, kb, names) in &collisions {
					log::error!(target: "workflow_graph_builder", "- First node {ka:?} and second node {kb:?}:");
					for name in names {
						log::error!(target: "workflow_graph_builder", "  - \"{name}\"");
					}
				}

				conflicts.push(Conflict { node_a, node_b, collisions });
			}
		}
	}

	if !conflicts.is_empty() {
		anyhow::bail!("race verification found {} colliding node pair(s)", conflicts.len());
	}

	// Step 4: checkpoint elision (cartesian rewiring), on the name-keyed maps.
	let checkpoint_names: Vec<NodeName> = nodes.iter()
		.filter(|(_, node)| node.is_checkpoint())
		.map(|(&name, _)| name)
		.collect();

	for checkpoint in checkpoint_names {
		let cp_incomes = incomes.remove(&checkpoint).unwrap_or_default();
		let cp_outcomes = outcomes.remove(&checkpoint).unwrap_or_default();

		if cp_incomes.len() + cp_outcomes.len() <= 1 {
			log::warn!(target: "workflow_graph_builder",
				"Checkpoint \"{checkpoint}\" is only referenced once. Misspelling or redundant checkpoint?");
		}

		for &income in &cp_incomes {
			outcomes.get_mut(&income).unwrap().retain(|&n| n != checkpoint);
		}

		for &outcome in &cp_outcomes {
			incomes.get_mut(&outcome).unwrap().retain(|&n| n != checkpoint);
		}

		for &income in &cp_incomes {
			for &outcome in &cp_outcomes {
				if income == outcome {
					continue;
				}

				push_unique(outcomes.get_mut(&income).unwrap(), outcome);
				push_unique(incomes.get_mut(&outcome).unwrap(), income);
			}
		}
	}

	let mut functional: Vec<NodeName> = nodes.iter()
		.filter(|(_, node)| !node.is_checkpoint())
		.map(|(&name, _)| name)
		.collect();
	functional.sort_unstable_by_key(|name| name.to_string());

	if functional.is_empty() {
		log::error!(target: "workflow_graph_builder",
			"Caught attempt to finalize graph with only checkpoints and no functional nodes.");
		anyhow::bail!("workflow graph has no functional nodes after checkpoint elision");
	}

	let id_of: HashMap<NodeName, u32> = functional.iter()
		.enumerate()
		.map(|(i, &name)| (name, i as u32))
		.collect();

	// Step 5: layout.
	let mut compiled_nodes = Vec::with_capacity(functional.len());
	let mut start_nodes = Vec::new();

	for (i, &name) in functional.iter().enumerate() {
		let node = &nodes[&name];
		let node_incomes = &incomes[&name];
		let node_outcomes = &outcomes[&name];

		if node_incomes.is_empty() {
			start_nodes.push(NodeId(i as u32));
		}

		compiled_nodes.push(CompiledNode {
			name,
			callable: node.function.clone().expect("functional node always has a callable"),
			incomes_count: node_incomes.len() as u32,
			incomes_left: std::sync::atomic::AtomicU32::new(node_incomes.len() as u32),
			out_edges: node_outcomes.iter().map(|n| NodeId(id_of[n])).collect(),
		});
	}

	if start_nodes.is_empty() {
		log::error!(target: "workflow_graph_builder", "Graph has no start nodes. Perhaps, there is a cycle somewhere?");
		anyhow::bail!("workflow graph has no start nodes");
	}

	Ok(Graph::new(compiled_nodes.into_boxed_slice(), start_nodes.into_boxed_slice()))
}
