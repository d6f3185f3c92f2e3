//! Declarative dependency-and-resource graph, compiled into a race-free
//! parallel execution plan and dispatched over a CPU job system.

pub mod prelude {
	pub use crate::{Builder, NodeHandle, Graph, NodeName, ResourceName, Job};
	pub use crate::job::JobSystem;
}

mod intern;
mod job;
mod builder;
mod graph;

pub use intern::{NodeName, ResourceName};
pub use job::{Job, JobSystem, RayonJobSystem};
pub use builder::{Builder, NodeHandle, ResourceAccess, Conflict};
pub use graph::{Graph, NodeId};
