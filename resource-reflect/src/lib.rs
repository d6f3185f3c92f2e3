//! Reflection-driven scanner that enumerates the logical resource references
//! arbitrary typed data (including patches) contains, for building resource
//! dependency graphs.

pub mod prelude {
	pub use crate::model::{DetectedReference, FieldValue, InstanceView, ReferencerStructNode, ResourceTypeNode, Storage, detect};
	pub use crate::patch::{Chunk, Patch, PatchNode, SectionKind, SectionMarker};
	pub use crate::registry::{
		Archetype, BuildRuleMeta, FieldDescriptor, Registry, ReferenceMeta, ReferenceUsage, ResourceTypeFlags,
		ResourceTypeMeta, StructDescriptor, TypeName,
	};
}

mod registry;
mod model;
mod patch;
pub mod testing;

pub use model::{DetectedReference, FieldValue, InstanceView, ReferencerStructNode, ResourceTypeNode, Storage, detect};
pub use patch::{Chunk, Patch, PatchNode, SectionKind, SectionMarker, detect_in_patch};
pub use registry::{
	Archetype, BuildRuleMeta, FieldDescriptor, FieldName, InternedName, Registry, ReferenceMeta, ReferenceUsage,
	ResourceTypeFlags, ResourceTypeMeta, StructDescriptor, TypeName, intern,
};
pub use testing::StaticRegistry;
