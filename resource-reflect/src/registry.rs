use internment::Intern;

/// Interned type or field name. Equality is pointer identity.
pub type TypeName = Intern<str>;
pub type FieldName = Intern<str>;
pub type InternedName = Intern<str>;

pub fn intern(s: &str) -> Intern<str> {
	Intern::from_ref(s)
}

/// The structural kind of a field. Dispatch on this is exhaustive everywhere
/// it appears; there is no polymorphism in the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Archetype {
	SignedInt,
	UnsignedInt,
	Floating,
	PackedElemental,
	StringPointer,
	Enum,
	ExternalPointer,
	StructPointer,
	InternedString,
	Struct { type_name: TypeName },
	InlineArray { item: Box<Archetype>, count: usize, item_size: usize, size_field: Option<FieldName> },
	DynamicArray { item: Box<Archetype>, item_size: usize },
	Patch,
}

/// A field as reported by the registry: where it lives, what it holds, and
/// under what condition it's actually present on a given instance.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
	pub name: FieldName,
	pub offset: usize,
	pub size: usize,
	pub archetype: Archetype,
	pub visibility_condition_field: Option<FieldName>,
	pub visibility_condition_values: Vec<i64>,
}

/// Field-level meta marking a field as carrying one or more interned
/// references to resources of `referenced_type` (or third-party/opaque
/// targets when `None`).
#[derive(Debug, Clone, Copy)]
pub struct ReferenceMeta {
	pub referenced_type: Option<TypeName>,
	pub compilation_usage: ReferenceUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceUsage {
	NotNeeded,
	Required,
	PlatformOptional,
}

bitflags::bitflags! {
	/// Flags carried by a [`ResourceTypeMeta`].
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct ResourceTypeFlags: u8 {
		const ROOT = 1 << 0;
	}
}

/// Type-level meta marking a struct as a resource (or byproduct) type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceTypeMeta {
	pub flags: ResourceTypeFlags,
}

impl ResourceTypeMeta {
	pub fn is_root(&self) -> bool {
		self.flags.contains(ResourceTypeFlags::ROOT)
	}
}

/// Optional sibling meta to [`ResourceTypeMeta`] declaring that a resource
/// type is produced by a build rule rather than authored directly.
#[derive(Debug, Clone)]
pub struct BuildRuleMeta {
	pub primary_input_type: TypeName,
	pub platform_configuration_type: Option<TypeName>,
	pub secondary_types: Vec<TypeName>,
	pub functor: Intern<str>,
	pub version: u32,
}

/// Structural description of one struct type, as read from the registry.
#[derive(Debug, Clone)]
pub struct StructDescriptor {
	pub name: TypeName,
	pub fields: Vec<FieldDescriptor>,
}

/// Read-only structural dependency the reference model scans over. A real
/// implementation backs this with a reflection registry generated from the
/// user's type definitions; [`registry::StaticRegistry`](crate::StaticRegistry)
/// is an in-memory double for tests.
pub trait Registry {
	fn structs(&self) -> Box<dyn Iterator<Item = &StructDescriptor> + '_>;
	fn find_struct(&self, name: TypeName) -> Option<&StructDescriptor>;
	fn resource_type_meta(&self, type_name: TypeName) -> Option<&ResourceTypeMeta>;
	fn build_rule_meta(&self, type_name: TypeName) -> Option<&BuildRuleMeta>;
	fn reference_meta(&self, type_name: TypeName, field_name: FieldName) -> Option<&ReferenceMeta>;

	/// Looks up the field of `type_name` local to the byte offset `offset`,
	/// used to resolve patch section markers against their parent struct.
	fn field_at_offset(&self, type_name: TypeName, offset: usize) -> Option<&FieldDescriptor> {
		self.find_struct(type_name)?
			.fields
			.iter()
			.find(|f| offset >= f.offset && offset < f.offset + f.size)
	}

	fn is_resource_or_byproduct_type(&self, type_name: TypeName) -> bool {
		self.resource_type_meta(type_name).is_some()
	}
}
