use std::collections::HashMap;

use smallvec::SmallVec;

use crate::patch::{self, Patch};
use crate::registry::{
	Archetype, FieldDescriptor, InternedName, ReferenceMeta, ReferenceUsage, Registry, ResourceTypeMeta, TypeName,
};

/// One field recorded against a scanned type: either a leaf reference field
/// (carries its own [`ReferenceMeta`]) or a carrier field that recurses into
/// a substructure which itself has fields to check.
#[derive(Debug, Clone)]
pub struct FieldInfo {
	pub field: FieldDescriptor,
	pub is_leaf: bool,
	pub referenced_type: Option<TypeName>,
	pub usage: ReferenceUsage,
}

/// Scan result for a single struct type.
#[derive(Debug, Clone)]
pub struct TypeInfoNode {
	pub type_name: TypeName,
	pub is_resource_type: bool,
	pub contains_patches: bool,
	pub fields_to_check: SmallVec<[FieldInfo; 8]>,
	pub referencer_types: Vec<TypeName>,
	/// Full field list of the scanned struct (not just reference/carrier
	/// fields), kept so inline-array size fields can be looked up by name.
	struct_fields: Vec<FieldDescriptor>,
}

/// Flattened view of one resource type: its meta plus, if it's produced by a
/// build rule, that rule's inputs. A second surface over the same scan that
/// [`Storage::nodes`](Storage::type_info) exposes, kept for callers (an
/// asset build pipeline, say) that want resource types without walking the
/// full type graph.
#[derive(Debug, Clone)]
pub struct ResourceTypeNode {
	pub name: TypeName,
	pub struct_type: TypeName,
	pub resource_type_meta: ResourceTypeMeta,
	pub produced_from_build_rule: bool,
	pub build_rule_primary_input_type: Option<TypeName>,
	pub build_rule_platform_configuration_type: Option<TypeName>,
	pub build_rule_secondary_types: Vec<TypeName>,
	pub build_rule_functor: Option<InternedName>,
	pub build_rule_version: u32,
}

/// The subset of a [`TypeInfoNode`] a reference-detecting caller actually
/// needs: its name and the fields to walk, without the scan bookkeeping.
#[derive(Debug, Clone)]
pub struct ReferencerStructNode {
	pub name: TypeName,
	pub fields_to_check: SmallVec<[FieldInfo; 8]>,
}

/// Read-only, registry-derived scan of every struct type reachable from a
/// resource type. Built once with [`Storage::build`]; rebuild if the
/// registry changes.
pub struct Storage {
	nodes: HashMap<TypeName, TypeInfoNode>,
	third_party_referencers: Vec<TypeName>,
	resource_type_nodes: HashMap<TypeName, ResourceTypeNode>,
	referencer_struct_nodes: HashMap<TypeName, ReferencerStructNode>,
}

fn push_unique(array: &mut Vec<TypeName>, name: TypeName) {
	if !array.contains(&name) {
		array.push(name);
	}
}

fn add_field(nodes: &mut HashMap<TypeName, TypeInfoNode>, type_name: TypeName, field: FieldDescriptor, meta: Option<ReferenceMeta>) {
	let node = nodes.get_mut(&type_name).expect("node inserted before recursion");
	node.fields_to_check.push(FieldInfo {
		field,
		is_leaf: meta.is_some(),
		referenced_type: meta.and_then(|m| m.referenced_type),
		usage: meta.map(|m| m.compilation_usage).unwrap_or(ReferenceUsage::NotNeeded),
	});
}

fn scan_type(
	registry: &dyn Registry,
	nodes: &mut HashMap<TypeName, TypeInfoNode>,
	third_party_referencers: &mut Vec<TypeName>,
	root_type_name: TypeName,
	type_name: TypeName,
) {
	if nodes.contains_key(&type_name) {
		return;
	}

	let Some(struct_data) = registry.find_struct(type_name) else {
		return;
	};

	let root_is_resource_type = registry.is_resource_or_byproduct_type(root_type_name);

	// Inserted right away so cyclic and mutually-recursive struct types
	// terminate on the contains_key check above instead of recursing forever.
	nodes.insert(type_name, TypeInfoNode {
		type_name,
		is_resource_type: type_name == root_type_name && root_is_resource_type,
		contains_patches: false,
		fields_to_check: SmallVec::new(),
		referencer_types: Vec::new(),
		struct_fields: struct_data.fields.clone(),
	});

	for field in struct_data.fields.clone() {
		let mut check_is_reference_field = false;
		let mut carrier_type: Option<TypeName> = None;

		let item_archetype = match &field.archetype {
			Archetype::InlineArray { item, .. } | Archetype::DynamicArray { item, .. } => Some(item.as_ref().clone()),
			other => {
				classify_scalar_archetype(other, &mut check_is_reference_field, &mut carrier_type);
				if matches!(other, Archetype::Patch) {
					add_field(nodes, type_name, field.clone(), None);
					nodes.get_mut(&type_name).unwrap().contains_patches = true;
				}
				None
			}
		};

		if let Some(item) = item_archetype {
			classify_scalar_archetype(&item, &mut check_is_reference_field, &mut carrier_type);
			if matches!(item, Archetype::Patch) {
				add_field(nodes, type_name, field.clone(), None);
				nodes.get_mut(&type_name).unwrap().contains_patches = true;
			}
		}

		if check_is_reference_field {
			if let Some(meta) = registry.reference_meta(type_name, field.name).copied() {
				add_field(nodes, type_name, field.clone(), Some(meta));

				if root_is_resource_type {
					match meta.referenced_type {
						Some(referenced) => {
							if registry.find_struct(referenced).is_some() && registry.is_resource_or_byproduct_type(referenced) {
								scan_type(registry, nodes, third_party_referencers, referenced, referenced);
								let referenced_node = nodes.get_mut(&referenced).expect("just scanned");
								push_unique(&mut referenced_node.referencer_types, root_type_name);
							} else {
								log::error!(target: "resource_reference",
									"Field \"{}\" of type \"{type_name}\" is marked as resource reference, but specified type \"{referenced}\" is not a resource type.",
									field.name);
							}
						}
						None => {
							push_unique(third_party_referencers, root_type_name);
						}
					}
				}
			}
		} else if let Some(child) = carrier_type {
			scan_type(registry, nodes, third_party_referencers, root_type_name, child);

			let child_has_fields = nodes.get(&child).map(|n| !n.fields_to_check.is_empty()).unwrap_or(false);
			if child_has_fields {
				let child_contains_patches = nodes[&child].contains_patches;
				add_field(nodes, type_name, field.clone(), None);
				nodes.get_mut(&type_name).unwrap().contains_patches |= child_contains_patches;
			}
		}
	}
}

fn classify_scalar_archetype(archetype: &Archetype, check_is_reference_field: &mut bool, carrier_type: &mut Option<TypeName>) {
	match archetype {
		Archetype::SignedInt
		| Archetype::UnsignedInt
		| Archetype::Floating
		| Archetype::PackedElemental
		| Archetype::StringPointer
		| Archetype::Enum
		| Archetype::ExternalPointer
		| Archetype::StructPointer
		| Archetype::Patch => {}

		Archetype::InternedString => *check_is_reference_field = true,
		Archetype::Struct { type_name } => *carrier_type = Some(*type_name),
		Archetype::InlineArray { .. } | Archetype::DynamicArray { .. } => {
			unreachable!("arrays of arrays are not a supported archetype shape")
		}
	}
}

impl Storage {
	/// Scans every struct type known to `registry`, building per-type field
	/// info and cross-referencer lists. Resource types are scanned first (so
	/// they are discoverable even if no other resource transitively points
	/// at them), then every other type (so patch-carrying non-resource types
	/// are still recorded).
	pub fn build(registry: &dyn Registry) -> Storage {
		let mut nodes: HashMap<TypeName, TypeInfoNode> = HashMap::new();
		let mut third_party_referencers: Vec<TypeName> = Vec::new();

		for s in registry.structs() {
			if registry.is_resource_or_byproduct_type(s.name) {
				scan_type(registry, &mut nodes, &mut third_party_referencers, s.name, s.name);
			}
		}

		for s in registry.structs() {
			scan_type(registry, &mut nodes, &mut third_party_referencers, s.name, s.name);
		}

		let patch_carrying_resources: Vec<TypeName> = nodes.values()
			.filter(|n| n.is_resource_type && n.contains_patches)
			.map(|n| n.type_name)
			.collect();

		for type_name in patch_carrying_resources {
			push_unique(&mut third_party_referencers, type_name);

			for node in nodes.values_mut() {
				if node.is_resource_type {
					push_unique(&mut node.referencer_types, type_name);
				}
			}
		}

		// Built from the registry directly (not the `nodes` map, which the
		// retain pass below may shrink): every resource type gets a flattened
		// node regardless of whether it has fields worth scanning.
		let mut resource_type_nodes: HashMap<TypeName, ResourceTypeNode> = HashMap::new();
		for s in registry.structs() {
			let Some(meta) = registry.resource_type_meta(s.name) else {
				continue;
			};

			let build_rule = registry.build_rule_meta(s.name);
			resource_type_nodes.insert(s.name, ResourceTypeNode {
				name: s.name,
				struct_type: s.name,
				resource_type_meta: *meta,
				produced_from_build_rule: build_rule.is_some(),
				build_rule_primary_input_type: build_rule.map(|b| b.primary_input_type),
				build_rule_platform_configuration_type: build_rule.and_then(|b| b.platform_configuration_type),
				build_rule_secondary_types: build_rule.map(|b| b.secondary_types.clone()).unwrap_or_default(),
				build_rule_functor: build_rule.map(|b| b.functor),
				build_rule_version: build_rule.map(|b| b.version).unwrap_or(0),
			});
		}

		nodes.retain(|_, node| !node.fields_to_check.is_empty() || !node.referencer_types.is_empty());

		let referencer_struct_nodes: HashMap<TypeName, ReferencerStructNode> = nodes.iter()
			.map(|(&name, node)| (name, ReferencerStructNode { name, fields_to_check: node.fields_to_check.clone() }))
			.collect();

		Storage { nodes, third_party_referencers, resource_type_nodes, referencer_struct_nodes }
	}

	pub fn type_info(&self, type_name: TypeName) -> Option<&TypeInfoNode> {
		self.nodes.get(&type_name)
	}

	pub fn third_party_referencers(&self) -> &[TypeName] {
		&self.third_party_referencers
	}

	pub fn resource_type_node(&self, type_name: TypeName) -> Option<&ResourceTypeNode> {
		self.resource_type_nodes.get(&type_name)
	}

	pub fn resource_type_nodes(&self) -> impl Iterator<Item = &ResourceTypeNode> {
		self.resource_type_nodes.values()
	}

	pub fn referencer_struct_node(&self, type_name: TypeName) -> Option<&ReferencerStructNode> {
		self.referencer_struct_nodes.get(&type_name)
	}
}

/// A single logical reference discovered by [`detect`], pointing at
/// `name` of `target_type` (`None` meaning an opaque third-party asset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedReference {
	pub target_type: Option<TypeName>,
	pub name: InternedName,
	pub usage: ReferenceUsage,
}

pub(crate) fn append_reference(out: &mut Vec<DetectedReference>, target_type: Option<TypeName>, name: InternedName, usage: ReferenceUsage) {
	if name.is_empty() {
		return;
	}

	for existing in out.iter_mut() {
		if existing.target_type == target_type && existing.name == name {
			existing.usage = union_usage(existing.usage, usage);
			return;
		}
	}

	out.push(DetectedReference { target_type, name, usage });
}

fn union_usage(a: ReferenceUsage, b: ReferenceUsage) -> ReferenceUsage {
	use ReferenceUsage::*;
	match (a, b) {
		(Required, _) | (_, Required) => Required,
		(PlatformOptional, _) | (_, PlatformOptional) => PlatformOptional,
		(NotNeeded, NotNeeded) => NotNeeded,
	}
}

/// Runtime view over one struct instance, providing just enough access for
/// [`detect`] to walk its reference fields. Implemented by callers against
/// their own in-memory representation; the reference model never reads raw
/// bytes directly.
pub trait InstanceView {
	fn visible(&self, _field: &FieldDescriptor) -> bool {
		true
	}

	fn field_value<'a>(&'a self, field: &FieldDescriptor) -> FieldValue<'a>;

	/// Live element count for an inline-array field whose archetype carries a
	/// `size_field`. Called with the *size field's* own descriptor (already
	/// validated to be a 1/2/4/8-byte integer archetype), not the array
	/// field's. Returning `None` falls back to the array's static count.
	fn array_len(&self, _size_field: &FieldDescriptor) -> Option<i64> {
		None
	}
}

pub enum FieldValue<'a> {
	Uninteresting,
	InternedString(Option<InternedName>),
	InternedStringArray(Vec<InternedName>),
	Struct(Box<dyn InstanceView + 'a>),
	StructArray(Vec<Box<dyn InstanceView + 'a>>),
	Patch(&'a Patch),
	PatchArray(Vec<&'a Patch>),
}

fn assert_integer_size_field(field: &FieldDescriptor) {
	let is_integer = matches!(field.archetype, Archetype::SignedInt | Archetype::UnsignedInt);
	assert!(
		is_integer && matches!(field.size, 1 | 2 | 4 | 8),
		"size_field \"{}\" must be a 1/2/4/8-byte integer archetype, found {:?} of size {}",
		field.name, field.archetype, field.size
	);
}

/// Resolves an inline array's live element count per the spec's size-field
/// resolution rule: if `size_field` is present, read it (validated to be a
/// 1/2/4/8-byte integer archetype) from `instance` and use that as the count;
/// otherwise fall back to the archetype's static dimension.
fn resolve_inline_array_len(info: &TypeInfoNode, field: &FieldDescriptor, instance: &dyn InstanceView, static_count: usize) -> usize {
	let Archetype::InlineArray { size_field: Some(size_field_name), .. } = &field.archetype else {
		return static_count;
	};

	let size_field = info.struct_fields.iter()
		.find(|f| f.name == *size_field_name)
		.unwrap_or_else(|| panic!("size_field \"{size_field_name}\" not found on type \"{}\"", info.type_name));

	assert_integer_size_field(size_field);

	match instance.array_len(size_field) {
		Some(count) => count.max(0) as usize,
		None => static_count,
	}
}

/// Walks `instance`'s fields_to_check (per `storage`'s scan of `type_name`),
/// appending every logical reference it finds into `out`.
pub fn detect(storage: &Storage, type_name: TypeName, instance: &dyn InstanceView, out: &mut Vec<DetectedReference>) {
	let Some(info) = storage.type_info(type_name) else {
		return;
	};

	for field_info in &info.fields_to_check {
		let field = &field_info.field;

		if !instance.visible(field) {
			continue;
		}

		match instance.field_value(field) {
			FieldValue::Uninteresting => {}

			FieldValue::InternedString(name) => {
				if field_info.is_leaf {
					if let Some(name) = name {
						append_reference(out, field_info.referenced_type, name, field_info.usage);
					}
				}
			}

			FieldValue::InternedStringArray(names) => {
				if field_info.is_leaf {
					let len = match &field.archetype {
						Archetype::InlineArray { count, .. } => resolve_inline_array_len(info, field, instance, *count).min(names.len()),
						_ => names.len(),
					};

					for name in names.into_iter().take(len) {
						append_reference(out, field_info.referenced_type, name, field_info.usage);
					}
				}
			}

			FieldValue::Struct(child) => {
				if let Archetype::Struct { type_name: child_type } = &field.archetype {
					detect(storage, *child_type, child.as_ref(), out);
				}
			}

			FieldValue::StructArray(children) => {
				let item = match &field.archetype {
					Archetype::InlineArray { item, .. } | Archetype::DynamicArray { item, .. } => item.as_ref(),
					_ => continue,
				};

				if let Archetype::Struct { type_name: child_type } = item {
					let len = match &field.archetype {
						Archetype::InlineArray { count, .. } => resolve_inline_array_len(info, field, instance, *count).min(children.len()),
						_ => children.len(),
					};

					for child in children.into_iter().take(len) {
						detect(storage, *child_type, child.as_ref(), out);
					}
				}
			}

			FieldValue::Patch(p) => patch::detect_in_patch(storage, p, out),

			FieldValue::PatchArray(patches) => {
				for p in patches {
					patch::detect_in_patch(storage, p, out);
				}
			}
		}
	}
}
