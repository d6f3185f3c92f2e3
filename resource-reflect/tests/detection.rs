use resource_reflect::testing::{StaticRegistry, field};
use resource_reflect::{
	Archetype, DetectedReference, FieldValue, InstanceView, ReferenceMeta, ReferenceUsage, ResourceTypeFlags,
	ResourceTypeMeta, Storage, StructDescriptor, detect, intern,
};

fn resource_type_meta(root: bool) -> ResourceTypeMeta {
	ResourceTypeMeta {
		flags: if root { ResourceTypeFlags::ROOT } else { ResourceTypeFlags::empty() },
	}
}

fn flat_registry() -> StaticRegistry {
	let mut registry = StaticRegistry::new();

	registry.add_struct(StructDescriptor {
		name: intern("LevelResource"),
		fields: vec![],
	});
	registry.mark_resource_type(intern("LevelResource"), resource_type_meta(true));

	registry.add_struct(StructDescriptor {
		name: intern("World"),
		fields: vec![field("level", 0, 8, Archetype::InternedString)],
	});
	registry.mark_resource_type(intern("World"), resource_type_meta(true));
	registry.add_reference_meta(intern("World"), intern("level"), ReferenceMeta {
		referenced_type: Some(intern("LevelResource")),
		compilation_usage: ReferenceUsage::Required,
	});

	registry
}

struct WorldInstance {
	level: Option<resource_reflect::TypeName>,
}

impl InstanceView for WorldInstance {
	fn field_value<'a>(&'a self, field: &resource_reflect::FieldDescriptor) -> FieldValue<'a> {
		match &*field.name {
			"level" => FieldValue::InternedString(self.level),
			_ => FieldValue::Uninteresting,
		}
	}
}

#[test]
fn round_trip_on_flat_struct() {
	let registry = flat_registry();
	let storage = Storage::build(&registry);

	let instance = WorldInstance { level: Some(intern("lobby")) };
	let mut out = Vec::new();
	detect(&storage, intern("World"), &instance, &mut out);

	assert_eq!(out, vec![DetectedReference {
		target_type: Some(intern("LevelResource")),
		name: intern("lobby"),
		usage: ReferenceUsage::Required,
	}]);
}

#[test]
fn empty_name_is_filtered() {
	let registry = flat_registry();
	let storage = Storage::build(&registry);

	let instance = WorldInstance { level: Some(intern("")) };
	let mut out = Vec::new();
	detect(&storage, intern("World"), &instance, &mut out);

	assert!(out.is_empty());
}

#[test]
fn deduplication_unions_usage_flags() {
	let registry = flat_registry();
	let storage = Storage::build(&registry);
	let mut out = Vec::new();

	resource_reflect::detect(&storage, intern("World"), &WorldInstance { level: Some(intern("lobby")) }, &mut out);
	resource_reflect::detect(&storage, intern("World"), &WorldInstance { level: Some(intern("lobby")) }, &mut out);

	assert_eq!(out.len(), 1);
	assert_eq!(out[0].usage, ReferenceUsage::Required);
}

struct GatedInstance {
	visible: bool,
	level: Option<resource_reflect::TypeName>,
}

impl InstanceView for GatedInstance {
	fn visible(&self, field: &resource_reflect::FieldDescriptor) -> bool {
		match &*field.name {
			"level" => self.visible,
			_ => true,
		}
	}

	fn field_value<'a>(&'a self, field: &resource_reflect::FieldDescriptor) -> FieldValue<'a> {
		match &*field.name {
			"level" => FieldValue::InternedString(self.level),
			_ => FieldValue::Uninteresting,
		}
	}
}

#[test]
fn visibility_gating_skips_hidden_fields() {
	let registry = flat_registry();
	let storage = Storage::build(&registry);

	let hidden = GatedInstance { visible: false, level: Some(intern("lobby")) };
	let mut out = Vec::new();
	detect(&storage, intern("World"), &hidden, &mut out);
	assert!(out.is_empty());

	let shown = GatedInstance { visible: true, level: Some(intern("lobby")) };
	let mut out = Vec::new();
	detect(&storage, intern("World"), &shown, &mut out);
	assert_eq!(out.len(), 1);
}

fn patch_registry() -> StaticRegistry {
	let mut registry = StaticRegistry::new();

	registry.add_struct(StructDescriptor {
		name: intern("Pipeline"),
		fields: vec![],
	});
	registry.mark_resource_type(intern("Pipeline"), resource_type_meta(true));

	registry.add_struct(StructDescriptor {
		name: intern("Pass"),
		fields: vec![field("pipeline", 0, 8, Archetype::InternedString)],
	});
	registry.add_reference_meta(intern("Pass"), intern("pipeline"), ReferenceMeta {
		referenced_type: Some(intern("Pipeline")),
		compilation_usage: ReferenceUsage::Required,
	});

	registry.add_struct(StructDescriptor {
		name: intern("Material"),
		fields: vec![
			field("passes", 8, 16, Archetype::DynamicArray { item: Box::new(Archetype::Struct { type_name: intern("Pass") }), item_size: 8 }),
			field("shared_pipelines", 24, 16, Archetype::DynamicArray { item: Box::new(Archetype::InternedString), item_size: 8 }),
		],
	});
	registry.mark_resource_type(intern("Material"), resource_type_meta(true));
	registry.add_reference_meta(intern("Material"), intern("shared_pipelines"), ReferenceMeta {
		referenced_type: Some(intern("Pipeline")),
		compilation_usage: ReferenceUsage::Required,
	});

	registry
}

#[test]
fn patch_append_of_struct_element_emits_one_reference() {
	use resource_reflect::{Chunk, Patch, PatchNode, SectionKind, SectionMarker};

	let registry = patch_registry();
	let storage = Storage::build(&registry);

	let passes_field = field("passes", 8, 16, Archetype::DynamicArray { item: Box::new(Archetype::Struct { type_name: intern("Pass") }), item_size: 8 });

	let patch = Patch {
		root_type: intern("Material"),
		nodes: vec![
			PatchNode::Section(SectionMarker {
				id: 1,
				parent_id: None,
				kind: SectionKind::Append,
				parent_type: intern("Material"),
				field: passes_field,
			}),
			PatchNode::Chunk(Chunk {
				offset: 0,
				size: 8,
				interned_strings: vec![(0, intern("unlit"))],
			}),
		],
	};

	let mut out = Vec::new();
	resource_reflect::detect_in_patch(&storage, &patch, &mut out);

	assert_eq!(out, vec![DetectedReference {
		target_type: Some(intern("Pipeline")),
		name: intern("unlit"),
		usage: ReferenceUsage::Required,
	}]);
}

#[test]
fn patch_dynamic_array_set_over_interned_string_array_emits_a_reference_per_element() {
	use resource_reflect::{Chunk, Patch, PatchNode, SectionKind, SectionMarker};

	let registry = patch_registry();
	let storage = Storage::build(&registry);

	let shared_pipelines_field = field("shared_pipelines", 24, 16, Archetype::DynamicArray { item: Box::new(Archetype::InternedString), item_size: 8 });

	let patch = Patch {
		root_type: intern("Material"),
		nodes: vec![
			PatchNode::Section(SectionMarker {
				id: 1,
				parent_id: None,
				kind: SectionKind::Set,
				parent_type: intern("Material"),
				field: shared_pipelines_field,
			}),
			PatchNode::Chunk(Chunk {
				offset: 0,
				size: 16,
				interned_strings: vec![(0, intern("unlit")), (8, intern("tonemap"))],
			}),
		],
	};

	let mut out = Vec::new();
	resource_reflect::detect_in_patch(&storage, &patch, &mut out);

	assert_eq!(out, vec![
		DetectedReference { target_type: Some(intern("Pipeline")), name: intern("unlit"), usage: ReferenceUsage::Required },
		DetectedReference { target_type: Some(intern("Pipeline")), name: intern("tonemap"), usage: ReferenceUsage::Required },
	]);
}

#[test]
fn patch_dynamic_array_set_over_struct_array_walks_every_intersecting_element() {
	use resource_reflect::{Chunk, Patch, PatchNode, SectionKind, SectionMarker};

	let registry = patch_registry();
	let storage = Storage::build(&registry);

	let passes_field = field("passes", 8, 16, Archetype::DynamicArray { item: Box::new(Archetype::Struct { type_name: intern("Pass") }), item_size: 8 });

	// A single chunk spanning two 8-byte Pass elements; `set` must walk both
	// struct-sized windows rather than only the one at offset 0.
	let patch = Patch {
		root_type: intern("Material"),
		nodes: vec![
			PatchNode::Section(SectionMarker {
				id: 1,
				parent_id: None,
				kind: SectionKind::Set,
				parent_type: intern("Material"),
				field: passes_field,
			}),
			PatchNode::Chunk(Chunk {
				offset: 0,
				size: 16,
				interned_strings: vec![(0, intern("unlit")), (8, intern("tonemap"))],
			}),
		],
	};

	let mut out = Vec::new();
	resource_reflect::detect_in_patch(&storage, &patch, &mut out);

	assert_eq!(out, vec![
		DetectedReference { target_type: Some(intern("Pipeline")), name: intern("unlit"), usage: ReferenceUsage::Required },
		DetectedReference { target_type: Some(intern("Pipeline")), name: intern("tonemap"), usage: ReferenceUsage::Required },
	]);
}
