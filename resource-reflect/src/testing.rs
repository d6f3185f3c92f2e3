//! A minimal in-memory [`Registry`] for exercising the scanner without a real
//! reflection backend.

use std::collections::HashMap;

use crate::registry::{
	BuildRuleMeta, FieldDescriptor, FieldName, Registry, ReferenceMeta, ResourceTypeMeta, StructDescriptor, TypeName,
};

#[derive(Default)]
pub struct StaticRegistry {
	structs: Vec<StructDescriptor>,
	resource_metas: HashMap<TypeName, ResourceTypeMeta>,
	build_rules: HashMap<TypeName, BuildRuleMeta>,
	field_metas: HashMap<(TypeName, FieldName), ReferenceMeta>,
}

impl StaticRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_struct(&mut self, descriptor: StructDescriptor) -> &mut Self {
		self.structs.push(descriptor);
		self
	}

	pub fn mark_resource_type(&mut self, type_name: TypeName, meta: ResourceTypeMeta) -> &mut Self {
		self.resource_metas.insert(type_name, meta);
		self
	}

	pub fn add_build_rule(&mut self, type_name: TypeName, rule: BuildRuleMeta) -> &mut Self {
		self.build_rules.insert(type_name, rule);
		self
	}

	pub fn add_reference_meta(&mut self, type_name: TypeName, field_name: FieldName, meta: ReferenceMeta) -> &mut Self {
		self.field_metas.insert((type_name, field_name), meta);
		self
	}
}

impl Registry for StaticRegistry {
	fn structs(&self) -> Box<dyn Iterator<Item = &StructDescriptor> + '_> {
		Box::new(self.structs.iter())
	}

	fn find_struct(&self, name: TypeName) -> Option<&StructDescriptor> {
		self.structs.iter().find(|s| s.name == name)
	}

	fn resource_type_meta(&self, type_name: TypeName) -> Option<&ResourceTypeMeta> {
		self.resource_metas.get(&type_name)
	}

	fn build_rule_meta(&self, type_name: TypeName) -> Option<&BuildRuleMeta> {
		self.build_rules.get(&type_name)
	}

	fn reference_meta(&self, type_name: TypeName, field_name: FieldName) -> Option<&ReferenceMeta> {
		self.field_metas.get(&(type_name, field_name))
	}
}

pub fn field(name: &str, offset: usize, size: usize, archetype: crate::registry::Archetype) -> FieldDescriptor {
	FieldDescriptor {
		name: crate::registry::intern(name),
		offset,
		size,
		archetype,
		visibility_condition_field: None,
		visibility_condition_values: Vec::new(),
	}
}
