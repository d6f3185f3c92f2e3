//! Patch walking (spec §4.5): a patch is a stream of data chunks and dynamic-array
//! section markers describing a sparse set of mutations against a base struct.
//!
//! Chunks here carry pre-resolved interned-string values at the absolute offsets
//! they occupy rather than raw bytes: reflection detection only ever reads two
//! kinds of information out of patch bytes (interned-string values, and "is this
//! byte range touched at all"), so there is no need to reinterpret a byte buffer
//! the way the original engine does. A patch section's source field is likewise
//! named directly rather than resolved by offset-into-parent modulo arithmetic,
//! since there is no live parent instance to resolve it against.

use smallvec::SmallVec;

use crate::model::{DetectedReference, Storage, append_reference};
use crate::registry::{Archetype, FieldDescriptor, InternedName, TypeName};

const MAX_SECTION_STACK_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
	/// Full replacement of a dynamic array's backing buffer.
	Set,
	/// Appending a single new element.
	Append,
}

/// A byte range of a patch carrying concrete interned-string values at the
/// absolute offsets they occupy (within whatever coordinate space is active:
/// the patch root, or the current section's element).
#[derive(Debug, Clone, Default)]
pub struct Chunk {
	pub offset: usize,
	pub size: usize,
	pub interned_strings: Vec<(usize, InternedName)>,
}

/// Opens (or re-opens) a dynamic-array field as the active section; subsequent
/// chunks are interpreted relative to it until a sibling or parent marker pops
/// it off the stack.
#[derive(Debug, Clone)]
pub struct SectionMarker {
	pub id: u32,
	pub parent_id: Option<u32>,
	pub kind: SectionKind,
	pub parent_type: TypeName,
	pub field: FieldDescriptor,
}

#[derive(Debug, Clone)]
pub enum PatchNode {
	Chunk(Chunk),
	Section(SectionMarker),
}

/// A sparse, ordered description of mutations against `root_type`.
#[derive(Debug, Clone)]
pub struct Patch {
	pub root_type: TypeName,
	pub nodes: Vec<PatchNode>,
}

struct StackFrame<'a> {
	id: u32,
	kind: SectionKind,
	parent_type: TypeName,
	field: &'a FieldDescriptor,
}

/// Interprets a field's absolute byte range against `chunk`, emitting a
/// reference for every leaf interned-string value the chunk supplies in that
/// range. Recurses into struct and inline-array-of-struct fields; visibility-
/// conditioned fields are unsupported inside patches (logged, then skipped).
pub fn detect_inside_chunk_for_struct(storage: &Storage, part_offset: usize, part_type: TypeName, chunk: &Chunk, out: &mut Vec<DetectedReference>) {
	let Some(info) = storage.type_info(part_type) else {
		return;
	};

	for field_info in &info.fields_to_check {
		let field = &field_info.field;

		if field.visibility_condition_field.is_some() {
			log::warn!(target: "resource_reference",
				"Field \"{}\" of type \"{part_type}\" is marked as resource reference and found inside patch, but it has visibility condition and patches do not fully support it!",
				field.name);
			continue;
		}

		let field_offset = part_offset + field.offset;
		if field_offset + field.size <= chunk.offset || field_offset >= chunk.offset + chunk.size {
			continue;
		}

		match &field.archetype {
			Archetype::InternedString if field_info.is_leaf => {
				for &(offset, value) in &chunk.interned_strings {
					if offset == field_offset {
						append_reference(out, field_info.referenced_type, value, field_info.usage);
					}
				}
			}

			Archetype::Struct { type_name: child_type } => {
				detect_inside_chunk_for_struct(storage, field_offset, *child_type, chunk, out);
			}

			// Inline arrays inside patches are always treated at their full static
			// extent; a size_field is not consulted (there is no live instance to read it from).
			Archetype::InlineArray { item, count, item_size, .. } => {
				let item_size = *item_size;

				match item.as_ref() {
					Archetype::InternedString => {
						for i in 0..*count {
							let slot = field_offset + i * item_size;
							for &(offset, value) in &chunk.interned_strings {
								if offset == slot {
									append_reference(out, field_info.referenced_type, value, field_info.usage);
								}
							}
						}
					}

					Archetype::Struct { type_name: child_type } => {
						for i in 0..*count {
							detect_inside_chunk_for_struct(storage, field_offset + i * item_size, *child_type, chunk, out);
						}
					}

					_ => {}
				}
			}

			_ => {}
		}
	}
}

fn find_field_info<'a>(storage: &'a Storage, type_name: TypeName, field_name: crate::registry::FieldName) -> Option<&'a crate::model::FieldInfo> {
	storage.type_info(type_name)?.fields_to_check.iter().find(|f| f.field.name == field_name)
}

/// Walks every node of `patch`, appending every logical reference it contains
/// into `out`.
pub fn detect_in_patch(storage: &Storage, patch: &Patch, out: &mut Vec<DetectedReference>) {
	let mut stack: SmallVec<[StackFrame<'_>; MAX_SECTION_STACK_DEPTH]> = SmallVec::new();

	for node in &patch.nodes {
		match node {
			PatchNode::Section(marker) => {
				while stack.last().map(|f| f.id) != marker.parent_id {
					if stack.pop().is_none() {
						break;
					}
				}

				assert!(stack.len() < MAX_SECTION_STACK_DEPTH, "patch section stack overflow");

				assert!(
					matches!(marker.field.archetype, Archetype::DynamicArray { .. }),
					"patch section \"{}\" must scope a dynamic-array field, got {:?}",
					marker.field.name, marker.field.archetype
				);

				stack.push(StackFrame {
					id: marker.id,
					kind: marker.kind,
					parent_type: marker.parent_type,
					field: &marker.field,
				});
			}

			PatchNode::Chunk(chunk) => match stack.last() {
				None => detect_inside_chunk_for_struct(storage, 0, patch.root_type, chunk, out),

				Some(frame) => {
					let Archetype::DynamicArray { item, item_size } = &frame.field.archetype else {
						continue;
					};

					match (frame.kind, item.as_ref()) {
						(SectionKind::Set, Archetype::InternedString) => {
							if let Some(field_info) = find_field_info(storage, frame.parent_type, frame.field.name) {
								for &(_, value) in &chunk.interned_strings {
									append_reference(out, field_info.referenced_type, value, field_info.usage);
								}
							}
						}

						// A fresh appended element is always a single struct-sized window
						// at the start of the chunk.
						(SectionKind::Append, Archetype::Struct { type_name }) => {
							detect_inside_chunk_for_struct(storage, 0, *type_name, chunk, out);
						}

						// A `set` may overwrite any run of elements, so every struct-sized
						// window intersecting the chunk is walked, mirroring the original's
						// struct_begin_offset stepping.
						(SectionKind::Set, Archetype::Struct { type_name }) => {
							if *item_size > 0 {
								let mut struct_begin = chunk.offset - chunk.offset % item_size;
								while struct_begin < chunk.offset + chunk.size {
									detect_inside_chunk_for_struct(storage, struct_begin, *type_name, chunk, out);
									struct_begin += item_size;
								}
							}
						}

						_ => {}
					}
				}
			},
		}
	}
}
