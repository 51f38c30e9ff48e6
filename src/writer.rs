//! The Graph Writer: breadth-first linearization of an object graph
//! into the record stream.
//!
//! The writer walks the arena from the root, assigning wire ids on
//! first sight. Reference-typed nodes are scheduled onto a queue and
//! emitted as top-level records, with `MemberReference` standing in at
//! every use site. Strings are emitted inline at their first use and
//! referenced afterwards. Value-type instances are the exception to
//! sharing: each occurrence is nested inline under a fresh id from the
//! reserved negative range.
//!
//! Each distinct class emits its full self-describing schema once; later
//! instances ride on `ClassWithId`. Surrogate-captured instances always
//! carry their own schema, since a codec may produce a different bag
//! per instance.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::api::EncodeOptions;
use crate::arrays::{blit_width, check_shape, write_primitive_block};
use crate::error::{KnotcodeError, Result};
use crate::format::{ArrayKind, PrimitiveTag, RecordTag};
use crate::fixup::IdDispenser;
use crate::graph::{
    ArrayInstance, GraphNode, NodeId, ObjectGraph, ObjectId, ObjectInstance, Value,
};
use crate::io::WireWriter;
use crate::records::{
    encode_null_run, ArrayInfo, ArraySinglePrimitiveRecord, BinaryArrayRecord, ClassInfo,
    ClassRecord, ClassWithIdRecord, HeaderRecord, LibraryRecord, MemberPrimitiveTypedRecord,
    MemberReferenceRecord, ObjectStringRecord, WireType,
};
use crate::schema::{ClassSchema, MemberType};

/// Serializes `graph` into `out` as a complete record stream, header
/// through end marker.
pub fn write_graph<W: Write>(
    graph: &ObjectGraph,
    out: &mut WireWriter<W>,
    opts: &EncodeOptions,
) -> Result<()> {
    let root = graph
        .root()
        .ok_or_else(|| KnotcodeError::inconsistent("graph has no root".to_string()))?;
    let mut writer = GraphWriter {
        graph,
        out,
        opts,
        ids: IdDispenser::new(),
        queue: VecDeque::new(),
        libraries: HashMap::new(),
        metadata: HashMap::new(),
    };
    writer.run(root)?;
    if let Some(sink) = &opts.sink {
        sink.on_serialized(graph);
    }
    Ok(())
}

struct GraphWriter<'a, W: Write> {
    graph: &'a ObjectGraph,
    out: &'a mut WireWriter<W>,
    opts: &'a EncodeOptions,
    ids: IdDispenser,
    queue: VecDeque<NodeId>,
    /// Library name to wire id, first sight emits the record.
    libraries: HashMap<String, i32>,
    /// (wire name, wire library) to the schemas already emitted under
    /// that name and the object id that carried each. Distinct member
    /// sets can share a wire name, so a back-reference is only taken
    /// when the schemas actually match.
    metadata: HashMap<(String, Option<String>), Vec<(i32, Arc<ClassSchema>)>>,
}

impl<W: Write> GraphWriter<'_, W> {
    fn run(&mut self, root: NodeId) -> Result<()> {
        let (root_id, _) = self.ids.get_or_assign(root);
        debug!(nodes = self.graph.len(), %root_id, "writing object graph");
        HeaderRecord::new(root_id.as_i32()).encode(self.out)?;
        self.queue.push_back(root);
        while let Some(node) = self.queue.pop_front() {
            let id = self
                .ids
                .lookup(node)
                .ok_or_else(|| KnotcodeError::inconsistent("scheduled node has no wire id".to_string()))?;
            self.emit_node(id, node)?;
        }
        self.out.write_u8(RecordTag::MessageEnd.as_u8())?;
        debug!(bytes = self.out.position(), "object graph written");
        Ok(())
    }

    /// References come from caller-built graphs, so an out-of-arena id
    /// is an input error, not a broken invariant.
    fn lookup_node(graph: &ObjectGraph, node: NodeId) -> Result<&GraphNode> {
        graph.try_node(node).ok_or_else(|| {
            KnotcodeError::inconsistent(format!("node {node} does not belong to this graph"))
        })
    }

    fn emit_node(&mut self, id: ObjectId, node: NodeId) -> Result<()> {
        let graph = self.graph;
        match Self::lookup_node(graph, node)? {
            GraphNode::Str(value) => {
                trace!(%id, "emitting string record");
                ObjectStringRecord {
                    object_id: id.as_i32(),
                    value: value.clone(),
                }
                .encode(self.out)
            }
            GraphNode::Object(obj) => self.emit_object(id, obj),
            GraphNode::Array(arr) => self.emit_array(id, arr),
        }
    }

    fn emit_object(&mut self, id: ObjectId, obj: &ObjectInstance) -> Result<()> {
        let codec = self
            .opts
            .surrogates
            .as_ref()
            .and_then(|s| s.select(&obj.class));

        let (wire_name, wire_library) = self
            .opts
            .binder
            .as_ref()
            .and_then(|b| b.bind_to_wire(&obj.class))
            .unwrap_or_else(|| (obj.class.name.clone(), obj.class.library.clone()));

        // A codec's bag may differ per instance, so surrogate output
        // never shares schema metadata.
        let (names, types, values) = if let Some(codec) = codec {
            trace!(%id, class = %wire_name, "capturing through surrogate codec");
            let bag = codec.capture(&obj.class, &obj.members)?;
            let mut names = Vec::with_capacity(bag.len());
            let mut types = Vec::with_capacity(bag.len());
            let mut values = Vec::with_capacity(bag.len());
            for entry in bag {
                names.push(entry.name);
                types.push(entry.ty);
                values.push(entry.value);
            }
            (names, types, values)
        } else {
            let key = (wire_name.clone(), wire_library.clone());
            let metadata_id = self.metadata.get(&key).and_then(|entries| {
                entries
                    .iter()
                    .find(|(_, schema)| {
                        Arc::ptr_eq(schema, &obj.class) || **schema == *obj.class
                    })
                    .map(|(carrier, _)| *carrier)
            });
            if let Some(metadata_id) = metadata_id {
                trace!(%id, class = %wire_name, metadata_id, "emitting schema back-reference");
                ClassWithIdRecord {
                    object_id: id.as_i32(),
                    metadata_id,
                }
                .encode(self.out)?;
                let types: Vec<MemberType> =
                    obj.class.members.iter().map(|m| m.ty.clone()).collect();
                return self.emit_members(&types, &obj.members);
            }
            self.metadata
                .entry(key)
                .or_default()
                .push((id.as_i32(), Arc::clone(&obj.class)));
            let names = obj.class.members.iter().map(|m| m.name.clone()).collect();
            let types = obj.class.members.iter().map(|m| m.ty.clone()).collect();
            (names, types, obj.members.clone())
        };

        trace!(%id, class = %wire_name, members = names.len(), "emitting class record");
        let library_id = match &wire_library {
            Some(library) => Some(self.ensure_library(library)?),
            None => None,
        };
        let wire_types = types
            .iter()
            .map(|ty| self.wire_type(ty))
            .collect::<Result<Vec<_>>>()?;
        ClassRecord {
            info: ClassInfo {
                object_id: id.as_i32(),
                name: wire_name,
                member_names: names,
            },
            types: Some(wire_types),
            library_id,
        }
        .encode(self.out)?;
        self.emit_members(&types, &values)
    }

    fn emit_members(&mut self, types: &[MemberType], values: &[Value]) -> Result<()> {
        if types.len() != values.len() {
            return Err(KnotcodeError::inconsistent(format!(
                "schema declares {} member(s), instance holds {}",
                types.len(),
                values.len()
            )));
        }
        for (ty, value) in types.iter().zip(values) {
            self.emit_member(ty, value)?;
        }
        Ok(())
    }

    fn emit_member(&mut self, declared: &MemberType, value: &Value) -> Result<()> {
        if let MemberType::Primitive(tag) = declared {
            // Declared-primitive slots carry raw untagged bytes.
            return match value {
                Value::Prim(p) if p.tag() == *tag => p.encode(self.out),
                other => Err(KnotcodeError::inconsistent(format!(
                    "slot declared as primitive {tag:?} holds {other:?}"
                ))),
            };
        }
        match value {
            Value::Null => encode_null_run(self.out, 1),
            Value::Prim(p) => MemberPrimitiveTypedRecord { value: p.clone() }.encode(self.out),
            Value::Ref(node) => self.emit_reference(*node),
        }
    }

    /// Emits the record standing for a node reference at a use site:
    /// inline for first-sight strings and for every value-type instance,
    /// `MemberReference` otherwise.
    fn emit_reference(&mut self, node: NodeId) -> Result<()> {
        let graph = self.graph;
        match Self::lookup_node(graph, node)? {
            GraphNode::Str(value) => {
                let (id, fresh) = self.ids.get_or_assign(node);
                if fresh {
                    ObjectStringRecord {
                        object_id: id.as_i32(),
                        value: value.clone(),
                    }
                    .encode(self.out)
                } else {
                    MemberReferenceRecord {
                        id_ref: id.as_i32(),
                    }
                    .encode(self.out)
                }
            }
            GraphNode::Object(obj) if obj.class.value_type => {
                // Value-type instances are never shared: every
                // occurrence nests inline under a fresh negative id.
                let id = self.ids.assign_value_instance();
                self.emit_object(id, obj)
            }
            _ => {
                let (id, fresh) = self.ids.get_or_assign(node);
                if fresh {
                    self.queue.push_back(node);
                }
                MemberReferenceRecord {
                    id_ref: id.as_i32(),
                }
                .encode(self.out)
            }
        }
    }

    fn emit_array(&mut self, id: ObjectId, arr: &ArrayInstance) -> Result<()> {
        check_shape(arr)?;
        let kind = arr.shape.kind();
        trace!(%id, ?kind, len = arr.elements.len(), "emitting array record");

        if kind == ArrayKind::Single {
            if let MemberType::Primitive(tag) = &arr.element {
                ArraySinglePrimitiveRecord {
                    info: self.array_info(id, arr)?,
                    element: *tag,
                }
                .encode(self.out)?;
                return match blit_width(&arr.element, &arr.shape) {
                    Some((tag, width)) => write_primitive_block(self.out, tag, width, &arr.elements),
                    // Char and Decimal have no fixed width; their
                    // values still follow raw, element by element.
                    None => self.emit_raw_elements(*tag, &arr.elements),
                };
            }
            if arr.element == MemberType::Str {
                self.out
                    .write_u8(RecordTag::ArraySingleString.as_u8())?;
                self.array_info(id, arr)?.encode(self.out)?;
                return self.emit_record_elements(arr);
            }
            if arr.element == MemberType::Object {
                self.out
                    .write_u8(RecordTag::ArraySingleObject.as_u8())?;
                self.array_info(id, arr)?.encode(self.out)?;
                return self.emit_record_elements(arr);
            }
        }

        let lengths = arr
            .shape
            .lengths()
            .into_iter()
            .map(|len| {
                i32::try_from(len).map_err(|_| {
                    KnotcodeError::malformed("array dimension exceeds the wire limit".to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let lower_bounds = kind
            .has_lower_bounds()
            .then(|| arr.shape.lower_bounds());
        let element = self.wire_type(&arr.element)?;
        BinaryArrayRecord {
            object_id: id.as_i32(),
            kind,
            lengths,
            lower_bounds,
            element,
        }
        .encode(self.out)?;

        if let MemberType::Primitive(tag) = &arr.element {
            self.emit_raw_elements(*tag, &arr.elements)
        } else {
            self.emit_record_elements(arr)
        }
    }

    fn array_info(&self, id: ObjectId, arr: &ArrayInstance) -> Result<ArrayInfo> {
        let length = i32::try_from(arr.elements.len()).map_err(|_| {
            KnotcodeError::malformed("array length exceeds the wire limit".to_string())
        })?;
        Ok(ArrayInfo {
            object_id: id.as_i32(),
            length,
        })
    }

    /// Raw back-to-back primitive values, no per-element records.
    fn emit_raw_elements(&mut self, tag: PrimitiveTag, elements: &[Value]) -> Result<()> {
        for value in elements {
            match value {
                Value::Prim(p) if p.tag() == tag => p.encode(self.out)?,
                other => {
                    return Err(KnotcodeError::inconsistent(format!(
                        "primitive array of {tag:?} holds {other:?}"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Record-per-element emission with null-run compaction.
    fn emit_record_elements(&mut self, arr: &ArrayInstance) -> Result<()> {
        let mut run = 0usize;
        for value in &arr.elements {
            if matches!(value, Value::Null) {
                run += 1;
                continue;
            }
            encode_null_run(self.out, run)?;
            run = 0;
            self.emit_member(&arr.element, value)?;
        }
        encode_null_run(self.out, run)
    }

    fn ensure_library(&mut self, name: &str) -> Result<i32> {
        if let Some(&id) = self.libraries.get(name) {
            return Ok(id);
        }
        let id = self.ids.fresh_shared().as_i32();
        trace!(library = name, id, "emitting library record");
        LibraryRecord {
            library_id: id,
            name: name.to_string(),
        }
        .encode(self.out)?;
        self.libraries.insert(name.to_string(), id);
        Ok(id)
    }

    fn wire_type(&mut self, ty: &MemberType) -> Result<WireType> {
        Ok(match ty {
            MemberType::Primitive(tag) => WireType::Primitive(*tag),
            MemberType::Str => WireType::String,
            MemberType::Object => WireType::Object,
            MemberType::SystemClass(name) => WireType::SystemClass(name.clone()),
            MemberType::Class { name, library } => WireType::Class {
                name: name.clone(),
                library_id: self.ensure_library(library)?,
            },
            MemberType::ObjectArray => WireType::ObjectArray,
            MemberType::StringArray => WireType::StringArray,
            MemberType::PrimitiveArray(tag) => WireType::PrimitiveArray(*tag),
        })
    }
}
