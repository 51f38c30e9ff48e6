//! The record-stream parser: a frame-stack state machine that
//! materializes an [`ObjectGraph`] from the wire.
//!
//! One frame per object or array under construction. A shell node is
//! registered in the arena the moment its record header is decoded, so
//! back-references into in-progress containers resolve immediately and
//! cycles need no special casing. Only references to wholly-unseen ids
//! become fixups, replayed when the target object completes.
//!
//! Member and element values are schema-driven: a slot declared as a
//! primitive carries raw untagged bytes, every other slot carries a
//! record. Nested class records in value positions (value-type
//! instances) push child frames; reference-typed instances arrive as
//! top-level records after a `MemberReference` stand-in.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::api::DecodeOptions;
use crate::arrays::{read_primitive_block, RectCursor};
use crate::error::{KnotcodeError, Result};
use crate::format::ArrayKind;
use crate::fixup::ObjectTracker;
use crate::graph::{
    ArrayInstance, ArrayShape, GraphNode, NodeId, ObjectGraph, ObjectId, Primitive, SlotLocator,
    Value,
};
use crate::hooks::{BagEntry, CustomCodec};
use crate::io::WireReader;
use crate::records::{
    ArrayInfo, ArraySinglePrimitiveRecord, BinaryArrayRecord, ClassRecord, ClassWithIdRecord,
    Record, WireType,
};
use crate::schema::{ClassSchema, MemberType};

/// Reads one complete record stream from `r` and materializes the
/// object graph it describes.
pub fn read_graph<R: Read>(r: &mut WireReader<R>, opts: &DecodeOptions) -> Result<ObjectGraph> {
    GraphParser {
        r,
        opts,
        graph: ObjectGraph::new(),
        tracker: ObjectTracker::new(),
        stack: Vec::new(),
        metadata: HashMap::new(),
        libraries: HashMap::new(),
        root_id: 0,
    }
    .run()
}

/// A class schema as decoded from the wire, together with its
/// registry-side resolution and any surrogate codec selected for it.
#[derive(Clone)]
struct WireClass {
    /// Schema in wire member order; this is what instances carry.
    schema: Arc<ClassSchema>,
    /// The registered schema, when the registry knows the type.
    resolved: Option<Arc<ClassSchema>>,
    codec: Option<Arc<dyn CustomCodec>>,
}

struct ObjectFrame {
    node: NodeId,
    id: ObjectId,
    class: WireClass,
    next: usize,
    total: usize,
    /// Members deferred as forward-reference fixups.
    deferred: usize,
}

struct ArrayFrame {
    node: NodeId,
    id: ObjectId,
    element: MemberType,
    next: usize,
    total: usize,
    /// Coordinate tracking for rectangular arrays, for diagnostics.
    cursor: Option<RectCursor>,
}

enum Frame {
    Object(ObjectFrame),
    Array(ArrayFrame),
}

struct GraphParser<'a, R: Read> {
    r: &'a mut WireReader<R>,
    opts: &'a DecodeOptions,
    graph: ObjectGraph,
    tracker: ObjectTracker,
    stack: Vec<Frame>,
    /// Object id to the schema its record carried, for `ClassWithId`.
    metadata: HashMap<i32, WireClass>,
    libraries: HashMap<i32, String>,
    root_id: i32,
}

impl<R: Read> GraphParser<'_, R> {
    fn run(mut self) -> Result<ObjectGraph> {
        let first = Record::decode(self.r, self.opts.max_prealloc)?;
        let Record::Header(header) = first else {
            return Err(KnotcodeError::malformed(
                "stream does not start with a header record".to_string(),
            ));
        };
        self.root_id = header.root_id;
        debug!(root_id = self.root_id, "decoding record stream");

        loop {
            self.drain_inline()?;
            let record = Record::decode(self.r, self.opts.max_prealloc)?;
            if matches!(record, Record::MessageEnd) {
                if !self.stack.is_empty() {
                    return Err(KnotcodeError::inconsistent(format!(
                        "stream ended with {} container(s) still open",
                        self.stack.len()
                    )));
                }
                break;
            }
            self.handle(record)?;
        }

        let root = self
            .tracker
            .resolve(ObjectId::new(self.root_id))
            .ok_or_else(|| {
                KnotcodeError::inconsistent(format!(
                    "root object id {} was never materialized",
                    self.root_id
                ))
            })?;
        self.graph.set_root(root);
        self.tracker.finish()?;
        if let Some(sink) = &self.opts.sink {
            sink.on_deserialized(&self.graph);
        }
        debug!(
            nodes = self.graph.len(),
            bytes = self.r.position(),
            "record stream decoded"
        );
        Ok(self.graph)
    }

    /// Consumes raw inline primitives while the top frame expects them,
    /// popping frames as they fill up.
    fn drain_inline(&mut self) -> Result<()> {
        loop {
            self.pop_completed()?;
            let tag = match self.stack.last() {
                Some(Frame::Object(f)) => match &f.class.schema.members[f.next].ty {
                    MemberType::Primitive(tag) => *tag,
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            };
            let value = Primitive::decode(tag, self.r, self.opts.max_prealloc)?;
            let (container, locator) = self.take_slot()?;
            self.graph.set_slot(container, locator, Value::Prim(value))?;
        }
    }

    fn pop_completed(&mut self) -> Result<()> {
        loop {
            let complete = match self.stack.last() {
                Some(Frame::Object(f)) => f.next >= f.total,
                Some(Frame::Array(f)) => f.next >= f.total,
                None => false,
            };
            if !complete {
                return Ok(());
            }
            match self.stack.pop() {
                Some(Frame::Object(frame)) => self.finish_object(frame)?,
                Some(Frame::Array(frame)) => {
                    trace!(id = %frame.id, "array complete");
                    self.tracker.complete_object(frame.id, &mut self.graph)?;
                }
                None => return Ok(()),
            }
        }
    }

    fn finish_object(&mut self, frame: ObjectFrame) -> Result<()> {
        trace!(id = %frame.id, class = %frame.class.schema.name, "object complete");
        if let Some(codec) = &frame.class.codec {
            if frame.deferred > 0 {
                return Err(KnotcodeError::inconsistent(format!(
                    "surrogate-coded object {} holds {} unresolved forward reference(s)",
                    frame.id, frame.deferred
                )));
            }
            let restore_class = frame
                .class
                .resolved
                .as_ref()
                .unwrap_or(&frame.class.schema);
            let GraphNode::Object(obj) = self.graph.node_mut(frame.node) else {
                return Err(KnotcodeError::inconsistent(
                    "object frame points at a non-object node".to_string(),
                ));
            };
            let wire_values = std::mem::take(&mut obj.members);
            let bag: Vec<BagEntry> = frame
                .class
                .schema
                .members
                .iter()
                .zip(wire_values)
                .map(|(member, value)| BagEntry {
                    name: member.name.clone(),
                    ty: member.ty.clone(),
                    value,
                })
                .collect();
            let restored = codec.restore(restore_class, bag)?;
            if restored.len() != restore_class.members.len() {
                return Err(KnotcodeError::SchemaMismatch(format!(
                    "codec restored {} member(s) for type `{}`, schema declares {}",
                    restored.len(),
                    restore_class.name,
                    restore_class.members.len()
                )));
            }
            let class = Arc::clone(restore_class);
            let GraphNode::Object(obj) = self.graph.node_mut(frame.node) else {
                return Err(KnotcodeError::inconsistent(
                    "object frame points at a non-object node".to_string(),
                ));
            };
            obj.class = class;
            obj.members = restored;
        }
        self.tracker.complete_object(frame.id, &mut self.graph)
    }

    fn handle(&mut self, record: Record) -> Result<()> {
        match record {
            Record::Header(_) => Err(KnotcodeError::malformed(
                "unexpected second header record".to_string(),
            )),
            // Library declarations may appear wherever a record is
            // expected; they never consume a value slot.
            Record::Library(lib) => {
                trace!(id = lib.library_id, name = %lib.name, "library declared");
                if self.libraries.insert(lib.library_id, lib.name).is_some() {
                    return Err(KnotcodeError::malformed(format!(
                        "library id {} declared twice",
                        lib.library_id
                    )));
                }
                Ok(())
            }
            Record::Class(class) => self.handle_class(class),
            Record::ClassWithId(class) => self.handle_class_with_id(class),
            Record::ObjectString(string) => {
                let id = ObjectId::new(string.object_id);
                let node = self.graph.add_string(string.value);
                self.tracker.register(id, node)?;
                self.tracker.complete_object(id, &mut self.graph)?;
                self.deliver(Value::Ref(node))
            }
            Record::MemberPrimitiveTyped(prim) => {
                if self.stack.is_empty() {
                    return Err(KnotcodeError::malformed(
                        "primitive value record at stream top level".to_string(),
                    ));
                }
                self.store(Value::Prim(prim.value))
            }
            Record::MemberReference(reference) => {
                if self.stack.is_empty() {
                    return Err(KnotcodeError::malformed(
                        "member reference at stream top level".to_string(),
                    ));
                }
                self.handle_reference(ObjectId::new(reference.id_ref))
            }
            Record::NullRun { count } => self.handle_null_run(count),
            Record::BinaryArray(array) => self.handle_binary_array(array),
            Record::ArraySinglePrimitive(array) => self.handle_primitive_array(array),
            Record::ArraySingleObject(info) => {
                self.handle_single_array(info, MemberType::Object)
            }
            Record::ArraySingleString(info) => self.handle_single_array(info, MemberType::Str),
            // Handled by the main loop.
            Record::MessageEnd => Ok(()),
        }
    }

    fn handle_class(&mut self, record: ClassRecord) -> Result<()> {
        let id = ObjectId::new(record.info.object_id);
        let wire = self.build_class(&record)?;
        self.metadata.insert(record.info.object_id, wire.clone());
        self.materialize_object(id, wire)
    }

    fn handle_class_with_id(&mut self, record: ClassWithIdRecord) -> Result<()> {
        let wire = self
            .metadata
            .get(&record.metadata_id)
            .cloned()
            .ok_or_else(|| {
                KnotcodeError::malformed(format!(
                    "schema back-reference to unknown metadata id {}",
                    record.metadata_id
                ))
            })?;
        self.materialize_object(ObjectId::new(record.object_id), wire)
    }

    /// Registers a shell node for a class instance and opens its frame.
    fn materialize_object(&mut self, id: ObjectId, wire: WireClass) -> Result<()> {
        let total = wire.schema.members.len();
        trace!(%id, class = %wire.schema.name, members = total, "object record");
        let node = self
            .graph
            .add_object(Arc::clone(&wire.schema), vec![Value::Null; total])?;
        self.tracker.register(id, node)?;
        if let Some(sink) = &self.opts.sink {
            sink.on_deserializing(id, &wire.schema);
        }
        self.deliver(Value::Ref(node))?;
        self.stack.push(Frame::Object(ObjectFrame {
            node,
            id,
            class: wire,
            next: 0,
            total,
            deferred: 0,
        }));
        Ok(())
    }

    /// Builds the wire-level class schema for a class record, resolving
    /// library ids and consulting the registry.
    ///
    /// The untyped record flavors carry no member types at all, so they
    /// decode only when the registry knows the type. The typed flavors
    /// are self-describing; a registered schema, when present, is
    /// checked against the wire for missing members.
    fn build_class(&mut self, record: &ClassRecord) -> Result<WireClass> {
        let library = match record.library_id {
            Some(id) => Some(self.library_name(id)?),
            None => None,
        };
        let binder = self.opts.binder.as_deref();

        let resolved = match &self.opts.registry {
            Some(registry) => {
                match registry.resolve(&record.info.name, library.as_deref(), binder) {
                    Ok(found) => Some(found),
                    // Self-describing records decode without the
                    // registry knowing the type.
                    Err(KnotcodeError::TypeResolution(_)) if record.types.is_some() => None,
                    Err(other) => return Err(other),
                }
            }
            None if record.types.is_some() => None,
            None => {
                return Err(KnotcodeError::TypeResolution(format!(
                    "untyped class record for `{}` needs a registered schema",
                    record.info.name
                )))
            }
        };

        let member_types: Vec<MemberType> = match &record.types {
            Some(wire_types) => wire_types
                .iter()
                .map(|ty| self.member_type(ty))
                .collect::<Result<_>>()?,
            None => {
                // Untyped flavors resolved above or errored out.
                let resolved = resolved.as_ref().ok_or_else(|| {
                    KnotcodeError::TypeResolution(format!(
                        "untyped class record for `{}` needs a registered schema",
                        record.info.name
                    ))
                })?;
                record
                    .info
                    .member_names
                    .iter()
                    .map(|name| {
                        let index = resolved.member_index(name).ok_or_else(|| {
                            KnotcodeError::SchemaMismatch(format!(
                                "wire member `{name}` is not declared by registered type `{}`",
                                resolved.name
                            ))
                        })?;
                        Ok(resolved.members[index].ty.clone())
                    })
                    .collect::<Result<_>>()?
            }
        };

        // A resolved type lends the instance its registered identity
        // (the binder may have remapped the wire name). Members stay in
        // wire order so slot indices keep meaning what the stream says.
        let (name, library) = match &resolved {
            Some(found) => (found.name.clone(), found.library.clone()),
            None => (record.info.name.clone(), library),
        };
        let mut schema = ClassSchema::new(name);
        if let Some(lib) = library {
            schema = schema.with_library(lib);
        }
        for (name, ty) in record.info.member_names.iter().zip(member_types) {
            schema = schema.with_member(name.clone(), ty);
        }

        // The value-type flag drives re-encoding. The registry is
        // authoritative; without it, a negative id is the wire's own
        // signal that the instance was nested rather than shared.
        let value_type = resolved
            .as_ref()
            .map(|r| r.value_type)
            .unwrap_or(record.info.object_id < 0);
        if value_type {
            schema = schema.as_value_type();
        }

        let schema = Arc::new(schema);
        let codec = self.opts.surrogates.as_ref().and_then(|selector| {
            selector.select(resolved.as_ref().unwrap_or(&schema))
        });
        // A codec owns the wire layout for its type, so the registered
        // member set is only enforced on the plain path.
        if codec.is_none() {
            if let Some(found) = &resolved {
                found.check_against_wire(&schema)?;
            }
        }
        Ok(WireClass {
            schema,
            resolved,
            codec,
        })
    }

    fn handle_reference(&mut self, target: ObjectId) -> Result<()> {
        if target.is_null() {
            return Err(KnotcodeError::malformed(
                "member reference to object id 0".to_string(),
            ));
        }
        match self.tracker.resolve(target) {
            Some(node) => self.store(Value::Ref(node)),
            None => {
                let (container, locator) = self.take_slot()?;
                self.tracker.record_fixup(container, locator, target);
                if let Some(Frame::Object(f)) = self.stack.last_mut() {
                    f.deferred += 1;
                }
                Ok(())
            }
        }
    }

    fn handle_null_run(&mut self, count: usize) -> Result<()> {
        match self.stack.last_mut() {
            None => Err(KnotcodeError::malformed(
                "null record at stream top level".to_string(),
            )),
            Some(Frame::Object(_)) => {
                if count != 1 {
                    return Err(KnotcodeError::malformed(format!(
                        "null run of {count} in an object member position"
                    )));
                }
                self.store(Value::Null)
            }
            Some(Frame::Array(f)) => {
                if count > f.total - f.next {
                    return Err(KnotcodeError::malformed(format!(
                        "null run of {count} overruns array length {}",
                        f.total
                    )));
                }
                // Shell slots are already null; just step past them.
                f.next += count;
                if let Some(cursor) = &mut f.cursor {
                    for _ in 0..count {
                        cursor.advance();
                    }
                }
                Ok(())
            }
        }
    }

    fn handle_primitive_array(&mut self, record: ArraySinglePrimitiveRecord) -> Result<()> {
        let id = ObjectId::new(record.info.object_id);
        let len = record.info.length as usize;
        let tag = record.element;
        trace!(%id, ?tag, len, "primitive array record");
        let elements = match tag.fixed_width() {
            Some(width) => {
                read_primitive_block(self.r, tag, width, len, self.opts.max_prealloc)?
            }
            // Char and Decimal are variable width; no block read.
            None => {
                let mut values = Vec::new();
                for _ in 0..len {
                    values.push(Value::Prim(Primitive::decode(
                        tag,
                        self.r,
                        self.opts.max_prealloc,
                    )?));
                }
                values
            }
        };
        let array = ArrayInstance::new(
            MemberType::Primitive(tag),
            ArrayShape::Single {
                len,
                lower_bound: 0,
            },
            elements,
        )?;
        let node = self.graph.add_array(array);
        self.tracker.register(id, node)?;
        self.tracker.complete_object(id, &mut self.graph)?;
        self.deliver(Value::Ref(node))
    }

    fn handle_single_array(&mut self, info: ArrayInfo, element: MemberType) -> Result<()> {
        let id = ObjectId::new(info.object_id);
        let len = info.length as usize;
        self.guard_prealloc(len, "array length")?;
        trace!(%id, len, element = ?element.type_tag(), "array record");
        let shape = ArrayShape::Single {
            len,
            lower_bound: 0,
        };
        self.open_array(id, element, shape, None)
    }

    fn handle_binary_array(&mut self, record: BinaryArrayRecord) -> Result<()> {
        let id = ObjectId::new(record.object_id);
        let element = self.member_type(&record.element)?;
        let lengths: Vec<usize> = record.lengths.iter().map(|&l| l as usize).collect();
        let flat = lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
            .ok_or_else(|| {
                KnotcodeError::malformed("array element count overflows".to_string())
            })?;
        self.guard_prealloc(flat, "array element count")?;
        let lower_bounds = record
            .lower_bounds
            .clone()
            .unwrap_or_else(|| vec![0; lengths.len()]);
        trace!(%id, kind = ?record.kind, ?lengths, "general array record");

        if !matches!(record.kind, ArrayKind::Rectangular | ArrayKind::RectangularOffset)
            && lengths.len() != 1
        {
            return Err(KnotcodeError::malformed(format!(
                "{:?} array with rank {}",
                record.kind,
                lengths.len()
            )));
        }
        let shape = match record.kind {
            ArrayKind::Single | ArrayKind::SingleOffset => ArrayShape::Single {
                len: lengths[0],
                lower_bound: lower_bounds[0],
            },
            ArrayKind::Jagged | ArrayKind::JaggedOffset => ArrayShape::Jagged {
                len: lengths[0],
                lower_bound: lower_bounds[0],
            },
            ArrayKind::Rectangular | ArrayKind::RectangularOffset => {
                if lengths.len() == 1 {
                    // Rank-1 rectangular degenerates to a single array.
                    ArrayShape::Single {
                        len: lengths[0],
                        lower_bound: lower_bounds[0],
                    }
                } else {
                    ArrayShape::Rectangular {
                        lengths: lengths.clone(),
                        lower_bounds,
                    }
                }
            }
        };

        if let MemberType::Primitive(tag) = element {
            // Primitive elements follow raw, no per-element records.
            let elements = match tag.fixed_width() {
                Some(width) => {
                    read_primitive_block(self.r, tag, width, flat, self.opts.max_prealloc)?
                }
                None => {
                    let mut values = Vec::new();
                    for _ in 0..flat {
                        values.push(Value::Prim(Primitive::decode(
                            tag,
                            self.r,
                            self.opts.max_prealloc,
                        )?));
                    }
                    values
                }
            };
            let array = ArrayInstance::new(element, shape, elements)?;
            let node = self.graph.add_array(array);
            self.tracker.register(id, node)?;
            self.tracker.complete_object(id, &mut self.graph)?;
            return self.deliver(Value::Ref(node));
        }

        let cursor = matches!(shape, ArrayShape::Rectangular { .. })
            .then(|| RectCursor::new(lengths));
        self.open_array(id, element, shape, cursor)
    }

    /// Registers a shell array node and opens its frame.
    fn open_array(
        &mut self,
        id: ObjectId,
        element: MemberType,
        shape: ArrayShape,
        cursor: Option<RectCursor>,
    ) -> Result<()> {
        let total = shape.flat_len();
        let array = ArrayInstance::new(element.clone(), shape, vec![Value::Null; total])?;
        let node = self.graph.add_array(array);
        self.tracker.register(id, node)?;
        self.deliver(Value::Ref(node))?;
        self.stack.push(Frame::Array(ArrayFrame {
            node,
            id,
            element,
            next: 0,
            total,
            cursor,
        }));
        Ok(())
    }

    /// Hands a freshly materialized node to the enclosing value slot,
    /// if there is one. Top-level records have nowhere to go; the
    /// header's root id designates the one that matters.
    fn deliver(&mut self, value: Value) -> Result<()> {
        if self.stack.is_empty() {
            return Ok(());
        }
        // New containers push their own frame after delivery, so the
        // slot belongs to the frame currently on top.
        let (container, locator) = self.take_slot()?;
        self.graph.set_slot(container, locator, value)
    }

    /// Stores a plain value into the current slot of the top frame.
    fn store(&mut self, value: Value) -> Result<()> {
        let (container, locator) = self.take_slot()?;
        self.graph.set_slot(container, locator, value)
    }

    /// Claims the current slot of the top frame and advances past it.
    fn take_slot(&mut self) -> Result<(NodeId, SlotLocator)> {
        match self.stack.last_mut() {
            Some(Frame::Object(f)) => {
                let locator = SlotLocator::Member(f.next);
                f.next += 1;
                Ok((f.node, locator))
            }
            Some(Frame::Array(f)) => {
                let locator = SlotLocator::Index(f.next);
                if let Some(cursor) = &mut f.cursor {
                    trace!(coords = ?cursor.coords(), flat = f.next, "rectangular slot");
                    cursor.advance();
                }
                f.next += 1;
                Ok((f.node, locator))
            }
            None => Err(KnotcodeError::malformed(
                "value record at stream top level".to_string(),
            )),
        }
    }

    fn guard_prealloc(&self, count: usize, what: &str) -> Result<()> {
        if count > self.opts.max_prealloc {
            return Err(KnotcodeError::malformed(format!(
                "{what} {count} exceeds the preallocation cap of {}",
                self.opts.max_prealloc
            )));
        }
        Ok(())
    }

    fn library_name(&self, id: i32) -> Result<String> {
        self.libraries.get(&id).cloned().ok_or_else(|| {
            KnotcodeError::malformed(format!("reference to undeclared library id {id}"))
        })
    }

    fn member_type(&self, ty: &WireType) -> Result<MemberType> {
        Ok(match ty {
            WireType::Primitive(tag) => MemberType::Primitive(*tag),
            WireType::String => MemberType::Str,
            WireType::Object => MemberType::Object,
            WireType::SystemClass(name) => MemberType::SystemClass(name.clone()),
            WireType::Class { name, library_id } => MemberType::Class {
                name: name.clone(),
                library: self.library_name(*library_id)?,
            },
            WireType::ObjectArray => MemberType::ObjectArray,
            WireType::StringArray => MemberType::StringArray,
            WireType::PrimitiveArray(tag) => MemberType::PrimitiveArray(*tag),
        })
    }
}
