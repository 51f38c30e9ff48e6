//! End-to-end round trips: graph in, bytes out, graph back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use knotcode::format::PrimitiveTag;
use knotcode::{
    BagEntry, Binder, ClassSchema, CustomCodec, DecodeOptions, EncodeOptions, GraphNode,
    Knotcode, KnotcodeError, LifecycleSink, MemberType, ObjectGraph, ObjectId, Primitive, Result,
    SurrogateSelector, TypeRegistry, Value,
};
use tempfile::NamedTempFile;

fn person_class() -> Arc<ClassSchema> {
    Arc::new(
        ClassSchema::new("Person")
            .with_library("People, Version=1.0.0.0")
            .with_member("name", MemberType::Str)
            .with_member("age", MemberType::Primitive(PrimitiveTag::Int32))
            .with_member("friend", MemberType::Object),
    )
}

fn round_trip(graph: &ObjectGraph) -> ObjectGraph {
    let bytes = Knotcode::encode_to_vec(graph, &EncodeOptions::new()).expect("encode");
    Knotcode::decode_slice(&bytes, &DecodeOptions::new()).expect("decode")
}

#[test]
fn simple_object() {
    let mut graph = ObjectGraph::new();
    let name = graph.add_string("Ada");
    let person = graph
        .add_object(
            person_class(),
            vec![Value::Ref(name), Value::int32(36), Value::Null],
        )
        .expect("add");
    graph.set_root(person);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn root_string() {
    let mut graph = ObjectGraph::new();
    let root = graph.add_string("just a string");
    graph.set_root(root);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn shared_string_kept_shared() {
    let mut graph = ObjectGraph::new();
    let name = graph.add_string("twin");
    let class = person_class();
    let a = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Ref(name), Value::int32(1), Value::Null],
        )
        .expect("add");
    let b = graph
        .add_object(class, vec![Value::Ref(name), Value::int32(2), Value::Ref(a)])
        .expect("add");
    graph.set_root(b);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
    // Both name slots must point at one node, not two copies.
    let strings = back
        .iter()
        .filter(|(_, node)| matches!(node, GraphNode::Str(s) if s == "twin"))
        .count();
    assert_eq!(strings, 1);
}

#[test]
fn reference_into_another_graph_is_rejected() {
    let mut other = ObjectGraph::new();
    other.add_string("first");
    let foreign = other.add_string("second");

    let mut graph = ObjectGraph::new();
    let class = Arc::new(
        ClassSchema::new("Box")
            .with_library("People, Version=1.0.0.0")
            .with_member("inner", MemberType::Object),
    );
    let root = graph
        .add_object(class, vec![Value::Ref(foreign)])
        .expect("add");
    graph.set_root(root);

    let err = Knotcode::encode_to_vec(&graph, &EncodeOptions::new()).expect_err("must fail");
    assert!(matches!(err, KnotcodeError::GraphConsistency(_)), "{err}");
}

#[test]
fn same_name_divergent_classes_round_trip() {
    // Two member sets sharing one wire name must not collapse into a
    // single schema back-reference.
    let narrow = Arc::new(
        ClassSchema::new("P")
            .with_library("Mixed, Version=1.0.0.0")
            .with_member("a", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let wide = Arc::new(
        ClassSchema::new("P")
            .with_library("Mixed, Version=1.0.0.0")
            .with_member("a", MemberType::Primitive(PrimitiveTag::Int32))
            .with_member("b", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let holder = Arc::new(
        ClassSchema::new("Holder")
            .with_library("Mixed, Version=1.0.0.0")
            .with_member("first", MemberType::Object)
            .with_member("second", MemberType::Object)
            .with_member("third", MemberType::Object),
    );

    let mut graph = ObjectGraph::new();
    let first = graph
        .add_object(Arc::clone(&narrow), vec![Value::int32(1)])
        .expect("add");
    let second = graph
        .add_object(wide, vec![Value::int32(2), Value::int32(3)])
        .expect("add");
    // A matching schema still rides on the earlier instance's record.
    let third = graph.add_object(narrow, vec![Value::int32(4)]).expect("add");
    let root = graph
        .add_object(
            holder,
            vec![Value::Ref(first), Value::Ref(second), Value::Ref(third)],
        )
        .expect("add");
    graph.set_root(root);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn two_object_cycle() {
    let mut graph = ObjectGraph::new();
    let class = person_class();
    let a = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(1), Value::Null],
        )
        .expect("add");
    let b = graph
        .add_object(class, vec![Value::Null, Value::int32(2), Value::Ref(a)])
        .expect("add");
    // Close the loop: a -> b -> a.
    graph
        .set_slot(a, knotcode::graph::SlotLocator::Member(2), Value::Ref(b))
        .expect("patch");
    graph.set_root(a);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn self_reference() {
    let mut graph = ObjectGraph::new();
    let me = graph
        .add_object(
            person_class(),
            vec![Value::Null, Value::int32(0), Value::Null],
        )
        .expect("add");
    graph
        .set_slot(me, knotcode::graph::SlotLocator::Member(2), Value::Ref(me))
        .expect("patch");
    graph.set_root(me);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
    let root = back.root().expect("root");
    let GraphNode::Object(obj) = back.node(root) else {
        panic!("root is not an object");
    };
    assert_eq!(obj.members[2], Value::Ref(root));
}

#[test]
fn diamond_sharing() {
    let mut graph = ObjectGraph::new();
    let class = person_class();
    let shared = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(0), Value::Null],
        )
        .expect("add");
    let left = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(1), Value::Ref(shared)],
        )
        .expect("add");
    let right = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(2), Value::Ref(shared)],
        )
        .expect("add");
    let holder = Arc::new(
        ClassSchema::new("Pair")
            .with_member("left", MemberType::Object)
            .with_member("right", MemberType::Object),
    );
    let root = graph
        .add_object(holder, vec![Value::Ref(left), Value::Ref(right)])
        .expect("add");
    graph.set_root(root);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
    // Four objects; the shared one must not have been duplicated.
    let objects = back
        .iter()
        .filter(|(_, node)| matches!(node, GraphNode::Object(_)))
        .count();
    assert_eq!(objects, 4);
}

#[test]
fn value_type_nested_per_occurrence() {
    let money = Arc::new(
        ClassSchema::new("Money")
            .with_member("ticks", MemberType::Primitive(PrimitiveTag::Int64))
            .as_value_type(),
    );
    let account = Arc::new(
        ClassSchema::new("Account")
            .with_member("balance", MemberType::SystemClass("Money".to_string()))
            .with_member("limit", MemberType::SystemClass("Money".to_string())),
    );
    let mut graph = ObjectGraph::new();
    let amount = graph
        .add_object(money, vec![Value::Prim(Primitive::Int64(500))])
        .expect("add");
    let root = graph
        .add_object(account, vec![Value::Ref(amount), Value::Ref(amount)])
        .expect("add");
    graph.set_root(root);

    let back = round_trip(&graph);
    let root = back.root().expect("root");
    let GraphNode::Object(obj) = back.node(root) else {
        panic!("root is not an object");
    };
    // Value types are nested per occurrence, never shared.
    let Value::Ref(first) = obj.members[0] else {
        panic!("balance is not a reference");
    };
    let Value::Ref(second) = obj.members[1] else {
        panic!("limit is not a reference");
    };
    assert_ne!(first, second);
    for node in [first, second] {
        let GraphNode::Object(money) = back.node(node) else {
            panic!("nested slot is not an object");
        };
        assert!(money.class.value_type);
        assert_eq!(money.members[0], Value::Prim(Primitive::Int64(500)));
    }
}

#[test]
fn all_primitive_kinds_survive() {
    let class = Arc::new(
        ClassSchema::new("Everything")
            .with_member("b", MemberType::Primitive(PrimitiveTag::Boolean))
            .with_member("u8", MemberType::Primitive(PrimitiveTag::Byte))
            .with_member("i8", MemberType::Primitive(PrimitiveTag::SByte))
            .with_member("ch", MemberType::Primitive(PrimitiveTag::Char))
            .with_member("i16", MemberType::Primitive(PrimitiveTag::Int16))
            .with_member("i32", MemberType::Primitive(PrimitiveTag::Int32))
            .with_member("i64", MemberType::Primitive(PrimitiveTag::Int64))
            .with_member("u16", MemberType::Primitive(PrimitiveTag::UInt16))
            .with_member("u32", MemberType::Primitive(PrimitiveTag::UInt32))
            .with_member("u64", MemberType::Primitive(PrimitiveTag::UInt64))
            .with_member("f32", MemberType::Primitive(PrimitiveTag::Single))
            .with_member("f64", MemberType::Primitive(PrimitiveTag::Double))
            .with_member("dec", MemberType::Primitive(PrimitiveTag::Decimal))
            .with_member("ts", MemberType::Primitive(PrimitiveTag::TimeSpan))
            .with_member("dt", MemberType::Primitive(PrimitiveTag::DateTime)),
    );
    let mut graph = ObjectGraph::new();
    let root = graph
        .add_object(
            class,
            vec![
                Value::Prim(Primitive::Boolean(true)),
                Value::Prim(Primitive::Byte(0xEF)),
                Value::Prim(Primitive::SByte(-5)),
                Value::Prim(Primitive::Char('µ')),
                Value::Prim(Primitive::Int16(-300)),
                Value::Prim(Primitive::Int32(70_000)),
                Value::Prim(Primitive::Int64(-9_000_000_000)),
                Value::Prim(Primitive::UInt16(65_535)),
                Value::Prim(Primitive::UInt32(4_000_000_000)),
                Value::Prim(Primitive::UInt64(18_000_000_000_000_000_000)),
                Value::Prim(Primitive::Single(1.5)),
                Value::Prim(Primitive::Double(-2.25)),
                Value::Prim(Primitive::Decimal("3.1415".to_string())),
                Value::Prim(Primitive::TimeSpan(36_000_000_000)),
                Value::Prim(Primitive::DateTime(0x8800_0000_0000_0001)),
            ],
        )
        .expect("add");
    graph.set_root(root);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn untyped_primitive_member_uses_typed_record() {
    // A value in an Object-typed slot travels with its own type tag.
    let class = Arc::new(
        ClassSchema::new("Box").with_member("contents", MemberType::Object),
    );
    let mut graph = ObjectGraph::new();
    let root = graph
        .add_object(class, vec![Value::Prim(Primitive::Double(6.5))])
        .expect("add");
    graph.set_root(root);

    let back = round_trip(&graph);
    assert!(graph.structurally_eq(&back));
}

#[test]
fn save_and_load_file() {
    let mut graph = ObjectGraph::new();
    let name = graph.add_string("on disk");
    let root = graph
        .add_object(
            person_class(),
            vec![Value::Ref(name), Value::int32(77), Value::Null],
        )
        .expect("add");
    graph.set_root(root);

    let file = NamedTempFile::new().expect("temp file");
    Knotcode::save(&graph, file.path(), &EncodeOptions::new()).expect("save");
    let back = Knotcode::load(file.path(), &DecodeOptions::new()).expect("load");
    assert!(graph.structurally_eq(&back));
}

#[test]
fn decoded_graph_reencodes() {
    let mut graph = ObjectGraph::new();
    let class = person_class();
    let a = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(1), Value::Null],
        )
        .expect("add");
    let b = graph
        .add_object(class, vec![Value::Null, Value::int32(2), Value::Ref(a)])
        .expect("add");
    graph
        .set_slot(a, knotcode::graph::SlotLocator::Member(2), Value::Ref(b))
        .expect("patch");
    graph.set_root(a);

    let once = round_trip(&graph);
    let twice = round_trip(&once);
    assert!(graph.structurally_eq(&twice));
}

struct RenameBinder;

impl Binder for RenameBinder {
    fn bind(&self, name: &str, library: Option<&str>) -> Option<(String, Option<String>)> {
        let _ = (name, library);
        None
    }

    fn bind_to_wire(&self, class: &ClassSchema) -> Option<(String, Option<String>)> {
        (class.name == "Person").then(|| {
            (
                "Человек".to_string(),
                Some("People.V2, Version=2.0.0.0".to_string()),
            )
        })
    }
}

#[test]
fn binder_renames_on_the_wire() {
    let mut graph = ObjectGraph::new();
    let root = graph
        .add_object(
            person_class(),
            vec![Value::Null, Value::int32(9), Value::Null],
        )
        .expect("add");
    graph.set_root(root);

    let opts = EncodeOptions::new().with_binder(Arc::new(RenameBinder));
    let bytes = Knotcode::encode_to_vec(&graph, &opts).expect("encode");
    let back = Knotcode::decode_slice(&bytes, &DecodeOptions::new()).expect("decode");

    let root = back.root().expect("root");
    let GraphNode::Object(obj) = back.node(root) else {
        panic!("root is not an object");
    };
    assert_eq!(obj.class.name, "Человек");
    assert_eq!(
        obj.class.library.as_deref(),
        Some("People.V2, Version=2.0.0.0")
    );
}

struct WrappedCodec;

impl CustomCodec for WrappedCodec {
    fn capture(&self, _class: &ClassSchema, members: &[Value]) -> Result<Vec<BagEntry>> {
        Ok(vec![BagEntry {
            name: "v".to_string(),
            ty: MemberType::Primitive(PrimitiveTag::Int32),
            value: members[0].clone(),
        }])
    }

    fn restore(&self, _class: &ClassSchema, bag: Vec<BagEntry>) -> Result<Vec<Value>> {
        Ok(bag.into_iter().map(|entry| entry.value).collect())
    }
}

struct WrappedSelector;

impl SurrogateSelector for WrappedSelector {
    fn select(&self, class: &ClassSchema) -> Option<Arc<dyn CustomCodec>> {
        (class.name == "Wrapped").then(|| Arc::new(WrappedCodec) as Arc<dyn CustomCodec>)
    }
}

#[test]
fn surrogate_codec_round_trip() {
    let class = Arc::new(
        ClassSchema::new("Wrapped")
            .with_member("value", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        ClassSchema::new("Wrapped")
            .with_member("value", MemberType::Primitive(PrimitiveTag::Int32)),
    );

    let mut graph = ObjectGraph::new();
    let root = graph
        .add_object(class, vec![Value::int32(41)])
        .expect("add");
    graph.set_root(root);

    let encode = EncodeOptions::new().with_surrogates(Arc::new(WrappedSelector));
    let bytes = Knotcode::encode_to_vec(&graph, &encode).expect("encode");

    let decode = DecodeOptions::new()
        .with_registry(registry)
        .with_surrogates(Arc::new(WrappedSelector));
    let back = Knotcode::decode_slice(&bytes, &decode).expect("decode");

    let root = back.root().expect("root");
    let GraphNode::Object(obj) = back.node(root) else {
        panic!("root is not an object");
    };
    assert_eq!(obj.class.name, "Wrapped");
    assert_eq!(obj.class.members[0].name, "value");
    assert_eq!(obj.members[0], Value::int32(41));
}

#[derive(Default)]
struct CountingSink {
    deserializing: AtomicUsize,
    deserialized: AtomicUsize,
    serialized: AtomicUsize,
}

impl LifecycleSink for CountingSink {
    fn on_deserializing(&self, _object_id: ObjectId, _class: &ClassSchema) {
        self.deserializing.fetch_add(1, Ordering::Relaxed);
    }

    fn on_deserialized(&self, _graph: &ObjectGraph) {
        self.deserialized.fetch_add(1, Ordering::Relaxed);
    }

    fn on_serialized(&self, _graph: &ObjectGraph) {
        self.serialized.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn lifecycle_sink_sees_both_directions() {
    let mut graph = ObjectGraph::new();
    let class = person_class();
    let a = graph
        .add_object(
            Arc::clone(&class),
            vec![Value::Null, Value::int32(1), Value::Null],
        )
        .expect("add");
    let b = graph
        .add_object(class, vec![Value::Null, Value::int32(2), Value::Ref(a)])
        .expect("add");
    graph.set_root(b);

    let sink = Arc::new(CountingSink::default());
    let encode = EncodeOptions::new().with_sink(Arc::clone(&sink) as Arc<dyn LifecycleSink>);
    let bytes = Knotcode::encode_to_vec(&graph, &encode).expect("encode");
    assert_eq!(sink.serialized.load(Ordering::Relaxed), 1);

    let decode = DecodeOptions::new().with_sink(Arc::clone(&sink) as Arc<dyn LifecycleSink>);
    Knotcode::decode_slice(&bytes, &decode).expect("decode");
    assert_eq!(sink.deserializing.load(Ordering::Relaxed), 2);
    assert_eq!(sink.deserialized.load(Ordering::Relaxed), 1);
}
