//! Byte-exact wire layout checks and stream inspection.

use std::sync::Arc;

use knotcode::format::PrimitiveTag;
use knotcode::{
    ArrayInstance, ArrayShape, ClassSchema, EncodeOptions, Knotcode, MemberType, ObjectGraph,
    StreamInspector, Value,
};

fn encode(graph: &ObjectGraph) -> Vec<u8> {
    Knotcode::encode_to_vec(graph, &EncodeOptions::new()).expect("encode")
}

#[test]
fn int32_array_stream_is_byte_exact() {
    let mut graph = ObjectGraph::new();
    let array = ArrayInstance::new(
        MemberType::Primitive(PrimitiveTag::Int32),
        ArrayShape::Single {
            len: 3,
            lower_bound: 0,
        },
        vec![Value::int32(1), Value::int32(2), Value::int32(3)],
    )
    .expect("array");
    let root = graph.add_array(array);
    graph.set_root(root);

    #[rustfmt::skip]
    let expected: Vec<u8> = vec![
        // Header: tag, root id 1, header id -1, version 1.0.
        0, 1, 0, 0, 0, 255, 255, 255, 255, 1, 0, 0, 0, 0, 0, 0, 0,
        // ArraySinglePrimitive: tag, id 1, length 3, Int32 code.
        15, 1, 0, 0, 0, 3, 0, 0, 0, 8,
        // Raw little-endian block.
        1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0,
        // MessageEnd.
        11,
    ];
    assert_eq!(encode(&graph), expected);
}

#[test]
fn string_root_stream_is_byte_exact() {
    let mut graph = ObjectGraph::new();
    let root = graph.add_string("hi");
    graph.set_root(root);

    #[rustfmt::skip]
    let expected: Vec<u8> = vec![
        0, 1, 0, 0, 0, 255, 255, 255, 255, 1, 0, 0, 0, 0, 0, 0, 0,
        // ObjectString: tag 6, id 1, varlen 2, "hi".
        6, 1, 0, 0, 0, 2, b'h', b'i',
        11,
    ];
    assert_eq!(encode(&graph), expected);
}

#[test]
fn core_class_uses_system_flavor() {
    // No library: the class record must be the system flavor (tag 4),
    // and no library record may appear.
    let class = Arc::new(
        ClassSchema::new("Pair")
            .with_member("a", MemberType::Primitive(PrimitiveTag::Byte))
            .with_member("b", MemberType::Primitive(PrimitiveTag::Byte)),
    );
    let mut graph = ObjectGraph::new();
    let root = graph
        .add_object(class, vec![
            Value::Prim(knotcode::Primitive::Byte(1)),
            Value::Prim(knotcode::Primitive::Byte(2)),
        ])
        .expect("add");
    graph.set_root(root);

    let bytes = encode(&graph);
    assert_eq!(bytes[17], 4);
    let report = StreamInspector::inspect_slice(&bytes).expect("inspect");
    assert!(report.records.iter().all(|r| r.kind != "Library"));
}

#[test]
fn library_emitted_once_before_class() {
    let class = Arc::new(
        ClassSchema::new("Thing")
            .with_library("Things, Version=1.0.0.0")
            .with_member("n", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let mut graph = ObjectGraph::new();
    let a = graph
        .add_object(Arc::clone(&class), vec![Value::int32(1)])
        .expect("add");
    let b = graph
        .add_object(class, vec![Value::int32(2)])
        .expect("add");
    let array = ArrayInstance::new(
        MemberType::Object,
        ArrayShape::Single {
            len: 2,
            lower_bound: 0,
        },
        vec![Value::Ref(a), Value::Ref(b)],
    )
    .expect("array");
    let root = graph.add_array(array);
    graph.set_root(root);

    let report =
        StreamInspector::inspect_slice(&encode(&graph)).expect("inspect");
    let kinds: Vec<&str> = report.records.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == "Library").count(),
        1,
        "library must be declared exactly once"
    );
    let library_at = kinds.iter().position(|k| *k == "Library").expect("library");
    let class_at = kinds
        .iter()
        .position(|k| *k == "ClassWithMembersAndTypes")
        .expect("class");
    assert!(library_at < class_at);
}

#[test]
fn schema_emitted_once_then_back_referenced() {
    let class = Arc::new(
        ClassSchema::new("Item")
            .with_member("n", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let mut graph = ObjectGraph::new();
    let items: Vec<Value> = (0..4)
        .map(|i| {
            let node = graph
                .add_object(Arc::clone(&class), vec![Value::int32(i)])
                .expect("add");
            Value::Ref(node)
        })
        .collect();
    let array = ArrayInstance::new(
        MemberType::Object,
        ArrayShape::Single {
            len: 4,
            lower_bound: 0,
        },
        items,
    )
    .expect("array");
    let root = graph.add_array(array);
    graph.set_root(root);

    let report =
        StreamInspector::inspect_slice(&encode(&graph)).expect("inspect");
    let kinds: Vec<&str> = report.records.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == "SystemClassWithMembersAndTypes")
            .count(),
        1
    );
    assert_eq!(kinds.iter().filter(|k| **k == "ClassWithId").count(), 3);
}

#[test]
fn stream_always_ends_with_message_end() {
    let mut graph = ObjectGraph::new();
    let root = graph.add_string("end");
    graph.set_root(root);
    let bytes = encode(&graph);
    assert_eq!(*bytes.last().expect("bytes"), 11);
}

#[test]
fn inspector_reports_header_and_counts() {
    let mut graph = ObjectGraph::new();
    let name = graph.add_string("Ada");
    let class = Arc::new(
        ClassSchema::new("Person")
            .with_member("name", MemberType::Str)
            .with_member("age", MemberType::Primitive(PrimitiveTag::Int32)),
    );
    let root = graph
        .add_object(class, vec![Value::Ref(name), Value::int32(36)])
        .expect("add");
    graph.set_root(root);

    let bytes = encode(&graph);
    let report = StreamInspector::inspect_slice(&bytes).expect("inspect");
    assert_eq!(report.stream_size, bytes.len() as u64);
    assert_eq!(report.root_id, 1);
    assert_eq!(report.version, (1, 0));
    // Header, class, nested string, end.
    assert_eq!(report.record_count, 4);

    // The report renders and serializes.
    let rendered = report.to_string();
    assert!(rendered.contains("ObjectString"));
    let json = serde_json::to_string(&report).expect("json");
    assert!(json.contains("\"root_id\":1"));
}
