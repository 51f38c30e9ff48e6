//! Registry resolution, binder remaps, and schema validation against
//! streams whose class records carry no member types.

use std::sync::Arc;

use knotcode::format::PrimitiveTag;
use knotcode::io::WireWriter;
use knotcode::records::{ClassInfo, ClassRecord, HeaderRecord, LibraryRecord, WireType};
use knotcode::{
    Binder, ClassSchema, DecodeOptions, GraphNode, Knotcode, KnotcodeError, MemberType,
    ObjectGraph, Primitive, TypeRegistry, Value,
};

const GEO_LIB: &str = "Geo, Version=1.0.0.0";

fn point_schema() -> ClassSchema {
    ClassSchema::new("Point")
        .with_library(GEO_LIB)
        .with_member("x", MemberType::Primitive(PrimitiveTag::Int32))
        .with_member("y", MemberType::Primitive(PrimitiveTag::Int32))
}

/// A ClassWithMembers stream: the record names its members but carries
/// no types, so decoding leans entirely on the registry.
fn untyped_point_stream(class_name: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut w = WireWriter::new(&mut buf);
        HeaderRecord::new(1).encode(&mut w).expect("header");
        LibraryRecord {
            library_id: 2,
            name: GEO_LIB.to_string(),
        }
        .encode(&mut w)
        .expect("library");
        ClassRecord {
            info: ClassInfo {
                object_id: 1,
                name: class_name.to_string(),
                member_names: vec!["x".to_string(), "y".to_string()],
            },
            types: None,
            library_id: Some(2),
        }
        .encode(&mut w)
        .expect("class");
        w.write_i32(3).expect("x");
        w.write_i32(4).expect("y");
        w.write_u8(11).expect("end");
    }
    buf
}

fn root_object(graph: &ObjectGraph) -> &knotcode::ObjectInstance {
    let root = graph.root().expect("root");
    match graph.node(root) {
        GraphNode::Object(o) => o,
        other => panic!("expected object root, got {}", other.kind_name()),
    }
}

#[test]
fn untyped_record_decodes_through_registry() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(point_schema());

    let bytes = untyped_point_stream("Point");
    let opts = DecodeOptions::new().with_registry(registry);
    let graph = Knotcode::decode_slice(&bytes, &opts).expect("decode");

    let point = root_object(&graph);
    assert_eq!(point.class.name, "Point");
    assert_eq!(point.class.library.as_deref(), Some(GEO_LIB));
    assert_eq!(point.members[0], Value::Prim(Primitive::Int32(3)));
    assert_eq!(point.members[1], Value::Prim(Primitive::Int32(4)));
}

#[test]
fn untyped_record_without_registry_fails() {
    let bytes = untyped_point_stream("Point");
    let err = Knotcode::decode_slice(&bytes, &DecodeOptions::new()).expect_err("must fail");
    assert!(matches!(err, KnotcodeError::TypeResolution(_)), "{err}");
}

#[test]
fn untyped_record_of_unregistered_type_fails() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(point_schema());

    let bytes = untyped_point_stream("Vector");
    let opts = DecodeOptions::new().with_registry(registry);
    let err = Knotcode::decode_slice(&bytes, &opts).expect_err("must fail");
    assert!(matches!(err, KnotcodeError::TypeResolution(_)), "{err}");
}

#[test]
fn core_untyped_flavor_uses_core_table() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        ClassSchema::new("TimeSpanHolder")
            .with_member("ticks", MemberType::Primitive(PrimitiveTag::Int64)),
    );

    let mut buf = Vec::new();
    {
        let mut w = WireWriter::new(&mut buf);
        HeaderRecord::new(1).encode(&mut w).expect("header");
        ClassRecord {
            info: ClassInfo {
                object_id: 1,
                name: "TimeSpanHolder".to_string(),
                member_names: vec!["ticks".to_string()],
            },
            types: None,
            library_id: None,
        }
        .encode(&mut w)
        .expect("class");
        w.write_i64(864_000_000_000).expect("ticks");
        w.write_u8(11).expect("end");
    }

    let opts = DecodeOptions::new().with_registry(registry);
    let graph = Knotcode::decode_slice(&buf, &opts).expect("decode");
    let holder = root_object(&graph);
    assert_eq!(holder.members[0], Value::Prim(Primitive::Int64(864_000_000_000)));
}

#[test]
fn registered_member_missing_from_wire_is_a_mismatch() {
    // The registered type expects a member the wire schema lacks.
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        ClassSchema::new("Point")
            .with_library(GEO_LIB)
            .with_member("x", MemberType::Primitive(PrimitiveTag::Int32))
            .with_member("z", MemberType::Primitive(PrimitiveTag::Int32)),
    );

    let mut buf = Vec::new();
    {
        let mut w = WireWriter::new(&mut buf);
        HeaderRecord::new(1).encode(&mut w).expect("header");
        LibraryRecord {
            library_id: 2,
            name: GEO_LIB.to_string(),
        }
        .encode(&mut w)
        .expect("library");
        ClassRecord {
            info: ClassInfo {
                object_id: 1,
                name: "Point".to_string(),
                member_names: vec!["x".to_string()],
            },
            types: Some(vec![WireType::Primitive(PrimitiveTag::Int32)]),
            library_id: Some(2),
        }
        .encode(&mut w)
        .expect("class");
        w.write_i32(3).expect("x");
        w.write_u8(11).expect("end");
    }

    let opts = DecodeOptions::new().with_registry(registry);
    let err = Knotcode::decode_slice(&buf, &opts).expect_err("must fail");
    assert!(matches!(err, KnotcodeError::SchemaMismatch(_)), "{err}");
}

struct LegacyBinder;

impl Binder for LegacyBinder {
    fn bind(&self, name: &str, library: Option<&str>) -> Option<(String, Option<String>)> {
        (name == "Legacy.Point" && library == Some(GEO_LIB))
            .then(|| ("Point".to_string(), Some(GEO_LIB.to_string())))
    }
}

#[test]
fn binder_remaps_wire_name_to_registered_type() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(point_schema());

    let bytes = untyped_point_stream("Legacy.Point");
    let opts = DecodeOptions::new()
        .with_registry(registry)
        .with_binder(Arc::new(LegacyBinder));
    let graph = Knotcode::decode_slice(&bytes, &opts).expect("decode");

    // The decoded instance carries the registered identity.
    let point = root_object(&graph);
    assert_eq!(point.class.name, "Point");
    assert_eq!(point.members[0], Value::Prim(Primitive::Int32(3)));
}

#[test]
fn binder_remap_does_not_outlive_its_operation() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(point_schema());
    let bytes = untyped_point_stream("Legacy.Point");

    let with_binder = DecodeOptions::new()
        .with_registry(Arc::clone(&registry))
        .with_binder(Arc::new(LegacyBinder));
    Knotcode::decode_slice(&bytes, &with_binder).expect("decode");

    // A later decode on the same registry, without the binder, must not
    // see the remap: `Legacy.Point` is still an unregistered name.
    let without_binder = DecodeOptions::new().with_registry(registry);
    let err = Knotcode::decode_slice(&bytes, &without_binder).expect_err("must fail");
    assert!(matches!(err, KnotcodeError::TypeResolution(_)), "{err}");
}

#[test]
fn value_type_flag_comes_from_the_registry() {
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        ClassSchema::new("Money")
            .with_library("Billing, Version=1.0.0.0")
            .with_member("cents", MemberType::Primitive(PrimitiveTag::Int64))
            .as_value_type(),
    );

    let mut buf = Vec::new();
    {
        let mut w = WireWriter::new(&mut buf);
        HeaderRecord::new(1).encode(&mut w).expect("header");
        LibraryRecord {
            library_id: 2,
            name: "Billing, Version=1.0.0.0".to_string(),
        }
        .encode(&mut w)
        .expect("library");
        ClassRecord {
            info: ClassInfo {
                object_id: 1,
                name: "Money".to_string(),
                member_names: vec!["cents".to_string()],
            },
            types: Some(vec![WireType::Primitive(PrimitiveTag::Int64)]),
            library_id: Some(2),
        }
        .encode(&mut w)
        .expect("class");
        w.write_i64(125).expect("cents");
        w.write_u8(11).expect("end");
    }

    let opts = DecodeOptions::new().with_registry(registry);
    let graph = Knotcode::decode_slice(&buf, &opts).expect("decode");
    assert!(root_object(&graph).class.value_type);
}

#[test]
fn first_registration_wins() {
    let registry = TypeRegistry::new();
    let first = registry.register(point_schema());
    let second = registry.register(
        ClassSchema::new("Point")
            .with_library(GEO_LIB)
            .with_member("x", MemberType::Primitive(PrimitiveTag::Double)),
    );
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.members.len(), 2);
}

#[test]
fn resolution_is_memoized() {
    let registry = TypeRegistry::new();
    registry.register(point_schema());
    let a = registry.resolve("Point", Some(GEO_LIB), None).expect("resolve");
    let b = registry.resolve("Point", Some(GEO_LIB), None).expect("resolve");
    assert!(Arc::ptr_eq(&a, &b));
}
