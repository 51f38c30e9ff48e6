//! External collaborator seams: binders, custom codecs, and lifecycle
//! notification sinks.
//!
//! These traits are the engine's only view of the outside world. Each
//! has a sensible default so the plain field-enumeration path needs no
//! configuration at all.

use std::sync::Arc;

use crate::error::Result;
use crate::graph::{ObjectGraph, ObjectId, Value};
use crate::schema::{ClassSchema, MemberType};

/// Remaps type names between the wire and the registry.
pub trait Binder: Send + Sync {
    /// Maps a wire-level (type name, module identity) pair to the
    /// registered name it should resolve as. `None` means no remap.
    fn bind(&self, name: &str, library: Option<&str>) -> Option<(String, Option<String>)>;

    /// Renames a registered type for emission. `None` keeps the
    /// schema's own name and library.
    fn bind_to_wire(&self, class: &ClassSchema) -> Option<(String, Option<String>)> {
        let _ = class;
        None
    }
}

/// One entry of a custom codec's named value bag.
#[derive(Debug, Clone)]
pub struct BagEntry {
    /// The entry's name as it travels on the wire.
    pub name: String,
    /// The entry's declared wire type.
    pub ty: MemberType,
    /// The entry's value.
    pub value: Value,
}

/// A custom codec (surrogate) that fully replaces field-by-field schema
/// emission and consumption for a type.
///
/// When a selector provides a codec for a class, the writer emits a
/// fresh self-describing schema per object built from the codec's bag
/// (member sets may diverge between instances of the same type), and
/// the parser hands the decoded bag back to the codec to rebuild the
/// instance's members.
pub trait CustomCodec: Send + Sync {
    /// Captures an instance into a named value bag. `members` are the
    /// instance's member values in schema order.
    fn capture(&self, class: &ClassSchema, members: &[Value]) -> Result<Vec<BagEntry>>;

    /// Rebuilds an instance's member values (in `class` schema order)
    /// from a decoded bag.
    fn restore(&self, class: &ClassSchema, bag: Vec<BagEntry>) -> Result<Vec<Value>>;
}

/// Selects a custom codec for a type at schema-resolution time.
pub trait SurrogateSelector: Send + Sync {
    /// Returns the codec handling `class`, if any. The default path
    /// (plain field enumeration) applies when this returns `None`.
    fn select(&self, class: &ClassSchema) -> Option<Arc<dyn CustomCodec>>;
}

/// Receives lifecycle notifications around encode and decode.
///
/// All methods default to no-ops.
pub trait LifecycleSink: Send + Sync {
    /// Called before an object's materialization begins.
    fn on_deserializing(&self, object_id: ObjectId, class: &ClassSchema) {
        let _ = (object_id, class);
    }

    /// Called once after the full graph is resolved (all fixups
    /// replayed) at the end of a successful decode.
    fn on_deserialized(&self, graph: &ObjectGraph) {
        let _ = graph;
    }

    /// Called at the end of a successful encode.
    fn on_serialized(&self, graph: &ObjectGraph) {
        let _ = graph;
    }
}
