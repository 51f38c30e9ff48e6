use std::fmt;

/// A strong type identifying one slot in the [`super::ObjectGraph`] arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32); // u32 is sufficient for 4 billion nodes per graph.

impl NodeId {
    /// Creates a new NodeId.
    /// Restricted to the graph module to prevent arbitrary creation.
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw arena index.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The integer identity an instance carries on the wire for the
/// duration of one encode or decode operation.
///
/// Zero means "no object" (null). Positive ids identify shared
/// reference-typed instances in write-visitation order. The negative
/// range is reserved for value-type instances that need no shared
/// identity; those ids are never deduplicated or back-referenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(i32);

impl ObjectId {
    /// The "no object" id.
    pub const NULL: ObjectId = ObjectId(0);

    /// Wraps a raw wire id.
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the raw wire value.
    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// True for the reserved "no object" id.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// True for ids from the reserved value-type range.
    pub fn is_value_instance(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
