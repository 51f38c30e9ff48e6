//! Node and value types stored in the object-graph arena.

use std::sync::Arc;

use crate::error::{KnotcodeError, Result};
use crate::format::{ArrayKind, PrimitiveTag};
use crate::io::{WireReader, WireWriter};
use crate::schema::{ClassSchema, MemberType};

use super::NodeId;

/// An inline primitive value.
///
/// Decimal travels as a decimal-formatted string; DateTime as its raw
/// 8 bytes including the internal kind bits; TimeSpan as raw ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// One-byte boolean.
    Boolean(bool),
    /// Unsigned 8-bit.
    Byte(u8),
    /// Signed 8-bit.
    SByte(i8),
    /// Unicode scalar.
    Char(char),
    /// Signed 16-bit.
    Int16(i16),
    /// Signed 32-bit.
    Int32(i32),
    /// Signed 64-bit.
    Int64(i64),
    /// Unsigned 16-bit.
    UInt16(u16),
    /// Unsigned 32-bit.
    UInt32(u32),
    /// Unsigned 64-bit.
    UInt64(u64),
    /// IEEE-754 binary32.
    Single(f32),
    /// IEEE-754 binary64.
    Double(f64),
    /// Decimal, kept in its wire form (decimal-formatted string).
    Decimal(String),
    /// Raw tick count.
    TimeSpan(i64),
    /// Raw 8-byte representation, kind bits included.
    DateTime(u64),
}

impl Primitive {
    /// The wire type code for this value.
    pub fn tag(&self) -> PrimitiveTag {
        match self {
            Self::Boolean(_) => PrimitiveTag::Boolean,
            Self::Byte(_) => PrimitiveTag::Byte,
            Self::SByte(_) => PrimitiveTag::SByte,
            Self::Char(_) => PrimitiveTag::Char,
            Self::Int16(_) => PrimitiveTag::Int16,
            Self::Int32(_) => PrimitiveTag::Int32,
            Self::Int64(_) => PrimitiveTag::Int64,
            Self::UInt16(_) => PrimitiveTag::UInt16,
            Self::UInt32(_) => PrimitiveTag::UInt32,
            Self::UInt64(_) => PrimitiveTag::UInt64,
            Self::Single(_) => PrimitiveTag::Single,
            Self::Double(_) => PrimitiveTag::Double,
            Self::Decimal(_) => PrimitiveTag::Decimal,
            Self::TimeSpan(_) => PrimitiveTag::TimeSpan,
            Self::DateTime(_) => PrimitiveTag::DateTime,
        }
    }

    /// Encodes the bare value (no tag byte).
    pub fn encode<W: std::io::Write>(&self, writer: &mut WireWriter<W>) -> Result<()> {
        match self {
            Self::Boolean(v) => writer.write_bool(*v),
            Self::Byte(v) => writer.write_u8(*v),
            Self::SByte(v) => writer.write_i8(*v),
            Self::Char(v) => writer.write_char(*v),
            Self::Int16(v) => writer.write_i16(*v),
            Self::Int32(v) => writer.write_i32(*v),
            Self::Int64(v) => writer.write_i64(*v),
            Self::UInt16(v) => writer.write_u16(*v),
            Self::UInt32(v) => writer.write_u32(*v),
            Self::UInt64(v) => writer.write_u64(*v),
            Self::Single(v) => writer.write_f32(*v),
            Self::Double(v) => writer.write_f64(*v),
            Self::Decimal(v) => writer.write_string(v),
            Self::TimeSpan(v) => writer.write_i64(*v),
            Self::DateTime(v) => writer.write_u64(*v),
        }
    }

    /// Decodes a bare value of the given type code.
    pub fn decode<R: std::io::Read>(
        tag: PrimitiveTag,
        reader: &mut WireReader<R>,
        max_prealloc: usize,
    ) -> Result<Self> {
        Ok(match tag {
            PrimitiveTag::Boolean => Self::Boolean(reader.read_bool()?),
            PrimitiveTag::Byte => Self::Byte(reader.read_u8()?),
            PrimitiveTag::SByte => Self::SByte(reader.read_i8()?),
            PrimitiveTag::Char => Self::Char(reader.read_char()?),
            PrimitiveTag::Int16 => Self::Int16(reader.read_i16()?),
            PrimitiveTag::Int32 => Self::Int32(reader.read_i32()?),
            PrimitiveTag::Int64 => Self::Int64(reader.read_i64()?),
            PrimitiveTag::UInt16 => Self::UInt16(reader.read_u16()?),
            PrimitiveTag::UInt32 => Self::UInt32(reader.read_u32()?),
            PrimitiveTag::UInt64 => Self::UInt64(reader.read_u64()?),
            PrimitiveTag::Single => Self::Single(reader.read_f32()?),
            PrimitiveTag::Double => Self::Double(reader.read_f64()?),
            PrimitiveTag::Decimal => Self::Decimal(reader.read_string(max_prealloc)?),
            PrimitiveTag::TimeSpan => Self::TimeSpan(reader.read_i64()?),
            PrimitiveTag::DateTime => Self::DateTime(reader.read_u64()?),
        })
    }
}

/// The content of one member or array slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No object.
    Null,
    /// An inline primitive.
    Prim(Primitive),
    /// A reference to another arena node (object, array, or string).
    /// Strictly "id + arena lookup"; cycles are represented safely
    /// because a slot may point at a node that is still being built.
    Ref(NodeId),
}

impl Value {
    /// Convenience constructor for an i32 value.
    pub fn int32(v: i32) -> Self {
        Self::Prim(Primitive::Int32(v))
    }
}

/// Locates one writable slot inside a container node: a member position
/// of an object, or a flat element index of an array.
///
/// Deferred fixups patch value slots exclusively through this locator
/// plus the owning container, never through a retained reference into
/// the value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLocator {
    /// Member position within an object, in schema order.
    Member(usize),
    /// Flat (row-major) element index within an array.
    Index(usize),
}

/// An object instance: a class schema plus its member values in schema
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInstance {
    /// The instance's resolved schema.
    pub class: Arc<ClassSchema>,
    /// Member values, one per schema member, in order.
    pub members: Vec<Value>,
}

/// The logical shape of an array node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayShape {
    /// Rank 1, optionally with a non-zero lower bound.
    Single {
        /// Element count.
        len: usize,
        /// First index.
        lower_bound: i32,
    },
    /// Rank-1 array of arrays; rows are independent array nodes.
    Jagged {
        /// Row count.
        len: usize,
        /// First index.
        lower_bound: i32,
    },
    /// Rank > 1 with uniform element type, stored flat in row-major
    /// order.
    Rectangular {
        /// Per-dimension lengths.
        lengths: Vec<usize>,
        /// Per-dimension lower bounds.
        lower_bounds: Vec<i32>,
    },
}

impl ArrayShape {
    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        match self {
            Self::Single { .. } | Self::Jagged { .. } => 1,
            Self::Rectangular { lengths, .. } => lengths.len(),
        }
    }

    /// Total number of stored elements (product of lengths).
    pub fn flat_len(&self) -> usize {
        match self {
            Self::Single { len, .. } | Self::Jagged { len, .. } => *len,
            Self::Rectangular { lengths, .. } => lengths.iter().product(),
        }
    }

    /// Per-dimension lengths.
    pub fn lengths(&self) -> Vec<usize> {
        match self {
            Self::Single { len, .. } | Self::Jagged { len, .. } => vec![*len],
            Self::Rectangular { lengths, .. } => lengths.clone(),
        }
    }

    /// Per-dimension lower bounds.
    pub fn lower_bounds(&self) -> Vec<i32> {
        match self {
            Self::Single { lower_bound, .. } | Self::Jagged { lower_bound, .. } => {
                vec![*lower_bound]
            }
            Self::Rectangular { lower_bounds, .. } => lower_bounds.clone(),
        }
    }

    /// True when any dimension starts at a non-zero index.
    pub fn has_offsets(&self) -> bool {
        self.lower_bounds().iter().any(|&b| b != 0)
    }

    /// The wire discriminator for this shape.
    pub fn kind(&self) -> ArrayKind {
        match (self, self.has_offsets()) {
            (Self::Single { .. }, false) => ArrayKind::Single,
            (Self::Single { .. }, true) => ArrayKind::SingleOffset,
            (Self::Jagged { .. }, false) => ArrayKind::Jagged,
            (Self::Jagged { .. }, true) => ArrayKind::JaggedOffset,
            (Self::Rectangular { .. }, false) => ArrayKind::Rectangular,
            (Self::Rectangular { .. }, true) => ArrayKind::RectangularOffset,
        }
    }
}

/// An array instance: shape, element declaration, and flat row-major
/// element storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayInstance {
    /// The declared element type.
    pub element: MemberType,
    /// The array's shape.
    pub shape: ArrayShape,
    /// Elements, row-major, `shape.flat_len()` of them.
    pub elements: Vec<Value>,
}

impl ArrayInstance {
    /// Builds an array instance, checking element count against shape.
    pub fn new(element: MemberType, shape: ArrayShape, elements: Vec<Value>) -> Result<Self> {
        if elements.len() != shape.flat_len() {
            return Err(KnotcodeError::inconsistent(format!(
                "array shape expects {} element(s), got {}",
                shape.flat_len(),
                elements.len()
            )));
        }
        Ok(Self {
            element,
            shape,
            elements,
        })
    }
}

/// One occupied slot of the arena: a reference-typed instance with its
/// own identity on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    /// A class instance.
    Object(ObjectInstance),
    /// An array of any supported shape.
    Array(ArrayInstance),
    /// A string instance.
    Str(String),
}

impl GraphNode {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Str(_) => "string",
        }
    }
}
