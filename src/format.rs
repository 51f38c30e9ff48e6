//! Defines the wire-level vocabulary of the record stream.
//!
//! # Stream Layout
//! A stream is a flat sequence of tagged records:
//!
//! `[Header] [Library | Class | Array | String | ...]* [MessageEnd]`
//!
//! Every record starts with a single tag byte ([`RecordTag`]). The
//! header record is exactly 17 bytes; every other record has a fixed,
//! ordered field layout keyed to its tag (see [`crate::records`]).
//! Multi-byte integers are little-endian; strings carry a 7-bit-encoded
//! length prefix followed by UTF-8 bytes.
//!
//! This layout is an external contract shared with existing producers
//! and consumers; the byte values below must never change.

use crate::error::{KnotcodeError, Result};

/// Wire major version accepted by the decoder. Streams declaring a
/// greater major version are rejected.
pub const MAJOR_VERSION: i32 = 1;

/// Wire minor version emitted by the encoder.
pub const MINOR_VERSION: i32 = 0;

/// The fixed size of the stream header record.
/// Tag(1) + RootId(4) + HeaderId(4) + Major(4) + Minor(4) = 17
pub const STREAM_HEADER_SIZE: usize = 17;

/// Header id emitted when the stream carries no header table.
pub const NO_HEADER_ID: i32 = -1;

/// The leading byte identifying a record's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordTag {
    /// Stream header: root id, header id, major/minor version.
    Header = 0,
    /// An object whose schema was emitted earlier (back-reference to a
    /// metadata id).
    ClassWithId = 1,
    /// Core-library object with member names only (schema-less).
    SystemClassWithMembers = 2,
    /// Library-qualified object with member names only (schema-less).
    ClassWithMembers = 3,
    /// Core-library object with full self-describing schema.
    SystemClassWithMembersAndTypes = 4,
    /// Library-qualified object with full self-describing schema.
    ClassWithMembersAndTypes = 5,
    /// A string instance with its own object id.
    ObjectString = 6,
    /// The fully general array header (any rank, optional lower bounds).
    BinaryArray = 7,
    /// A primitive value in an object-typed slot, carrying its own
    /// primitive tag.
    MemberPrimitiveTyped = 8,
    /// A back- or forward-reference to an object id.
    MemberReference = 9,
    /// A single null value.
    ObjectNull = 10,
    /// End of stream.
    MessageEnd = 11,
    /// Declares a library (module identity) and assigns it an id.
    Library = 12,
    /// A run of consecutive nulls, count carried as one byte.
    ObjectNullMultiple256 = 13,
    /// A run of consecutive nulls, count carried as four bytes.
    ObjectNullMultiple = 14,
    /// Rank-1, zero-bound array of a single primitive type (byte-blit
    /// payload).
    ArraySinglePrimitive = 15,
    /// Rank-1, zero-bound array of arbitrary objects.
    ArraySingleObject = 16,
    /// Rank-1, zero-bound array of strings.
    ArraySingleString = 17,
    /// Cross-domain map record (recognized, not supported).
    CrossDomainMap = 18,
    /// Cross-domain string record (recognized, not supported).
    CrossDomainString = 19,
    /// Cross-domain assembly record (recognized, not supported).
    CrossDomainAssembly = 20,
}

impl RecordTag {
    /// Decodes a tag byte. An unrecognized byte is a malformed record.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Self::Header,
            1 => Self::ClassWithId,
            2 => Self::SystemClassWithMembers,
            3 => Self::ClassWithMembers,
            4 => Self::SystemClassWithMembersAndTypes,
            5 => Self::ClassWithMembersAndTypes,
            6 => Self::ObjectString,
            7 => Self::BinaryArray,
            8 => Self::MemberPrimitiveTyped,
            9 => Self::MemberReference,
            10 => Self::ObjectNull,
            11 => Self::MessageEnd,
            12 => Self::Library,
            13 => Self::ObjectNullMultiple256,
            14 => Self::ObjectNullMultiple,
            15 => Self::ArraySinglePrimitive,
            16 => Self::ArraySingleObject,
            17 => Self::ArraySingleString,
            18 => Self::CrossDomainMap,
            19 => Self::CrossDomainString,
            20 => Self::CrossDomainAssembly,
            other => {
                return Err(KnotcodeError::malformed(format!(
                    "unrecognized record tag byte {other:#04x}"
                )))
            }
        })
    }

    /// The wire byte for this tag.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The wire type-tag byte attached to member and array-element
/// declarations. Distinct from [`RecordTag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    /// Fixed-width primitive; followed by a [`PrimitiveTag`].
    Primitive = 0,
    /// String reference.
    String = 1,
    /// Any object reference; element/member type resolved per value.
    Object = 2,
    /// Object of a core-library class; followed by the class name.
    SystemClass = 3,
    /// Object of a library-qualified class; followed by the class name
    /// and a library id.
    Class = 4,
    /// Array of object references.
    ObjectArray = 5,
    /// Array of strings.
    StringArray = 6,
    /// Array of a single primitive type; followed by a [`PrimitiveTag`].
    PrimitiveArray = 7,
}

impl TypeTag {
    /// Decodes a type-tag byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Self::Primitive,
            1 => Self::String,
            2 => Self::Object,
            3 => Self::SystemClass,
            4 => Self::Class,
            5 => Self::ObjectArray,
            6 => Self::StringArray,
            7 => Self::PrimitiveArray,
            other => {
                return Err(KnotcodeError::malformed(format!(
                    "unrecognized type tag byte {other:#04x}"
                )))
            }
        })
    }
}

/// The primitive type-code byte enumeration.
///
/// Value 0 is a reserved "invalid/unset" sentinel and value 4 is a gap
/// in the legacy numbering; both are preserved for compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveTag {
    /// One byte, 0 or 1.
    Boolean = 1,
    /// Unsigned 8-bit.
    Byte = 2,
    /// A Unicode scalar, UTF-8 encoded on the wire (1-4 bytes).
    Char = 3,
    /// Transported as a decimal-formatted length-prefixed string.
    Decimal = 5,
    /// IEEE-754 binary64, little-endian.
    Double = 6,
    /// Signed 16-bit, little-endian.
    Int16 = 7,
    /// Signed 32-bit, little-endian.
    Int32 = 8,
    /// Signed 64-bit, little-endian.
    Int64 = 9,
    /// Signed 8-bit.
    SByte = 10,
    /// IEEE-754 binary32, little-endian.
    Single = 11,
    /// Raw tick count, 8 bytes little-endian.
    TimeSpan = 12,
    /// Raw 8 bytes including the internal kind bits.
    DateTime = 13,
    /// Unsigned 16-bit, little-endian.
    UInt16 = 14,
    /// Unsigned 32-bit, little-endian.
    UInt32 = 15,
    /// Unsigned 64-bit, little-endian.
    UInt64 = 16,
}

impl PrimitiveTag {
    /// Decodes a primitive type-code byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            1 => Self::Boolean,
            2 => Self::Byte,
            3 => Self::Char,
            5 => Self::Decimal,
            6 => Self::Double,
            7 => Self::Int16,
            8 => Self::Int32,
            9 => Self::Int64,
            10 => Self::SByte,
            11 => Self::Single,
            12 => Self::TimeSpan,
            13 => Self::DateTime,
            14 => Self::UInt16,
            15 => Self::UInt32,
            16 => Self::UInt64,
            other => {
                return Err(KnotcodeError::malformed(format!(
                    "unrecognized primitive type code {other:#04x}"
                )))
            }
        })
    }

    /// Fixed wire width in bytes, or `None` for variable-width encodings
    /// (Char, Decimal). Fixed-width elements are eligible for the
    /// byte-blit array fast path.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Byte | Self::SByte => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Single => Some(4),
            Self::Int64
            | Self::UInt64
            | Self::Double
            | Self::TimeSpan
            | Self::DateTime => Some(8),
            Self::Char | Self::Decimal => None,
        }
    }
}

/// Array-shape discriminator carried by the general [`RecordTag::BinaryArray`]
/// record. The `*Offset` variants additionally carry per-dimension lower
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArrayKind {
    /// Rank 1, zero lower bound.
    Single = 0,
    /// Rank-1 array of arrays.
    Jagged = 1,
    /// Rank > 1, uniform element type.
    Rectangular = 2,
    /// Rank 1 with a non-zero lower bound.
    SingleOffset = 3,
    /// Jagged with a non-zero lower bound.
    JaggedOffset = 4,
    /// Rectangular with per-dimension lower bounds.
    RectangularOffset = 5,
}

impl ArrayKind {
    /// Decodes an array-kind byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            0 => Self::Single,
            1 => Self::Jagged,
            2 => Self::Rectangular,
            3 => Self::SingleOffset,
            4 => Self::JaggedOffset,
            5 => Self::RectangularOffset,
            other => {
                return Err(KnotcodeError::malformed(format!(
                    "unrecognized array kind byte {other:#04x}"
                )))
            }
        })
    }

    /// Whether this kind carries a lower-bounds table.
    pub fn has_lower_bounds(self) -> bool {
        matches!(
            self,
            Self::SingleOffset | Self::JaggedOffset | Self::RectangularOffset
        )
    }
}
