//! The Record Model: tagged wire records with fixed field layouts.
//!
//! Every record knows how to encode itself (tag byte first) and how to
//! decode its body once the driving loop has consumed the tag.
//! [`Record::decode`] is that driving dispatch: it reads one tag byte
//! and produces the decoded record header, failing with
//! `MalformedRecord` on an unrecognized tag.
//!
//! Records are deliberately *headers only*: the member values that
//! follow a class record, and the elements that follow an array record,
//! are consumed by the parser (they are schema-driven, not
//! self-delimiting). The exceptions are the records that are nothing
//! but a value (`MemberPrimitiveTyped`, `ObjectString`).
//!
//! Records are transient: created per field during encode, consumed
//! once during decode, never retained.

use std::io::{Read, Write};

use crate::error::{KnotcodeError, Result};
use crate::format::{
    ArrayKind, PrimitiveTag, RecordTag, TypeTag, MAJOR_VERSION, MINOR_VERSION, NO_HEADER_ID,
};
use crate::graph::Primitive;
use crate::io::{WireReader, WireWriter};

/// The stream header record: 17 bytes, always first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Id of the root object of the graph.
    pub root_id: i32,
    /// Id of the header table (unused; written as -1).
    pub header_id: i32,
    /// Wire major version.
    pub major: i32,
    /// Wire minor version.
    pub minor: i32,
}

impl HeaderRecord {
    /// Builds the header for a stream rooted at `root_id`.
    pub fn new(root_id: i32) -> Self {
        Self {
            root_id,
            header_id: NO_HEADER_ID,
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
        }
    }

    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::Header.as_u8())?;
        w.write_i32(self.root_id)?;
        w.write_i32(self.header_id)?;
        w.write_i32(self.major)?;
        w.write_i32(self.minor)
    }

    /// Reads the body (tag already consumed) and validates the version.
    pub fn decode<R: Read>(r: &mut WireReader<R>) -> Result<Self> {
        let record = Self {
            root_id: r.read_i32()?,
            header_id: r.read_i32()?,
            major: r.read_i32()?,
            minor: r.read_i32()?,
        };
        if record.major > MAJOR_VERSION || record.major < 1 {
            return Err(KnotcodeError::malformed(format!(
                "unsupported stream major version {}",
                record.major
            )));
        }
        Ok(record)
    }
}

/// Declares a library (module identity) and binds it to an id used by
/// subsequent class records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRecord {
    /// The id assigned to this library.
    pub library_id: i32,
    /// The module-identity string.
    pub name: String,
}

impl LibraryRecord {
    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::Library.as_u8())?;
        w.write_i32(self.library_id)?;
        w.write_string(&self.name)
    }

    fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        Ok(Self {
            library_id: r.read_i32()?,
            name: r.read_string(max_prealloc)?,
        })
    }
}

/// The common (object id, class name, member names) prefix of every
/// class record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// The instance's object id.
    pub object_id: i32,
    /// The class name.
    pub name: String,
    /// Ordered member names.
    pub member_names: Vec<String>,
}

impl ClassInfo {
    fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_i32(self.object_id)?;
        w.write_string(&self.name)?;
        let count = i32::try_from(self.member_names.len()).map_err(|_| {
            KnotcodeError::malformed("member count exceeds the wire limit".to_string())
        })?;
        w.write_i32(count)?;
        for name in &self.member_names {
            w.write_string(name)?;
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        let object_id = r.read_i32()?;
        let name = r.read_string(max_prealloc)?;
        let count = read_count(r, max_prealloc, "member count")?;
        let mut member_names = Vec::with_capacity(count);
        for _ in 0..count {
            member_names.push(r.read_string(max_prealloc)?);
        }
        Ok(Self {
            object_id,
            name,
            member_names,
        })
    }
}

/// A member or element type as it appears on the wire, with library
/// references resolved to ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    /// Inline primitive of the given code.
    Primitive(PrimitiveTag),
    /// String reference.
    String,
    /// Untyped object reference.
    Object,
    /// Core-library class, by name.
    SystemClass(String),
    /// Library-qualified class, by name and library id.
    Class {
        /// Class name.
        name: String,
        /// Id of a previously declared library record.
        library_id: i32,
    },
    /// Array of object references.
    ObjectArray,
    /// Array of strings.
    StringArray,
    /// Array of one primitive type.
    PrimitiveArray(PrimitiveTag),
}

impl WireType {
    /// The type-tag byte this declaration starts with.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Primitive(_) => TypeTag::Primitive,
            Self::String => TypeTag::String,
            Self::Object => TypeTag::Object,
            Self::SystemClass(_) => TypeTag::SystemClass,
            Self::Class { .. } => TypeTag::Class,
            Self::ObjectArray => TypeTag::ObjectArray,
            Self::StringArray => TypeTag::StringArray,
            Self::PrimitiveArray(_) => TypeTag::PrimitiveArray,
        }
    }

    fn encode_tag<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(self.type_tag() as u8)
    }

    fn encode_extra<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        match self {
            Self::Primitive(tag) | Self::PrimitiveArray(tag) => w.write_u8(*tag as u8),
            Self::SystemClass(name) => w.write_string(name),
            Self::Class { name, library_id } => {
                w.write_string(name)?;
                w.write_i32(*library_id)
            }
            Self::String | Self::Object | Self::ObjectArray | Self::StringArray => Ok(()),
        }
    }

    fn decode_extra<R: Read>(
        tag: TypeTag,
        r: &mut WireReader<R>,
        max_prealloc: usize,
    ) -> Result<Self> {
        Ok(match tag {
            TypeTag::Primitive => Self::Primitive(PrimitiveTag::from_u8(r.read_u8()?)?),
            TypeTag::String => Self::String,
            TypeTag::Object => Self::Object,
            TypeTag::SystemClass => Self::SystemClass(r.read_string(max_prealloc)?),
            TypeTag::Class => Self::Class {
                name: r.read_string(max_prealloc)?,
                library_id: r.read_i32()?,
            },
            TypeTag::ObjectArray => Self::ObjectArray,
            TypeTag::StringArray => Self::StringArray,
            TypeTag::PrimitiveArray => Self::PrimitiveArray(PrimitiveTag::from_u8(r.read_u8()?)?),
        })
    }

    /// Encodes a standalone (tag + extra) declaration, as used by the
    /// general array record.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        self.encode_tag(w)?;
        self.encode_extra(w)
    }

    /// Decodes a standalone (tag + extra) declaration.
    pub fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        let tag = TypeTag::from_u8(r.read_u8()?)?;
        Self::decode_extra(tag, r, max_prealloc)
    }
}

/// Writes a member-type table in its split wire layout: all tag bytes
/// first, then all additional-info payloads.
pub fn write_member_types<W: Write>(w: &mut WireWriter<W>, types: &[WireType]) -> Result<()> {
    for ty in types {
        ty.encode_tag(w)?;
    }
    for ty in types {
        ty.encode_extra(w)?;
    }
    Ok(())
}

/// Reads a member-type table in its split wire layout.
pub fn read_member_types<R: Read>(
    r: &mut WireReader<R>,
    count: usize,
    max_prealloc: usize,
) -> Result<Vec<WireType>> {
    let mut tags = Vec::with_capacity(count);
    for _ in 0..count {
        tags.push(TypeTag::from_u8(r.read_u8()?)?);
    }
    tags.into_iter()
        .map(|tag| WireType::decode_extra(tag, r, max_prealloc))
        .collect()
}

/// A class record in any of its four schema flavors.
///
/// `types` is present for the self-describing (typed) flavors, `library_id`
/// for the library-qualified flavors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    /// Common prefix: object id, class name, member names.
    pub info: ClassInfo,
    /// Per-member wire types (typed flavors only).
    pub types: Option<Vec<WireType>>,
    /// Declaring library id (library-qualified flavors only).
    pub library_id: Option<i32>,
}

impl ClassRecord {
    /// The record tag this flavor combination encodes as.
    pub fn tag(&self) -> RecordTag {
        match (&self.types, &self.library_id) {
            (Some(_), Some(_)) => RecordTag::ClassWithMembersAndTypes,
            (Some(_), None) => RecordTag::SystemClassWithMembersAndTypes,
            (None, Some(_)) => RecordTag::ClassWithMembers,
            (None, None) => RecordTag::SystemClassWithMembers,
        }
    }

    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(self.tag().as_u8())?;
        self.info.encode(w)?;
        if let Some(types) = &self.types {
            write_member_types(w, types)?;
        }
        if let Some(library_id) = self.library_id {
            w.write_i32(library_id)?;
        }
        Ok(())
    }

    fn decode<R: Read>(
        tag: RecordTag,
        r: &mut WireReader<R>,
        max_prealloc: usize,
    ) -> Result<Self> {
        let info = ClassInfo::decode(r, max_prealloc)?;
        let typed = matches!(
            tag,
            RecordTag::SystemClassWithMembersAndTypes | RecordTag::ClassWithMembersAndTypes
        );
        let qualified = matches!(
            tag,
            RecordTag::ClassWithMembers | RecordTag::ClassWithMembersAndTypes
        );
        let types = if typed {
            Some(read_member_types(r, info.member_names.len(), max_prealloc)?)
        } else {
            None
        };
        let library_id = if qualified { Some(r.read_i32()?) } else { None };
        Ok(Self {
            info,
            types,
            library_id,
        })
    }
}

/// An object whose schema was emitted earlier: carries only its own id
/// and the id of the instance that carried the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassWithIdRecord {
    /// This instance's object id.
    pub object_id: i32,
    /// Object id of the record that carried the schema.
    pub metadata_id: i32,
}

impl ClassWithIdRecord {
    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::ClassWithId.as_u8())?;
        w.write_i32(self.object_id)?;
        w.write_i32(self.metadata_id)
    }

    fn decode<R: Read>(r: &mut WireReader<R>) -> Result<Self> {
        Ok(Self {
            object_id: r.read_i32()?,
            metadata_id: r.read_i32()?,
        })
    }
}

/// A string instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStringRecord {
    /// The string's object id.
    pub object_id: i32,
    /// The string value.
    pub value: String,
}

impl ObjectStringRecord {
    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::ObjectString.as_u8())?;
        w.write_i32(self.object_id)?;
        w.write_string(&self.value)
    }

    fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        Ok(Self {
            object_id: r.read_i32()?,
            value: r.read_string(max_prealloc)?,
        })
    }
}

/// A primitive value in an object-typed position, self-tagged.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberPrimitiveTypedRecord {
    /// The carried value.
    pub value: Primitive,
}

impl MemberPrimitiveTypedRecord {
    /// Writes tag + primitive code + raw value.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::MemberPrimitiveTyped.as_u8())?;
        w.write_u8(self.value.tag() as u8)?;
        self.value.encode(w)
    }

    fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        let tag = PrimitiveTag::from_u8(r.read_u8()?)?;
        Ok(Self {
            value: Primitive::decode(tag, r, max_prealloc)?,
        })
    }
}

/// A reference to an object id (possibly one not yet emitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberReferenceRecord {
    /// The referenced object id.
    pub id_ref: i32,
}

impl MemberReferenceRecord {
    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::MemberReference.as_u8())?;
        w.write_i32(self.id_ref)
    }

    fn decode<R: Read>(r: &mut WireReader<R>) -> Result<Self> {
        Ok(Self {
            id_ref: r.read_i32()?,
        })
    }
}

/// Encodes a run of `count` consecutive nulls in the most compact form:
/// a single-null record, a one-byte-counted run, or a four-byte-counted
/// run.
pub fn encode_null_run<W: Write>(w: &mut WireWriter<W>, count: usize) -> Result<()> {
    match count {
        0 => Ok(()),
        1 => w.write_u8(RecordTag::ObjectNull.as_u8()),
        2..=255 => {
            w.write_u8(RecordTag::ObjectNullMultiple256.as_u8())?;
            w.write_u8(count as u8)
        }
        _ => {
            w.write_u8(RecordTag::ObjectNullMultiple.as_u8())?;
            let count = i32::try_from(count).map_err(|_| {
                KnotcodeError::malformed("null run exceeds the wire limit".to_string())
            })?;
            w.write_i32(count)
        }
    }
}

/// The (object id, element count) prefix shared by the specialized
/// rank-1 array records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayInfo {
    /// The array's object id.
    pub object_id: i32,
    /// Element count.
    pub length: i32,
}

impl ArrayInfo {
    /// Writes the (id, length) pair. The specialized string and object
    /// array records are nothing but a tag followed by these fields.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_i32(self.object_id)?;
        w.write_i32(self.length)
    }

    fn decode<R: Read>(r: &mut WireReader<R>) -> Result<Self> {
        let info = Self {
            object_id: r.read_i32()?,
            length: r.read_i32()?,
        };
        if info.length < 0 {
            return Err(KnotcodeError::malformed(format!(
                "negative array length {}",
                info.length
            )));
        }
        Ok(info)
    }
}

/// The fully general array header: any rank, any kind, optional lower
/// bounds, explicit element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArrayRecord {
    /// The array's object id.
    pub object_id: i32,
    /// Shape discriminator.
    pub kind: ArrayKind,
    /// Per-dimension lengths.
    pub lengths: Vec<i32>,
    /// Per-dimension lower bounds (offset kinds only).
    pub lower_bounds: Option<Vec<i32>>,
    /// Element type declaration.
    pub element: WireType,
}

impl BinaryArrayRecord {
    /// Writes tag + body.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::BinaryArray.as_u8())?;
        w.write_i32(self.object_id)?;
        w.write_u8(self.kind as u8)?;
        let rank = i32::try_from(self.lengths.len())
            .map_err(|_| KnotcodeError::malformed("array rank exceeds the wire limit".to_string()))?;
        w.write_i32(rank)?;
        for len in &self.lengths {
            w.write_i32(*len)?;
        }
        if let Some(bounds) = &self.lower_bounds {
            for bound in bounds {
                w.write_i32(*bound)?;
            }
        }
        self.element.encode(w)
    }

    fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        let object_id = r.read_i32()?;
        let kind = ArrayKind::from_u8(r.read_u8()?)?;
        let rank = read_count(r, max_prealloc, "array rank")?;
        if rank == 0 {
            return Err(KnotcodeError::malformed("array rank of zero".to_string()));
        }
        let mut lengths = Vec::with_capacity(rank);
        for _ in 0..rank {
            let len = r.read_i32()?;
            if len < 0 {
                return Err(KnotcodeError::malformed(format!(
                    "negative array dimension length {len}"
                )));
            }
            lengths.push(len);
        }
        let lower_bounds = if kind.has_lower_bounds() {
            let mut bounds = Vec::with_capacity(rank);
            for _ in 0..rank {
                bounds.push(r.read_i32()?);
            }
            Some(bounds)
        } else {
            None
        };
        let element = WireType::decode(r, max_prealloc)?;
        Ok(Self {
            object_id,
            kind,
            lengths,
            lower_bounds,
            element,
        })
    }
}

/// One specialized rank-1 array header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArraySinglePrimitiveRecord {
    /// Id and length.
    pub info: ArrayInfo,
    /// The single element type; values follow as a raw block.
    pub element: PrimitiveTag,
}

impl ArraySinglePrimitiveRecord {
    /// Writes tag + body (element payload follows separately).
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<()> {
        w.write_u8(RecordTag::ArraySinglePrimitive.as_u8())?;
        self.info.encode(w)?;
        w.write_u8(self.element as u8)
    }

    fn decode<R: Read>(r: &mut WireReader<R>) -> Result<Self> {
        Ok(Self {
            info: ArrayInfo::decode(r)?,
            element: PrimitiveTag::from_u8(r.read_u8()?)?,
        })
    }
}

/// A decoded record header, produced by the tag-dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// Stream header.
    Header(HeaderRecord),
    /// Library declaration.
    Library(LibraryRecord),
    /// Any of the four schema-carrying class flavors.
    Class(ClassRecord),
    /// Schema back-reference class record.
    ClassWithId(ClassWithIdRecord),
    /// String instance.
    ObjectString(ObjectStringRecord),
    /// General array header.
    BinaryArray(BinaryArrayRecord),
    /// Self-tagged primitive value.
    MemberPrimitiveTyped(MemberPrimitiveTypedRecord),
    /// Reference to an object id.
    MemberReference(MemberReferenceRecord),
    /// A run of nulls (count 1 for the single-null record).
    NullRun {
        /// Number of consecutive nulls this record stands for.
        count: usize,
    },
    /// End of stream.
    MessageEnd,
    /// Rank-1 zero-bound primitive array header.
    ArraySinglePrimitive(ArraySinglePrimitiveRecord),
    /// Rank-1 zero-bound object array header.
    ArraySingleObject(ArrayInfo),
    /// Rank-1 zero-bound string array header.
    ArraySingleString(ArrayInfo),
}

impl Record {
    /// Reads one tag byte and decodes the corresponding record header.
    pub fn decode<R: Read>(r: &mut WireReader<R>, max_prealloc: usize) -> Result<Self> {
        let tag = RecordTag::from_u8(r.read_u8()?)?;
        Self::decode_body(tag, r, max_prealloc)
    }

    /// Decodes a record body for an already-consumed tag.
    pub fn decode_body<R: Read>(
        tag: RecordTag,
        r: &mut WireReader<R>,
        max_prealloc: usize,
    ) -> Result<Self> {
        Ok(match tag {
            RecordTag::Header => Self::Header(HeaderRecord::decode(r)?),
            RecordTag::Library => Self::Library(LibraryRecord::decode(r, max_prealloc)?),
            RecordTag::ClassWithId => Self::ClassWithId(ClassWithIdRecord::decode(r)?),
            RecordTag::SystemClassWithMembers
            | RecordTag::ClassWithMembers
            | RecordTag::SystemClassWithMembersAndTypes
            | RecordTag::ClassWithMembersAndTypes => {
                Self::Class(ClassRecord::decode(tag, r, max_prealloc)?)
            }
            RecordTag::ObjectString => {
                Self::ObjectString(ObjectStringRecord::decode(r, max_prealloc)?)
            }
            RecordTag::BinaryArray => Self::BinaryArray(BinaryArrayRecord::decode(r, max_prealloc)?),
            RecordTag::MemberPrimitiveTyped => {
                Self::MemberPrimitiveTyped(MemberPrimitiveTypedRecord::decode(r, max_prealloc)?)
            }
            RecordTag::MemberReference => {
                Self::MemberReference(MemberReferenceRecord::decode(r)?)
            }
            RecordTag::ObjectNull => Self::NullRun { count: 1 },
            RecordTag::ObjectNullMultiple256 => {
                let count = r.read_u8()?;
                if count == 0 {
                    return Err(KnotcodeError::malformed(
                        "non-positive null run count 0".to_string(),
                    ));
                }
                Self::NullRun {
                    count: usize::from(count),
                }
            }
            RecordTag::ObjectNullMultiple => {
                let count = r.read_i32()?;
                if count <= 0 {
                    return Err(KnotcodeError::malformed(format!(
                        "non-positive null run count {count}"
                    )));
                }
                Self::NullRun {
                    count: count as usize,
                }
            }
            RecordTag::MessageEnd => Self::MessageEnd,
            RecordTag::ArraySinglePrimitive => {
                Self::ArraySinglePrimitive(ArraySinglePrimitiveRecord::decode(r)?)
            }
            RecordTag::ArraySingleObject => Self::ArraySingleObject(ArrayInfo::decode(r)?),
            RecordTag::ArraySingleString => Self::ArraySingleString(ArrayInfo::decode(r)?),
            RecordTag::CrossDomainMap
            | RecordTag::CrossDomainString
            | RecordTag::CrossDomainAssembly => {
                return Err(KnotcodeError::malformed(format!(
                    "unsupported cross-domain record (tag {})",
                    tag.as_u8()
                )))
            }
        })
    }

    /// Short name for diagnostics and the stream inspector.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Header(_) => "Header",
            Self::Library(_) => "Library",
            Self::Class(c) => match c.tag() {
                RecordTag::ClassWithMembersAndTypes => "ClassWithMembersAndTypes",
                RecordTag::SystemClassWithMembersAndTypes => "SystemClassWithMembersAndTypes",
                RecordTag::ClassWithMembers => "ClassWithMembers",
                _ => "SystemClassWithMembers",
            },
            Self::ClassWithId(_) => "ClassWithId",
            Self::ObjectString(_) => "ObjectString",
            Self::BinaryArray(_) => "BinaryArray",
            Self::MemberPrimitiveTyped(_) => "MemberPrimitiveTyped",
            Self::MemberReference(_) => "MemberReference",
            Self::NullRun { .. } => "NullRun",
            Self::MessageEnd => "MessageEnd",
            Self::ArraySinglePrimitive(_) => "ArraySinglePrimitive",
            Self::ArraySingleObject(_) => "ArraySingleObject",
            Self::ArraySingleString(_) => "ArraySingleString",
        }
    }
}

/// Reads a non-negative i32 count, guarded against hostile values.
fn read_count<R: Read>(
    r: &mut WireReader<R>,
    max_prealloc: usize,
    what: &str,
) -> Result<usize> {
    let raw = r.read_i32()?;
    if raw < 0 {
        return Err(KnotcodeError::malformed(format!("negative {what} {raw}")));
    }
    let count = raw as usize;
    if count > max_prealloc {
        return Err(KnotcodeError::malformed(format!(
            "{what} {count} exceeds the preallocation cap of {max_prealloc}"
        )));
    }
    Ok(count)
}
