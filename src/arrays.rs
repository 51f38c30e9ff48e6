//! The Array Codec, shared by the writer and the parser.
//!
//! Three shapes exist on the wire: Single (rank 1, optionally with a
//! non-zero lower bound), Jagged (a rank-1 array whose rows are
//! themselves array nodes), and Rectangular (rank > 1, uniform element
//! type, stored row-major). Rectangular traversal is driven by a
//! multi-dimensional cursor that increments its least significant
//! dimension first and carries.
//!
//! Single arrays of fixed-width primitives take a byte-blit fast path:
//! the whole element block is staged and moved in one raw read or
//! write, with little-endian correction applied per element so the
//! stream is identical on either host byte order. Char and Decimal are
//! variable-width and always go element by element.

use std::io::{Read, Write};

use crate::error::{KnotcodeError, Result};
use crate::format::PrimitiveTag;
use crate::graph::{ArrayInstance, ArrayShape, Primitive, Value};
use crate::io::{WireReader, WireWriter};
use crate::schema::MemberType;

/// A multi-dimensional cursor over a rectangular array.
///
/// Coordinates advance least-significant-dimension-first with carry;
/// the flat index tracks the row-major storage position.
#[derive(Debug, Clone)]
pub struct RectCursor {
    lengths: Vec<usize>,
    coords: Vec<usize>,
    flat: usize,
    total: usize,
}

impl RectCursor {
    /// A cursor at the origin of an array with the given per-dimension
    /// lengths.
    pub fn new(lengths: Vec<usize>) -> Self {
        let total = lengths.iter().product();
        let coords = vec![0; lengths.len()];
        Self {
            lengths,
            coords,
            flat: 0,
            total,
        }
    }

    /// The row-major storage index of the current position.
    pub fn flat(&self) -> usize {
        self.flat
    }

    /// The current per-dimension coordinates.
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// True once every element has been visited.
    pub fn is_done(&self) -> bool {
        self.flat >= self.total
    }

    /// Steps to the next element: increment the last dimension, carry
    /// into the next-more-significant one on overflow.
    pub fn advance(&mut self) {
        if self.is_done() {
            return;
        }
        self.flat += 1;
        for dim in (0..self.coords.len()).rev() {
            self.coords[dim] += 1;
            if self.coords[dim] < self.lengths[dim] {
                return;
            }
            self.coords[dim] = 0;
        }
    }
}

/// Returns the fixed element width when an array qualifies for the
/// byte-blit fast path: rank 1 and a fixed-width primitive element.
pub fn blit_width(element: &MemberType, shape: &ArrayShape) -> Option<(PrimitiveTag, usize)> {
    match (element, shape) {
        (MemberType::PrimitiveArray(tag) | MemberType::Primitive(tag), ArrayShape::Single { .. }) => {
            tag.fixed_width().map(|w| (*tag, w))
        }
        _ => None,
    }
}

/// Writes a primitive element block as one raw byte move, staging each
/// element through its little-endian encoding.
pub fn write_primitive_block<W: Write>(
    w: &mut WireWriter<W>,
    tag: PrimitiveTag,
    width: usize,
    elements: &[Value],
) -> Result<()> {
    let mut block = Vec::with_capacity(elements.len() * width);
    for value in elements {
        let prim = match value {
            Value::Prim(p) if p.tag() == tag => p,
            other => {
                return Err(KnotcodeError::inconsistent(format!(
                    "primitive array of {tag:?} holds incompatible element {other:?}"
                )))
            }
        };
        stage_le(&mut block, prim);
    }
    w.write_bytes(&block)
}

fn stage_le(block: &mut Vec<u8>, prim: &Primitive) {
    match prim {
        Primitive::Boolean(v) => block.push(u8::from(*v)),
        Primitive::Byte(v) => block.push(*v),
        Primitive::SByte(v) => block.push(*v as u8),
        Primitive::Int16(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::UInt16(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::Int32(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::UInt32(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::Int64(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::UInt64(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::Single(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::Double(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::TimeSpan(v) => block.extend_from_slice(&v.to_le_bytes()),
        Primitive::DateTime(v) => block.extend_from_slice(&v.to_le_bytes()),
        // Variable-width kinds never reach the blit path.
        Primitive::Char(_) | Primitive::Decimal(_) => unreachable!("blit of variable-width primitive"),
    }
}

/// Reads a primitive element block in one raw byte move and decodes the
/// elements out of it.
pub fn read_primitive_block<R: Read>(
    r: &mut WireReader<R>,
    tag: PrimitiveTag,
    width: usize,
    len: usize,
    max_prealloc: usize,
) -> Result<Vec<Value>> {
    let bytes = len.checked_mul(width).ok_or_else(|| {
        KnotcodeError::malformed("primitive array byte length overflows".to_string())
    })?;
    if bytes > max_prealloc {
        return Err(KnotcodeError::malformed(format!(
            "primitive array of {bytes} bytes exceeds the preallocation cap of {max_prealloc}"
        )));
    }
    let mut block = vec![0u8; bytes];
    r.read_bytes(&mut block)?;
    let mut elements = Vec::with_capacity(len);
    for chunk in block.chunks_exact(width) {
        elements.push(Value::Prim(unstage_le(tag, chunk)));
    }
    Ok(elements)
}

fn unstage_le(tag: PrimitiveTag, chunk: &[u8]) -> Primitive {
    // Chunks are exactly `fixed_width(tag)` bytes; the try_intos cannot
    // fail, the fallbacks only satisfy the no-panic lint.
    let arr2 = |c: &[u8]| <[u8; 2]>::try_from(c).unwrap_or([0; 2]);
    let arr4 = |c: &[u8]| <[u8; 4]>::try_from(c).unwrap_or([0; 4]);
    let arr8 = |c: &[u8]| <[u8; 8]>::try_from(c).unwrap_or([0; 8]);
    match tag {
        PrimitiveTag::Boolean => Primitive::Boolean(chunk[0] != 0),
        PrimitiveTag::Byte => Primitive::Byte(chunk[0]),
        PrimitiveTag::SByte => Primitive::SByte(chunk[0] as i8),
        PrimitiveTag::Int16 => Primitive::Int16(i16::from_le_bytes(arr2(chunk))),
        PrimitiveTag::UInt16 => Primitive::UInt16(u16::from_le_bytes(arr2(chunk))),
        PrimitiveTag::Int32 => Primitive::Int32(i32::from_le_bytes(arr4(chunk))),
        PrimitiveTag::UInt32 => Primitive::UInt32(u32::from_le_bytes(arr4(chunk))),
        PrimitiveTag::Int64 => Primitive::Int64(i64::from_le_bytes(arr8(chunk))),
        PrimitiveTag::UInt64 => Primitive::UInt64(u64::from_le_bytes(arr8(chunk))),
        PrimitiveTag::Single => Primitive::Single(f32::from_le_bytes(arr4(chunk))),
        PrimitiveTag::Double => Primitive::Double(f64::from_le_bytes(arr8(chunk))),
        PrimitiveTag::TimeSpan => Primitive::TimeSpan(i64::from_le_bytes(arr8(chunk))),
        PrimitiveTag::DateTime => Primitive::DateTime(u64::from_le_bytes(arr8(chunk))),
        PrimitiveTag::Char | PrimitiveTag::Decimal => {
            unreachable!("blit of variable-width primitive")
        }
    }
}

/// Validates a shape/bounds combination before the writer commits the
/// array header to the stream.
pub fn check_shape(array: &ArrayInstance) -> Result<()> {
    if let ArrayShape::Rectangular { lengths, lower_bounds } = &array.shape {
        if lengths.len() < 2 {
            return Err(KnotcodeError::malformed(
                "rectangular array with rank below 2".to_string(),
            ));
        }
        if lengths.len() != lower_bounds.len() {
            return Err(KnotcodeError::malformed(
                "rectangular array with mismatched bounds table".to_string(),
            ));
        }
    }
    Ok(())
}
