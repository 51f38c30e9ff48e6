//! Tools for inspecting the physical structure of record streams.
//! Useful for debugging interop issues and verifying what a producer
//! actually emitted.
//!
//! The inspector walks records without materializing a graph, so it
//! reports on streams the full parser would reject for graph-level
//! reasons (dangling references, missing roots). It needs the
//! self-describing schema flavors: without member types it cannot tell
//! raw primitive bytes from record boundaries.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;

use crate::api::DEFAULT_MAX_PREALLOC;
use crate::error::{KnotcodeError, Result};
use crate::graph::Primitive;
use crate::io::WireReader;
use crate::records::Record;
use crate::schema::MemberType;

/// A structural report of one record stream.
#[derive(Debug, Serialize)]
pub struct StreamReport {
    /// Total stream size in bytes.
    pub stream_size: u64,
    /// Root object id from the header record.
    pub root_id: i32,
    /// Wire (major, minor) version.
    pub version: (i32, i32),
    /// Number of records, header and end marker included.
    pub record_count: usize,
    /// Every record in stream order.
    pub records: Vec<RecordInfo>,
}

/// Metadata for a single record in the stream.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Byte offset of the record's tag.
    pub offset: u64,
    /// Record kind name.
    pub kind: String,
    /// The record's object id, when it carries one.
    pub object_id: Option<i32>,
    /// Container nesting depth at which the record appeared.
    pub depth: usize,
    /// Kind-specific extra detail.
    pub detail: Option<String>,
}

/// Tracks how many value slots of an open container remain, and which
/// of them are raw inline primitives.
enum SkipFrame {
    Object { types: Vec<MemberType>, next: usize },
    Array { remaining: usize },
}

/// The stream inspection tool.
#[derive(Debug)]
pub struct StreamInspector;

impl StreamInspector {
    /// Analyzes a file and returns a structural report.
    pub fn inspect_file<P: AsRef<Path>>(path: P) -> Result<StreamReport> {
        let file = File::open(path)?;

        // Safety: same trade-off as the load path; we assume the file
        // is not modified underneath us.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Self::inspect_slice(&mmap)
    }

    /// Analyzes an in-memory stream and returns a structural report.
    pub fn inspect_slice(bytes: &[u8]) -> Result<StreamReport> {
        let cap = DEFAULT_MAX_PREALLOC;
        let mut r = WireReader::new(bytes);

        let Record::Header(header) = Record::decode(&mut r, cap)? else {
            return Err(KnotcodeError::malformed(
                "stream does not start with a header record".to_string(),
            ));
        };
        let mut records = vec![RecordInfo {
            offset: 0,
            kind: "Header".to_string(),
            object_id: Some(header.root_id),
            depth: 0,
            detail: Some(format!("version {}.{}", header.major, header.minor)),
        }];

        let mut stack: Vec<SkipFrame> = Vec::new();
        let mut metadata: Vec<(i32, Vec<MemberType>)> = Vec::new();
        loop {
            Self::skip_inline(&mut r, &mut stack, cap)?;
            let offset = r.position();
            let record = Record::decode(&mut r, cap)?;
            let depth = stack.len();
            let done = matches!(record, Record::MessageEnd);
            let info = Self::describe(&record, offset, depth);
            records.push(info);
            if done {
                break;
            }
            Self::advance(&mut r, record, &mut stack, &mut metadata, cap)?;
        }

        Ok(StreamReport {
            stream_size: r.position(),
            root_id: header.root_id,
            version: (header.major, header.minor),
            record_count: records.len(),
            records,
        })
    }

    fn describe(record: &Record, offset: u64, depth: usize) -> RecordInfo {
        let (object_id, detail) = match record {
            Record::Library(lib) => (Some(lib.library_id), Some(lib.name.clone())),
            Record::Class(class) => (
                Some(class.info.object_id),
                Some(format!(
                    "{} ({} member(s))",
                    class.info.name,
                    class.info.member_names.len()
                )),
            ),
            Record::ClassWithId(class) => (
                Some(class.object_id),
                Some(format!("schema from @{}", class.metadata_id)),
            ),
            Record::ObjectString(s) => {
                let mut preview: String = s.value.chars().take(32).collect();
                if preview.len() < s.value.len() {
                    preview.push('…');
                }
                (Some(s.object_id), Some(format!("{preview:?}")))
            }
            Record::BinaryArray(array) => (
                Some(array.object_id),
                Some(format!("{:?} {:?}", array.kind, array.lengths)),
            ),
            Record::ArraySinglePrimitive(array) => (
                Some(array.info.object_id),
                Some(format!("{:?} x {}", array.element, array.info.length)),
            ),
            Record::ArraySingleObject(info) | Record::ArraySingleString(info) => {
                (Some(info.object_id), Some(format!("x {}", info.length)))
            }
            Record::MemberReference(reference) => {
                (None, Some(format!("-> @{}", reference.id_ref)))
            }
            Record::MemberPrimitiveTyped(prim) => (None, Some(format!("{:?}", prim.value))),
            Record::NullRun { count } => (None, Some(format!("x {count}"))),
            Record::Header(h) => (Some(h.root_id), None),
            Record::MessageEnd => (None, None),
        };
        RecordInfo {
            offset,
            kind: record.kind_name().to_string(),
            object_id,
            depth,
            detail,
        }
    }

    /// Consumes raw inline primitive values while the top frame expects
    /// them, dropping finished frames.
    fn skip_inline<R: std::io::Read>(
        r: &mut WireReader<R>,
        stack: &mut Vec<SkipFrame>,
        cap: usize,
    ) -> Result<()> {
        loop {
            let finished = match stack.last() {
                Some(SkipFrame::Object { types, next }) => *next >= types.len(),
                Some(SkipFrame::Array { remaining }) => *remaining == 0,
                None => false,
            };
            if finished {
                stack.pop();
                continue;
            }
            let tag = match stack.last() {
                Some(SkipFrame::Object { types, next }) => match &types[*next] {
                    MemberType::Primitive(tag) => *tag,
                    _ => return Ok(()),
                },
                _ => return Ok(()),
            };
            Primitive::decode(tag, r, cap)?;
            if let Some(SkipFrame::Object { next, .. }) = stack.last_mut() {
                *next += 1;
            }
        }
    }

    /// Applies a record's structural effect: claim a slot of the
    /// enclosing frame, open a new frame, consume a raw payload.
    fn advance<R: std::io::Read>(
        r: &mut WireReader<R>,
        record: Record,
        stack: &mut Vec<SkipFrame>,
        metadata: &mut Vec<(i32, Vec<MemberType>)>,
        cap: usize,
    ) -> Result<()> {
        let claim = |stack: &mut Vec<SkipFrame>| match stack.last_mut() {
            Some(SkipFrame::Object { next, .. }) => *next += 1,
            Some(SkipFrame::Array { remaining }) => *remaining -= 1,
            None => {}
        };
        match record {
            Record::Header(_) | Record::Library(_) | Record::MessageEnd => {}
            Record::ObjectString(_) | Record::MemberReference(_) => claim(stack),
            Record::MemberPrimitiveTyped(_) => claim(stack),
            Record::NullRun { count } => match stack.last_mut() {
                Some(SkipFrame::Object { next, .. }) => *next += 1,
                Some(SkipFrame::Array { remaining }) => {
                    if count > *remaining {
                        return Err(KnotcodeError::malformed(format!(
                            "null run of {count} overruns array with {remaining} slot(s) left"
                        )));
                    }
                    *remaining -= count;
                }
                None => {}
            },
            Record::Class(class) => {
                let types = class.types.clone().ok_or_else(|| {
                    KnotcodeError::TypeResolution(format!(
                        "untyped class record for `{}` cannot be inspected",
                        class.info.name
                    ))
                })?;
                let types: Vec<MemberType> = types
                    .iter()
                    .map(|ty| match ty {
                        crate::records::WireType::Primitive(tag) => MemberType::Primitive(*tag),
                        _ => MemberType::Object,
                    })
                    .collect();
                metadata.push((class.info.object_id, types.clone()));
                claim(stack);
                stack.push(SkipFrame::Object { types, next: 0 });
            }
            Record::ClassWithId(class) => {
                let types = metadata
                    .iter()
                    .rev()
                    .find(|(id, _)| *id == class.metadata_id)
                    .map(|(_, types)| types.clone())
                    .ok_or_else(|| {
                        KnotcodeError::malformed(format!(
                            "schema back-reference to unknown metadata id {}",
                            class.metadata_id
                        ))
                    })?;
                claim(stack);
                stack.push(SkipFrame::Object { types, next: 0 });
            }
            Record::ArraySinglePrimitive(array) => {
                claim(stack);
                for _ in 0..array.info.length {
                    Primitive::decode(array.element, r, cap)?;
                }
            }
            Record::ArraySingleObject(info) | Record::ArraySingleString(info) => {
                claim(stack);
                stack.push(SkipFrame::Array {
                    remaining: info.length as usize,
                });
            }
            Record::BinaryArray(array) => {
                claim(stack);
                let flat = array
                    .lengths
                    .iter()
                    .try_fold(1usize, |acc, &len| acc.checked_mul(len as usize))
                    .ok_or_else(|| {
                        KnotcodeError::malformed("array element count overflows".to_string())
                    })?;
                if let crate::records::WireType::Primitive(tag) = array.element {
                    for _ in 0..flat {
                        Primitive::decode(tag, r, cap)?;
                    }
                } else {
                    stack.push(SkipFrame::Array { remaining: flat });
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for StreamReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== KNOTCODE STREAM REPORT ===")?;
        writeln!(f, "Stream Size:  {} bytes", self.stream_size)?;
        writeln!(f, "Root Id:      @{}", self.root_id)?;
        writeln!(f, "Version:      {}.{}", self.version.0, self.version.1)?;
        writeln!(f, "\n[RECORDS]")?;
        for record in &self.records {
            let indent = "  ".repeat(record.depth);
            let id = record
                .object_id
                .map(|id| format!(" @{id}"))
                .unwrap_or_default();
            let detail = record
                .detail
                .as_deref()
                .map(|d| format!("  {d}"))
                .unwrap_or_default();
            writeln!(
                f,
                "{:>8}  {indent}{}{id}{detail}",
                record.offset, record.kind
            )?;
        }
        Ok(())
    }
}
