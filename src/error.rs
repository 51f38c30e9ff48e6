//! Centralized error handling for Knotcode.
//!
//! Every failure in an encode or decode operation surfaces as a single
//! [`KnotcodeError`], so callers see one consistent failure surface
//! regardless of whether the root cause was the underlying stream, a
//! corrupted record, or a graph-consistency violation. There is no
//! partial result and no retry: corruption and resolution failures are
//! permanent for that stream.
//!
//! The error type is `Clone` (I/O causes are wrapped in `Arc`) so it can
//! be stored or shared without losing the original cause, which remains
//! reachable through `source()`.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Knotcode operations.
pub type Result<T> = std::result::Result<T, KnotcodeError>;

/// The master error enum covering all failure domains in Knotcode.
///
/// The variants mirror the operational taxonomy:
///
/// - **Io:** a failure reported by the borrowed stream itself.
/// - **MalformedRecord:** an unrecognized tag byte, an invalid enum
///   value, an unsupported stream version, or a record that is
///   structurally impossible in its position.
/// - **StreamTruncated:** a read that could not be completely satisfied.
/// - **TypeResolution:** a type name or module identity that no binder,
///   registration, or core-table fallback could resolve. Never silently
///   coerced.
/// - **SchemaMismatch:** a registered non-optional member absent from
///   the schema carried on the wire.
/// - **GraphConsistency:** a frame stack that was not empty at
///   end-of-stream, an unresolvable root, or a fixup left dangling when
///   the decode finished.
#[derive(Debug, Clone)]
pub enum KnotcodeError {
    /// Low-level I/O failure from the borrowed stream.
    ///
    /// Wrapped in an `Arc` to keep the error `Clone` without copying the
    /// underlying `io::Error`.
    Io(Arc<io::Error>),

    /// The stream contains bytes that cannot be a valid record.
    MalformedRecord(String),

    /// A read ran past the available bytes mid-record.
    StreamTruncated {
        /// Bytes the current read required.
        needed: usize,
        /// Bytes actually obtained before the stream ended.
        available: usize,
    },

    /// A wire-level type descriptor could not be mapped to a concrete
    /// registered type. Fatal for the operation, never retried.
    TypeResolution(String),

    /// The wire schema disagrees with a registered schema for the same
    /// type (a required member is missing).
    SchemaMismatch(String),

    /// The record stream was well-formed byte-by-byte but does not
    /// describe a complete, closed object graph.
    GraphConsistency(String),
}

impl fmt::Display for KnotcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::MalformedRecord(s) => write!(f, "Malformed Record: {s}"),
            Self::StreamTruncated { needed, available } => write!(
                f,
                "Stream Truncated: needed {needed} byte(s), {available} available"
            ),
            Self::TypeResolution(s) => write!(f, "Type Resolution Failure: {s}"),
            Self::SchemaMismatch(s) => write!(f, "Schema Mismatch: {s}"),
            Self::GraphConsistency(s) => write!(f, "Graph Consistency Error: {s}"),
        }
    }
}

impl std::error::Error for KnotcodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for KnotcodeError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl KnotcodeError {
    /// Shorthand constructor for malformed-record failures.
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Shorthand constructor for graph-consistency failures.
    pub(crate) fn inconsistent(msg: impl Into<String>) -> Self {
        Self::GraphConsistency(msg.into())
    }
}
