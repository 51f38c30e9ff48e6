//! # Knotcode
//!
//! A binary object-graph serialization engine: arbitrary graphs of
//! class instances, arrays, and strings, with shared references,
//! cycles, and self-describing schemas, linearized into a tagged
//! record stream and materialized back.
//!
//! ## Overview
//!
//! Knotcode does not serialize values; it serializes *graphs*. The unit
//! of work is an [`ObjectGraph`]: an arena of nodes where every member
//! or element slot holds a null, an inline primitive, or a reference to
//! another node. Two slots referring to the same node stay the same
//! node after a round trip, and a node may reach itself through any
//! chain of references.
//!
//! ### Key Features
//!
//! *   **Identity-preserving:** shared references and cycles survive
//!     round trips intact; sharing topology is part of the data.
//! *   **Self-describing streams:** each class emits its schema (member
//!     names and types) once, and later instances ride on a compact
//!     schema back-reference.
//! *   **One-pass reading:** forward references are resolved through a
//!     deferred fixup table, so the parser never rewinds the input.
//! *   **Array-shape coverage:** rank-1, jagged, and rectangular arrays,
//!     with optional non-zero lower bounds, plus a block fast path for
//!     fixed-width primitive arrays.
//! *   **Pluggable seams:** type binders remap names between producers
//!     and consumers, surrogate codecs replace field enumeration for
//!     selected types, and lifecycle sinks observe both directions.
//! *   **Hostile-input hardening:** every wire-declared length is
//!     checked against an allocation cap before memory is committed.
//!
//! ## Architecture
//!
//! ### The Graph Model
//!
//! [`graph::ObjectGraph`] is the central structure on both sides: an
//! arena addressed by [`graph::NodeId`], with references represented
//! strictly as id plus arena lookup. Wire identity is separate:
//! [`graph::ObjectId`] numbers nodes on the wire, with a reserved
//! negative range for value-type instances that are nested per
//! occurrence instead of shared.
//!
//! ### Write Side
//!
//! The [`writer`] module linearizes a graph breadth-first. Reference
//! slots emit a `MemberReference` stand-in and schedule the target as a
//! later top-level record; strings are inlined at first sight and
//! referenced afterwards; value-type instances nest inline every time.
//!
//! ### Read Side
//!
//! The [`parser`] module is a frame-stack state machine. Each object or
//! array record registers a shell node immediately, so back-references
//! into in-progress containers resolve without special casing; only
//! references to ids not yet seen become fixups, replayed when the
//! target completes. A stream that ends with unresolved fixups is
//! rejected.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use knotcode::{DecodeOptions, EncodeOptions, Knotcode, ObjectGraph, Value};
//! use knotcode::schema::{ClassSchema, MemberType};
//! use knotcode::format::PrimitiveTag;
//! use std::sync::Arc;
//!
//! let mut graph = ObjectGraph::new();
//! let class = Arc::new(
//!     ClassSchema::new("Point")
//!         .with_member("x", MemberType::Primitive(PrimitiveTag::Int32))
//!         .with_member("y", MemberType::Primitive(PrimitiveTag::Int32)),
//! );
//! let point = graph.add_object(class, vec![Value::int32(3), Value::int32(4)])?;
//! graph.set_root(point);
//!
//! let bytes = Knotcode::encode_to_vec(&graph, &EncodeOptions::new())?;
//! let back = Knotcode::decode_slice(&bytes, &DecodeOptions::new())?;
//! assert!(graph.structurally_eq(&back));
//! ```
//!
//! ### Safety and Error Handling
//!
//! * **No unsafe:** the only `unsafe` blocks are the memory-map calls
//!   in the file load and inspection paths.
//! * **No panics:** no `unwrap()` or `panic!()` calls in the library
//!   (enforced by clippy lints).
//! * **Comprehensive errors:** all failures correspond to a
//!   [`KnotcodeError`] variant; malformed input is always an error,
//!   never undefined behavior.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod api;
pub mod error;
pub mod format;
pub mod hooks;
pub mod inspector;
pub mod schema;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod arrays;
#[doc(hidden)]
pub mod fixup;
#[doc(hidden)]
pub mod graph;
#[doc(hidden)]
pub mod io;
#[doc(hidden)]
pub mod parser;
#[doc(hidden)]
pub mod records;
#[doc(hidden)]
pub mod writer;

// --- RE-EXPORTS ---

pub use api::{DecodeOptions, EncodeOptions, Knotcode, DEFAULT_MAX_PREALLOC};
pub use error::{KnotcodeError, Result};
pub use graph::{
    ArrayInstance, ArrayShape, GraphNode, NodeId, ObjectGraph, ObjectId, ObjectInstance,
    Primitive, Value,
};
pub use hooks::{BagEntry, Binder, CustomCodec, LifecycleSink, SurrogateSelector};
pub use inspector::StreamInspector;
pub use schema::{ClassSchema, MemberSchema, MemberType, TypeRegistry};
