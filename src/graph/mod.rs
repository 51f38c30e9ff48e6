//! The arena object-graph model shared by the writer and the parser.
//!
//! This module defines the [`ObjectGraph`] arena, the node and value
//! types stored in it, and the strong id types used to refer to nodes
//! (arena-local [`NodeId`]) and to wire identities ([`ObjectId`]).

/// Defines the `ObjectGraph` arena.
pub mod core;
/// Defines the `NodeId` and `ObjectId` types.
pub mod id;
/// Defines node, value, and shape types.
pub mod node;

pub use self::core::ObjectGraph;
pub use id::{NodeId, ObjectId};
pub use node::{
    ArrayInstance, ArrayShape, GraphNode, ObjectInstance, Primitive, SlotLocator, Value,
};
