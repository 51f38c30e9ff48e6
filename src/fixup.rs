//! The Fixup & Identity Manager.
//!
//! Write side: [`IdDispenser`] assigns wire object ids in visitation
//! order. Shared reference-typed instances get each exactly one
//! positive id; value-type instances draw from the reserved negative
//! range and are never deduplicated (a legacy wire-compatibility
//! behavior, preserved observably).
//!
//! Read side: [`ObjectTracker`] maps wire ids to arena nodes as their
//! records start, records a [`Fixup`] for every reference whose target
//! id has not been seen yet, and replays those fixups through the
//! container + locator slot write once the target completes. A decode
//! may only succeed with zero outstanding fixups.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{KnotcodeError, Result};
use crate::graph::{NodeId, ObjectGraph, ObjectId, SlotLocator, Value};

/// Assigns wire identities during one encode operation.
#[derive(Debug)]
pub struct IdDispenser {
    next_shared: i32,
    next_value: i32,
    assigned: HashMap<NodeId, ObjectId>,
}

impl IdDispenser {
    /// A fresh dispenser; shared ids count up from 1, value-instance
    /// ids count down from -1.
    pub fn new() -> Self {
        Self {
            next_shared: 1,
            next_value: -1,
            assigned: HashMap::new(),
        }
    }

    /// Returns the node's id, assigning the next positive id on first
    /// sight. The flag is true exactly when the id is fresh (the node
    /// still has to be emitted).
    pub fn get_or_assign(&mut self, node: NodeId) -> (ObjectId, bool) {
        if let Some(id) = self.assigned.get(&node) {
            return (*id, false);
        }
        let id = ObjectId::new(self.next_shared);
        self.next_shared += 1;
        self.assigned.insert(node, id);
        (id, true)
    }

    /// Draws a fresh id from the reserved negative range. Value-type
    /// instances take one per emission and are never shared.
    pub fn assign_value_instance(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_value);
        self.next_value -= 1;
        id
    }

    /// Draws a fresh positive id with no node association. Library
    /// records share the id space with object records.
    pub fn fresh_shared(&mut self) -> ObjectId {
        let id = ObjectId::new(self.next_shared);
        self.next_shared += 1;
        id
    }

    /// The id previously assigned to a node, if any.
    pub fn lookup(&self, node: NodeId) -> Option<ObjectId> {
        self.assigned.get(&node).copied()
    }
}

impl Default for IdDispenser {
    fn default() -> Self {
        Self::new()
    }
}

/// A deferred reference patch: when `pending` materializes, write a
/// reference to it into `locator` of `container`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    /// The node owning the slot to patch.
    pub container: NodeId,
    /// The slot within the container.
    pub locator: SlotLocator,
    /// The not-yet-seen object id the slot refers to.
    pub pending: ObjectId,
}

/// Tracks wire-id-to-node mapping and outstanding fixups during one
/// decode operation.
#[derive(Debug, Default)]
pub struct ObjectTracker {
    nodes: HashMap<i32, NodeId>,
    pending: HashMap<i32, Vec<Fixup>>,
}

impl ObjectTracker {
    /// A fresh tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a wire id to its arena node. Called when the id's record
    /// starts, before the instance is complete. A duplicate id is a
    /// corrupted stream.
    pub fn register(&mut self, id: ObjectId, node: NodeId) -> Result<()> {
        if id.is_null() {
            return Err(KnotcodeError::malformed(
                "object id 0 is reserved for null".to_string(),
            ));
        }
        if self.nodes.insert(id.as_i32(), node).is_some() {
            return Err(KnotcodeError::inconsistent(format!(
                "object id {id} assigned twice"
            )));
        }
        Ok(())
    }

    /// Looks up the node a wire id refers to; absent until the id's
    /// record has started.
    pub fn resolve(&self, id: ObjectId) -> Option<NodeId> {
        self.nodes.get(&id.as_i32()).copied()
    }

    /// Records a deferred patch for a reference whose target id has not
    /// been seen yet.
    pub fn record_fixup(&mut self, container: NodeId, locator: SlotLocator, pending: ObjectId) {
        trace!(%pending, %container, ?locator, "deferring forward reference");
        self.pending.entry(pending.as_i32()).or_default().push(Fixup {
            container,
            locator,
            pending,
        });
    }

    /// Replays every fixup waiting on `id`, patching each recorded slot
    /// with a reference to the now-materialized node. Value-typed slots
    /// are patched through the same container + locator write; no
    /// reference into the value itself is ever retained.
    pub fn complete_object(&mut self, id: ObjectId, graph: &mut ObjectGraph) -> Result<()> {
        let Some(waiting) = self.pending.remove(&id.as_i32()) else {
            return Ok(());
        };
        let target = self.resolve(id).ok_or_else(|| {
            KnotcodeError::inconsistent(format!("completed object {id} was never registered"))
        })?;
        trace!(%id, fixups = waiting.len(), "replaying fixups");
        for fixup in waiting {
            graph.set_slot(fixup.container, fixup.locator, Value::Ref(target))?;
        }
        Ok(())
    }

    /// Number of fixups still waiting on unseen ids.
    pub fn outstanding(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Verifies the zero-remainder invariant at the end of a decode.
    pub fn finish(&self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut ids: Vec<i32> = self.pending.keys().copied().collect();
        ids.sort_unstable();
        Err(KnotcodeError::inconsistent(format!(
            "{} unresolved fixup(s) referencing object id(s) {ids:?}",
            self.outstanding()
        )))
    }
}
