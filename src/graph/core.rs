use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{KnotcodeError, Result};
use crate::schema::ClassSchema;

use super::id::NodeId;
use super::node::{ArrayInstance, GraphNode, ObjectInstance, SlotLocator, Value};

/// The arena holding one object graph.
///
/// Every reference-typed instance (object, array, string) occupies one
/// exclusively-owned slot, and references between instances are node
/// ids, never aliases. A slot may refer to itself or to a slot that is
/// still being constructed, which is what makes cycles representable
/// and deferred fixups safe to apply.
///
/// The arena is scoped to a caller-visible graph value; encode walks it
/// read-only, decode builds a fresh one.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    slots: Vec<GraphNode>,
    root: Option<NodeId>,
}

impl ObjectGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node to the arena, returning its id.
    pub fn insert(&mut self, node: GraphNode) -> NodeId {
        let id = NodeId::new(u32::try_from(self.slots.len()).unwrap_or(u32::MAX));
        self.slots.push(node);
        id
    }

    /// Adds an object instance, checking the member count against the
    /// schema.
    pub fn add_object(
        &mut self,
        class: Arc<ClassSchema>,
        members: Vec<Value>,
    ) -> Result<NodeId> {
        if members.len() != class.members.len() {
            return Err(KnotcodeError::SchemaMismatch(format!(
                "type `{}` declares {} member(s), got {}",
                class.name,
                class.members.len(),
                members.len()
            )));
        }
        Ok(self.insert(GraphNode::Object(ObjectInstance { class, members })))
    }

    /// Adds a string instance.
    pub fn add_string(&mut self, value: impl Into<String>) -> NodeId {
        self.insert(GraphNode::Str(value.into()))
    }

    /// Adds an array instance.
    pub fn add_array(&mut self, array: ArrayInstance) -> NodeId {
        self.insert(GraphNode::Array(array))
    }

    /// Designates the graph's root node.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// The designated root, if any.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Retrieves a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena; ids never escape
    /// the graph they were created in.
    pub fn node(&self, id: NodeId) -> &GraphNode {
        self.try_node(id)
            .expect("ObjectGraph invariant violated: NodeId out of bounds")
    }

    /// Retrieves a node, or `None` when `id` was not minted by this
    /// arena. The fallible path for callers handling graphs they did
    /// not build.
    pub fn try_node(&self, id: NodeId) -> Option<&GraphNode> {
        self.slots.get(id.as_u32() as usize)
    }

    /// Mutable access to a node.
    ///
    /// # Panics
    ///
    /// Panics under the same condition as [`ObjectGraph::node`].
    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        self.slots
            .get_mut(id.as_u32() as usize)
            .expect("ObjectGraph invariant violated: NodeId out of bounds")
    }

    /// Iterates over all (id, node) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &GraphNode)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::new(i as u32), n))
    }

    /// Writes `value` into one slot of a container node through its
    /// locator. This is the patch path used by deferred fixups: the
    /// container is addressed by id, the slot by position, and the
    /// value is moved in whole.
    pub fn set_slot(
        &mut self,
        container: NodeId,
        locator: SlotLocator,
        value: Value,
    ) -> Result<()> {
        let node = self
            .slots
            .get_mut(container.as_u32() as usize)
            .ok_or_else(|| {
                KnotcodeError::inconsistent(format!("fixup container {container} does not exist"))
            })?;
        let slot = match (node, locator) {
            (GraphNode::Object(obj), SlotLocator::Member(i)) => obj.members.get_mut(i),
            (GraphNode::Array(arr), SlotLocator::Index(i)) => arr.elements.get_mut(i),
            (other, _) => {
                return Err(KnotcodeError::inconsistent(format!(
                    "locator {locator:?} cannot address a {} node",
                    other.kind_name()
                )))
            }
        };
        match slot {
            Some(target) => {
                *target = value;
                Ok(())
            }
            None => Err(KnotcodeError::inconsistent(format!(
                "locator {locator:?} is out of range for container {container}"
            ))),
        }
    }

    /// Structural equality from the roots: same shapes, same values,
    /// same sharing topology, ignoring arena numbering. Class schemas
    /// compare by name, library, and member declarations.
    pub fn structurally_eq(&self, other: &ObjectGraph) -> bool {
        match (self.root, other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                let mut visited: HashSet<(u32, u32)> = HashSet::new();
                let mut queue: VecDeque<(NodeId, NodeId)> = VecDeque::new();
                queue.push_back((a, b));
                while let Some((left, right)) = queue.pop_front() {
                    if !visited.insert((left.as_u32(), right.as_u32())) {
                        continue;
                    }
                    if !self.nodes_eq(other, left, right, &mut queue) {
                        return false;
                    }
                }
                true
            }
            _ => false,
        }
    }

    fn nodes_eq(
        &self,
        other: &ObjectGraph,
        left: NodeId,
        right: NodeId,
        queue: &mut VecDeque<(NodeId, NodeId)>,
    ) -> bool {
        match (self.node(left), other.node(right)) {
            (GraphNode::Str(a), GraphNode::Str(b)) => a == b,
            (GraphNode::Object(a), GraphNode::Object(b)) => {
                a.class.name == b.class.name
                    && a.class.library == b.class.library
                    && a.class.members == b.class.members
                    && values_eq(&a.members, &b.members, queue)
            }
            (GraphNode::Array(a), GraphNode::Array(b)) => {
                a.element == b.element
                    && a.shape == b.shape
                    && values_eq(&a.elements, &b.elements, queue)
            }
            _ => false,
        }
    }
}

fn values_eq(left: &[Value], right: &[Value], queue: &mut VecDeque<(NodeId, NodeId)>) -> bool {
    if left.len() != right.len() {
        return false;
    }
    for (a, b) in left.iter().zip(right) {
        match (a, b) {
            (Value::Null, Value::Null) => {}
            (Value::Prim(x), Value::Prim(y)) => {
                if x != y {
                    return false;
                }
            }
            (Value::Ref(x), Value::Ref(y)) => queue.push_back((*x, *y)),
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PrimitiveTag;
    use crate::graph::ArrayShape;
    use crate::schema::MemberType;

    fn pair_schema() -> Arc<ClassSchema> {
        Arc::new(
            ClassSchema::new("Pair")
                .with_member("left", MemberType::Primitive(PrimitiveTag::Int32))
                .with_member("right", MemberType::Object),
        )
    }

    #[test]
    fn member_count_is_checked() {
        let mut graph = ObjectGraph::new();
        let err = graph
            .add_object(pair_schema(), vec![Value::int32(1)])
            .unwrap_err();
        assert!(matches!(err, KnotcodeError::SchemaMismatch(_)));
    }

    #[test]
    fn slot_write_patches_members_and_elements() {
        let mut graph = ObjectGraph::new();
        let s = graph.add_string("patched");
        let obj = graph
            .add_object(pair_schema(), vec![Value::int32(1), Value::Null])
            .unwrap();
        graph
            .set_slot(obj, SlotLocator::Member(1), Value::Ref(s))
            .unwrap();

        let arr = graph.add_array(
            ArrayInstance::new(
                MemberType::Object,
                ArrayShape::Single {
                    len: 2,
                    lower_bound: 0,
                },
                vec![Value::Null, Value::Null],
            )
            .unwrap(),
        );
        graph
            .set_slot(arr, SlotLocator::Index(1), Value::Ref(obj))
            .unwrap();

        match graph.node(obj) {
            GraphNode::Object(o) => assert_eq!(o.members[1], Value::Ref(s)),
            _ => panic!("expected object"),
        }
        match graph.node(arr) {
            GraphNode::Array(a) => assert_eq!(a.elements[1], Value::Ref(obj)),
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn slot_write_rejects_bad_locators() {
        let mut graph = ObjectGraph::new();
        let s = graph.add_string("x");
        assert!(graph
            .set_slot(s, SlotLocator::Member(0), Value::Null)
            .is_err());
        let obj = graph
            .add_object(pair_schema(), vec![Value::int32(1), Value::Null])
            .unwrap();
        assert!(graph
            .set_slot(obj, SlotLocator::Member(5), Value::Null)
            .is_err());
    }

    #[test]
    fn structural_equality_follows_cycles() {
        let build = |tag: i32| {
            let mut g = ObjectGraph::new();
            let a = g
                .add_object(pair_schema(), vec![Value::int32(tag), Value::Null])
                .unwrap();
            // Self-cycle through the object member.
            g.set_slot(a, SlotLocator::Member(1), Value::Ref(a)).unwrap();
            g.set_root(a);
            g
        };
        assert!(build(7).structurally_eq(&build(7)));
        assert!(!build(7).structurally_eq(&build(8)));
    }

    #[test]
    fn sharing_versus_copies_compare_equal_by_value() {
        // Two distinct-but-equal strings vs one shared string: the
        // graphs are structurally equal by value.
        let shared = {
            let mut g = ObjectGraph::new();
            let s = g.add_string("dup");
            let root = g.add_array(
                ArrayInstance::new(
                    MemberType::Str,
                    ArrayShape::Single {
                        len: 2,
                        lower_bound: 0,
                    },
                    vec![Value::Ref(s), Value::Ref(s)],
                )
                .unwrap(),
            );
            g.set_root(root);
            g
        };
        let copied = {
            let mut g = ObjectGraph::new();
            let s1 = g.add_string("dup");
            let s2 = g.add_string("dup");
            let root = g.add_array(
                ArrayInstance::new(
                    MemberType::Str,
                    ArrayShape::Single {
                        len: 2,
                        lower_bound: 0,
                    },
                    vec![Value::Ref(s1), Value::Ref(s2)],
                )
                .unwrap(),
            );
            g.set_root(root);
            g
        };
        assert!(shared.structurally_eq(&copied));
    }
}
