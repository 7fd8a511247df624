use std::fmt;

use tb_tensor::Shape;

use crate::error::{GraphError, Result};

/// Identity of a graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub(crate) usize);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Position of an instruction in its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Opaque reference to one operation's result within a specific graph.
///
/// Nodes from different graphs are never interchangeable: every builder call
/// checks that its operands carry the builder's own [`GraphId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Node {
    pub(crate) graph: GraphId,
    pub(crate) id: NodeId,
}

impl Node {
    /// The graph this node belongs to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph, self.id)
    }
}

/// A node bundling an ordered sequence of constituent nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub(crate) node: Node,
    pub(crate) elements: Vec<Node>,
}

impl Tuple {
    /// The node standing for the tuple as a whole.
    pub fn node(&self) -> Node {
        self.node
    }

    /// Number of elements in the tuple.
    pub fn size(&self) -> usize {
        self.elements.len()
    }

    /// Returns the node of the `i`th element.
    pub fn element(&self, i: usize) -> Result<Node> {
        self.elements
            .get(i)
            .copied()
            .ok_or(GraphError::IndexOutOfRange {
                op: "tuple element",
                index: i,
                len: self.elements.len(),
            })
    }

    /// Returns the tuple's constituent nodes.
    pub fn unpack(&self) -> &[Node] {
        &self.elements
    }
}

impl From<&Tuple> for Node {
    fn from(tuple: &Tuple) -> Node {
        tuple.node
    }
}

/// Type of the value computed by a node: an array, or a tuple of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Array(Shape),
    Tuple(Vec<ValueType>),
}

impl ValueType {
    pub fn as_array(&self) -> Option<&Shape> {
        match self {
            ValueType::Array(shape) => Some(shape),
            ValueType::Tuple(_) => None,
        }
    }
}

impl From<Shape> for ValueType {
    fn from(shape: Shape) -> Self {
        ValueType::Array(shape)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Array(shape) => write!(f, "{}", shape),
            ValueType::Tuple(elements) => {
                write!(f, "(")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", el)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A node paired with the shape it is declared to produce.
///
/// Used to declare graph outputs, traced outputs, and subgraph results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNode {
    pub node: Node,
    pub shape: Shape,
}

impl OutputNode {
    pub fn new(node: Node, shape: Shape) -> Self {
        OutputNode { node, shape }
    }
}

impl fmt::Display for OutputNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.shape, self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_tensor::DataType;

    fn node(id: usize) -> Node {
        Node {
            graph: GraphId(7),
            id: NodeId(id),
        }
    }

    #[test]
    fn test_tuple_access() {
        let t = Tuple {
            node: node(3),
            elements: vec![node(0), node(1), node(2)],
        };
        assert_eq!(t.size(), 3);
        for i in 0..t.size() {
            assert_eq!(t.element(i).unwrap(), node(i));
        }
        assert!(t.element(3).is_err());
        assert_eq!(t.unpack(), &[node(0), node(1), node(2)]);
        assert_eq!(Node::from(&t), node(3));
    }

    #[test]
    fn test_display() {
        let out = OutputNode::new(node(4), Shape::new(DataType::Float32, vec![2]));
        assert_eq!(out.to_string(), "[2]float32: g7:%4");
        let ty = ValueType::Tuple(vec![
            Shape::scalar(DataType::Int32).into(),
            Shape::new(DataType::Bool, vec![3]).into(),
        ]);
        assert_eq!(ty.to_string(), "(int32, [3]bool)");
    }
}
