//! Computation-graph IR for tensor backends.
//!
//! Graphs are built incrementally through capability traits ([`CoreBuilder`],
//! [`NumBuilder`], [`MathBuilder`]), compiled once for a device into a
//! [`Runner`], and run repeatedly against fresh input handles.

pub mod backend;
pub mod builder;
pub mod error;
pub mod graph;
pub mod infer;
pub mod node;
pub mod op;
pub mod program;

pub use backend::{Backend, Capabilities, RunOutputs, Runner};
pub use builder::{CoreBuilder, MathBuilder, NumBuilder};
pub use error::{GraphError, Result};
pub use graph::{Graph, Subgraph};
pub use node::{GraphId, Node, NodeId, OutputNode, Tuple, ValueType};
pub use op::{BinaryOp, MathFunction, UnaryOp};
pub use program::{Function, Instruction, Operation, Program};
