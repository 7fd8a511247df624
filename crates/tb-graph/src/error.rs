use tb_tensor::{DataType, TensorError};
use thiserror::Error;

use crate::node::{GraphId, Node, ValueType};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node {node} does not belong to graph {graph}")]
    ForeignNode { node: Node, graph: GraphId },
    #[error("node {0} does not exist")]
    UnknownNode(Node),
    #[error("{op}: expected an array, got {got}")]
    NotAnArray { op: &'static str, got: ValueType },
    #[error("{op}: expected a tuple, got {got}")]
    NotATuple { op: &'static str, got: ValueType },
    #[error("{op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },
    #[error("{op}: dtype mismatch: {x} vs {y}")]
    DTypeMismatch {
        op: &'static str,
        x: DataType,
        y: DataType,
    },
    #[error("{op}: unsupported dtype {dtype}")]
    UnsupportedDType { op: &'static str, dtype: DataType },
    #[error("{op}: axis {axis} out of range for rank {rank}")]
    AxisOutOfRange {
        op: &'static str,
        axis: usize,
        rank: usize,
    },
    #[error("{op}: index {index} out of range for length {len}")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        len: usize,
    },
    #[error("argument index {index} is already declared by '{existing}'")]
    DuplicateArgument { index: usize, existing: String },
    #[error("graph '{graph}' declares no argument with index {index}")]
    MissingArgument { graph: String, index: usize },
    #[error("{op}: expected {expected} arguments, got {got}")]
    ArgumentCountMismatch {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("broadcast_in_dim: {0}")]
    InvalidBroadcast(String),
    #[error("dot_general: {0}")]
    InvalidContraction(String),
    #[error("graph '{0}' has been compiled and can no longer be modified")]
    Frozen(String),
    #[error("{0} is not supported by this backend")]
    Unsupported(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
