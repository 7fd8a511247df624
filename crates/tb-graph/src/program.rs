//! Frozen graph representation handed to backends.
//!
//! A [`Function`] is an immutable snapshot of a graph arena: a dense list of
//! instructions in program order, where every operand refers to an earlier
//! instruction. Callees of `call` and `while` are nested functions, shared by
//! `Arc`.

use std::fmt;
use std::sync::Arc;

use tb_tensor::{Handle, Shape, Storage};

use crate::error::{GraphError, Result};
use crate::node::{NodeId, ValueType};
use crate::op::{BinaryOp, MathFunction, UnaryOp};

/// Operation computed by one instruction.
///
/// Result shapes (including reshape and cast targets) live in
/// [`Instruction::ty`].
#[derive(Debug, Clone)]
pub enum Operation {
    Constant(Storage),
    Argument {
        name: String,
        index: usize,
    },
    Tuple(Vec<NodeId>),
    TupleElement {
        tuple: NodeId,
        index: usize,
    },
    Call {
        callee: Arc<Function>,
        args: Vec<NodeId>,
    },
    Unary {
        op: UnaryOp,
        x: NodeId,
    },
    Binary {
        op: BinaryOp,
        x: NodeId,
        y: NodeId,
    },
    Reshape {
        x: NodeId,
    },
    Concat {
        axis: usize,
        inputs: Vec<NodeId>,
    },
    Cast {
        x: NodeId,
    },
    Slice {
        x: NodeId,
        index: usize,
    },
    Set {
        x: NodeId,
        updates: NodeId,
        index: NodeId,
    },
    DotGeneral {
        x: NodeId,
        y: NodeId,
        batch_axes: [Vec<usize>; 2],
        reduce_axes: [Vec<usize>; 2],
    },
    While {
        cond: Arc<Function>,
        body: Arc<Function>,
        state: NodeId,
    },
    BroadcastInDim {
        x: NodeId,
        broadcast_axes: Vec<usize>,
    },
    Iota {
        axis: usize,
    },
    Math {
        function: MathFunction,
        x: NodeId,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Constant(_) => "constant",
            Operation::Argument { .. } => "argument",
            Operation::Tuple(_) => "tuple",
            Operation::TupleElement { .. } => "element",
            Operation::Call { .. } => "call",
            Operation::Unary { op, .. } => op.as_str(),
            Operation::Binary { op, .. } => op.as_str(),
            Operation::Reshape { .. } => "reshape",
            Operation::Concat { .. } => "concat",
            Operation::Cast { .. } => "cast",
            Operation::Slice { .. } => "slice",
            Operation::Set { .. } => "set",
            Operation::DotGeneral { .. } => "dot_general",
            Operation::While { .. } => "while",
            Operation::BroadcastInDim { .. } => "broadcast_in_dim",
            Operation::Iota { .. } => "iota",
            Operation::Math { function, .. } => function.as_str(),
        }
    }

    /// Nodes read by this operation, in operand order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Operation::Constant(_) | Operation::Argument { .. } | Operation::Iota { .. } => {
                Vec::new()
            }
            Operation::Tuple(ids) | Operation::Concat { inputs: ids, .. } => ids.clone(),
            Operation::Call { args, .. } => args.clone(),
            Operation::TupleElement { tuple: x, .. }
            | Operation::Unary { x, .. }
            | Operation::Reshape { x }
            | Operation::Cast { x }
            | Operation::Slice { x, .. }
            | Operation::BroadcastInDim { x, .. }
            | Operation::Math { x, .. }
            | Operation::While { state: x, .. } => vec![*x],
            Operation::Binary { x, y, .. } | Operation::DotGeneral { x, y, .. } => vec![*x, *y],
            Operation::Set { x, updates, index } => vec![*x, *updates, *index],
        }
    }

    fn attributes(&self) -> Option<String> {
        match self {
            Operation::Argument { name, index } => Some(format!("{name:?}, index={index}")),
            Operation::TupleElement { index, .. } | Operation::Slice { index, .. } => {
                Some(format!("index={index}"))
            }
            Operation::Call { callee, .. } => Some(format!("@{}", callee.name())),
            Operation::Concat { axis, .. } | Operation::Iota { axis } => {
                Some(format!("axis={axis}"))
            }
            Operation::DotGeneral {
                batch_axes,
                reduce_axes,
                ..
            } => Some(format!("batch={batch_axes:?}, reduce={reduce_axes:?}")),
            Operation::While { cond, body, .. } => {
                Some(format!("cond=@{}, body=@{}", cond.name(), body.name()))
            }
            Operation::BroadcastInDim { broadcast_axes, .. } => {
                Some(format!("axes={broadcast_axes:?}"))
            }
            _ => None,
        }
    }
}

/// One node of a frozen function.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub op: Operation,
    pub ty: ValueType,
}

/// Immutable snapshot of a graph.
#[derive(Debug, Clone)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) arguments: Vec<NodeId>,
    pub(crate) result: Option<NodeId>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, id: NodeId) -> &Instruction {
        &self.instructions[id.0]
    }

    /// Argument nodes; entry `i` is the node declared with argument index `i`.
    pub fn arguments(&self) -> &[NodeId] {
        &self.arguments
    }

    /// Shapes of the arguments, in index order.
    pub fn argument_types(&self) -> impl Iterator<Item = &ValueType> + '_ {
        self.arguments.iter().map(|id| &self.instruction(*id).ty)
    }

    /// The designated result node of a subgraph. `None` for entry functions.
    pub fn result(&self) -> Option<NodeId> {
        self.result
    }

    pub fn result_type(&self) -> Option<&ValueType> {
        self.result.map(|id| &self.instruction(id).ty)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "func @{} {{", self.name)?;
        for (i, inst) in self.instructions.iter().enumerate() {
            write!(f, "  {} = {}", NodeId(i), inst.op.name())?;
            let operands = inst.op.operands();
            for (j, id) in operands.iter().enumerate() {
                write!(f, "{}{}", if j == 0 { " " } else { ", " }, id)?;
            }
            if let Some(attrs) = inst.op.attributes() {
                write!(f, " {{{}}}", attrs)?;
            }
            writeln!(f, " : {}", inst.ty)?;
        }
        if let Some(result) = self.result {
            writeln!(f, "  return {}", result)?;
        }
        write!(f, "}}")
    }
}

/// A compiled-ready program: the entry function plus the nodes to return.
#[derive(Debug, Clone)]
pub struct Program {
    pub entry: Arc<Function>,
    pub outputs: Vec<NodeId>,
    pub traced: Vec<NodeId>,
}

impl Program {
    /// Shapes expected for the positional inputs of a run.
    pub fn param_shapes(&self) -> Vec<&Shape> {
        self.entry
            .argument_types()
            .filter_map(ValueType::as_array)
            .collect()
    }

    /// Checks that `inputs` bind positionally to the entry arguments.
    pub fn check_inputs(&self, inputs: &[Arc<dyn Handle>]) -> Result<()> {
        let params = self.param_shapes();
        if params.len() != inputs.len() {
            return Err(GraphError::ArgumentCountMismatch {
                op: "run",
                expected: params.len(),
                got: inputs.len(),
            });
        }
        for (i, (want, handle)) in params.iter().zip(inputs).enumerate() {
            if *want != handle.shape() {
                return Err(GraphError::ShapeMismatch {
                    op: "run",
                    detail: format!(
                        "input {} has shape {} but the argument expects {}",
                        i,
                        handle.shape(),
                        want
                    ),
                });
            }
        }
        Ok(())
    }
}
