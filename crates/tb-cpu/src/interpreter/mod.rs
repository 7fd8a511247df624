//! Reference interpreter over frozen graph functions.
//!
//! Every instruction is evaluated once, in program order, into a dense value
//! table indexed by node id. `call` and `while` evaluate their callees with a
//! fresh table, so callees see nothing but their arguments.

/// Evaluates `$body` with the type alias `$t` bound to the element type of
/// `$dtype`.
macro_rules! with_element_type {
    ($dtype:expr, $op:expr, $t:ident => $body:expr) => {
        match $dtype {
            ::tb_tensor::DataType::Bool => {
                type $t = bool;
                $body
            }
            ::tb_tensor::DataType::Invalid => Err(::tb_graph::GraphError::UnsupportedDType {
                op: $op,
                dtype: ::tb_tensor::DataType::Invalid,
            }),
            other => with_numeric_type!(other, $op, $t => $body),
        }
    };
}

/// Like `with_element_type!`, restricted to integer and floating-point types.
macro_rules! with_numeric_type {
    ($dtype:expr, $op:expr, $t:ident => $body:expr) => {
        match $dtype {
            ::tb_tensor::DataType::Int32 => {
                type $t = i32;
                $body
            }
            ::tb_tensor::DataType::Int64 => {
                type $t = i64;
                $body
            }
            ::tb_tensor::DataType::Uint32 => {
                type $t = u32;
                $body
            }
            ::tb_tensor::DataType::Uint64 => {
                type $t = u64;
                $body
            }
            ::tb_tensor::DataType::Float32 => {
                type $t = f32;
                $body
            }
            ::tb_tensor::DataType::Float64 => {
                type $t = f64;
                $body
            }
            ::tb_tensor::DataType::BFloat16 => {
                type $t = ::tb_tensor::BFloat16;
                $body
            }
            dtype => Err(::tb_graph::GraphError::UnsupportedDType { op: $op, dtype }),
        }
    };
}

mod dot;
mod elementwise;
mod index;
mod shape_ops;

use tb_graph::{Function, GraphError, NodeId, Operation, Result, ValueType};
use tb_tensor::{Shape, Storage};
use tracing::trace;

/// Runtime value of a node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Array(Storage),
    Tuple(Vec<Value>),
}

impl Value {
    pub(crate) fn into_array(self, what: &str) -> Result<Storage> {
        match self {
            Value::Array(storage) => Ok(storage),
            Value::Tuple(_) => Err(GraphError::Execution(format!(
                "{} produced a tuple where an array was expected",
                what
            ))),
        }
    }

    /// Splits a loop state into per-element arguments.
    fn into_params(self) -> Vec<Value> {
        match self {
            Value::Tuple(elements) => elements,
            array => vec![array],
        }
    }
}

fn shape_of(function: &Function, id: NodeId) -> Result<&Shape> {
    match &function.instruction(id).ty {
        ValueType::Array(shape) => Ok(shape),
        other => Err(GraphError::NotAnArray {
            op: "evaluate",
            got: other.clone(),
        }),
    }
}

fn array(values: &[Value], id: NodeId) -> Result<&Storage> {
    match &values[id.0] {
        Value::Array(storage) => Ok(storage),
        Value::Tuple(_) => Err(GraphError::Execution(format!(
            "node {} is a tuple where an array was expected",
            id
        ))),
    }
}

/// Evaluates every instruction of `function`, returning the value table.
pub(crate) fn evaluate(function: &Function, args: &[Value]) -> Result<Vec<Value>> {
    if args.len() != function.arguments().len() {
        return Err(GraphError::ArgumentCountMismatch {
            op: "evaluate",
            expected: function.arguments().len(),
            got: args.len(),
        });
    }
    let mut values: Vec<Value> = Vec::with_capacity(function.len());
    for inst in function.instructions() {
        let value = step(function, &inst.op, &inst.ty, &values, args)?;
        values.push(value);
    }
    Ok(values)
}

/// Evaluates a subgraph function and returns its result.
pub(crate) fn call(function: &Function, args: &[Value]) -> Result<Value> {
    let result = function.result().ok_or_else(|| {
        GraphError::Execution(format!("function '{}' has no result", function.name()))
    })?;
    let mut values = evaluate(function, args)?;
    Ok(values.swap_remove(result.0))
}

fn step(
    function: &Function,
    op: &Operation,
    ty: &ValueType,
    values: &[Value],
    args: &[Value],
) -> Result<Value> {
    let out_shape = || match ty {
        ValueType::Array(shape) => Ok(shape),
        other => Err(GraphError::NotAnArray {
            op: "evaluate",
            got: other.clone(),
        }),
    };
    let storage = match op {
        Operation::Constant(storage) => storage.clone(),
        Operation::Argument { index, .. } => {
            return args.get(*index).cloned().ok_or(GraphError::MissingArgument {
                graph: function.name().to_string(),
                index: *index,
            })
        }
        Operation::Tuple(ids) => {
            return Ok(Value::Tuple(ids.iter().map(|id| values[id.0].clone()).collect()))
        }
        Operation::TupleElement { tuple, index } => {
            return match &values[tuple.0] {
                Value::Tuple(elements) => {
                    elements
                        .get(*index)
                        .cloned()
                        .ok_or(GraphError::IndexOutOfRange {
                            op: "element",
                            index: *index,
                            len: elements.len(),
                        })
                }
                Value::Array(_) => Err(GraphError::Execution(format!(
                    "node {} is not a tuple",
                    tuple
                ))),
            }
        }
        Operation::Call { callee, args } => {
            let args: Vec<Value> = args.iter().map(|id| values[id.0].clone()).collect();
            return call(callee, &args);
        }
        Operation::While { cond, body, state } => {
            return run_while(cond, body, values[state.0].clone());
        }
        Operation::Unary { op, x } => elementwise::unary(*op, array(values, *x)?)?,
        Operation::Binary { op, x, y } => {
            elementwise::binary(*op, array(values, *x)?, array(values, *y)?)?
        }
        Operation::Reshape { x } => array(values, *x)?.clone(),
        Operation::Concat { axis, inputs } => {
            let mut parts = Vec::with_capacity(inputs.len());
            for id in inputs {
                parts.push((array(values, *id)?, shape_of(function, *id)?));
            }
            shape_ops::concat(*axis, &parts, out_shape()?)?
        }
        Operation::Cast { x } => elementwise::cast(array(values, *x)?, out_shape()?.dtype())?,
        Operation::Slice { x, index } => {
            shape_ops::slice(array(values, *x)?, shape_of(function, *x)?, *index)?
        }
        Operation::Set { x, updates, index } => shape_ops::set(
            array(values, *x)?,
            shape_of(function, *x)?,
            array(values, *updates)?,
            array(values, *index)?,
        )?,
        Operation::DotGeneral {
            x,
            y,
            batch_axes,
            reduce_axes,
        } => dot::dot_general(
            array(values, *x)?,
            shape_of(function, *x)?,
            array(values, *y)?,
            shape_of(function, *y)?,
            batch_axes,
            reduce_axes,
        )?,
        Operation::BroadcastInDim { x, broadcast_axes } => shape_ops::broadcast_in_dim(
            array(values, *x)?,
            shape_of(function, *x)?,
            out_shape()?,
            broadcast_axes,
        )?,
        Operation::Iota { axis } => shape_ops::iota(out_shape()?, *axis)?,
        Operation::Math { function: f, x } => elementwise::math(*f, array(values, *x)?)?,
    };
    Ok(Value::Array(storage))
}

fn run_while(cond: &Function, body: &Function, mut state: Value) -> Result<Value> {
    let mut iterations = 0usize;
    loop {
        let keep_going = match call(cond, &state.clone().into_params())? {
            Value::Array(Storage::Bool(v)) if v.len() == 1 => v[0],
            other => {
                return Err(GraphError::Execution(format!(
                    "condition '{}' produced {:?} instead of a boolean scalar",
                    cond.name(),
                    other
                )))
            }
        };
        if !keep_going {
            break;
        }
        state = call(body, &state.into_params())?;
        iterations += 1;
    }
    trace!(body = body.name(), iterations, "while loop finished");
    Ok(state)
}
