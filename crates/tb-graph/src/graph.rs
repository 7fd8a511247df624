//! Arena-backed computation graphs.
//!
//! A [`Graph`] owns a dense, append-only list of instructions. Builder calls
//! infer the result type, append one instruction and hand back a [`Node`]
//! naming it. Compiling a graph freezes it; a [`Subgraph`] consumes its graph
//! outright, so callees can never change after they are first used.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tb_tensor::{DataType, Device, Handle, HostBuffer, Platform, Shape};
use tracing::{debug, info, trace};

use crate::backend::{Backend, Capabilities, Runner};
use crate::builder::{CoreBuilder, MathBuilder, NumBuilder};
use crate::error::{GraphError, Result};
use crate::infer;
use crate::node::{GraphId, Node, NodeId, OutputNode, Tuple, ValueType};
use crate::op::{BinaryOp, MathFunction, UnaryOp};
use crate::program::{Function, Instruction, Operation, Program};

static GRAPH_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Mutable, append-only construction context.
#[derive(Debug)]
pub struct Graph {
    id: GraphId,
    name: String,
    backend: Arc<dyn Backend>,
    instructions: Vec<Instruction>,
    arguments: BTreeMap<usize, NodeId>,
    frozen: bool,
}

impl Graph {
    pub fn new(name: &str, backend: Arc<dyn Backend>) -> Self {
        let id = GraphId(GRAPH_ID_COUNTER.fetch_add(1, Ordering::Relaxed));
        debug!(graph = name, id = %id, "created graph");
        Graph {
            id,
            name: name.to_string(),
            backend,
            instructions: Vec::new(),
            arguments: BTreeMap::new(),
            frozen: false,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Platform of the backend this graph is built for.
    pub fn platform(&self) -> Arc<dyn Platform> {
        self.backend.platform()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.backend.capabilities()
    }

    pub fn core(&mut self) -> &mut dyn CoreBuilder {
        self
    }

    /// Numeric sequence builder, if the backend provides it.
    pub fn num(&mut self) -> Option<&mut dyn NumBuilder> {
        if self.capabilities().num {
            Some(self)
        } else {
            None
        }
    }

    /// Math builder, if the backend provides it.
    pub fn math(&mut self) -> Option<&mut dyn MathBuilder> {
        if self.capabilities().math {
            Some(self)
        } else {
            None
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether the graph has been compiled.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn node_type(&self, node: Node) -> Result<&ValueType> {
        let id = self.resolve(node)?;
        Ok(&self.instructions[id.0].ty)
    }

    /// Shape of an array-valued node.
    pub fn shape_of(&self, node: Node) -> Result<&Shape> {
        self.array("shape_of", node).map(|(_, shape)| shape)
    }

    /// Views a tuple-valued node as a [`Tuple`].
    ///
    /// Nodes built by `tuple` yield their original elements; any other
    /// tuple-valued node (a `call` or `while` result) gets one element
    /// extraction node per element.
    pub fn tuple_of(&mut self, node: Node) -> Result<Tuple> {
        let id = self.resolve(node)?;
        let inst = &self.instructions[id.0];
        let types = match &inst.ty {
            ValueType::Tuple(types) => types.clone(),
            other => {
                return Err(GraphError::NotATuple {
                    op: "tuple_of",
                    got: other.clone(),
                })
            }
        };
        if let Operation::Tuple(ids) = &inst.op {
            let elements = ids.iter().map(|&id| self.node(id)).collect();
            return Ok(Tuple { node, elements });
        }
        let mut elements = Vec::with_capacity(types.len());
        for (index, ty) in types.into_iter().enumerate() {
            elements.push(self.push(Operation::TupleElement { tuple: id, index }, ty)?);
        }
        Ok(Tuple { node, elements })
    }

    /// Compiles the graph for `device`, freezing it.
    ///
    /// `outputs` and `traced` must be array nodes of this graph with the
    /// declared shapes; `params` must match the declared arguments in index
    /// order. The graph may be compiled again, but no longer modified.
    pub fn compile(
        &mut self,
        device: Arc<dyn Device>,
        outputs: &[OutputNode],
        traced: &[OutputNode],
        params: &[Shape],
    ) -> Result<Box<dyn Runner>> {
        let output_ids = self.check_outputs(outputs)?;
        let traced_ids = self.check_outputs(traced)?;
        let entry = self.snapshot(None)?;

        let declared: Vec<&Shape> = entry
            .argument_types()
            .filter_map(ValueType::as_array)
            .collect();
        if declared.len() != params.len() {
            return Err(GraphError::ArgumentCountMismatch {
                op: "compile",
                expected: declared.len(),
                got: params.len(),
            });
        }
        for (index, (want, got)) in declared.iter().zip(params).enumerate() {
            if *want != got {
                return Err(GraphError::ShapeMismatch {
                    op: "compile",
                    detail: format!(
                        "argument {} is declared as {} but compiled for {}",
                        index, want, got
                    ),
                });
            }
        }

        let platform = self.backend.platform();
        if !device.platform().is_same(platform.as_ref()) {
            return Err(GraphError::Unsupported(format!(
                "device {} of platform '{}'",
                device.ordinal(),
                device.platform().name()
            )));
        }

        info!(
            graph = %self.name,
            nodes = entry.len(),
            outputs = output_ids.len(),
            traced = traced_ids.len(),
            params = params.len(),
            device = device.ordinal(),
            "compiling graph"
        );
        let program = Program {
            entry: Arc::new(entry),
            outputs: output_ids,
            traced: traced_ids,
        };
        let runner = self.backend.compile(device, program)?;
        self.frozen = true;
        Ok(runner)
    }

    fn node(&self, id: NodeId) -> Node {
        Node { graph: self.id, id }
    }

    fn resolve(&self, node: Node) -> Result<NodeId> {
        if node.graph != self.id {
            return Err(GraphError::ForeignNode {
                node,
                graph: self.id,
            });
        }
        if node.id.0 >= self.instructions.len() {
            return Err(GraphError::UnknownNode(node));
        }
        Ok(node.id)
    }

    fn array(&self, op: &'static str, node: Node) -> Result<(NodeId, &Shape)> {
        let id = self.resolve(node)?;
        match &self.instructions[id.0].ty {
            ValueType::Array(shape) => Ok((id, shape)),
            other => Err(GraphError::NotAnArray {
                op,
                got: other.clone(),
            }),
        }
    }

    fn push(&mut self, op: Operation, ty: ValueType) -> Result<Node> {
        if self.frozen {
            return Err(GraphError::Frozen(self.name.clone()));
        }
        let id = NodeId(self.instructions.len());
        trace!(graph = %self.name, node = %id, op = op.name(), ty = %ty, "added node");
        self.instructions.push(Instruction { op, ty });
        Ok(self.node(id))
    }

    fn check_outputs(&self, outputs: &[OutputNode]) -> Result<Vec<NodeId>> {
        outputs
            .iter()
            .map(|out| {
                let (id, shape) = self.array("compile", out.node)?;
                if *shape != out.shape {
                    return Err(GraphError::ShapeMismatch {
                        op: "compile",
                        detail: format!("output {} produces {}", out, shape),
                    });
                }
                Ok(id)
            })
            .collect()
    }

    /// Copies the arena into an immutable function. Argument indices must be
    /// contiguous from 0.
    fn snapshot(&self, result: Option<NodeId>) -> Result<Function> {
        let mut arguments = Vec::with_capacity(self.arguments.len());
        for (expected, (&index, &id)) in self.arguments.iter().enumerate() {
            if index != expected {
                return Err(GraphError::MissingArgument {
                    graph: self.name.clone(),
                    index: expected,
                });
            }
            arguments.push(id);
        }
        Ok(Function {
            name: self.name.clone(),
            instructions: self.instructions.clone(),
            arguments,
            result,
        })
    }

    /// Parameter types of a loop function operating on `state`: one per tuple
    /// element, or the state itself.
    fn state_params(state: &ValueType) -> Vec<ValueType> {
        match state {
            ValueType::Tuple(types) => types.clone(),
            array => vec![array.clone()],
        }
    }

    fn check_params(
        op: &'static str,
        callee: &Function,
        params: &[ValueType],
    ) -> Result<()> {
        if callee.arguments().len() != params.len() {
            return Err(GraphError::ArgumentCountMismatch {
                op,
                expected: callee.arguments().len(),
                got: params.len(),
            });
        }
        for (index, (want, got)) in callee.argument_types().zip(params).enumerate() {
            if want != got {
                return Err(GraphError::ShapeMismatch {
                    op,
                    detail: format!(
                        "argument {} of '{}' is {} but got {}",
                        index,
                        callee.name(),
                        want,
                        got
                    ),
                });
            }
        }
        Ok(())
    }

    /// Fails unless the backend advertises the capability behind `op`.
    fn require(&self, available: bool, op: &str) -> Result<()> {
        if available {
            Ok(())
        } else {
            Err(GraphError::Unsupported(format!(
                "{} on backend {:?}",
                op, self.backend
            )))
        }
    }

    fn math_function(&mut self, function: MathFunction, x: Node) -> Result<Node> {
        self.require(self.capabilities().math, function.as_str())?;
        let (x, shape) = self.array(function.as_str(), x)?;
        let shape = infer::math(function, shape)?;
        self.push(Operation::Math { function, x }, shape.into())
    }
}

impl CoreBuilder for Graph {
    fn graph(&self) -> &Graph {
        self
    }

    fn constant(&mut self, value: &HostBuffer) -> Result<Node> {
        let shape = value.shape().clone();
        if !shape.dtype().is_valid() {
            return Err(GraphError::UnsupportedDType {
                op: "constant",
                dtype: shape.dtype(),
            });
        }
        let storage = value.read_storage()?;
        self.push(Operation::Constant(storage), shape.into())
    }

    fn tuple(&mut self, nodes: &[Node]) -> Result<Tuple> {
        let mut ids = Vec::with_capacity(nodes.len());
        let mut types = Vec::with_capacity(nodes.len());
        for &node in nodes {
            let id = self.resolve(node)?;
            ids.push(id);
            types.push(self.instructions[id.0].ty.clone());
        }
        let node = self.push(Operation::Tuple(ids), ValueType::Tuple(types))?;
        Ok(Tuple {
            node,
            elements: nodes.to_vec(),
        })
    }

    fn call(&mut self, subgraph: &Subgraph, args: &[Node]) -> Result<Node> {
        let callee = subgraph.function();
        let mut ids = Vec::with_capacity(args.len());
        let mut types = Vec::with_capacity(args.len());
        for &arg in args {
            let id = self.resolve(arg)?;
            ids.push(id);
            types.push(self.instructions[id.0].ty.clone());
        }
        Graph::check_params("call", callee, &types)?;
        let ty = subgraph.result_type().clone();
        self.push(
            Operation::Call {
                callee: Arc::clone(callee),
                args: ids,
            },
            ty,
        )
    }

    fn subgraph(&mut self, name: &str) -> Result<Graph> {
        let graph = Graph::new(name, Arc::clone(&self.backend));
        debug!(parent = %self.name, subgraph = name, "opened subgraph");
        Ok(graph)
    }

    fn argument(&mut self, name: &str, shape: &Shape, index: usize) -> Result<Node> {
        if !shape.dtype().is_valid() {
            return Err(GraphError::UnsupportedDType {
                op: "argument",
                dtype: shape.dtype(),
            });
        }
        infer::check_size("argument", shape)?;
        if let Some(&existing) = self.arguments.get(&index) {
            let existing = match &self.instructions[existing.0].op {
                Operation::Argument { name, .. } => name.clone(),
                _ => existing.to_string(),
            };
            return Err(GraphError::DuplicateArgument { index, existing });
        }
        let node = self.push(
            Operation::Argument {
                name: name.to_string(),
                index,
            },
            shape.clone().into(),
        )?;
        self.arguments.insert(index, node.id);
        Ok(node)
    }

    fn unary(&mut self, op: UnaryOp, x: Node) -> Result<Node> {
        let (x, shape) = self.array(op.as_str(), x)?;
        let shape = infer::unary(op, shape)?;
        self.push(Operation::Unary { op, x }, shape.into())
    }

    fn binary(&mut self, op: BinaryOp, x: Node, y: Node) -> Result<Node> {
        let (x, xs) = self.array(op.as_str(), x)?;
        let (y, ys) = self.array(op.as_str(), y)?;
        let shape = infer::binary(op, xs, ys)?;
        self.push(Operation::Binary { op, x, y }, shape.into())
    }

    fn reshape(&mut self, x: Node, axis_lengths: &[usize]) -> Result<Node> {
        let (x, shape) = self.array("reshape", x)?;
        let shape = infer::reshape(shape, axis_lengths)?;
        self.push(Operation::Reshape { x }, shape.into())
    }

    fn concat(&mut self, axis: usize, nodes: &[Node]) -> Result<Node> {
        let mut inputs = Vec::with_capacity(nodes.len());
        let mut shapes = Vec::with_capacity(nodes.len());
        for &node in nodes {
            let (id, shape) = self.array("concat", node)?;
            inputs.push(id);
            shapes.push(shape);
        }
        let shape = infer::concat(axis, &shapes)?;
        self.push(Operation::Concat { axis, inputs }, shape.into())
    }

    fn cast(&mut self, x: Node, target: DataType) -> Result<Node> {
        let (x, shape) = self.array("cast", x)?;
        let shape = infer::cast(shape, target)?;
        self.push(Operation::Cast { x }, shape.into())
    }

    fn slice(&mut self, x: Node, index: usize) -> Result<Node> {
        let (x, shape) = self.array("slice", x)?;
        let shape = infer::slice(shape, index)?;
        self.push(Operation::Slice { x, index }, shape.into())
    }

    fn set(&mut self, x: Node, updates: Node, index: Node) -> Result<Node> {
        let (x, xs) = self.array("set", x)?;
        let (updates, us) = self.array("set", updates)?;
        let (index, is) = self.array("set", index)?;
        let shape = infer::set(xs, us, is)?;
        self.push(Operation::Set { x, updates, index }, shape.into())
    }

    fn dot_general(
        &mut self,
        x: Node,
        y: Node,
        batch_axes: [&[usize]; 2],
        reduce_axes: [&[usize]; 2],
    ) -> Result<Node> {
        let (x, xs) = self.array("dot_general", x)?;
        let (y, ys) = self.array("dot_general", y)?;
        let shape = infer::dot_general(xs, ys, batch_axes, reduce_axes)?;
        self.push(
            Operation::DotGeneral {
                x,
                y,
                batch_axes: batch_axes.map(<[usize]>::to_vec),
                reduce_axes: reduce_axes.map(<[usize]>::to_vec),
            },
            shape.into(),
        )
    }

    fn while_loop(&mut self, cond: &Subgraph, body: &Subgraph, state: Node) -> Result<Node> {
        let id = self.resolve(state)?;
        let ty = self.instructions[id.0].ty.clone();
        let params = Graph::state_params(&ty);

        Graph::check_params("while condition", cond.function(), &params)?;
        let predicate = ValueType::Array(Shape::scalar(DataType::Bool));
        if *cond.result_type() != predicate {
            return Err(GraphError::ShapeMismatch {
                op: "while",
                detail: format!(
                    "condition '{}' returns {} instead of {}",
                    cond.name(),
                    cond.result_type(),
                    predicate
                ),
            });
        }

        Graph::check_params("while body", body.function(), &params)?;
        if *body.result_type() != ty {
            return Err(GraphError::ShapeMismatch {
                op: "while",
                detail: format!(
                    "body '{}' returns {} but the loop state is {}",
                    body.name(),
                    body.result_type(),
                    ty
                ),
            });
        }

        self.push(
            Operation::While {
                cond: Arc::clone(cond.function()),
                body: Arc::clone(body.function()),
                state: id,
            },
            ty,
        )
    }

    fn broadcast_in_dim(
        &mut self,
        x: Node,
        target: &Shape,
        broadcast_axes: &[usize],
    ) -> Result<Node> {
        let (x, shape) = self.array("broadcast_in_dim", x)?;
        let shape = infer::broadcast_in_dim(shape, target, broadcast_axes)?;
        self.push(
            Operation::BroadcastInDim {
                x,
                broadcast_axes: broadcast_axes.to_vec(),
            },
            shape.into(),
        )
    }
}

impl NumBuilder for Graph {
    fn iota(&mut self, shape: &Shape, axis: usize) -> Result<Node> {
        self.require(self.capabilities().num, "iota")?;
        let shape = infer::iota(shape, axis)?;
        self.push(Operation::Iota { axis }, shape.into())
    }
}

impl MathBuilder for Graph {
    fn cos(&mut self, x: Node) -> Result<Node> {
        self.math_function(MathFunction::Cos, x)
    }

    fn sin(&mut self, x: Node) -> Result<Node> {
        self.math_function(MathFunction::Sin, x)
    }

    fn tanh(&mut self, x: Node) -> Result<Node> {
        self.math_function(MathFunction::Tanh, x)
    }
}

/// A frozen graph with a designated result, callable through `call` and
/// `while_loop`.
#[derive(Debug, Clone)]
pub struct Subgraph {
    function: Arc<Function>,
    result: NodeId,
}

impl Subgraph {
    /// Freezes `graph` with `result` as its return value.
    pub fn new(graph: Graph, result: Node) -> Result<Subgraph> {
        let id = graph.resolve(result)?;
        let function = graph.snapshot(Some(id))?;
        debug!(
            subgraph = %function.name,
            nodes = function.len(),
            arguments = function.arguments.len(),
            "froze subgraph"
        );
        Ok(Subgraph {
            function: Arc::new(function),
            result: id,
        })
    }

    /// Like [`Subgraph::new`], checking the result against a declared shape.
    pub fn with_output(graph: Graph, output: &OutputNode) -> Result<Subgraph> {
        let shape = graph.shape_of(output.node)?;
        if *shape != output.shape {
            return Err(GraphError::ShapeMismatch {
                op: "subgraph",
                detail: format!("result {} produces {}", output, shape),
            });
        }
        Subgraph::new(graph, output.node)
    }

    pub fn name(&self) -> &str {
        self.function.name()
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }

    pub fn result_type(&self) -> &ValueType {
        &self.function.instruction(self.result).ty
    }
}
