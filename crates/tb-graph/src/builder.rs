//! Builder capability interfaces.
//!
//! The core vocabulary lives in [`CoreBuilder`]. Index generation and
//! transcendental math are separate traits so a backend can leave them out;
//! [`Graph::num`](crate::Graph::num) and [`Graph::math`](crate::Graph::math)
//! return `None` when the backend does not provide them.

use tb_tensor::{DataType, HostBuffer, Shape};

use crate::error::Result;
use crate::graph::{Graph, Subgraph};
use crate::node::{Node, Tuple};
use crate::op::{BinaryOp, UnaryOp};

/// Structural and arithmetic operations every backend supports.
pub trait CoreBuilder {
    /// The graph nodes are added to.
    fn graph(&self) -> &Graph;

    /// Embeds the current contents of `value` as a constant.
    fn constant(&mut self, value: &HostBuffer) -> Result<Node>;

    /// Bundles `nodes` into a tuple.
    fn tuple(&mut self, nodes: &[Node]) -> Result<Tuple>;

    /// Calls a subgraph with `args` bound positionally to its arguments.
    fn call(&mut self, subgraph: &Subgraph, args: &[Node]) -> Result<Node>;

    /// Opens a new graph scope sharing this graph's backend.
    fn subgraph(&mut self, name: &str) -> Result<Graph>;

    /// Declares the positional parameter `index`.
    fn argument(&mut self, name: &str, shape: &Shape, index: usize) -> Result<Node>;

    fn unary(&mut self, op: UnaryOp, x: Node) -> Result<Node>;

    fn binary(&mut self, op: BinaryOp, x: Node, y: Node) -> Result<Node>;

    /// Reinterprets `x` under new axis lengths, keeping row-major element order.
    fn reshape(&mut self, x: Node, axis_lengths: &[usize]) -> Result<Node>;

    fn concat(&mut self, axis: usize, nodes: &[Node]) -> Result<Node>;

    fn cast(&mut self, x: Node, target: DataType) -> Result<Node>;

    /// Extracts `x[index]` along the outermost axis.
    fn slice(&mut self, x: Node, index: usize) -> Result<Node>;

    /// Returns `x` with `x[index] = updates` along the outermost axis.
    fn set(&mut self, x: Node, updates: Node, index: Node) -> Result<Node>;

    /// Generalized contraction.
    ///
    /// `batch_axes[0][i]` of `x` is iterated in lockstep with
    /// `batch_axes[1][i]` of `y`; `reduce_axes` pairs are summed out. The
    /// result has the batch axes first, then the free axes of `x`, then those
    /// of `y`.
    fn dot_general(
        &mut self,
        x: Node,
        y: Node,
        batch_axes: [&[usize]; 2],
        reduce_axes: [&[usize]; 2],
    ) -> Result<Node>;

    /// Runs `body` on the state while `cond` holds.
    fn while_loop(&mut self, cond: &Subgraph, body: &Subgraph, state: Node) -> Result<Node>;

    /// Expands `x` to `target`, mapping axis `i` of `x` to `broadcast_axes[i]`.
    fn broadcast_in_dim(&mut self, x: Node, target: &Shape, broadcast_axes: &[usize])
        -> Result<Node>;
}

/// Numeric sequence generation.
pub trait NumBuilder {
    /// Fills `shape` so every element equals its coordinate along `axis`.
    fn iota(&mut self, shape: &Shape, axis: usize) -> Result<Node>;
}

/// Elementwise transcendental functions over floating-point arrays.
pub trait MathBuilder {
    fn cos(&mut self, x: Node) -> Result<Node>;
    fn sin(&mut self, x: Node) -> Result<Node>;
    fn tanh(&mut self, x: Node) -> Result<Node>;
}
