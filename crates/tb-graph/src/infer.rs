//! Shape and dtype inference for graph operations.
//!
//! Every function validates its operands and returns the shape of the result.
//! There is no implicit promotion: operands of elementwise operators must
//! share dtype and axis lengths exactly.

use tb_tensor::{DataType, Shape};

use crate::error::{GraphError, Result};
use crate::op::{BinaryOp, MathFunction, UnaryOp};

/// Rejects shapes whose element or byte count does not fit in `usize`.
pub fn check_size(op: &'static str, shape: &Shape) -> Result<()> {
    let fits = shape.checked_size().is_some()
        && (!shape.dtype().is_valid() || shape.checked_byte_size().is_some());
    if !fits {
        return Err(GraphError::ShapeMismatch {
            op,
            detail: format!("{} has too many elements", shape),
        });
    }
    Ok(())
}

pub fn unary(op: UnaryOp, x: &Shape) -> Result<Shape> {
    if !op.accepts(x.dtype()) {
        return Err(GraphError::UnsupportedDType {
            op: op.as_str(),
            dtype: x.dtype(),
        });
    }
    Ok(x.clone())
}

pub fn binary(op: BinaryOp, x: &Shape, y: &Shape) -> Result<Shape> {
    if x.dtype() != y.dtype() {
        return Err(GraphError::DTypeMismatch {
            op: op.as_str(),
            x: x.dtype(),
            y: y.dtype(),
        });
    }
    if !op.accepts(x.dtype()) {
        return Err(GraphError::UnsupportedDType {
            op: op.as_str(),
            dtype: x.dtype(),
        });
    }
    if x.axis_lengths() != y.axis_lengths() {
        return Err(GraphError::ShapeMismatch {
            op: op.as_str(),
            detail: format!("operand shapes {} and {} differ", x, y),
        });
    }
    Ok(x.with_dtype(op.result_dtype(x.dtype())))
}

pub fn reshape(x: &Shape, axis_lengths: &[usize]) -> Result<Shape> {
    let target = x.with_axis_lengths(axis_lengths.to_vec());
    check_size("reshape", &target)?;
    if target.size() != x.size() {
        return Err(GraphError::ShapeMismatch {
            op: "reshape",
            detail: format!(
                "cannot reshape {} ({} elements) into {} ({} elements)",
                x,
                x.size(),
                target,
                target.size()
            ),
        });
    }
    Ok(target)
}

pub fn concat(axis: usize, inputs: &[&Shape]) -> Result<Shape> {
    let Some(first) = inputs.first() else {
        return Err(GraphError::ShapeMismatch {
            op: "concat",
            detail: "nothing to concatenate".to_string(),
        });
    };
    if axis >= first.rank() {
        return Err(GraphError::AxisOutOfRange {
            op: "concat",
            axis,
            rank: first.rank(),
        });
    }
    let mut axis_lengths = first.axis_lengths().to_vec();
    for other in &inputs[1..] {
        if other.dtype() != first.dtype() {
            return Err(GraphError::DTypeMismatch {
                op: "concat",
                x: first.dtype(),
                y: other.dtype(),
            });
        }
        let compatible = other.rank() == first.rank()
            && other
                .axis_lengths()
                .iter()
                .zip(first.axis_lengths())
                .enumerate()
                .all(|(i, (a, b))| i == axis || a == b);
        if !compatible {
            return Err(GraphError::ShapeMismatch {
                op: "concat",
                detail: format!(
                    "{} and {} differ outside of concatenation axis {}",
                    first, other, axis
                ),
            });
        }
        axis_lengths[axis] = axis_lengths[axis]
            .checked_add(other.axis_lengths()[axis])
            .ok_or_else(|| GraphError::ShapeMismatch {
                op: "concat",
                detail: format!("axis {} grows beyond {}", axis, usize::MAX),
            })?;
    }
    let result = first.with_axis_lengths(axis_lengths);
    check_size("concat", &result)?;
    Ok(result)
}

/// Numeric kinds convert among themselves and booleans widen to numbers.
/// Nothing converts to `bool`.
pub fn cast(x: &Shape, target: DataType) -> Result<Shape> {
    let from = x.dtype();
    let convertible = (target.is_numeric() && (from.is_numeric() || from == DataType::Bool))
        || (target == from && target.is_valid());
    if !convertible {
        return Err(GraphError::UnsupportedDType {
            op: "cast",
            dtype: target,
        });
    }
    Ok(x.with_dtype(target))
}

pub fn slice(x: &Shape, index: usize) -> Result<Shape> {
    if x.is_atomic() {
        return Err(GraphError::AxisOutOfRange {
            op: "slice",
            axis: 0,
            rank: 0,
        });
    }
    if index >= x.outer_axis_length() {
        return Err(GraphError::IndexOutOfRange {
            op: "slice",
            index,
            len: x.outer_axis_length(),
        });
    }
    Ok(x.with_axis_lengths(x.axis_lengths()[1..].to_vec()))
}

pub fn set(x: &Shape, updates: &Shape, index: &Shape) -> Result<Shape> {
    if x.is_atomic() {
        return Err(GraphError::AxisOutOfRange {
            op: "set",
            axis: 0,
            rank: 0,
        });
    }
    if updates.dtype() != x.dtype() {
        return Err(GraphError::DTypeMismatch {
            op: "set",
            x: x.dtype(),
            y: updates.dtype(),
        });
    }
    if updates.axis_lengths() != &x.axis_lengths()[1..] {
        return Err(GraphError::ShapeMismatch {
            op: "set",
            detail: format!("cannot write {} into a slice of {}", updates, x),
        });
    }
    if !index.is_atomic() || !index.dtype().is_integer() {
        return Err(GraphError::ShapeMismatch {
            op: "set",
            detail: format!("index must be an atomic integer, got {}", index),
        });
    }
    Ok(x.clone())
}

fn check_axes(op_side: &str, axes: &[usize], rank: usize, used: &mut [bool]) -> Result<()> {
    for &axis in axes {
        if axis >= rank {
            return Err(GraphError::InvalidContraction(format!(
                "{} axis {} out of range for rank {}",
                op_side, axis, rank
            )));
        }
        if used[axis] {
            return Err(GraphError::InvalidContraction(format!(
                "{} axis {} used more than once",
                op_side, axis
            )));
        }
        used[axis] = true;
    }
    Ok(())
}

/// Output axes are the batch axes (in order), then the free axes of `x`,
/// then the free axes of `y`.
pub fn dot_general(
    x: &Shape,
    y: &Shape,
    batch_axes: [&[usize]; 2],
    reduce_axes: [&[usize]; 2],
) -> Result<Shape> {
    if x.dtype() != y.dtype() {
        return Err(GraphError::DTypeMismatch {
            op: "dot_general",
            x: x.dtype(),
            y: y.dtype(),
        });
    }
    if !x.dtype().is_numeric() {
        return Err(GraphError::UnsupportedDType {
            op: "dot_general",
            dtype: x.dtype(),
        });
    }
    if batch_axes[0].len() != batch_axes[1].len() {
        return Err(GraphError::InvalidContraction(format!(
            "{} batch axes on x but {} on y",
            batch_axes[0].len(),
            batch_axes[1].len()
        )));
    }
    if reduce_axes[0].len() != reduce_axes[1].len() {
        return Err(GraphError::InvalidContraction(format!(
            "{} reduce axes on x but {} on y",
            reduce_axes[0].len(),
            reduce_axes[1].len()
        )));
    }

    let mut x_used = vec![false; x.rank()];
    let mut y_used = vec![false; y.rank()];
    check_axes("x batch", batch_axes[0], x.rank(), &mut x_used)?;
    check_axes("y batch", batch_axes[1], y.rank(), &mut y_used)?;
    check_axes("x reduce", reduce_axes[0], x.rank(), &mut x_used)?;
    check_axes("y reduce", reduce_axes[1], y.rank(), &mut y_used)?;

    let (xl, yl) = (x.axis_lengths(), y.axis_lengths());
    for (kind, [xs, ys]) in [("batch", batch_axes), ("reduce", reduce_axes)] {
        for (&xa, &ya) in xs.iter().zip(ys.iter()) {
            if xl[xa] != yl[ya] {
                return Err(GraphError::InvalidContraction(format!(
                    "{} axis {} of x has length {} but axis {} of y has length {}",
                    kind, xa, xl[xa], ya, yl[ya]
                )));
            }
        }
    }

    let mut axis_lengths: Vec<usize> = batch_axes[0].iter().map(|&a| xl[a]).collect();
    axis_lengths.extend((0..x.rank()).filter(|&a| !x_used[a]).map(|a| xl[a]));
    axis_lengths.extend((0..y.rank()).filter(|&a| !y_used[a]).map(|a| yl[a]));
    let result = x.with_axis_lengths(axis_lengths);
    check_size("dot_general", &result)?;
    Ok(result)
}

/// Axis `i` of `x` maps to axis `broadcast_axes[i]` of `target`; the mapping
/// must be strictly increasing and every mapped length must be 1 or equal to
/// the target length.
pub fn broadcast_in_dim(x: &Shape, target: &Shape, broadcast_axes: &[usize]) -> Result<Shape> {
    if x.dtype() != target.dtype() {
        return Err(GraphError::DTypeMismatch {
            op: "broadcast_in_dim",
            x: x.dtype(),
            y: target.dtype(),
        });
    }
    if broadcast_axes.len() != x.rank() {
        return Err(GraphError::InvalidBroadcast(format!(
            "{} broadcast axes given for an operand of rank {}",
            broadcast_axes.len(),
            x.rank()
        )));
    }
    if broadcast_axes.windows(2).any(|w| w[0] >= w[1]) {
        return Err(GraphError::InvalidBroadcast(format!(
            "broadcast axes {:?} are not strictly increasing",
            broadcast_axes
        )));
    }
    for (i, &axis) in broadcast_axes.iter().enumerate() {
        if axis >= target.rank() {
            return Err(GraphError::InvalidBroadcast(format!(
                "axis {} out of range for target {}",
                axis, target
            )));
        }
        let (from, to) = (x.axis_lengths()[i], target.axis_lengths()[axis]);
        if from != 1 && from != to {
            return Err(GraphError::InvalidBroadcast(format!(
                "axis {} of length {} cannot broadcast to length {}",
                i, from, to
            )));
        }
    }
    check_size("broadcast_in_dim", target)?;
    Ok(target.clone())
}

pub fn iota(shape: &Shape, axis: usize) -> Result<Shape> {
    if !shape.dtype().is_numeric() {
        return Err(GraphError::UnsupportedDType {
            op: "iota",
            dtype: shape.dtype(),
        });
    }
    if axis >= shape.rank() {
        return Err(GraphError::AxisOutOfRange {
            op: "iota",
            axis,
            rank: shape.rank(),
        });
    }
    check_size("iota", shape)?;
    Ok(shape.clone())
}

pub fn math(function: MathFunction, x: &Shape) -> Result<Shape> {
    if !x.dtype().is_float() {
        return Err(GraphError::UnsupportedDType {
            op: function.as_str(),
            dtype: x.dtype(),
        });
    }
    Ok(x.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32s(axes: &[usize]) -> Shape {
        Shape::new(DataType::Float32, axes.to_vec())
    }

    #[test]
    fn test_binary_same_shape() {
        let s = binary(BinaryOp::Add, &f32s(&[2, 3]), &f32s(&[2, 3])).unwrap();
        assert_eq!(s, f32s(&[2, 3]));
        let c = binary(BinaryOp::Less, &f32s(&[2]), &f32s(&[2])).unwrap();
        assert_eq!(c, Shape::new(DataType::Bool, vec![2]));
    }

    #[test]
    fn test_binary_no_promotion() {
        let i = Shape::new(DataType::Int32, vec![2]);
        assert!(matches!(
            binary(BinaryOp::Add, &f32s(&[2]), &i),
            Err(GraphError::DTypeMismatch { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::Add, &f32s(&[2]), &f32s(&[3])),
            Err(GraphError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            binary(BinaryOp::LogicalAnd, &f32s(&[2]), &f32s(&[2])),
            Err(GraphError::UnsupportedDType { .. })
        ));
    }

    #[test]
    fn test_unary() {
        assert!(unary(UnaryOp::Neg, &f32s(&[4])).is_ok());
        assert!(unary(UnaryOp::LogicalNot, &f32s(&[4])).is_err());
    }

    #[test]
    fn test_reshape() {
        assert_eq!(reshape(&f32s(&[2, 3]), &[3, 2]).unwrap(), f32s(&[3, 2]));
        assert_eq!(reshape(&f32s(&[2, 3]), &[6]).unwrap(), f32s(&[6]));
        assert_eq!(reshape(&f32s(&[1]), &[]).unwrap(), f32s(&[]));
        assert!(reshape(&f32s(&[2, 3]), &[4, 2]).is_err());
    }

    #[test]
    fn test_oversized_shapes_are_rejected() {
        let huge = [usize::MAX, 2];
        assert!(matches!(
            reshape(&f32s(&[4]), &huge),
            Err(GraphError::ShapeMismatch { op: "reshape", .. })
        ));
        // The wrapped product would equal the source size of 0.
        assert!(reshape(&f32s(&[0]), &[usize::MAX / 2 + 1, 2]).is_err());
        assert!(matches!(
            concat(0, &[&f32s(&[usize::MAX]), &f32s(&[1])]),
            Err(GraphError::ShapeMismatch { op: "concat", .. })
        ));
        assert!(concat(0, &[&f32s(&[usize::MAX / 2]), &f32s(&[1])]).is_err());
        assert!(matches!(
            dot_general(&f32s(&[usize::MAX / 2]), &f32s(&[3]), [&[], &[]], [&[], &[]]),
            Err(GraphError::ShapeMismatch { op: "dot_general", .. })
        ));
        assert!(matches!(
            broadcast_in_dim(&f32s(&[]), &f32s(&huge), &[]),
            Err(GraphError::ShapeMismatch { op: "broadcast_in_dim", .. })
        ));
        let i = Shape::new(DataType::Int32, huge.to_vec());
        assert!(matches!(
            iota(&i, 0),
            Err(GraphError::ShapeMismatch { op: "iota", .. })
        ));
        assert!(check_size("argument", &f32s(&[usize::MAX, 0])).is_ok());
    }

    #[test]
    fn test_concat_sums_axis() {
        let s = concat(1, &[&f32s(&[2, 3]), &f32s(&[2, 5])]).unwrap();
        assert_eq!(s, f32s(&[2, 8]));
        let s = concat(0, &[&f32s(&[1, 4]), &f32s(&[2, 4]), &f32s(&[3, 4])]).unwrap();
        assert_eq!(s, f32s(&[6, 4]));
    }

    #[test]
    fn test_concat_errors() {
        assert!(concat(0, &[]).is_err());
        assert!(concat(2, &[&f32s(&[2, 3])]).is_err());
        assert!(concat(1, &[&f32s(&[2, 3]), &f32s(&[3, 3])]).is_err());
        assert!(concat(0, &[&f32s(&[2, 3]), &f32s(&[2])]).is_err());
        let i = Shape::new(DataType::Int32, vec![2, 3]);
        assert!(concat(0, &[&f32s(&[2, 3]), &i]).is_err());
    }

    #[test]
    fn test_cast() {
        let b = Shape::new(DataType::Bool, vec![2]);
        assert_eq!(cast(&b, DataType::Float32).unwrap(), f32s(&[2]));
        assert_eq!(
            cast(&f32s(&[2]), DataType::BFloat16).unwrap().dtype(),
            DataType::BFloat16
        );
        assert!(cast(&f32s(&[2]), DataType::Bool).is_err());
        assert!(cast(&f32s(&[2]), DataType::Invalid).is_err());
        assert!(cast(&b, DataType::Bool).is_ok());
    }

    #[test]
    fn test_slice() {
        assert_eq!(slice(&f32s(&[3, 4]), 2).unwrap(), f32s(&[4]));
        assert_eq!(slice(&f32s(&[3]), 0).unwrap(), f32s(&[]));
        assert!(slice(&f32s(&[3, 4]), 3).is_err());
        assert!(slice(&f32s(&[]), 0).is_err());
    }

    #[test]
    fn test_set() {
        let idx = Shape::scalar(DataType::Int32);
        assert_eq!(set(&f32s(&[3, 4]), &f32s(&[4]), &idx).unwrap(), f32s(&[3, 4]));
        assert!(set(&f32s(&[3, 4]), &f32s(&[3]), &idx).is_err());
        assert!(set(&f32s(&[3, 4]), &f32s(&[4]), &f32s(&[])).is_err());
    }

    #[test]
    fn test_dot_general_matmul() {
        let s = dot_general(&f32s(&[2, 3]), &f32s(&[3, 4]), [&[], &[]], [&[1], &[0]]).unwrap();
        assert_eq!(s, f32s(&[2, 4]));
    }

    #[test]
    fn test_dot_general_batched() {
        let s = dot_general(
            &f32s(&[5, 2, 3]),
            &f32s(&[5, 3, 4]),
            [&[0], &[0]],
            [&[2], &[1]],
        )
        .unwrap();
        assert_eq!(s, f32s(&[5, 2, 4]));
    }

    #[test]
    fn test_dot_general_errors() {
        let x = f32s(&[2, 3]);
        let y = f32s(&[4, 4]);
        assert!(dot_general(&x, &y, [&[], &[]], [&[1], &[0]]).is_err());
        assert!(dot_general(&x, &x, [&[], &[]], [&[1], &[]]).is_err());
        assert!(dot_general(&x, &x, [&[0], &[0]], [&[0], &[0]]).is_err());
        assert!(dot_general(&x, &x, [&[], &[]], [&[2], &[1]]).is_err());
    }

    #[test]
    fn test_broadcast_in_dim() {
        let s = broadcast_in_dim(&f32s(&[3]), &f32s(&[2, 3]), &[1]).unwrap();
        assert_eq!(s, f32s(&[2, 3]));
        let s = broadcast_in_dim(&f32s(&[1, 3]), &f32s(&[4, 3]), &[0, 1]).unwrap();
        assert_eq!(s, f32s(&[4, 3]));
        let s = broadcast_in_dim(&f32s(&[]), &f32s(&[2, 2]), &[]).unwrap();
        assert_eq!(s, f32s(&[2, 2]));
    }

    #[test]
    fn test_broadcast_in_dim_errors() {
        assert!(broadcast_in_dim(&f32s(&[3]), &f32s(&[2, 3]), &[0]).is_err());
        assert!(broadcast_in_dim(&f32s(&[3]), &f32s(&[2, 3]), &[]).is_err());
        assert!(broadcast_in_dim(&f32s(&[2, 3]), &f32s(&[2, 3]), &[1, 0]).is_err());
        assert!(broadcast_in_dim(&f32s(&[3]), &f32s(&[2, 3]), &[2]).is_err());
        let i = Shape::new(DataType::Int32, vec![2, 3]);
        assert!(broadcast_in_dim(&f32s(&[3]), &i, &[1]).is_err());
    }

    #[test]
    fn test_iota_and_math() {
        assert!(iota(&f32s(&[2, 3]), 1).is_ok());
        assert!(iota(&f32s(&[2, 3]), 2).is_err());
        assert!(iota(&Shape::new(DataType::Bool, vec![2]), 0).is_err());
        assert!(math(MathFunction::Cos, &f32s(&[2])).is_ok());
        assert!(math(MathFunction::Tanh, &Shape::new(DataType::Int32, vec![2])).is_err());
    }
}
