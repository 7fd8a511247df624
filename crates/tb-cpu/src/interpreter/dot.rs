use tb_graph::Result;
use tb_tensor::{Shape, Storage};

use super::elementwise::Numeric;
use super::index::{offset, MultiIndex};

/// Axes of one operand grouped by role.
struct OperandAxes {
    strides: Vec<usize>,
    batch: Vec<usize>,
    free: Vec<usize>,
    reduce: Vec<usize>,
}

impl OperandAxes {
    fn new(shape: &Shape, batch: &[usize], reduce: &[usize]) -> Self {
        let free = (0..shape.rank())
            .filter(|a| !batch.contains(a) && !reduce.contains(a))
            .collect();
        OperandAxes {
            strides: shape.strides(),
            batch: batch.to_vec(),
            free,
            reduce: reduce.to_vec(),
        }
    }

    fn lengths(shape: &Shape, axes: &[usize]) -> Vec<usize> {
        axes.iter().map(|&a| shape.axis_lengths()[a]).collect()
    }

    /// Flat offset of the element addressed by the three partial indices.
    fn locate(&self, batch: &[usize], free: &[usize], reduce: &[usize]) -> usize {
        let mut index = vec![0; self.strides.len()];
        for (axes, values) in [(&self.batch, batch), (&self.free, free), (&self.reduce, reduce)] {
            for (&axis, &value) in axes.iter().zip(values) {
                index[axis] = value;
            }
        }
        offset(&index, &self.strides)
    }
}

fn contract<T: Numeric>(
    x: &[T],
    xa: &OperandAxes,
    y: &[T],
    ya: &OperandAxes,
    lengths: [&[usize]; 4],
) -> Vec<T> {
    let [batch, x_free, y_free, reduce] = lengths;
    let float = T::DTYPE.is_float();
    let mut out = Vec::new();
    for b in MultiIndex::new(batch) {
        for i in MultiIndex::new(x_free) {
            for j in MultiIndex::new(y_free) {
                // Floats accumulate in f64; integers wrap in their own type.
                let mut sum_f = 0.0f64;
                let mut sum_i = T::from_usize(0);
                for k in MultiIndex::new(reduce) {
                    let a = x[xa.locate(&b, &i, &k)];
                    let c = y[ya.locate(&b, &j, &k)];
                    if float {
                        sum_f += a.to_f64() * c.to_f64();
                    } else {
                        sum_i = sum_i.add(a.mul(c));
                    }
                }
                out.push(if float { T::from_f64(sum_f) } else { sum_i });
            }
        }
    }
    out
}

/// Generalized contraction; the output holds batch axes, then the free axes
/// of `x`, then those of `y`.
pub(crate) fn dot_general(
    x: &Storage,
    x_shape: &Shape,
    y: &Storage,
    y_shape: &Shape,
    batch_axes: &[Vec<usize>; 2],
    reduce_axes: &[Vec<usize>; 2],
) -> Result<Storage> {
    let xa = OperandAxes::new(x_shape, &batch_axes[0], &reduce_axes[0]);
    let ya = OperandAxes::new(y_shape, &batch_axes[1], &reduce_axes[1]);
    let batch = OperandAxes::lengths(x_shape, &xa.batch);
    let x_free = OperandAxes::lengths(x_shape, &xa.free);
    let y_free = OperandAxes::lengths(y_shape, &ya.free);
    let reduce = OperandAxes::lengths(x_shape, &xa.reduce);
    with_numeric_type!(x_shape.dtype(), "dot_general", T => {
        let values = contract(
            x.as_slice::<T>()?,
            &xa,
            y.as_slice::<T>()?,
            &ya,
            [&batch, &x_free, &y_free, &reduce],
        );
        Ok(Storage::from_vec(values))
    })
}
