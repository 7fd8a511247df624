//! Kernels that move elements without computing on them, plus `iota`.

use tb_graph::{GraphError, Result};
use tb_tensor::{Shape, Storage};

use super::elementwise::Numeric;
use super::index::{offset, MultiIndex};

fn inner_size(shape: &Shape, from_axis: usize) -> usize {
    shape.axis_lengths()[from_axis..].iter().product()
}

/// Joins `inputs` along `axis`. All inputs share the result's dtype.
pub(crate) fn concat(axis: usize, inputs: &[(&Storage, &Shape)], out: &Shape) -> Result<Storage> {
    with_element_type!(out.dtype(), "concat", T => {
        let outer: usize = out.axis_lengths()[..axis].iter().product();
        let mut parts = Vec::with_capacity(inputs.len());
        for (storage, shape) in inputs {
            parts.push((storage.as_slice::<T>()?, inner_size(shape, axis)));
        }
        let mut values: Vec<T> = Vec::with_capacity(out.size());
        for o in 0..outer {
            for (data, chunk) in &parts {
                values.extend_from_slice(&data[o * chunk..(o + 1) * chunk]);
            }
        }
        Ok(Storage::from_vec(values))
    })
}

/// Extracts row `index` of the outermost axis.
pub(crate) fn slice(x: &Storage, shape: &Shape, index: usize) -> Result<Storage> {
    if index >= shape.outer_axis_length() || shape.rank() == 0 {
        return Err(GraphError::IndexOutOfRange {
            op: "slice",
            index,
            len: shape.outer_axis_length(),
        });
    }
    let row = inner_size(shape, 1);
    Ok(tb_tensor::with_storage!(x, v => {
        Storage::from_vec(v[index * row..(index + 1) * row].to_vec())
    }))
}

fn scalar_index(index: &Storage) -> Result<i128> {
    let value = match index {
        Storage::Int32(v) => v.first().map(|&i| i as i128),
        Storage::Int64(v) => v.first().map(|&i| i as i128),
        Storage::Uint32(v) => v.first().map(|&i| i as i128),
        Storage::Uint64(v) => v.first().map(|&i| i as i128),
        other => {
            return Err(GraphError::UnsupportedDType {
                op: "set",
                dtype: other.dtype(),
            })
        }
    };
    value.ok_or_else(|| GraphError::Execution("set: empty index".to_string()))
}

/// Returns a copy of `x` with row `index` of the outermost axis replaced.
pub(crate) fn set(
    x: &Storage,
    shape: &Shape,
    updates: &Storage,
    index: &Storage,
) -> Result<Storage> {
    let outer = shape.outer_axis_length();
    let i = scalar_index(index)?;
    if i < 0 || i >= outer as i128 {
        return Err(GraphError::Execution(format!(
            "set: index {} out of range for outer axis of length {}",
            i, outer
        )));
    }
    let i = i as usize;
    let row = inner_size(shape, 1);
    with_element_type!(shape.dtype(), "set", T => {
        let mut values = x.as_slice::<T>()?.to_vec();
        values[i * row..(i + 1) * row].copy_from_slice(updates.as_slice::<T>()?);
        Ok(Storage::from_vec(values))
    })
}

/// Expands `x` to `target`; axis `i` of `x` maps to `broadcast_axes[i]`.
pub(crate) fn broadcast_in_dim(
    x: &Storage,
    shape: &Shape,
    target: &Shape,
    broadcast_axes: &[usize],
) -> Result<Storage> {
    let strides = shape.strides();
    let lengths = shape.axis_lengths();
    with_element_type!(target.dtype(), "broadcast_in_dim", T => {
        let data = x.as_slice::<T>()?;
        let mut values: Vec<T> = Vec::with_capacity(target.size());
        let mut src = vec![0; shape.rank()];
        for index in MultiIndex::new(target.axis_lengths()) {
            for (i, &axis) in broadcast_axes.iter().enumerate() {
                src[i] = if lengths[i] == 1 { 0 } else { index[axis] };
            }
            values.push(data[offset(&src, &strides)]);
        }
        Ok(Storage::from_vec(values))
    })
}

/// Fills `shape` with each element's coordinate along `axis`.
pub(crate) fn iota(shape: &Shape, axis: usize) -> Result<Storage> {
    with_numeric_type!(shape.dtype(), "iota", T => {
        let values: Vec<T> = MultiIndex::new(shape.axis_lengths())
            .map(|index| T::from_usize(index[axis]))
            .collect();
        Ok(Storage::from_vec(values))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_tensor::DataType;

    fn shape(dtype: DataType, axes: &[usize]) -> Shape {
        Shape::new(dtype, axes.to_vec())
    }

    #[test]
    fn test_concat_inner_axis() {
        let a = Storage::Int32(vec![1, 2, 3, 4]);
        let b = Storage::Int32(vec![5, 6]);
        let sa = shape(DataType::Int32, &[2, 2]);
        let sb = shape(DataType::Int32, &[2, 1]);
        let out = shape(DataType::Int32, &[2, 3]);
        assert_eq!(
            concat(1, &[(&a, &sa), (&b, &sb)], &out).unwrap(),
            Storage::Int32(vec![1, 2, 5, 3, 4, 6])
        );
        let out = shape(DataType::Int32, &[4, 2]);
        assert_eq!(
            concat(0, &[(&a, &sa), (&a, &sa)], &out).unwrap(),
            Storage::Int32(vec![1, 2, 3, 4, 1, 2, 3, 4])
        );
    }

    #[test]
    fn test_slice_and_set() {
        let s = shape(DataType::Float32, &[3, 2]);
        let x = Storage::Float32(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(slice(&x, &s, 1).unwrap(), Storage::Float32(vec![2.0, 3.0]));
        assert!(slice(&x, &s, 3).is_err());

        let updated = set(
            &x,
            &s,
            &Storage::Float32(vec![9.0, 8.0]),
            &Storage::Int64(vec![2]),
        )
        .unwrap();
        assert_eq!(
            updated,
            Storage::Float32(vec![0.0, 1.0, 2.0, 3.0, 9.0, 8.0])
        );
        // The input is untouched.
        assert_eq!(x, Storage::Float32(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]));
        let err = set(&x, &s, &Storage::Float32(vec![0.0, 0.0]), &Storage::Int32(vec![-1]));
        assert!(matches!(err.unwrap_err(), GraphError::Execution(_)));
    }

    #[test]
    fn test_broadcast() {
        let s = shape(DataType::Int64, &[3]);
        let x = Storage::Int64(vec![1, 2, 3]);
        // New leading axis.
        let target = shape(DataType::Int64, &[2, 3]);
        assert_eq!(
            broadcast_in_dim(&x, &s, &target, &[1]).unwrap(),
            Storage::Int64(vec![1, 2, 3, 1, 2, 3])
        );
        // New trailing axis.
        let target = shape(DataType::Int64, &[3, 2]);
        assert_eq!(
            broadcast_in_dim(&x, &s, &target, &[0]).unwrap(),
            Storage::Int64(vec![1, 1, 2, 2, 3, 3])
        );
        // Stretched size-1 axis.
        let s = shape(DataType::Int64, &[1, 2]);
        let target = shape(DataType::Int64, &[3, 2]);
        assert_eq!(
            broadcast_in_dim(&Storage::Int64(vec![7, 8]), &s, &target, &[0, 1]).unwrap(),
            Storage::Int64(vec![7, 8, 7, 8, 7, 8])
        );
    }

    #[test]
    fn test_iota() {
        let s = shape(DataType::Uint32, &[2, 3]);
        assert_eq!(iota(&s, 0).unwrap(), Storage::Uint32(vec![0, 0, 0, 1, 1, 1]));
        assert_eq!(iota(&s, 1).unwrap(), Storage::Uint32(vec![0, 1, 2, 0, 1, 2]));
        assert!(iota(&shape(DataType::Bool, &[2]), 0).is_err());
    }
}
