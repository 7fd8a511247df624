use std::fmt;

use crate::dtype::DataType;

/// Shape of an array: the kind of its elements plus its axis lengths in
/// major-to-minor order.
///
/// Shapes are immutable values and compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dtype: DataType,
    axis_lengths: Vec<usize>,
}

impl Shape {
    pub fn new(dtype: DataType, axis_lengths: Vec<usize>) -> Self {
        Shape {
            dtype,
            axis_lengths,
        }
    }

    /// Shape of an atomic value (rank 0).
    pub fn scalar(dtype: DataType) -> Self {
        Shape::new(dtype, Vec::new())
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn axis_lengths(&self) -> &[usize] {
        &self.axis_lengths
    }

    pub fn rank(&self) -> usize {
        self.axis_lengths.len()
    }

    /// Returns the outermost axis length, or 1 for rank-0 shapes.
    pub fn outer_axis_length(&self) -> usize {
        self.axis_lengths.first().copied().unwrap_or(1)
    }

    /// Returns true for the shape of a single value with no axis.
    pub fn is_atomic(&self) -> bool {
        self.axis_lengths.is_empty()
    }

    /// Number of elements (product of all axis lengths, 1 for atomic shapes).
    ///
    /// Only meaningful for shapes whose [`checked_size`](Self::checked_size)
    /// is `Some`; builders and allocators reject the others.
    pub fn size(&self) -> usize {
        self.axis_lengths.iter().product()
    }

    /// Number of elements, or `None` if it does not fit in `usize`.
    pub fn checked_size(&self) -> Option<usize> {
        self.axis_lengths
            .iter()
            .try_fold(1usize, |acc, &len| acc.checked_mul(len))
    }

    /// Number of bytes needed to store an array of this shape.
    ///
    /// # Panics
    /// Panics if the dtype is [`DataType::Invalid`].
    pub fn byte_size(&self) -> usize {
        self.size() * self.dtype.size_in_bytes()
    }

    /// Number of bytes, or `None` if it does not fit in `usize`.
    ///
    /// # Panics
    /// Panics if the dtype is [`DataType::Invalid`].
    pub fn checked_byte_size(&self) -> Option<usize> {
        self.checked_size()?.checked_mul(self.dtype.size_in_bytes())
    }

    /// Same dtype, different axis lengths.
    pub fn with_axis_lengths(&self, axis_lengths: Vec<usize>) -> Shape {
        Shape::new(self.dtype, axis_lengths)
    }

    /// Same axis lengths, different dtype.
    pub fn with_dtype(&self, dtype: DataType) -> Shape {
        Shape::new(dtype, self.axis_lengths.clone())
    }

    /// Computes row-major contiguous strides, in elements.
    ///
    /// For axis lengths [d0, d1, d2], the strides are [d1*d2, d2, 1].
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![0usize; self.axis_lengths.len()];
        let mut acc = 1usize;
        for (i, len) in self.axis_lengths.iter().enumerate().rev() {
            strides[i] = acc;
            acc *= len;
        }
        strides
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for len in &self.axis_lengths {
            write!(f, "[{}]", len)?;
        }
        write!(f, "{}", self.dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_shape() {
        let s = Shape::new(DataType::Float32, vec![2, 3, 4]);
        assert_eq!(s.rank(), 3);
        assert_eq!(s.size(), 24);
        assert_eq!(s.byte_size(), 96);
        assert_eq!(s.outer_axis_length(), 2);
        assert!(!s.is_atomic());
    }

    #[test]
    fn test_checked_size_overflow() {
        let s = Shape::new(DataType::Float32, vec![usize::MAX, 2]);
        assert_eq!(s.checked_size(), None);
        assert_eq!(s.checked_byte_size(), None);

        let s = Shape::new(DataType::Float64, vec![usize::MAX / 4, 2]);
        assert!(s.checked_size().is_some());
        assert_eq!(s.checked_byte_size(), None);

        let s = Shape::new(DataType::Int32, vec![usize::MAX, 0]);
        assert_eq!(s.checked_size(), Some(0));
        assert_eq!(s.checked_byte_size(), Some(0));

        let s = Shape::new(DataType::Int32, vec![3, 5]);
        assert_eq!(s.checked_size(), Some(15));
        assert_eq!(s.checked_byte_size(), Some(60));
    }

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar(DataType::Int64);
        assert_eq!(s.size(), 1);
        assert_eq!(s.byte_size(), 8);
        assert_eq!(s.outer_axis_length(), 1);
        assert!(s.is_atomic());
        assert!(s.strides().is_empty());
    }

    #[test]
    fn test_byte_size_is_size_times_element() {
        for dtype in DataType::ALL {
            for axes in [vec![], vec![0], vec![5], vec![2, 7], vec![3, 1, 4]] {
                let s = Shape::new(dtype, axes);
                assert_eq!(s.byte_size(), s.size() * dtype.size_in_bytes());
            }
        }
    }

    #[test]
    fn test_strides() {
        let s = Shape::new(DataType::Float32, vec![2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_equality() {
        let x = Shape::new(DataType::Float32, vec![1, 2]);
        assert_eq!(x, Shape::new(DataType::Float32, vec![1, 2]));
        assert_ne!(x, Shape::new(DataType::Int32, vec![1, 2]));
        assert_ne!(x, Shape::new(DataType::Float32, vec![1]));
        assert_ne!(x, Shape::new(DataType::Float32, vec![1, 3]));
        assert_eq!(Shape::scalar(DataType::Float32), Shape::scalar(DataType::Float32));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::new(DataType::Float32, vec![2, 3]).to_string(), "[2][3]float32");
        assert_eq!(Shape::scalar(DataType::Bool).to_string(), "bool");
    }
}
