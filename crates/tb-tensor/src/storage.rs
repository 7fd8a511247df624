use crate::bfloat16::BFloat16;
use crate::dtype::{ArrayElement, DataType};
use crate::error::{Result, TensorError};

/// Typed, host-side element storage.
///
/// One variant per valid [`DataType`]. Converts to and from the raw
/// native-endian byte layout used by host buffers and device handles.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    BFloat16(Vec<BFloat16>),
}

/// Runs `$body` with `$v` bound to the inner vector of any variant.
#[macro_export]
macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            $crate::Storage::Bool($v) => $body,
            $crate::Storage::Int32($v) => $body,
            $crate::Storage::Int64($v) => $body,
            $crate::Storage::Uint32($v) => $body,
            $crate::Storage::Uint64($v) => $body,
            $crate::Storage::Float32($v) => $body,
            $crate::Storage::Float64($v) => $body,
            $crate::Storage::BFloat16($v) => $body,
        }
    };
}

impl Storage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DataType {
        match self {
            Storage::Bool(_) => DataType::Bool,
            Storage::Int32(_) => DataType::Int32,
            Storage::Int64(_) => DataType::Int64,
            Storage::Uint32(_) => DataType::Uint32,
            Storage::Uint64(_) => DataType::Uint64,
            Storage::Float32(_) => DataType::Float32,
            Storage::Float64(_) => DataType::Float64,
            Storage::BFloat16(_) => DataType::BFloat16,
        }
    }

    /// Create zero-filled storage for the given dtype and element count.
    ///
    /// # Errors
    /// Returns an error for [`DataType::Invalid`].
    pub fn zeros(dtype: DataType, n: usize) -> Result<Self> {
        Ok(match dtype {
            DataType::Bool => Storage::Bool(vec![false; n]),
            DataType::Int32 => Storage::Int32(vec![0; n]),
            DataType::Int64 => Storage::Int64(vec![0; n]),
            DataType::Uint32 => Storage::Uint32(vec![0; n]),
            DataType::Uint64 => Storage::Uint64(vec![0; n]),
            DataType::Float32 => Storage::Float32(vec![0.0; n]),
            DataType::Float64 => Storage::Float64(vec![0.0; n]),
            DataType::BFloat16 => Storage::BFloat16(vec![BFloat16::ZERO; n]),
            DataType::Invalid => {
                return Err(TensorError::UnsupportedDType(
                    "cannot create storage for an invalid dtype".to_string(),
                ))
            }
        })
    }

    pub fn from_vec<T: ArrayElement>(values: Vec<T>) -> Self {
        T::into_storage(values)
    }

    /// Decodes native-endian bytes into typed storage.
    ///
    /// # Errors
    /// Returns an error if `dtype` is invalid or if `bytes.len()` is not a
    /// multiple of the element size.
    pub fn from_bytes(dtype: DataType, bytes: &[u8]) -> Result<Self> {
        Ok(match dtype {
            DataType::Bool => Storage::Bool(to_vec(bytes)?),
            DataType::Int32 => Storage::Int32(to_vec(bytes)?),
            DataType::Int64 => Storage::Int64(to_vec(bytes)?),
            DataType::Uint32 => Storage::Uint32(to_vec(bytes)?),
            DataType::Uint64 => Storage::Uint64(to_vec(bytes)?),
            DataType::Float32 => Storage::Float32(to_vec(bytes)?),
            DataType::Float64 => Storage::Float64(to_vec(bytes)?),
            DataType::BFloat16 => Storage::BFloat16(to_vec(bytes)?),
            DataType::Invalid => {
                return Err(TensorError::UnsupportedDType(
                    "cannot decode bytes of an invalid dtype".to_string(),
                ))
            }
        })
    }

    /// Encodes the elements as native-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.dtype().size_in_bytes());
        with_storage!(self, v => {
            for x in v {
                x.write_ne(&mut out);
            }
        });
        out
    }

    /// Returns the elements as a typed slice.
    ///
    /// # Errors
    /// Returns an error if `T` does not match the storage dtype.
    pub fn as_slice<T: ArrayElement>(&self) -> Result<&[T]> {
        T::storage_slice(self).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got: self.dtype(),
        })
    }
}

/// Reinterprets a native-endian byte buffer as a vector of `T`.
///
/// # Errors
/// Returns an error if `bytes.len()` is not a multiple of the size of `T`.
pub fn to_vec<T: ArrayElement>(bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::DTYPE.size_in_bytes();
    if bytes.len() % size != 0 {
        return Err(TensorError::Other(format!(
            "data [{}]byte cannot be read as {}: {} % {} != 0",
            bytes.len(),
            T::DTYPE,
            bytes.len(),
            size
        )));
    }
    Ok(bytes.chunks_exact(size).map(T::read_ne).collect())
}
