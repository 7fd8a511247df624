use thiserror::Error;

use crate::dtype::DataType;
use crate::shape::Shape;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("cannot transfer data from a buffer of size {src} to a buffer of size {dst}")]
    SizeMismatch { src: usize, dst: usize },
    #[error("host buffer has been freed")]
    BufferFreed,
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DataType, got: DataType },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
    #[error("cannot allocate a host buffer of shape {0}")]
    AllocationFailed(Shape),
    #[error("device {index} does not exist on platform '{platform}' ({count} devices)")]
    InvalidDevice {
        platform: String,
        index: usize,
        count: usize,
    },
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
