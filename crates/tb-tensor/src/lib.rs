//! `tb-tensor` - Value model and host/device memory contract for tensor backends.
//!
//! This crate provides:
//! - `DataType` and the truncating `BFloat16` element type
//! - `Shape`, an immutable dtype + axis-lengths value
//! - `Storage`, typed element vectors with a native-endian byte layout
//! - The `Platform`/`Device` contract
//! - The `Handle`/`DeviceHandle`/`HostBuffer` memory contract and `host_transfer`

pub mod bfloat16;
pub mod dtype;
pub mod error;
pub mod memory;
pub mod platform;
pub mod shape;
pub mod storage;

// Re-export primary types at the crate root for convenience.
pub use bfloat16::BFloat16;
pub use dtype::{ArrayElement, DataType};
pub use error::{Result, TensorError};
pub use memory::{
    host_transfer, Allocator, BufferState, DeviceHandle, Handle, HostAllocator, HostBuffer,
    HostBufferGuard,
};
pub use platform::{same_device, Device, Platform};
pub use shape::Shape;
pub use storage::{to_vec, Storage};
