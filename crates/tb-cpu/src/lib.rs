//! `tb-cpu` - Reference CPU backend.
//!
//! Compiling a graph keeps its frozen program; running it interprets the
//! program on host memory. Intended for correctness checks of the graph
//! contract, not for speed.

pub mod backend;
pub mod config;
mod interpreter;
pub mod logging;
pub mod platform;

pub use backend::{CpuBackend, CpuRunner};
pub use config::CpuConfig;
pub use platform::{CpuDevice, CpuDeviceHandle, CpuPlatform};
