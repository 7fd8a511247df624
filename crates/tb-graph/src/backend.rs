use std::fmt::Debug;
use std::sync::Arc;

use tb_tensor::{Device, DeviceHandle, Handle, Platform};

use crate::error::Result;
use crate::program::Program;

/// Optional builder capabilities of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Provides [`NumBuilder`](crate::NumBuilder).
    pub num: bool,
    /// Provides [`MathBuilder`](crate::MathBuilder).
    pub math: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        num: true,
        math: true,
    };

    pub const CORE_ONLY: Capabilities = Capabilities {
        num: false,
        math: false,
    };
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::ALL
    }
}

/// A compiler turning frozen programs into runnables for a platform's devices.
pub trait Backend: Send + Sync + Debug {
    /// Platform whose devices this backend compiles for.
    fn platform(&self) -> Arc<dyn Platform>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Compiles `program` for `device`.
    fn compile(&self, device: Arc<dyn Device>, program: Program) -> Result<Box<dyn Runner>>;
}

/// Outputs and traced outputs of one run, in declaration order.
pub type RunOutputs = (Vec<Arc<dyn DeviceHandle>>, Vec<Arc<dyn DeviceHandle>>);

/// A compiled graph bound to a device.
///
/// Runners hold no state between runs and may be invoked concurrently.
pub trait Runner: Send + Sync {
    /// Executes the graph, binding `inputs` positionally to its arguments.
    fn run(&self, inputs: &[Arc<dyn Handle>]) -> Result<RunOutputs>;
}

impl Debug for dyn Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Runner")
    }
}
