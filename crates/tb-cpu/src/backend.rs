use std::sync::Arc;

use tb_graph::{Backend, Capabilities, GraphError, NodeId, Program, Result, RunOutputs, Runner};
use tb_tensor::{Device, DeviceHandle, Handle, Platform};
use tracing::{debug, info};

use crate::interpreter::{self, Value};
use crate::platform::{CpuDevice, CpuDeviceHandle, CpuPlatform};

/// Compiles graphs for [`CpuPlatform`] devices.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    platform: CpuPlatform,
    capabilities: Capabilities,
}

impl CpuBackend {
    pub fn new(platform: CpuPlatform) -> Self {
        CpuBackend {
            platform,
            capabilities: Capabilities::ALL,
        }
    }

    /// Restricts the advertised builder capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn cpu_platform(&self) -> &CpuPlatform {
        &self.platform
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        CpuBackend::new(CpuPlatform::default())
    }
}

impl Backend for CpuBackend {
    fn platform(&self) -> Arc<dyn Platform> {
        Arc::new(self.platform.clone())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn compile(&self, device: Arc<dyn Device>, program: Program) -> Result<Box<dyn Runner>> {
        let device = device
            .as_any()
            .downcast_ref::<CpuDevice>()
            .cloned()
            .ok_or_else(|| GraphError::Unsupported(format!("device {:?}", device)))?;
        info!(
            function = program.entry.name(),
            nodes = program.entry.len(),
            device = device.ordinal(),
            "compiled cpu runner"
        );
        Ok(Box::new(CpuRunner { device, program }))
    }
}

/// Interprets a compiled program on one CPU device.
pub struct CpuRunner {
    device: CpuDevice,
    program: Program,
}

impl CpuRunner {
    fn load(&self, input: &Arc<dyn Handle>) -> Result<Value> {
        let local = input.to_device(&self.device)?;
        let handle = local
            .as_any()
            .downcast_ref::<CpuDeviceHandle>()
            .ok_or_else(|| GraphError::Execution("input did not land on a cpu device".into()))?;
        Ok(Value::Array(handle.storage().clone()))
    }

    fn collect(&self, values: &[Value], ids: &[NodeId]) -> Result<Vec<Arc<dyn DeviceHandle>>> {
        let mut handles: Vec<Arc<dyn DeviceHandle>> = Vec::with_capacity(ids.len());
        for &id in ids {
            let shape = self.program.entry.instruction(id).ty.as_array().cloned();
            let shape = shape
                .ok_or_else(|| GraphError::Execution(format!("output {} is not an array", id)))?;
            let storage = values[id.0].clone().into_array("output")?;
            handles.push(Arc::new(self.device.upload(shape, storage)?));
        }
        Ok(handles)
    }
}

impl Runner for CpuRunner {
    fn run(&self, inputs: &[Arc<dyn Handle>]) -> Result<RunOutputs> {
        self.program.check_inputs(inputs)?;
        debug!(
            function = self.program.entry.name(),
            device = self.device.ordinal(),
            inputs = inputs.len(),
            "running graph"
        );
        let args = inputs
            .iter()
            .map(|input| self.load(input))
            .collect::<Result<Vec<_>>>()?;
        let values = interpreter::evaluate(&self.program.entry, &args)?;
        let outputs = self.collect(&values, &self.program.outputs)?;
        let traced = self.collect(&values, &self.program.traced)?;
        Ok((outputs, traced))
    }
}
