use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tb_tensor::{
    Device, DeviceHandle, Handle, HostBuffer, Platform, Result, Shape, Storage, TensorError,
};
use tracing::debug;

use crate::config::CpuConfig;

/// Host-only platform whose devices are slices of the host.
///
/// Cheap to clone; clones share the same configuration.
#[derive(Debug, Clone)]
pub struct CpuPlatform {
    config: Arc<CpuConfig>,
}

impl CpuPlatform {
    pub fn new(config: CpuConfig) -> Self {
        debug!(
            platform = %config.name,
            devices = config.num_devices,
            "created cpu platform"
        );
        CpuPlatform {
            config: Arc::new(config),
        }
    }

    /// Platform configured from the environment.
    pub fn from_env() -> Self {
        CpuPlatform::new(CpuConfig::from_env())
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    /// Returns the concrete device at `index`.
    pub fn cpu_device(&self, index: usize) -> Result<CpuDevice> {
        if index >= self.config.num_devices {
            return Err(TensorError::InvalidDevice {
                platform: self.config.name.clone(),
                index,
                count: self.config.num_devices,
            });
        }
        Ok(CpuDevice {
            platform: self.clone(),
            ordinal: index,
        })
    }
}

impl Default for CpuPlatform {
    fn default() -> Self {
        CpuPlatform::new(CpuConfig::default())
    }
}

impl Platform for CpuPlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn device_count(&self) -> usize {
        self.config.num_devices
    }

    fn device(&self, index: usize) -> Result<Arc<dyn Device>> {
        Ok(Arc::new(self.cpu_device(index)?))
    }

    fn is_same(&self, other: &dyn Platform) -> bool {
        other
            .as_any()
            .downcast_ref::<CpuPlatform>()
            .is_some_and(|other| Arc::ptr_eq(&self.config, &other.config))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One device of a [`CpuPlatform`].
#[derive(Clone)]
pub struct CpuDevice {
    platform: CpuPlatform,
    ordinal: usize,
}

impl CpuDevice {
    pub fn cpu_platform(&self) -> &CpuPlatform {
        &self.platform
    }

    /// Places typed storage on this device without a byte round trip.
    pub fn upload(&self, shape: Shape, storage: Storage) -> Result<CpuDeviceHandle> {
        if storage.dtype() != shape.dtype() {
            return Err(TensorError::DTypeMismatch {
                expected: shape.dtype(),
                got: storage.dtype(),
            });
        }
        if shape.checked_size() != Some(storage.len()) {
            return Err(TensorError::Other(format!(
                "{} elements do not fill shape {}",
                storage.len(),
                shape
            )));
        }
        Ok(CpuDeviceHandle {
            device: self.clone(),
            shape,
            storage,
        })
    }
}

impl fmt::Debug for CpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuDevice({}:{})", self.platform.name(), self.ordinal)
    }
}

impl Device for CpuDevice {
    fn platform(&self) -> Arc<dyn Platform> {
        Arc::new(self.platform.clone())
    }

    fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn send(&self, bytes: &[u8], shape: &Shape) -> Result<Arc<dyn DeviceHandle>> {
        if !shape.dtype().is_valid() {
            return Err(TensorError::UnsupportedDType(format!(
                "cannot send data of shape {}",
                shape
            )));
        }
        let byte_size = shape
            .checked_byte_size()
            .ok_or_else(|| TensorError::AllocationFailed(shape.clone()))?;
        if bytes.len() != byte_size {
            return Err(TensorError::SizeMismatch {
                src: bytes.len(),
                dst: byte_size,
            });
        }
        let storage = Storage::from_bytes(shape.dtype(), bytes)?;
        Ok(Arc::new(self.upload(shape.clone(), storage)?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An array resident on a [`CpuDevice`].
#[derive(Debug, Clone)]
pub struct CpuDeviceHandle {
    device: CpuDevice,
    shape: Shape,
    storage: Storage,
}

impl CpuDeviceHandle {
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn cpu_device(&self) -> &CpuDevice {
        &self.device
    }
}

impl Handle for CpuDeviceHandle {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn to_device(&self, device: &dyn Device) -> Result<Arc<dyn DeviceHandle>> {
        if let Some(cpu) = device.as_any().downcast_ref::<CpuDevice>() {
            return Ok(Arc::new(CpuDeviceHandle {
                device: cpu.clone(),
                shape: self.shape.clone(),
                storage: self.storage.clone(),
            }));
        }
        device.send(&self.storage.to_bytes(), &self.shape)
    }

    fn to_host(&self, buffer: &HostBuffer) -> Result<()> {
        let mut bytes = buffer.acquire().ok_or(TensorError::BufferFreed)?;
        let src = self.storage.to_bytes();
        if src.len() != bytes.len() {
            return Err(TensorError::SizeMismatch {
                src: src.len(),
                dst: bytes.len(),
            });
        }
        bytes.copy_from_slice(&src);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl DeviceHandle for CpuDeviceHandle {
    fn device(&self) -> Arc<dyn Device> {
        Arc::new(self.device.clone())
    }

    fn into_handle(self: Arc<Self>) -> Arc<dyn Handle> {
        self
    }
}
