//! Platforms and devices.
//!
//! A platform manages a host and its associated devices, and provides the
//! means to exchange data among them.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Result;
use crate::memory::DeviceHandle;
use crate::shape::Shape;

/// A host orchestrating zero or more devices.
pub trait Platform: Send + Sync + Debug {
    /// Name of the platform (e.g. "cpu").
    fn name(&self) -> &str;

    /// Number of devices managed by the platform.
    fn device_count(&self) -> usize;

    /// Returns the device at `index`.
    ///
    /// # Errors
    /// Returns [`TensorError::InvalidDevice`](crate::TensorError::InvalidDevice)
    /// if `index >= device_count()`.
    fn device(&self, index: usize) -> Result<Arc<dyn Device>>;

    /// Returns true if `other` is this platform. Two platforms that merely
    /// share a name are distinct.
    fn is_same(&self, other: &dyn Platform) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// A device that can receive data and run compiled graphs.
pub trait Device: Send + Sync + Debug {
    /// The platform owning this device.
    fn platform(&self) -> Arc<dyn Platform>;

    /// Index of the device on its platform.
    fn ordinal(&self) -> usize;

    /// Sends raw data to the device.
    ///
    /// `bytes` must hold exactly `shape.byte_size()` bytes.
    fn send(&self, bytes: &[u8], shape: &Shape) -> Result<Arc<dyn DeviceHandle>>;

    fn as_any(&self) -> &dyn Any;
}

/// Returns true if both devices are the same device of the same platform.
pub fn same_device(a: &dyn Device, b: &dyn Device) -> bool {
    a.ordinal() == b.ordinal() && a.platform().is_same(b.platform().as_ref())
}
