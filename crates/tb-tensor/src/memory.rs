//! Host/device memory model.
//!
//! A [`Handle`] is an array with a shape that can be moved to a device or
//! copied out to host memory. [`DeviceHandle`]s live on a device;
//! [`HostBuffer`]s live in host memory and are shared between the runtime and
//! its users under an acquire/release discipline.

use std::any::Any;
use std::fmt::{self, Debug};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, trace};

use crate::dtype::ArrayElement;
use crate::error::{Result, TensorError};
use crate::platform::Device;
use crate::shape::Shape;
use crate::storage::Storage;

/// Handle to an array managed by a platform.
pub trait Handle: Send + Sync + Debug {
    /// Shape of the underlying array.
    fn shape(&self) -> &Shape;

    /// Copies the array onto `device`, yielding a new device-resident handle.
    fn to_device(&self, device: &dyn Device) -> Result<Arc<dyn DeviceHandle>>;

    /// Copies the array into a caller-supplied host buffer.
    fn to_host(&self, buffer: &HostBuffer) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// An array resident on a specific device.
pub trait DeviceHandle: Handle {
    /// Device on which the array is located.
    fn device(&self) -> Arc<dyn Device>;

    /// Views this device handle as a plain [`Handle`].
    fn into_handle(self: Arc<Self>) -> Arc<dyn Handle>;
}

/// Lifecycle state of a [`HostBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Unlocked,
    Locked,
    Freed,
}

/// A byte buffer located in host memory, shared between a platform and its
/// users.
///
/// The data must be acquired before being read or written. While acquired,
/// every other access, including another `acquire`, blocks until the guard is
/// released. This is a mutual-exclusion lock, not a reference count.
pub struct HostBuffer {
    shape: Shape,
    data: Mutex<Option<Vec<u8>>>,
}

impl HostBuffer {
    fn with_bytes(shape: Shape, bytes: Vec<u8>) -> Self {
        HostBuffer {
            shape,
            data: Mutex::new(Some(bytes)),
        }
    }

    /// Creates a buffer holding `storage` laid out as `shape`.
    ///
    /// # Errors
    /// Returns an error if the storage dtype or length disagrees with `shape`.
    pub fn from_storage(shape: Shape, storage: &Storage) -> Result<Self> {
        if storage.dtype() != shape.dtype() {
            return Err(TensorError::DTypeMismatch {
                expected: shape.dtype(),
                got: storage.dtype(),
            });
        }
        if shape.checked_size() != Some(storage.len()) {
            return Err(TensorError::Other(format!(
                "{} elements cannot fill a buffer of shape {}",
                storage.len(),
                shape
            )));
        }
        Ok(HostBuffer::with_bytes(shape, storage.to_bytes()))
    }

    /// Creates a buffer from typed values laid out along `axis_lengths`.
    pub fn from_vec<T: ArrayElement>(axis_lengths: Vec<usize>, values: Vec<T>) -> Result<Self> {
        let shape = Shape::new(T::DTYPE, axis_lengths);
        HostBuffer::from_storage(shape, &Storage::from_vec(values))
    }

    /// Creates a buffer holding a single atomic value.
    pub fn scalar<T: ArrayElement>(value: T) -> Self {
        let mut bytes = Vec::with_capacity(T::DTYPE.size_in_bytes());
        value.write_ne(&mut bytes);
        HostBuffer::with_bytes(Shape::scalar(T::DTYPE), bytes)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the buffer and returns its bytes.
    ///
    /// Blocks while another caller holds the buffer. Returns `None` if the
    /// buffer has been freed. Dropping (or [`release`](HostBufferGuard::release)-ing)
    /// the guard unlocks the buffer.
    pub fn acquire(&self) -> Option<HostBufferGuard<'_>> {
        let guard = self.lock();
        if guard.is_none() {
            return None;
        }
        trace!(shape = %self.shape, "host buffer acquired");
        Some(HostBufferGuard { guard })
    }

    /// Frees the memory held by the buffer. Every later `acquire` yields
    /// `None`.
    ///
    /// If the buffer is currently acquired, blocks until it is released. A
    /// thread must not free a buffer it holds itself.
    pub fn free(&self) {
        let mut guard = self.lock();
        if guard.take().is_some() {
            debug!(shape = %self.shape, "host buffer freed");
        }
    }

    pub fn is_freed(&self) -> bool {
        self.state() == BufferState::Freed
    }

    /// Returns the current lifecycle state without blocking.
    pub fn state(&self) -> BufferState {
        match self.data.try_lock() {
            Ok(guard) => state_of(&guard),
            Err(TryLockError::Poisoned(poisoned)) => state_of(&poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => BufferState::Locked,
        }
    }

    /// Decodes the buffer contents into typed storage.
    pub fn read_storage(&self) -> Result<Storage> {
        let bytes = self.acquire().ok_or(TensorError::BufferFreed)?;
        Storage::from_bytes(self.shape.dtype(), &bytes)
    }
}

fn state_of(data: &Option<Vec<u8>>) -> BufferState {
    match data {
        Some(_) => BufferState::Unlocked,
        None => BufferState::Freed,
    }
}

impl Debug for HostBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBuffer")
            .field("shape", &self.shape.to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl Handle for HostBuffer {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn to_device(&self, device: &dyn Device) -> Result<Arc<dyn DeviceHandle>> {
        let bytes = self.acquire().ok_or(TensorError::BufferFreed)?;
        device.send(&bytes, &self.shape)
    }

    fn to_host(&self, buffer: &HostBuffer) -> Result<()> {
        host_transfer(buffer, self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Exclusive access to the bytes of an acquired [`HostBuffer`].
pub struct HostBufferGuard<'a> {
    guard: MutexGuard<'a, Option<Vec<u8>>>,
}

impl HostBufferGuard<'_> {
    /// Unlocks the buffer. Equivalent to dropping the guard.
    pub fn release(self) {}
}

impl Deref for HostBufferGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.as_deref().unwrap_or_default()
    }
}

impl DerefMut for HostBufferGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.guard.as_deref_mut().unwrap_or_default()
    }
}

/// Allocates memory on the host.
pub trait Allocator: Send + Sync {
    /// Reserves a zero-filled host buffer sized for `shape`.
    fn allocate(&self, shape: &Shape) -> Result<Arc<HostBuffer>>;
}

/// Allocator backed by the process heap.
#[derive(Debug, Clone, Default)]
pub struct HostAllocator;

impl Allocator for HostAllocator {
    fn allocate(&self, shape: &Shape) -> Result<Arc<HostBuffer>> {
        if !shape.dtype().is_valid() {
            return Err(TensorError::UnsupportedDType(format!(
                "cannot allocate a buffer of shape {}",
                shape
            )));
        }
        let byte_size = shape
            .checked_byte_size()
            .ok_or_else(|| TensorError::AllocationFailed(shape.clone()))?;
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(byte_size)
            .map_err(|_| TensorError::AllocationFailed(shape.clone()))?;
        bytes.resize(byte_size, 0);
        Ok(Arc::new(HostBuffer::with_bytes(shape.clone(), bytes)))
    }
}

/// Copies the bytes of `src` into `dst`.
///
/// Both buffers stay acquired for the duration of the copy and are released
/// on every exit path. Buffers are acquired in address order so that
/// concurrent transfers between the same pair never deadlock.
///
/// # Errors
/// Returns [`TensorError::BufferFreed`] if either buffer was freed, and
/// [`TensorError::SizeMismatch`] if the byte lengths differ, in which case
/// nothing is copied.
pub fn host_transfer(dst: &HostBuffer, src: &HostBuffer) -> Result<()> {
    if std::ptr::eq(dst, src) {
        return dst.acquire().map(|_| ()).ok_or(TensorError::BufferFreed);
    }
    let (dst_guard, src_guard) = if (dst as *const HostBuffer) < (src as *const HostBuffer) {
        let d = dst.acquire();
        (d, src.acquire())
    } else {
        let s = src.acquire();
        (dst.acquire(), s)
    };
    let (Some(mut dst_bytes), Some(src_bytes)) = (dst_guard, src_guard) else {
        return Err(TensorError::BufferFreed);
    };
    if src_bytes.len() != dst_bytes.len() {
        return Err(TensorError::SizeMismatch {
            src: src_bytes.len(),
            dst: dst_bytes.len(),
        });
    }
    dst_bytes.copy_from_slice(&src_bytes);
    trace!(bytes = src_bytes.len(), "host transfer");
    Ok(())
}
