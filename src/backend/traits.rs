//! Device memory abstraction
//!
//! Everything the buffer layer needs from a device goes through [`DeviceMemory`],
//! so layouts and the map state machine can be exercised without a real device.

use crate::backend::types::*;
use std::ptr::NonNull;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Out of device memory: requested {requested} bytes")]
    OutOfMemory { requested: u64 },
    #[error("Failed to allocate buffer: {0}")]
    AllocationFailed(String),
    #[error("Unknown buffer handle {0:?}")]
    InvalidHandle(BufferHandle),
    #[error("Unknown texel view handle {0:?}")]
    InvalidView(TexelViewHandle),
    #[error("Buffer {0:?} is already mapped")]
    AlreadyMapped(BufferHandle),
    #[error("Buffer {0:?} is not mapped")]
    NotMapped(BufferHandle),
    #[error("Range {offset}+{length} exceeds size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    /// Raw handle value, as assigned by the backend.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Handle to a texel buffer view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TexelViewHandle(pub(crate) u64);

/// Device memory backend.
///
/// All calls are blocking. A buffer has at most one active mapping; the pointer
/// returned by [`map`](Self::map) or [`map_range`](Self::map_range) stays valid
/// until [`unmap`](Self::unmap), [`reallocate`](Self::reallocate) or
/// [`free`](Self::free) is called for that handle.
pub trait DeviceMemory: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Allocate `descriptor.size` bytes of device memory.
    fn allocate(&self, descriptor: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Map the whole buffer.
    fn map(&self, buffer: BufferHandle, flags: MapFlags) -> BackendResult<NonNull<u8>>;

    /// Map `length` bytes starting at `offset`.
    fn map_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        length: u64,
        flags: MapFlags,
    ) -> BackendResult<NonNull<u8>>;

    /// End the active mapping, making writes visible to the device.
    fn unmap(&self, buffer: BufferHandle) -> BackendResult<()>;

    /// Publish writes in an explicit-flush mapping.
    ///
    /// `offset` is relative to the start of the mapped range.
    fn flush_range(&self, buffer: BufferHandle, offset: u64, length: u64) -> BackendResult<()>;

    /// Copy bytes between two unmapped buffers.
    fn copy_region(
        &self,
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        length: u64,
    ) -> BackendResult<()>;

    /// Replace the storage behind an existing handle with `size` new bytes.
    ///
    /// The previous contents are discarded.
    fn reallocate(&self, buffer: BufferHandle, size: u64) -> BackendResult<()>;

    /// Release a buffer. Any active mapping is dropped with it.
    fn free(&self, buffer: BufferHandle);

    /// Create a view that exposes `buffer` as a texel buffer.
    fn create_texel_view(
        &self,
        buffer: BufferHandle,
        format: TexelFormat,
    ) -> BackendResult<TexelViewHandle>;

    /// Point an existing texel view at another buffer.
    fn set_texel_view_buffer(
        &self,
        view: TexelViewHandle,
        buffer: BufferHandle,
    ) -> BackendResult<()>;

    /// Destroy a texel view. The buffer it aliases is unaffected.
    fn destroy_texel_view(&self, view: TexelViewHandle);
}
