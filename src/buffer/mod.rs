//! Interleaved device buffers.
//!
//! An [`InterleavedBuffer<B>`] owns one device allocation holding `capacity`
//! blocks of type `B` back to back, each laid out by the block's shared
//! [`BlockLayout`]. Fields are reached through typed accessors indexed by a
//! const generic, so `buffer.read::<2>(i)` only compiles when `B` has a third
//! field and always returns that field's type.
//!
//! # Map state
//!
//! ```text
//!            map / map_range
//! Unmapped ------------------> MappedFull | MappedRange
//!     ^                                |
//!     +------------- unmap ------------+
//! ```
//!
//! Field access requires a mapping whose flags include the needed access and
//! whose block range includes the requested block. A buffer has to be unmapped
//! before it can be mapped again, resized or reserved.
//!
//! # Example
//!
//! ```ignore
//! let memory: Arc<dyn DeviceMemory> = Arc::new(HostMemory::new());
//! let mut lights = InterleavedBuffer::<(Vec3, f32)>::new(
//!     memory,
//!     LayoutPolicy::Std140Compatible,
//!     16,
//!     BufferConfig::new(BufferUsage::UNIFORM).with_label("lights"),
//! )?;
//!
//! lights.map(MapMode::Write)?;
//! lights.write::<0>(3, Vec3::new(0.0, 4.0, 0.0))?;
//! lights.write::<1>(3, 0.75)?;
//! lights.unmap()?;
//! ```

mod config;
mod growth;
mod state;
mod texel;

pub use config::{BufferConfig, ViolationMode};
pub use growth::GrowthStrategy;
pub use state::MapState;
pub use texel::{SharedBuffer, TexelBufferView};

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::array::{StridedView, StridedViewMut};
use crate::backend::{BackendError, BufferHandle, DeviceMemory, MapFlags, MapMode};
use crate::error::{BufferError, LayoutError};
use crate::field::{ArrayField, Block, Field, FieldAt};
use crate::layout::{BlockLayout, LayoutPolicy};
use state::Mapping;

/// Field type `I` of block `B`.
pub type FieldType<B, const I: usize> = <B as FieldAt<I>>::Type;

/// Element type of array field `I` of block `B`.
pub type ElementType<B, const I: usize> = <FieldType<B, I> as ArrayField>::Element;

fn violate(mode: ViolationMode, label: &str, err: BufferError) -> BufferError {
    if mode == ViolationMode::Panic {
        panic!("{label}: {err}");
    }
    err
}

/// Byte size of `blocks` blocks.
fn byte_size(blocks: usize, stride: usize) -> Result<u64, BufferError> {
    (blocks as u64)
        .checked_mul(stride as u64)
        .ok_or_else(|| {
            BufferError::Allocation(BackendError::AllocationFailed(format!(
                "{blocks} blocks of {stride} bytes overflow the address space"
            )))
        })
}

/// A device buffer of interleaved blocks.
pub struct InterleavedBuffer<B: Block> {
    memory: Arc<dyn DeviceMemory>,
    handle: BufferHandle,
    layout: Arc<BlockLayout>,
    capacity: usize,
    config: BufferConfig,
    mapping: Mapping,
    _block: PhantomData<fn() -> B>,
}

impl<B: Block> InterleavedBuffer<B> {
    /// Allocate a buffer of `capacity` blocks laid out with `policy`.
    ///
    /// The buffer starts unmapped. Its contents are unspecified until written.
    pub fn new(
        memory: Arc<dyn DeviceMemory>,
        policy: LayoutPolicy,
        capacity: usize,
        config: BufferConfig,
    ) -> Result<Self, BufferError> {
        let label = config.label.as_deref().unwrap_or("<unlabeled>");
        if capacity == 0 {
            return Err(violate(
                config.on_violation,
                label,
                LayoutError::ZeroCapacity.into(),
            ));
        }
        let layout =
            B::layout(policy).map_err(|err| violate(config.on_violation, label, err.into()))?;
        if layout.stride() == 0 {
            return Err(violate(
                config.on_violation,
                label,
                LayoutError::EmptyBlock.into(),
            ));
        }

        let size = byte_size(capacity, layout.stride())?;
        let handle = memory.allocate(&config.descriptor(size))?;
        log::debug!(
            "Created buffer {} on {}: {} blocks x {} bytes ({:?})",
            label,
            memory.name(),
            capacity,
            layout.stride(),
            policy
        );

        Ok(Self {
            memory,
            handle,
            layout,
            capacity,
            config,
            mapping: Mapping::Unmapped,
            _block: PhantomData,
        })
    }

    fn name(&self) -> &str {
        self.config.label.as_deref().unwrap_or("<unlabeled>")
    }

    /// Apply the configured [`ViolationMode`] to a contract violation.
    pub(crate) fn violation(&self, err: BufferError) -> BufferError {
        violate(self.config.on_violation, self.name(), err)
    }

    fn require_unmapped(&self, operation: &'static str) -> Result<(), BufferError> {
        match self.mapping {
            Mapping::Unmapped => Ok(()),
            _ => Err(self.violation(BufferError::MapState {
                operation,
                state: self.mapping.state().describe(),
                detail: "unmap the buffer first",
            })),
        }
    }

    /// Map every block with the access of `mode`.
    pub fn map(&mut self, mode: MapMode) -> Result<(), BufferError> {
        self.require_unmapped("map")?;
        let flags = mode.flags();
        let ptr = self.memory.map(self.handle, flags)?;
        self.mapping = Mapping::Full { flags, ptr };
        log::debug!("Mapped {} ({:?})", self.name(), flags);
        Ok(())
    }

    /// Map blocks `start..start + length`.
    ///
    /// `flags` must grant read or write access. With
    /// [`MapFlags::FLUSH_EXPLICIT`] writes only reach the device through
    /// [`flush_range`](Self::flush_range).
    pub fn map_range(
        &mut self,
        start: usize,
        length: usize,
        flags: MapFlags,
    ) -> Result<(), BufferError> {
        self.require_unmapped("map_range")?;
        let end = match start.checked_add(length) {
            Some(end) if length > 0 && end <= self.capacity => end,
            _ => {
                return Err(self.violation(BufferError::InvalidRange {
                    start,
                    length,
                    limit: self.capacity,
                }));
            }
        };
        if !flags.intersects(MapFlags::READ_WRITE) {
            return Err(self.violation(BufferError::MapState {
                operation: "map_range",
                state: "unmapped",
                detail: "mapping needs read or write access",
            }));
        }
        if flags.contains(MapFlags::FLUSH_EXPLICIT) && !flags.can_write() {
            return Err(self.violation(BufferError::MapState {
                operation: "map_range",
                state: "unmapped",
                detail: "explicit flushing needs write access",
            }));
        }
        if flags.invalidates() && (flags.can_read() || !flags.can_write()) {
            return Err(self.violation(BufferError::MapState {
                operation: "map_range",
                state: "unmapped",
                detail: "invalidating mappings must be write-only",
            }));
        }

        let stride = self.stride() as u64;
        let ptr = self.memory.map_range(
            self.handle,
            start as u64 * stride,
            length as u64 * stride,
            flags,
        )?;
        self.mapping = Mapping::Range {
            start,
            end,
            flags,
            ptr,
        };
        log::debug!(
            "Mapped {} blocks {}..{} ({:?})",
            self.name(),
            start,
            end,
            flags
        );
        Ok(())
    }

    /// Publish writes to blocks `start..start + length` of an explicit-flush
    /// range mapping.
    pub fn flush_range(&mut self, start: usize, length: usize) -> Result<(), BufferError> {
        let (mapped_start, mapped_end) = match self.mapping {
            Mapping::Range {
                start: first,
                end: last,
                flags,
                ..
            } if flags.contains(MapFlags::FLUSH_EXPLICIT) => (first, last),
            Mapping::Range { .. } => {
                return Err(self.violation(BufferError::MapState {
                    operation: "flush_range",
                    state: "range-mapped",
                    detail: "mapping was made without FLUSH_EXPLICIT",
                }));
            }
            _ => {
                return Err(self.violation(BufferError::MapState {
                    operation: "flush_range",
                    state: self.mapping.state().describe(),
                    detail: "flushing needs an explicit-flush range mapping",
                }));
            }
        };

        let within = start >= mapped_start
            && length > 0
            && start
                .checked_add(length)
                .is_some_and(|end| end <= mapped_end);
        if !within {
            return Err(self.violation(BufferError::InvalidRange {
                start,
                length,
                limit: mapped_end,
            }));
        }

        let stride = self.stride() as u64;
        self.memory.flush_range(
            self.handle,
            (start - mapped_start) as u64 * stride,
            length as u64 * stride,
        )?;
        Ok(())
    }

    /// End the active mapping.
    ///
    /// If the backend fails to unmap, the buffer stays mapped and the call can
    /// be retried.
    pub fn unmap(&mut self) -> Result<(), BufferError> {
        if let Mapping::Unmapped = self.mapping {
            return Err(self.violation(BufferError::MapState {
                operation: "unmap",
                state: "unmapped",
                detail: "buffer is not mapped",
            }));
        }
        self.memory.unmap(self.handle)?;
        self.mapping = Mapping::Unmapped;
        log::debug!("Unmapped {}", self.name());
        Ok(())
    }

    /// Locate field `field` of `block` in the active mapping.
    ///
    /// Returns the address of the field and the number of bytes it occupies.
    fn locate(
        &self,
        operation: &'static str,
        field: usize,
        block: usize,
        required: MapFlags,
    ) -> Result<(NonNull<u8>, usize), BufferError> {
        let state = self.mapping.state();
        let (Some((first, ptr)), Some(flags), Some(blocks)) = (
            self.mapping.base(),
            state.flags(),
            state.blocks(self.capacity),
        ) else {
            return Err(self.violation(BufferError::MapState {
                operation,
                state: state.describe(),
                detail: "map the buffer first",
            }));
        };

        if !flags.contains(required) {
            let detail = if required.can_write() && !flags.can_write() {
                "mapping lacks write access"
            } else {
                "mapping lacks read access"
            };
            return Err(self.violation(BufferError::MapState {
                operation,
                state: state.describe(),
                detail,
            }));
        }
        if !blocks.contains(&block) {
            return Err(self.violation(BufferError::OutOfBounds {
                block,
                start: blocks.start,
                end: blocks.end,
            }));
        }

        let offset = self.layout.offsets()[field] + (block - first) * self.layout.stride();
        let size = self
            .layout
            .policy()
            .occupied_size(&self.layout.fields()[field]);
        // SAFETY: `block` lies in the mapped block range and every field ends
        // within its block, so the address stays inside the mapping.
        let ptr = unsafe { NonNull::new_unchecked(ptr.as_ptr().add(offset)) };
        Ok((ptr, size))
    }

    fn field_bytes(
        &self,
        operation: &'static str,
        field: usize,
        block: usize,
        required: MapFlags,
    ) -> Result<&[u8], BufferError> {
        let (ptr, size) = self.locate(operation, field, block, required)?;
        // SAFETY: the mapping stays valid until `unmap`, which needs `&mut self`.
        Ok(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) })
    }

    fn field_bytes_mut(
        &mut self,
        operation: &'static str,
        field: usize,
        block: usize,
        required: MapFlags,
    ) -> Result<&mut [u8], BufferError> {
        let (ptr, size) = self.locate(operation, field, block, required)?;
        // SAFETY: as in `field_bytes`; `&mut self` makes the access exclusive.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), size) })
    }

    /// Read field `I` of `block`. Needs read access.
    pub fn read<const I: usize>(&self, block: usize) -> Result<FieldType<B, I>, BufferError>
    where
        B: FieldAt<I>,
    {
        let policy = self.policy();
        let bytes = self.field_bytes("read", I, block, MapFlags::READ)?;
        Ok(<FieldType<B, I> as Field>::load(policy, bytes))
    }

    /// Write field `I` of `block`. Needs write access.
    pub fn write<const I: usize>(
        &mut self,
        block: usize,
        value: FieldType<B, I>,
    ) -> Result<(), BufferError>
    where
        B: FieldAt<I>,
    {
        let policy = self.policy();
        let bytes = self.field_bytes_mut("write", I, block, MapFlags::WRITE)?;
        value.store(policy, bytes);
        Ok(())
    }

    /// Read-modify-write access to field `I` of `block`. Needs read and
    /// write access.
    ///
    /// The returned guard holds the decoded value and writes it back when
    /// dropped.
    pub fn at<const I: usize>(
        &mut self,
        block: usize,
    ) -> Result<FieldMut<'_, FieldType<B, I>>, BufferError>
    where
        B: FieldAt<I>,
    {
        let policy = self.policy();
        let bytes = self.field_bytes_mut("at", I, block, MapFlags::READ_WRITE)?;
        let value = <FieldType<B, I> as Field>::load(policy, bytes);
        Ok(FieldMut {
            bytes,
            policy,
            value,
        })
    }

    /// Element view of array field `I` of `block`. Needs read access.
    pub fn array<const I: usize>(
        &self,
        block: usize,
    ) -> Result<StridedView<'_, ElementType<B, I>>, BufferError>
    where
        B: FieldAt<I>,
        FieldType<B, I>: ArrayField,
    {
        let policy = self.policy();
        let bytes = self.field_bytes("array", I, block, MapFlags::READ)?;
        Ok(StridedView::of::<FieldType<B, I>>(bytes, policy))
    }

    /// Mutable element view of array field `I` of `block`. Needs write access.
    ///
    /// Elements read through a write-only mapping hold unspecified values.
    pub fn array_mut<const I: usize>(
        &mut self,
        block: usize,
    ) -> Result<StridedViewMut<'_, ElementType<B, I>>, BufferError>
    where
        B: FieldAt<I>,
        FieldType<B, I>: ArrayField,
    {
        let policy = self.policy();
        let bytes = self.field_bytes_mut("array_mut", I, block, MapFlags::WRITE)?;
        Ok(StridedViewMut::of::<FieldType<B, I>>(bytes, policy))
    }

    /// Write field `I` of one block without an outstanding mapping.
    ///
    /// Maps the block write-only, writes the value and unmaps again.
    pub fn update<const I: usize>(
        &mut self,
        block: usize,
        value: FieldType<B, I>,
    ) -> Result<(), BufferError>
    where
        B: FieldAt<I>,
    {
        self.require_unmapped("update")?;
        if block >= self.capacity {
            return Err(self.violation(BufferError::OutOfBounds {
                block,
                start: 0,
                end: self.capacity,
            }));
        }
        self.map_range(block, 1, MapFlags::WRITE)?;
        let written = self.write::<I>(block, value);
        let unmapped = self.unmap();
        written.and(unmapped)
    }

    /// Number of blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes per block.
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.layout.policy()
    }

    /// Byte offset of field `index` within a block.
    pub fn field_offset(&self, index: usize) -> Result<usize, BufferError> {
        self.layout
            .field_offset(index)
            .map_err(|err| self.violation(err.into()))
    }

    pub fn layout(&self) -> &Arc<BlockLayout> {
        &self.layout
    }

    /// Current device handle. Changes when a [`GrowthStrategy::SwapHandle`]
    /// resize replaces the allocation.
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn map_state(&self) -> MapState {
        self.mapping.state()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.state().is_mapped()
    }

    pub fn label(&self) -> Option<&str> {
        self.config.label.as_deref()
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// The backend this buffer allocates from.
    pub fn memory(&self) -> &Arc<dyn DeviceMemory> {
        &self.memory
    }

    /// Size of the allocation in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.capacity as u64 * self.stride() as u64
    }
}

impl<B: Block> Drop for InterleavedBuffer<B> {
    fn drop(&mut self) {
        if self.is_mapped() {
            log::warn!("Dropping {} while mapped, unmapping", self.name());
            if let Err(err) = self.memory.unmap(self.handle) {
                log::warn!("Failed to unmap {}: {}", self.name(), err);
            }
        }
        self.memory.free(self.handle);
    }
}

impl<B: Block> fmt::Debug for InterleavedBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterleavedBuffer")
            .field("label", &self.config.label)
            .field("backend", &self.memory.name())
            .field("handle", &self.handle)
            .field("capacity", &self.capacity)
            .field("stride", &self.stride())
            .field("state", &self.mapping.state())
            .finish()
    }
}

/// Read-modify-write guard returned by [`InterleavedBuffer::at`].
///
/// Derefs to the decoded field value; the value is encoded back into the
/// mapping when the guard is dropped.
pub struct FieldMut<'a, T: Field> {
    bytes: &'a mut [u8],
    policy: LayoutPolicy,
    value: T,
}

impl<T: Field> Deref for FieldMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Field> DerefMut for FieldMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Field> Drop for FieldMut<'_, T> {
    fn drop(&mut self) {
        self.value.store(self.policy, self.bytes);
    }
}
