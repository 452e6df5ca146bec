//! Buffer growth.
//!
//! Growing a buffer allocates room for the new capacity and copies the
//! existing blocks over verbatim. How the new storage is adopted is fixed per
//! buffer by [`GrowthStrategy`].

use super::InterleavedBuffer;
use crate::backend::BufferHandle;
use crate::error::BufferError;
use crate::field::Block;

/// How a buffer adopts its grown storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GrowthStrategy {
    /// Allocate a new buffer, copy into it and free the old one. The device
    /// handle changes, so views bound to the old handle must be rebound.
    #[default]
    SwapHandle,
    /// Keep the device handle: copy into a temporary buffer, reallocate the
    /// original handle and copy back. Costs a second copy.
    StableHandle,
}

impl<B: Block> InterleavedBuffer<B> {
    /// Grow to `new_capacity` blocks, preserving every existing block.
    ///
    /// Does nothing when `new_capacity` does not exceed the current capacity.
    /// Blocks past the old capacity hold unspecified bytes.
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), BufferError> {
        self.require_unmapped("resize")?;
        if new_capacity <= self.capacity {
            return Ok(());
        }

        let old_size = self.size_bytes();
        let new_size = super::byte_size(new_capacity, self.stride())?;
        match self.config.growth {
            GrowthStrategy::SwapHandle => self.grow_swapping(old_size, new_size)?,
            GrowthStrategy::StableHandle => self.grow_in_place(old_size, new_size)?,
        }

        log::debug!(
            "Resized {} from {} to {} blocks ({:?})",
            self.name(),
            self.capacity,
            new_capacity,
            self.config.growth
        );
        self.capacity = new_capacity;
        Ok(())
    }

    /// Make room for at least `blocks` blocks.
    ///
    /// Grows geometrically to `max(blocks, 2 * capacity)` so that repeated
    /// reservations stay amortized.
    pub fn reserve(&mut self, blocks: usize) -> Result<(), BufferError> {
        if blocks <= self.capacity {
            return self.require_unmapped("reserve");
        }
        let target = blocks.max(self.capacity.saturating_mul(2));
        log::warn!(
            "Performance warning: growing {} from {} to {} blocks, consider a larger initial capacity",
            self.name(),
            self.capacity,
            target
        );
        self.resize(target)
    }

    fn grow_swapping(&mut self, old_size: u64, new_size: u64) -> Result<(), BufferError> {
        let replacement = self.memory.allocate(&self.config.descriptor(new_size))?;
        if let Err(err) = self
            .memory
            .copy_region(self.handle, replacement, 0, 0, old_size)
        {
            self.memory.free(replacement);
            return Err(err.into());
        }

        let old = std::mem::replace(&mut self.handle, replacement);
        self.memory.free(old);
        Ok(())
    }

    fn grow_in_place(&mut self, old_size: u64, new_size: u64) -> Result<(), BufferError> {
        let staging = self.memory.allocate(&self.config.descriptor(old_size))?;
        let result = self.copy_through(staging, old_size, new_size);
        self.memory.free(staging);
        result
    }

    fn copy_through(
        &mut self,
        staging: BufferHandle,
        old_size: u64,
        new_size: u64,
    ) -> Result<(), BufferError> {
        self.memory
            .copy_region(self.handle, staging, 0, 0, old_size)?;
        self.memory.reallocate(self.handle, new_size)?;
        if let Err(err) = self
            .memory
            .copy_region(staging, self.handle, 0, 0, old_size)
        {
            log::error!(
                "Resizing {} lost its contents: {}",
                self.name(),
                err
            );
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::{HostMemory, MapMode};
    use crate::buffer::{BufferConfig, ViolationMode};
    use crate::layout::LayoutPolicy;

    fn buffer(memory: &Arc<HostMemory>, growth: GrowthStrategy) -> InterleavedBuffer<(u32, u16)> {
        let config = BufferConfig::default()
            .with_growth(growth)
            .with_violation_mode(ViolationMode::ReturnError);
        InterleavedBuffer::new(memory.clone(), LayoutPolicy::Aligned, 2, config).unwrap()
    }

    #[test]
    fn test_resize_smaller_is_noop() {
        let memory = Arc::new(HostMemory::new());
        let mut buffer = buffer(&memory, GrowthStrategy::SwapHandle);
        let handle = buffer.handle();
        buffer.resize(1).unwrap();
        buffer.resize(2).unwrap();
        assert_eq!(buffer.capacity(), 2);
        assert_eq!(buffer.handle(), handle);
    }

    #[test]
    fn test_swap_replaces_handle() {
        let memory = Arc::new(HostMemory::new());
        let mut buffer = buffer(&memory, GrowthStrategy::SwapHandle);
        let handle = buffer.handle();
        buffer.resize(5).unwrap();
        assert_ne!(buffer.handle(), handle);
        assert_eq!(memory.allocation_count(), 1);
        // u32 @0, u16 @4, rounded to the u16 alignment
        assert_eq!(buffer.stride(), 6);
        assert_eq!(memory.allocated_bytes(), 5 * 6);
    }

    #[test]
    fn test_stable_keeps_handle() {
        let memory = Arc::new(HostMemory::new());
        let mut buffer = buffer(&memory, GrowthStrategy::StableHandle);
        let handle = buffer.handle();
        buffer.resize(5).unwrap();
        assert_eq!(buffer.handle(), handle);
        assert_eq!(memory.allocation_count(), 1);
        assert_eq!(memory.read_bytes(handle).map(|bytes| bytes.len()), Some(30));
    }

    #[test]
    fn test_reserve_grows_geometrically() {
        let memory = Arc::new(HostMemory::new());
        let mut buffer = buffer(&memory, GrowthStrategy::SwapHandle);
        buffer.reserve(3).unwrap();
        assert_eq!(buffer.capacity(), 4);
        buffer.reserve(11).unwrap();
        assert_eq!(buffer.capacity(), 11);
        buffer.reserve(2).unwrap();
        assert_eq!(buffer.capacity(), 11);
    }

    #[test]
    fn test_resize_while_mapped_fails() {
        let memory = Arc::new(HostMemory::new());
        let mut buffer = buffer(&memory, GrowthStrategy::SwapHandle);
        buffer.map(MapMode::Read).unwrap();
        assert!(matches!(
            buffer.resize(8),
            Err(BufferError::MapState { .. })
        ));
        assert!(matches!(
            buffer.reserve(1),
            Err(BufferError::MapState { .. })
        ));
        assert_eq!(buffer.capacity(), 2);
    }
}
