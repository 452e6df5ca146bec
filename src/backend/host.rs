//! Host memory backend.
//!
//! This backend keeps every allocation in process memory. It does not talk to
//! a GPU but follows the same contract a driver-backed implementation would:
//! mappings hand out a staging copy that is published on `unmap`, or only on
//! `flush_range` when the mapping was made with [`MapFlags::FLUSH_EXPLICIT`].
//! Invalidating mappings start from zeroed staging instead of the current
//! contents.

use std::collections::HashMap;
use std::ptr::NonNull;

use parking_lot::Mutex;

use super::traits::{BackendError, BackendResult, BufferHandle, DeviceMemory, TexelViewHandle};
use super::types::{BufferDescriptor, BufferUsage, MapFlags, TexelFormat, UpdateFrequency};

#[derive(Debug)]
struct HostMapping {
    offset: u64,
    staging: Vec<u8>,
    flags: MapFlags,
}

#[derive(Debug)]
struct HostAllocation {
    label: Option<String>,
    usage: BufferUsage,
    frequency: UpdateFrequency,
    storage: Vec<u8>,
    mapping: Option<HostMapping>,
}

impl HostAllocation {
    fn size(&self) -> u64 {
        self.storage.len() as u64
    }
}

#[derive(Debug, Default)]
struct HostState {
    buffers: HashMap<u64, HostAllocation>,
    views: HashMap<u64, (BufferHandle, TexelFormat)>,
    next_id: u64,
    allocated: u64,
    fail_next: bool,
    fail_unmap: bool,
}

impl HostState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn buffer_mut(&mut self, buffer: BufferHandle) -> BackendResult<&mut HostAllocation> {
        self.buffers
            .get_mut(&buffer.0)
            .ok_or(BackendError::InvalidHandle(buffer))
    }

    fn reserve_bytes(&mut self, size: u64, budget: Option<u64>) -> BackendResult<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(BackendError::AllocationFailed(
                "injected allocation failure".to_string(),
            ));
        }
        let total = self
            .allocated
            .checked_add(size)
            .ok_or(BackendError::OutOfMemory { requested: size })?;
        if budget.is_some_and(|budget| total > budget) {
            return Err(BackendError::OutOfMemory { requested: size });
        }
        self.allocated = total;
        Ok(())
    }
}

/// Zero-filled storage of `size` bytes, or an error when the host cannot
/// provide it.
fn zeroed_storage(size: u64) -> BackendResult<Vec<u8>> {
    let len = usize::try_from(size).map_err(|_| BackendError::OutOfMemory { requested: size })?;
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(len)
        .map_err(|_| BackendError::OutOfMemory { requested: size })?;
    storage.resize(len, 0);
    Ok(storage)
}

fn check_range(offset: u64, length: u64, size: u64) -> BackendResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BackendError::OutOfRange {
            offset,
            length,
            size,
        }),
    }
}

/// In-process device memory.
#[derive(Debug, Default)]
pub struct HostMemory {
    state: Mutex<HostState>,
    budget: Option<u64>,
}

impl HostMemory {
    /// Create a host backend without a memory budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host backend that refuses allocations beyond `bytes` in total.
    pub fn with_budget(bytes: u64) -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            budget: Some(bytes),
        }
    }

    /// Make the next allocation (or reallocation) fail.
    pub fn fail_next_allocation(&self) {
        self.state.lock().fail_next = true;
    }

    /// Make the next `unmap` fail, leaving the mapping in place.
    pub fn fail_next_unmap(&self) {
        self.state.lock().fail_unmap = true;
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Total bytes currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated
    }

    /// Whether `buffer` currently has an active mapping.
    pub fn is_mapped(&self, buffer: BufferHandle) -> bool {
        self.state
            .lock()
            .buffers
            .get(&buffer.0)
            .is_some_and(|alloc| alloc.mapping.is_some())
    }

    /// Copy of the device-visible contents of `buffer`.
    ///
    /// Unpublished writes in an active mapping are not included.
    pub fn read_bytes(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.state
            .lock()
            .buffers
            .get(&buffer.0)
            .map(|alloc| alloc.storage.clone())
    }

    /// Size, usage and hint of `buffer`, if it exists.
    pub fn describe(&self, buffer: BufferHandle) -> Option<BufferDescriptor> {
        self.state.lock().buffers.get(&buffer.0).map(|alloc| BufferDescriptor {
            label: alloc.label.clone(),
            size: alloc.size(),
            usage: alloc.usage,
            frequency: alloc.frequency,
        })
    }

    /// The buffer and format a texel view currently aliases.
    pub fn texel_view_target(&self, view: TexelViewHandle) -> Option<(BufferHandle, TexelFormat)> {
        self.state.lock().views.get(&view.0).copied()
    }

    fn begin_mapping(
        &self,
        buffer: BufferHandle,
        offset: u64,
        length: u64,
        flags: MapFlags,
    ) -> BackendResult<NonNull<u8>> {
        let mut state = self.state.lock();
        let alloc = state.buffer_mut(buffer)?;
        if alloc.mapping.is_some() {
            return Err(BackendError::AlreadyMapped(buffer));
        }
        if length == 0 {
            return Err(BackendError::OutOfRange {
                offset,
                length,
                size: alloc.size(),
            });
        }
        check_range(offset, length, alloc.size())?;

        let start = offset as usize;
        let end = start + length as usize;
        if flags.contains(MapFlags::INVALIDATE_BUFFER) {
            alloc.storage.fill(0);
        }
        let mut staging = if flags.invalidates() {
            vec![0u8; end - start]
        } else {
            alloc.storage[start..end].to_vec()
        };
        let ptr = NonNull::from(staging.as_mut_slice()).cast::<u8>();
        alloc.mapping = Some(HostMapping {
            offset,
            staging,
            flags,
        });
        Ok(ptr)
    }
}

impl DeviceMemory for HostMemory {
    fn name(&self) -> &'static str {
        "Host"
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            "HostMemory: allocating {:?} (size: {}, usage: {:?})",
            descriptor.label,
            descriptor.size,
            descriptor.usage
        );
        if descriptor.size == 0 {
            return Err(BackendError::AllocationFailed(
                "zero-sized allocation".to_string(),
            ));
        }

        let mut state = self.state.lock();
        state.reserve_bytes(descriptor.size, self.budget)?;
        let storage = match zeroed_storage(descriptor.size) {
            Ok(storage) => storage,
            Err(err) => {
                state.allocated -= descriptor.size;
                return Err(err);
            }
        };
        let id = state.next_id();
        state.buffers.insert(
            id,
            HostAllocation {
                label: descriptor.label.clone(),
                usage: descriptor.usage,
                frequency: descriptor.frequency,
                storage,
                mapping: None,
            },
        );
        Ok(BufferHandle(id))
    }

    fn map(&self, buffer: BufferHandle, flags: MapFlags) -> BackendResult<NonNull<u8>> {
        log::trace!("HostMemory: map {:?} ({:?})", buffer, flags);
        let size = self
            .state
            .lock()
            .buffers
            .get(&buffer.0)
            .map(HostAllocation::size)
            .ok_or(BackendError::InvalidHandle(buffer))?;
        self.begin_mapping(buffer, 0, size, flags)
    }

    fn map_range(
        &self,
        buffer: BufferHandle,
        offset: u64,
        length: u64,
        flags: MapFlags,
    ) -> BackendResult<NonNull<u8>> {
        log::trace!(
            "HostMemory: map_range {:?} offset={} len={} ({:?})",
            buffer,
            offset,
            length,
            flags
        );
        self.begin_mapping(buffer, offset, length, flags)
    }

    fn unmap(&self, buffer: BufferHandle) -> BackendResult<()> {
        log::trace!("HostMemory: unmap {:?}", buffer);
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_unmap) {
            return Err(BackendError::DeviceLost);
        }
        let alloc = state.buffer_mut(buffer)?;
        let mapping = alloc
            .mapping
            .take()
            .ok_or(BackendError::NotMapped(buffer))?;

        if mapping.flags.can_write() && !mapping.flags.contains(MapFlags::FLUSH_EXPLICIT) {
            let start = mapping.offset as usize;
            alloc.storage[start..start + mapping.staging.len()].copy_from_slice(&mapping.staging);
        }
        Ok(())
    }

    fn flush_range(&self, buffer: BufferHandle, offset: u64, length: u64) -> BackendResult<()> {
        log::trace!(
            "HostMemory: flush_range {:?} offset={} len={}",
            buffer,
            offset,
            length
        );
        let mut state = self.state.lock();
        let alloc = state.buffer_mut(buffer)?;
        let mapping = alloc
            .mapping
            .as_ref()
            .ok_or(BackendError::NotMapped(buffer))?;
        check_range(offset, length, mapping.staging.len() as u64)?;

        let src = &mapping.staging[offset as usize..(offset + length) as usize];
        let dst_start = (mapping.offset + offset) as usize;
        alloc.storage[dst_start..dst_start + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn copy_region(
        &self,
        src: BufferHandle,
        dst: BufferHandle,
        src_offset: u64,
        dst_offset: u64,
        length: u64,
    ) -> BackendResult<()> {
        log::trace!(
            "HostMemory: copy_region {:?}+{} -> {:?}+{} len={}",
            src,
            src_offset,
            dst,
            dst_offset,
            length
        );
        let mut state = self.state.lock();

        let source = state.buffer_mut(src)?;
        if source.mapping.is_some() {
            return Err(BackendError::AlreadyMapped(src));
        }
        check_range(src_offset, length, source.size())?;
        let (from, to) = (src_offset as usize, (src_offset + length) as usize);

        if src == dst {
            check_range(dst_offset, length, source.size())?;
            source.storage.copy_within(from..to, dst_offset as usize);
            return Ok(());
        }
        let bytes = source.storage[from..to].to_vec();

        let target = state.buffer_mut(dst)?;
        if target.mapping.is_some() {
            return Err(BackendError::AlreadyMapped(dst));
        }
        check_range(dst_offset, length, target.size())?;
        let start = dst_offset as usize;
        target.storage[start..start + bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn reallocate(&self, buffer: BufferHandle, size: u64) -> BackendResult<()> {
        log::trace!("HostMemory: reallocate {:?} to {} bytes", buffer, size);
        let mut state = self.state.lock();
        let old_size = {
            let alloc = state.buffer_mut(buffer)?;
            if alloc.mapping.is_some() {
                return Err(BackendError::AlreadyMapped(buffer));
            }
            alloc.size()
        };

        state.allocated -= old_size;
        if let Err(err) = state.reserve_bytes(size, self.budget) {
            state.allocated += old_size;
            return Err(err);
        }
        let storage = match zeroed_storage(size) {
            Ok(storage) => storage,
            Err(err) => {
                state.allocated = state.allocated - size + old_size;
                return Err(err);
            }
        };
        let alloc = state.buffer_mut(buffer)?;
        alloc.storage = storage;
        Ok(())
    }

    fn free(&self, buffer: BufferHandle) {
        log::trace!("HostMemory: free {:?}", buffer);
        let mut state = self.state.lock();
        match state.buffers.remove(&buffer.0) {
            Some(alloc) => state.allocated -= alloc.size(),
            None => log::warn!("HostMemory: free of unknown buffer {:?}", buffer),
        }
    }

    fn create_texel_view(
        &self,
        buffer: BufferHandle,
        format: TexelFormat,
    ) -> BackendResult<TexelViewHandle> {
        log::trace!("HostMemory: texel view of {:?} as {:?}", buffer, format);
        let mut state = self.state.lock();
        state.buffer_mut(buffer)?;
        let id = state.next_id();
        state.views.insert(id, (buffer, format));
        Ok(TexelViewHandle(id))
    }

    fn set_texel_view_buffer(
        &self,
        view: TexelViewHandle,
        buffer: BufferHandle,
    ) -> BackendResult<()> {
        log::trace!("HostMemory: rebinding texel view {:?} to {:?}", view, buffer);
        let mut state = self.state.lock();
        state.buffer_mut(buffer)?;
        let entry = state
            .views
            .get_mut(&view.0)
            .ok_or(BackendError::InvalidView(view))?;
        entry.0 = buffer;
        Ok(())
    }

    fn destroy_texel_view(&self, view: TexelViewHandle) {
        log::trace!("HostMemory: destroying texel view {:?}", view);
        self.state.lock().views.remove(&view.0);
    }
}

static_assertions::assert_impl_all!(HostMemory: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate(memory: &HostMemory, size: u64) -> BufferHandle {
        memory
            .allocate(&BufferDescriptor::new(size, BufferUsage::default()))
            .unwrap()
    }

    fn write_mapped(ptr: NonNull<u8>, bytes: &[u8]) {
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len()) }
    }

    #[test]
    fn test_allocate_and_free() {
        let memory = HostMemory::new();
        let a = allocate(&memory, 64);
        let b = allocate(&memory, 32);
        assert_ne!(a, b);
        assert_eq!(memory.allocation_count(), 2);
        assert_eq!(memory.allocated_bytes(), 96);

        memory.free(a);
        assert_eq!(memory.allocation_count(), 1);
        assert_eq!(memory.allocated_bytes(), 32);
    }

    #[test]
    fn test_zero_sized_allocation_fails() {
        let memory = HostMemory::new();
        let result = memory.allocate(&BufferDescriptor::new(0, BufferUsage::default()));
        assert!(matches!(result, Err(BackendError::AllocationFailed(_))));
    }

    #[test]
    fn test_budget_and_injected_failure() {
        let memory = HostMemory::with_budget(100);
        allocate(&memory, 80);
        let result = memory.allocate(&BufferDescriptor::new(40, BufferUsage::default()));
        assert_eq!(result, Err(BackendError::OutOfMemory { requested: 40 }));

        memory.fail_next_allocation();
        assert!(memory
            .allocate(&BufferDescriptor::new(4, BufferUsage::default()))
            .is_err());
        assert!(memory
            .allocate(&BufferDescriptor::new(4, BufferUsage::default()))
            .is_ok());
    }

    #[test]
    fn test_writes_published_on_unmap() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 8);

        let ptr = memory.map_range(buffer, 4, 4, MapFlags::WRITE).unwrap();
        write_mapped(ptr, &[1, 2, 3, 4]);
        assert_eq!(memory.read_bytes(buffer).unwrap(), vec![0; 8]);

        memory.unmap(buffer).unwrap();
        assert_eq!(
            memory.read_bytes(buffer).unwrap(),
            vec![0, 0, 0, 0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_explicit_flush_publishes_only_flushed_bytes() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 8);

        let ptr = memory
            .map_range(buffer, 0, 8, MapFlags::WRITE | MapFlags::FLUSH_EXPLICIT)
            .unwrap();
        write_mapped(ptr, &[9; 8]);
        memory.flush_range(buffer, 2, 2).unwrap();
        memory.unmap(buffer).unwrap();

        assert_eq!(
            memory.read_bytes(buffer).unwrap(),
            vec![0, 0, 9, 9, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_double_map_and_unmap_errors() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 16);

        memory.map(buffer, MapFlags::READ).unwrap();
        assert_eq!(
            memory.map(buffer, MapFlags::READ),
            Err(BackendError::AlreadyMapped(buffer))
        );
        memory.unmap(buffer).unwrap();
        assert_eq!(memory.unmap(buffer), Err(BackendError::NotMapped(buffer)));
    }

    #[test]
    fn test_map_range_out_of_bounds() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 16);
        assert!(matches!(
            memory.map_range(buffer, 12, 8, MapFlags::READ),
            Err(BackendError::OutOfRange { .. })
        ));
        assert!(!memory.is_mapped(buffer));
    }

    #[test]
    fn test_copy_region_and_reallocate() {
        let memory = HostMemory::new();
        let src = allocate(&memory, 4);
        let dst = allocate(&memory, 8);

        let ptr = memory.map(src, MapFlags::WRITE).unwrap();
        write_mapped(ptr, &[5, 6, 7, 8]);
        memory.unmap(src).unwrap();

        memory.copy_region(src, dst, 0, 4, 4).unwrap();
        assert_eq!(memory.read_bytes(dst).unwrap(), vec![0, 0, 0, 0, 5, 6, 7, 8]);

        memory.reallocate(src, 12).unwrap();
        assert_eq!(memory.read_bytes(src).unwrap(), vec![0; 12]);
        assert_eq!(memory.allocated_bytes(), 20);
    }

    #[test]
    fn test_oversized_requests_fail_without_panicking() {
        let memory = HostMemory::new();
        let huge = u64::MAX / 2;
        assert_eq!(
            memory.allocate(&BufferDescriptor::new(huge, BufferUsage::default())),
            Err(BackendError::OutOfMemory { requested: huge })
        );
        assert_eq!(memory.allocated_bytes(), 0);

        let buffer = allocate(&memory, 8);
        let ptr = memory.map(buffer, MapFlags::WRITE).unwrap();
        write_mapped(ptr, &[3; 8]);
        memory.unmap(buffer).unwrap();

        assert_eq!(
            memory.reallocate(buffer, huge),
            Err(BackendError::OutOfMemory { requested: huge })
        );
        assert_eq!(memory.read_bytes(buffer).unwrap(), vec![3; 8]);
        assert_eq!(memory.allocated_bytes(), 8);
    }

    #[test]
    fn test_invalidating_mappings_start_zeroed() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 8);
        let ptr = memory.map(buffer, MapFlags::WRITE).unwrap();
        write_mapped(ptr, &[7; 8]);
        memory.unmap(buffer).unwrap();

        let ptr = memory
            .map_range(buffer, 4, 4, MapFlags::WRITE | MapFlags::INVALIDATE_RANGE)
            .unwrap();
        let staging = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 4) };
        assert_eq!(staging, &[0; 4]);
        memory.unmap(buffer).unwrap();
        assert_eq!(memory.read_bytes(buffer).unwrap(), vec![7, 7, 7, 7, 0, 0, 0, 0]);

        memory
            .map_range(buffer, 0, 2, MapFlags::WRITE | MapFlags::INVALIDATE_BUFFER)
            .unwrap();
        assert_eq!(memory.read_bytes(buffer).unwrap(), vec![0; 8]);
        memory.unmap(buffer).unwrap();
    }

    #[test]
    fn test_failed_unmap_keeps_mapping() {
        let memory = HostMemory::new();
        let buffer = allocate(&memory, 8);
        memory.map(buffer, MapFlags::READ).unwrap();
        memory.fail_next_unmap();
        assert_eq!(memory.unmap(buffer), Err(BackendError::DeviceLost));
        assert!(memory.is_mapped(buffer));
        memory.unmap(buffer).unwrap();
    }

    #[test]
    fn test_texel_views() {
        let memory = HostMemory::new();
        let a = allocate(&memory, 16);
        let b = allocate(&memory, 16);

        let view = memory.create_texel_view(a, TexelFormat::Rgba32Float).unwrap();
        assert_eq!(
            memory.texel_view_target(view),
            Some((a, TexelFormat::Rgba32Float))
        );

        memory.set_texel_view_buffer(view, b).unwrap();
        assert_eq!(memory.texel_view_target(view).map(|(buf, _)| buf), Some(b));

        memory.destroy_texel_view(view);
        assert_eq!(memory.texel_view_target(view), None);
    }
}
