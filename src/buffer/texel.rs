//! Texel buffer views over interleaved buffers.
//!
//! A texel view lets shaders fetch the blocks of a packed buffer as texels of
//! a fixed format. The view and whoever writes the blocks both hold the same
//! buffer, so it is shared explicitly through [`SharedBuffer`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use super::InterleavedBuffer;
use crate::backend::{BufferHandle, BufferUsage, DeviceMemory, TexelFormat, TexelViewHandle};
use crate::error::{BufferError, LayoutError};
use crate::field::Block;
use crate::layout::LayoutPolicy;

/// A buffer with several owners.
pub type SharedBuffer<B> = Rc<RefCell<InterleavedBuffer<B>>>;

/// A texel buffer view aliasing a [`LayoutPolicy::Packed`] buffer created with
/// [`BufferUsage::TEXEL`].
pub struct TexelBufferView<B: Block> {
    memory: Arc<dyn DeviceMemory>,
    view: TexelViewHandle,
    format: TexelFormat,
    buffer: SharedBuffer<B>,
    bound: BufferHandle,
}

impl<B: Block> fmt::Debug for TexelBufferView<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TexelBufferView")
            .field("backend", &self.memory.name())
            .field("view", &self.view)
            .field("format", &self.format)
            .field("bound", &self.bound)
            .finish()
    }
}

/// Check that `buffer` can be read as texels of `format`.
fn check_texel_layout<B: Block>(
    buffer: &InterleavedBuffer<B>,
    format: TexelFormat,
) -> Result<(), BufferError> {
    let usage = buffer.config().usage;
    if !usage.contains(BufferUsage::TEXEL) {
        return Err(buffer.violation(BufferError::MissingUsage {
            required: BufferUsage::TEXEL,
            found: usage,
        }));
    }
    if buffer.policy() != LayoutPolicy::Packed {
        return Err(buffer.violation(
            LayoutError::PolicyMismatch {
                expected: LayoutPolicy::Packed,
                found: buffer.policy(),
            }
            .into(),
        ));
    }
    let texel_size = format.bytes_per_texel();
    if buffer.stride() % texel_size != 0 {
        return Err(buffer.violation(
            LayoutError::TexelMismatch {
                stride: buffer.stride(),
                texel_size,
            }
            .into(),
        ));
    }
    Ok(())
}

impl<B: Block> TexelBufferView<B> {
    /// Create a view of `buffer` as texels of `format`.
    pub fn new(buffer: SharedBuffer<B>, format: TexelFormat) -> Result<Self, BufferError> {
        let (memory, bound) = {
            let target = buffer.borrow();
            check_texel_layout(&target, format)?;
            (Arc::clone(target.memory()), target.handle())
        };
        let view = memory.create_texel_view(bound, format)?;
        log::debug!("Created {:?} texel view of {:?}", format, bound);

        Ok(Self {
            memory,
            view,
            format,
            buffer,
            bound,
        })
    }

    /// Point the view at another buffer.
    pub fn set_buffer(&mut self, buffer: SharedBuffer<B>) -> Result<(), BufferError> {
        let handle = {
            let target = buffer.borrow();
            check_texel_layout(&target, self.format)?;
            target.handle()
        };
        self.memory.set_texel_view_buffer(self.view, handle)?;
        self.buffer = buffer;
        self.bound = handle;
        Ok(())
    }

    /// Rebind the view if the buffer's handle changed since it was bound.
    ///
    /// Needed after a [`GrowthStrategy::SwapHandle`](super::GrowthStrategy)
    /// resize. Returns whether the view was rebound.
    pub fn refresh(&mut self) -> Result<bool, BufferError> {
        let handle = self.buffer.borrow().handle();
        if handle == self.bound {
            return Ok(false);
        }
        self.memory.set_texel_view_buffer(self.view, handle)?;
        log::debug!("Rebound texel view {:?} to {:?}", self.view, handle);
        self.bound = handle;
        Ok(true)
    }

    /// The buffer providing the texels.
    pub fn buffer(&self) -> SharedBuffer<B> {
        Rc::clone(&self.buffer)
    }

    pub fn handle(&self) -> TexelViewHandle {
        self.view
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    /// Number of texels the view covers.
    pub fn texel_count(&self) -> usize {
        let buffer = self.buffer.borrow();
        buffer.capacity() * buffer.stride() / self.format.bytes_per_texel()
    }
}

impl<B: Block> Drop for TexelBufferView<B> {
    fn drop(&mut self) {
        self.memory.destroy_texel_view(self.view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostMemory;
    use crate::buffer::{BufferConfig, GrowthStrategy, ViolationMode};
    use glam::Vec4;

    fn shared<B: Block>(
        memory: &Arc<HostMemory>,
        policy: LayoutPolicy,
        growth: GrowthStrategy,
    ) -> SharedBuffer<B> {
        let config = BufferConfig::new(BufferUsage::TEXEL)
            .with_growth(growth)
            .with_violation_mode(ViolationMode::ReturnError);
        Rc::new(RefCell::new(
            InterleavedBuffer::new(memory.clone(), policy, 4, config).unwrap(),
        ))
    }

    #[test]
    fn test_view_tracks_swapped_handle() {
        let memory = Arc::new(HostMemory::new());
        let buffer = shared::<(Vec4, Vec4)>(&memory, LayoutPolicy::Packed, GrowthStrategy::SwapHandle);
        let mut view = TexelBufferView::new(Rc::clone(&buffer), TexelFormat::Rgba32Float).unwrap();
        assert_eq!(view.texel_count(), 8);
        assert!(!view.refresh().unwrap());

        buffer.borrow_mut().resize(8).unwrap();
        let handle = buffer.borrow().handle();
        assert!(view.refresh().unwrap());
        assert_eq!(
            memory.texel_view_target(view.handle()),
            Some((handle, TexelFormat::Rgba32Float))
        );
    }

    #[test]
    fn test_rejects_unpacked_layouts() {
        let memory = Arc::new(HostMemory::new());
        let buffer = shared::<(f32, Vec4)>(
            &memory,
            LayoutPolicy::Std140Compatible,
            GrowthStrategy::SwapHandle,
        );
        assert!(matches!(
            TexelBufferView::new(buffer, TexelFormat::R32Float),
            Err(BufferError::Layout(LayoutError::PolicyMismatch { .. }))
        ));

        let buffer = shared::<(f32, u8)>(&memory, LayoutPolicy::Packed, GrowthStrategy::SwapHandle);
        assert!(matches!(
            TexelBufferView::new(buffer, TexelFormat::R32Float),
            Err(BufferError::Layout(LayoutError::TexelMismatch {
                stride: 5,
                texel_size: 4
            }))
        ));
    }

    #[test]
    fn test_rejects_buffers_without_texel_usage() {
        let memory = Arc::new(HostMemory::new());
        let config = BufferConfig::new(BufferUsage::VERTEX)
            .with_violation_mode(ViolationMode::ReturnError);
        let buffer: SharedBuffer<(Vec4,)> = Rc::new(RefCell::new(
            InterleavedBuffer::new(memory.clone(), LayoutPolicy::Packed, 4, config).unwrap(),
        ));
        let err = TexelBufferView::new(Rc::clone(&buffer), TexelFormat::Rgba32Float).unwrap_err();
        assert_eq!(
            err,
            BufferError::MissingUsage {
                required: BufferUsage::TEXEL,
                found: BufferUsage::VERTEX
            }
        );
        assert!(err.is_contract_violation());

        let texel = shared::<(Vec4,)>(&memory, LayoutPolicy::Packed, GrowthStrategy::SwapHandle);
        let mut view = TexelBufferView::new(texel, TexelFormat::Rgba32Float).unwrap();
        assert!(matches!(
            view.set_buffer(buffer),
            Err(BufferError::MissingUsage { .. })
        ));
    }

    #[test]
    fn test_set_buffer_and_drop() {
        let memory = Arc::new(HostMemory::new());
        let first = shared::<(Vec4,)>(&memory, LayoutPolicy::Packed, GrowthStrategy::SwapHandle);
        let second = shared::<(Vec4,)>(&memory, LayoutPolicy::Packed, GrowthStrategy::SwapHandle);
        let mut view = TexelBufferView::new(first, TexelFormat::Rgba32Uint).unwrap();
        view.set_buffer(Rc::clone(&second)).unwrap();

        let handle = view.handle();
        assert_eq!(
            memory.texel_view_target(handle).map(|(buffer, _)| buffer),
            Some(second.borrow().handle())
        );
        assert!(Rc::ptr_eq(&view.buffer(), &second));

        drop(view);
        assert_eq!(memory.texel_view_target(handle), None);
    }
}
