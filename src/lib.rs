//! # RedLilium Interleaved
//!
//! Byte-exact block layouts and typed interleaved device buffers.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`layout`] - Stride and field offsets of a block under a [`LayoutPolicy`]
//!   (packed, C-aligned or std140-compatible)
//! - [`Field`] / [`Block`] - Rust types as fields and tuples of fields as blocks
//! - [`InterleavedBuffer`] - A mappable, resizable device buffer of blocks with
//!   typed per-field accessors
//! - [`FixedStrideArray`] - Arrays whose elements are padded to the policy's stride
//! - [`TexelBufferView`] - A texel view sharing a packed buffer
//! - [`backend`] - The [`DeviceMemory`] trait and the in-process [`HostMemory`]
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glam::{Mat4, Vec4};
//! use redlilium_interleaved::{
//!     BufferConfig, BufferUsage, HostMemory, InterleavedBuffer, LayoutPolicy, MapMode,
//! };
//!
//! let memory = Arc::new(HostMemory::new());
//! let mut instances = InterleavedBuffer::<(Mat4, Vec4)>::new(
//!     memory,
//!     LayoutPolicy::Std140Compatible,
//!     64,
//!     BufferConfig::new(BufferUsage::VERTEX).with_label("instances"),
//! )?;
//!
//! instances.map(MapMode::Write)?;
//! instances.write::<0>(0, Mat4::IDENTITY)?;
//! instances.write::<1>(0, Vec4::ONE)?;
//! instances.unmap()?;
//! ```

pub mod array;
pub mod backend;
pub mod buffer;
pub mod error;
pub mod field;
pub mod layout;

// Re-export main types for convenience
pub use array::{FixedStrideArray, StridedView, StridedViewMut};
pub use backend::{
    BackendError, BufferDescriptor, BufferHandle, BufferUsage, DeviceMemory, HostMemory, MapFlags,
    MapMode, TexelFormat, UpdateFrequency,
};
pub use buffer::{
    BufferConfig, ElementType, FieldMut, FieldType, GrowthStrategy, InterleavedBuffer, MapState, SharedBuffer,
    TexelBufferView, ViolationMode,
};
pub use error::{BufferError, ErrorKind, LayoutError};
pub use field::{ArrayField, Block, Field, FieldAt, Opaque};
pub use layout::{BlockLayout, ElementKind, FieldKind, LayoutPolicy, compute_layout, pad};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version.
pub fn init() {
    log::info!("RedLilium Interleaved v{} initialized", VERSION);
}
