//! Device memory backend layer
//!
//! Provides the [`DeviceMemory`] trait that buffers allocate, map and copy
//! through, plus [`HostMemory`], an in-process implementation used for testing
//! and for running without a device.

pub mod host;
pub mod traits;
pub mod types;

pub use host::HostMemory;
pub use traits::*;
pub use types::*;
