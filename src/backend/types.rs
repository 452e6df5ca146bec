//! Common types shared between device memory backends

use bitflags::bitflags;

bitflags! {
    /// Usage flags for device buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can back a texel buffer view.
        const TEXEL = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::COPY_SRC | Self::COPY_DST
    }
}

bitflags! {
    /// Access flags for a mapping.
    ///
    /// Whole-buffer mappings only use `READ` and `WRITE`; the remaining flags
    /// are meaningful for range mappings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// Mapped bytes may be read.
        const READ = 1 << 0;
        /// Mapped bytes may be written.
        const WRITE = 1 << 1;
        /// Writes only become visible for ranges passed to `flush_range`.
        const FLUSH_EXPLICIT = 1 << 2;
        /// Previous contents of the mapped range are discarded. Write-only.
        const INVALIDATE_RANGE = 1 << 3;
        /// Previous contents of the whole buffer are discarded. Write-only.
        const INVALIDATE_BUFFER = 1 << 4;
    }
}

impl MapFlags {
    /// Read and write access.
    pub const READ_WRITE: Self = Self::READ.union(Self::WRITE);

    /// Whether these flags grant read access.
    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    /// Whether the mapping discards previous contents.
    pub fn invalidates(&self) -> bool {
        self.intersects(Self::INVALIDATE_RANGE | Self::INVALIDATE_BUFFER)
    }

    /// Whether these flags grant write access.
    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }
}

/// Access mode for a whole-buffer mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Read-only access.
    Read,
    /// Write-only access.
    Write,
    /// Read and write access.
    ReadWrite,
}

impl MapMode {
    /// The access flags equivalent to this mode.
    pub fn flags(&self) -> MapFlags {
        match self {
            MapMode::Read => MapFlags::READ,
            MapMode::Write => MapFlags::WRITE,
            MapMode::ReadWrite => MapFlags::READ_WRITE,
        }
    }
}

/// How often the contents of a buffer are expected to change.
///
/// This is a placement hint for the backend, not a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateFrequency {
    /// Written once, used many times.
    Static,
    /// Rewritten occasionally, used many times.
    #[default]
    Dynamic,
    /// Rewritten every frame, used a few times.
    Stream,
}

/// Descriptor for allocating device memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the allocation.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Usage hint.
    pub frequency: UpdateFrequency,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            frequency: UpdateFrequency::default(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the usage hint.
    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.frequency = frequency;
        self
    }
}

/// Texel format used when a buffer is viewed as a texel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Float,
    R32Uint,
    Rgba32Uint,
    R32Sint,
    Rgba32Sint,
    Rgba8Unorm,
}

impl TexelFormat {
    pub fn bytes_per_texel(&self) -> usize {
        match self {
            TexelFormat::R32Float
            | TexelFormat::R32Uint
            | TexelFormat::R32Sint
            | TexelFormat::Rgba8Unorm => 4,
            TexelFormat::Rg32Float => 8,
            TexelFormat::Rgb32Float => 12,
            TexelFormat::Rgba32Float | TexelFormat::Rgba32Uint | TexelFormat::Rgba32Sint => 16,
        }
    }
}
