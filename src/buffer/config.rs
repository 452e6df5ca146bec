//! Buffer configuration.

use crate::backend::{BufferDescriptor, BufferUsage, UpdateFrequency};

use super::growth::GrowthStrategy;

/// What a buffer does when a caller breaks an operation's contract.
///
/// Contract violations are map-state, bounds and layout errors. Allocation
/// failures are always returned as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationMode {
    /// Panic with the error message.
    Panic,
    /// Return the error to the caller.
    ReturnError,
}

impl Default for ViolationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ViolationMode::Panic
        } else {
            ViolationMode::ReturnError
        }
    }
}

/// Configuration of an [`InterleavedBuffer`](super::InterleavedBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferConfig {
    /// Debug label passed to the backend.
    pub label: Option<String>,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Usage hint.
    pub frequency: UpdateFrequency,
    /// How the buffer grows on resize.
    pub growth: GrowthStrategy,
    /// Reaction to contract violations.
    pub on_violation: ViolationMode,
}

impl BufferConfig {
    pub fn new(usage: BufferUsage) -> Self {
        Self {
            usage,
            ..Default::default()
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn with_growth(mut self, growth: GrowthStrategy) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_violation_mode(mut self, mode: ViolationMode) -> Self {
        self.on_violation = mode;
        self
    }

    /// Descriptor for an allocation of `size` bytes.
    pub(crate) fn descriptor(&self, size: u64) -> BufferDescriptor {
        let descriptor =
            BufferDescriptor::new(size, self.usage).with_frequency(self.frequency);
        match &self.label {
            Some(label) => descriptor.with_label(label.clone()),
            None => descriptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BufferConfig::default();
        assert_eq!(config.label, None);
        assert_eq!(config.usage, BufferUsage::COPY_SRC | BufferUsage::COPY_DST);
        assert_eq!(config.growth, GrowthStrategy::SwapHandle);
        #[cfg(debug_assertions)]
        assert_eq!(config.on_violation, ViolationMode::Panic);
    }

    #[test]
    fn test_descriptor() {
        let config = BufferConfig::new(BufferUsage::VERTEX)
            .with_label("instances")
            .with_frequency(UpdateFrequency::Stream);
        let descriptor = config.descriptor(64);
        assert_eq!(descriptor.size, 64);
        assert_eq!(descriptor.usage, BufferUsage::VERTEX);
        assert_eq!(descriptor.label.as_deref(), Some("instances"));
        assert_eq!(descriptor.frequency, UpdateFrequency::Stream);
    }
}
