//! Common utilities for buffer integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use redlilium_interleaved::{
    Block, BufferConfig, BufferUsage, GrowthStrategy, HostMemory, InterleavedBuffer,
    LayoutPolicy, ViolationMode,
};

static LOGGER: Once = Once::new();

/// Route `log` output through the test harness.
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .is_test(true)
            .try_init();
    });
}

// ============================================================================
// Buffer Construction
// ============================================================================

/// Fresh host memory with logging initialised.
pub fn host() -> Arc<HostMemory> {
    init_logging();
    Arc::new(HostMemory::new())
}

/// Configuration that reports contract violations as errors.
pub fn test_config(growth: GrowthStrategy) -> BufferConfig {
    BufferConfig::new(
        BufferUsage::VERTEX | BufferUsage::TEXEL | BufferUsage::COPY_SRC | BufferUsage::COPY_DST,
    )
        .with_label("test buffer")
        .with_growth(growth)
        .with_violation_mode(ViolationMode::ReturnError)
}

/// Create a buffer on `memory` with [`test_config`].
pub fn create_buffer<B: Block>(
    memory: &Arc<HostMemory>,
    policy: LayoutPolicy,
    capacity: usize,
    growth: GrowthStrategy,
) -> InterleavedBuffer<B> {
    InterleavedBuffer::new(memory.clone(), policy, capacity, test_config(growth))
        .expect("Failed to create test buffer")
}

// ============================================================================
// Data Helpers
// ============================================================================

/// Deterministic value for block `index`.
pub fn pattern(index: usize) -> f32 {
    index as f32 * 1.5 + 0.25
}

/// Read an `f32` at `offset` from raw buffer bytes.
pub fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}
