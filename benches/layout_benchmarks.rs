use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat3, Mat4, Vec3, Vec4};

use redlilium_interleaved::{
    Block, BufferConfig, FieldKind, HostMemory, InterleavedBuffer, LayoutPolicy, MapMode,
    ViolationMode, compute_layout,
};

type Instance = (Mat4, Vec4, Vec3, f32, [Mat3; 2]);

// ---------------------------------------------------------------------------
// Layout computation
// ---------------------------------------------------------------------------

fn bench_compute_layout_std140(c: &mut Criterion) {
    c.bench_function("compute_layout_std140_instance", |b| {
        b.iter(|| compute_layout(black_box(LayoutPolicy::Std140Compatible), Instance::FIELDS));
    });
}

fn bench_compute_layout_packed(c: &mut Criterion) {
    let fields = vec![FieldKind::vector(4, 3); 32];
    c.bench_function("compute_layout_packed_32_fields", |b| {
        b.iter(|| compute_layout(black_box(LayoutPolicy::Packed), black_box(&fields)));
    });
}

fn bench_shared_layout_lookup(c: &mut Criterion) {
    c.bench_function("shared_layout_lookup", |b| {
        b.iter(|| Instance::layout(black_box(LayoutPolicy::Aligned)));
    });
}

// ---------------------------------------------------------------------------
// Field access
// ---------------------------------------------------------------------------

fn instance_buffer(capacity: usize) -> InterleavedBuffer<Instance> {
    InterleavedBuffer::new(
        Arc::new(HostMemory::new()),
        LayoutPolicy::Std140Compatible,
        capacity,
        BufferConfig::default().with_violation_mode(ViolationMode::ReturnError),
    )
    .expect("Failed to create benchmark buffer")
}

fn bench_write_transforms(c: &mut Criterion) {
    let mut buffer = instance_buffer(1024);
    buffer.map(MapMode::ReadWrite).expect("map");
    c.bench_function("write_1024_mat4", |b| {
        b.iter(|| {
            for block in 0..1024 {
                let _ = buffer.write::<0>(block, black_box(Mat4::IDENTITY));
            }
        });
    });
}

fn bench_read_std140_mat3_array(c: &mut Criterion) {
    let mut buffer = instance_buffer(256);
    buffer.map(MapMode::ReadWrite).expect("map");
    c.bench_function("read_256_mat3_pairs", |b| {
        b.iter(|| {
            for block in 0..256 {
                black_box(buffer.read::<4>(block).ok());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_compute_layout_std140,
    bench_compute_layout_packed,
    bench_shared_layout_lookup,
    bench_write_transforms,
    bench_read_std140_mat3_array,
);
criterion_main!(benches);
