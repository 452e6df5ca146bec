//! Typed fields.
//!
//! [`Field`] ties a Rust value type to its [`FieldKind`] and converts between the
//! value and its byte image under a [`LayoutPolicy`]. Values are always decoded
//! into compact Rust values, so a std140 `vec3` array or a padded `mat3` reads
//! back as a plain `[Vec3; N]` or `Mat3`.

mod block;

pub use block::{Block, FieldAt};

use bytemuck::Pod;
use glam::{
    DVec2, DVec3, DVec4, IVec2, IVec3, IVec4, Mat2, Mat3, Mat4, UVec2, UVec3, UVec4, Vec2, Vec3,
    Vec4,
};

use crate::layout::{FieldKind, LayoutPolicy};

/// A value that can be stored in a block field.
///
/// `store` writes into, and `load` reads from, a slice of exactly
/// `policy.occupied_size(&Self::KIND)` bytes. Padding bytes inside that slice
/// are left untouched by `store`.
pub trait Field: Sized + 'static {
    /// Shape of the field.
    const KIND: FieldKind;

    /// Encode `self` into `dst`.
    fn store(&self, policy: LayoutPolicy, dst: &mut [u8]);

    /// Decode a value from `src`.
    fn load(policy: LayoutPolicy, src: &[u8]) -> Self;
}

/// A field holding a fixed-length array.
pub trait ArrayField: Field {
    /// Element type.
    type Element: Field;
    /// Number of elements.
    const LEN: usize;
}

macro_rules! impl_scalar_field {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Field for $ty {
                const KIND: FieldKind = FieldKind::scalar_of::<$ty>();

                fn store(&self, _policy: LayoutPolicy, dst: &mut [u8]) {
                    dst[..std::mem::size_of::<$ty>()].copy_from_slice(bytemuck::bytes_of(self));
                }

                fn load(_policy: LayoutPolicy, src: &[u8]) -> Self {
                    bytemuck::pod_read_unaligned(&src[..std::mem::size_of::<$ty>()])
                }
            }
        )+
    };
}

impl_scalar_field!(u8, i8, u16, i16, u32, i32, f32, u64, i64, f64);

macro_rules! impl_vector_field {
    ($($ty:ty => [$scalar:ty; $n:literal]),+ $(,)?) => {
        $(
            impl Field for $ty {
                const KIND: FieldKind = FieldKind::vector(std::mem::size_of::<$scalar>(), $n);

                fn store(&self, _policy: LayoutPolicy, dst: &mut [u8]) {
                    let values: [$scalar; $n] = self.to_array();
                    dst[..std::mem::size_of::<[$scalar; $n]>()]
                        .copy_from_slice(bytemuck::bytes_of(&values));
                }

                fn load(_policy: LayoutPolicy, src: &[u8]) -> Self {
                    let values: [$scalar; $n] =
                        bytemuck::pod_read_unaligned(&src[..std::mem::size_of::<[$scalar; $n]>()]);
                    <$ty>::from_array(values)
                }
            }
        )+
    };
}

impl_vector_field!(
    Vec2 => [f32; 2],
    Vec3 => [f32; 3],
    Vec4 => [f32; 4],
    IVec2 => [i32; 2],
    IVec3 => [i32; 3],
    IVec4 => [i32; 4],
    UVec2 => [u32; 2],
    UVec3 => [u32; 3],
    UVec4 => [u32; 4],
    DVec2 => [f64; 2],
    DVec3 => [f64; 3],
    DVec4 => [f64; 4],
);

/// Write column-major `values` one column at a time at the policy's column stride.
fn store_columns<S: Pod>(policy: LayoutPolicy, values: &[S], rows: usize, dst: &mut [u8]) {
    let column_bytes = rows * std::mem::size_of::<S>();
    let stride = policy.column_stride(std::mem::size_of::<S>(), rows);
    for (col, column) in values.chunks_exact(rows).enumerate() {
        let start = col * stride;
        dst[start..start + column_bytes].copy_from_slice(bytemuck::cast_slice(column));
    }
}

fn load_columns<S: Pod>(policy: LayoutPolicy, values: &mut [S], rows: usize, src: &[u8]) {
    let column_bytes = rows * std::mem::size_of::<S>();
    let stride = policy.column_stride(std::mem::size_of::<S>(), rows);
    for (col, column) in values.chunks_exact_mut(rows).enumerate() {
        let start = col * stride;
        bytemuck::cast_slice_mut::<S, u8>(column).copy_from_slice(&src[start..start + column_bytes]);
    }
}

macro_rules! impl_matrix_field {
    ($($ty:ty => $n:literal),+ $(,)?) => {
        $(
            impl Field for $ty {
                const KIND: FieldKind = FieldKind::square_matrix(std::mem::size_of::<f32>(), $n);

                fn store(&self, policy: LayoutPolicy, dst: &mut [u8]) {
                    store_columns(policy, &self.to_cols_array(), $n, dst);
                }

                fn load(policy: LayoutPolicy, src: &[u8]) -> Self {
                    let mut values = [0.0f32; $n * $n];
                    load_columns(policy, &mut values, $n, src);
                    <$ty>::from_cols_array(&values)
                }
            }
        )+
    };
}

impl_matrix_field!(Mat2 => 2, Mat3 => 3, Mat4 => 4);

impl<T: Field, const N: usize> Field for [T; N] {
    const KIND: FieldKind = FieldKind::array(T::KIND, N);

    fn store(&self, policy: LayoutPolicy, dst: &mut [u8]) {
        let stride = policy.array_stride(&T::KIND);
        let size = policy.occupied_size(&T::KIND);
        for (index, value) in self.iter().enumerate() {
            let start = index * stride;
            value.store(policy, &mut dst[start..start + size]);
        }
    }

    fn load(policy: LayoutPolicy, src: &[u8]) -> Self {
        let stride = policy.array_stride(&T::KIND);
        let size = policy.occupied_size(&T::KIND);
        std::array::from_fn(|index| {
            let start = index * stride;
            T::load(policy, &src[start..start + size])
        })
    }
}

impl<T: Field, const N: usize> ArrayField for [T; N] {
    type Element = T;
    const LEN: usize = N;
}

/// Pre-padded user data stored verbatim.
///
/// The field takes the size and alignment of `T`. No policy rules are applied
/// inside it, so `T` must already carry whatever padding the consumer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Opaque<T>(pub T);

impl<T> Opaque<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Pod> Field for Opaque<T> {
    const KIND: FieldKind = FieldKind::opaque_of::<T>();

    fn store(&self, _policy: LayoutPolicy, dst: &mut [u8]) {
        dst[..std::mem::size_of::<T>()].copy_from_slice(bytemuck::bytes_of(&self.0));
    }

    fn load(_policy: LayoutPolicy, src: &[u8]) -> Self {
        Opaque(bytemuck::pod_read_unaligned(&src[..std::mem::size_of::<T>()]))
    }
}
