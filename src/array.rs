//! Fixed-length arrays whose elements sit at a policy-defined stride.
//!
//! Under [`LayoutPolicy::Std140Compatible`] an array of `f32` places its
//! elements 16 bytes apart, and a `mat3` element occupies three 16-byte
//! columns. The types here expose such arrays element by element while
//! handing out compact values:
//!
//! - [`FixedStrideArray`] owns its bytes and can itself be used as a field.
//! - [`StridedView`] and [`StridedViewMut`] borrow an array field inside a
//!   mapped buffer.

use std::marker::PhantomData;
use std::ops::Range;

use crate::error::BufferError;
use crate::field::{ArrayField, Field};
use crate::layout::{FieldKind, LayoutPolicy};

fn element_range<T: Field>(policy: LayoutPolicy, stride: usize, index: usize) -> Range<usize> {
    let start = index * stride;
    start..start + policy.occupied_size(&T::KIND)
}

fn check_index(index: usize, length: usize) -> Result<(), BufferError> {
    if index < length {
        Ok(())
    } else {
        Err(BufferError::ElementOutOfBounds { index, length })
    }
}

/// An owned array of `N` elements stored at the element stride of a policy.
///
/// ```ignore
/// let mut weights = FixedStrideArray::<f32, 4>::new(LayoutPolicy::Std140Compatible);
/// weights.set(2, &0.5)?;
/// assert_eq!(weights.stride(), 16);
/// assert_eq!(weights.as_bytes().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStrideArray<T, const N: usize> {
    policy: LayoutPolicy,
    bytes: Vec<u8>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Field, const N: usize> FixedStrideArray<T, N> {
    /// Create a zero-filled array.
    pub fn new(policy: LayoutPolicy) -> Self {
        Self {
            policy,
            bytes: vec![0; policy.occupied_size(&Self::KIND)],
            _marker: PhantomData,
        }
    }

    /// Create an array holding `values`.
    pub fn from_values(policy: LayoutPolicy, values: &[T; N]) -> Self {
        let mut array = Self::new(policy);
        values.store(policy, &mut array.bytes);
        array
    }

    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }

    /// Bytes between consecutive elements.
    pub fn stride(&self) -> usize {
        self.policy.array_stride(&T::KIND)
    }

    /// Read element `index`.
    pub fn get(&self, index: usize) -> Result<T, BufferError> {
        check_index(index, N)?;
        let range = element_range::<T>(self.policy, self.stride(), index);
        Ok(T::load(self.policy, &self.bytes[range]))
    }

    /// Overwrite element `index`.
    pub fn set(&mut self, index: usize, value: &T) -> Result<(), BufferError> {
        check_index(index, N)?;
        let range = element_range::<T>(self.policy, self.stride(), index);
        value.store(self.policy, &mut self.bytes[range]);
        Ok(())
    }

    /// Decode every element.
    pub fn to_array(&self) -> [T; N] {
        <[T; N]>::load(self.policy, &self.bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let stride = self.stride();
        (0..N).map(move |index| {
            T::load(self.policy, &self.bytes[element_range::<T>(self.policy, stride, index)])
        })
    }

    /// Raw bytes, padding included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T: Field, const N: usize> Field for FixedStrideArray<T, N> {
    const KIND: FieldKind = FieldKind::array(T::KIND, N);

    fn store(&self, policy: LayoutPolicy, dst: &mut [u8]) {
        let stride = policy.array_stride(&T::KIND);
        for (index, value) in self.iter().enumerate() {
            value.store(policy, &mut dst[element_range::<T>(policy, stride, index)]);
        }
    }

    fn load(policy: LayoutPolicy, src: &[u8]) -> Self {
        Self {
            policy,
            bytes: src[..policy.occupied_size(&Self::KIND)].to_vec(),
            _marker: PhantomData,
        }
    }
}

impl<T: Field, const N: usize> ArrayField for FixedStrideArray<T, N> {
    type Element = T;
    const LEN: usize = N;
}

/// Read-only element view of an array field in mapped memory.
pub struct StridedView<'a, T> {
    bytes: &'a [u8],
    policy: LayoutPolicy,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Field> StridedView<'a, T> {
    /// View `len` elements in `bytes`, which must hold the whole array field.
    pub fn new(bytes: &'a [u8], policy: LayoutPolicy, len: usize) -> Self {
        debug_assert!(bytes.len() >= len * policy.array_stride(&T::KIND));
        Self {
            bytes,
            policy,
            len,
            _marker: PhantomData,
        }
    }

    /// View the array field type `A` in `bytes`.
    pub fn of<A: ArrayField<Element = T>>(bytes: &'a [u8], policy: LayoutPolicy) -> Self {
        Self::new(bytes, policy, A::LEN)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.policy.array_stride(&T::KIND)
    }

    pub fn get(&self, index: usize) -> Result<T, BufferError> {
        check_index(index, self.len)?;
        let range = element_range::<T>(self.policy, self.stride(), index);
        Ok(T::load(self.policy, &self.bytes[range]))
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let stride = self.stride();
        (0..self.len).map(move |index| {
            T::load(self.policy, &self.bytes[element_range::<T>(self.policy, stride, index)])
        })
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }
}

/// Read-write element view of an array field in mapped memory.
pub struct StridedViewMut<'a, T> {
    bytes: &'a mut [u8],
    policy: LayoutPolicy,
    len: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Field> StridedViewMut<'a, T> {
    /// View `len` elements in `bytes`, which must hold the whole array field.
    pub fn new(bytes: &'a mut [u8], policy: LayoutPolicy, len: usize) -> Self {
        debug_assert!(bytes.len() >= len * policy.array_stride(&T::KIND));
        Self {
            bytes,
            policy,
            len,
            _marker: PhantomData,
        }
    }

    /// View the array field type `A` in `bytes`.
    pub fn of<A: ArrayField<Element = T>>(bytes: &'a mut [u8], policy: LayoutPolicy) -> Self {
        Self::new(bytes, policy, A::LEN)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn stride(&self) -> usize {
        self.policy.array_stride(&T::KIND)
    }

    pub fn get(&self, index: usize) -> Result<T, BufferError> {
        check_index(index, self.len)?;
        let range = element_range::<T>(self.policy, self.stride(), index);
        Ok(T::load(self.policy, &self.bytes[range]))
    }

    pub fn set(&mut self, index: usize, value: &T) -> Result<(), BufferError> {
        check_index(index, self.len)?;
        let range = element_range::<T>(self.policy, self.stride(), index);
        value.store(self.policy, &mut self.bytes[range]);
        Ok(())
    }

    /// Write `values` starting at element 0.
    pub fn copy_from(&mut self, values: &[T]) -> Result<(), BufferError> {
        if values.len() > self.len {
            return Err(BufferError::ElementOutOfBounds {
                index: values.len() - 1,
                length: self.len,
            });
        }
        for (index, value) in values.iter().enumerate() {
            self.set(index, value)?;
        }
        Ok(())
    }

    pub fn as_view(&self) -> StridedView<'_, T> {
        StridedView::new(&self.bytes[..], self.policy, self.len)
    }
}
