//! Block layouts: stride and per-field offsets for a field sequence.
//!
//! Layouts are pure data computed once per `(policy, fields)` pair. Buffers
//! obtain them through [`BlockLayout::shared`], so every buffer of one shape
//! points at the same table.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::field::FieldKind;
use super::policy::{LayoutPolicy, align_up, pad};
use crate::error::LayoutError;

/// Compute the stride and field offsets of a block.
///
/// An empty sequence yields a zero stride and no offsets.
pub fn compute_layout(policy: LayoutPolicy, fields: &[FieldKind]) -> (usize, Vec<usize>) {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut running = 0usize;

    for kind in fields {
        let offset = running + pad(policy, kind, running);
        offsets.push(offset);
        running = offset + policy.occupied_size(kind);
    }

    let stride = match fields.last() {
        Some(last) => align_up(running, policy.trailing_alignment(last)),
        None => 0,
    };

    (stride, offsets)
}

/// Immutable layout of one block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockLayout {
    policy: LayoutPolicy,
    fields: Vec<FieldKind>,
    offsets: Vec<usize>,
    stride: usize,
}

impl BlockLayout {
    /// Validate `fields` and compute their layout under `policy`.
    pub fn new(policy: LayoutPolicy, fields: &[FieldKind]) -> Result<Self, LayoutError> {
        if fields.is_empty() {
            return Err(LayoutError::EmptyBlock);
        }
        for (index, kind) in fields.iter().enumerate() {
            kind.validate()
                .map_err(|reason| LayoutError::InvalidField { index, reason })?;
        }

        let (stride, offsets) = compute_layout(policy, fields);
        log::debug!(
            "Computed {:?} block layout: {} fields, stride {}",
            policy,
            fields.len(),
            stride
        );

        Ok(Self {
            policy,
            fields: fields.to_vec(),
            offsets,
            stride,
        })
    }

    /// Get the process-wide shared layout for `(policy, fields)`.
    pub fn shared(policy: LayoutPolicy, fields: &[FieldKind]) -> Result<Arc<Self>, LayoutError> {
        static CACHE: OnceLock<Mutex<HashMap<(LayoutPolicy, Vec<FieldKind>), Arc<BlockLayout>>>> =
            OnceLock::new();

        let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        let mut cache = cache.lock();
        if let Some(layout) = cache.get(&(policy, fields.to_vec())) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(Self::new(policy, fields)?);
        cache.insert((policy, fields.to_vec()), Arc::clone(&layout));
        Ok(layout)
    }

    /// Start building a layout field by field.
    pub fn builder(policy: LayoutPolicy) -> BlockLayoutBuilder {
        BlockLayoutBuilder::new(policy)
    }

    /// The policy this layout was computed with.
    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    /// Bytes per block, including trailing padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always false for a constructed layout.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Byte offset of field `index` from the start of a block.
    pub fn field_offset(&self, index: usize) -> Result<usize, LayoutError> {
        self.offsets
            .get(index)
            .copied()
            .ok_or(LayoutError::FieldIndexOutOfRange {
                index,
                count: self.fields.len(),
            })
    }

    /// Bytes field `index` occupies, padding inside the field included.
    pub fn field_size(&self, index: usize) -> Result<usize, LayoutError> {
        self.fields
            .get(index)
            .map(|kind| self.policy.occupied_size(kind))
            .ok_or(LayoutError::FieldIndexOutOfRange {
                index,
                count: self.fields.len(),
            })
    }

    /// Iterate over `(offset, kind)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FieldKind)> + '_ {
        self.offsets.iter().copied().zip(self.fields.iter())
    }
}

impl fmt::Display for BlockLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:?} block, stride {}", self.policy, self.stride)?;
        for (index, (offset, kind)) in self.iter().enumerate() {
            writeln!(
                f,
                "  [{index}] @{offset:>4} +{:<4} {kind:?}",
                self.policy.occupied_size(kind)
            )?;
        }
        Ok(())
    }
}

/// Builder for [`BlockLayout`].
///
/// ```ignore
/// let layout = BlockLayout::builder(LayoutPolicy::Std140Compatible)
///     .with_field(FieldKind::scalar_of::<f32>())
///     .with_field(FieldKind::vector(4, 3))
///     .build()?;
/// assert_eq!(layout.offsets(), &[0, 16]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BlockLayoutBuilder {
    policy: LayoutPolicy,
    fields: Vec<FieldKind>,
    nested: Option<usize>,
}

impl BlockLayoutBuilder {
    pub fn new(policy: LayoutPolicy) -> Self {
        Self {
            policy,
            fields: Vec::new(),
            nested: None,
        }
    }

    /// Append a field.
    pub fn with_field(mut self, kind: FieldKind) -> Self {
        self.fields.push(kind);
        self
    }

    /// Append a fixed-length array of `element`.
    ///
    /// Arrays of arrays are reported by [`build`](Self::build).
    pub fn with_array(mut self, element: FieldKind, length: usize) -> Self {
        match element.as_element() {
            Some(element) => self.fields.push(FieldKind::FixedArray { element, length }),
            None => {
                self.nested.get_or_insert(self.fields.len());
                self.fields.push(element);
            }
        }
        self
    }

    /// Validate the fields and compute the layout.
    pub fn build(self) -> Result<BlockLayout, LayoutError> {
        self.check_nesting()?;
        BlockLayout::new(self.policy, &self.fields)
    }

    /// Validate the fields and fetch the shared layout.
    pub fn build_shared(self) -> Result<Arc<BlockLayout>, LayoutError> {
        self.check_nesting()?;
        BlockLayout::shared(self.policy, &self.fields)
    }

    fn check_nesting(&self) -> Result<(), LayoutError> {
        match self.nested {
            Some(index) => Err(LayoutError::InvalidField {
                index,
                reason: "arrays of arrays are not supported".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const U8: FieldKind = FieldKind::scalar_of::<u8>();
    const U32: FieldKind = FieldKind::scalar_of::<u32>();
    const F32: FieldKind = FieldKind::scalar_of::<f32>();
    const VEC3: FieldKind = FieldKind::vector(4, 3);

    #[test]
    fn test_aligned_u8_u32() {
        let (stride, offsets) = compute_layout(LayoutPolicy::Aligned, &[U8, U32]);
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(stride, 8);
    }

    #[test]
    fn test_std140_float_vec3() {
        let (stride, offsets) = compute_layout(LayoutPolicy::Std140Compatible, &[F32, VEC3]);
        assert_eq!(offsets, vec![0, 16]);
        assert_eq!(stride, 32);
    }

    #[test]
    fn test_std140_scalar_after_array() {
        let array = FieldKind::array(F32, 2);
        let (stride, offsets) = compute_layout(LayoutPolicy::Std140Compatible, &[array, F32]);
        assert_eq!(offsets, vec![0, 32]);
        assert_eq!(stride, 36);
    }

    #[test]
    fn test_empty_sequence() {
        let (stride, offsets) = compute_layout(LayoutPolicy::Std140Compatible, &[]);
        assert_eq!(stride, 0);
        assert!(offsets.is_empty());
        assert_eq!(
            BlockLayout::new(LayoutPolicy::Packed, &[]),
            Err(LayoutError::EmptyBlock)
        );
    }

    #[test]
    fn test_invalid_field_reported() {
        let result = BlockLayout::new(
            LayoutPolicy::Aligned,
            &[F32, FieldKind::Scalar { size: 4, align: 6 }],
        );
        assert!(matches!(
            result,
            Err(LayoutError::InvalidField { index: 1, .. })
        ));
    }

    #[test]
    fn test_field_offset_out_of_range() {
        let layout = BlockLayout::new(LayoutPolicy::Packed, &[F32, VEC3]).unwrap();
        assert_eq!(layout.field_offset(1), Ok(4));
        assert_eq!(layout.field_size(1), Ok(12));
        assert_eq!(
            layout.field_offset(2),
            Err(LayoutError::FieldIndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_builder_rejects_nested_arrays() {
        let nested = FieldKind::array(F32, 3);
        let result = BlockLayout::builder(LayoutPolicy::Packed)
            .with_array(nested, 2)
            .build();
        assert!(matches!(
            result,
            Err(LayoutError::InvalidField { index: 0, .. })
        ));

        let layout = BlockLayout::builder(LayoutPolicy::Std140Compatible)
            .with_field(U32)
            .with_array(F32, 4)
            .build()
            .unwrap();
        assert_eq!(layout.offsets(), &[0, 16]);
        assert_eq!(layout.stride(), 80);
    }

    #[test]
    fn test_shared_layouts_are_deduplicated() {
        let a = BlockLayout::shared(LayoutPolicy::Aligned, &[U8, VEC3, U32]).unwrap();
        let b = BlockLayout::shared(LayoutPolicy::Aligned, &[U8, VEC3, U32]).unwrap();
        let c = BlockLayout::shared(LayoutPolicy::Packed, &[U8, VEC3, U32]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_display_lists_fields() {
        let layout = BlockLayout::new(LayoutPolicy::Std140Compatible, &[F32, VEC3]).unwrap();
        let text = layout.to_string();
        assert!(text.starts_with("Std140Compatible block, stride 32"));
        assert_eq!(text.lines().count(), 3);
    }
}
