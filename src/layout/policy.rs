//! Layout policies and per-field padding.

use super::field::{ElementKind, FieldKind};

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two.
#[inline]
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Padding and alignment rule set applied when laying out a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayoutPolicy {
    /// No padding at all. The stride is the sum of the field sizes.
    #[default]
    Packed,
    /// Every field sits at a multiple of its natural alignment within the
    /// block, like a C struct.
    ///
    /// The stride is only rounded to the last field's alignment, so fields of
    /// blocks after the first are not guaranteed to be naturally aligned in
    /// memory: `(u32, u8)` has stride 5 and its second `u32` starts at byte 5.
    Aligned,
    /// Uniform-block layout: vec3/vec4 align to four components, array
    /// elements and matrix columns are padded to four components.
    Std140Compatible,
}

impl LayoutPolicy {
    /// Alignment a field must start at.
    pub fn alignment(self, kind: &FieldKind) -> usize {
        match self {
            LayoutPolicy::Packed => 1,
            LayoutPolicy::Aligned => kind.natural_align(),
            LayoutPolicy::Std140Compatible => match *kind {
                FieldKind::Scalar { size, .. } => size,
                FieldKind::Vector {
                    component_size,
                    components,
                } => match components {
                    1 => component_size,
                    2 => 2 * component_size,
                    _ => 4 * component_size,
                },
                FieldKind::Matrix { component_size, .. } => 4 * component_size,
                FieldKind::FixedArray { element, .. } => std140_element_base(element),
                FieldKind::Opaque { align, .. } => align,
            },
        }
    }

    /// Bytes a field occupies under this policy, including padding inside it.
    pub fn occupied_size(self, kind: &FieldKind) -> usize {
        match *kind {
            FieldKind::FixedArray { element, length } => length * self.element_stride(element),
            FieldKind::Matrix {
                component_size,
                rows,
                cols,
            } if self == LayoutPolicy::Std140Compatible => {
                cols * align_up(rows * component_size, 4 * component_size)
            }
            _ => kind.natural_size(),
        }
    }

    /// Distance between consecutive elements of an array.
    pub fn element_stride(self, element: ElementKind) -> usize {
        let field = element.to_field();
        match self {
            LayoutPolicy::Packed => field.natural_size(),
            LayoutPolicy::Aligned => align_up(field.natural_size(), field.natural_align()),
            LayoutPolicy::Std140Compatible => {
                align_up(self.occupied_size(&field), std140_element_base(element))
            }
        }
    }

    /// Element stride of an array whose elements have kind `element`.
    ///
    /// Array kinds have no element stride of their own and advance by their
    /// occupied size.
    pub fn array_stride(self, element: &FieldKind) -> usize {
        match element.as_element() {
            Some(element) => self.element_stride(element),
            None => self.occupied_size(element),
        }
    }

    /// Distance between consecutive columns of a matrix.
    pub fn column_stride(self, component_size: usize, rows: usize) -> usize {
        match self {
            LayoutPolicy::Std140Compatible => align_up(rows * component_size, 4 * component_size),
            _ => rows * component_size,
        }
    }

    /// Alignment the block is rounded up to when `kind` is its last field.
    pub fn trailing_alignment(self, kind: &FieldKind) -> usize {
        match self {
            LayoutPolicy::Packed => 1,
            LayoutPolicy::Aligned => kind.natural_align(),
            LayoutPolicy::Std140Compatible => match *kind {
                FieldKind::Scalar { size, .. } => size,
                FieldKind::Vector { component_size, .. } | FieldKind::Matrix { component_size, .. } => {
                    4 * component_size
                }
                FieldKind::FixedArray { element, .. } => std140_element_base(element),
                FieldKind::Opaque { align, .. } => align,
            },
        }
    }
}

/// Stride base of a std140 array element: four components of its scalar, or
/// at least 16 bytes for opaque data.
fn std140_element_base(element: ElementKind) -> usize {
    match element {
        ElementKind::Scalar { size, .. } => 4 * size,
        ElementKind::Vector { component_size, .. } | ElementKind::Matrix { component_size, .. } => {
            4 * component_size
        }
        ElementKind::Opaque { align, .. } => align.max(16),
    }
}

/// Padding needed before placing `kind` at `offset`.
pub fn pad(policy: LayoutPolicy, kind: &FieldKind, offset: usize) -> usize {
    align_up(offset, policy.alignment(kind)) - offset
}
