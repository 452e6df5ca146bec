//! Field shape descriptors.
//!
//! A [`FieldKind`] describes the shape of one field of a block: how many bytes
//! it needs and how it is built out of scalar components. Descriptors are plain
//! `Copy` data and can be built in `const` context, so Rust types can publish
//! their shape as an associated constant.

/// Shape of one array element.
///
/// This is the non-array subset of [`FieldKind`]; arrays of arrays are not
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A single scalar.
    Scalar { size: usize, align: usize },
    /// `components` scalars of `component_size` bytes each.
    Vector {
        component_size: usize,
        components: usize,
    },
    /// Column-major matrix of `cols` columns with `rows` components each.
    Matrix {
        component_size: usize,
        rows: usize,
        cols: usize,
    },
    /// Pre-padded user data, copied verbatim.
    Opaque { size: usize, align: usize },
}

impl ElementKind {
    /// The field kind of a single element.
    pub const fn to_field(self) -> FieldKind {
        match self {
            ElementKind::Scalar { size, align } => FieldKind::Scalar { size, align },
            ElementKind::Vector {
                component_size,
                components,
            } => FieldKind::Vector {
                component_size,
                components,
            },
            ElementKind::Matrix {
                component_size,
                rows,
                cols,
            } => FieldKind::Matrix {
                component_size,
                rows,
                cols,
            },
            ElementKind::Opaque { size, align } => FieldKind::Opaque { size, align },
        }
    }
}

/// Shape of one field of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A single scalar.
    Scalar { size: usize, align: usize },
    /// `components` scalars of `component_size` bytes each.
    Vector {
        component_size: usize,
        components: usize,
    },
    /// Column-major matrix of `cols` columns with `rows` components each.
    Matrix {
        component_size: usize,
        rows: usize,
        cols: usize,
    },
    /// `length` elements of one kind.
    FixedArray { element: ElementKind, length: usize },
    /// Pre-padded user data, copied verbatim.
    Opaque { size: usize, align: usize },
}

impl FieldKind {
    /// A scalar with the size and alignment of `T`.
    pub const fn scalar_of<T>() -> Self {
        FieldKind::Scalar {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }

    /// A vector of `components` scalars.
    pub const fn vector(component_size: usize, components: usize) -> Self {
        FieldKind::Vector {
            component_size,
            components,
        }
    }

    /// A square `n`x`n` matrix.
    pub const fn square_matrix(component_size: usize, n: usize) -> Self {
        FieldKind::Matrix {
            component_size,
            rows: n,
            cols: n,
        }
    }

    /// Opaque bytes with the size and alignment of `T`.
    pub const fn opaque_of<T>() -> Self {
        FieldKind::Opaque {
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }

    /// A fixed-length array of `element`.
    ///
    /// # Panics
    ///
    /// Panics if `element` is itself an array. In a `const` context this is a
    /// compile error.
    pub const fn array(element: FieldKind, length: usize) -> Self {
        let element = match element.as_element() {
            Some(element) => element,
            None => panic!("arrays of arrays are not supported"),
        };
        FieldKind::FixedArray { element, length }
    }

    /// This kind as an array element, or `None` for arrays.
    pub const fn as_element(&self) -> Option<ElementKind> {
        match *self {
            FieldKind::Scalar { size, align } => Some(ElementKind::Scalar { size, align }),
            FieldKind::Vector {
                component_size,
                components,
            } => Some(ElementKind::Vector {
                component_size,
                components,
            }),
            FieldKind::Matrix {
                component_size,
                rows,
                cols,
            } => Some(ElementKind::Matrix {
                component_size,
                rows,
                cols,
            }),
            FieldKind::Opaque { size, align } => Some(ElementKind::Opaque { size, align }),
            FieldKind::FixedArray { .. } => None,
        }
    }

    /// Size in bytes when tightly packed.
    pub fn natural_size(&self) -> usize {
        match *self {
            FieldKind::Scalar { size, .. } | FieldKind::Opaque { size, .. } => size,
            FieldKind::Vector {
                component_size,
                components,
            } => component_size * components,
            FieldKind::Matrix {
                component_size,
                rows,
                cols,
            } => component_size * rows * cols,
            FieldKind::FixedArray { element, length } => element.to_field().natural_size() * length,
        }
    }

    /// Alignment intrinsic to the field's own type.
    ///
    /// Vectors and matrices align like their components.
    pub fn natural_align(&self) -> usize {
        match *self {
            FieldKind::Scalar { align, .. } | FieldKind::Opaque { align, .. } => align,
            FieldKind::Vector { component_size, .. } | FieldKind::Matrix { component_size, .. } => {
                component_size
            }
            FieldKind::FixedArray { element, .. } => element.to_field().natural_align(),
        }
    }

    /// Size of the underlying scalar component, if the kind is built from one.
    pub fn component_size(&self) -> Option<usize> {
        match *self {
            FieldKind::Scalar { size, .. } => Some(size),
            FieldKind::Vector { component_size, .. } | FieldKind::Matrix { component_size, .. } => {
                Some(component_size)
            }
            FieldKind::FixedArray { element, .. } => element.to_field().component_size(),
            FieldKind::Opaque { .. } => None,
        }
    }

    /// Check the descriptor invariants.
    pub fn validate(&self) -> Result<(), String> {
        fn check_pow2(what: &str, value: usize) -> Result<(), String> {
            if value == 0 || !value.is_power_of_two() {
                return Err(format!("{what} must be a positive power of two, got {value}"));
            }
            Ok(())
        }

        match *self {
            FieldKind::Scalar { size, align } => {
                check_pow2("scalar size", size)?;
                check_pow2("alignment", align)
            }
            FieldKind::Opaque { size, align } => {
                if size == 0 {
                    return Err("size must be positive".to_string());
                }
                check_pow2("alignment", align)
            }
            FieldKind::Vector {
                component_size,
                components,
            } => {
                check_pow2("component size", component_size)?;
                if !(1..=4).contains(&components) {
                    return Err(format!(
                        "vectors have 1 to 4 components, got {components}"
                    ));
                }
                Ok(())
            }
            FieldKind::Matrix {
                component_size,
                rows,
                cols,
            } => {
                check_pow2("component size", component_size)?;
                if !(2..=4).contains(&rows) || !(2..=4).contains(&cols) {
                    return Err(format!(
                        "matrices have 2 to 4 rows and columns, got {rows}x{cols}"
                    ));
                }
                Ok(())
            }
            FieldKind::FixedArray { element, length } => {
                if length == 0 {
                    return Err("arrays need at least one element".to_string());
                }
                element.to_field().validate()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_metrics() {
        let vec3 = FieldKind::vector(4, 3);
        assert_eq!(vec3.natural_size(), 12);
        assert_eq!(vec3.natural_align(), 4);

        let mat3 = FieldKind::square_matrix(4, 3);
        assert_eq!(mat3.natural_size(), 36);

        let array = FieldKind::array(FieldKind::scalar_of::<u16>(), 5);
        assert_eq!(array.natural_size(), 10);
        assert_eq!(array.natural_align(), 2);
        assert_eq!(array.component_size(), Some(2));
    }

    #[test]
    fn test_element_conversion() {
        let kind = FieldKind::vector(4, 2);
        let element = kind.as_element().unwrap();
        assert_eq!(element.to_field(), kind);
        assert_eq!(FieldKind::array(kind, 2).as_element(), None);
    }

    #[test]
    #[should_panic(expected = "arrays of arrays")]
    fn test_nested_array_rejected() {
        let inner = FieldKind::array(FieldKind::scalar_of::<f32>(), 2);
        let _ = FieldKind::array(inner, 2);
    }

    #[test]
    fn test_validate() {
        assert!(FieldKind::scalar_of::<f64>().validate().is_ok());
        assert!(FieldKind::Scalar { size: 4, align: 3 }.validate().is_err());
        assert!(FieldKind::Scalar { size: 3, align: 1 }.validate().is_err());
        assert!(FieldKind::Opaque { size: 0, align: 4 }.validate().is_err());
        assert!(FieldKind::vector(4, 5).validate().is_err());
        assert!(FieldKind::vector(3, 2).validate().is_err());
        assert!(FieldKind::square_matrix(4, 1).validate().is_err());
        assert!(FieldKind::array(FieldKind::scalar_of::<f32>(), 0)
            .validate()
            .is_err());
    }
}
