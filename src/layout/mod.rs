//! Block layout computation.
//!
//! A block is an ordered sequence of fields. Given the [`FieldKind`] of every
//! field and a [`LayoutPolicy`], [`compute_layout`] folds the per-field padding
//! rule over the sequence and produces the block stride plus one byte offset per
//! field.
//!
//! # Policies
//!
//! - [`LayoutPolicy::Packed`]: no padding.
//! - [`LayoutPolicy::Aligned`]: natural alignment, C-struct style.
//! - [`LayoutPolicy::Std140Compatible`]: uniform-block rules. Scalars align to
//!   their size, 2-component vectors to two components, 3/4-component vectors,
//!   matrix columns and array elements to four components.
//!
//! Std140 rules apply to every field regardless of what precedes it, and the
//! block is rounded up to the std140 alignment of its last field (four
//! components for vector, matrix and array fields).

mod block;
mod field;
mod policy;

pub use block::{BlockLayout, BlockLayoutBuilder, compute_layout};
pub use field::{ElementKind, FieldKind};
pub use policy::{LayoutPolicy, align_up, pad};
