//! Blocks as tuples of fields.
//!
//! A block type is a tuple of [`Field`] types, e.g. `(Vec3, f32, [Vec4; 4])`.
//! [`Block::FIELDS`] lists their kinds for the layout engine, and
//! [`FieldAt<I>`] names the type of field `I` so that typed accessors only
//! compile for indices the block actually has.

use std::sync::Arc;

use super::Field;
use crate::error::LayoutError;
use crate::layout::{BlockLayout, FieldKind, LayoutPolicy};

/// An ordered sequence of fields.
pub trait Block: 'static {
    /// Field kinds in declaration order.
    const FIELDS: &'static [FieldKind];

    /// Shared layout of this block under `policy`.
    fn layout(policy: LayoutPolicy) -> Result<Arc<BlockLayout>, LayoutError> {
        BlockLayout::shared(policy, Self::FIELDS)
    }
}

/// Field `I` of a block.
pub trait FieldAt<const I: usize>: Block {
    type Type: Field;
}

macro_rules! impl_field_at {
    (@one [$($name:ident),+] $idx:tt $ty:ident) => {
        impl<$($name: Field),+> FieldAt<$idx> for ($($name,)+) {
            type Type = $ty;
        }
    };
    ($names:tt; $($idx:tt => $ty:ident),+) => {
        $(impl_field_at!(@one $names $idx $ty);)+
    };
}

macro_rules! impl_block {
    ($([$($name:ident),+] => { $($idx:tt => $ty:ident),+ };)+) => {
        $(
            impl<$($name: Field),+> Block for ($($name,)+) {
                const FIELDS: &'static [FieldKind] = &[$($name::KIND),+];
            }

            impl_field_at!([$($name),+]; $($idx => $ty),+);
        )+
    };
}

impl_block! {
    [A] => { 0 => A };
    [A, B] => { 0 => A, 1 => B };
    [A, B, C] => { 0 => A, 1 => B, 2 => C };
    [A, B, C, D] => { 0 => A, 1 => B, 2 => C, 3 => D };
    [A, B, C, D, E] => { 0 => A, 1 => B, 2 => C, 3 => D, 4 => E };
    [A, B, C, D, E, F] => { 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F };
    [A, B, C, D, E, F, G] => { 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G };
    [A, B, C, D, E, F, G, H] => {
        0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G, 7 => H
    };
}
