//! Layout and buffer error types.

use thiserror::Error;

use crate::backend::{BackendError, BufferUsage};
use crate::layout::LayoutPolicy;

/// Errors raised while building a block layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("a block needs at least one field")]
    EmptyBlock,
    #[error("field {index} is invalid: {reason}")]
    InvalidField { index: usize, reason: String },
    #[error("field index {index} out of range for a block of {count} fields")]
    FieldIndexOutOfRange { index: usize, count: usize },
    #[error("buffer capacity must be at least one block")]
    ZeroCapacity,
    #[error("expected a {expected:?} layout, found {found:?}")]
    PolicyMismatch {
        expected: LayoutPolicy,
        found: LayoutPolicy,
    },
    #[error("block stride {stride} is not a multiple of the {texel_size}-byte texel")]
    TexelMismatch { stride: usize, texel_size: usize },
}

/// Coarse classification of a [`BufferError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The block layout was rejected.
    Layout,
    /// The operation is not allowed in the current map state.
    MapState,
    /// A block index or range is outside the accessible blocks.
    Bounds,
    /// The buffer was not created with the usage an operation needs.
    Usage,
    /// The device could not provide memory.
    Allocation,
    /// Any other device failure.
    Backend,
}

/// Errors raised by buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("cannot {operation} while {state}: {detail}")]
    MapState {
        operation: &'static str,
        state: &'static str,
        detail: &'static str,
    },
    #[error("block {block} is outside the accessible blocks {start}..{end}")]
    OutOfBounds {
        block: usize,
        start: usize,
        end: usize,
    },
    #[error("array index {index} out of range for length {length}")]
    ElementOutOfBounds { index: usize, length: usize },
    #[error("block range {start}+{length} is invalid for {limit} blocks")]
    InvalidRange {
        start: usize,
        length: usize,
        limit: usize,
    },
    #[error("buffer usage {found:?} lacks {required:?}")]
    MissingUsage {
        required: BufferUsage,
        found: BufferUsage,
    },
    #[error("device allocation failed: {0}")]
    Allocation(#[source] BackendError),
    #[error("device error: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for BufferError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::OutOfMemory { .. } | BackendError::AllocationFailed(_) => {
                Self::Allocation(err)
            }
            other => Self::Backend(other),
        }
    }
}

impl BufferError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Layout(_) => ErrorKind::Layout,
            Self::MapState { .. } => ErrorKind::MapState,
            Self::OutOfBounds { .. }
            | Self::ElementOutOfBounds { .. }
            | Self::InvalidRange { .. } => ErrorKind::Bounds,
            Self::MissingUsage { .. } => ErrorKind::Usage,
            Self::Allocation(_) => ErrorKind::Allocation,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Whether this error reports a caller bug rather than a device condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Layout | ErrorKind::MapState | ErrorKind::Bounds | ErrorKind::Usage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BufferError::OutOfBounds {
            block: 1,
            start: 2,
            end: 5,
        };
        assert_eq!(
            err.to_string(),
            "block 1 is outside the accessible blocks 2..5"
        );

        let err = BufferError::from(LayoutError::EmptyBlock);
        assert_eq!(err.to_string(), "layout error: a block needs at least one field");
    }

    #[test]
    fn test_error_kinds() {
        let alloc = BufferError::from(BackendError::OutOfMemory { requested: 16 });
        assert_eq!(alloc.kind(), ErrorKind::Allocation);
        assert!(!alloc.is_contract_violation());

        let state = BufferError::MapState {
            operation: "write",
            state: "mapped read-only",
            detail: "mapping lacks write access",
        };
        assert_eq!(state.kind(), ErrorKind::MapState);
        assert!(state.is_contract_violation());

        let lost = BufferError::from(BackendError::DeviceLost);
        assert_eq!(lost.kind(), ErrorKind::Backend);

        let range = BufferError::InvalidRange {
            start: 3,
            length: 0,
            limit: 4,
        };
        assert_eq!(range.kind(), ErrorKind::Bounds);

        let usage = BufferError::MissingUsage {
            required: BufferUsage::TEXEL,
            found: BufferUsage::UNIFORM,
        };
        assert_eq!(usage.kind(), ErrorKind::Usage);
        assert!(usage.is_contract_violation());
    }
}
