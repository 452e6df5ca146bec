//! Map state of an interleaved buffer.

use std::ops::Range;
use std::ptr::NonNull;

use crate::backend::MapFlags;

/// Observable map state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MapState {
    /// No mapping is active.
    #[default]
    Unmapped,
    /// Every block is mapped.
    MappedFull { flags: MapFlags },
    /// Blocks `start..end` are mapped.
    MappedRange {
        start: usize,
        end: usize,
        flags: MapFlags,
    },
}

impl MapState {
    pub fn is_mapped(&self) -> bool {
        !matches!(self, MapState::Unmapped)
    }

    /// Access flags of the active mapping.
    pub fn flags(&self) -> Option<MapFlags> {
        match *self {
            MapState::Unmapped => None,
            MapState::MappedFull { flags } | MapState::MappedRange { flags, .. } => Some(flags),
        }
    }

    /// Blocks accessible through the active mapping of a buffer of `capacity` blocks.
    pub fn blocks(&self, capacity: usize) -> Option<Range<usize>> {
        match *self {
            MapState::Unmapped => None,
            MapState::MappedFull { .. } => Some(0..capacity),
            MapState::MappedRange { start, end, .. } => Some(start..end),
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            MapState::Unmapped => "unmapped",
            MapState::MappedFull { .. } => "mapped",
            MapState::MappedRange { .. } => "range-mapped",
        }
    }
}

/// The active mapping together with the pointer the backend handed out.
#[derive(Debug, Default)]
pub(crate) enum Mapping {
    #[default]
    Unmapped,
    Full {
        flags: MapFlags,
        ptr: NonNull<u8>,
    },
    Range {
        start: usize,
        end: usize,
        flags: MapFlags,
        ptr: NonNull<u8>,
    },
}

impl Mapping {
    pub(crate) fn state(&self) -> MapState {
        match *self {
            Mapping::Unmapped => MapState::Unmapped,
            Mapping::Full { flags, .. } => MapState::MappedFull { flags },
            Mapping::Range {
                start, end, flags, ..
            } => MapState::MappedRange { start, end, flags },
        }
    }

    /// First mapped block and the pointer to it.
    pub(crate) fn base(&self) -> Option<(usize, NonNull<u8>)> {
        match *self {
            Mapping::Unmapped => None,
            Mapping::Full { ptr, .. } => Some((0, ptr)),
            Mapping::Range { start, ptr, .. } => Some((start, ptr)),
        }
    }
}
