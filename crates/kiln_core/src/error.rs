//! # Memory Error Types
//!
//! Every condition the allocators treat as fatal. Callers propagate these to
//! the frame-loop boundary, which terminates.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

use crate::memory::{ArenaId, ArenaKind};

/// Where an allocation was requested from.
///
/// Captured with `#[track_caller]` so that an exhaustion report names the
/// call site, not the allocator internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocSite {
    /// Debug tag supplied by the caller (e.g. `"queue_family_list"`).
    pub tag: &'static str,
    /// Source location of the allocation call.
    pub location: &'static Location<'static>,
}

impl AllocSite {
    /// Captures the caller's location with the given tag.
    #[inline]
    #[must_use]
    #[track_caller]
    pub fn here(tag: &'static str) -> Self {
        Self {
            tag,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for AllocSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' at {}", self.tag, self.location)
    }
}

/// Errors that can occur in the memory system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// An arena cannot satisfy a request. Arenas never grow.
    #[error("{arena} arena exhausted by {site}: requested {requested} bytes, {used} of {capacity} in use")]
    CapacityExhausted {
        /// Which allocator ran out.
        arena: ArenaKind,
        /// The allocation that failed.
        site: AllocSite,
        /// Bytes requested (after rounding).
        requested: usize,
        /// Bytes in use at the time of the request.
        used: usize,
        /// Total arena capacity.
        capacity: usize,
    },

    /// An arena was configured with an unusable capacity.
    #[error("invalid {arena} arena capacity: {capacity} bytes")]
    InvalidCapacity {
        /// Which allocator was being built.
        arena: ArenaKind,
        /// The rejected capacity.
        capacity: usize,
    },

    /// Alignment is not a power of two.
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(usize),

    /// Alignment is larger than the arena granule.
    #[error("alignment {align} exceeds the maximum supported alignment of {max}")]
    UnsupportedAlignment {
        /// Requested alignment.
        align: usize,
        /// Largest alignment the arenas can honour.
        max: usize,
    },

    /// `pop` called with no marker on the stack.
    #[error("stack allocator pop with an empty marker stack")]
    EmptyMarkerStack,

    /// `pop` called with a marker that is not the most recent one.
    #[error("stack marker popped out of order: top is depth {expected}, got depth {found}")]
    MarkerMismatch {
        /// Depth of the marker on top of the stack.
        expected: usize,
        /// Depth of the marker that was passed in.
        found: usize,
    },

    /// The stack has no allocation that may still be grown in place.
    #[error("no extendable top allocation (a marker or another allocation intervened)")]
    NoTopAllocation,

    /// The top allocation cannot be reinterpreted as the requested element type.
    #[error("top allocation of {len} bytes at offset {offset} does not hold whole elements of {elem_size} bytes aligned to {align}")]
    TopAllocationLayout {
        /// Offset of the top allocation.
        offset: u32,
        /// Length of the top allocation in bytes.
        len: usize,
        /// Element size requested.
        elem_size: usize,
        /// Element alignment requested.
        align: usize,
    },

    /// A pool block was released twice, or released after being reused.
    #[error("double release of pool block at offset {offset}")]
    DoubleRelease {
        /// Offset of the block.
        offset: u32,
    },

    /// A view was handed to an arena that did not produce it.
    #[error("view from arena {found} used with arena {expected}")]
    ForeignView {
        /// The arena the call was made on.
        expected: ArenaId,
        /// The arena recorded in the view.
        found: ArenaId,
    },

    /// A view outlived the memory it referred to.
    #[error("stale {arena} view at offset {offset}: its backing memory was reset, popped or released")]
    StaleView {
        /// Which allocator rejected the view.
        arena: ArenaKind,
        /// Offset recorded in the view.
        offset: u32,
    },

    /// Arena bytes could not be reinterpreted as the view's element type.
    #[error("cannot view arena bytes at offset {offset} as elements aligned to {align}")]
    Misaligned {
        /// Offset of the view.
        offset: u32,
        /// Alignment required by the element type.
        align: usize,
    },
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_message_names_site() {
        let site = AllocSite::here("physical_device_list");
        let err = MemoryError::CapacityExhausted {
            arena: ArenaKind::Stack,
            site,
            requested: 64,
            used: 4096,
            capacity: 4096,
        };
        let message = err.to_string();
        assert!(message.contains("stack arena exhausted"));
        assert!(message.contains("physical_device_list"));
        assert!(message.contains(file!()));
    }
}
