//! # KILN Core Memory
//!
//! Fixed-budget arena allocators for a frame-oriented engine:
//! - All memory reserved once at startup, never grown
//! - Three lifetimes: per-frame, scoped, persistent
//! - Typed [`BufferView`]s instead of raw pointers
//!
//! ## Architecture Rules
//!
//! 1. **No allocation on the hot path** - arenas hand out ranges of memory
//!    they already own
//! 2. **No silent failure** - exhaustion and protocol misuse are typed
//!    [`MemoryError`]s that callers propagate to the frame boundary
//! 3. **No dangling views** - resolving a view checks that its memory is
//!    still live
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_core::{Arena, Alignment, StackAllocator};
//!
//! let mut stack = StackAllocator::new(4 * 1024 * 1024)?;
//! let marker = stack.push_marker("device_enumeration");
//! let devices = stack.alloc_slice::<u64>(count, "physical_device_list")?;
//! // ...
//! stack.pop(marker)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;

pub use error::{AllocSite, MemoryError, MemoryResult};
pub use memory::{
    Alignment, AppendRegion, Arena, ArenaId, ArenaKind, BufferView, LinearAllocator, Marker,
    PoolAllocator, StackAllocator, GRANULE,
};
