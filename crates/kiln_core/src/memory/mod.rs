//! # Memory Management
//!
//! Fixed-budget arenas partitioned by lifetime.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once at startup. During a frame:
//! - Per-frame scratch comes from the [`LinearAllocator`] and dies on reset
//! - Scoped scratch comes from the [`StackAllocator`] and dies on pop
//! - Persistent data comes from the [`PoolAllocator`] and dies on release
//!
//! Allocations hand out [`BufferView`]s, never pointers. A view is resolved
//! through the [`Arena`] that produced it, which rejects views whose memory
//! has since been reclaimed.

use std::fmt;

use bytemuck::Pod;

use crate::error::{MemoryError, MemoryResult};

mod linear;
mod pool;
mod stack;
mod storage;
mod view;

pub use linear::LinearAllocator;
pub use pool::PoolAllocator;
pub use stack::{AppendRegion, Marker, StackAllocator};
pub use storage::{Alignment, ArenaId, GRANULE};
pub use view::BufferView;

/// The three allocation strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArenaKind {
    /// Bump allocator, reset once per frame.
    Linear,
    /// Bump allocator with LIFO markers.
    Stack,
    /// General-purpose free-list allocator.
    Pool,
}

impl fmt::Display for ArenaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linear => "linear",
            Self::Stack => "stack",
            Self::Pool => "pool",
        })
    }
}

/// Common surface of the three allocators.
///
/// Resolving a view checks that it came from this arena and that its memory
/// is still live; the checks are what make views safe to hold without a
/// lifetime.
pub trait Arena {
    /// Identity stamped into every view this arena hands out.
    fn id(&self) -> ArenaId;

    /// Which strategy this arena implements.
    fn kind(&self) -> ArenaKind;

    /// Total capacity in bytes.
    fn capacity(&self) -> usize;

    /// Bytes currently allocated.
    fn used(&self) -> usize;

    /// Bytes still available.
    fn remaining(&self) -> usize {
        self.capacity() - self.used()
    }

    /// Resolves a view to a shared slice.
    ///
    /// # Errors
    ///
    /// `ForeignView` if the view came from another arena, `StaleView` if its
    /// memory was reclaimed.
    fn get<T: Pod>(&self, view: BufferView<T>) -> MemoryResult<&[T]>;

    /// Resolves a view to a mutable slice.
    ///
    /// # Errors
    ///
    /// Same as [`Arena::get`].
    fn get_mut<T: Pod>(&mut self, view: BufferView<T>) -> MemoryResult<&mut [T]>;
}

/// Rejects views produced by a different arena.
#[inline]
pub(crate) fn check_owner<T>(expected: ArenaId, view: &BufferView<T>) -> MemoryResult<()> {
    if view.arena() == expected {
        Ok(())
    } else {
        Err(MemoryError::ForeignView {
            expected,
            found: view.arena(),
        })
    }
}

/// Bytes needed for `count` elements of `T`, if it fits an arena offset.
#[inline]
pub(crate) fn byte_size_of<T>(count: u32) -> Option<usize> {
    (count as usize)
        .checked_mul(std::mem::size_of::<T>())
        .filter(|&bytes| bytes <= u32::MAX as usize)
}
