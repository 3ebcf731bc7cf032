//! # Arena Storage
//!
//! The owned, contiguous byte block behind every allocator.
//!
//! Storage is a boxed slice of 16-byte granules so that the base address is
//! aligned for any `Pod` element type up to 16 bytes. Typed access goes
//! through `bytemuck`; no pointer ever leaves this module.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::ArenaKind;

/// Size and alignment of one storage granule in bytes.
pub const GRANULE: usize = 16;

/// Process-wide source of arena identities. Starts at 1; 0 is `ArenaId::NONE`.
static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Read only through bytemuck casts.
#[allow(dead_code)]
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(16))]
struct Granule([u8; GRANULE]);

/// Identity of one arena instance.
///
/// Every view records the arena that produced it, so a view handed to the
/// wrong allocator is rejected instead of aliasing unrelated memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ArenaId(u32);

impl ArenaId {
    /// Identity carried by null views.
    pub const NONE: Self = Self(0);

    fn next() -> Self {
        Self(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identity value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A power-of-two alignment no larger than [`GRANULE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Alignment(u32);

impl Alignment {
    /// Byte alignment (no padding).
    pub const BYTE: Self = Self(1);

    /// The fixed alignment used by the linear and pool allocators.
    pub const DEFAULT: Self = Self(GRANULE as u32);

    /// Largest supported alignment.
    pub const MAX: Self = Self(GRANULE as u32);

    /// Creates an alignment, rejecting non powers of two and values above
    /// [`Alignment::MAX`].
    ///
    /// # Errors
    ///
    /// `InvalidAlignment` or `UnsupportedAlignment`.
    pub fn new(align: usize) -> MemoryResult<Self> {
        if !align.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(align));
        }
        if align > GRANULE {
            return Err(MemoryError::UnsupportedAlignment {
                align,
                max: GRANULE,
            });
        }
        Ok(Self(align as u32))
    }

    /// Alignment required by `T`.
    ///
    /// # Errors
    ///
    /// `UnsupportedAlignment` if `T` needs more than [`GRANULE`] bytes.
    pub fn of<T>() -> MemoryResult<Self> {
        Self::new(std::mem::align_of::<T>())
    }

    /// The alignment in bytes.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// Rounds `offset` up to this alignment.
    #[inline]
    #[must_use]
    pub const fn align_up(self, offset: usize) -> usize {
        let mask = self.0 as usize - 1;
        (offset + mask) & !mask
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Owned backing block of one arena.
pub(crate) struct ArenaStorage {
    id: ArenaId,
    granules: Box<[Granule]>,
}

impl ArenaStorage {
    /// Reserves `capacity` bytes, rounded up to a whole granule.
    pub(crate) fn new(kind: ArenaKind, capacity: usize) -> MemoryResult<Self> {
        // Offsets are stored as u32 inside views.
        if capacity == 0 || capacity > u32::MAX as usize - GRANULE {
            return Err(MemoryError::InvalidCapacity {
                arena: kind,
                capacity,
            });
        }
        let granule_count = capacity.div_ceil(GRANULE);
        Ok(Self {
            id: ArenaId::next(),
            granules: vec![Granule::zeroed(); granule_count].into_boxed_slice(),
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> ArenaId {
        self.id
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.granules.len() * GRANULE
    }

    #[inline]
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.granules)
    }

    #[inline]
    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.granules)
    }

    /// Zero-fills `[offset, offset + len)`.
    pub(crate) fn zero(&mut self, offset: usize, len: usize) {
        self.bytes_mut()[offset..offset + len].fill(0);
    }

    /// Copies `src` into the arena at `offset`.
    pub(crate) fn write(&mut self, offset: usize, src: &[u8]) {
        self.bytes_mut()[offset..offset + src.len()].copy_from_slice(src);
    }

    /// Reinterprets `count` elements of `T` starting at byte `offset`.
    pub(crate) fn slice<T: Pod>(&self, offset: u32, count: u32) -> MemoryResult<&[T]> {
        let start = offset as usize;
        let end = start + count as usize * std::mem::size_of::<T>();
        bytemuck::try_cast_slice(&self.bytes()[start..end]).map_err(|_| MemoryError::Misaligned {
            offset,
            align: std::mem::align_of::<T>(),
        })
    }

    /// Mutable counterpart of [`ArenaStorage::slice`].
    pub(crate) fn slice_mut<T: Pod>(&mut self, offset: u32, count: u32) -> MemoryResult<&mut [T]> {
        let start = offset as usize;
        let end = start + count as usize * std::mem::size_of::<T>();
        bytemuck::try_cast_slice_mut(&mut self.bytes_mut()[start..end]).map_err(|_| {
            MemoryError::Misaligned {
                offset,
                align: std::mem::align_of::<T>(),
            }
        })
    }
}
