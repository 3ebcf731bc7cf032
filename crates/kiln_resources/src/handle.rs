//! # Handles
//!
//! Typed 32-bit indices into a [`ResourceManager`](crate::ResourceManager).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index of an object in the `ResourceManager<T>` that issued it.
///
/// The type parameter keeps a model handle from being passed to the GPU
/// buffer table. Handles are stable for the lifetime of their object and
/// never reused after removal.
pub struct Handle<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// "No object" sentinel.
    pub const NONE: Self = Self::from_raw(u32::MAX);

    /// Wraps a raw index.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    /// The raw index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Checks if this is the [`Handle::NONE`] sentinel.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.index == u32::MAX
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>();
        let short = name.rsplit("::").next().unwrap_or(name);
        if self.is_none() {
            write!(f, "Handle<{short}>(NONE)")
        } else {
            write!(f, "Handle<{short}>({})", self.index)
        }
    }
}
