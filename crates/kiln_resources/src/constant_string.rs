//! # Constant Strings
//!
//! Names reduced to a 64-bit hash for cheap comparison and table keys.
//!
//! Hashing is a `const fn`, so names written in source are hashed at compile
//! time:
//!
//! ```rust,ignore
//! const FONT_QUADS: ConstantString = ConstantString::new("model.font_quads");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};

/// FNV-1a 64-bit offset basis.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime.
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hash of `bytes`.
#[must_use]
pub const fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// A name identified by its hash.
///
/// Equality, ordering and hashing use the hash alone: equal text always
/// gives equal names, and two different texts with the same hash compare
/// equal. Names built from `'static` text keep it for diagnostics and for
/// collision detection in the handle tables.
#[derive(Clone, Copy)]
pub struct ConstantString {
    hash: u64,
    text: Option<&'static str>,
}

impl ConstantString {
    /// Hashes static text, keeping the text for diagnostics.
    #[inline]
    #[must_use]
    pub const fn new(text: &'static str) -> Self {
        Self {
            hash: fnv1a_64(text.as_bytes()),
            text: Some(text),
        }
    }

    /// Hashes text that does not live for `'static`. The text is not kept.
    #[inline]
    #[must_use]
    pub fn from_runtime(text: &str) -> Self {
        Self {
            hash: fnv1a_64(text.as_bytes()),
            text: None,
        }
    }

    /// A name known only by its hash.
    #[inline]
    #[must_use]
    pub const fn from_hash(hash: u64) -> Self {
        Self { hash, text: None }
    }

    /// A name whose text does not match its hash.
    #[cfg(test)]
    pub(crate) const fn forged(hash: u64, text: &'static str) -> Self {
        Self {
            hash,
            text: Some(text),
        }
    }

    /// The 64-bit hash.
    #[inline]
    #[must_use]
    pub const fn hash_value(self) -> u64 {
        self.hash
    }

    /// The source text, if it was `'static`.
    #[inline]
    #[must_use]
    pub const fn text(self) -> Option<&'static str> {
        self.text
    }
}

impl Default for ConstantString {
    fn default() -> Self {
        Self::new("")
    }
}

impl From<&'static str> for ConstantString {
    fn from(text: &'static str) -> Self {
        Self::new(text)
    }
}

impl PartialEq for ConstantString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ConstantString {}

impl PartialOrd for ConstantString {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConstantString {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Hash for ConstantString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for ConstantString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.text {
            Some(text) => write!(f, "\"{text}\""),
            None => write!(f, "#{:016x}", self.hash),
        }
    }
}

impl fmt::Debug for ConstantString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConstantString({self})")
    }
}
