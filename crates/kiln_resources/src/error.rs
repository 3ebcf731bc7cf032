//! # Resource Error Types

use thiserror::Error;

use crate::ConstantString;

/// Errors that can occur in the resource tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A name was looked up that was never registered.
    #[error("{table}: unknown name {name}")]
    UnknownName {
        /// Debug name of the table.
        table: &'static str,
        /// The name that was looked up.
        name: ConstantString,
    },

    /// A handle outside the registered range, or the `NONE` sentinel.
    #[error("{table}: invalid handle {index} ({len} slots registered)")]
    InvalidHandle {
        /// Debug name of the table.
        table: &'static str,
        /// Raw handle index.
        index: u32,
        /// Number of slots ever registered.
        len: usize,
    },

    /// A handle whose object was removed.
    #[error("{table}: handle {index} refers to a removed object")]
    RemovedHandle {
        /// Debug name of the table.
        table: &'static str,
        /// Raw handle index.
        index: u32,
    },

    /// Every slot of the table has been handed out.
    #[error("{table}: table full ({capacity} slots)")]
    TableFull {
        /// Debug name of the table.
        table: &'static str,
        /// Fixed slot capacity.
        capacity: usize,
    },

    /// Every bucket within the probe limit is full.
    #[error("{table}: no free bucket for {name} within the probe limit")]
    IndexFull {
        /// Debug name of the table.
        table: &'static str,
        /// The name being inserted.
        name: ConstantString,
    },

    /// Two different texts hash to the same value.
    #[error("{table}: \"{existing}\" and \"{incoming}\" collide on hash {hash:#018x}")]
    HashCollision {
        /// Debug name of the table.
        table: &'static str,
        /// Text already registered.
        existing: &'static str,
        /// Text that collided with it.
        incoming: &'static str,
        /// The shared hash.
        hash: u64,
    },

    /// A table or cache was configured with an unusable layout.
    #[error("{table}: invalid layout: {reason}")]
    InvalidLayout {
        /// Debug name of the table.
        table: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
