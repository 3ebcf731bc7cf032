//! # Engine Error Types
//!
//! The errors that reach the frame-loop boundary. Every lower-level error
//! converts into [`EngineError`] so frame code can use `?` throughout.

use std::path::PathBuf;

use kiln_core::MemoryError;
use kiln_resources::ResourceError;
use thiserror::Error;

/// Errors raised while loading or validating [`MemoryConfig`](crate::MemoryConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for [`MemoryConfig`](crate::MemoryConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the engine cannot run with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that stop the frame loop.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration failed to load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An allocator failed or was misused.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A resource table failed or was misused.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A file could not be read into arena memory.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A frame returned with stack markers still pushed.
    #[error("frame {frame} ended with {depth} stack marker(s) still pushed: {open}")]
    UnbalancedStack {
        /// Frame that leaked the markers.
        frame: u64,
        /// Marker depth at the end of the frame.
        depth: usize,
        /// Sites of the open markers, outermost first.
        open: String,
    },

    /// A frame returned with stack memory allocated outside any marker.
    #[error("frame {frame} left {leaked} bytes allocated on the stack outside any marker")]
    StackLeak {
        /// Frame that leaked the memory.
        frame: u64,
        /// Bytes above the stack cursor the frame started with.
        leaked: usize,
    },

    /// The loop already stopped on an earlier error.
    #[error("frame loop halted after a fatal error in frame {frame}")]
    Halted {
        /// Frame whose error stopped the loop.
        frame: u64,
    },
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
