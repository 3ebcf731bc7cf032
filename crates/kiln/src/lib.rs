//! # KILN
//!
//! The engine's memory context and the frame loop that drives it.
//!
//! ## Frame Lifecycle
//!
//! ```text
//! startup:  MemoryConfig (TOML) -> MemoryContext -> FrameLoop
//! frame:    linear reset -> body(&mut MemoryContext) -> stack depth check
//! failure:  error logged, returned, loop halted
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln::{FrameLoop, MemoryConfig};
//!
//! let config = MemoryConfig::from_file("kiln.toml")?;
//! let mut frames = FrameLoop::new(&config)?;
//! frames.run(600, |memory, frame| {
//!     let visible = memory.alloc_frame::<u32>(4096)?;
//!     // ...
//!     Ok(())
//! })?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod error;
pub mod frame_loop;
pub mod io;

pub use config::MemoryConfig;
pub use context::{MemoryContext, MemoryUsage};
pub use error::{ConfigError, ConfigResult, EngineError, EngineResult};
pub use frame_loop::{FrameLoop, FrameStats, FrameStatsAccumulator, TARGET_FRAME_TIME};
pub use io::{read_file, FileContents};

pub use kiln_core as memory;
pub use kiln_resources as resources;
