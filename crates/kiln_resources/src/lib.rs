//! # KILN Resources
//!
//! Heavyweight engine objects (GPU buffers, pipelines, models, fonts) are
//! stored in typed tables and addressed by small integer handles:
//! - [`ConstantString`]: a name hashed at compile time
//! - [`ResourceManager`]: dense object store with a name index and a
//!   handle cache
//! - [`FixedHashTable`]: the name index, also usable on its own
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_resources::{ConstantString, ManagerLayout, ResourceManager};
//!
//! let mut buffers: ResourceManager<GpuBuffer> = ResourceManager::new("gpu_buffers", ManagerLayout::default())?;
//! let vbo = buffers.register(ConstantString::new("vbo.font_quads"))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cache;
pub mod constant_string;
pub mod error;
pub mod handle;
pub mod hash_table;
pub mod manager;

pub use cache::{CacheStats, HandleCache};
pub use constant_string::{fnv1a_64, ConstantString};
pub use error::{ResourceError, ResourceResult};
pub use handle::Handle;
pub use hash_table::FixedHashTable;
pub use manager::{ManagerLayout, ResourceManager, MAX_CACHE_SLOTS, MAX_INDEX_SLOTS};
