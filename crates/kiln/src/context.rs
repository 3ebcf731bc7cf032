//! # Memory Context
//!
//! The process-wide allocator bundle, assembled once from [`MemoryConfig`]
//! and passed explicitly to everything that allocates.

use bytemuck::Pod;
use kiln_core::{Arena, BufferView, LinearAllocator, MemoryResult, PoolAllocator, StackAllocator};
use kiln_resources::{ManagerLayout, ResourceManager, ResourceResult};

use crate::config::MemoryConfig;

/// Bytes in use in each arena at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// Linear arena bytes in use.
    pub linear: usize,
    /// Stack arena bytes in use.
    pub stack: usize,
    /// Pool arena bytes in use.
    pub pool: usize,
}

/// One linear, one stack and one pool allocator.
///
/// Fields are public so frame code can borrow two arenas at once.
pub struct MemoryContext {
    /// Per-frame scratch, reset by the frame loop.
    pub linear: LinearAllocator,
    /// Scoped scratch for helpers.
    pub stack: StackAllocator,
    /// Persistent blocks.
    pub pool: PoolAllocator,
    layout: ManagerLayout,
}

impl MemoryContext {
    /// Reserves every arena in `config`.
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` if an arena size is unusable.
    pub fn new(config: &MemoryConfig) -> MemoryResult<Self> {
        let context = Self {
            linear: LinearAllocator::new(config.linear_capacity)?,
            stack: StackAllocator::new(config.stack_capacity)?,
            pool: PoolAllocator::new(config.pool_capacity)?,
            layout: config.manager_layout(),
        };
        tracing::debug!(
            linear = context.linear.capacity(),
            stack = context.stack.capacity(),
            pool = context.pool.capacity(),
            "memory context reserved"
        );
        Ok(context)
    }

    /// Allocates per-frame scratch that dies at the next frame.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` or `UnsupportedAlignment`.
    #[track_caller]
    pub fn alloc_frame<T: Pod>(&mut self, count: u32) -> MemoryResult<BufferView<T>> {
        self.linear.alloc_slice(count)
    }

    /// Allocates a persistent block that lives until released to the pool.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` or `UnsupportedAlignment`.
    #[track_caller]
    pub fn alloc_persistent<T: Pod>(&mut self, count: u32) -> MemoryResult<BufferView<T>> {
        self.pool.alloc_slice(count)
    }

    /// Creates a resource table with the configured layout.
    ///
    /// # Errors
    ///
    /// `InvalidLayout` if the configured layout is unusable.
    pub fn new_table<T>(&self, name: &'static str) -> ResourceResult<ResourceManager<T>> {
        ResourceManager::new(name, self.layout)
    }

    /// Current usage of all three arenas.
    #[must_use]
    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            linear: self.linear.used(),
            stack: self.stack.used(),
            pool: self.pool.used(),
        }
    }
}
