//! # Frame Loop
//!
//! The boundary where errors stop the engine.
//!
//! ```text
//! Frame N:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. BEGIN FRAME                                               │
//! │    └─ Reset the linear arena (last frame's scratch dies)     │
//! │                                                              │
//! │ 2. FRAME BODY                                                │
//! │    └─ Caller's closure runs with &mut MemoryContext          │
//! │                                                              │
//! │ 3. END FRAME                                                 │
//! │    ├─ Stack arena must be back at depth 0 and its old cursor │
//! │    └─ Record frame statistics                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first error from any step is logged, returned, and halts the loop
//! for good: no frame runs after a failure.

use std::time::{Duration, Instant};

use kiln_core::Arena;

use crate::config::MemoryConfig;
use crate::context::{MemoryContext, MemoryUsage};
use crate::error::{EngineError, EngineResult};

/// Target frame time for 60 FPS.
pub const TARGET_FRAME_TIME: Duration = Duration::from_micros(16_666);

/// Statistics for one completed frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Time spent in the frame body, in microseconds.
    pub total_us: u64,
    /// Arena usage when the frame body returned.
    pub usage: MemoryUsage,
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of total frame times.
    pub total_us_sum: u64,
    /// Min frame time.
    pub min_frame_us: u64,
    /// Max frame time.
    pub max_frame_us: u64,
    /// Frames that exceeded budget.
    pub frames_over_budget: u64,
    /// Most linear-arena bytes any frame used.
    pub peak_linear: usize,
    /// Most pool bytes in use at the end of any frame.
    pub peak_pool: usize,
}

impl FrameStatsAccumulator {
    /// Creates a new accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frames_recorded: 0,
            total_us_sum: 0,
            min_frame_us: u64::MAX,
            max_frame_us: 0,
            frames_over_budget: 0,
            peak_linear: 0,
            peak_pool: 0,
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.min_frame_us = self.min_frame_us.min(stats.total_us);
        self.max_frame_us = self.max_frame_us.max(stats.total_us);
        self.peak_linear = self.peak_linear.max(stats.usage.linear);
        self.peak_pool = self.peak_pool.max(stats.usage.pool);

        if stats.total_us > TARGET_FRAME_TIME.as_micros() as u64 {
            self.frames_over_budget += 1;
        }
    }

    /// Returns average frame time in milliseconds.
    #[must_use]
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.total_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the fraction of frames over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives frames over one [`MemoryContext`].
pub struct FrameLoop {
    context: MemoryContext,
    frame_count: u64,
    /// Frame whose error halted the loop.
    halted_at: Option<u64>,
    stats: FrameStatsAccumulator,
}

impl FrameLoop {
    /// Reserves the memory budget in `config` and creates the loop.
    ///
    /// # Errors
    ///
    /// `Memory` if an arena cannot be reserved.
    pub fn new(config: &MemoryConfig) -> EngineResult<Self> {
        Ok(Self::with_context(MemoryContext::new(config)?))
    }

    /// Creates the loop over an existing context.
    #[must_use]
    pub fn with_context(context: MemoryContext) -> Self {
        Self {
            context,
            frame_count: 0,
            halted_at: None,
            stats: FrameStatsAccumulator::new(),
        }
    }

    /// Runs one frame.
    ///
    /// # Arguments
    ///
    /// * `body` - Frame work; receives the context and the frame number
    ///
    /// # Errors
    ///
    /// The body's error, `UnbalancedStack` if the body left stack markers
    /// pushed, `StackLeak` if it left stack memory allocated outside any
    /// marker, or `Halted` if an earlier frame already failed.
    pub fn run_frame<R, F>(&mut self, body: F) -> EngineResult<R>
    where
        F: FnOnce(&mut MemoryContext, u64) -> EngineResult<R>,
    {
        if let Some(frame) = self.halted_at {
            return Err(EngineError::Halted { frame });
        }

        let frame = self.frame_count;
        self.context.linear.reset();
        let stack_base = self.context.stack.used();
        let start = Instant::now();

        let result = body(&mut self.context, frame).and_then(|value| {
            self.check_stack_balanced(frame, stack_base)?;
            Ok(value)
        });
        let value = match result {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(frame, %error, "fatal error at frame boundary, halting");
                self.halted_at = Some(frame);
                return Err(error);
            }
        };

        let stats = FrameStats {
            frame,
            total_us: start.elapsed().as_micros() as u64,
            usage: self.context.usage(),
        };
        self.stats.record(stats);
        self.frame_count += 1;
        tracing::trace!(frame, us = stats.total_us, linear = stats.usage.linear, "frame complete");
        Ok(value)
    }

    /// Runs `frames` frames, stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first error any frame returns.
    pub fn run<F>(&mut self, frames: u64, mut body: F) -> EngineResult<()>
    where
        F: FnMut(&mut MemoryContext, u64) -> EngineResult<()>,
    {
        for _ in 0..frames {
            self.run_frame(&mut body)?;
        }
        Ok(())
    }

    /// Number of frames completed.
    #[inline]
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Checks if an error has stopped the loop.
    #[inline]
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Returns the accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats
    }

    /// The allocators, for setup outside any frame.
    #[must_use]
    pub fn context_mut(&mut self) -> &mut MemoryContext {
        &mut self.context
    }

    /// The allocators.
    #[must_use]
    pub fn context(&self) -> &MemoryContext {
        &self.context
    }

    fn check_stack_balanced(&self, frame: u64, base: usize) -> EngineResult<()> {
        let depth = self.context.stack.depth();
        if depth == 0 {
            let used = self.context.stack.used();
            if used > base {
                return Err(EngineError::StackLeak {
                    frame,
                    leaked: used - base,
                });
            }
            return Ok(());
        }
        let open = self
            .context
            .stack
            .open_markers()
            .map(|site| site.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(EngineError::UnbalancedStack { frame, depth, open })
    }
}
