//! # Jedi Tasks
//!
//! Cooperative, tick-driven tasks for time-delayed gameplay logic: timed
//! light changes, countdowns, scripted sequences.
//!
//! ## Design Principles
//!
//! 1. **No threads, no async** - One task runs at a time until it yields
//! 2. **Explicit state machines** - A task body matches on its resume point
//!    and returns a [`TaskStep`]
//! 3. **Fixed-point time** - Delays are [`Fixed16`] ticks
//! 4. **Region-backed locals** - Per-task state survives yields and is
//!    released with the task
//!
//! ## Example
//!
//! ```rust,ignore
//! use jedi_tasks::{Fixed16, TaskContext, TaskScheduler, TaskStep};
//!
//! fn blink(ctx: &mut TaskContext<'_, Level>) -> TaskStep {
//!     ctx.world().toggle_light(3);
//!     TaskStep::loop_after(Fixed16::from_ticks(72))
//! }
//!
//! let mut scheduler = TaskScheduler::default();
//! scheduler.push_task("blink", blink)?;
//! scheduler.run_tasks(&mut level_region, &mut level, Fixed16::ONE)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod fixed;
pub mod scheduler;
pub mod task;

pub use error::{SchedulerError, SchedulerResult};
pub use fixed::Fixed16;
pub use scheduler::{SchedulerConfig, TaskScheduler, TickStats};
pub use task::{Invocation, TaskContext, TaskFn, TaskId, TaskStep};
