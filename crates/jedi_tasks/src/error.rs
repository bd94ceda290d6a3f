//! # Scheduler Error Types
//!
//! All errors that can occur while creating, running or freeing tasks.

use jedi_core::MemoryError;
use thiserror::Error;

use crate::fixed::Fixed16;
use crate::task::TaskId;

/// Errors that can occur in the task scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// No free record for a new task.
    #[error("task pool full: capacity {capacity}")]
    TaskPoolFull {
        /// Maximum number of live tasks.
        capacity: usize,
    },

    /// The active list cannot take another entry.
    #[error("active task list full: capacity {capacity}")]
    ActiveListFull {
        /// Maximum number of active entries.
        capacity: usize,
    },

    /// The task was freed or never existed.
    #[error("unknown {0}")]
    UnknownTask(TaskId),

    /// The task is executing and cannot be freed or re-entered.
    #[error("{0} is running")]
    TaskRunning(TaskId),

    /// A tick length or wake delay that makes no sense.
    #[error("invalid delay {0}")]
    InvalidDelay(Fixed16),

    /// Task locals were requested with a different size than the first time.
    #[error("{task} locals are {allocated} bytes, requested {requested}")]
    LocalsSizeMismatch {
        /// The task.
        task: TaskId,
        /// Size of the existing locals block.
        allocated: usize,
        /// Size of the requested type.
        requested: usize,
    },

    /// The locals type cannot live in a region allocation.
    #[error("unsupported task locals layout: size {size}, align {align}")]
    LocalsLayout {
        /// Size of the locals type.
        size: usize,
        /// Alignment of the locals type.
        align: usize,
    },

    /// Region failure while managing task locals.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
