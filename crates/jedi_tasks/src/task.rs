//! # Tasks
//!
//! A task is a plain function that the scheduler calls again and again.
//! Between calls it keeps two things: a resume point (which step of its
//! sequence comes next) and an optional block of locals in a [`Region`].
//!
//! ```rust,ignore
//! fn flicker(ctx: &mut TaskContext<'_, Level>) -> TaskStep {
//!     match ctx.resume_point() {
//!         0 => {
//!             ctx.world().set_light(SECTOR, 0);
//!             TaskStep::yield_for(Fixed16::from_ticks(10), 1)
//!         }
//!         1 => {
//!             ctx.world().set_light(SECTOR, 31);
//!             TaskStep::yield_for(Fixed16::from_ticks(5), 2)
//!         }
//!         _ => TaskStep::end(),
//!     }
//! }
//! ```

use std::fmt;
use std::mem;

use bytemuck::Pod;
use jedi_core::memory::ALLOC_ALIGN;
use jedi_core::{PoolHandle, Region, RegionHandle};

use crate::error::{SchedulerError, SchedulerResult};
use crate::fixed::Fixed16;
use crate::scheduler::TaskScheduler;

/// Body of a task.
pub type TaskFn<W> = fn(&mut TaskContext<'_, W>) -> TaskStep;

/// Handle to a task owned by a [`TaskScheduler`].
///
/// Handles of freed tasks are detected, never resolved to a newer task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) PoolHandle);

impl TaskId {
    /// Slot index of the task record.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0.index()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {}.{}", self.0.index(), self.0.generation())
    }
}

/// What a task body asks for when it returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStep {
    /// Run again from the top (resume point 0) after `delay`.
    Loop {
        /// Ticks to wait; negative holds until woken.
        delay: Fixed16,
    },
    /// Continue at `resume` after `delay`.
    Yield {
        /// Ticks to wait; negative holds until woken.
        delay: Fixed16,
        /// Resume point for the next call.
        resume: u32,
    },
    /// Finished: the task is freed along with its locals.
    End,
}

impl TaskStep {
    /// Restart from the top after `delay`.
    #[inline]
    #[must_use]
    pub const fn loop_after(delay: Fixed16) -> Self {
        Self::Loop { delay }
    }

    /// Continue at `resume` after `delay`.
    #[inline]
    #[must_use]
    pub const fn yield_for(delay: Fixed16, resume: u32) -> Self {
        Self::Yield { delay, resume }
    }

    /// Finish the task.
    #[inline]
    #[must_use]
    pub const fn end() -> Self {
        Self::End
    }
}

/// Why a task body is being called.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// The scheduler's tick found the task ready.
    Scheduled,
    /// Called directly through [`TaskScheduler::run_task`] with an argument.
    Direct(i32),
}

/// Bookkeeping for one task.
pub(crate) struct TaskRecord<W> {
    pub(crate) func: TaskFn<W>,
    pub(crate) name: &'static str,
    pub(crate) delay: Fixed16,
    pub(crate) resume_point: u32,
    pub(crate) locals: Option<RegionHandle>,
    pub(crate) active_slot: Option<usize>,
}

impl<W> TaskRecord<W> {
    pub(crate) fn new(name: &'static str, func: TaskFn<W>) -> Self {
        Self {
            func,
            name,
            delay: Fixed16::ZERO,
            resume_point: 0,
            locals: None,
            active_slot: None,
        }
    }
}

/// Everything a running task body can reach.
///
/// The context borrows the scheduler, the region holding task locals, and
/// the caller's world for the duration of one call.
pub struct TaskContext<'a, W> {
    scheduler: &'a mut TaskScheduler<W>,
    region: &'a mut Region,
    world: &'a mut W,
    id: TaskId,
    invocation: Invocation,
}

impl<'a, W> TaskContext<'a, W> {
    pub(crate) fn new(
        scheduler: &'a mut TaskScheduler<W>,
        region: &'a mut Region,
        world: &'a mut W,
        id: TaskId,
        invocation: Invocation,
    ) -> Self {
        Self {
            scheduler,
            region,
            world,
            id,
            invocation,
        }
    }

    /// The running task.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Why the body was called.
    #[inline]
    #[must_use]
    pub const fn invocation(&self) -> Invocation {
        self.invocation
    }

    /// Where to pick up: 0 on the first call and after a loop.
    #[must_use]
    pub fn resume_point(&self) -> u32 {
        self.scheduler.resume_point_of(self.id).unwrap_or(0)
    }

    /// Delay the task was waiting on before this call.
    #[must_use]
    pub fn delay(&self) -> Fixed16 {
        self.scheduler.delay_of(self.id).unwrap_or(Fixed16::ZERO)
    }

    /// A step that leaves delay and resume point exactly as they are.
    ///
    /// Useful for direct invocations that handle an argument without
    /// disturbing the task's own sequence. Like any continuing step it puts
    /// an inactive task on the active list.
    #[must_use]
    pub fn unchanged(&self) -> TaskStep {
        TaskStep::yield_for(self.delay(), self.resume_point())
    }

    /// Whole ticks elapsed on the scheduler clock.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    /// The caller's world.
    pub fn world(&mut self) -> &mut W {
        &mut *self.world
    }

    /// The region task locals are allocated from.
    pub fn region(&mut self) -> &mut Region {
        &mut *self.region
    }

    /// World and region together.
    pub fn world_and_region(&mut self) -> (&mut W, &mut Region) {
        (&mut *self.world, &mut *self.region)
    }

    /// Returns the task's locals, allocating them zeroed on first use.
    ///
    /// The block is sized once: later calls must ask for a type of the same
    /// size. It survives every yield and is released when the task ends or
    /// is freed.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::LocalsLayout`] for zero-sized or over-aligned `L`
    /// * [`SchedulerError::LocalsSizeMismatch`] if `L` differs in size from
    ///   the block allocated first
    /// * [`SchedulerError::Memory`] if the region cannot serve the block
    pub fn locals<L: Pod>(&mut self) -> SchedulerResult<&mut L> {
        let handle = self.locals_handle::<L>()?;
        let bytes = self.region.bytes_mut(handle)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(|_| SchedulerError::LocalsLayout {
            size: mem::size_of::<L>(),
            align: mem::align_of::<L>(),
        })
    }

    /// Returns world and locals together.
    ///
    /// # Errors
    ///
    /// Same as [`Self::locals`].
    pub fn world_and_locals<L: Pod>(&mut self) -> SchedulerResult<(&mut W, &mut L)> {
        let handle = self.locals_handle::<L>()?;
        let bytes = self.region.bytes_mut(handle)?;
        let locals = bytemuck::try_from_bytes_mut(bytes).map_err(|_| SchedulerError::LocalsLayout {
            size: mem::size_of::<L>(),
            align: mem::align_of::<L>(),
        })?;
        Ok((&mut *self.world, locals))
    }

    /// Creates an inactive task.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::create_task`].
    pub fn create_task(&mut self, name: &'static str, func: TaskFn<W>) -> SchedulerResult<TaskId> {
        self.scheduler.create_task(name, func)
    }

    /// Creates a task and appends it to the active list. It first runs on
    /// the next tick.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::push_task`].
    pub fn push_task(&mut self, name: &'static str, func: TaskFn<W>) -> SchedulerResult<TaskId> {
        self.scheduler.push_task(name, func)
    }

    /// Adds an existing task to the active list.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::make_active`].
    pub fn make_active(&mut self, id: TaskId) -> SchedulerResult<()> {
        self.scheduler.make_active(id)
    }

    /// Removes the most recently activated entry without freeing it.
    pub fn pop_task(&mut self) -> Option<TaskId> {
        self.scheduler.pop_task()
    }

    /// Re-arms a task with a new delay.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::wake_task`].
    pub fn wake_task(&mut self, id: TaskId, delay: Fixed16) -> SchedulerResult<()> {
        self.scheduler.wake_task(id, delay)
    }

    /// Frees another task. A task ends itself by returning [`TaskStep::End`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskRunning`] for the current task (or any task
    /// further up the call chain).
    pub fn free_task(&mut self, id: TaskId) -> SchedulerResult<()> {
        self.scheduler.free_task(&mut *self.region, id)
    }

    /// Calls another task's body directly with `arg`.
    ///
    /// # Errors
    ///
    /// See [`TaskScheduler::run_task`].
    pub fn run_task(&mut self, id: TaskId, arg: i32) -> SchedulerResult<TaskStep> {
        self.scheduler.run_task(&mut *self.region, &mut *self.world, id, arg)
    }

    fn locals_handle<L: Pod>(&mut self) -> SchedulerResult<RegionHandle> {
        let size = mem::size_of::<L>();
        let align = mem::align_of::<L>();
        if size == 0 || align > ALLOC_ALIGN {
            return Err(SchedulerError::LocalsLayout { size, align });
        }

        let id = self.id;
        let record = self.scheduler.record_mut(id)?;
        match record.locals {
            Some(handle) if handle.len() == size => Ok(handle),
            Some(handle) => Err(SchedulerError::LocalsSizeMismatch {
                task: id,
                allocated: handle.len(),
                requested: size,
            }),
            None => {
                let handle = self.region.alloc(size)?;
                record.locals = Some(handle);
                Ok(handle)
            }
        }
    }
}
