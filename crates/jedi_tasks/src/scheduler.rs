//! # Task Scheduler
//!
//! Single-threaded, cooperative and tick-driven. The host calls
//! [`TaskScheduler::run_tasks`] once per frame with the frame's length in
//! ticks:
//!
//! ```text
//! run_tasks(dt)
//! ├── 1. count down every active, non-held delay by dt (stop at 0)
//! │      └─ tasks at 0 are snapshotted into the ready list, in order
//! ├── 2. run the snapshot front to back, one task at a time
//! │      └─ skip tasks freed, deactivated or re-armed earlier this pass
//! └── 3. apply each returned step
//!        ├─ Loop(d)      resume point 0, delay d, (re)activate
//!        ├─ Yield(d, s)  resume point s, delay d, (re)activate
//!        └─ End          deactivate, free locals, free record
//! ```
//!
//! Tasks created during a pass are never part of that pass's snapshot.

use std::fmt;

use jedi_core::{PoolAllocator, Region};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::fixed::Fixed16;
use crate::task::{Invocation, TaskContext, TaskFn, TaskId, TaskRecord, TaskStep};

/// Default maximum number of live tasks.
pub const DEFAULT_MAX_TASKS: usize = 1024;

/// Default maximum number of active-list entries, tombstones included.
pub const DEFAULT_MAX_ACTIVE: usize = 1024;

/// Default maximum number of tasks run in one tick.
pub const DEFAULT_MAX_READY: usize = 256;

/// Capacity limits for a [`TaskScheduler`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of live tasks.
    pub max_tasks: usize,
    /// Maximum number of active-list entries.
    pub max_active: usize,
    /// Maximum number of tasks run per tick; the rest wait a tick.
    pub max_ready: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            max_active: DEFAULT_MAX_ACTIVE,
            max_ready: DEFAULT_MAX_READY,
        }
    }
}

/// Outcome of one [`TaskScheduler::run_tasks`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Task bodies called.
    pub ran: usize,
    /// Snapshotted tasks skipped because an earlier task changed them.
    pub skipped: usize,
    /// Ready tasks pushed to the next tick by the run-list limit.
    pub deferred: usize,
    /// Active tasks after the tick.
    pub active: usize,
}

/// The cooperative task scheduler.
///
/// `W` is the caller's world, handed to every task body through its
/// [`TaskContext`]. Task locals live in the [`Region`] passed to each call
/// that can allocate or free them; use the same region throughout.
pub struct TaskScheduler<W> {
    config: SchedulerConfig,
    tasks: PoolAllocator<TaskRecord<W>>,
    /// Active list; `None` entries are tombstones.
    active: Vec<Option<TaskId>>,
    active_count: usize,
    /// Reused snapshot buffer for `run_tasks`.
    ready: Vec<TaskId>,
    /// Call chain of running tasks, innermost last.
    running: Vec<TaskId>,
    in_tick: bool,
    /// Accumulated raw 16.16 ticks.
    elapsed: i64,
    tick_count: u64,
}

impl<W> TaskScheduler<W> {
    /// Creates a scheduler with all storage reserved up front.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        debug!(
            max_tasks = config.max_tasks,
            max_active = config.max_active,
            max_ready = config.max_ready,
            "task scheduler created"
        );
        Self {
            tasks: PoolAllocator::new(config.max_tasks),
            active: Vec::with_capacity(config.max_active),
            active_count: 0,
            ready: Vec::with_capacity(config.max_ready),
            running: Vec::new(),
            in_tick: false,
            elapsed: 0,
            tick_count: 0,
            config,
        }
    }

    /// Returns the capacity limits.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of live tasks.
    #[inline]
    #[must_use]
    pub const fn task_count(&self) -> usize {
        self.tasks.allocated_count()
    }

    /// Number of active tasks.
    #[inline]
    #[must_use]
    pub const fn active_count(&self) -> usize {
        self.active_count
    }

    /// Whole ticks accumulated over every `run_tasks` call.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> u64 {
        (self.elapsed >> crate::fixed::FRACTION_BITS) as u64
    }

    /// Number of `run_tasks` calls so far.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Whether a task is currently executing.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Whether `id` is on the active list.
    #[must_use]
    pub fn is_active(&self, id: TaskId) -> bool {
        self.tasks
            .get(id.0)
            .is_some_and(|record| record.active_slot.is_some())
    }

    /// Remaining delay of a task.
    #[must_use]
    pub fn delay_of(&self, id: TaskId) -> Option<Fixed16> {
        self.tasks.get(id.0).map(|record| record.delay)
    }

    /// Resume point the task will be called with next.
    #[must_use]
    pub fn resume_point_of(&self, id: TaskId) -> Option<u32> {
        self.tasks.get(id.0).map(|record| record.resume_point)
    }

    /// Name the task was created with.
    #[must_use]
    pub fn task_name(&self, id: TaskId) -> Option<&'static str> {
        self.tasks.get(id.0).map(|record| record.name)
    }

    /// Creates an inactive task that is ready (delay 0) once activated.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskPoolFull`] when `max_tasks` tasks are live.
    pub fn create_task(&mut self, name: &'static str, func: TaskFn<W>) -> SchedulerResult<TaskId> {
        let Some(handle) = self.tasks.allocate(TaskRecord::new(name, func)) else {
            error!(task = name, capacity = self.tasks.capacity(), "task pool full");
            return Err(SchedulerError::TaskPoolFull {
                capacity: self.tasks.capacity(),
            });
        };
        let id = TaskId(handle);
        trace!(%id, task = name, "task created");
        Ok(id)
    }

    /// Creates a task and appends it to the active list.
    ///
    /// # Errors
    ///
    /// Fails if either the task pool or the active list is full; nothing is
    /// left behind in that case.
    pub fn push_task(&mut self, name: &'static str, func: TaskFn<W>) -> SchedulerResult<TaskId> {
        let id = self.create_task(name, func)?;
        if let Err(err) = self.make_active(id) {
            self.tasks.free(id.0);
            return Err(err);
        }
        Ok(id)
    }

    /// Appends a task to the active list. Already-active tasks stay put.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::UnknownTask`] for freed tasks
    /// * [`SchedulerError::ActiveListFull`] when no entry is left even after
    ///   dropping tombstones
    pub fn make_active(&mut self, id: TaskId) -> SchedulerResult<()> {
        let record = self.tasks.get(id.0).ok_or(SchedulerError::UnknownTask(id))?;
        if record.active_slot.is_some() {
            return Ok(());
        }

        if self.active.len() >= self.config.max_active {
            self.compact_active();
        }
        if self.active.len() >= self.config.max_active {
            error!(%id, capacity = self.config.max_active, "active task list full");
            return Err(SchedulerError::ActiveListFull {
                capacity: self.config.max_active,
            });
        }

        let slot = self.active.len();
        self.active.push(Some(id));
        self.active_count += 1;
        if let Some(record) = self.tasks.get_mut(id.0) {
            record.active_slot = Some(slot);
        }
        Ok(())
    }

    /// Removes the most recently activated entry without freeing the task.
    pub fn pop_task(&mut self) -> Option<TaskId> {
        self.trim_active();
        let id = self.active.pop().flatten()?;
        self.active_count -= 1;
        if let Some(record) = self.tasks.get_mut(id.0) {
            record.active_slot = None;
        }
        self.trim_active();
        Some(id)
    }

    /// Re-arms a task: it becomes ready after `delay`.
    ///
    /// This is how a held task is resumed. The task must be active to run.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::UnknownTask`] for freed tasks
    /// * [`SchedulerError::InvalidDelay`] for a hold value
    pub fn wake_task(&mut self, id: TaskId, delay: Fixed16) -> SchedulerResult<()> {
        if delay.is_hold() {
            return Err(SchedulerError::InvalidDelay(delay));
        }
        let record = self.tasks.get_mut(id.0).ok_or(SchedulerError::UnknownTask(id))?;
        record.delay = delay;
        Ok(())
    }

    /// Frees a task, its active entry and its locals.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::TaskRunning`] if the task is executing; a task
    ///   finishes itself by returning [`TaskStep::End`]
    /// * [`SchedulerError::UnknownTask`] for freed tasks
    pub fn free_task(&mut self, region: &mut Region, id: TaskId) -> SchedulerResult<()> {
        if self.running.contains(&id) {
            error!(%id, "cannot free a running task");
            return Err(SchedulerError::TaskRunning(id));
        }
        if !self.tasks.contains(id.0) {
            return Err(SchedulerError::UnknownTask(id));
        }
        self.release(region, id);
        Ok(())
    }

    /// Frees every task. Used when a level is unloaded.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::TaskRunning`] if called from inside a task.
    pub fn free_all_tasks(&mut self, region: &mut Region) -> SchedulerResult<()> {
        if let Some(&id) = self.running.last() {
            error!(%id, "free_all_tasks called from a running task");
            return Err(SchedulerError::TaskRunning(id));
        }

        let ids: Vec<TaskId> = self.tasks.iter().map(|(handle, _)| TaskId(handle)).collect();
        for &id in &ids {
            self.release(region, id);
        }
        self.active.clear();
        self.active_count = 0;
        debug!(freed = ids.len(), "all tasks freed");
        Ok(())
    }

    /// Calls a task's body immediately with `arg`, outside the tick order.
    ///
    /// The returned step is applied like a scheduled one, except that the
    /// task's active state is left alone. May be nested (a task running
    /// another), but a task already on the call chain cannot be re-entered.
    ///
    /// # Errors
    ///
    /// * [`SchedulerError::UnknownTask`] for freed tasks
    /// * [`SchedulerError::TaskRunning`] if the task is already executing
    pub fn run_task(&mut self, region: &mut Region, world: &mut W, id: TaskId, arg: i32) -> SchedulerResult<TaskStep> {
        self.invoke(region, world, id, Invocation::Direct(arg))
    }

    /// Advances the scheduler clock by `dt` and runs every task that became
    /// ready.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidDelay`] for a negative `dt`.
    pub fn run_tasks(&mut self, region: &mut Region, world: &mut W, dt: Fixed16) -> SchedulerResult<TickStats> {
        debug_assert!(!self.in_tick, "run_tasks re-entered from a running task");
        if dt.is_hold() {
            return Err(SchedulerError::InvalidDelay(dt));
        }

        self.tick_count += 1;
        self.elapsed += i64::from(dt.raw());

        let mut ready = std::mem::take(&mut self.ready);
        ready.clear();
        let mut stats = TickStats::default();
        for id in self.active.iter().flatten() {
            let Some(record) = self.tasks.get_mut(id.0) else {
                continue;
            };
            if record.delay.is_hold() {
                continue;
            }
            record.delay = record.delay.sub_clamped(dt);
            if record.delay.is_zero() {
                if ready.len() < self.config.max_ready {
                    ready.push(*id);
                } else {
                    stats.deferred += 1;
                }
            }
        }
        if stats.deferred > 0 {
            error!(
                deferred = stats.deferred,
                max_ready = self.config.max_ready,
                "ready list full, tasks deferred to next tick"
            );
        }

        self.in_tick = true;
        let result = self.run_ready(region, world, &ready, &mut stats);
        self.in_tick = false;
        self.ready = ready;
        result?;

        stats.active = self.active_count;
        Ok(stats)
    }

    pub(crate) fn record_mut(&mut self, id: TaskId) -> SchedulerResult<&mut TaskRecord<W>> {
        self.tasks.get_mut(id.0).ok_or(SchedulerError::UnknownTask(id))
    }

    fn run_ready(&mut self, region: &mut Region, world: &mut W, ready: &[TaskId], stats: &mut TickStats) -> SchedulerResult<()> {
        for &id in ready {
            let still_ready = self
                .tasks
                .get(id.0)
                .is_some_and(|record| record.active_slot.is_some() && record.delay.is_zero());
            if !still_ready {
                stats.skipped += 1;
                continue;
            }
            self.invoke(region, world, id, Invocation::Scheduled)?;
            stats.ran += 1;
        }
        Ok(())
    }

    fn invoke(&mut self, region: &mut Region, world: &mut W, id: TaskId, invocation: Invocation) -> SchedulerResult<TaskStep> {
        let func = self.tasks.get(id.0).ok_or(SchedulerError::UnknownTask(id))?.func;
        if self.running.contains(&id) {
            warn!(%id, "task re-entered while running");
            return Err(SchedulerError::TaskRunning(id));
        }

        self.running.push(id);
        let step = func(&mut TaskContext::new(self, region, world, id, invocation));
        self.running.pop();

        self.apply_step(region, id, step);
        Ok(step)
    }

    fn apply_step(&mut self, region: &mut Region, id: TaskId, step: TaskStep) {
        let Some(record) = self.tasks.get_mut(id.0) else {
            return;
        };
        let (delay, resume) = match step {
            TaskStep::Loop { delay } => (delay, 0),
            TaskStep::Yield { delay, resume } => (delay, resume),
            TaskStep::End => {
                self.release(region, id);
                return;
            }
        };
        record.delay = delay;
        record.resume_point = resume;

        // A continuing task always ends up on the active list.
        if record.active_slot.is_none() {
            if let Err(err) = self.make_active(id) {
                error!(%id, %err, "continuing task could not be activated");
            }
        }
    }

    /// Deactivates and frees a task; stale locals (cleared region) are
    /// skipped.
    fn release(&mut self, region: &mut Region, id: TaskId) {
        self.deactivate(id);
        let Some(record) = self.tasks.free(id.0) else {
            return;
        };
        if let Some(locals) = record.locals {
            if let Err(err) = region.free(locals) {
                trace!(%id, %err, "task locals already released");
            }
        }
        trace!(%id, task = record.name, "task freed");
    }

    fn deactivate(&mut self, id: TaskId) {
        let Some(slot) = self.tasks.get_mut(id.0).and_then(|record| record.active_slot.take()) else {
            return;
        };
        if let Some(entry) = self.active.get_mut(slot) {
            *entry = None;
        }
        self.active_count -= 1;
        self.trim_active();
    }

    /// Drops tombstones from the end of the active list.
    fn trim_active(&mut self) {
        while matches!(self.active.last(), Some(None)) {
            self.active.pop();
        }
    }

    /// Drops every tombstone, renumbering the surviving entries.
    fn compact_active(&mut self) {
        let mut write = 0;
        for read in 0..self.active.len() {
            let Some(id) = self.active[read] else {
                continue;
            };
            self.active[write] = Some(id);
            if let Some(record) = self.tasks.get_mut(id.0) {
                record.active_slot = Some(write);
            }
            write += 1;
        }
        self.active.truncate(write);
    }
}

impl<W> Default for TaskScheduler<W> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<W> fmt::Debug for TaskScheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("tasks", &self.task_count())
            .field("active", &self.active_count)
            .field("active_entries", &self.active.len())
            .field("now", &self.now())
            .field("tick_count", &self.tick_count)
            .finish_non_exhaustive()
    }
}
