//! # Runtime
//!
//! Ties the regions, the task scheduler and the frame driver together.
//! Task locals are allocated from the level region, so unloading a level
//! frees every task before the level region is cleared.

use std::time::Duration;

use jedi_tasks::{TaskFn, TaskId, TaskScheduler, TaskStep};
use tracing::info;

use crate::config::RuntimeConfig;
use crate::context::MemoryContext;
use crate::error::RuntimeResult;
use crate::game_loop::{FrameStats, GameLoop};

/// The runtime core for a world of type `W`.
pub struct Runtime<W> {
    config: RuntimeConfig,
    memory: MemoryContext,
    scheduler: TaskScheduler<W>,
    game_loop: GameLoop,
}

impl<W> Runtime<W> {
    /// Validates `config` and builds the regions, scheduler and frame driver.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid values, or a memory error if a
    /// region cannot be created.
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        config.validate()?;
        let memory = MemoryContext::new(&config)?;
        let scheduler = TaskScheduler::new(config.scheduler.clone());
        let game_loop = GameLoop::new(config.game_loop.clone());

        info!(
            max_tasks = config.scheduler.max_tasks,
            ticks_per_second = config.game_loop.ticks_per_second,
            "runtime initialized"
        );

        Ok(Self {
            config,
            memory,
            scheduler,
            game_loop,
        })
    }

    /// The configuration the runtime was built from.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The regions.
    #[must_use]
    pub const fn memory(&self) -> &MemoryContext {
        &self.memory
    }

    /// The regions, mutably.
    pub fn memory_mut(&mut self) -> &mut MemoryContext {
        &mut self.memory
    }

    /// The task scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &TaskScheduler<W> {
        &self.scheduler
    }

    /// The task scheduler, mutably.
    pub fn scheduler_mut(&mut self) -> &mut TaskScheduler<W> {
        &mut self.scheduler
    }

    /// The frame driver.
    #[must_use]
    pub const fn game_loop(&self) -> &GameLoop {
        &self.game_loop
    }

    /// Creates a task and makes it active.
    ///
    /// # Errors
    ///
    /// Returns a scheduler error if the task pool or active list is full.
    pub fn push_task(&mut self, name: &'static str, func: TaskFn<W>) -> RuntimeResult<TaskId> {
        Ok(self.scheduler.push_task(name, func)?)
    }

    /// Runs one frame against `world`.
    ///
    /// # Errors
    ///
    /// Propagates scheduler errors.
    pub fn frame(&mut self, world: &mut W, elapsed: Duration) -> RuntimeResult<FrameStats> {
        let region = self.memory.level_mut();
        Ok(self.game_loop.step(&mut self.scheduler, region, world, elapsed)?)
    }

    /// Calls one task directly with a message argument.
    ///
    /// # Errors
    ///
    /// Returns a scheduler error for an unknown or already running task.
    pub fn run_task(&mut self, world: &mut W, id: TaskId, arg: i32) -> RuntimeResult<TaskStep> {
        let region = self.memory.level_mut();
        Ok(self.scheduler.run_task(region, world, id, arg)?)
    }

    /// Frees every task, then clears the level and resources regions.
    ///
    /// Handles into either region are stale afterwards. The game region and
    /// the scheduler clock are kept.
    ///
    /// # Errors
    ///
    /// Returns a scheduler error if called while a task is running.
    pub fn unload_level(&mut self) -> RuntimeResult<()> {
        let freed = self.scheduler.task_count();
        self.scheduler.free_all_tasks(self.memory.level_mut())?;
        self.memory.clear_level();
        info!(tasks_freed = freed, "level unloaded");
        Ok(())
    }

    /// Logs region usage and frame statistics.
    pub fn log_summary(&self) {
        self.memory.log_usage();
        self.game_loop.stats().log_summary();
    }
}
