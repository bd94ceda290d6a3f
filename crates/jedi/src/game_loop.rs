//! # Game Loop
//!
//! Turns wall-clock frames into scheduler ticks:
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. CLAMP elapsed time to loop.max_frame_seconds                     │
//! │ 2. CONVERT seconds → 16.16 ticks (sub-step remainder carried over)  │
//! │ 3. RUN TASKS once: scheduler.run_tasks(level region, world, dt)    │
//! │ 4. RECORD frame stats, log slow frames                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use jedi_core::Region;
use jedi_tasks::{Fixed16, SchedulerResult, TaskScheduler};
use tracing::{info, warn};

use crate::config::LoopConfig;

/// Raw 16.16 steps per tick.
const RAW_PER_TICK: f64 = 65_536.0;

/// Per-frame statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number.
    pub frame: u64,
    /// Ticks fed to the scheduler.
    pub dt: Fixed16,
    /// Time spent in `run_tasks`, in microseconds.
    pub tick_us: u64,
    /// Task bodies called.
    pub tasks_run: usize,
    /// Snapshotted tasks skipped.
    pub tasks_skipped: usize,
    /// Ready tasks deferred to the next frame.
    pub tasks_deferred: usize,
    /// Active tasks after the frame.
    pub active_tasks: usize,
}

/// Accumulator for frame statistics.
#[derive(Clone, Debug)]
pub struct FrameStatsAccumulator {
    /// Total frames recorded.
    pub frames_recorded: u64,
    /// Sum of scheduler tick times.
    pub tick_us_sum: u64,
    /// Min scheduler tick time.
    pub min_tick_us: u64,
    /// Max scheduler tick time.
    pub max_tick_us: u64,
    /// Sum of task bodies called.
    pub tasks_run_sum: u64,
    /// Sum of ready tasks deferred by the run-list limit.
    pub tasks_deferred_sum: u64,
    /// Frames whose tick exceeded the slow threshold.
    pub frames_over_budget: u64,
    budget_us: u64,
}

impl FrameStatsAccumulator {
    /// Creates an accumulator that counts ticks above `budget_us` as slow.
    #[must_use]
    pub fn new(budget_us: u64) -> Self {
        Self {
            frames_recorded: 0,
            tick_us_sum: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            tasks_run_sum: 0,
            tasks_deferred_sum: 0,
            frames_over_budget: 0,
            budget_us,
        }
    }

    /// Records a frame's statistics.
    pub fn record(&mut self, stats: FrameStats) {
        self.frames_recorded += 1;
        self.tick_us_sum += stats.tick_us;
        self.min_tick_us = self.min_tick_us.min(stats.tick_us);
        self.max_tick_us = self.max_tick_us.max(stats.tick_us);
        self.tasks_run_sum += stats.tasks_run as u64;
        self.tasks_deferred_sum += stats.tasks_deferred as u64;

        if stats.tick_us > self.budget_us {
            self.frames_over_budget += 1;
        }
    }

    /// Returns average scheduler tick time in milliseconds.
    #[must_use]
    pub fn avg_tick_ms(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        (self.tick_us_sum as f64 / self.frames_recorded as f64) / 1000.0
    }

    /// Returns the average number of task bodies called per frame.
    #[must_use]
    pub fn avg_tasks_per_frame(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.tasks_run_sum as f64 / self.frames_recorded as f64
    }

    /// Returns the fraction of frames over budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.frames_recorded == 0 {
            return 0.0;
        }
        self.frames_over_budget as f64 / self.frames_recorded as f64
    }

    /// Logs a summary of the statistics.
    pub fn log_summary(&self) {
        info!(
            frames = self.frames_recorded,
            avg_tick_ms = self.avg_tick_ms(),
            max_tick_us = self.max_tick_us,
            avg_tasks = self.avg_tasks_per_frame(),
            deferred = self.tasks_deferred_sum,
            over_budget = self.frames_over_budget,
            "frame statistics"
        );
    }
}

impl Default for FrameStatsAccumulator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SLOW_TICK_US)
    }
}

/// The frame driver.
#[derive(Debug)]
pub struct GameLoop {
    config: LoopConfig,
    frame_count: u64,
    /// Fraction of a raw 16.16 step left over from earlier frames.
    carry: f64,
    stats_accumulator: FrameStatsAccumulator,
}

impl GameLoop {
    /// Creates a frame driver.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        let stats_accumulator = FrameStatsAccumulator::new(config.slow_tick_us);
        Self {
            config,
            frame_count: 0,
            carry: 0.0,
            stats_accumulator,
        }
    }

    /// Converts a frame's wall-clock length into scheduler ticks.
    ///
    /// Frames are clamped to `max_frame_seconds`; the part of a frame too
    /// small for one 16.16 step is carried into the next frame so no time
    /// is lost.
    pub fn ticks_for(&mut self, elapsed: Duration) -> Fixed16 {
        let seconds = elapsed.as_secs_f64().min(self.config.max_frame_seconds);
        let raw = seconds * f64::from(self.config.ticks_per_second) * RAW_PER_TICK + self.carry;
        let whole = raw.floor();
        self.carry = raw - whole;
        Fixed16::from_raw(whole.clamp(0.0, f64::from(i32::MAX)) as i32)
    }

    /// Runs one frame: exactly one scheduler tick.
    ///
    /// # Arguments
    ///
    /// * `scheduler` - The task scheduler
    /// * `region` - Region holding task locals
    /// * `world` - The caller's world, handed to every task
    /// * `elapsed` - Wall-clock length of the frame
    ///
    /// # Errors
    ///
    /// Propagates scheduler errors from `run_tasks`.
    pub fn step<W>(
        &mut self,
        scheduler: &mut TaskScheduler<W>,
        region: &mut Region,
        world: &mut W,
        elapsed: Duration,
    ) -> SchedulerResult<FrameStats> {
        let dt = self.ticks_for(elapsed);
        let start = Instant::now();
        let tick = scheduler.run_tasks(region, world, dt)?;
        let tick_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        let stats = FrameStats {
            frame: self.frame_count,
            dt,
            tick_us,
            tasks_run: tick.ran,
            tasks_skipped: tick.skipped,
            tasks_deferred: tick.deferred,
            active_tasks: tick.active,
        };
        self.end_frame(stats);
        Ok(stats)
    }

    /// Returns the current frame count.
    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Returns the accumulated statistics.
    #[must_use]
    pub const fn stats(&self) -> &FrameStatsAccumulator {
        &self.stats_accumulator
    }

    fn end_frame(&mut self, stats: FrameStats) {
        self.frame_count += 1;
        self.stats_accumulator.record(stats);

        // Log slow frames
        if self.config.enable_timing_logs && stats.tick_us > self.config.slow_tick_us {
            warn!(
                frame = stats.frame,
                tick_us = stats.tick_us,
                budget_us = self.config.slow_tick_us,
                tasks = stats.tasks_run,
                "scheduler tick exceeded budget"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jedi_tasks::{TaskContext, TaskStep};

    fn count(ctx: &mut TaskContext<'_, u32>) -> TaskStep {
        *ctx.world() += 1;
        TaskStep::loop_after(Fixed16::ONE)
    }

    #[test]
    fn test_game_loop_creation() {
        let game_loop = GameLoop::new(LoopConfig::default());
        assert_eq!(game_loop.frame_count(), 0);
        assert_eq!(game_loop.stats().frames_recorded, 0);
    }

    #[test]
    fn test_one_second_is_145_ticks() {
        let mut game_loop = GameLoop::new(LoopConfig {
            max_frame_seconds: 2.0,
            ..LoopConfig::default()
        });
        assert_eq!(game_loop.ticks_for(Duration::from_secs(1)), Fixed16::from_ticks(145));
    }

    #[test]
    fn test_long_frames_are_clamped() {
        let mut game_loop = GameLoop::new(LoopConfig::default());
        let dt = game_loop.ticks_for(Duration::from_secs(5));
        assert_eq!(dt.whole_ticks(), 14);
        assert!(dt < Fixed16::from_ticks(15));
    }

    #[test]
    fn test_remainder_carries_between_frames() {
        let mut game_loop = GameLoop::new(LoopConfig::default());
        let mut total = 0i64;
        for _ in 0..145 {
            total += i64::from(game_loop.ticks_for(Duration::from_micros(6_897)).raw());
        }
        // 145 frames of ~1/145 s: very close to 145 ticks, never drifting by a whole step.
        let expected = 145.0 * 0.006_897 * 145.0 * RAW_PER_TICK;
        assert!((total as f64 - expected).abs() < 1.0);
    }

    #[test]
    fn test_step_runs_scheduler_once() {
        let mut region = Region::new("level", 4096).unwrap();
        let mut counter = 0u32;
        let mut scheduler: TaskScheduler<u32> = TaskScheduler::default();
        scheduler.push_task("count", count).unwrap();
        let mut game_loop = GameLoop::new(LoopConfig::default());

        let stats = game_loop
            .step(&mut scheduler, &mut region, &mut counter, Duration::from_millis(7))
            .unwrap();
        assert_eq!(stats.frame, 0);
        assert_eq!(stats.tasks_run, 1);
        assert_eq!(counter, 1);
        assert_eq!(game_loop.frame_count(), 1);
        assert_eq!(game_loop.stats().tasks_run_sum, 1);
        assert_eq!(scheduler.tick_count(), 1);
    }

    #[test]
    fn test_accumulator_budget() {
        let mut stats = FrameStatsAccumulator::new(100);
        stats.record(FrameStats {
            tick_us: 50,
            tasks_run: 4,
            ..FrameStats::default()
        });
        stats.record(FrameStats {
            tick_us: 150,
            tasks_run: 2,
            ..FrameStats::default()
        });

        assert_eq!(stats.frames_over_budget, 1);
        assert_eq!(stats.min_tick_us, 50);
        assert_eq!(stats.max_tick_us, 150);
        assert!((stats.avg_tasks_per_frame() - 3.0).abs() < f64::EPSILON);
        assert!((stats.over_budget_ratio() - 0.5).abs() < f64::EPSILON);
        assert!((stats.avg_tick_ms() - 0.1).abs() < 1e-9);
        stats.log_summary();
    }
}
