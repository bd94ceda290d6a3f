//! Integration test: task timing across ticks.

use bytemuck::{Pod, Zeroable};
use jedi_core::Region;
use jedi_tasks::{Fixed16, Invocation, TaskContext, TaskScheduler, TaskStep};

#[derive(Default)]
struct Sector {
    light: u32,
    /// `(tick, light)` each time the light changed.
    changes: Vec<(u64, u32)>,
}

impl Sector {
    fn set_light(&mut self, now: u64, light: u32) {
        self.light = light;
        self.changes.push((now, light));
    }
}

fn dim_then_restore(ctx: &mut TaskContext<'_, Sector>) -> TaskStep {
    let now = ctx.now();
    match ctx.resume_point() {
        0 => {
            ctx.world().set_light(now, 8);
            TaskStep::yield_for(Fixed16::from_ticks(10), 1)
        }
        1 => {
            ctx.world().set_light(now, 16);
            TaskStep::yield_for(Fixed16::from_ticks(5), 2)
        }
        _ => {
            ctx.world().set_light(now, 31);
            TaskStep::end()
        }
    }
}

#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct FlickerLocals {
    cycles: u32,
    lit: u32,
}

fn flicker(ctx: &mut TaskContext<'_, Sector>) -> TaskStep {
    let now = ctx.now();
    let Ok((sector, locals)) = ctx.world_and_locals::<FlickerLocals>() else {
        return TaskStep::end();
    };
    locals.lit ^= 1;
    sector.set_light(now, if locals.lit == 1 { 31 } else { 0 });
    if locals.lit == 0 {
        locals.cycles += 1;
    }
    if locals.cycles == 3 {
        TaskStep::end()
    } else {
        TaskStep::loop_after(Fixed16::from_ticks(2))
    }
}

fn door(ctx: &mut TaskContext<'_, Sector>) -> TaskStep {
    let now = ctx.now();
    match (ctx.invocation(), ctx.resume_point()) {
        // Trigger message: open on the next tick.
        (Invocation::Direct(_), 0) => TaskStep::yield_for(Fixed16::ZERO, 1),
        (Invocation::Direct(_), _) => ctx.unchanged(),
        (Invocation::Scheduled, 0) => TaskStep::yield_for(Fixed16::HOLD, 0),
        (Invocation::Scheduled, _) => {
            ctx.world().set_light(now, 20);
            TaskStep::end()
        }
    }
}

#[test]
fn test_yield_ten_then_five() {
    let mut region = Region::new("level", 4096).unwrap();
    let mut sector = Sector::default();
    let mut scheduler: TaskScheduler<Sector> = TaskScheduler::default();
    let id = scheduler.push_task("dim", dim_then_restore).unwrap();

    // Tick 0 enters the task.
    scheduler.run_tasks(&mut region, &mut sector, Fixed16::ZERO).unwrap();
    assert_eq!(sector.changes, vec![(0, 8)]);

    for tick in 1..=16u64 {
        let stats = scheduler.run_tasks(&mut region, &mut sector, Fixed16::ONE).unwrap();
        let expected = usize::from(tick == 10 || tick == 15);
        assert_eq!(stats.ran, expected, "tick {tick}");
    }

    assert_eq!(sector.changes, vec![(0, 8), (10, 16), (15, 31)]);
    assert!(!scheduler.is_active(id));
    assert_eq!(scheduler.task_count(), 0);
}

#[test]
fn test_fractional_frames_accumulate() {
    let mut region = Region::new("level", 4096).unwrap();
    let mut sector = Sector::default();
    let mut scheduler: TaskScheduler<Sector> = TaskScheduler::default();
    scheduler.push_task("dim", dim_then_restore).unwrap();

    scheduler.run_tasks(&mut region, &mut sector, Fixed16::ZERO).unwrap();
    let quarter = Fixed16::from_f64(0.25);
    let mut frames = 0;
    while scheduler.task_count() > 0 {
        scheduler.run_tasks(&mut region, &mut sector, quarter).unwrap();
        frames += 1;
    }

    // 15 ticks of waiting at four frames per tick.
    assert_eq!(frames, 60);
    assert_eq!(sector.changes, vec![(0, 8), (10, 16), (15, 31)]);
}

#[test]
fn test_locals_drive_a_looping_task() {
    let mut region = Region::new("level", 4096).unwrap();
    let mut sector = Sector::default();
    let mut scheduler: TaskScheduler<Sector> = TaskScheduler::default();
    scheduler.push_task("flicker", flicker).unwrap();

    for _ in 0..20 {
        scheduler.run_tasks(&mut region, &mut sector, Fixed16::ONE).unwrap();
    }

    let lights: Vec<u32> = sector.changes.iter().map(|&(_, light)| light).collect();
    assert_eq!(lights, vec![31, 0, 31, 0, 31, 0]);
    let ticks: Vec<u64> = sector.changes.iter().map(|&(tick, _)| tick).collect();
    assert_eq!(ticks, vec![1, 3, 5, 7, 9, 11]);
    assert_eq!(scheduler.task_count(), 0);
    assert_eq!(region.memory_used(), 0);
}

#[test]
fn test_message_wakes_held_task() {
    let mut region = Region::new("level", 4096).unwrap();
    let mut sector = Sector::default();
    let mut scheduler: TaskScheduler<Sector> = TaskScheduler::default();
    let id = scheduler.push_task("door", door).unwrap();

    for _ in 0..5 {
        scheduler.run_tasks(&mut region, &mut sector, Fixed16::ONE).unwrap();
    }
    assert!(sector.changes.is_empty());
    assert!(scheduler.delay_of(id).unwrap().is_hold());

    scheduler.run_task(&mut region, &mut sector, id, 1).unwrap();
    // A second message before the tick leaves the pending open alone.
    scheduler.run_task(&mut region, &mut sector, id, 2).unwrap();
    assert_eq!(scheduler.resume_point_of(id), Some(1));

    scheduler.run_tasks(&mut region, &mut sector, Fixed16::ONE).unwrap();
    assert_eq!(sector.changes, vec![(6, 20)]);
    assert_eq!(sector.light, 20);
    assert_eq!(scheduler.task_count(), 0);
}
