//! # Jedi
//!
//! The runtime core: memory regions, cooperative tasks and the frame
//! driver, configured from one TOML file.
//!
//! ## Level Lifecycle
//!
//! ```text
//! Runtime::new(config)      game, level, resources regions + scheduler
//!   └── per frame           Runtime::frame(world, elapsed)
//!         └── run_tasks     one scheduler tick, locals in the level region
//! Runtime::unload_level()   free all tasks, clear level + resources
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use jedi::{Runtime, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("jedi.toml")?;
//! let mut runtime: Runtime<Level> = Runtime::new(config)?;
//! runtime.push_task("lights", lights)?;
//! loop {
//!     runtime.frame(&mut level, frame_timer.elapsed())?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod error;
pub mod game_loop;
pub mod runtime;

pub use config::{LoopConfig, RegionConfig, RuntimeConfig};
pub use context::{MemoryContext, MemoryUsage, RegionUsage};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use game_loop::{FrameStats, FrameStatsAccumulator, GameLoop};
pub use runtime::Runtime;

pub use jedi_core::{ItemId, ListAllocator, Region, RegionHandle};
pub use jedi_tasks::{Fixed16, Invocation, TaskContext, TaskFn, TaskId, TaskStep};
