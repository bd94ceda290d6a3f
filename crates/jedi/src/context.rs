//! # Memory Context
//!
//! The three regions every subsystem allocates from, owned in one place and
//! passed explicitly:
//!
//! | region      | lifetime                          |
//! |-------------|-----------------------------------|
//! | `game`      | whole process                     |
//! | `level`     | one level; also holds task locals |
//! | `resources` | one level's loaded resources      |

use jedi_core::{MemoryResult, Region};
use tracing::{debug, info};

use crate::config::{RegionConfig, RuntimeConfig};

/// Snapshot of one region's size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionUsage {
    /// Bytes handed out.
    pub used: usize,
    /// Bytes reserved from the system.
    pub capacity: usize,
    /// Number of blocks.
    pub blocks: usize,
}

impl RegionUsage {
    fn of(region: &Region) -> Self {
        let (blocks, _) = region.block_info();
        Self {
            used: region.memory_used(),
            capacity: region.memory_capacity(),
            blocks,
        }
    }
}

/// Snapshot of all three regions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    /// The game region.
    pub game: RegionUsage,
    /// The level region.
    pub level: RegionUsage,
    /// The resources region.
    pub resources: RegionUsage,
}

/// Owner of the game, level and resources regions.
#[derive(Debug)]
pub struct MemoryContext {
    game: Region,
    level: Region,
    resources: Region,
}

impl MemoryContext {
    /// Creates the three regions.
    ///
    /// # Errors
    ///
    /// Returns the region error for an unusable size configuration.
    pub fn new(config: &RuntimeConfig) -> MemoryResult<Self> {
        Ok(Self {
            game: create("game", &config.game)?,
            level: create("level", &config.level)?,
            resources: create("resources", &config.resources)?,
        })
    }

    /// The process-wide region.
    #[inline]
    #[must_use]
    pub const fn game(&self) -> &Region {
        &self.game
    }

    /// The process-wide region, mutably.
    #[inline]
    pub fn game_mut(&mut self) -> &mut Region {
        &mut self.game
    }

    /// The level region.
    #[inline]
    #[must_use]
    pub const fn level(&self) -> &Region {
        &self.level
    }

    /// The level region, mutably.
    #[inline]
    pub fn level_mut(&mut self) -> &mut Region {
        &mut self.level
    }

    /// The resources region.
    #[inline]
    #[must_use]
    pub const fn resources(&self) -> &Region {
        &self.resources
    }

    /// The resources region, mutably.
    #[inline]
    pub fn resources_mut(&mut self) -> &mut Region {
        &mut self.resources
    }

    /// All three regions at once: `(game, level, resources)`.
    pub fn split_mut(&mut self) -> (&mut Region, &mut Region, &mut Region) {
        (&mut self.game, &mut self.level, &mut self.resources)
    }

    /// Drops every level and resources allocation. The game region is
    /// untouched.
    pub fn clear_level(&mut self) {
        self.level.clear();
        self.resources.clear();
        debug!("level and resources regions cleared");
    }

    /// Current size of every region.
    #[must_use]
    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            game: RegionUsage::of(&self.game),
            level: RegionUsage::of(&self.level),
            resources: RegionUsage::of(&self.resources),
        }
    }

    /// Logs the size of every region.
    pub fn log_usage(&self) {
        for region in [&self.game, &self.level, &self.resources] {
            let usage = RegionUsage::of(region);
            info!(
                region = region.name(),
                used = usage.used,
                capacity = usage.capacity,
                blocks = usage.blocks,
                "region usage"
            );
        }
    }
}

fn create(name: &str, config: &RegionConfig) -> MemoryResult<Region> {
    Region::with_limit(name, config.block_size, config.max_bytes)
}
