//! # Runtime Configuration
//!
//! All tunables live in one TOML file, loaded once at startup. Every
//! section and field is optional; missing values take the defaults below.
//!
//! ```toml
//! [game]
//! block_size = 65536
//! max_bytes = 8388608
//!
//! [level]
//! block_size = 65536
//!
//! [scheduler]
//! max_tasks = 1024
//! max_ready = 256
//!
//! [loop]
//! ticks_per_second = 145
//! enable_timing_logs = true
//! ```

use std::path::Path;

use jedi_core::memory::DEFAULT_MAX_BYTES;
use jedi_tasks::SchedulerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default region block size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Scheduler ticks per second of game time.
pub const DEFAULT_TICKS_PER_SECOND: u32 = 145;

/// Longest frame fed to the scheduler, in seconds. Longer frames (a
/// debugger pause, a level load) are clamped.
pub const DEFAULT_MAX_FRAME_SECONDS: f64 = 0.1;

/// Scheduler tick time above which a frame counts as slow (33 ms).
pub const DEFAULT_SLOW_TICK_US: u64 = 33_000;

/// Size limits of one region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Size of each block; also the largest single allocation.
    pub block_size: usize,
    /// Hard ceiling for the whole region.
    pub max_bytes: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl RegionConfig {
    fn validate(&self, name: &str) -> ConfigResult<()> {
        if self.block_size == 0 || self.block_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "{name}.block_size must be in 1..={}, got {}",
                u32::MAX,
                self.block_size
            )));
        }
        if self.max_bytes < self.block_size {
            return Err(ConfigError::Invalid(format!(
                "{name}.max_bytes ({}) is smaller than {name}.block_size ({})",
                self.max_bytes, self.block_size
            )));
        }
        Ok(())
    }
}

/// Frame driver settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Scheduler ticks per second of game time.
    pub ticks_per_second: u32,
    /// Longest frame fed to the scheduler, in seconds.
    pub max_frame_seconds: f64,
    /// Scheduler tick time above which a frame is logged as slow.
    pub slow_tick_us: u64,
    /// Log slow frames.
    pub enable_timing_logs: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            max_frame_seconds: DEFAULT_MAX_FRAME_SECONDS,
            slow_tick_us: DEFAULT_SLOW_TICK_US,
            enable_timing_logs: false,
        }
    }
}

/// Top-level runtime configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Process-wide region.
    pub game: RegionConfig,
    /// Region cleared on level unload; also holds task locals.
    pub level: RegionConfig,
    /// Level resources, cleared alongside the level region.
    pub resources: RegionConfig,
    /// Task scheduler limits.
    pub scheduler: SchedulerConfig,
    /// Frame driver settings.
    #[serde(rename = "loop")]
    pub game_loop: LoopConfig,
}

impl RuntimeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`Self::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Serialize`] if a value has no TOML form.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every value for range and consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.game.validate("game")?;
        self.level.validate("level")?;
        self.resources.validate("resources")?;

        let scheduler = &self.scheduler;
        if scheduler.max_tasks == 0 || scheduler.max_active == 0 || scheduler.max_ready == 0 {
            return Err(ConfigError::Invalid(
                "scheduler limits must all be greater than zero".to_owned(),
            ));
        }
        if scheduler.max_ready > scheduler.max_active {
            return Err(ConfigError::Invalid(format!(
                "scheduler.max_ready ({}) exceeds scheduler.max_active ({})",
                scheduler.max_ready, scheduler.max_active
            )));
        }

        let game_loop = &self.game_loop;
        if game_loop.ticks_per_second == 0 {
            return Err(ConfigError::Invalid("loop.ticks_per_second must be greater than zero".to_owned()));
        }
        if !(game_loop.max_frame_seconds.is_finite() && game_loop.max_frame_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "loop.max_frame_seconds must be positive, got {}",
                game_loop.max_frame_seconds
            )));
        }
        // A clamped frame must still fit in a 16.16 tick count.
        if game_loop.max_frame_seconds * f64::from(game_loop.ticks_per_second) >= f64::from(i16::MAX) {
            return Err(ConfigError::Invalid(
                "loop.max_frame_seconds * loop.ticks_per_second overflows the tick range".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.level.max_bytes, 8 * 1024 * 1024);
        assert_eq!(config.game_loop.ticks_per_second, 145);
        assert_eq!(config.scheduler.max_ready, 256);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [level]
            block_size = 4096

            [loop]
            enable_timing_logs = true
            "#,
        )
        .unwrap();

        assert_eq!(config.level.block_size, 4096);
        assert_eq!(config.level.max_bytes, DEFAULT_MAX_BYTES);
        assert!(config.game_loop.enable_timing_logs);
        assert_eq!(config.game, RegionConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = RuntimeConfig::default();
        config.resources.max_bytes = 2 * 1024 * 1024;
        config.scheduler.max_tasks = 64;

        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[loop]"));
        assert_eq!(RuntimeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            "[game]\nblock_size = 0",
            "[level]\nblock_size = 4096\nmax_bytes = 1024",
            "[scheduler]\nmax_tasks = 0",
            "[scheduler]\nmax_active = 8\nmax_ready = 16",
            "[loop]\nticks_per_second = 0",
            "[loop]\nmax_frame_seconds = -1.0",
            "[loop]\nmax_frame_seconds = 1000.0",
        ];
        for case in cases {
            assert!(
                matches!(RuntimeConfig::from_toml_str(case), Err(ConfigError::Invalid(_))),
                "{case}"
            );
        }
        assert!(matches!(
            RuntimeConfig::from_toml_str("[game\nblock_size = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = RuntimeConfig::from_file("/nonexistent/jedi/runtime.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
