//! Canvas configuration (lamina.toml)
//!
//! Every field has a default, so an empty document is a valid configuration.

use crate::error::{Error, Result};
use crate::ids::ObjectKind;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables of the rendering pipeline
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CanvasConfig {
    /// Count bound of the screenshot cache, applied per layer set
    #[serde(default = "default_max_screenshots")]
    pub max_screenshots_per_layer_set: usize,
    /// Tick period of pan and browse animations
    #[serde(default = "default_animation_period")]
    pub animation_period_ms: u64,
    #[serde(default = "default_watcher_initial_delay")]
    pub watcher_initial_delay_ms: u64,
    #[serde(default = "default_watcher_period")]
    pub watcher_period_ms: u64,
    #[serde(default = "default_highlight_period")]
    pub highlight_period_ms: u64,
    /// Worker threads of the periodic task pool
    #[serde(default = "default_scheduler_threads")]
    pub scheduler_threads: usize,
    /// Screen pixels moved per browse tick
    #[serde(default = "default_browse_step")]
    pub browse_step_px: f64,
    /// Bound on content-loss retries before drawing directly
    #[serde(default = "default_max_present_attempts")]
    pub max_present_attempts: u32,
    /// Straight-alpha RGBA the presenter clears to
    #[serde(default = "default_background")]
    pub background: [u8; 4],
    /// Fill for view areas outside the layer set's world bounds
    #[serde(default = "default_out_of_bounds")]
    pub out_of_bounds: [u8; 4],
    /// Object classes painted for ghost layers in multi-layer mode
    #[serde(default = "default_multi_layer_kinds")]
    pub multi_layer_kinds: Vec<ObjectKind>,
    #[serde(default = "default_true")]
    pub depth_cue: bool,
}

fn default_max_screenshots() -> usize {
    128
}

fn default_animation_period() -> u64 {
    50
}

fn default_watcher_initial_delay() -> u64 {
    100
}

fn default_watcher_period() -> u64 {
    700
}

fn default_highlight_period() -> u64 {
    100
}

fn default_scheduler_threads() -> usize {
    2
}

fn default_browse_step() -> f64 {
    20.0
}

fn default_max_present_attempts() -> u32 {
    16
}

fn default_background() -> [u8; 4] {
    [0, 0, 0, 255]
}

fn default_out_of_bounds() -> [u8; 4] {
    [128, 128, 128, 255]
}

fn default_multi_layer_kinds() -> Vec<ObjectKind> {
    ObjectKind::ALL.to_vec()
}

fn default_true() -> bool {
    true
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_screenshots_per_layer_set: default_max_screenshots(),
            animation_period_ms: default_animation_period(),
            watcher_initial_delay_ms: default_watcher_initial_delay(),
            watcher_period_ms: default_watcher_period(),
            highlight_period_ms: default_highlight_period(),
            scheduler_threads: default_scheduler_threads(),
            browse_step_px: default_browse_step(),
            max_present_attempts: default_max_present_attempts(),
            background: default_background(),
            out_of_bounds: default_out_of_bounds(),
            multi_layer_kinds: default_multi_layer_kinds(),
            depth_cue: true,
        }
    }
}

impl CanvasConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CanvasConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, or from `lamina.toml` inside a directory
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_path = if path.is_dir() {
            path.join("lamina.toml")
        } else {
            path.to_path_buf()
        };

        let content = fs::read_to_string(&config_path).map_err(|source| Error::ConfigRead {
            path: config_path.display().to_string(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %config_path.display(), "loaded canvas config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_screenshots_per_layer_set == 0 {
            return Err(Error::ConfigValue(
                "max_screenshots_per_layer_set must be at least 1".into(),
            ));
        }
        if self.scheduler_threads == 0 {
            return Err(Error::ConfigValue("scheduler_threads must be at least 1".into()));
        }
        if self.animation_period_ms == 0 || self.highlight_period_ms == 0 || self.watcher_period_ms == 0 {
            return Err(Error::ConfigValue("animation periods must be non-zero".into()));
        }
        if !self.browse_step_px.is_finite() || self.browse_step_px <= 0.0 {
            return Err(Error::ConfigValue("browse_step_px must be positive".into()));
        }
        if self.max_present_attempts == 0 {
            return Err(Error::ConfigValue("max_present_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn animation_period(&self) -> Duration {
        Duration::from_millis(self.animation_period_ms)
    }

    pub fn watcher_initial_delay(&self) -> Duration {
        Duration::from_millis(self.watcher_initial_delay_ms)
    }

    pub fn watcher_period(&self) -> Duration {
        Duration::from_millis(self.watcher_period_ms)
    }

    pub fn highlight_period(&self) -> Duration {
        Duration::from_millis(self.highlight_period_ms)
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::ConfigValue(e.to_string()))
    }
}
