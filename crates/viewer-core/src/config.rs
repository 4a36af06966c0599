//! Viewer configuration
//!
//! Scroll layout and tiling settings. Configuration can be loaded from a
//! TOML file, overlaid with environment variables, or built in code. Every
//! constructor path ends in [`ViewerConfig::validate`] so degenerate values
//! (zero tile size, overlap that swallows the whole tile) never reach the
//! grid calculator.

use crate::axis::ScrollAxis;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default distance between spreads, in unscaled points
pub const DEFAULT_PAGE_GAP: f64 = 10.0;

/// Default padding between the scroll container edge and the content
pub const DEFAULT_VIEWPORT_GAP: f64 = 10.0;

/// Default number of extra virtual items kept rendered on each side
pub const DEFAULT_BUFFER_SIZE: usize = 2;

/// Default tile edge in screen pixels
pub const DEFAULT_TILE_SIZE: f64 = 768.0;

/// Default overlap between neighbouring tiles in screen pixels
pub const DEFAULT_OVERLAP_PX: f64 = 2.5;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("tile size must be positive, got {0}")]
    NonPositiveTileSize(f64),

    #[error("tile overlap must be positive and smaller than the tile size (overlap={overlap}, tile_size={tile_size})")]
    InvalidOverlap { overlap: f64, tile_size: f64 },

    #[error("{key} must be a finite, non-negative number, got {value}")]
    Negative { key: &'static str, value: f64 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Scroll layout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Scroll direction
    pub axis: ScrollAxis,

    /// Gap between spreads and between pages inside a spread (points)
    pub page_gap: f64,

    /// Padding around the content inside the scroll container (pixels)
    pub viewport_gap: f64,

    /// Extra virtual items rendered before and after the visible range
    pub buffer_size: usize,

    /// Page to jump to once the layout is ready (1-based)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_page: Option<u32>,

    /// Throttle window for scroll metric publication (milliseconds)
    pub throttle_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            axis: ScrollAxis::Vertical,
            page_gap: DEFAULT_PAGE_GAP,
            viewport_gap: DEFAULT_VIEWPORT_GAP,
            buffer_size: DEFAULT_BUFFER_SIZE,
            initial_page: None,
            throttle_ms: 100,
        }
    }
}

impl ScrollConfig {
    /// Throttle window as a [`Duration`]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Tiling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    /// When disabled, no tiles are computed and the published state is empty
    pub enabled: bool,

    /// Tile edge in screen pixels
    pub tile_size: f64,

    /// Overlap between neighbouring tiles in screen pixels
    pub overlap_px: f64,

    /// Tile rings rendered beyond the visible region
    pub extra_rings: u32,

    /// Render attempts per tile before it stays failed
    pub max_render_attempts: u32,

    /// Time after which an in-flight render is abandoned (milliseconds)
    pub render_timeout_ms: u64,

    /// Trailing throttle window for tile recomputation on scroll (milliseconds)
    pub throttle_ms: u64,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tile_size: DEFAULT_TILE_SIZE,
            overlap_px: DEFAULT_OVERLAP_PX,
            extra_rings: 0,
            max_render_attempts: 3,
            render_timeout_ms: 10_000,
            throttle_ms: 50,
        }
    }
}

impl TilingConfig {
    /// Distance between the origins of neighbouring tiles
    pub fn step(&self) -> f64 {
        self.tile_size - self.overlap_px
    }

    /// Render timeout as a [`Duration`]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// Throttle window as a [`Duration`]
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Override the tile edge
    pub fn with_tile_size(mut self, tile_size: f64) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Override the overlap between tiles
    pub fn with_overlap(mut self, overlap_px: f64) -> Self {
        self.overlap_px = overlap_px;
        self
    }

    /// Override the number of extra rings
    pub fn with_extra_rings(mut self, extra_rings: u32) -> Self {
        self.extra_rings = extra_rings;
        self
    }

    /// Reject configurations that would produce degenerate grids
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tile_size.is_finite() && self.tile_size > 0.0) {
            return Err(ConfigError::NonPositiveTileSize(self.tile_size));
        }
        if !(self.overlap_px.is_finite() && self.overlap_px > 0.0 && self.overlap_px < self.tile_size) {
            return Err(ConfigError::InvalidOverlap {
                overlap: self.overlap_px,
                tile_size: self.tile_size,
            });
        }
        if self.max_render_attempts == 0 {
            return Err(ConfigError::Zero("max_render_attempts"));
        }
        if self.render_timeout_ms == 0 {
            return Err(ConfigError::Zero("render_timeout_ms"));
        }
        if self.throttle_ms == 0 {
            return Err(ConfigError::Zero("tiling.throttle_ms"));
        }
        Ok(())
    }
}

/// Complete viewer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub scroll: ScrollConfig,
    pub tiling: TilingConfig,
}

impl ViewerConfig {
    /// Returns the default configuration file location for the current platform.
    ///
    /// - macOS: ~/Library/Application Support/pageflow/config.toml
    /// - Linux: ~/.config/pageflow/config.toml
    /// - Windows: %APPDATA%\pageflow\config.toml
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("pageflow").join("config.toml")
        } else {
            PathBuf::from("pageflow.toml")
        }
    }

    /// Loads the configuration from the default location, then the environment.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let config = if path.exists() {
            tracing::debug!(path = %path.display(), "loading viewer configuration");
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `PAGEFLOW_AXIS`: `vertical` or `horizontal`
    /// - `PAGEFLOW_PAGE_GAP`: gap between spreads in points
    /// - `PAGEFLOW_VIEWPORT_GAP`: content padding in pixels
    /// - `PAGEFLOW_BUFFER_SIZE`: buffered virtual items per side
    /// - `PAGEFLOW_TILING_ENABLED`: `true` or `false`
    /// - `PAGEFLOW_TILE_SIZE`: tile edge in pixels
    /// - `PAGEFLOW_TILE_OVERLAP`: tile overlap in pixels
    /// - `PAGEFLOW_EXTRA_RINGS`: extra tile rings
    /// - `PAGEFLOW_RENDER_TIMEOUT_MS`: render timeout
    /// - `PAGEFLOW_MAX_RENDER_ATTEMPTS`: render attempts per tile
    ///
    /// # Errors
    /// Returns an error if any variable holds an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlay environment variables onto this configuration
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(axis) = env_value::<ScrollAxis>("PAGEFLOW_AXIS")? {
            self.scroll.axis = axis;
        }
        if let Some(gap) = env_value("PAGEFLOW_PAGE_GAP")? {
            self.scroll.page_gap = gap;
        }
        if let Some(gap) = env_value("PAGEFLOW_VIEWPORT_GAP")? {
            self.scroll.viewport_gap = gap;
        }
        if let Some(buffer) = env_value("PAGEFLOW_BUFFER_SIZE")? {
            self.scroll.buffer_size = buffer;
        }
        if let Some(enabled) = env_value("PAGEFLOW_TILING_ENABLED")? {
            self.tiling.enabled = enabled;
        }
        if let Some(size) = env_value("PAGEFLOW_TILE_SIZE")? {
            self.tiling.tile_size = size;
        }
        if let Some(overlap) = env_value("PAGEFLOW_TILE_OVERLAP")? {
            self.tiling.overlap_px = overlap;
        }
        if let Some(rings) = env_value("PAGEFLOW_EXTRA_RINGS")? {
            self.tiling.extra_rings = rings;
        }
        if let Some(timeout) = env_value("PAGEFLOW_RENDER_TIMEOUT_MS")? {
            self.tiling.render_timeout_ms = timeout;
        }
        if let Some(attempts) = env_value("PAGEFLOW_MAX_RENDER_ATTEMPTS")? {
            self.tiling.max_render_attempts = attempts;
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// [scroll]
    /// axis = "vertical"
    /// page_gap = 10.0
    ///
    /// [tiling]
    /// tile_size = 768.0
    /// overlap_px = 2.5
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string. Missing keys keep their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Serialize the configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("scroll.page_gap", self.scroll.page_gap),
            ("scroll.viewport_gap", self.scroll.viewport_gap),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Negative { key, value });
            }
        }
        if self.scroll.throttle_ms == 0 {
            return Err(ConfigError::Zero("scroll.throttle_ms"));
        }
        if self.scroll.initial_page == Some(0) {
            return Err(ConfigError::InvalidValue("scroll.initial_page".to_string()));
        }
        self.tiling.validate()
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}
