mod cli;
mod file;

pub use cli::{Cli, Command};

use crate::color::Color;
use crate::view::{ReleasePolicy, RenderStrategy, ViewSettings};

/// Edge length of a grid block in pixels.
pub const BLOCK_SIZE: u32 = 20;
/// Most pointers handled per touch batch; also the size of the color table.
pub const MAX_TOUCHPOINTS: usize = 10;
/// Touch id of an unoccupied block.
pub const INVALID_TOUCH_ID: i32 = -1;
/// Surface size the text scale is relative to.
pub const REFERENCE_WIDTH: f32 = 480.0;

const DEFAULT_WIDTH: u32 = 480;
const DEFAULT_HEIGHT: u32 = 800;
const DEFAULT_SETTLE_MS: u64 = 20;

/// Merged configuration from CLI args and TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub strategy: RenderStrategy,
    pub release_policy: ReleasePolicy,
    pub background: Color,
    pub settle_ms: u64,
}

impl Config {
    /// Load configuration by merging TOML file with CLI overrides.
    pub fn load(cli: &Cli) -> Self {
        let file_config = file::load(cli.config.as_deref()).unwrap_or_default();

        Self::merge(cli, file_config)
    }

    fn merge(cli: &Cli, file_config: file::FileConfig) -> Self {
        Self {
            width: cli.width.or(file_config.width).unwrap_or(DEFAULT_WIDTH),
            height: cli.height.or(file_config.height).unwrap_or(DEFAULT_HEIGHT),
            strategy: cli.strategy.unwrap_or(file_config.strategy),
            release_policy: cli.release_policy.unwrap_or(file_config.release_policy),
            background: cli
                .background
                .or(file_config.background)
                .unwrap_or(Color::BLACK),
            settle_ms: cli
                .settle_ms
                .or(file_config.settle_ms)
                .unwrap_or(DEFAULT_SETTLE_MS),
        }
    }

    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            strategy: self.strategy,
            release_policy: self.release_policy,
            background: self.background,
        }
    }

    pub fn validate(&self) -> Result<(), &'static str> {
        if self.width == 0 || self.height == 0 {
            return Err("Surface width and height must be non-zero");
        }
        if self.width < BLOCK_SIZE || self.height < BLOCK_SIZE {
            return Err("Surface is smaller than a single block");
        }
        Ok(())
    }
}
