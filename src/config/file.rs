use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::color::Color;
use crate::view::{ReleasePolicy, RenderStrategy};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub strategy: RenderStrategy,
    #[serde(default)]
    pub release_policy: ReleasePolicy,
    pub background: Option<Color>,
    pub settle_ms: Option<u64>,
}

pub fn parse(content: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(content)
}

const FILE_NAME: &str = "touch-grid.toml";

/// Files to try, in order: an explicit path, the working directory, then
/// `$HOME/.config`.
pub fn candidates(explicit: Option<&Path>, home: Option<&Path>) -> Vec<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .into_iter()
        .chain(std::iter::once(PathBuf::from(FILE_NAME)))
        .chain(home.map(|home| home.join(".config").join(FILE_NAME)))
        .collect()
}

/// First readable, valid file among the candidates. Broken files are logged and skipped.
pub fn load(explicit: Option<&Path>) -> Option<FileConfig> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    candidates(explicit, home.as_deref()).iter().find_map(|path| read(path))
}

fn read(path: &Path) -> Option<FileConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match parse(&content) {
        Ok(config) => {
            log::debug!("Using config {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("Ignoring {}: {}", path.display(), e);
            None
        }
    }
}
