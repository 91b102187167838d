use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigPathError {
    #[error("neither the XDG base directory nor HOME is set")]
    MissingHomeDirectory,
}

const APP_DIR: &str = "snapgallery";
const APP_CONFIG_FILE: &str = "config.json";
const SCREENSHOT_SUBDIR: &str = "Screenshots";

pub const DEFAULT_WINDOW_SIZE: usize = 8;
pub const DEFAULT_COOLDOWN_MS: u64 = 1_000;
pub const DEFAULT_THUMBNAIL_MAX_EDGE: u32 = 256;

/// Gallery settings from `config.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GalleryConfig {
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default)]
    pub thumbnail_max_edge: Option<u32>,
}

impl GalleryConfig {
    pub fn window_size(&self) -> usize {
        self.window_size.unwrap_or(DEFAULT_WINDOW_SIZE).max(1)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.unwrap_or(DEFAULT_COOLDOWN_MS))
    }

    pub fn thumbnail_max_edge(&self) -> u32 {
        self.thumbnail_max_edge
            .unwrap_or(DEFAULT_THUMBNAIL_MAX_EDGE)
            .max(1)
    }

    /// Configured directory, else the per-user data directory.
    pub fn storage_dir(&self) -> Result<PathBuf, ConfigPathError> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        let (xdg_data_home, home) = data_env_dirs();
        default_storage_dir(xdg_data_home.as_deref(), home.as_deref())
    }
}

pub fn load_gallery_config() -> GalleryConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_gallery_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_gallery_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> GalleryConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return GalleryConfig::default(),
    };
    if !path.exists() {
        return GalleryConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            GalleryConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            GalleryConfig::default()
        }
    }
}

fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn data_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = xdg_root(xdg_config_home, home, ".config")?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn default_storage_dir(
    xdg_data_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = xdg_root(xdg_data_home, home, ".local/share")?;
    path.push(APP_DIR);
    path.push(SCREENSHOT_SUBDIR);
    Ok(path)
}

fn xdg_root(
    xdg_dir: Option<&Path>,
    home: Option<&Path>,
    home_fallback: &str,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_dir.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(home_fallback))
}
