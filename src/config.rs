//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};

use log::warn;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Playlist ingestion and playback behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Thumbnail rendering preferences.
    pub thumbnail: ThumbnailConfig,
}

/// Playlist ingestion and playback behavior persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Pull in similarly named neighbors when a single local file is opened.
    #[serde(default)]
    pub auto_search_similar: bool,
    /// Restore the previous playing position on startup.
    #[serde(default = "default_true")]
    pub resume_from_last: bool,
    /// Wipe the persisted playlist when the application exits.
    #[serde(default)]
    pub clear_on_quit: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig {
            auto_search_similar: false,
            resume_from_last: true,
            clear_on_quit: false,
        }
    }
}

/// Thumbnail rendering preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThumbnailConfig {
    /// Target preview width in logical pixels.
    #[serde(default = "default_thumbnail_size_px")]
    pub size_px: u32,
    /// Display scale factor applied to `size_px`.
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        ThumbnailConfig {
            size_px: default_thumbnail_size_px(),
            device_pixel_ratio: default_device_pixel_ratio(),
        }
    }
}

impl ThumbnailConfig {
    /// Physical target width after display scaling.
    pub fn target_width(&self) -> u32 {
        (self.size_px as f32 * self.device_pixel_ratio).round() as u32
    }
}

fn default_true() -> bool {
    true
}

fn default_thumbnail_size_px() -> u32 {
    400
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

/// Per-user config file location (`<config_dir>/cinequeue/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cinequeue")
        .join("config.toml")
}

/// Reads the config file, falling back to defaults when it is missing or
/// unparseable.
pub fn load_config_file(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let Ok(config_text) = toml::to_string(config) else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(parent) {
            log::error!("Failed to create config dir {}: {}", parent.display(), err);
            return;
        }
    }

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_on_missing_keys() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.playback.auto_search_similar);
        assert!(config.playback.resume_from_last);
        assert!(!config.playback.clear_on_quit);
        assert_eq!(config.thumbnail.size_px, 400);
        assert_eq!(config.thumbnail.device_pixel_ratio, 1.0);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: Config =
            toml::from_str("[playback]\nauto_search_similar = true\n").unwrap();
        assert!(config.playback.auto_search_similar);
        assert!(config.playback.resume_from_last);
        assert_eq!(config.thumbnail.size_px, 400);
    }

    #[test]
    fn test_target_width_scales_with_pixel_ratio() {
        let thumbnail = ThumbnailConfig {
            size_px: 400,
            device_pixel_ratio: 1.5,
        };
        assert_eq!(thumbnail.target_width(), 600);
    }

    #[test]
    fn test_round_trip_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.playback.clear_on_quit = true;
        persist_config_file(&config, &path);
        assert_eq!(load_config_file(&path), config);
    }

    #[test]
    fn test_unparseable_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not valid toml [").unwrap();
        assert_eq!(load_config_file(&path), Config::default());
    }
}
