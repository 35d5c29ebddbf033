//! Persisted playlist order and last playing position.
//!
//! Stored as a TOML file with a `[playlist]` table keyed by sequential
//! string indices, rewritten wholesale after every merge. Keys are probed
//! `0, 1, 2, ...` on load so lexicographic table ordering never matters.

use std::path::{Path, PathBuf};

use log::warn;
use toml::{Table, Value};

use crate::playlist::MediaUrl;

const PLAYLIST_TABLE: &str = "playlist";
const STATE_TABLE: &str = "state";
const POSITION_KEY: &str = "position";

pub struct PlaylistStore {
    path: PathBuf,
}

impl PlaylistStore {
    pub fn new(path: PathBuf) -> PlaylistStore {
        PlaylistStore { path }
    }

    /// Per-user default location (`<config_dir>/cinequeue/playlist.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cinequeue")
            .join("playlist.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted order and the last playing position. A missing or
    /// unparseable file yields an empty playlist.
    pub fn load(&self) -> (Vec<MediaUrl>, Option<usize>) {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return (Vec::new(), None);
            }
            Err(err) => {
                warn!("STORE: could not read {}: {err}", self.path.display());
                return (Vec::new(), None);
            }
        };
        let root = match content.parse::<Table>() {
            Ok(root) => root,
            Err(err) => {
                warn!("STORE: unparseable {}: {err}", self.path.display());
                return (Vec::new(), None);
            }
        };

        let mut urls = Vec::new();
        if let Some(Value::Table(playlist)) = root.get(PLAYLIST_TABLE) {
            for index in 0..playlist.len() {
                let Some(Value::String(raw)) = playlist.get(&index.to_string()) else {
                    break;
                };
                urls.push(MediaUrl::parse(raw));
            }
        }

        let position = root
            .get(STATE_TABLE)
            .and_then(Value::as_table)
            .and_then(|state| state.get(POSITION_KEY))
            .and_then(Value::as_integer)
            .and_then(|raw| usize::try_from(raw).ok())
            .filter(|&pos| pos < urls.len());

        (urls, position)
    }

    /// Rewrites the whole file from the in-memory order.
    pub fn save(&self, urls: &[MediaUrl], position: Option<usize>) {
        let mut playlist = Table::new();
        for (index, url) in urls.iter().enumerate() {
            playlist.insert(index.to_string(), Value::String(url.canonical()));
        }

        let mut root = Table::new();
        root.insert(PLAYLIST_TABLE.to_string(), Value::Table(playlist));
        if let Some(position) = position {
            let mut state = Table::new();
            state.insert(POSITION_KEY.to_string(), Value::Integer(position as i64));
            root.insert(STATE_TABLE.to_string(), Value::Table(state));
        }

        let Ok(content) = toml::to_string(&root) else {
            warn!("STORE: could not serialize {}", self.path.display());
            return;
        };
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("STORE: could not create {}: {err}", parent.display());
                return;
            }
        }
        if let Err(err) = std::fs::write(&self.path, content) {
            warn!("STORE: could not write {}: {err}", self.path.display());
        }
    }

    /// Wipes the persisted namespace entirely.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!("STORE: could not remove {}: {err}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> PlaylistStore {
        PlaylistStore::new(dir.path().join("playlist.toml"))
    }

    #[test]
    fn test_save_load_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let urls: Vec<MediaUrl> = (0..12)
            .map(|n| MediaUrl::parse(&format!("/media/clip-{n}.mkv")))
            .collect();

        store.save(&urls, Some(7));
        let (loaded, position) = store.load();

        assert_eq!(loaded, urls);
        assert_eq!(position, Some(7));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (urls, position) = store_in(&dir).load();
        assert!(urls.is_empty());
        assert!(position.is_none());
    }

    #[test]
    fn test_out_of_range_position_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&[MediaUrl::parse("/media/a.mkv")], Some(5));
        let (urls, position) = store.load();
        assert_eq!(urls.len(), 1);
        assert!(position.is_none());
    }

    #[test]
    fn test_save_without_position_clears_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&[MediaUrl::parse("/media/a.mkv")], Some(0));
        store.save(&[MediaUrl::parse("/media/a.mkv")], None);
        assert_eq!(store.load().1, None);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&[MediaUrl::parse("/media/a.mkv")], None);
        store.clear();
        assert!(store.load().0.is_empty());
        // Clearing twice is harmless.
        store.clear();
    }

    #[test]
    fn test_remote_urls_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let urls = vec![
            MediaUrl::parse("http://example.com/stream.m3u8"),
            MediaUrl::parse("/media/local.mkv"),
        ];
        store.save(&urls, None);
        assert_eq!(store.load().0, urls);
    }
}
