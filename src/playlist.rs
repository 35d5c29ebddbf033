//! Playlist collection primitives.
//!
//! Defines the media locator type, the per-row entry with its metadata and
//! thumbnails, and the ordered collection the rest of the engine mutates.
//! Locator uniqueness is enforced by the ingestion pipeline, not here.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::media_info::MediaInfo;

/// A playable resource locator: a local file path or a remote URL.
///
/// Optical-disc locators (`dvd:` and friends) are carried as `Remote` URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaUrl {
    Local(PathBuf),
    Remote(Url),
}

impl MediaUrl {
    /// Parses user input: an absolute `file:` URL becomes `Local`, any other
    /// URL with a scheme becomes `Remote`, everything else is a local path.
    pub fn parse(input: &str) -> MediaUrl {
        if let Ok(url) = Url::parse(input) {
            if url.scheme() == "file" {
                if let Ok(path) = url.to_file_path() {
                    return MediaUrl::Local(path);
                }
            }
            // Single letters are drive prefixes or plain words, not schemes.
            if url.scheme().len() > 1 {
                return MediaUrl::Remote(url);
            }
        }
        MediaUrl::Local(PathBuf::from(input))
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MediaUrl::Local(_))
    }

    pub fn is_disc(&self) -> bool {
        match self {
            MediaUrl::Remote(url) => url.scheme().starts_with("dvd"),
            MediaUrl::Local(_) => false,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaUrl::Local(path) => Some(path),
            MediaUrl::Remote(_) => None,
        }
    }

    /// Last path component, used as a display title fallback.
    pub fn file_name(&self) -> String {
        match self {
            MediaUrl::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            MediaUrl::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .unwrap_or_default()
                .to_string(),
        }
    }

    /// Canonical string form used for cache keys and persistence.
    pub fn canonical(&self) -> String {
        match self {
            MediaUrl::Local(path) => Url::from_file_path(path)
                .map(String::from)
                .unwrap_or_else(|_| path.to_string_lossy().into_owned()),
            MediaUrl::Remote(url) => url.as_str().to_string(),
        }
    }
}

impl fmt::Display for MediaUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaUrl::Local(path) => write!(f, "{}", path.display()),
            MediaUrl::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Cached filesystem facts for a local entry, captured at resolution time
/// and re-captured on every replay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: PathBuf,
    pub exists: bool,
    pub size: u64,
}

impl FileSnapshot {
    pub fn capture(path: &Path) -> FileSnapshot {
        let meta = std::fs::metadata(path).ok();
        FileSnapshot {
            path: path.to_path_buf(),
            exists: meta.is_some(),
            size: meta.map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Light/dark preview image pair, PNG-encoded. Shared so that bus
/// notifications clone cheaply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub light: Arc<Vec<u8>>,
    pub dark: Arc<Vec<u8>>,
}

impl Thumbnail {
    pub fn new(light: Vec<u8>, dark: Vec<u8>) -> Thumbnail {
        Thumbnail {
            light: Arc::new(light),
            dark: Arc::new(dark),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.light.is_empty() && self.dark.is_empty()
    }
}

/// One playlist row.
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub url: MediaUrl,
    /// Present for local entries only.
    pub file: Option<FileSnapshot>,
    pub thumbnail: Thumbnail,
    pub info: MediaInfo,
    /// Whether the resource is currently reachable.
    pub valid: bool,
    /// Whether stream facts were back-filled from live playback (remote
    /// entries without static metadata).
    pub loaded: bool,
}

impl PlaylistEntry {
    /// Re-stats a local entry and updates `valid`. Returns true when
    /// existence or size changed since the last snapshot. Remote entries
    /// never change here.
    pub fn refresh(&mut self) -> bool {
        let Some(snapshot) = self.file.as_mut() else {
            return false;
        };
        let fresh = FileSnapshot::capture(&snapshot.path);
        let changed = fresh.exists != snapshot.exists || fresh.size != snapshot.size;
        self.valid = fresh.exists;
        *snapshot = fresh;
        changed
    }
}

/// Ordered sequence of entries; insertion order is the display order.
#[derive(Default)]
pub struct Playlist {
    entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn new() -> Playlist {
        Playlist::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> &PlaylistEntry {
        &self.entries[index]
    }

    pub fn entry_mut(&mut self, index: usize) -> &mut PlaylistEntry {
        &mut self.entries[index]
    }

    pub fn append(&mut self, entry: PlaylistEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, index: usize) -> Option<PlaylistEntry> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }

    /// Moves the entry at `src` so it ends up at `dst`.
    pub fn move_entry(&mut self, src: usize, dst: usize) {
        if src >= self.entries.len() || dst >= self.entries.len() || src == dst {
            return;
        }
        let entry = self.entries.remove(src);
        self.entries.insert(dst, entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn index_of(&self, url: &MediaUrl) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.url == url)
    }

    pub fn any_valid(&self) -> bool {
        self.entries.iter().any(|entry| entry.valid)
    }
}
