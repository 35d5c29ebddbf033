//! Content-addressed disk cache for extracted metadata and thumbnails.
//!
//! Two flat directories under the cache root, both keyed by the hex SHA-256
//! of the canonical locator string: `cacheinfo/<hash>` holds the JSON
//! `MediaInfo`, `thumbs/<hash>` holds base64-encoded PNG pairs. A thumbnail
//! record is only trusted when its metadata record is present and valid, so
//! stale thumbs from interrupted runs never resurrect without metadata.
//!
//! Every I/O or decode failure downgrades to a cache miss with a warning;
//! the cache never fails a resolution.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::warn;
use sha2::{Digest, Sha256};

use crate::media_info::MediaInfo;
use crate::playlist::{MediaUrl, Thumbnail};

const INFO_DIR: &str = "cacheinfo";
const THUMBS_DIR: &str = "thumbs";

#[derive(serde::Deserialize, serde::Serialize)]
struct ThumbRecord {
    light: String,
    dark: String,
}

/// What a lookup produced. `thumbnail` is never `Some` while `info` is `None`.
#[derive(Default)]
pub struct CacheHit {
    pub info: Option<MediaInfo>,
    pub thumbnail: Option<Thumbnail>,
}

#[derive(Clone)]
pub struct PersistentCache {
    root: PathBuf,
}

impl PersistentCache {
    /// Opens (and creates) the cache under `root`.
    pub fn new(root: PathBuf) -> PersistentCache {
        for dir in [root.join(INFO_DIR), root.join(THUMBS_DIR)] {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                warn!("CACHE: could not create {}: {err}", dir.display());
            }
        }
        PersistentCache { root }
    }

    /// Per-user default location.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("cinequeue")
    }

    fn key(url: &MediaUrl) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.canonical().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn info_path(&self, key: &str) -> PathBuf {
        self.root.join(INFO_DIR).join(key)
    }

    fn thumb_path(&self, key: &str) -> PathBuf {
        self.root.join(THUMBS_DIR).join(key)
    }

    /// Returns whatever trustworthy records exist for `url`.
    pub fn lookup(&self, url: &MediaUrl) -> CacheHit {
        let key = Self::key(url);

        let info = read_json::<MediaInfo>(&self.info_path(&key));
        let Some(info) = info else {
            return CacheHit::default();
        };
        if !info.valid {
            return CacheHit::default();
        }

        let thumbnail = read_json::<ThumbRecord>(&self.thumb_path(&key))
            .and_then(|record| decode_thumb(&record));
        CacheHit {
            info: Some(info),
            thumbnail,
        }
    }

    /// Writes both records, replacing whatever was there.
    pub fn store(&self, url: &MediaUrl, info: &MediaInfo, thumbnail: &Thumbnail) {
        let key = Self::key(url);

        write_json(&self.info_path(&key), info);
        let record = ThumbRecord {
            light: BASE64.encode(thumbnail.light.as_slice()),
            dark: BASE64.encode(thumbnail.dark.as_slice()),
        };
        write_json(&self.thumb_path(&key), &record);
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!("CACHE: could not read {}: {err}", path.display());
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("CACHE: corrupt record {}: {err}", path.display());
            None
        }
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) {
    let Ok(content) = serde_json::to_string(value) else {
        warn!("CACHE: could not serialize record for {}", path.display());
        return;
    };
    if let Err(err) = std::fs::write(path, content) {
        warn!("CACHE: could not write {}: {err}", path.display());
    }
}

fn decode_thumb(record: &ThumbRecord) -> Option<Thumbnail> {
    let light = BASE64.decode(&record.light).ok()?;
    let dark = BASE64.decode(&record.dark).ok()?;
    Some(Thumbnail::new(light, dark))
}
