//! Playback engine boundary.
//!
//! The real engine (decoder, renderer, audio output) lives outside this
//! crate; the playlist side only needs the small surface below. Blocking
//! semantics are part of the contract: `wait_last_end` returns once the
//! engine has released the previous resource.

use crate::protocol::EngineState;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    "3g2", "3gp", "asf", "avi", "divx", "flv", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "mpg",
    "mts", "ogm", "ogv", "rm", "rmvb", "ts", "vob", "webm", "wmv",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "aac", "ac3", "ape", "flac", "m4a", "mka", "mp3", "ogg", "opus", "wav", "wma",
];

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

pub fn is_audio_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video_file(name: &str) -> bool {
    extension_of(name)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// External playback engine as seen from the playlist side.
pub trait PlayerEngine: Send {
    fn state(&self) -> EngineState;

    /// Asks the engine to start playing the entry at `index`. The engine
    /// reports the outcome asynchronously through `EngineMessage`.
    fn request_play(&mut self, index: usize);

    fn stop(&mut self);

    /// Blocks until the engine has fully released the previous resource.
    fn wait_last_end(&mut self);

    /// Native frame size of the currently playing stream.
    fn video_size(&self) -> (u32, u32);

    /// Duration of the currently playing stream, whole seconds.
    fn duration(&self) -> i64;

    fn is_playable_file(&self, name: &str) -> bool {
        is_video_file(name) || is_audio_file(name)
    }
}
