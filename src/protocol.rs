//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the message payloads exchanged between the playlist
//! manager, the ingestion worker, the playback engine adapter, and any
//! front-end listening for collection/position notifications.

use crate::playlist::{MediaUrl, PlaylistEntry};

/// Traversal policy applied when resolving the next playback position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Advance once, user-driven only, no auto-repeat.
    SinglePlay,
    /// Replay the same item indefinitely unless the user explicitly advances.
    SingleLoop,
    /// Random permutation of indices, consumed in order, reshuffled on exhaustion.
    ShufflePlay,
    /// Sequential, stops at the end unless a user-initiated request wraps to start.
    #[default]
    OrderPlay,
    /// Sequential with unconditional wraparound and an observable loop counter.
    ListLoop,
}

/// Playback engine lifecycle states observed by the playlist manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Playlist(PlaylistMessage),
    Engine(EngineMessage),
}

/// Playlist-domain commands, worker results, and notifications.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    /// Submit a batch of locators for ingestion.
    Append(Vec<MediaUrl>),
    /// Restore the persisted playlist order from disk.
    Load,
    Remove(usize),
    Move { src: usize, dst: usize },
    Clear,
    PlayNext { from_user: bool },
    PlayPrev { from_user: bool },
    /// Jump directly to an index and attempt playback.
    ChangeCurrent(usize),
    Stop,
    SetPlayMode(PlayMode),

    /// One entry resolved by the ingestion worker. Doubles as the per-item
    /// incremental update notification for front-ends.
    ItemResolved(Box<PlaylistEntry>),
    /// The in-flight batch finished resolving; the manager merges and then
    /// starts the next queued batch.
    BatchResolved,

    /// The collection became empty.
    Emptied,
    /// Collection size changed; carries the new count.
    CountChanged(usize),
    /// The playing position changed; `None` means nothing is current.
    CurrentChanged(Option<usize>),
    /// Newly merged entries, in their final collection order.
    ItemsAppended(Vec<PlaylistEntry>),
    /// A single entry's metadata or validity was refreshed in place.
    ItemInfoUpdated(usize),
    ItemRemoved(usize),
    PlayModeChanged(PlayMode),
}

/// Notifications from the playback engine adapter.
#[derive(Debug, Clone)]
pub enum EngineMessage {
    StateChanged(EngineState),
}
