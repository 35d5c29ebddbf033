//! Playlist-domain orchestrator.
//!
//! This component owns the collection and the play-order controller, runs the
//! ingestion pipeline, persists playlist mutations, and reacts to engine state
//! transitions, all driven by the event bus.
//!
//! Ingestion is strictly serialized: at most one batch resolves in the
//! background at any time, later submissions queue FIFO. The worker thread
//! never touches the collection; it reports `ItemResolved`/`BatchResolved`
//! over the bus and the model thread merges.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::config::Config;
use crate::media_info::{self, MediaInfo};
use crate::persistent_cache::PersistentCache;
use crate::play_order::{AdvanceResult, PlayOrderController};
use crate::player_engine::{self, PlayerEngine};
use crate::playlist::{FileSnapshot, MediaUrl, Playlist, PlaylistEntry};
use crate::playlist_store::PlaylistStore;
use crate::protocol::{self, EngineState, Message, PlaylistMessage};
use crate::similar_files;
use crate::thumbnailer::Thumbnailer;

const REMOTE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const REMOTE_PROBE_ATTEMPTS: u32 = 3;

struct ResolveJob {
    url: MediaUrl,
    path: PathBuf,
    audio: bool,
}

/// Coordinates ingestion, collection edits, traversal and persistence.
pub struct PlaylistManager {
    playlist: Playlist,
    controller: PlayOrderController,
    engine: Box<dyn PlayerEngine>,
    cache: PersistentCache,
    thumbnailer: Thumbnailer,
    store: PlaylistStore,
    config: Config,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    /// First merge is permissive: invalid entries are kept so a restored
    /// playlist survives a temporarily unmounted drive.
    first_load: bool,
    in_flight: HashSet<MediaUrl>,
    batch_active: bool,
    queued_batches: VecDeque<Vec<MediaUrl>>,
    batch_results: Vec<PlaylistEntry>,
    /// Position to restore once the startup load has merged.
    pending_restore: Option<usize>,
    /// Set while a user-commanded stop is in flight so the Idle transition
    /// is not mistaken for end-of-track.
    expecting_stop: bool,
}

impl PlaylistManager {
    pub fn new(
        config: Config,
        engine: Box<dyn PlayerEngine>,
        cache: PersistentCache,
        store: PlaylistStore,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        let thumbnailer = Thumbnailer::new(&config.thumbnail);
        Self {
            playlist: Playlist::new(),
            controller: PlayOrderController::new(),
            engine,
            cache,
            thumbnailer,
            store,
            config,
            bus_consumer,
            bus_producer,
            first_load: true,
            in_flight: HashSet::new(),
            batch_active: false,
            queued_batches: VecDeque::new(),
            batch_results: Vec::new(),
            pending_restore: None,
            expecting_stop: false,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => match message {
                    Message::Playlist(message) => self.handle_playlist_message(message),
                    Message::Engine(protocol::EngineMessage::StateChanged(state)) => {
                        self.handle_engine_state(state)
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "PlaylistManager lagged on control bus, skipped {} message(s)",
                        skipped
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    error!("PlaylistManager: bus closed");
                    break;
                }
            }
        }
    }

    fn handle_playlist_message(&mut self, message: PlaylistMessage) {
        match message {
            PlaylistMessage::Append(urls) => self.handle_append(urls),
            PlaylistMessage::Load => self.load_playlist(),
            PlaylistMessage::Remove(pos) => self.remove_item(pos),
            PlaylistMessage::Move { src, dst } => self.move_item(src, dst),
            PlaylistMessage::Clear => self.clear(),
            PlaylistMessage::PlayNext { from_user } => {
                let before = self.controller.current();
                let result = self.controller.play_next(
                    from_user,
                    &mut self.playlist,
                    self.engine.as_mut(),
                );
                self.publish_advance(before, result);
            }
            PlaylistMessage::PlayPrev { from_user } => {
                let before = self.controller.current();
                let result = self.controller.play_prev(
                    from_user,
                    &mut self.playlist,
                    self.engine.as_mut(),
                );
                self.publish_advance(before, result);
            }
            PlaylistMessage::ChangeCurrent(pos) => {
                let before = self.controller.current();
                let result =
                    self.controller
                        .change_current(pos, &mut self.playlist, self.engine.as_mut());
                self.publish_advance(before, result);
            }
            PlaylistMessage::Stop => {
                self.expecting_stop = true;
                self.engine.stop();
                if self.controller.stop() {
                    self.notify(PlaylistMessage::CurrentChanged(None));
                    self.save_playlist();
                }
            }
            PlaylistMessage::SetPlayMode(mode) => {
                if self.controller.set_mode(mode, self.playlist.len()) {
                    self.notify(PlaylistMessage::PlayModeChanged(mode));
                }
            }
            PlaylistMessage::ItemResolved(entry) => {
                if self.batch_active {
                    self.batch_results.push(*entry);
                }
            }
            PlaylistMessage::BatchResolved => self.complete_batch(),
            _ => trace!("PlaylistManager: ignoring notification"),
        }
    }

    // ---- ingestion -------------------------------------------------------

    fn handle_append(&mut self, urls: Vec<MediaUrl>) {
        let mut local = Vec::new();
        let mut appended = Vec::new();

        for url in urls {
            if self.playlist.index_of(&url).is_some() || self.in_flight.contains(&url) {
                debug!("PlaylistManager: duplicate locator ignored: {url}");
                continue;
            }
            if url.is_local() {
                local.push(url);
            } else {
                // Remote locators carry no extractable metadata; resolve
                // inline on this thread.
                let entry = resolve_remote_entry(url, &self.thumbnailer);
                self.playlist.append(entry.clone());
                appended.push(entry);
            }
        }

        if !appended.is_empty() {
            self.controller.reshuffle(self.playlist.len());
            self.notify(PlaylistMessage::ItemsAppended(appended));
            self.notify(PlaylistMessage::CountChanged(self.playlist.len()));
            self.save_playlist();
        }
        if !local.is_empty() {
            self.submit_batch(local);
        }
    }

    fn submit_batch(&mut self, urls: Vec<MediaUrl>) {
        if self.batch_active {
            self.queued_batches.push_back(urls);
            return;
        }
        self.begin_batch(urls);
    }

    fn begin_batch(&mut self, urls: Vec<MediaUrl>) {
        self.batch_active = true;
        self.batch_results.clear();

        let mut jobs = Vec::new();
        for url in urls {
            let Some(path) = url.local_path().map(|p| p.to_path_buf()) else {
                continue;
            };
            // A restored playlist may reference an unmounted drive; only
            // subsequent opens require the file to be present.
            if !self.first_load && !path.is_file() {
                debug!("PlaylistManager: dropping missing file {}", path.display());
                continue;
            }

            let candidates = if !self.first_load && self.config.playback.auto_search_similar {
                similar_files::find_similar_files(&path, &|name| {
                    self.engine.is_playable_file(name)
                })
            } else {
                vec![path]
            };

            for candidate in candidates {
                let candidate_url = MediaUrl::Local(candidate.clone());
                if self.playlist.index_of(&candidate_url).is_some()
                    || self.in_flight.contains(&candidate_url)
                {
                    continue;
                }
                let name = candidate_url.file_name();
                self.in_flight.insert(candidate_url.clone());
                jobs.push(ResolveJob {
                    url: candidate_url,
                    path: candidate,
                    audio: player_engine::is_audio_file(&name),
                });
            }
        }

        if jobs.is_empty() {
            // Still close the batch so queued submissions proceed.
            self.notify(PlaylistMessage::BatchResolved);
            return;
        }

        info!("PlaylistManager: resolving batch of {} file(s)", jobs.len());
        let producer = self.bus_producer.clone();
        let cache = self.cache.clone();
        let thumbnailer = self.thumbnailer.clone();
        thread::spawn(move || {
            for job in jobs {
                let entry = resolve_local_entry(&job, &cache, &thumbnailer);
                let _ = producer.send(Message::Playlist(PlaylistMessage::ItemResolved(Box::new(
                    entry,
                ))));
            }
            let _ = producer.send(Message::Playlist(PlaylistMessage::BatchResolved));
        });
    }

    fn complete_batch(&mut self) {
        let mut entries = std::mem::take(&mut self.batch_results);
        if !self.first_load {
            entries.retain(|entry| entry.info.valid);
            entries.sort_by(|a, b| {
                similar_files::compare_names(&a.url.file_name(), &b.url.file_name())
            });
        }

        let mut appended = Vec::new();
        for entry in entries {
            if self.playlist.index_of(&entry.url).is_some() {
                continue;
            }
            self.playlist.append(entry.clone());
            appended.push(entry);
        }

        self.in_flight.clear();
        self.first_load = false;
        self.batch_active = false;

        if !appended.is_empty() {
            self.controller.reshuffle(self.playlist.len());
            self.notify(PlaylistMessage::ItemsAppended(appended));
            self.notify(PlaylistMessage::CountChanged(self.playlist.len()));
            self.save_playlist();
        }

        if let Some(pos) = self.pending_restore.take() {
            if self.config.playback.resume_from_last {
                self.controller.restore_last(pos, self.playlist.len());
            }
        }

        if let Some(next) = self.queued_batches.pop_front() {
            self.begin_batch(next);
        }
    }

    // ---- collection edits ------------------------------------------------

    fn load_playlist(&mut self) {
        let (urls, position) = self.store.load();
        if urls.is_empty() {
            // Nothing to restore; whatever the user opens next is an
            // ordinary batch, not the permissive startup merge.
            self.first_load = false;
            return;
        }
        info!("PlaylistManager: restoring {} persisted entries", urls.len());
        self.pending_restore = position;
        self.handle_append(urls);
        // All-remote playlists resolve inline and never open a batch.
        if !self.batch_active {
            if let Some(pos) = self.pending_restore.take() {
                if self.config.playback.resume_from_last {
                    self.controller.restore_last(pos, self.playlist.len());
                }
            }
        }
    }

    fn remove_item(&mut self, pos: usize) {
        if self.playlist.remove(pos).is_none() {
            return;
        }
        let before = self.controller.current();
        let removed_current = self.controller.on_removed(pos, self.playlist.len());
        if removed_current {
            self.engine.wait_last_end();
        }
        self.controller.reshuffle(self.playlist.len());

        self.notify(PlaylistMessage::ItemRemoved(pos));
        if before != self.controller.current() {
            self.notify(PlaylistMessage::CurrentChanged(self.controller.current()));
        }
        self.notify(PlaylistMessage::CountChanged(self.playlist.len()));
        if self.playlist.is_empty() {
            self.controller.reset();
            self.notify(PlaylistMessage::Emptied);
        }
        self.save_playlist();
    }

    fn move_item(&mut self, src: usize, dst: usize) {
        if src >= self.playlist.len() || dst >= self.playlist.len() || src == dst {
            return;
        }
        let before = self.controller.current();
        self.playlist.move_entry(src, dst);
        self.controller.on_moved(src, dst);
        if before != self.controller.current() {
            self.notify(PlaylistMessage::CurrentChanged(self.controller.current()));
        }
        self.save_playlist();
    }

    fn clear(&mut self) {
        self.expecting_stop = true;
        self.engine.stop();
        self.playlist.clear();
        self.controller.reset();
        self.notify(PlaylistMessage::CurrentChanged(None));
        self.notify(PlaylistMessage::CountChanged(0));
        self.notify(PlaylistMessage::Emptied);
        self.save_playlist();
    }

    /// Wipes the persisted namespace, for `clear_on_quit`.
    pub fn clear_persisted(&self) {
        self.store.clear();
    }

    // ---- playback --------------------------------------------------------

    fn publish_advance(&mut self, before: Option<usize>, result: AdvanceResult) {
        for pos in &result.updated {
            self.notify(PlaylistMessage::ItemInfoUpdated(*pos));
        }
        let after = self.controller.current();
        if before != after || result.played.is_some() {
            self.notify(PlaylistMessage::CurrentChanged(after));
            self.save_playlist();
        }
    }

    fn handle_engine_state(&mut self, state: EngineState) {
        match state {
            EngineState::Playing => self.backfill_remote_facts(),
            EngineState::Idle => {
                if self.expecting_stop {
                    self.expecting_stop = false;
                    return;
                }
                // Natural end of the current entry.
                let before = self.controller.current();
                let result =
                    self.controller
                        .play_next(false, &mut self.playlist, self.engine.as_mut());
                self.publish_advance(before, result);
            }
            EngineState::Paused => {}
        }
    }

    /// Remote entries have no static metadata; once they actually play, the
    /// live stream facts are folded back into the collection.
    fn backfill_remote_facts(&mut self) {
        let Some(pos) = self.controller.current() else {
            return;
        };
        let (width, height) = self.engine.video_size();
        let duration = self.engine.duration();

        let entry = self.playlist.entry_mut(pos);
        if entry.url.is_local() || entry.loaded {
            return;
        }
        entry.info.width = width;
        entry.info.height = height;
        entry.info.resolution = format!("{width}x{height}");
        entry.info.duration = duration;
        entry.loaded = true;
        self.notify(PlaylistMessage::ItemInfoUpdated(pos));
    }

    // ---- plumbing --------------------------------------------------------

    fn notify(&self, message: PlaylistMessage) {
        let _ = self.bus_producer.send(Message::Playlist(message));
    }

    fn save_playlist(&self) {
        let urls: Vec<MediaUrl> = self
            .playlist
            .entries()
            .iter()
            .map(|entry| entry.url.clone())
            .collect();
        let position = self.controller.current().or(self.controller.last());
        self.store.save(&urls, position);
    }
}

/// Full resolution of one local file: cache first, then extraction, with the
/// cache written through on success.
fn resolve_local_entry(
    job: &ResolveJob,
    cache: &PersistentCache,
    thumbnailer: &Thumbnailer,
) -> PlaylistEntry {
    let hit = cache.lookup(&job.url);
    let (info, thumbnail) = match (hit.info, hit.thumbnail) {
        (Some(info), Some(thumbnail)) => (info, thumbnail),
        (Some(info), None) => {
            let thumbnail = thumbnailer.generate(&job.path, job.audio);
            cache.store(&job.url, &info, &thumbnail);
            (info, thumbnail)
        }
        _ => match media_info::probe_file(&job.path) {
            Ok(info) => {
                let thumbnail = thumbnailer.generate(&job.path, job.audio);
                cache.store(&job.url, &info, &thumbnail);
                (info, thumbnail)
            }
            Err(err) => {
                warn!("RESOLVE: {}: {err}", job.path.display());
                (MediaInfo::default(), thumbnailer.fallback())
            }
        },
    };

    let valid = info.valid;
    PlaylistEntry {
        url: job.url.clone(),
        file: Some(FileSnapshot::capture(&job.path)),
        thumbnail,
        info,
        valid,
        // Set once live playback back-fills stream facts.
        loaded: false,
    }
}

fn resolve_remote_entry(url: MediaUrl, thumbnailer: &Thumbnailer) -> PlaylistEntry {
    let mut info = MediaInfo {
        valid: true,
        title: url.file_name(),
        file_path: url.canonical(),
        ..MediaInfo::default()
    };
    if let MediaUrl::Remote(remote) = &url {
        if matches!(remote.scheme(), "http" | "https") {
            info.file_size = probe_remote_size(remote.as_str());
        }
    }

    PlaylistEntry {
        url,
        file: None,
        thumbnail: thumbnailer.fallback(),
        info,
        valid: true,
        loaded: false,
    }
}

/// Best-effort Content-Length probe; streams that reject HEAD report 0.
fn probe_remote_size(url: &str) -> i64 {
    let agent = ureq::AgentBuilder::new()
        .timeout(REMOTE_PROBE_TIMEOUT)
        .build();
    for attempt in 1..=REMOTE_PROBE_ATTEMPTS {
        match agent.head(url).call() {
            Ok(response) => {
                return response
                    .header("Content-Length")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0);
            }
            Err(err) => {
                debug!("HEAD {url} attempt {attempt} failed: {err}");
            }
        }
    }
    0
}
