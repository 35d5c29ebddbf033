mod config;
mod media_info;
mod persistent_cache;
mod play_order;
mod player_engine;
mod playlist;
mod playlist_manager;
mod playlist_store;
mod protocol;
mod similar_files;
mod thumbnailer;

use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};
use tokio::sync::broadcast;

use config::Config;
use persistent_cache::PersistentCache;
use player_engine::PlayerEngine;
use playlist::{MediaUrl, PlaylistEntry};
use playlist_manager::PlaylistManager;
use playlist_store::PlaylistStore;
use protocol::{EngineState, Message, PlaylistMessage};

/// Engine stand-in for the headless inspector: nothing ever plays.
struct NullEngine;

impl PlayerEngine for NullEngine {
    fn state(&self) -> EngineState {
        EngineState::Idle
    }

    fn request_play(&mut self, index: usize) {
        info!("NullEngine: play requested for index {index}");
    }

    fn stop(&mut self) {}

    fn wait_last_end(&mut self) {}

    fn video_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn duration(&self) -> i64 {
        0
    }
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

fn print_entry(index: usize, entry: &PlaylistEntry) {
    let marker = if entry.valid { " " } else { "!" };
    println!(
        "{marker} {index:>3}  {:<40}  {:>9}  {:>8}  {}",
        entry.info.title,
        entry.info.resolution,
        format_duration(entry.info.duration),
        entry.url
    );
}

fn main() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = config::default_config_path();
    if !config_path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_path.display()
        );
        config::persist_config_file(&Config::default(), &config_path);
    }
    let config = config::load_config_file(&config_path);
    let clear_on_quit = config.playback.clear_on_quit;

    let urls: Vec<MediaUrl> = std::env::args()
        .skip(1)
        .map(|arg| MediaUrl::parse(&arg))
        .collect();

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let manager_receiver = bus_sender.subscribe();
    let manager_sender = bus_sender.clone();
    thread::spawn(move || {
        let mut manager = PlaylistManager::new(
            config,
            Box::new(NullEngine),
            PersistentCache::new(PersistentCache::default_root()),
            PlaylistStore::new(PlaylistStore::default_path()),
            manager_receiver,
            manager_sender,
        );
        manager.run();
    });

    let mut receiver = bus_sender.subscribe();
    if bus_sender
        .send(Message::Playlist(PlaylistMessage::Load))
        .is_err()
    {
        error!("bus closed before startup");
        return;
    }
    if !urls.is_empty() {
        let _ = bus_sender.send(Message::Playlist(PlaylistMessage::Append(urls)));
    }

    // Collect merge results until the bus goes quiet.
    let mut entries: Vec<PlaylistEntry> = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(120);
    let mut last_activity = Instant::now();
    while Instant::now() < deadline && last_activity.elapsed() < Duration::from_millis(1500) {
        match receiver.try_recv() {
            Ok(Message::Playlist(PlaylistMessage::ItemsAppended(mut appended))) => {
                entries.append(&mut appended);
                last_activity = Instant::now();
            }
            Ok(Message::Playlist(
                PlaylistMessage::ItemResolved(_) | PlaylistMessage::BatchResolved,
            )) => {
                last_activity = Instant::now();
            }
            Ok(_) => {}
            Err(broadcast::error::TryRecvError::Empty) => {
                thread::sleep(Duration::from_millis(25));
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Closed) => break,
        }
    }

    if entries.is_empty() {
        info!("playlist is empty");
    } else {
        println!("  idx  title                                     resolution  duration  location");
        for (index, entry) in entries.iter().enumerate() {
            print_entry(index, entry);
        }
    }

    if clear_on_quit {
        PlaylistStore::new(PlaylistStore::default_path()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_layouts() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(61), "1:01");
        assert_eq!(format_duration(3600), "1:00:00");
        assert_eq!(format_duration(3725), "1:02:05");
    }
}
