//! Playback position selection across the five play modes.
//!
//! The controller owns two indices: `current` (what is playing, `-1` when
//! nothing is) and `last` (the traversal anchor the next step starts from).
//! Mode transitions never touch them; only stepping, removal fixups and
//! explicit jumps do. Shuffle keeps a full permutation of indices plus a
//! consumed-count cursor so each entry plays exactly once per cycle.
//!
//! Invalid entries are skipped transparently: a step that lands on one
//! clears `current` and retries in the same direction, at most once per
//! collection slot, halting when no valid entry remains.

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::player_engine::PlayerEngine;
use crate::playlist::Playlist;
use crate::protocol::{EngineState, PlayMode};

const NO_POSITION: i64 = -1;

/// What one traversal request ended up doing.
#[derive(Debug, Default, PartialEq)]
pub struct AdvanceResult {
    /// Index handed to the engine, when anything played.
    pub played: Option<usize>,
    /// Entries whose filesystem facts changed while being re-validated.
    pub updated: Vec<usize>,
}

enum Attempt {
    Played,
    Skip,
    Halted,
}

pub struct PlayOrderController {
    mode: PlayMode,
    current: i64,
    last: i64,
    order: Vec<usize>,
    consumed: usize,
    loop_count: u32,
    // StdRng re-seeded per shuffle for thread safety.
    rng_seed: [u8; 32],
}

impl PlayOrderController {
    pub fn new() -> PlayOrderController {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("Failed to generate random seed");

        PlayOrderController {
            mode: PlayMode::default(),
            current: NO_POSITION,
            last: NO_POSITION,
            order: Vec::new(),
            consumed: 0,
            loop_count: 0,
            rng_seed: seed,
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn current(&self) -> Option<usize> {
        usize::try_from(self.current).ok()
    }

    pub fn last(&self) -> Option<usize> {
        usize::try_from(self.last).ok()
    }

    /// Completed ListLoop passes over the collection.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Returns true when the mode actually changed. `current` and `last`
    /// survive mode switches.
    pub fn set_mode(&mut self, mode: PlayMode, count: usize) -> bool {
        if self.mode == mode {
            return false;
        }
        self.mode = mode;
        if mode == PlayMode::ShufflePlay {
            self.generate_order(count);
            self.consumed = 0;
        }
        true
    }

    /// Restores the traversal anchor from a persisted position.
    pub fn restore_last(&mut self, pos: usize, count: usize) {
        if pos < count {
            self.last = pos as i64;
        }
    }

    /// Regenerates the shuffle permutation. No-op outside ShufflePlay.
    pub fn reshuffle(&mut self, count: usize) {
        if self.mode != PlayMode::ShufflePlay {
            return;
        }
        self.generate_order(count);
        self.consumed = 0;
    }

    fn generate_order(&mut self, count: usize) {
        let mut indices: Vec<usize> = (0..count).collect();

        let mut rng = StdRng::from_seed(self.rng_seed);
        for i in (1..count).rev() {
            let j = rng.random_range(0..=i);
            indices.swap(i, j);
        }

        // Update the seed for next time
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;

        self.order = indices;
    }

    /// Engine stopped: the playing position becomes the resume anchor.
    /// Returns true when the position changed.
    pub fn stop(&mut self) -> bool {
        if self.current == NO_POSITION {
            return false;
        }
        self.last = self.current;
        self.current = NO_POSITION;
        true
    }

    pub fn reset(&mut self) {
        self.current = NO_POSITION;
        self.last = NO_POSITION;
        self.order.clear();
        self.consumed = 0;
        self.loop_count = 0;
    }

    /// Index fixup after `pos` was removed; `new_count` is the size after
    /// removal. Returns true when the playing entry itself was removed and
    /// the engine must release it.
    pub fn on_removed(&mut self, pos: usize, new_count: usize) -> bool {
        let removed_current = self.current == pos as i64;
        if removed_current {
            self.last = self.current;
            self.current = NO_POSITION;
        } else if (pos as i64) < self.current {
            self.current -= 1;
            self.last = self.current;
        }
        if self.last >= new_count as i64 {
            self.last = NO_POSITION;
        }
        removed_current
    }

    /// Index fixup after the entry at `src` moved to `dst`.
    pub fn on_moved(&mut self, src: usize, dst: usize) {
        if self.current == NO_POSITION || src == dst {
            return;
        }
        let (src, dst) = (src as i64, dst as i64);
        let (low, high) = if src < dst { (src, dst) } else { (dst, src) };
        if self.current < low || self.current > high {
            return;
        }
        if self.current == src {
            self.current = dst;
        } else if src < dst {
            self.current -= 1;
        } else {
            self.current += 1;
        }
        self.last = self.current;
    }

    pub fn play_next(
        &mut self,
        from_user: bool,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
    ) -> AdvanceResult {
        self.advance(true, from_user, playlist, engine)
    }

    pub fn play_prev(
        &mut self,
        from_user: bool,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
    ) -> AdvanceResult {
        self.advance(false, from_user, playlist, engine)
    }

    /// Direct jump: release the engine, anchor both indices at `pos` and
    /// attempt playback, skipping forward on invalidity.
    pub fn change_current(
        &mut self,
        pos: usize,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
    ) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if pos >= playlist.len() {
            return result;
        }
        engine.wait_last_end();
        self.current = pos as i64;
        self.last = self.current;

        match self.attempt_play(true, playlist, engine, &mut result) {
            Attempt::Played | Attempt::Halted => result,
            Attempt::Skip => {
                let mut rest = self.advance(true, false, playlist, engine);
                result.played = rest.played;
                result.updated.append(&mut rest.updated);
                result
            }
        }
    }

    /// Re-validates and replays the current entry, skipping forward when it
    /// turned invalid since it was selected.
    pub fn try_play_current(
        &mut self,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
    ) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if self.current == NO_POSITION {
            return result;
        }
        match self.attempt_play(true, playlist, engine, &mut result) {
            Attempt::Played | Attempt::Halted => result,
            Attempt::Skip => {
                let mut rest = self.advance(true, false, playlist, engine);
                result.played = rest.played;
                result.updated.append(&mut rest.updated);
                result
            }
        }
    }

    fn advance(
        &mut self,
        forward: bool,
        from_user: bool,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
    ) -> AdvanceResult {
        let mut result = AdvanceResult::default();
        if playlist.is_empty() {
            return result;
        }

        let mut user = from_user;
        for _ in 0..playlist.len() {
            if !self.step(forward, user, playlist.len(), engine) {
                return result;
            }
            match self.attempt_play(forward, playlist, engine, &mut result) {
                Attempt::Played | Attempt::Halted => return result,
                // Retries after a skip are never user-initiated.
                Attempt::Skip => user = false,
            }
        }
        result
    }

    /// Moves the position one step in `forward` direction under the active
    /// mode. Returns false when the mode holds instead (nothing to play).
    fn step(
        &mut self,
        forward: bool,
        from_user: bool,
        count: usize,
        engine: &mut dyn PlayerEngine,
    ) -> bool {
        let count_i = count as i64;
        match self.mode {
            PlayMode::SinglePlay => {
                if !from_user {
                    return false;
                }
                self.single_step(forward, count_i, engine);
                true
            }
            PlayMode::SingleLoop => {
                if from_user && engine.state() != EngineState::Idle {
                    // Explicit advance past the looping entry.
                    self.single_step(forward, count_i, engine);
                } else {
                    // Replay the anchored entry.
                    if self.current == NO_POSITION {
                        self.current = self.last.max(0);
                    }
                    self.last = self.current;
                }
                true
            }
            PlayMode::ShufflePlay => {
                if self.order.len() != count {
                    self.generate_order(count);
                    self.consumed = 0;
                }
                if forward {
                    if self.consumed >= self.order.len() {
                        self.generate_order(count);
                        self.consumed = 0;
                    }
                    self.consumed += 1;
                } else if self.consumed <= 1 {
                    self.generate_order(count);
                    self.consumed = self.order.len();
                } else {
                    self.consumed -= 1;
                }
                engine.wait_last_end();
                self.current = self.order[self.consumed - 1] as i64;
                self.last = self.current;
                true
            }
            PlayMode::OrderPlay => {
                if forward {
                    self.last += 1;
                    if self.last >= count_i {
                        if from_user {
                            self.last = 0;
                        } else {
                            self.last -= 1;
                            return false;
                        }
                    }
                } else {
                    // Backward always wraps; the end-of-list hold is a
                    // forward-only rule.
                    self.last -= 1;
                    if self.last < 0 {
                        self.last = count_i - 1;
                    }
                }
                engine.wait_last_end();
                self.current = self.last;
                true
            }
            PlayMode::ListLoop => {
                if forward {
                    self.last += 1;
                    if self.last >= count_i {
                        self.loop_count += 1;
                        self.last = 0;
                    }
                } else {
                    self.last -= 1;
                    if self.last < 0 {
                        self.loop_count += 1;
                        self.last = count_i - 1;
                    }
                }
                engine.wait_last_end();
                self.current = self.last;
                true
            }
        }
    }

    /// Sequential single-entry advance with wraparound, shared by SinglePlay
    /// and the user-driven SingleLoop escape.
    fn single_step(&mut self, forward: bool, count: i64, engine: &mut dyn PlayerEngine) {
        if forward {
            if self.last + 1 >= count {
                self.last = NO_POSITION;
            }
            engine.wait_last_end();
            self.current = self.last + 1;
        } else {
            if self.last <= 0 {
                self.last = count;
            }
            engine.wait_last_end();
            self.current = self.last - 1;
        }
        self.last = self.current;
    }

    fn attempt_play(
        &mut self,
        forward: bool,
        playlist: &mut Playlist,
        engine: &mut dyn PlayerEngine,
        result: &mut AdvanceResult,
    ) -> Attempt {
        let Some(pos) = self.current() else {
            return Attempt::Halted;
        };

        let entry = playlist.entry_mut(pos);
        if entry.refresh() {
            result.updated.push(pos);
        }
        if entry.valid {
            engine.request_play(pos);
            result.played = Some(pos);
            return Attempt::Played;
        }

        self.current = NO_POSITION;
        if !playlist.any_valid() {
            return Attempt::Halted;
        }

        // SingleLoop would otherwise anchor on the dead entry forever.
        if self.mode == PlayMode::SingleLoop {
            let count = playlist.len() as i64;
            if forward {
                self.last = if self.last < count - 1 { self.last + 1 } else { 0 };
            } else {
                self.last = if self.last > 0 { self.last - 1 } else { count - 1 };
            }
        }
        Attempt::Skip
    }
}

impl Default for PlayOrderController {
    fn default() -> Self {
        PlayOrderController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_info::MediaInfo;
    use crate::player_engine::testing::MockEngine;
    use crate::playlist::{FileSnapshot, MediaUrl, PlaylistEntry, Thumbnail};

    fn entry(name: &str) -> PlaylistEntry {
        PlaylistEntry {
            url: MediaUrl::parse(&format!("http://example.com/{name}")),
            file: None,
            thumbnail: Thumbnail::new(Vec::new(), Vec::new()),
            info: MediaInfo::default(),
            valid: true,
            loaded: false,
        }
    }

    fn playlist_of(n: usize) -> Playlist {
        let mut playlist = Playlist::new();
        for i in 0..n {
            playlist.append(entry(&format!("clip-{i}.mkv")));
        }
        playlist
    }

    fn controller(mode: PlayMode, count: usize) -> PlayOrderController {
        let mut controller = PlayOrderController::new();
        controller.set_mode(mode, count);
        controller
    }

    #[test]
    fn test_order_play_advances_and_holds_at_end() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 3);

        for expected in 0..3 {
            let result = controller.play_next(true, &mut playlist, &mut engine);
            assert_eq!(result.played, Some(expected));
        }
        // Automatic advance at the end holds position.
        let result = controller.play_next(false, &mut playlist, &mut engine);
        assert_eq!(result.played, None);
        assert_eq!(controller.current(), Some(2));
        // A user request wraps around.
        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(0));
    }

    #[test]
    fn test_order_play_backward_always_wraps() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 3);

        let result = controller.play_prev(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
        controller.play_prev(true, &mut playlist, &mut engine);
        controller.play_prev(true, &mut playlist, &mut engine);
        assert_eq!(controller.current(), Some(0));
        // Unlike forward, backward wraps even without a user request.
        let result = controller.play_prev(false, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
        assert_eq!(controller.current(), Some(2));
    }

    #[test]
    fn test_backward_skip_chain_crosses_the_wrap() {
        let mut playlist = playlist_of(3);
        playlist.entry_mut(0).valid = false;
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 3);
        controller.change_current(1, &mut playlist, &mut engine);

        // Skipping the dead entry at 0 must continue past the front edge
        // instead of stalling there.
        let result = controller.play_prev(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
        assert_eq!(engine.played(), vec![1, 2]);
    }

    #[test]
    fn test_list_loop_wraps_and_counts_passes() {
        let mut playlist = playlist_of(2);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::ListLoop, 2);

        assert_eq!(
            controller.play_next(false, &mut playlist, &mut engine).played,
            Some(0)
        );
        assert_eq!(
            controller.play_next(false, &mut playlist, &mut engine).played,
            Some(1)
        );
        assert_eq!(
            controller.play_next(false, &mut playlist, &mut engine).played,
            Some(0)
        );
        assert_eq!(controller.loop_count(), 1);
    }

    #[test]
    fn test_list_loop_counts_backward_wrap() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::ListLoop, 3);
        controller.change_current(0, &mut playlist, &mut engine);

        let result = controller.play_prev(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
        assert_eq!(controller.loop_count(), 1);
    }

    #[test]
    fn test_list_loop_user_advance_from_end_wraps() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::ListLoop, 3);
        controller.change_current(2, &mut playlist, &mut engine);
        assert_eq!(controller.loop_count(), 0);

        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(0));
        assert_eq!(controller.current(), Some(0));
        assert_eq!(controller.loop_count(), 1);
    }

    #[test]
    fn test_single_play_ignores_automatic_advance() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::SinglePlay, 3);

        let result = controller.play_next(false, &mut playlist, &mut engine);
        assert_eq!(result.played, None);
        assert_eq!(controller.current(), None);

        assert_eq!(
            controller.play_next(true, &mut playlist, &mut engine).played,
            Some(0)
        );
        assert_eq!(
            controller.play_next(true, &mut playlist, &mut engine).played,
            Some(1)
        );
    }

    #[test]
    fn test_single_loop_replays_without_user() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::SingleLoop, 3);

        controller.change_current(1, &mut playlist, &mut engine);
        assert_eq!(controller.current(), Some(1));

        // Track finished; automatic advance replays the same entry.
        let result = controller.play_next(false, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(1));
        assert_eq!(engine.played(), vec![1, 1]);
    }

    #[test]
    fn test_single_loop_user_escapes_to_next() {
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::SingleLoop, 3);

        controller.change_current(0, &mut playlist, &mut engine);
        // Engine is Playing after the jump; a user next leaves the loop.
        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(1));
    }

    #[test]
    fn test_shuffle_visits_each_entry_once_per_cycle() {
        let mut playlist = playlist_of(5);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::ShufflePlay, 5);

        let mut first_cycle: Vec<usize> = (0..5)
            .filter_map(|_| {
                controller
                    .play_next(true, &mut playlist, &mut engine)
                    .played
            })
            .collect();
        first_cycle.sort_unstable();
        assert_eq!(first_cycle, vec![0, 1, 2, 3, 4]);

        // Exhaustion reshuffles and starts a fresh cycle.
        let mut second_cycle: Vec<usize> = (0..5)
            .filter_map(|_| {
                controller
                    .play_next(true, &mut playlist, &mut engine)
                    .played
            })
            .collect();
        second_cycle.sort_unstable();
        assert_eq!(second_cycle, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_shuffle_prev_steps_back_through_cycle() {
        let mut playlist = playlist_of(4);
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::ShufflePlay, 4);

        let first = controller.play_next(true, &mut playlist, &mut engine).played;
        let second = controller.play_next(true, &mut playlist, &mut engine).played;
        assert_ne!(first, second);

        let back = controller.play_prev(true, &mut playlist, &mut engine).played;
        assert_eq!(back, first);
    }

    #[test]
    fn test_invalid_entry_is_skipped_transparently() {
        let mut playlist = playlist_of(3);
        playlist.entry_mut(1).valid = false;
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 3);

        assert_eq!(
            controller.play_next(true, &mut playlist, &mut engine).played,
            Some(0)
        );
        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
        assert_eq!(engine.played(), vec![0, 2]);
    }

    #[test]
    fn test_vanished_file_is_reported_and_skipped() {
        let mut playlist = playlist_of(2);
        // Entry 0 claims an on-disk file that no longer exists.
        let gone = PlaylistEntry {
            url: MediaUrl::parse("/nonexistent/gone.mkv"),
            file: Some(FileSnapshot {
                path: "/nonexistent/gone.mkv".into(),
                exists: true,
                size: 100,
            }),
            thumbnail: Thumbnail::new(Vec::new(), Vec::new()),
            info: MediaInfo::default(),
            valid: true,
            loaded: false,
        };
        let mut playlist2 = Playlist::new();
        playlist2.append(gone);
        playlist2.append(playlist.remove(1).unwrap());

        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 2);
        let result = controller.play_next(true, &mut playlist2, &mut engine);
        assert_eq!(result.played, Some(1));
        assert_eq!(result.updated, vec![0]);
        assert!(!playlist2.entry(0).valid);
    }

    #[test]
    fn test_all_invalid_halts_with_no_current() {
        let mut playlist = playlist_of(3);
        for i in 0..3 {
            playlist.entry_mut(i).valid = false;
        }
        let mut engine = MockEngine::new();
        let mut controller = controller(PlayMode::OrderPlay, 3);

        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, None);
        assert_eq!(controller.current(), None);
        assert!(engine.played().is_empty());
    }

    #[test]
    fn test_remove_current_clears_position() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(1, &mut playlist, &mut engine);

        assert!(controller.on_removed(1, 2));
        assert_eq!(controller.current(), None);
        assert_eq!(controller.last(), Some(1));
    }

    #[test]
    fn test_remove_before_current_shifts_position_down() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(1, &mut playlist, &mut engine);

        assert!(!controller.on_removed(0, 2));
        assert_eq!(controller.current(), Some(0));
    }

    #[test]
    fn test_remove_after_current_leaves_position() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(0, &mut playlist, &mut engine);

        assert!(!controller.on_removed(2, 2));
        assert_eq!(controller.current(), Some(0));
    }

    #[test]
    fn test_move_fixups_track_the_playing_entry() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(0, &mut playlist, &mut engine);

        // The playing entry itself moves.
        controller.on_moved(0, 2);
        assert_eq!(controller.current(), Some(2));

        // Another entry moves across the playing one.
        controller.on_moved(0, 2);
        assert_eq!(controller.current(), Some(1));
    }

    #[test]
    fn test_change_current_out_of_range_is_noop() {
        let mut controller = controller(PlayMode::OrderPlay, 2);
        let mut playlist = playlist_of(2);
        let mut engine = MockEngine::new();

        let result = controller.change_current(9, &mut playlist, &mut engine);
        assert_eq!(result.played, None);
        assert_eq!(controller.current(), None);
    }

    #[test]
    fn test_stop_keeps_resume_anchor() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(1, &mut playlist, &mut engine);

        assert!(controller.stop());
        assert_eq!(controller.current(), None);
        assert_eq!(controller.last(), Some(1));
        // A later next resumes from the anchor.
        let result = controller.play_next(true, &mut playlist, &mut engine);
        assert_eq!(result.played, Some(2));
    }

    #[test]
    fn test_mode_switch_preserves_position() {
        let mut controller = controller(PlayMode::OrderPlay, 3);
        let mut playlist = playlist_of(3);
        let mut engine = MockEngine::new();
        controller.change_current(1, &mut playlist, &mut engine);

        assert!(controller.set_mode(PlayMode::ListLoop, 3));
        assert_eq!(controller.current(), Some(1));
        assert!(!controller.set_mode(PlayMode::ListLoop, 3));
    }
}
