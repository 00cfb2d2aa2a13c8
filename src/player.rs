use crate::audio::QueueBackend;
use crate::controller::{QueueEvent, QueuePlayerController};
use crate::model::{PlayMode, Track, TrackId};
use crate::playlist::PlaylistStore;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::time::Duration;

/// State changes published to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TrackChanged(Option<Track>),
    PlaybackStateChanged(bool),
    ModeChanged(PlayMode),
}

/// Read-only snapshot for an OS "now playing" surface.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub duration: Option<Duration>,
    pub elapsed: Option<Duration>,
    pub rate: f32,
}

/// Coordinates the playlist with the forward-only queue.
///
/// The only owner of both [`PlaylistStore`] and [`QueuePlayerController`].
/// Every transition either advances the queue in place or rebuilds it from
/// a new starting index, then writes the resolved index back to the
/// playlist, which stays authoritative.
pub struct PlayerManager<B: QueueBackend> {
    playlist: PlaylistStore,
    queue: QueuePlayerController<B>,
    queue_events: Receiver<QueueEvent>,
    mode: PlayMode,
    current: Option<Track>,
    announced_track: Option<TrackId>,
    announced_playing: bool,
    events_tx: Sender<PlayerEvent>,
    events_rx: Receiver<PlayerEvent>,
}

impl<B: QueueBackend> PlayerManager<B> {
    pub fn new(backend: B) -> Self {
        Self::with_playlist(backend, PlaylistStore::new())
    }

    pub fn with_playlist(backend: B, playlist: PlaylistStore) -> Self {
        let (queue_tx, queue_events) = unbounded();
        let (events_tx, events_rx) = unbounded();
        Self {
            playlist,
            queue: QueuePlayerController::new(backend, queue_tx),
            queue_events,
            mode: PlayMode::default(),
            current: None,
            announced_track: None,
            announced_playing: false,
            events_tx,
            events_rx,
        }
    }

    /// Receiver for published events. Meant for a single consumer.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        self.events_rx.clone()
    }

    pub fn play_mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        log::info!("play mode set to {mode:?}");
        let _ = self.events_tx.send(PlayerEvent::ModeChanged(mode));
    }

    pub fn cycle_mode(&mut self) {
        self.set_play_mode(self.mode.next());
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some() && self.queue.is_playing()
    }

    pub fn volume(&self) -> f32 {
        self.queue.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.queue.set_volume(volume);
    }

    pub fn playlist(&self) -> &PlaylistStore {
        &self.playlist
    }

    pub fn queue(&self) -> &QueuePlayerController<B> {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QueuePlayerController<B> {
        &mut self.queue
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        let track = self.current.as_ref()?;
        Some(NowPlaying {
            title: track.title().to_string(),
            artist: track.artist().to_string(),
            duration: self.queue.current_item_duration(),
            elapsed: self.queue.current_item_elapsed(),
            rate: if self.is_playing() { 1.0 } else { 0.0 },
        })
    }

    pub fn load_library(&mut self, tracks: Vec<Track>) {
        self.queue.clear_queue();
        self.current = None;
        self.playlist.set_tracks(tracks);
        log::info!("library loaded with {} tracks", self.playlist.count());

        if !self.playlist.is_empty() {
            self.rebuild(0);
        }
        self.publish();
    }

    pub fn play(&mut self) {
        if self.current.is_none() {
            return;
        }
        if self.queue.current_track().is_none() {
            self.rebuild(self.playlist.current_index());
        }
        self.queue.play();
        self.publish();
    }

    pub fn pause(&mut self) {
        self.queue.pause();
        self.publish();
    }

    pub fn stop(&mut self) {
        self.queue.stop();
        self.publish();
    }

    pub fn toggle_playback(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn play_track(&mut self, index: usize) {
        if index >= self.playlist.count() {
            log::debug!(
                "ignoring play request for index {index} of {}",
                self.playlist.count()
            );
            return;
        }
        self.rebuild(index);
        self.queue.play();
        self.publish();
    }

    /// Forgets the selection and the queue; the library stays loaded.
    pub fn clear_queue(&mut self) {
        self.queue.clear_queue();
        self.current = None;
        self.publish();
    }

    pub fn play_next(&mut self) {
        if self.playlist.is_empty() {
            return;
        }
        let Some(target) = self.playlist.next_index(self.mode) else {
            return;
        };

        match self.mode {
            PlayMode::Sequential => {
                if self.queue.advance_to_next() {
                    self.sync_index(target);
                } else {
                    self.rebuild(target);
                    self.queue.play();
                }
            }
            PlayMode::SingleLoop => self.restart_current(),
            PlayMode::Random => {
                self.rebuild(target);
                self.queue.play();
            }
        }
        self.publish();
    }

    pub fn play_previous(&mut self) {
        if self.playlist.is_empty() {
            return;
        }

        match self.mode {
            PlayMode::SingleLoop => self.restart_current(),
            PlayMode::Sequential | PlayMode::Random => {
                let Some(previous) = self.playlist.previous_index() else {
                    return;
                };
                self.rebuild(previous);
                self.queue.play();
            }
        }
        self.publish();
    }

    /// Reacts to the queue reporting that `finished` played to its end.
    ///
    /// Ignored when the notification belongs to an older queue or the track
    /// is no longer in the playlist.
    pub fn handle_automatic_completion(&mut self, finished: Option<&Track>, generation: u64) {
        if generation != self.queue.generation() {
            log::debug!(
                "dropping completion from queue generation {generation}, now {}",
                self.queue.generation()
            );
            return;
        }
        let Some(index) = finished.and_then(|track| self.playlist.index_of(track.id())) else {
            log::debug!("dropping completion for a track no longer in the playlist");
            return;
        };

        match self.mode {
            PlayMode::Sequential => {
                // The queue has already stepped past the finished item, so an
                // empty queue here means unplayable tracks were left behind.
                let last = index + 1 == self.playlist.count();
                if last || self.queue.current_track().is_none() {
                    log::debug!("queue exhausted after index {index}, wrapping");
                    self.rebuild((index + 1) % self.playlist.count());
                    self.queue.play();
                }
            }
            PlayMode::SingleLoop => {
                self.rebuild(index);
                self.queue.play();
            }
            PlayMode::Random => {
                self.playlist.set_current_index(index);
                if let Some(target) = self.playlist.next_index(PlayMode::Random) {
                    self.rebuild(target);
                    self.queue.play();
                }
            }
        }
        self.publish();
    }

    /// Pumps queue notifications. Call regularly from the control loop.
    pub fn tick(&mut self) {
        self.queue.poll();
        while let Ok(event) = self.queue_events.try_recv() {
            match event {
                QueueEvent::TrackFinished { track, generation } => {
                    self.handle_automatic_completion(track.as_ref(), generation);
                }
                QueueEvent::TrackChanged(_) => self.reconcile(),
                QueueEvent::PlaybackStateChanged(_) => {}
            }
        }
        self.publish();
    }

    fn restart_current(&mut self) {
        if self.queue.current_track().is_none() {
            self.rebuild(self.playlist.current_index());
        } else {
            self.queue.stop();
        }
        self.queue.play();
    }

    fn rebuild(&mut self, index: usize) {
        log::debug!("rebuilding queue from index {index}");
        self.queue.set_queue(self.playlist.tracks(), index);
        self.sync_index(index);
    }

    /// Writes the queue's live position back to the playlist, falling back to
    /// `fallback` when the queue has no current item.
    fn sync_index(&mut self, fallback: usize) {
        let index = self
            .queue
            .current_track()
            .and_then(|track| self.playlist.index_of(track.id()))
            .unwrap_or(fallback);
        self.playlist.set_current_index(index);
        self.current = self.playlist.current_track().cloned();
    }

    fn reconcile(&mut self) {
        if self.current.is_none() {
            return;
        }
        if let Some(index) = self
            .queue
            .current_track()
            .and_then(|track| self.playlist.index_of(track.id()))
        {
            self.playlist.set_current_index(index);
            self.current = self.playlist.current_track().cloned();
        }
    }

    fn publish(&mut self) {
        let track_id = self.current.as_ref().map(Track::id);
        if track_id != self.announced_track {
            self.announced_track = track_id;
            let _ = self
                .events_tx
                .send(PlayerEvent::TrackChanged(self.current.clone()));
        }

        let playing = self.is_playing();
        if playing != self.announced_playing {
            self.announced_playing = playing;
            let _ = self.events_tx.send(PlayerEvent::PlaybackStateChanged(playing));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullQueueBackend;

    fn tracks(names: &[&str]) -> Vec<Track> {
        names
            .iter()
            .enumerate()
            .map(|(n, name)| Track::new(TrackId(n as u64), *name, "artist", format!("{name}.mp3")))
            .collect()
    }

    fn manager(names: &[&str]) -> PlayerManager<NullQueueBackend> {
        let mut manager =
            PlayerManager::with_playlist(NullQueueBackend::new(), PlaylistStore::with_seed(11));
        manager.load_library(tracks(names));
        manager
    }

    fn title(manager: &PlayerManager<NullQueueBackend>) -> Option<&str> {
        manager.current_track().map(Track::title)
    }

    #[test]
    fn load_library_selects_first_track_paused() {
        let manager = manager(&["a", "b", "c"]);
        assert_eq!(title(&manager), Some("a"));
        assert!(!manager.is_playing());
        assert_eq!(manager.queue().insertion_order(), &[0, 1, 2]);
    }

    #[test]
    fn load_empty_library_leaves_nothing_selected() {
        let mut manager = manager(&["a"]);
        manager.load_library(Vec::new());
        assert!(manager.current_track().is_none());
        manager.play();
        manager.play_next();
        manager.play_previous();
        assert!(!manager.is_playing());
    }

    #[test]
    fn play_without_selection_is_a_no_op() {
        let mut manager = manager(&["a", "b"]);
        manager.clear_queue();
        manager.play();
        assert!(!manager.is_playing());
        assert!(manager.current_track().is_none());
    }

    #[test]
    fn sequential_next_advances_in_place() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.play();
        let generation = manager.queue().generation();

        manager.play_next();
        assert_eq!(title(&manager), Some("b"));
        assert_eq!(manager.playlist().current_index(), 1);
        assert_eq!(manager.queue().generation(), generation);
        assert!(manager.is_playing());
    }

    #[test]
    fn sequential_next_from_last_rebuilds_at_start() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.play_track(2);
        let generation = manager.queue().generation();

        manager.play_next();
        assert_eq!(title(&manager), Some("a"));
        assert_eq!(manager.playlist().current_index(), 0);
        assert!(manager.queue().generation() > generation);
        assert_eq!(manager.queue().insertion_order(), &[0, 1, 2]);
        assert!(manager.is_playing());
    }

    #[test]
    fn single_loop_next_and_previous_restart_current() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.set_play_mode(PlayMode::SingleLoop);
        manager.play_track(1);

        manager.play_next();
        assert_eq!(title(&manager), Some("b"));
        manager.play_previous();
        assert_eq!(title(&manager), Some("b"));
        assert_eq!(manager.playlist().current_index(), 1);
        assert!(manager.is_playing());
    }

    #[test]
    fn random_next_rebuilds_on_another_track() {
        let mut manager = manager(&["a", "b", "c", "d"]);
        manager.set_play_mode(PlayMode::Random);
        manager.play_track(2);

        for _ in 0..20 {
            let before = manager.playlist().current_index();
            manager.play_next();
            let after = manager.playlist().current_index();
            assert_ne!(before, after);
            assert_eq!(manager.queue().current_item_index(), Some(after));
        }
    }

    #[test]
    fn previous_wraps_and_rebuilds() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.play_previous();
        assert_eq!(title(&manager), Some("c"));
        assert_eq!(manager.queue().insertion_order(), &[2, 0, 1]);
        assert!(manager.is_playing());
    }

    #[test]
    fn previous_on_single_track_is_a_no_op() {
        let mut manager = manager(&["a"]);
        let generation = manager.queue().generation();
        manager.play_previous();
        assert_eq!(manager.queue().generation(), generation);
        assert!(!manager.is_playing());
    }

    #[test]
    fn completion_from_old_generation_is_ignored() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.set_play_mode(PlayMode::SingleLoop);
        manager.play_track(1);
        let stale = manager.queue().generation();
        let finished = manager.current_track().cloned();

        manager.clear_queue();
        manager.handle_automatic_completion(finished.as_ref(), stale);
        assert!(manager.current_track().is_none());
        assert!(!manager.is_playing());
    }

    #[test]
    fn completion_for_unknown_track_is_ignored() {
        let mut manager = manager(&["a", "b"]);
        manager.play();
        let generation = manager.queue().generation();
        let ghost = Track::new(TrackId(99), "ghost", "nobody", "ghost.mp3");

        manager.handle_automatic_completion(Some(&ghost), generation);
        assert_eq!(manager.queue().generation(), generation);
        assert_eq!(title(&manager), Some("a"));
    }

    #[test]
    fn now_playing_reflects_transport() {
        let mut manager = PlayerManager::with_playlist(
            NullQueueBackend::new().with_item_duration(Duration::from_secs(200)),
            PlaylistStore::with_seed(1),
        );
        assert!(manager.now_playing().is_none());
        manager.load_library(tracks(&["a", "b"]));

        let paused = manager.now_playing().expect("track selected");
        assert_eq!(paused.title, "a");
        assert_eq!(paused.rate, 0.0);
        assert_eq!(paused.duration, Some(Duration::from_secs(200)));

        manager.play();
        manager.queue_mut().backend_mut().elapse(Duration::from_secs(4));
        let playing = manager.now_playing().expect("track selected");
        assert_eq!(playing.rate, 1.0);
        assert_eq!(playing.elapsed, Some(Duration::from_secs(4)));
    }

    #[test]
    fn events_are_published_once_per_change() {
        let mut manager = manager(&["a", "b"]);
        let events = manager.subscribe();
        events.try_iter().for_each(drop);

        manager.play();
        manager.pause();
        manager.pause();
        manager.cycle_mode();

        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                PlayerEvent::PlaybackStateChanged(true),
                PlayerEvent::PlaybackStateChanged(false),
                PlayerEvent::ModeChanged(PlayMode::Random),
            ]
        );
    }

    #[test]
    fn toggle_flips_playback() {
        let mut manager = manager(&["a"]);
        manager.toggle_playback();
        assert!(manager.is_playing());
        manager.toggle_playback();
        assert!(!manager.is_playing());
    }
}
