use crate::audio::{MAX_VOLUME, QueueBackend, QueueSignal};
use crate::model::Track;
use crossbeam_channel::Sender;
use std::time::Duration;

/// Notifications raised by [`QueuePlayerController`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    TrackChanged(Option<Track>),
    PlaybackStateChanged(bool),
    /// `generation` identifies the queue the finished item belonged to.
    TrackFinished {
        track: Option<Track>,
        generation: u64,
    },
}

/// Mirrors a track list onto a forward-only [`QueueBackend`].
///
/// `items` stays parallel to `tracks`; a slot is `None` when the backend could
/// not build a playable handle for that track. `order` is the physical
/// insertion order handed to the backend and `cursor` points into it.
pub struct QueuePlayerController<B: QueueBackend> {
    backend: B,
    tracks: Vec<Track>,
    items: Vec<Option<B::Item>>,
    order: Vec<usize>,
    cursor: Option<usize>,
    generation: u64,
    was_playing: bool,
    events: Sender<QueueEvent>,
}

impl<B: QueueBackend> QueuePlayerController<B> {
    pub fn new(backend: B, events: Sender<QueueEvent>) -> Self {
        Self {
            backend,
            tracks: Vec::new(),
            items: Vec::new(),
            order: Vec::new(),
            cursor: None,
            generation: 0,
            was_playing: false,
            events,
        }
    }

    /// Replaces the queue with `tracks`, primed from `start` and wrapping
    /// through the rest of the list. Leaves the transport paused.
    pub fn set_queue(&mut self, tracks: &[Track], start: usize) {
        if tracks.is_empty() {
            log::debug!("ignoring empty queue");
            return;
        }

        self.generation += 1;
        self.backend.clear();
        self.backend.pause();

        self.tracks = tracks.to_vec();
        let backend = &mut self.backend;
        self.items = self
            .tracks
            .iter()
            .map(|track| match backend.prepare(track) {
                Ok(item) => Some(item),
                Err(err) => {
                    log::warn!("skipping {}: {err:#}", track.source().display());
                    None
                }
            })
            .collect();

        let len = self.tracks.len();
        let start = start.min(len - 1);
        self.order.clear();
        for index in (start..len).chain(0..start) {
            let Some(item) = &self.items[index] else {
                continue;
            };
            match self.backend.enqueue(item) {
                Ok(()) => self.order.push(index),
                Err(err) => {
                    log::warn!(
                        "failed to queue {}: {err:#}",
                        self.tracks[index].source().display()
                    );
                    self.items[index] = None;
                }
            }
        }
        self.cursor = (!self.order.is_empty()).then_some(0);

        log::debug!(
            "queue generation {} primed with {}/{} items from index {start}",
            self.generation,
            self.order.len(),
            len
        );
        self.announce_track();
        self.sync_playback_state();
    }

    /// Moves to the next item when the current one is not last in track order.
    pub fn advance_to_next(&mut self) -> bool {
        let Some(cursor) = self.cursor else {
            return false;
        };
        let Some(&index) = self.order.get(cursor) else {
            return false;
        };
        if index + 1 >= self.tracks.len() || cursor + 1 >= self.order.len() {
            return false;
        }

        self.backend.skip_current();
        self.cursor = Some(cursor + 1);
        self.announce_track();
        self.sync_playback_state();
        true
    }

    pub fn play(&mut self) {
        self.backend.play();
        self.sync_playback_state();
    }

    pub fn pause(&mut self) {
        self.backend.pause();
        self.sync_playback_state();
    }

    /// Pauses and rewinds the current item. The queue itself is kept.
    pub fn stop(&mut self) {
        self.backend.pause();
        if self.cursor.is_some()
            && let Err(err) = self.backend.rewind()
        {
            log::warn!("stop could not rewind: {err:#}");
        }
        self.sync_playback_state();
    }

    pub fn clear_queue(&mut self) {
        if self.tracks.is_empty() && self.cursor.is_none() {
            return;
        }

        self.generation += 1;
        self.backend.clear();
        self.backend.pause();
        self.tracks.clear();
        self.items.clear();
        self.order.clear();
        self.cursor = None;

        log::debug!("queue cleared, generation {}", self.generation);
        self.announce_track();
        self.sync_playback_state();
    }

    /// Converts backend signals into events. Call from the control loop.
    pub fn poll(&mut self) {
        for signal in self.backend.poll_signals() {
            match signal {
                QueueSignal::ItemEnded => {
                    let track = self.current_track().cloned();
                    self.emit(QueueEvent::TrackFinished {
                        track,
                        generation: self.generation,
                    });
                }
                QueueSignal::CurrentItemChanged => {
                    self.cursor = self
                        .cursor
                        .and_then(|cursor| (cursor + 1 < self.order.len()).then_some(cursor + 1));
                    self.announce_track();
                }
            }
        }
        self.sync_playback_state();
    }

    pub fn volume(&self) -> f32 {
        self.backend.volume()
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.backend.set_volume(volume.clamp(0.0, MAX_VOLUME));
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.is_some() && !self.backend.is_paused() && !self.backend.is_empty()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_item_index()
            .and_then(|index| self.tracks.get(index))
    }

    /// Index of the current item in the track list the queue was built from.
    pub fn current_item_index(&self) -> Option<usize> {
        self.cursor.and_then(|cursor| self.order.get(cursor).copied())
    }

    pub fn current_item_duration(&self) -> Option<Duration> {
        self.cursor?;
        self.backend.duration()
    }

    pub fn current_item_elapsed(&self) -> Option<Duration> {
        self.cursor?;
        self.backend.position()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Track indices in the order they were handed to the backend.
    pub fn insertion_order(&self) -> &[usize] {
        &self.order
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn announce_track(&self) {
        self.emit(QueueEvent::TrackChanged(self.current_track().cloned()));
    }

    fn sync_playback_state(&mut self) {
        let playing = self.is_playing();
        if playing != self.was_playing {
            self.was_playing = playing;
            self.emit(QueueEvent::PlaybackStateChanged(playing));
        }
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }
}
