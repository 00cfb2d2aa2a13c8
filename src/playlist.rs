use crate::model::{PlayMode, Track, TrackId};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Authoritative track order and the current position within it.
///
/// Pure position arithmetic: nothing here touches playback.
#[derive(Debug)]
pub struct PlaylistStore {
    tracks: Vec<Track>,
    current_index: usize,
    rng: SmallRng,
}

impl Default for PlaylistStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistStore {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            tracks: Vec::new(),
            current_index: 0,
            rng,
        }
    }

    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
        self.current_index = 0;
    }

    pub fn set_current_index(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.current_index = index;
        } else {
            log::debug!(
                "ignoring out of range index {index} for {} tracks",
                self.tracks.len()
            );
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn next_index(&mut self, mode: PlayMode) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        match mode {
            PlayMode::Sequential => Some((self.current_index + 1) % len),
            PlayMode::SingleLoop => Some(self.current_index),
            PlayMode::Random => {
                if len == 1 {
                    return Some(self.current_index);
                }
                loop {
                    let candidate = self.rng.random_range(0..len);
                    if candidate != self.current_index {
                        return Some(candidate);
                    }
                }
            }
        }
    }

    pub fn previous_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        (len > 1).then(|| (self.current_index + len - 1) % len)
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|track| track.id() == id)
    }
}
