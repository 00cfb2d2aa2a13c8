#![no_main]

use libfuzzer_sys::fuzz_target;
use playseq::audio::NullQueueBackend;
use playseq::model::{PlayMode, Track, TrackId};
use playseq::player::PlayerManager;

fn library(len: usize) -> Vec<Track> {
    (0..len)
        .map(|idx| Track::from_path(TrackId(idx as u64), format!("track_{idx}.mp3").as_ref()))
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let mut backend = NullQueueBackend::new();
    if data.first().is_some_and(|byte| byte % 5 == 0) {
        backend.reject("track_1.mp3");
    }
    let mut player = PlayerManager::new(backend);
    player.load_library(library(data.len() % 8));

    for byte in data {
        match byte % 14 {
            0 => player.set_play_mode(PlayMode::Sequential),
            1 => player.set_play_mode(PlayMode::SingleLoop),
            2 => player.set_play_mode(PlayMode::Random),
            3 => player.play(),
            4 => player.pause(),
            5 => player.stop(),
            6 => player.play_next(),
            7 => player.play_previous(),
            8 => player.play_track(usize::from(byte / 14)),
            9 => player.clear_queue(),
            10 => player.queue_mut().backend_mut().finish_current(),
            11 => player.tick(),
            12 => player.load_library(library(usize::from(byte / 14) % 6)),
            _ => player.cycle_mode(),
        }

        let playlist = player.playlist();
        if !playlist.is_empty() {
            assert!(playlist.current_index() < playlist.count());
        }
        if player.current_track().is_none() {
            assert!(!player.is_playing());
        }
        if let Some(track) = player.current_track() {
            assert!(playlist.index_of(track.id()).is_some());
        }
    }
});
