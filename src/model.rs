use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One playable item. Tracks are matched by `id`, never by position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    id: TrackId,
    title: String,
    artist: String,
    source: PathBuf,
}

impl Track {
    pub fn new(
        id: TrackId,
        title: impl Into<String>,
        artist: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            artist: artist.into(),
            source: source.into(),
        }
    }

    /// Builds a track for a bare file, using the file stem as its title.
    pub fn from_path(id: TrackId, path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(id, title, "Unknown Artist", path)
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Sequential,
    SingleLoop,
    Random,
}

impl PlayMode {
    pub fn next(self) -> Self {
        match self {
            Self::Sequential => Self::Random,
            Self::Random => Self::SingleLoop,
            Self::SingleLoop => Self::Sequential,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sequential" | "normal" | "seq" => Some(Self::Sequential),
            "single" | "singleloop" | "loop-one" | "one" => Some(Self::SingleLoop),
            "random" | "shuffle" => Some(Self::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub play_mode: PlayMode,
    #[serde(default = "default_saved_volume")]
    pub volume: f32,
}

fn default_saved_volume() -> f32 {
    1.0
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            play_mode: PlayMode::Sequential,
            volume: default_saved_volume(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cycle_visits_every_mode() {
        let mut mode = PlayMode::Sequential;
        let mut seen = vec![mode];
        for _ in 0..2 {
            mode = mode.next();
            seen.push(mode);
        }
        assert_eq!(
            seen,
            vec![PlayMode::Sequential, PlayMode::Random, PlayMode::SingleLoop]
        );
        assert_eq!(mode.next(), PlayMode::Sequential);
    }

    #[test]
    fn mode_parse_accepts_aliases() {
        assert_eq!(PlayMode::parse("Shuffle"), Some(PlayMode::Random));
        assert_eq!(PlayMode::parse(" single "), Some(PlayMode::SingleLoop));
        assert_eq!(PlayMode::parse("seq"), Some(PlayMode::Sequential));
        assert_eq!(PlayMode::parse("bogus"), None);
    }

    #[test]
    fn track_from_path_uses_file_stem() {
        let track = Track::from_path(TrackId(3), Path::new("music/Blue Monday.flac"));
        assert_eq!(track.title(), "Blue Monday");
        assert_eq!(track.artist(), "Unknown Artist");
        assert_eq!(track.id(), TrackId(3));
    }

    #[test]
    fn persisted_state_defaults_missing_volume() {
        let state: PersistedState =
            serde_json::from_str(r#"{"play_mode":"Random"}"#).expect("parse");
        assert_eq!(state.play_mode, PlayMode::Random);
        assert_eq!(state.volume, 1.0);
    }
}
