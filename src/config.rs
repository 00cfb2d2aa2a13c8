use crate::model::PersistedState;
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "playseq";
const STATE_FILE: &str = "state.json";

pub fn config_root() -> Result<PathBuf> {
    if let Ok(override_dir) = env::var("PLAYSEQ_CONFIG_DIR") {
        return Ok(PathBuf::from(override_dir));
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .context("neither HOME nor USERPROFILE is set")?;
    Ok(PathBuf::from(home).join(".config").join(APP_DIR))
}

pub fn state_path() -> Result<PathBuf> {
    Ok(config_root()?.join(STATE_FILE))
}

pub fn load_state() -> Result<PersistedState> {
    load_state_from(&state_path()?)
}

pub fn save_state(state: &PersistedState) -> Result<()> {
    save_state_to(&state_path()?, state)
}

pub fn load_state_from(path: &Path) -> Result<PersistedState> {
    if !path.exists() {
        log::debug!("no saved state at {}, using defaults", path.display());
        return Ok(PersistedState::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let state: PersistedState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    Ok(state)
}

pub fn save_state_to(path: &Path, state: &PersistedState) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    log::debug!("saved state to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PlayMode;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        unsafe {
            env::set_var("PLAYSEQ_CONFIG_DIR", dir.path().to_string_lossy().as_ref());
        }

        let state = PersistedState {
            play_mode: PlayMode::SingleLoop,
            volume: 0.4,
        };
        save_state(&state).expect("save");
        let loaded = load_state().expect("load");
        assert_eq!(loaded.play_mode, PlayMode::SingleLoop);
        assert_eq!(loaded.volume, 0.4);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let loaded = load_state_from(&dir.path().join("absent.json")).expect("load");
        assert_eq!(loaded.play_mode, PlayMode::Sequential);
        assert_eq!(loaded.volume, 1.0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{ not json").expect("write");
        let err = load_state_from(&path).expect_err("should fail");
        assert!(format!("{err:#}").contains("failed to parse state file"));
    }

    #[test]
    fn save_creates_missing_directories() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join(STATE_FILE);
        save_state_to(&path, &PersistedState::default()).expect("save");
        assert!(path.exists());
    }
}
