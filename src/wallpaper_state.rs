use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    store::{remove_if_exists, write_atomic},
    warn,
};

/// What the user last asked for. Says nothing about whether the player
/// processes are actually alive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallpaperState {
    pub video_path: String,
    #[serde(default)]
    pub is_playing: bool,
}

pub struct WallpaperSessionState {
    path: PathBuf,
}

impl WallpaperSessionState {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, video_path: &str, is_playing: bool) -> io::Result<()> {
        let state = WallpaperState {
            video_path: video_path.to_string(),
            is_playing,
        };
        let body = serde_json::to_vec(&state).map_err(io::Error::from)?;
        write_atomic(&self.path, &body)
    }

    pub fn load(&self) -> Option<WallpaperState> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("[STATE] Failed to read {}: {e}", self.path.display());
                return None;
            }
        };

        serde_json::from_str(&txt)
            .map_err(|e| warn!("[STATE] Ignoring malformed state {}: {e}", self.path.display()))
            .ok()
    }

    pub fn clear(&self) -> io::Result<()> {
        remove_if_exists(&self.path)
    }
}
