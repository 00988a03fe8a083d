use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::paths::{user_config_dir, user_runtime_dir};

const PID_FILE_NAME: &str = "live_wallpaper_pids.json";
const STATE_FILE_NAME: &str = "state.json";
const SETTINGS_FILE_NAME: &str = "settings.json";
const CONFIG_FILE_NAME: &str = "config.yaml";
const LOG_FILE_NAME: &str = "livewall.log";

/// Owns every path the program persists to. Nothing else in the crate
/// builds per-user paths on its own.
#[derive(Debug, Clone)]
pub struct StateStore {
    runtime_dir: PathBuf,
    config_dir: PathBuf,
}

impl StateStore {
    pub fn new(runtime_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            runtime_dir,
            config_dir,
        }
    }

    pub fn for_current_user() -> Self {
        Self::new(user_runtime_dir(), user_config_dir())
    }

    /// Isolated layout below a single root: `<root>/run` and `<root>/config`.
    #[cfg(test)]
    pub fn with_root(root: &Path) -> Self {
        Self::new(root.join("run"), root.join("config"))
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn pid_file(&self) -> PathBuf {
        self.runtime_dir.join(PID_FILE_NAME)
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir.join(STATE_FILE_NAME)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE_NAME)
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.config_dir.join(LOG_FILE_NAME)
    }
}

/// `create_dir_all` that tolerates another process creating the same
/// directory at the same time.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    match fs::create_dir_all(parent) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && parent.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Writes to a sibling temp file and renames it over `path`, so readers
/// only ever see the old or the new document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;

    let mut tmp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, contents)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Deletes `path`; a file that is already gone is not an error.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
