use std::path::PathBuf;

use nix::unistd::getuid;

use crate::warn;

pub const APP_DIR_NAME: &str = "MyLiveWall";

pub fn user_home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

/// Per-user runtime directory, where the PID record lives.
/// `$XDG_RUNTIME_DIR` when set, otherwise `/run/user/<uid>`.
pub fn user_runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_RUNTIME_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }

    PathBuf::from(format!("/run/user/{}", getuid().as_raw()))
}

/// Per-user config directory: `~/.config/MyLiveWall/`.
/// State, settings, config.yaml and the log file live here.
pub fn user_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join(APP_DIR_NAME);
    }

    if let Some(home) = user_home_dir() {
        return home.join(".config").join(APP_DIR_NAME);
    }

    warn!("Could not resolve home directory, falling back to working directory");
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
