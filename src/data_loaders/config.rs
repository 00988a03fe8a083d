use std::{fs, path::Path, time::Duration};

use serde_yaml::{Mapping, Value};

use super::yaml::load_yaml;
use crate::{info, warn};

/// Tuning for the program itself, read from `config.yaml`. The user's
/// playback options live in `settings.json` instead.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub debug: bool,
    pub log_level: String,
    pub supervisor: SupervisorSettings,
    pub tools: ToolPaths,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub discovery_delay_ms: u64,
    pub headless_tick_ms: u64,
}

/// Executables the supervisor runs. Plain names are looked up on `PATH`.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub xwinwrap: String,
    pub mpv: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub xrandr: String,
    pub pgrep: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "warn".to_string(),
            supervisor: SupervisorSettings::default(),
            tools: ToolPaths::default(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            discovery_delay_ms: 1000,
            headless_tick_ms: 1000,
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            xwinwrap: "xwinwrap".to_string(),
            mpv: "mpv".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            xrandr: "xrandr".to_string(),
            pgrep: "pgrep".to_string(),
        }
    }
}

impl SupervisorSettings {
    pub fn discovery_delay(&self) -> Duration {
        Duration::from_millis(self.discovery_delay_ms)
    }

    pub fn headless_tick(&self) -> Duration {
        Duration::from_millis(self.headless_tick_ms)
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Option<Self> {
        let value = load_yaml(path)?;
        Self::from_yaml(&value)
    }

    /// Loads `path`, falling back to defaults when it is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn from_yaml(root: &Value) -> Option<Self> {
        let map = root.as_mapping()?;
        let mut config = Self::default();

        config.debug = bool_at(map, "debug").unwrap_or(config.debug);
        config.log_level = str_any(map, &["log_level", "logging"])
            .unwrap_or(&config.log_level)
            .to_lowercase();

        if let Some(supervisor) = mapping_at(map, "supervisor") {
            config.supervisor.discovery_delay_ms =
                u64_any(supervisor, &["discovery_delay_ms", "discovery_delay", "delay_ms"])
                    .unwrap_or(config.supervisor.discovery_delay_ms)
                    .max(100);
            config.supervisor.headless_tick_ms =
                u64_any(supervisor, &["headless_tick_ms", "tick_ms"])
                    .unwrap_or(config.supervisor.headless_tick_ms)
                    .max(100);
        }

        if let Some(tools) = mapping_at(map, "tools") {
            let t = &mut config.tools;
            for (key, slot) in [
                ("xwinwrap", &mut t.xwinwrap),
                ("mpv", &mut t.mpv),
                ("ffmpeg", &mut t.ffmpeg),
                ("ffprobe", &mut t.ffprobe),
                ("xrandr", &mut t.xrandr),
                ("pgrep", &mut t.pgrep),
            ] {
                if let Some(value) = str_at(tools, key).map(str::trim).filter(|v| !v.is_empty()) {
                    *slot = value.to_string();
                }
            }
        }

        Some(config)
    }
}

/// Writes the default `config.yaml` if none exists yet.
pub fn scaffold_config_yaml(path: &Path) {
    if path.exists() {
        return;
    }

    let content = r#"debug: false
log_level: warn

supervisor:
  # How long to wait after launching before scanning for xwinwrap processes.
  discovery_delay_ms: 1000
  headless_tick_ms: 1000

tools:
  xwinwrap: xwinwrap
  mpv: mpv
  ffmpeg: ffmpeg
  ffprobe: ffprobe
  xrandr: xrandr
  pgrep: pgrep
"#;
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match fs::write(path, content) {
        Ok(_) => info!("[CONFIG] Created {}", path.display()),
        Err(e) => warn!("[CONFIG] Failed to create {}: {e}", path.display()),
    }
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn mapping_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a Mapping> {
    map.get(Value::String(key.to_string()))?.as_mapping()
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?
        .as_i64()
        .and_then(|v| if v >= 0 { Some(v as u64) } else { None })
}

fn u64_any(map: &Mapping, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| u64_at(map, k))
}
