use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::{launcher::LaunchConfig, store::write_atomic, warn};

/// The user's playback options, `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    pub play_all_monitors: bool,
    pub selected_monitor: String,
    #[serde(rename = "vo")]
    pub video_output: String,
    pub gpu_context: String,
    pub gpu_api: String,
    pub hwdec: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            play_all_monitors: true,
            selected_monitor: String::new(),
            video_output: "gpu".to_string(),
            gpu_context: "auto".to_string(),
            gpu_api: "auto".to_string(),
            hwdec: "auto".to_string(),
        }
    }
}

impl UserSettings {
    /// Never fails: a missing or unreadable file yields the defaults, and
    /// missing keys take their individual default.
    pub fn load(path: &Path) -> Self {
        let txt = match fs::read_to_string(path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("[SETTINGS] Failed to read {}: {e}", path.display());
                return Self::default();
            }
        };

        serde_json::from_str(&txt).unwrap_or_else(|e| {
            warn!("[SETTINGS] Failed to parse {}: {e}; using defaults", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(self).map_err(io::Error::from)?;
        write_atomic(path, &body)
    }

    pub fn to_launch_config(&self, video_path: &str) -> LaunchConfig {
        LaunchConfig {
            video_output: self.video_output.clone(),
            gpu_context: self.gpu_context.clone(),
            gpu_api: self.gpu_api.clone(),
            hwdec: self.hwdec.clone(),
            play_all_monitors: self.play_all_monitors,
            selected_monitor: self.selected_monitor.clone(),
            video_path: video_path.to_string(),
        }
    }
}
