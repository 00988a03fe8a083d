use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc::Sender,
    thread,
};

use crate::{data_loaders::config::ToolPaths, errors::MediaError, info, warn};

/// Container tag stamped on videos that went through `preprocess`.
pub const PREPROCESSED_TAG: &str = "preprocessed";

/// Finished background work, delivered to whoever drives the UI.
#[derive(Debug)]
pub enum JobEvent {
    Preprocessed {
        input: PathBuf,
        result: Result<PathBuf, MediaError>,
    },
}

#[derive(Debug, Clone)]
pub struct MediaTools {
    ffmpeg: String,
    ffprobe: String,
}

impl MediaTools {
    pub fn new(tools: &ToolPaths) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
        }
    }

    /// True when the file carries the preprocessing tag. Any probe failure
    /// counts as "not preprocessed".
    pub fn probe_preprocessed(&self, video: &Path) -> bool {
        let output = match Command::new(&self.ffprobe).args(probe_args(video)).output() {
            Ok(output) => output,
            Err(e) => {
                warn!("[MEDIA] Failed to run {}: {e}", self.ffprobe);
                return false;
            }
        };

        output.status.success() && is_preprocessed_tag(&String::from_utf8_lossy(&output.stdout))
    }

    /// Re-encodes `video` to HEVC next to the original and returns the new
    /// path.
    pub fn preprocess(&self, video: &Path) -> Result<PathBuf, MediaError> {
        if !video.is_file() {
            return Err(MediaError::MissingInput(video.display().to_string()));
        }

        let output = processed_output_path(video);
        info!(
            "[MEDIA] Preprocessing {} -> {}",
            video.display(),
            output.display()
        );

        let status = Command::new(&self.ffmpeg)
            .args(transcode_args(video, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|source| MediaError::Io {
                tool: self.ffmpeg.clone(),
                source,
            })?;

        if !status.success() {
            return Err(MediaError::Failed {
                tool: self.ffmpeg.clone(),
                status: status.to_string(),
            });
        }
        Ok(output)
    }

    /// Runs `preprocess` on a worker thread; the outcome arrives on `tx`.
    pub fn spawn_preprocess(&self, video: PathBuf, tx: Sender<JobEvent>) {
        let tools = self.clone();
        thread::spawn(move || {
            let result = tools.preprocess(&video);
            if let Err(e) = &result {
                warn!("[MEDIA] Preprocessing {} failed: {e}", video.display());
            }
            let _ = tx.send(JobEvent::Preprocessed {
                input: video,
                result,
            });
        });
    }
}

/// `clip.webm` → `clip_processed.mp4`, in the same directory.
pub fn processed_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    video.with_file_name(format!("{stem}_processed.mp4"))
}

pub fn probe_args(video: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        format!("format_tags={PREPROCESSED_TAG}"),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        video.display().to_string(),
    ]
}

pub fn transcode_args(input: &Path, output: &Path) -> Vec<String> {
    [
        "-y",
        "-hwaccel",
        "vulkan",
        "-init_hw_device",
        "vulkan=gpu:0",
        "-filter_hw_device",
        "gpu",
        "-i",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([input.display().to_string()])
    .chain(
        [
            "-c:v",
            "hevc_nvenc",
            "-preset",
            "p7",
            "-rc",
            "vbr",
            "-b:v",
            "5M",
            "-metadata",
        ]
        .iter()
        .map(|s| s.to_string()),
    )
    .chain([format!("{PREPROCESSED_TAG}=\"yes\"")])
    .chain(["-movflags".to_string(), "+use_metadata_tags".to_string()])
    .chain([output.display().to_string()])
    .collect()
}

/// The tag is written quoted, so ffprobe prints `"yes"`; accept the bare
/// form too.
fn is_preprocessed_tag(stdout: &str) -> bool {
    let value: String = stdout.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    matches!(value.trim(), "\"yes\"" | "yes")
}
