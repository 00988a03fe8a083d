use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("monitor '{0}' not found")]
    MonitorNotFound(String),
    #[error("no monitors detected")]
    NoMonitors,
    #[error("failed to enumerate monitors: {0}")]
    MonitorQuery(String),
    #[error("failed to spawn wallpaper process for monitor '{monitor}': {source}")]
    Spawn {
        monitor: String,
        /// Processes already started for earlier monitors in the same launch.
        spawned: Vec<u32>,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("failed to persist session: {0}")]
    Persist(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to run {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with {status}")]
    Failed { tool: String, status: String },
    #[error("input video not found: {0}")]
    MissingInput(String),
}
