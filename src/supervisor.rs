use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

use nix::unistd::getuid;

use crate::{
    data_loaders::{
        config::{AppConfig, ToolPaths},
        settings::UserSettings,
    },
    error,
    errors::{LaunchError, SupervisorError},
    info,
    launcher::{DetachedSpawner, ProcessSpawner, WallpaperLauncher},
    monitors::{MonitorEnumerator, MonitorSpec, XrandrMonitors},
    process_registry::{ProcessRecord, ProcessRegistry},
    store::StateStore,
    wallpaper_state::{WallpaperSessionState, WallpaperState},
    warn,
};

/// Looks processes up by executable name in the process table.
pub trait ProcessScanner {
    fn find_by_name(&self, name: &str) -> io::Result<Vec<i32>>;
}

/// `pgrep -x -u <uid> <name>`, restricted to the current user's processes.
pub struct PgrepScanner {
    program: String,
}

impl PgrepScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ProcessScanner for PgrepScanner {
    fn find_by_name(&self, name: &str) -> io::Result<Vec<i32>> {
        let output = Command::new(&self.program)
            .args(["-x", "-u", &getuid().as_raw().to_string(), name])
            .output()?;

        // pgrep exits 1 when nothing matched.
        match output.status.code() {
            Some(0) => Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout))),
            Some(1) => Ok(Vec::new()),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )),
        }
    }
}

fn to_pids(spawned: &[u32]) -> Vec<i32> {
    spawned.iter().filter_map(|&p| i32::try_from(p).ok()).collect()
}

fn parse_pid_lines(stdout: &str) -> Vec<i32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// The OS-facing pieces the supervisor drives.
pub struct Backends {
    pub monitors: Box<dyn MonitorEnumerator>,
    pub spawner: Box<dyn ProcessSpawner>,
    pub scanner: Box<dyn ProcessScanner>,
}

impl Backends {
    pub fn system(tools: &ToolPaths) -> Self {
        Self {
            monitors: Box::new(XrandrMonitors::new(tools.xrandr.clone())),
            spawner: Box::new(DetachedSpawner::default()),
            scanner: Box::new(PgrepScanner::new(tools.pgrep.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active {
        video_path: String,
        child_pids: Vec<i32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed { video_path: String, child_pids: Vec<i32> },
    Stopped { video_path: String },
    NothingToResume,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session: SessionState,
    pub record: Option<ProcessRecord>,
    pub record_path: PathBuf,
    pub state: Option<WallpaperState>,
    pub state_path: PathBuf,
}

/// Owns the transition between wallpaper sessions. Every transition takes
/// `&mut self`, so one supervisor never runs two of them at once.
pub struct SessionSupervisor {
    registry: ProcessRegistry,
    state: WallpaperSessionState,
    backends: Backends,
    tools: ToolPaths,
    discovery_delay: Duration,
    session: SessionState,
}

impl SessionSupervisor {
    pub fn new(store: &StateStore, config: &AppConfig) -> Self {
        Self::with_parts(
            ProcessRegistry::new(store.pid_file()),
            WallpaperSessionState::new(store.state_file()),
            Backends::system(&config.tools),
            config.tools.clone(),
            config.supervisor.discovery_delay(),
        )
    }

    pub fn with_parts(
        registry: ProcessRegistry,
        state: WallpaperSessionState,
        backends: Backends,
        tools: ToolPaths,
        discovery_delay: Duration,
    ) -> Self {
        // Take over whatever a previous instance left behind.
        let session = match (registry.load(), state.load()) {
            (Some(record), Some(saved)) if saved.is_playing => SessionState::Active {
                video_path: saved.video_path,
                child_pids: record.child_pids,
            },
            _ => SessionState::Idle,
        };

        Self {
            registry,
            state,
            backends,
            tools,
            discovery_delay,
            session,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn monitors(&self) -> Result<Vec<MonitorSpec>, LaunchError> {
        self.backends.monitors.monitors()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session: self.session.clone(),
            record: self.registry.load(),
            record_path: self.registry.path().to_path_buf(),
            state: self.state.load(),
            state_path: self.state.path().to_path_buf(),
        }
    }

    /// Replaces whatever is running with `video_path` on the monitors
    /// chosen in `settings`. Returns the recorded embedding pids.
    pub fn apply_selection(
        &mut self,
        video_path: &str,
        settings: &UserSettings,
    ) -> Result<Vec<i32>, SupervisorError> {
        // Unconditional: the record may come from an instance that crashed.
        self.registry.kill_all()?;
        self.session = SessionState::Idle;

        let config = settings.to_launch_config(video_path);
        let launcher = WallpaperLauncher::new(
            self.backends.monitors.as_ref(),
            self.backends.spawner.as_ref(),
            &self.tools,
        );

        let launched = match launcher.launch(&config) {
            Ok(pids) => pids,
            Err(LaunchError::Spawn {
                monitor,
                spawned,
                source,
            }) => {
                let killed = self.kill_partial_launch(&spawned);
                error!(
                    "[SUPERVISOR] Launch failed on '{}', killed {} sibling(s): {}",
                    monitor, killed, source
                );
                return Err(LaunchError::Spawn {
                    monitor,
                    spawned,
                    source,
                }
                .into());
            }
            Err(e) => {
                error!("[SUPERVISOR] Launch aborted: {e}");
                return Err(e.into());
            }
        };

        let child_pids = self.discover(&launched);

        self.registry.save(0, &child_pids)?;
        self.state.save(video_path, true)?;
        self.session = SessionState::Active {
            video_path: video_path.to_string(),
            child_pids: child_pids.clone(),
        };

        info!(
            "[SUPERVISOR] Session active: video='{}' pids={:?}",
            video_path, child_pids
        );
        Ok(child_pids)
    }

    /// Kills what a launch that failed halfway left running: the spawned
    /// siblings, then whatever they forked, found the same way `discover`
    /// finds a healthy session.
    fn kill_partial_launch(&self, spawned: &[u32]) -> usize {
        if spawned.is_empty() {
            return 0;
        }

        let siblings = to_pids(spawned);
        let mut killed = self.registry.kill_untracked(&siblings);
        let forked: Vec<i32> = self
            .discover(spawned)
            .into_iter()
            .filter(|pid| !siblings.contains(pid))
            .collect();
        killed += self.registry.kill_untracked(&forked);
        self.backends.spawner.reap();
        killed
    }

    /// xwinwrap may fork before settling, so the pids handed back by the
    /// spawn are not necessarily the ones to kill later. Wait, then ask the
    /// process table by name.
    fn discover(&self, launched: &[u32]) -> Vec<i32> {
        thread::sleep(self.discovery_delay);
        // Exited or killed children of ours would still match by name.
        self.backends.spawner.reap();

        // The process table knows the executable name, not the configured path.
        let name = Path::new(&self.tools.xwinwrap)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.tools.xwinwrap.clone());

        match self.backends.scanner.find_by_name(&name) {
            Ok(found) => {
                if found.is_empty() {
                    warn!(
                        "[SUPERVISOR] No '{}' process found {}ms after launch",
                        name,
                        self.discovery_delay.as_millis()
                    );
                }
                info!(
                    "[SUPERVISOR] Discovered pids {:?} (spawned {:?})",
                    found, launched
                );
                found
            }
            Err(e) => {
                warn!("[SUPERVISOR] Process scan failed ({e}); tracking spawned pids instead");
                to_pids(launched)
            }
        }
    }

    pub fn stop_selection(&mut self, video_path: &str) -> Result<(), SupervisorError> {
        self.registry.kill_all()?;
        self.state.save(video_path, false)?;
        self.session = SessionState::Idle;
        info!("[SUPERVISOR] Session stopped: video='{}'", video_path);
        Ok(())
    }

    /// Brings the system to Idle no matter which instance recorded the
    /// current processes.
    pub fn recover(&mut self) -> Result<usize, SupervisorError> {
        let killed = self.registry.kill_all()?;
        self.session = SessionState::Idle;
        Ok(killed)
    }

    /// Stops the session and forgets the saved selection entirely.
    pub fn clear_selection(&mut self) -> Result<(), SupervisorError> {
        self.registry.kill_all()?;
        self.state.clear()?;
        self.session = SessionState::Idle;
        Ok(())
    }

    /// Re-applies the last saved selection if it was playing.
    pub fn resume_last(
        &mut self,
        settings: &UserSettings,
    ) -> Result<ResumeOutcome, SupervisorError> {
        let Some(saved) = self.state.load().filter(|s| !s.video_path.is_empty()) else {
            self.recover()?;
            return Ok(ResumeOutcome::NothingToResume);
        };

        if !saved.is_playing {
            self.recover()?;
            return Ok(ResumeOutcome::Stopped {
                video_path: saved.video_path,
            });
        }

        let child_pids = self.apply_selection(&saved.video_path, settings)?;
        Ok(ResumeOutcome::Resumed {
            video_path: saved.video_path,
            child_pids,
        })
    }
}
