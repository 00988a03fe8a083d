use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
};

use crate::{
    data_loaders::settings::UserSettings,
    error, info,
    media::{JobEvent, MediaTools},
    store::StateStore,
    supervisor::{ResumeOutcome, SessionState, SessionSupervisor},
};

const HELP: &str = "\
commands:
  apply <video>        play <video> as wallpaper (replaces the current one)
  stop                 stop the current wallpaper
  resume               replay the last saved selection
  forget               stop and drop the saved selection
  status               show the tracked session
  monitors             list detected monitors
  settings             show playback settings
  set <key> <value>    change a setting: monitor (name or 'all'), vo, gpu_context, gpu_api, hwdec
  probe <video>        check whether <video> was preprocessed
  preprocess <video>   re-encode <video> in the background
  help                 show this text
  quit                 leave (the wallpaper keeps running)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Apply(String),
    Stop,
    Resume,
    Forget,
    Status,
    Monitors,
    Settings,
    Set { key: String, value: String },
    Probe(String),
    Preprocess(String),
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let needs_arg = |what: &str| -> Result<String, String> {
            if rest.is_empty() {
                Err(format!("'{verb}' needs {what}"))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match verb.to_lowercase().as_str() {
            "apply" | "play" => Self::Apply(needs_arg("a video path")?),
            "stop" => Self::Stop,
            "resume" => Self::Resume,
            "forget" | "clear" => Self::Forget,
            "status" => Self::Status,
            "monitors" => Self::Monitors,
            "settings" => Self::Settings,
            "set" => {
                let (key, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: set <key> <value>".to_string())?;
                Self::Set {
                    key: key.to_lowercase(),
                    value: value.trim().to_string(),
                }
            }
            "probe" => Self::Probe(needs_arg("a video path")?),
            "preprocess" => Self::Preprocess(needs_arg("a video path")?),
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command '{other}' (try 'help')")),
        };
        Ok(Some(command))
    }
}

/// Line-driven front end for interactive mode. Command failures are
/// reported and the loop carries on.
pub struct Console<'a> {
    store: &'a StateStore,
    supervisor: SessionSupervisor,
    media: MediaTools,
    jobs_tx: Sender<JobEvent>,
    jobs_rx: Receiver<JobEvent>,
}

impl<'a> Console<'a> {
    pub fn new(store: &'a StateStore, supervisor: SessionSupervisor, media: MediaTools) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        Self {
            store,
            supervisor,
            media,
            jobs_tx,
            jobs_rx,
        }
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> io::Result<()> {
        self.print_initial_state(out)?;

        let mut lines = input.lines();
        loop {
            self.drain_jobs(out)?;
            write!(out, "> ")?;
            out.flush()?;

            let Some(line) = lines.next() else {
                writeln!(out)?;
                return Ok(());
            };

            match ConsoleCommand::parse(&line?) {
                Ok(Some(ConsoleCommand::Quit)) => return Ok(()),
                Ok(Some(command)) => self.execute(command, out)?,
                Ok(None) => {}
                Err(msg) => writeln!(out, "{msg}")?,
            }
        }
    }

    fn print_initial_state<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let status = self.supervisor.status();
        match status.state {
            Some(state) if !state.video_path.is_empty() => writeln!(
                out,
                "last wallpaper: {} ({})",
                state.video_path,
                if state.is_playing { "playing" } else { "stopped" }
            ),
            _ => writeln!(out, "no saved wallpaper"),
        }
    }

    fn drain_jobs<W: Write>(&self, out: &mut W) -> io::Result<()> {
        while let Ok(event) = self.jobs_rx.try_recv() {
            match event {
                JobEvent::Preprocessed { input, result } => match result {
                    Ok(output) => writeln!(
                        out,
                        "preprocessed {} -> {}",
                        input.display(),
                        output.display()
                    )?,
                    Err(e) => writeln!(out, "preprocessing {} failed: {e}", input.display())?,
                },
            }
        }
        Ok(())
    }

    fn execute<W: Write>(&mut self, command: ConsoleCommand, out: &mut W) -> io::Result<()> {
        match command {
            ConsoleCommand::Apply(path) => {
                let video = match resolve_video(&path) {
                    Ok(video) => video,
                    Err(msg) => return writeln!(out, "{msg}"),
                };
                let settings = self.settings();
                match self.supervisor.apply_selection(&video, &settings) {
                    Ok(pids) => writeln!(
                        out,
                        "playing {video} ({} process(es): {pids:?})",
                        pids.len()
                    ),
                    Err(e) => {
                        error!("[CONSOLE] apply {video} failed: {e}");
                        writeln!(out, "apply failed: {e}")
                    }
                }
            }
            ConsoleCommand::Stop => {
                // Without a known video there is no selection to mark stopped.
                let result = match self.current_video().filter(|v| !v.is_empty()) {
                    Some(video) => self.supervisor.stop_selection(&video),
                    None => self.supervisor.recover().map(|_| ()),
                };
                match result {
                    Ok(()) => writeln!(out, "stopped"),
                    Err(e) => {
                        error!("[CONSOLE] stop failed: {e}");
                        writeln!(out, "stop failed: {e}")
                    }
                }
            }
            ConsoleCommand::Resume => {
                let settings = self.settings();
                match self.supervisor.resume_last(&settings) {
                    Ok(ResumeOutcome::Resumed {
                        video_path,
                        child_pids,
                    }) => writeln!(out, "playing {video_path} ({child_pids:?})"),
                    Ok(ResumeOutcome::Stopped { video_path }) => {
                        writeln!(out, "{video_path} was stopped; nothing started")
                    }
                    Ok(ResumeOutcome::NothingToResume) => writeln!(out, "nothing to resume"),
                    Err(e) => writeln!(out, "resume failed: {e}"),
                }
            }
            ConsoleCommand::Forget => match self.supervisor.clear_selection() {
                Ok(()) => writeln!(out, "saved selection cleared"),
                Err(e) => writeln!(out, "forget failed: {e}"),
            },
            ConsoleCommand::Status => self.print_status(out),
            ConsoleCommand::Monitors => match self.supervisor.monitors() {
                Ok(monitors) if monitors.is_empty() => writeln!(out, "no monitors detected"),
                Ok(monitors) => {
                    for m in monitors {
                        writeln!(
                            out,
                            "{}{}  {}",
                            m.name,
                            if m.primary { " (primary)" } else { "" },
                            m.geometry()
                        )?;
                    }
                    Ok(())
                }
                Err(e) => writeln!(out, "{e}"),
            },
            ConsoleCommand::Settings => {
                let s = self.settings();
                let target = if s.play_all_monitors {
                    "all".to_string()
                } else {
                    s.selected_monitor.clone()
                };
                writeln!(
                    out,
                    "monitor={target} vo={} gpu_context={} gpu_api={} hwdec={}",
                    s.video_output, s.gpu_context, s.gpu_api, s.hwdec
                )
            }
            ConsoleCommand::Set { key, value } => {
                let mut settings = self.settings();
                if let Err(msg) = apply_setting(&mut settings, &key, &value) {
                    return writeln!(out, "{msg}");
                }
                match settings.save(&self.store.settings_file()) {
                    Ok(()) => {
                        info!("[CONSOLE] Setting {key}={value} saved");
                        writeln!(out, "{key} = {value}")
                    }
                    Err(e) => writeln!(out, "failed to save settings: {e}"),
                }
            }
            ConsoleCommand::Probe(path) => {
                let answer = if self.media.probe_preprocessed(Path::new(&path)) {
                    "preprocessed"
                } else {
                    "not preprocessed"
                };
                writeln!(out, "{path}: {answer}")
            }
            ConsoleCommand::Preprocess(path) => {
                self.media
                    .spawn_preprocess(PathBuf::from(&path), self.jobs_tx.clone());
                writeln!(out, "preprocessing {path} in the background")
            }
            ConsoleCommand::Help => writeln!(out, "{HELP}"),
            ConsoleCommand::Quit => Ok(()),
        }
    }

    fn print_status<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let status = self.supervisor.status();
        match &status.session {
            SessionState::Idle => writeln!(out, "session: idle")?,
            SessionState::Active { video_path, .. } => {
                writeln!(out, "session: active ({video_path})")?
            }
        }
        match status.record {
            Some(record) => writeln!(
                out,
                "tracked pids: {:?} (recorded in {})",
                record.child_pids,
                status.record_path.display()
            )?,
            None => writeln!(out, "tracked pids: none")?,
        }
        match status.state {
            Some(state) => writeln!(
                out,
                "saved selection: {} ({})",
                state.video_path,
                if state.is_playing { "playing" } else { "stopped" }
            ),
            None => writeln!(out, "saved selection: none ({})", status.state_path.display()),
        }
    }

    fn settings(&self) -> UserSettings {
        UserSettings::load(&self.store.settings_file())
    }

    fn current_video(&self) -> Option<String> {
        match self.supervisor.session() {
            SessionState::Active { video_path, .. } => Some(video_path.clone()),
            SessionState::Idle => self.supervisor.status().state.map(|s| s.video_path),
        }
    }
}

/// Absolute path of an existing video file.
fn resolve_video(path: &str) -> Result<String, String> {
    let canonical = fs::canonicalize(path).map_err(|e| format!("cannot open {path}: {e}"))?;
    if !canonical.is_file() {
        return Err(format!("{path} is not a file"));
    }
    Ok(canonical.to_string_lossy().into_owned())
}

fn apply_setting(settings: &mut UserSettings, key: &str, value: &str) -> Result<(), String> {
    match key {
        "monitor" => {
            if value.eq_ignore_ascii_case("all") {
                settings.play_all_monitors = true;
            } else {
                settings.play_all_monitors = false;
                settings.selected_monitor = value.to_string();
            }
        }
        "vo" => settings.video_output = value.to_string(),
        "gpu_context" => settings.gpu_context = value.to_string(),
        "gpu_api" => settings.gpu_api = value.to_string(),
        "hwdec" => settings.hwdec = value.to_string(),
        other => return Err(format!("unknown setting '{other}'")),
    }
    Ok(())
}
