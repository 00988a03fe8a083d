mod console;
mod data_loaders;
mod errors;
mod launcher;
mod logging;
mod media;
mod monitors;
mod paths;
mod process_registry;
mod store;
mod supervisor;
mod wallpaper_state;

use std::{
    io,
    path::PathBuf,
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use clap::Parser;
use nix::{
    libc,
    sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal},
};

use crate::{
    console::Console,
    data_loaders::{
        config::{scaffold_config_yaml, AppConfig},
        settings::UserSettings,
    },
    media::MediaTools,
    store::StateStore,
    supervisor::{ResumeOutcome, SessionSupervisor},
};

pub const DEBUG_NAME: &str = "LIVEWALL";

static SHOULD_QUIT: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "livewall")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play a looping video as the desktop wallpaper", long_about = None)]
struct Cli {
    /// Re-apply the last saved wallpaper without the interactive console, then idle
    #[arg(long)]
    headless: bool,

    /// Directory holding state.json, settings.json, config.yaml and the log
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Directory holding the PID record of the running session
    #[arg(long, value_name = "DIR")]
    runtime_dir: Option<PathBuf>,
}

impl Cli {
    fn store(&self) -> StateStore {
        let defaults = StateStore::for_current_user();
        StateStore::new(
            self.runtime_dir
                .clone()
                .unwrap_or_else(|| defaults.runtime_dir().to_path_buf()),
            self.config_dir
                .clone()
                .unwrap_or_else(|| defaults.config_dir().to_path_buf()),
        )
    }
}

extern "C" fn quit_handler(_sig: libc::c_int) {
    SHOULD_QUIT.store(true, Ordering::SeqCst);
}

fn install_quit_handlers() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(quit_handler),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}

fn run_headless(store: &StateStore, config: &AppConfig) -> ExitCode {
    let settings = UserSettings::load(&store.settings_file());
    let mut supervisor = SessionSupervisor::new(store, config);

    match supervisor.resume_last(&settings) {
        Ok(ResumeOutcome::Resumed {
            video_path,
            child_pids,
        }) => {
            info!(
                "[{}] Headless: playing {} with pids {:?}",
                DEBUG_NAME, video_path, child_pids
            );
        }
        Ok(ResumeOutcome::Stopped { video_path }) => {
            eprintln!("livewall: last wallpaper {video_path} is stopped; nothing to play");
            return ExitCode::SUCCESS;
        }
        Ok(ResumeOutcome::NothingToResume) => {
            eprintln!(
                "livewall: no saved wallpaper in {}; pick one in interactive mode first",
                store.state_file().display()
            );
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("[{}] Headless launch failed: {e}", DEBUG_NAME);
            eprintln!("livewall: {e}");
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = install_quit_handlers() {
        warn!("[{}] Failed to install signal handlers: {e}", DEBUG_NAME);
    }

    // The players run on their own; this process only keeps the session
    // "owned" until asked to leave.
    let tick = config.supervisor.headless_tick();
    while !SHOULD_QUIT.load(Ordering::SeqCst) {
        thread::sleep(tick);
    }

    info!("[{}] Headless mode terminated", DEBUG_NAME);
    ExitCode::SUCCESS
}

fn run_interactive(store: &StateStore, config: &AppConfig) -> ExitCode {
    let supervisor = SessionSupervisor::new(store, config);
    let mut console = Console::new(store, supervisor, MediaTools::new(&config.tools));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match console.run(stdin.lock(), &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[{}] Console I/O failed: {e}", DEBUG_NAME);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let store = cli.store();

    let config_path = store.config_file();
    scaffold_config_yaml(&config_path);
    let config = AppConfig::load_or_default(&config_path);

    logging::init(store.log_file(), config.debug, &config.log_level, cli.headless);
    std::panic::set_hook(Box::new(|panic_info| {
        error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
    }));

    info!("!---------- [{}] Starting ----------!", DEBUG_NAME);
    info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

    if cli.headless {
        run_headless(&store, &config)
    } else {
        run_interactive(&store, &config)
    }
}
