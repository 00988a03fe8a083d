use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
        OnceLock,
    },
    thread,
};

/* =========================
   GLOBAL STATE
   ========================= */

static ENABLED: AtomicBool = AtomicBool::new(false);
static ECHO: AtomicBool = AtomicBool::new(false);
static LOG_TX: OnceLock<Sender<String>> = OnceLock::new();
static LOG_LEVEL: OnceLock<String> = OnceLock::new();

/* =========================
   PUBLIC API
   ========================= */

/// Starts the writer thread. Messages logged before this call are dropped.
pub fn init(path: PathBuf, debug: bool, level: &str, echo: bool) {
    if LOG_TX.get().is_some() {
        return;
    }

    ENABLED.store(debug || is_verbose_level(level), Ordering::Relaxed);
    ECHO.store(echo, Ordering::Relaxed);
    let _ = LOG_LEVEL.set(level.to_lowercase());

    let (tx, rx) = mpsc::channel::<String>();
    if LOG_TX.set(tx).is_err() {
        return;
    }

    thread::spawn(move || {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path).ok();

        while let Ok(line) = rx.recv() {
            if let Some(file) = file.as_mut() {
                let _ = writeln!(file, "{line}");
                let _ = file.flush();
            }
        }
    });
}

#[inline]
pub fn should_log(level: &str) -> bool {
    if !ENABLED.load(Ordering::Relaxed) {
        return level == "WARN" || level == "ERROR";
    }
    true
}

/* =========================
   INTERNAL
   ========================= */

#[inline]
pub fn enqueue(level: &str, msg: String) {
    if let Some(tx) = LOG_TX.get() {
        let line = format!("{} [{level}] {msg}", timestamp());
        if ECHO.load(Ordering::Relaxed) {
            eprintln!("{line}");
        }
        let _ = tx.send(line);
    }
}

fn is_verbose_level(level: &str) -> bool {
    matches!(level.to_lowercase().as_str(), "info" | "debug" | "trace")
}

fn timestamp() -> String {
    let now = chrono::Local::now();
    now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/* =========================
   MACROS
   ========================= */

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if $crate::logging::should_log("INFO") {
            $crate::logging::enqueue(
                "INFO",
                format!($($arg)*)
            );
        }
    }};
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "WARN",
            format!($($arg)*)
        );
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        $crate::logging::enqueue(
            "ERROR",
            format!($($arg)*)
        );
    }};
}
