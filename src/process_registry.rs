use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use serde::{Deserialize, Serialize};

use crate::{
    info,
    store::{remove_if_exists, write_atomic},
    warn,
};

/// The processes that make up the current wallpaper session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(default)]
    pub main_pid: i32,
    #[serde(default)]
    pub child_pids: Vec<i32>,
    #[serde(default)]
    pub timestamp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    NoSuchProcess,
}

/// Delivers the forceful termination signal. Split out so teardown order
/// can be observed without killing anything real.
pub trait Signaller {
    fn kill(&self, pid: i32) -> io::Result<SignalOutcome>;
}

pub struct SigkillSignaller;

impl Signaller for SigkillSignaller {
    fn kill(&self, pid: i32) -> io::Result<SignalOutcome> {
        match signal::kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => Ok(SignalOutcome::Delivered),
            Err(Errno::ESRCH) => Ok(SignalOutcome::NoSuchProcess),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

pub struct ProcessRegistry {
    path: PathBuf,
    signaller: Box<dyn Signaller>,
}

impl ProcessRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self::with_signaller(path, Box::new(SigkillSignaller))
    }

    pub fn with_signaller(path: PathBuf, signaller: Box<dyn Signaller>) -> Self {
        Self { path, signaller }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the record. Only filesystem errors reach the caller.
    pub fn save(&self, main_pid: i32, child_pids: &[i32]) -> io::Result<()> {
        let record = ProcessRecord {
            main_pid,
            child_pids: child_pids.to_vec(),
            timestamp: unix_now(),
        };

        let body = serde_json::to_vec(&record).map_err(io::Error::from)?;
        write_atomic(&self.path, &body)?;

        info!(
            "[PIDS] Saved main_pid={} child_pids={:?} to {}",
            record.main_pid,
            record.child_pids,
            self.path.display()
        );
        Ok(())
    }

    /// `None` when no session is recorded, including when the file is
    /// unreadable or not a valid record.
    pub fn load(&self) -> Option<ProcessRecord> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("[PIDS] Failed to read {}: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str::<ProcessRecord>(&txt) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("[PIDS] Ignoring malformed record {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Tears down the recorded session: children first, then the main pid,
    /// then the record itself. Returns how many processes were signalled.
    pub fn kill_all(&self) -> io::Result<usize> {
        let Some(record) = self.load() else {
            // A malformed file still has to go, or it would linger forever.
            if self.path.exists() {
                remove_if_exists(&self.path)?;
            }
            return Ok(0);
        };

        let mut signalled = 0;
        for &pid in &record.child_pids {
            if self.terminate(pid) {
                signalled += 1;
            }
        }

        if record.main_pid != 0 && self.terminate(record.main_pid) {
            signalled += 1;
        }

        remove_if_exists(&self.path)?;
        info!(
            "[PIDS] Killed {} of {} recorded process(es)",
            signalled,
            record.child_pids.len() + usize::from(record.main_pid != 0)
        );
        Ok(signalled)
    }

    /// Kills processes that never made it into the record, such as the
    /// siblings of a launch that failed halfway.
    pub fn kill_untracked(&self, pids: &[i32]) -> usize {
        pids.iter().filter(|&&pid| self.terminate(pid)).count()
    }

    fn terminate(&self, pid: i32) -> bool {
        // 0 and negative ids address process groups, never a single child.
        if pid <= 0 {
            warn!("[PIDS] Skipping invalid pid {pid}");
            return false;
        }

        match self.signaller.kill(pid) {
            Ok(SignalOutcome::Delivered) => true,
            Ok(SignalOutcome::NoSuchProcess) => false,
            Err(e) => {
                warn!("[PIDS] Failed to kill pid {pid}: {e}");
                false
            }
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
    };

    use super::*;

    /// Records every signal; pids in `alive` report delivery, others ESRCH.
    #[derive(Clone, Default)]
    struct RecordingSignaller {
        sent: Arc<Mutex<Vec<i32>>>,
        alive: Arc<Mutex<HashSet<i32>>>,
    }

    impl RecordingSignaller {
        fn sent(&self) -> Vec<i32> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Signaller for RecordingSignaller {
        fn kill(&self, pid: i32) -> io::Result<SignalOutcome> {
            self.sent.lock().unwrap().push(pid);
            if self.alive.lock().unwrap().remove(&pid) {
                Ok(SignalOutcome::Delivered)
            } else {
                Ok(SignalOutcome::NoSuchProcess)
            }
        }
    }

    fn registry_in(dir: &Path) -> (ProcessRegistry, RecordingSignaller) {
        let signaller = RecordingSignaller::default();
        let registry = ProcessRegistry::with_signaller(
            dir.join("run").join("pids.json"),
            Box::new(signaller.clone()),
        );
        (registry, signaller)
    }

    #[test]
    fn save_then_load_preserves_ids_and_order() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, _) = registry_in(temp.path());

        registry.save(4242, &[30, 10, 20]).expect("save");
        let record = registry.load().expect("record present");

        assert_eq!(record.main_pid, 4242);
        assert_eq!(record.child_pids, vec![30, 10, 20]);
        assert!(record.timestamp > 0.0);
    }

    #[test]
    fn saved_document_uses_the_documented_keys() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, _) = registry_in(temp.path());

        registry.save(0, &[7]).expect("save");
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(registry.path()).unwrap()).unwrap();

        assert_eq!(raw["main_pid"], 0);
        assert_eq!(raw["child_pids"], serde_json::json!([7]));
        assert!(raw["timestamp"].is_f64());
    }

    #[test]
    fn load_missing_file_is_absent() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, _) = registry_in(temp.path());

        assert!(registry.load().is_none());
    }

    #[test]
    fn load_invalid_json_is_absent() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, _) = registry_in(temp.path());
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        fs::write(registry.path(), "{ not json").unwrap();

        assert!(registry.load().is_none());
    }

    #[test]
    fn kill_all_without_record_is_a_noop() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, signaller) = registry_in(temp.path());

        assert_eq!(registry.kill_all().expect("kill_all"), 0);
        assert!(signaller.sent().is_empty());
        assert!(!registry.path().exists());
        assert!(!registry.path().parent().unwrap().exists());
    }

    #[test]
    fn kill_all_signals_children_before_main_and_removes_record() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, signaller) = registry_in(temp.path());
        signaller.alive.lock().unwrap().extend([11, 12, 99]);

        registry.save(99, &[11, 12, 13]).expect("save");
        let signalled = registry.kill_all().expect("kill_all");

        assert_eq!(signaller.sent(), vec![11, 12, 13, 99]);
        // 13 was already gone and is not counted.
        assert_eq!(signalled, 3);
        assert!(!registry.path().exists());
    }

    #[test]
    fn kill_all_skips_unused_main_pid() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, signaller) = registry_in(temp.path());

        registry.save(0, &[5, 6]).expect("save");
        registry.kill_all().expect("kill_all");

        assert_eq!(signaller.sent(), vec![5, 6]);
    }

    #[test]
    fn kill_all_removes_malformed_record_without_signalling() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, signaller) = registry_in(temp.path());
        fs::create_dir_all(registry.path().parent().unwrap()).unwrap();
        fs::write(registry.path(), "garbage").unwrap();

        assert_eq!(registry.kill_all().expect("kill_all"), 0);
        assert!(signaller.sent().is_empty());
        assert!(!registry.path().exists());
    }

    #[test]
    fn kill_all_never_signals_group_ids() {
        let temp = tempfile::tempdir().expect("create tempdir");
        let (registry, signaller) = registry_in(temp.path());

        registry.save(-1, &[0, -5, 8]).expect("save");
        registry.kill_all().expect("kill_all");

        assert_eq!(signaller.sent(), vec![8]);
    }

    #[test]
    fn sigkill_signaller_reports_missing_process() {
        // pid_max on Linux never reaches i32::MAX.
        let outcome = SigkillSignaller.kill(i32::MAX).expect("kill");
        assert_eq!(outcome, SignalOutcome::NoSuchProcess);
    }
}
