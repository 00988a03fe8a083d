use std::{
    io,
    process::{Child, Command, Stdio},
    sync::Mutex,
};

use crate::{
    data_loaders::config::ToolPaths,
    errors::LaunchError,
    info,
    monitors::{MonitorEnumerator, MonitorSpec},
};

/// Everything one launch needs. Backend strings are handed to mpv as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub video_output: String,
    pub gpu_context: String,
    pub gpu_api: String,
    pub hwdec: String,
    pub play_all_monitors: bool,
    pub selected_monitor: String,
    pub video_path: String,
}

/// Starts a detached process and hands back its pid.
pub trait ProcessSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<u32>;

    /// Collects children that have exited so they stop showing up in the
    /// process table. Returns how many were reaped.
    fn reap(&self) -> usize {
        0
    }
}

/// Spawns with null stdio and keeps the `Child` handles so exited or
/// killed children can be waited on later instead of lingering as zombies.
#[derive(Default)]
pub struct DetachedSpawner {
    children: Mutex<Vec<Child>>,
}

impl ProcessSpawner for DetachedSpawner {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<u32> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let pid = child.id();
        self.children
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(child);
        Ok(pid)
    }

    fn reap(&self) -> usize {
        let mut children = self.children.lock().unwrap_or_else(|p| p.into_inner());
        let before = children.len();
        children.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            // Already collected elsewhere; nothing left to wait for.
            Err(_) => false,
        });
        before - children.len()
    }
}

pub struct WallpaperLauncher<'a> {
    monitors: &'a dyn MonitorEnumerator,
    spawner: &'a dyn ProcessSpawner,
    tools: &'a ToolPaths,
}

impl<'a> WallpaperLauncher<'a> {
    pub fn new(
        monitors: &'a dyn MonitorEnumerator,
        spawner: &'a dyn ProcessSpawner,
        tools: &'a ToolPaths,
    ) -> Self {
        Self {
            monitors,
            spawner,
            tools,
        }
    }

    /// Spawns one embedding process per target monitor and returns their
    /// pids in monitor enumeration order. Nothing is spawned unless every
    /// target is resolved first.
    pub fn launch(&self, config: &LaunchConfig) -> Result<Vec<u32>, LaunchError> {
        let monitors = self.monitors.monitors()?;
        let targets = resolve_target_monitors(&monitors, config)?;

        info!(
            "[LAUNCH] video='{}' monitors={:?}",
            config.video_path,
            targets.iter().map(|m| m.name.as_str()).collect::<Vec<_>>()
        );

        let mut pids = Vec::with_capacity(targets.len());
        for monitor in targets {
            let args = embed_args(&self.tools.mpv, config, monitor);
            match self.spawner.spawn(&self.tools.xwinwrap, &args) {
                Ok(pid) => {
                    info!(
                        "[LAUNCH] monitor='{}' geometry={} pid={}",
                        monitor.name,
                        monitor.geometry(),
                        pid
                    );
                    pids.push(pid);
                }
                Err(source) => {
                    return Err(LaunchError::Spawn {
                        monitor: monitor.name.clone(),
                        spawned: pids,
                        source,
                    });
                }
            }
        }

        Ok(pids)
    }
}

pub fn resolve_target_monitors<'m>(
    monitors: &'m [MonitorSpec],
    config: &LaunchConfig,
) -> Result<Vec<&'m MonitorSpec>, LaunchError> {
    if config.play_all_monitors {
        if monitors.is_empty() {
            return Err(LaunchError::NoMonitors);
        }
        return Ok(monitors.iter().collect());
    }

    monitors
        .iter()
        .find(|m| m.name == config.selected_monitor)
        .map(|m| vec![m])
        .ok_or_else(|| LaunchError::MonitorNotFound(config.selected_monitor.clone()))
}

/// xwinwrap arguments, with the mpv invocation nested after `--`. mpv
/// substitutes `WID` with the xwinwrap window id.
pub fn embed_args(mpv: &str, config: &LaunchConfig, monitor: &MonitorSpec) -> Vec<String> {
    let geometry = monitor.geometry();

    let mut args: Vec<String> = ["-fdt", "-ni", "-nf", "-un", "-o", "1.0", "-d", "-g"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(geometry.clone());
    args.push("--".to_string());
    args.push(mpv.to_string());
    args.extend(
        [
            "--fullscreen".to_string(),
            "--no-config".to_string(),
            "--no-stop-screensaver".to_string(),
            format!("--vo={}", config.video_output),
            format!("--hwdec={}", config.hwdec),
            format!("--gpu-api={}", config.gpu_api),
            format!("--gpu-context={}", config.gpu_context),
            "--loop-file".to_string(),
            format!("--geometry={geometry}"),
            "--panscan=1.0".to_string(),
            "--no-audio".to_string(),
            "--no-osd-bar".to_string(),
            "-wid".to_string(),
            "WID".to_string(),
            "--no-input-default-bindings".to_string(),
        ],
    );
    args.push(config.video_path.clone());
    args
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    pub(crate) struct FixedMonitors(pub(crate) Vec<MonitorSpec>);

    impl MonitorEnumerator for FixedMonitors {
        fn monitors(&self) -> Result<Vec<MonitorSpec>, LaunchError> {
            Ok(self.0.clone())
        }
    }

    /// Hands out increasing pids and remembers every invocation. Fails
    /// on the call numbered `fail_on` when set.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSpawner {
        pub(crate) calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
        pub(crate) next_pid: Arc<Mutex<u32>>,
        pub(crate) fail_on: Option<usize>,
    }

    impl RecordingSpawner {
        pub(crate) fn starting_at(pid: u32) -> Self {
            let spawner = Self::default();
            *spawner.next_pid.lock().unwrap() = pid;
            spawner
        }

        pub(crate) fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ProcessSpawner for RecordingSpawner {
        fn spawn(&self, program: &str, args: &[String]) -> io::Result<u32> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_on == Some(calls.len()) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such executable"));
            }
            calls.push((program.to_string(), args.to_vec()));
            let mut next = self.next_pid.lock().unwrap();
            *next += 1;
            Ok(*next)
        }
    }

    pub(crate) fn monitor(name: &str, width: u32, height: u32, x: i32, y: i32) -> MonitorSpec {
        MonitorSpec {
            name: name.to_string(),
            width,
            height,
            x,
            y,
            primary: false,
        }
    }

    pub(crate) fn three_monitors() -> Vec<MonitorSpec> {
        vec![
            monitor("DP-1", 1920, 1080, 0, 0),
            monitor("DP-2", 2560, 1440, 1920, 0),
            monitor("eDP-1", 1366, 768, 4480, 312),
        ]
    }

    pub(crate) fn launch_config(play_all: bool, selected: &str) -> LaunchConfig {
        LaunchConfig {
            video_output: "gpu".to_string(),
            gpu_context: "x11vk".to_string(),
            gpu_api: "vulkan".to_string(),
            hwdec: "vulkan".to_string(),
            play_all_monitors: play_all,
            selected_monitor: selected.to_string(),
            video_path: "/videos/a.mp4".to_string(),
        }
    }

    fn geometry_arg(args: &[String]) -> &str {
        let at = args.iter().position(|a| a == "-g").expect("-g present");
        &args[at + 1]
    }

    #[test]
    fn all_monitors_spawns_one_process_per_monitor() {
        let monitors = FixedMonitors(three_monitors());
        let spawner = RecordingSpawner::starting_at(100);
        let tools = ToolPaths::default();
        let launcher = WallpaperLauncher::new(&monitors, &spawner, &tools);

        let pids = launcher.launch(&launch_config(true, "")).expect("launch");

        assert_eq!(pids, vec![101, 102, 103]);
        let calls = spawner.calls();
        assert_eq!(calls.len(), 3);
        let geometries: Vec<&str> = calls.iter().map(|(_, a)| geometry_arg(a)).collect();
        assert_eq!(
            geometries,
            vec!["1920x1080+0+0", "2560x1440+1920+0", "1366x768+4480+312"]
        );
        assert!(calls.iter().all(|(program, _)| program == "xwinwrap"));
    }

    #[test]
    fn selected_monitor_spawns_only_that_one() {
        let monitors = FixedMonitors(three_monitors());
        let spawner = RecordingSpawner::default();
        let tools = ToolPaths::default();
        let launcher = WallpaperLauncher::new(&monitors, &spawner, &tools);

        let pids = launcher.launch(&launch_config(false, "DP-2")).expect("launch");

        assert_eq!(pids.len(), 1);
        assert_eq!(geometry_arg(&spawner.calls()[0].1), "2560x1440+1920+0");
    }

    #[test]
    fn unknown_monitor_spawns_nothing() {
        let monitors = FixedMonitors(three_monitors());
        let spawner = RecordingSpawner::default();
        let tools = ToolPaths::default();
        let launcher = WallpaperLauncher::new(&monitors, &spawner, &tools);

        let err = launcher
            .launch(&launch_config(false, "HDMI-1"))
            .expect_err("monitor is missing");

        assert!(matches!(err, LaunchError::MonitorNotFound(ref name) if name == "HDMI-1"));
        assert!(spawner.calls().is_empty());
    }

    #[test]
    fn no_monitors_is_reported() {
        let monitors = FixedMonitors(Vec::new());
        let spawner = RecordingSpawner::default();
        let tools = ToolPaths::default();
        let launcher = WallpaperLauncher::new(&monitors, &spawner, &tools);

        let err = launcher.launch(&launch_config(true, "")).expect_err("nothing to play on");
        assert!(matches!(err, LaunchError::NoMonitors));
    }

    #[test]
    fn spawn_failure_reports_already_spawned_siblings() {
        let monitors = FixedMonitors(three_monitors());
        let spawner = RecordingSpawner {
            fail_on: Some(2),
            ..RecordingSpawner::starting_at(10)
        };
        let tools = ToolPaths::default();
        let launcher = WallpaperLauncher::new(&monitors, &spawner, &tools);

        let err = launcher.launch(&launch_config(true, "")).expect_err("third spawn fails");

        match err {
            LaunchError::Spawn { monitor, spawned, .. } => {
                assert_eq!(monitor, "eDP-1");
                assert_eq!(spawned, vec![11, 12]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detached_spawner_reaps_exited_children() {
        let spawner = DetachedSpawner::default();
        spawner.spawn("true", &[]).expect("spawn true");

        let mut reaped = 0;
        for _ in 0..50 {
            reaped += spawner.reap();
            if reaped == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }

        assert_eq!(reaped, 1);
        assert_eq!(spawner.reap(), 0);
    }

    #[test]
    fn embed_args_follow_the_player_contract() {
        let config = launch_config(true, "");
        let args = embed_args("mpv", &config, &monitor("DP-1", 1920, 1080, 0, 0));

        let split = args.iter().position(|a| a == "--").expect("separator");
        assert_eq!(
            &args[..split],
            ["-fdt", "-ni", "-nf", "-un", "-o", "1.0", "-d", "-g", "1920x1080+0+0"]
        );
        assert_eq!(args[split + 1], "mpv");

        let player = &args[split + 2..];
        for expected in [
            "--fullscreen",
            "--no-config",
            "--no-stop-screensaver",
            "--vo=gpu",
            "--hwdec=vulkan",
            "--gpu-api=vulkan",
            "--gpu-context=x11vk",
            "--loop-file",
            "--geometry=1920x1080+0+0",
            "--panscan=1.0",
            "--no-audio",
            "--no-osd-bar",
            "--no-input-default-bindings",
        ] {
            assert!(player.iter().any(|a| a == expected), "missing {expected}");
        }
        let wid = player.iter().position(|a| a == "-wid").expect("-wid");
        assert_eq!(player[wid + 1], "WID");
        assert_eq!(player.last().map(String::as_str), Some("/videos/a.mp4"));
    }
}
