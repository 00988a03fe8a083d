use std::process::Command;

use crate::{errors::LaunchError, info, warn};

/// One display surface and its place in the virtual screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSpec {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub primary: bool,
}

impl MonitorSpec {
    /// X11 geometry string, `WIDTHxHEIGHT+X+Y`.
    pub fn geometry(&self) -> String {
        format!("{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Queries the current display layout. Implementations must not cache:
/// monitors come and go between sessions.
pub trait MonitorEnumerator {
    fn monitors(&self) -> Result<Vec<MonitorSpec>, LaunchError>;
}

pub struct XrandrMonitors {
    program: String,
}

impl XrandrMonitors {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MonitorEnumerator for XrandrMonitors {
    fn monitors(&self) -> Result<Vec<MonitorSpec>, LaunchError> {
        let output = Command::new(&self.program)
            .arg("--listmonitors")
            .output()
            .map_err(|e| LaunchError::MonitorQuery(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(LaunchError::MonitorQuery(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let monitors = parse_listmonitors(&String::from_utf8_lossy(&output.stdout));
        info!("[MONITORS] Detected {} monitor(s)", monitors.len());
        Ok(monitors)
    }
}

/// Parses `xrandr --listmonitors`:
///
/// ```text
/// Monitors: 2
///  0: +*DP-1 1920/527x1080/296+0+0  DP-1
///  1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1
/// ```
pub fn parse_listmonitors(stdout: &str) -> Vec<MonitorSpec> {
    stdout
        .lines()
        .filter(|line| !line.trim_start().starts_with("Monitors:"))
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = parse_monitor_line(line);
            if parsed.is_none() {
                warn!("[MONITORS] Skipping unrecognised xrandr line: {}", line.trim());
            }
            parsed
        })
        .collect()
}

fn parse_monitor_line(line: &str) -> Option<MonitorSpec> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 || !tokens[0].ends_with(':') {
        return None;
    }

    let flags = tokens[1];
    let (width, height, x, y) = parse_geometry(tokens[2])?;
    let name = tokens[tokens.len() - 1].to_string();

    Some(MonitorSpec {
        name,
        width,
        height,
        x,
        y,
        primary: flags.contains('*'),
    })
}

/// `1920/527x1080/296+0+0` → (1920, 1080, 0, 0). The `/mm` parts are
/// physical sizes and are dropped.
fn parse_geometry(token: &str) -> Option<(u32, u32, i32, i32)> {
    let (w_part, rest) = token.split_once('x')?;
    let width = w_part.split('/').next()?.parse().ok()?;

    let plus = rest.find('+')?;
    let (h_part, offsets) = rest.split_at(plus);
    let height = h_part.split('/').next()?.parse().ok()?;

    // Offsets may themselves be negative: "+-1920+0".
    let (x, y) = offsets[1..].rsplit_once('+')?;
    Some((width, height, x.parse().ok()?, y.parse().ok()?))
}
