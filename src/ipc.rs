//! Hyprland IPC interface
//!
//! Communicates with Hyprland via its UNIX sockets to:
//! - Get monitor information (names, focus, active workspace)
//! - Get workspace information (owning monitor, fullscreen state)
//! - Listen for events that change what is on screen

use log::{debug, error};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Information about a connected monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    pub name: String,
    pub focused: bool,
    /// Name of the workspace currently shown on this monitor
    pub active_workspace: String,
}

/// Information about an existing workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub name: String,
    pub monitor: String,
    pub has_fullscreen: bool,
}

/// An event from `.socket2.sock` that can change visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HyprEvent {
    /// The focused monitor switched to a workspace
    Workspace(String),
    FocusedMon { monitor: String, workspace: String },
    /// Fullscreen toggled on the focused workspace
    Fullscreen(bool),
    MoveWorkspace { workspace: String, monitor: String },
    DestroyWorkspace(String),
    MonitorAdded(String),
    MonitorRemoved(String),
    Other,
}

impl HyprEvent {
    /// Parse one `EVENT>>DATA` line
    pub fn parse(line: &str) -> Self {
        let Some((name, data)) = line.trim_end().split_once(">>") else {
            return HyprEvent::Other;
        };
        match name {
            "workspace" => HyprEvent::Workspace(data.to_string()),
            "focusedmon" => match data.split_once(',') {
                Some((monitor, workspace)) => HyprEvent::FocusedMon {
                    monitor: monitor.to_string(),
                    workspace: workspace.to_string(),
                },
                None => HyprEvent::Other,
            },
            "fullscreen" => match data {
                "1" => HyprEvent::Fullscreen(true),
                "0" => HyprEvent::Fullscreen(false),
                _ => HyprEvent::Other,
            },
            // Workspace names may contain commas, monitor names don't
            "moveworkspace" => match data.rsplit_once(',') {
                Some((workspace, monitor)) => HyprEvent::MoveWorkspace {
                    workspace: workspace.to_string(),
                    monitor: monitor.to_string(),
                },
                None => HyprEvent::Other,
            },
            "destroyworkspace" => HyprEvent::DestroyWorkspace(data.to_string()),
            "monitoradded" => HyprEvent::MonitorAdded(data.to_string()),
            "monitorremoved" => HyprEvent::MonitorRemoved(data.to_string()),
            _ => HyprEvent::Other,
        }
    }
}

/// Directory holding both Hyprland sockets of the running instance
fn instance_dir() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let his = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| "HYPRLAND_INSTANCE_SIGNATURE not set, not running under Hyprland?")?;
    let xdg_runtime = std::env::var("XDG_RUNTIME_DIR")?;
    Ok(PathBuf::from(format!("{}/hypr/{}", xdg_runtime, his)))
}

/// Send a command to Hyprland and return the response
async fn hyprctl(command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let path = instance_dir()?.join(".socket.sock");
    let mut stream = UnixStream::connect(&path).await?;

    // Hyprland IPC protocol: send "j/<command>" for JSON output
    let msg = format!("j/{}", command);
    stream.write_all(msg.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

fn parse_monitors(json: &str) -> Result<Vec<MonitorInfo>, Box<dyn std::error::Error>> {
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse monitors: {}", e))?;

    Ok(parsed
        .into_iter()
        .map(|m| MonitorInfo {
            name: m["name"].as_str().unwrap_or("unknown").to_string(),
            focused: m["focused"].as_bool().unwrap_or(false),
            active_workspace: m["activeWorkspace"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        })
        .collect())
}

fn parse_workspaces(json: &str) -> Result<Vec<WorkspaceInfo>, Box<dyn std::error::Error>> {
    let parsed: Vec<serde_json::Value> =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse workspaces: {}", e))?;

    Ok(parsed
        .into_iter()
        .map(|w| WorkspaceInfo {
            name: w["name"].as_str().unwrap_or_default().to_string(),
            monitor: w["monitor"].as_str().unwrap_or_default().to_string(),
            has_fullscreen: w["hasfullscreen"].as_bool().unwrap_or(false),
        })
        .collect())
}

/// Get information about all connected monitors
pub async fn get_monitors() -> Result<Vec<MonitorInfo>, Box<dyn std::error::Error>> {
    parse_monitors(&hyprctl("monitors").await?)
}

/// Get information about all existing workspaces
pub async fn get_workspaces() -> Result<Vec<WorkspaceInfo>, Box<dyn std::error::Error>> {
    parse_workspaces(&hyprctl("workspaces").await?)
}

/// Listen for Hyprland events until the socket closes or the callback breaks
pub async fn listen_events<F>(callback: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut(HyprEvent) -> ControlFlow<()>,
{
    let path = instance_dir()?.join(".socket2.sock");
    let stream = UnixStream::connect(&path).await?;
    if read_events(BufReader::new(stream), callback).await? {
        error!("Hyprland event socket closed");
    }
    Ok(())
}

/// Dispatch newline-separated events from `reader`. Invalid UTF-8 is
/// replaced rather than ending the stream. Returns true at end of input,
/// false when the callback broke out.
async fn read_events<R, F>(mut reader: R, mut callback: F) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(HyprEvent) -> ControlFlow<()>,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(true);
        }
        let line = String::from_utf8_lossy(&buf);
        let event = HyprEvent::parse(&line);
        if event == HyprEvent::Other {
            continue;
        }
        debug!("Hyprland event: {}", line.trim_end());
        if callback(event).is_break() {
            return Ok(false);
        }
    }
}
