//! Per-monitor visibility tracking
//!
//! A background is hidden while the workspace shown on its monitor holds a
//! fullscreen window. The tracker keeps the Hyprland view of monitors and
//! workspaces up to date from IPC events and reports only the monitors whose
//! visibility actually changed.

use crate::config::Config;
use crate::ipc::{self, HyprEvent, MonitorInfo, WorkspaceInfo};
use crate::scheduler::Visibility;
use crate::wayland::BackdropCommand;
use log::{debug, info, warn};
use smithay_client_toolkit::reexports::calloop::channel::Sender;
use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    /// Monitor name -> active workspace name
    active: HashMap<String, String>,
    focused: Option<String>,
    fullscreen: HashSet<String>,
    /// Last visibility reported per monitor; unreported monitors are visible
    reported: HashMap<String, Visibility>,
    disabled: HashSet<String>,
}

impl VisibilityTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            disabled: config
                .monitors
                .iter()
                .filter(|(_, m)| m.disabled)
                .map(|(name, _)| name.clone())
                .collect(),
            ..Default::default()
        }
    }

    /// Replace the tracked state with a fresh snapshot
    pub fn seed(
        &mut self,
        monitors: &[MonitorInfo],
        workspaces: &[WorkspaceInfo],
    ) -> Vec<(String, Visibility)> {
        self.active = monitors
            .iter()
            .map(|m| (m.name.clone(), m.active_workspace.clone()))
            .collect();
        self.focused = monitors.iter().find(|m| m.focused).map(|m| m.name.clone());
        self.fullscreen = workspaces
            .iter()
            .filter(|w| w.has_fullscreen)
            .map(|w| w.name.clone())
            .collect();
        self.changes()
    }

    pub fn apply(&mut self, event: &HyprEvent) -> Vec<(String, Visibility)> {
        match event {
            HyprEvent::Workspace(workspace) => {
                if let Some(monitor) = &self.focused {
                    self.active.insert(monitor.clone(), workspace.clone());
                }
            }
            HyprEvent::FocusedMon { monitor, workspace } => {
                self.focused = Some(monitor.clone());
                self.active.insert(monitor.clone(), workspace.clone());
            }
            HyprEvent::Fullscreen(on) => {
                let Some(workspace) = self
                    .focused
                    .as_ref()
                    .and_then(|m| self.active.get(m))
                    .cloned()
                else {
                    return Vec::new();
                };
                if *on {
                    self.fullscreen.insert(workspace);
                } else {
                    self.fullscreen.remove(&workspace);
                }
            }
            HyprEvent::MoveWorkspace { workspace, monitor } => {
                // The workspace stays shown on the monitor it lands on
                self.active.insert(monitor.clone(), workspace.clone());
            }
            HyprEvent::DestroyWorkspace(workspace) => {
                self.fullscreen.remove(workspace);
            }
            HyprEvent::MonitorAdded(monitor) => {
                self.active.entry(monitor.clone()).or_default();
            }
            HyprEvent::MonitorRemoved(monitor) => {
                self.active.remove(monitor);
                self.reported.remove(monitor);
                if self.focused.as_ref() == Some(monitor) {
                    self.focused = None;
                }
            }
            HyprEvent::Other => return Vec::new(),
        }
        self.changes()
    }

    /// Forget fullscreen state and report every hidden monitor as visible
    pub fn release_all(&mut self) -> Vec<(String, Visibility)> {
        self.fullscreen.clear();
        self.changes()
    }

    pub fn visibility(&self, monitor: &str) -> Visibility {
        match self.active.get(monitor) {
            Some(workspace) if self.fullscreen.contains(workspace) => Visibility::Hidden,
            _ => Visibility::Visible,
        }
    }

    fn changes(&mut self) -> Vec<(String, Visibility)> {
        let mut names: Vec<&String> = self
            .active
            .keys()
            .filter(|name| !self.disabled.contains(*name))
            .collect();
        names.sort();

        let mut changed = Vec::new();
        for name in names {
            let now = self.visibility(name);
            let before = self
                .reported
                .get(name)
                .copied()
                .unwrap_or(Visibility::Visible);
            if now != before {
                changed.push((name.clone(), now));
            }
        }
        for (name, vis) in &changed {
            self.reported.insert(name.clone(), *vis);
        }
        changed
    }
}

fn forward(tx: &Sender<BackdropCommand>, changes: Vec<(String, Visibility)>) -> ControlFlow<()> {
    for (monitor, visibility) in changes {
        debug!("{} is now {:?}", monitor, visibility);
        if tx
            .send(BackdropCommand::SetVisibility {
                monitor,
                visibility,
            })
            .is_err()
        {
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

/// Follow Hyprland events and forward visibility changes to the Wayland
/// thread. Returns quietly outside Hyprland; backgrounds then stay visible.
pub async fn run_visibility_loop(
    config: Config,
    tx: Sender<BackdropCommand>,
) -> Result<(), Box<dyn std::error::Error>> {
    let monitors = match ipc::get_monitors().await {
        Ok(m) => m,
        Err(e) => {
            warn!("Hyprland IPC unavailable ({}), fullscreen tracking disabled", e);
            return Ok(());
        }
    };
    let workspaces = ipc::get_workspaces().await?;

    let mut tracker = VisibilityTracker::new(&config);
    info!(
        "Tracking fullscreen state on {} monitor(s)",
        monitors.len()
    );
    if forward(&tx, tracker.seed(&monitors, &workspaces)).is_break() {
        return Ok(());
    }

    let result = ipc::listen_events(|event| forward(&tx, tracker.apply(&event))).await;

    // Without events the tracked state goes stale; show everything
    let _ = forward(&tx, tracker.release_all());
    result
}
