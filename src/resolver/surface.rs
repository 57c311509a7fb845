//! Playback surfaces
//!
//! Executes the resolver's surface effects on the desktop:
//! - native video: the built-in decoder, or an external player process that
//!   counts as ready once it survives a short startup window
//! - adaptive helper: an external player demuxing the manifest; killed and
//!   reaped on release, a failing exit is fatal
//! - frame: an HTTP probe of the embed page, with the page itself opened in
//!   the system browser on demand
//!
//! Every signal carries the link id and epoch of the request that produced
//! it, so the resolver can drop the ones that arrive late.

use std::io::{BufRead, BufReader};
use std::process::Child;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ffmpeg_player::{self, PlayerMessage, PlayerWindow};
use crate::launcher::{self, LaunchOptions};
use crate::models::LinkId;
use crate::resolver::machine::{Effect, SurfacePlan, SurfaceRequest, SurfaceSignal};

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub player: String,
    pub use_internal: bool,
    pub launch: LaunchOptions,
    /// Kill the external player on release instead of leaving it running.
    pub single_window_mode: bool,
    /// How long an external player must stay up to count as playing.
    pub startup_window: Duration,
    pub user_agent: String,
    /// Upper bound for the embed page probe. Longer than the resolver's load
    /// timeout so a hanging page surfaces as a timeout.
    pub probe_timeout: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            player: "ffplay".to_string(),
            use_internal: false,
            launch: LaunchOptions::default(),
            single_window_mode: true,
            startup_window: Duration::from_millis(1500),
            user_agent: String::new(),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl HostSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let player = config.player_command();
        let use_internal =
            ffmpeg_player::AVAILABLE && (config.use_internal_player || launcher::is_internal(&player));
        Self {
            player,
            use_internal,
            launch: LaunchOptions {
                buffer_secs: config.buffer_seconds,
                hw_accel: config.hw_accel,
                user_agent: config
                    .pass_user_agent_to_player
                    .then(|| config.user_agent.clone()),
            },
            single_window_mode: config.single_window_mode,
            user_agent: config.user_agent.clone(),
            ..Default::default()
        }
    }

    /// The video surface handles HLS manifests without a helper.
    pub fn native_adaptive(&self) -> bool {
        self.use_internal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Signal {
        link_id: LinkId,
        epoch: u64,
        signal: SurfaceSignal,
    },
    /// Console line from a surface (player stderr, exits).
    Log(String),
}

enum Backend {
    Internal,
    Process {
        child: Child,
        started: Instant,
        ready: bool,
        helper: bool,
    },
    Frame,
}

struct Mounted {
    request: SurfaceRequest,
    backend: Backend,
}

pub struct SurfaceHost {
    settings: HostSettings,
    mounted: Option<Mounted>,
    player: PlayerWindow,
    title: String,
    tx: Sender<SurfaceEvent>,
    rx: Receiver<SurfaceEvent>,
}

impl SurfaceHost {
    pub fn new(settings: HostSettings) -> Self {
        let (tx, rx) = channel();
        Self {
            settings,
            mounted: None,
            player: PlayerWindow::new(),
            title: String::new(),
            tx,
            rx,
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Title shown in player windows.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn mounted(&self) -> Option<&SurfaceRequest> {
        self.mounted.as_ref().map(|m| &m.request)
    }

    /// The built-in decoder is rendering the mounted surface.
    pub fn shows_internal_player(&self) -> bool {
        matches!(self.mounted, Some(Mounted { backend: Backend::Internal, .. }))
    }

    pub fn player_window(&mut self) -> &mut PlayerWindow {
        &mut self.player
    }

    /// Run a surface effect. Returns false for effects this host does not own.
    pub fn execute(&mut self, effect: &Effect, now: Instant) -> bool {
        match effect {
            Effect::Attach(request) | Effect::Reload(request) => {
                self.attach(request.clone(), now);
                true
            }
            Effect::Release { link_id } => {
                self.release(*link_id);
                true
            }
            _ => false,
        }
    }

    pub fn attach(&mut self, request: SurfaceRequest, now: Instant) {
        self.release_all();
        info!(link_id = request.link_id, epoch = request.epoch, plan = ?request.plan, "attaching surface");

        let backend = match request.plan {
            SurfacePlan::NativeVideo if self.settings.use_internal => {
                self.player.play(&self.title, &request.url, &self.settings.user_agent);
                Some(Backend::Internal)
            }
            SurfacePlan::NativeVideo => self.spawn_process(&request, now, false),
            SurfacePlan::AdaptiveHelper => self.spawn_process(&request, now, true),
            SurfacePlan::Frame => {
                self.spawn_probe(&request);
                Some(Backend::Frame)
            }
        };

        if let Some(backend) = backend {
            self.mounted = Some(Mounted { request, backend });
        }
    }

    /// Free the surface mounted for `link_id`, if it is the current one.
    pub fn release(&mut self, link_id: LinkId) {
        if self.mounted.as_ref().map(|m| m.request.link_id) == Some(link_id) {
            self.release_all();
        }
    }

    pub fn release_all(&mut self) {
        let Some(mounted) = self.mounted.take() else {
            return;
        };
        debug!(link_id = mounted.request.link_id, "releasing surface");
        match mounted.backend {
            Backend::Internal => self.player.stop(),
            Backend::Process { mut child, helper, .. } => {
                if helper || self.settings.single_window_mode {
                    launcher::kill_and_reap(&mut child);
                } else {
                    launcher::detach(child);
                }
            }
            // The probe thread finishes on its own; its result is stale now
            Backend::Frame => {}
        }
    }

    /// Collect surface events: decoder messages, process exits and the
    /// startup window, probe results and player output.
    pub fn pump(&mut self, now: Instant) -> Vec<SurfaceEvent> {
        let mut events = Vec::new();

        if let Some(mounted) = self.mounted.as_mut() {
            let link_id = mounted.request.link_id;
            let epoch = mounted.request.epoch;
            let signal = |signal| SurfaceEvent::Signal { link_id, epoch, signal };
            let mut exited = false;

            match mounted.backend {
                Backend::Internal => {
                    for msg in self.player.pump() {
                        match msg {
                            PlayerMessage::Ready => events.push(signal(SurfaceSignal::DataReady)),
                            PlayerMessage::Error(e) => {
                                events.push(SurfaceEvent::Log(format!("[ERROR] {}", e)));
                                events.push(signal(SurfaceSignal::Error));
                            }
                            PlayerMessage::Finished => {
                                events.push(SurfaceEvent::Log("[PLAY] Playback finished".to_string()));
                            }
                        }
                    }
                }
                Backend::Process { ref mut child, started, ref mut ready, helper } => match child.try_wait() {
                    Ok(Some(status)) => {
                        exited = true;
                        events.push(SurfaceEvent::Log(format!("[PLAY] Player exited ({})", status)));
                        if !status.success() {
                            if helper {
                                events.push(signal(SurfaceSignal::HelperFatal));
                            } else if !*ready {
                                events.push(signal(SurfaceSignal::Error));
                            }
                        } else if !*ready {
                            events.push(signal(SurfaceSignal::DataReady));
                        }
                    }
                    Ok(None) => {
                        if !*ready && now.saturating_duration_since(started) >= self.settings.startup_window {
                            *ready = true;
                            events.push(signal(SurfaceSignal::DataReady));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to poll player process");
                        events.push(SurfaceEvent::Log(format!("[ERROR] Failed to poll player: {}", e)));
                    }
                },
                Backend::Frame => {}
            }

            if exited {
                self.mounted = None;
            }
        }

        events.extend(self.rx.try_iter());
        events
    }

    /// When the host next needs a pump without outside input.
    pub fn next_wake(&self) -> Option<Instant> {
        match self.mounted {
            Some(Mounted { backend: Backend::Process { started, ready: false, .. }, .. }) => {
                Some(started + self.settings.startup_window)
            }
            _ => None,
        }
    }

    fn spawn_process(&mut self, request: &SurfaceRequest, now: Instant, helper: bool) -> Option<Backend> {
        let player = &self.settings.player;
        match launcher::spawn_player(player, &self.title, &request.url, &self.settings.launch) {
            Ok(mut child) => {
                info!(pid = child.id(), %player, helper, "player launched");
                let _ = self.tx.send(SurfaceEvent::Log(format!(
                    "[PLAY] {} launched (PID: {})",
                    player,
                    child.id()
                )));
                if let Some(stderr) = child.stderr.take() {
                    let tx = self.tx.clone();
                    thread::spawn(move || {
                        for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                            if !line.trim().is_empty() {
                                let _ = tx.send(SurfaceEvent::Log(format!("[PLAYER] {}", line)));
                            }
                        }
                    });
                }
                Some(Backend::Process { child, started: now, ready: false, helper })
            }
            Err(e) => {
                warn!(%player, error = %e, "failed to launch player");
                let _ = self.tx.send(SurfaceEvent::Log(format!(
                    "[ERROR] Failed to launch player '{}': {}",
                    player, e
                )));
                let signal = if helper { SurfaceSignal::HelperFatal } else { SurfaceSignal::Error };
                let _ = self.tx.send(SurfaceEvent::Signal {
                    link_id: request.link_id,
                    epoch: request.epoch,
                    signal,
                });
                None
            }
        }
    }

    fn spawn_probe(&self, request: &SurfaceRequest) {
        let tx = self.tx.clone();
        let url = request.url.clone();
        let link_id = request.link_id;
        let epoch = request.epoch;
        let user_agent = self.settings.user_agent.clone();
        let timeout = self.settings.probe_timeout;

        thread::spawn(move || {
            let signal = match probe_page(&url, &user_agent, timeout) {
                Ok(()) => SurfaceSignal::Loaded,
                Err(e) => {
                    let _ = tx.send(SurfaceEvent::Log(format!("[ERROR] Embed page failed: {}", e)));
                    SurfaceSignal::Error
                }
            };
            let _ = tx.send(SurfaceEvent::Signal { link_id, epoch, signal });
        });
    }
}

impl Drop for SurfaceHost {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Fetch an embed page; any 2xx answer counts as loaded.
fn probe_page(url: &str, user_agent: &str, timeout: Duration) -> Result<(), ureq::Error> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .new_agent();
    let mut req = agent.get(url);
    if !user_agent.is_empty() {
        req = req.header("User-Agent", user_agent);
    }
    let response = req.call()?;
    debug!(%url, status = response.status().as_u16(), "embed page answered");
    Ok(())
}

#[cfg(test)]
#[path = "surface_tests.rs"]
mod tests;
