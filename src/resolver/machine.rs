//! Playback resolver state machine
//!
//! One `Resolver` exists per open watch view. It owns the selection,
//! loading/error flags and the refresh poll loop, and never performs I/O: every
//! input is a method call (with `now` supplied by the caller) and every side
//! effect it wants comes back as an [`Effect`] for the shell to execute.
//! Completions that arrive after the view moved on are dropped by comparing
//! request tickets, link ids and surface epochs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::Error;
use crate::models::{LinkId, MovieId, RefreshAck, StreamingItem, StreamingLink};
use crate::notice::Notice;
use crate::resolver::classify::{classify, Strategy};

/// Ticket, cycle and epoch numbers. Shared by every resolver in the process
/// so a completion addressed to a closed view never matches its successor.
static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub load_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub blocked_hosts: Vec<String>,
    /// The video surface demuxes HLS manifests itself.
    pub native_adaptive: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(20),
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 20,
            blocked_hosts: vec!["1flix.to".to_string()],
            native_adaptive: false,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &AppConfig, native_adaptive: bool) -> Self {
        Self {
            load_timeout: config.load_timeout(),
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts.max(1),
            blocked_hosts: config.blocked_embed_hosts.clone(),
            native_adaptive,
        }
    }
}

/// Observable resolver flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverState {
    pub selected_link: Option<LinkId>,
    pub loading_video: bool,
    pub playback_error: bool,
    pub refreshing: bool,
    pub poll_attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    Settled,
}

/// How the shell should realise the selected link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfacePlan {
    /// Video surface with the source set directly.
    NativeVideo,
    /// Video surface fed by an attached adaptive-streaming helper.
    AdaptiveHelper,
    /// Embedded page.
    Frame,
}

impl SurfacePlan {
    fn for_strategy(strategy: Strategy, native_adaptive: bool) -> Option<Self> {
        match strategy {
            Strategy::ExternalOpen => None,
            Strategy::DirectVideo => Some(SurfacePlan::NativeVideo),
            Strategy::AdaptiveStream if native_adaptive => Some(SurfacePlan::NativeVideo),
            Strategy::AdaptiveStream => Some(SurfacePlan::AdaptiveHelper),
            Strategy::Embed | Strategy::Fallback => Some(SurfacePlan::Frame),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub link_id: LinkId,
    pub epoch: u64,
    pub url: String,
    pub strategy: Strategy,
    pub plan: SurfacePlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    /// First load when the view opens.
    Load,
    /// One poll cycle of a refresh.
    Poll,
    /// Server-side link validation.
    Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub item_id: MovieId,
    pub seq: u64,
    pub purpose: FetchPurpose,
}

/// Readiness/failure reported by a playback surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    /// Video surface has data to show.
    DataReady,
    /// Embedded page finished loading.
    Loaded,
    /// Surface failed to load.
    Error,
    /// Adaptive-streaming helper hit an unrecoverable error.
    HelperFatal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch the streaming item (`validate_links` when the purpose is Validate).
    Fetch(FetchTicket),
    /// Fire the refresh request; the ack comes back via `on_refresh_ack`.
    RequestLinkRefresh { item_id: MovieId, cycle: u64 },
    Attach(SurfaceRequest),
    /// Re-issue the current surface (same source).
    Reload(SurfaceRequest),
    /// Stop and free the surface for this link, including any helper.
    Release { link_id: LinkId },
    Notify(Notice),
}

pub struct Resolver {
    item_id: MovieId,
    settings: ResolverSettings,
    item: Option<StreamingItem>,
    state: ResolverState,
    phase: RefreshPhase,
    /// Surface currently attached, if any.
    attached: Option<SurfaceRequest>,
    epoch: u64,
    load_deadline: Option<Instant>,
    next_poll_at: Option<Instant>,
    pending_load: Option<u64>,
    pending_poll: Option<u64>,
    pending_validate: Option<u64>,
    cycle: u64,
    load_error: Option<String>,
    torn_down: bool,
}

impl Resolver {
    pub fn new(item_id: MovieId, settings: ResolverSettings) -> Self {
        Self {
            item_id,
            settings,
            item: None,
            state: ResolverState::default(),
            phase: RefreshPhase::Idle,
            attached: None,
            epoch: 0,
            load_deadline: None,
            next_poll_at: None,
            pending_load: None,
            pending_poll: None,
            pending_validate: None,
            cycle: 0,
            load_error: None,
            torn_down: false,
        }
    }

    // ---- accessors ----

    pub fn item_id(&self) -> MovieId {
        self.item_id
    }

    pub fn item(&self) -> Option<&StreamingItem> {
        self.item.as_ref()
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Initial load is outstanding.
    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    /// Message of the last failed initial load.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Selected link, resolved against the latest fetched item.
    pub fn selected_link(&self) -> Option<&StreamingLink> {
        let id = self.state.selected_link?;
        self.item.as_ref()?.link(id)
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.selected_link()
            .map(|l| classify(&l.source_url, &self.settings.blocked_hosts))
    }

    pub fn attached(&self) -> Option<&SurfaceRequest> {
        self.attached.as_ref()
    }

    pub fn load_deadline(&self) -> Option<Instant> {
        self.load_deadline
    }

    /// Earliest pending timer, for scheduling the next wake-up.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.load_deadline, self.next_poll_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ---- inputs ----

    /// View opened: fetch the item.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        self.load_error = None;
        let ticket = self.ticket(FetchPurpose::Load);
        self.pending_load = Some(ticket.seq);
        vec![Effect::Fetch(ticket)]
    }

    /// Ask the server to check link health; the refreshed item is applied
    /// like any other fetch.
    pub fn validate(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let ticket = self.ticket(FetchPurpose::Validate);
        self.pending_validate = Some(ticket.seq);
        vec![Effect::Fetch(ticket)]
    }

    /// User picked a link. Inactive or unknown links are refused.
    pub fn select_link(&mut self, link_id: LinkId, now: Instant) -> Vec<Effect> {
        if self.torn_down || self.state.selected_link == Some(link_id) {
            return Vec::new();
        }
        let link = match self.item.as_ref().and_then(|i| i.link(link_id)) {
            Some(link) if link.is_active => link.clone(),
            Some(_) => {
                debug!(link_id, "refusing inactive link");
                return Vec::new();
            }
            None => {
                debug!(link_id, "refusing unknown link");
                return Vec::new();
            }
        };
        self.switch_to(Some(&link), now)
    }

    /// Clear the error and load the current surface again.
    pub fn retry(&mut self, now: Instant) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let Some(current) = self.attached.clone() else {
            return Vec::new();
        };
        self.epoch = next_serial();
        let request = SurfaceRequest { epoch: self.epoch, ..current };
        self.state.playback_error = false;
        self.state.loading_video = true;
        self.load_deadline = request
            .strategy
            .uses_load_timeout()
            .then(|| now + self.settings.load_timeout);
        info!(link_id = request.link_id, epoch = request.epoch, "retrying playback");
        self.attached = Some(request.clone());
        vec![Effect::Reload(request)]
    }

    /// User asked for fresh links. Ignored while a refresh is running.
    pub fn request_refresh(&mut self, now: Instant) -> Vec<Effect> {
        if self.torn_down || self.phase == RefreshPhase::Refreshing {
            return Vec::new();
        }
        self.cycle = next_serial();
        self.enter_refreshing(now);
        info!(item_id = self.item_id, cycle = self.cycle, "link refresh requested");
        vec![Effect::RequestLinkRefresh { item_id: self.item_id, cycle: self.cycle }]
    }

    pub fn on_refresh_ack(&mut self, cycle: u64, result: Result<RefreshAck, Error>) -> Vec<Effect> {
        if self.torn_down || cycle != self.cycle || self.phase != RefreshPhase::Refreshing {
            return Vec::new();
        }
        match result {
            Ok(ack) => {
                debug!(status = %ack.status, message = %ack.message, "refresh acknowledged");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "link refresh request failed");
                self.reset_refresh(RefreshPhase::Idle);
                vec![Effect::Notify(
                    Notice::error("Failed to refresh links").with_description(e.to_string()),
                )]
            }
        }
    }

    /// A fetch issued by this resolver completed.
    pub fn on_item_fetched(
        &mut self,
        ticket: FetchTicket,
        result: Result<StreamingItem, Error>,
        now: Instant,
    ) -> Vec<Effect> {
        if self.torn_down || ticket.item_id != self.item_id {
            debug!(seq = ticket.seq, "dropping fetch result for a closed view");
            return Vec::new();
        }
        let slot = match ticket.purpose {
            FetchPurpose::Load => &mut self.pending_load,
            FetchPurpose::Poll => &mut self.pending_poll,
            FetchPurpose::Validate => &mut self.pending_validate,
        };
        if *slot != Some(ticket.seq) {
            debug!(seq = ticket.seq, "dropping stale fetch result");
            return Vec::new();
        }
        *slot = None;

        match ticket.purpose {
            FetchPurpose::Load => self.on_load_result(result, now),
            FetchPurpose::Poll => self.on_poll_result(result, now),
            FetchPurpose::Validate => match result {
                Ok(item) => self.apply_item(item, now),
                Err(e) => vec![Effect::Notify(
                    Notice::error("Could not validate links").with_description(e.to_string()),
                )],
            },
        }
    }

    /// A surface reported readiness or failure.
    pub fn on_surface_signal(&mut self, link_id: LinkId, epoch: u64, signal: SurfaceSignal) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        if self.state.selected_link != Some(link_id) || epoch != self.epoch {
            debug!(link_id, epoch, ?signal, "ignoring stale surface signal");
            return Vec::new();
        }
        self.load_deadline = None;
        match signal {
            SurfaceSignal::DataReady => {
                self.state.loading_video = false;
            }
            SurfaceSignal::Loaded => {
                self.state.loading_video = false;
                self.state.playback_error = false;
            }
            SurfaceSignal::Error | SurfaceSignal::HelperFatal => {
                warn!(link_id, ?signal, "playback failed");
                self.state.loading_video = false;
                self.state.playback_error = true;
            }
        }
        Vec::new()
    }

    /// Advance timers: fire the load timeout and issue due polls.
    pub fn tick(&mut self, now: Instant) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        let mut effects = Vec::new();

        if let Some(deadline) = self.load_deadline {
            if now >= deadline {
                self.load_deadline = None;
                if self.state.loading_video {
                    warn!(link_id = ?self.state.selected_link, "embed load timed out");
                    self.state.loading_video = false;
                    self.state.playback_error = true;
                    effects.push(Effect::Notify(
                        Notice::error("Stream took too long to load")
                            .with_description("Try again or pick another link."),
                    ));
                }
            }
        }

        if self.phase == RefreshPhase::Refreshing && self.pending_poll.is_none() {
            if let Some(at) = self.next_poll_at {
                if now >= at && self.state.poll_attempt < self.settings.max_poll_attempts {
                    self.next_poll_at = None;
                    let ticket = self.ticket(FetchPurpose::Poll);
                    self.pending_poll = Some(ticket.seq);
                    debug!(attempt = self.state.poll_attempt + 1, "polling for links");
                    effects.push(Effect::Fetch(ticket));
                }
            }
        }

        effects
    }

    /// View closed or switched to another item. Everything pending is
    /// dropped and later completions are ignored.
    pub fn teardown(&mut self) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        self.torn_down = true;
        self.load_deadline = None;
        self.next_poll_at = None;
        self.pending_load = None;
        self.pending_poll = None;
        self.pending_validate = None;
        self.state.refreshing = false;
        self.phase = RefreshPhase::Idle;
        debug!(item_id = self.item_id, "resolver torn down");
        self.attached
            .take()
            .map(|a| vec![Effect::Release { link_id: a.link_id }])
            .unwrap_or_default()
    }

    // ---- internals ----

    fn ticket(&mut self, purpose: FetchPurpose) -> FetchTicket {
        FetchTicket { item_id: self.item_id, seq: next_serial(), purpose }
    }

    fn enter_refreshing(&mut self, now: Instant) {
        self.phase = RefreshPhase::Refreshing;
        self.state.refreshing = true;
        self.state.poll_attempt = 0;
        self.pending_poll = None;
        self.next_poll_at = Some(now + self.settings.poll_interval);
    }

    fn reset_refresh(&mut self, phase: RefreshPhase) {
        self.phase = phase;
        self.state.refreshing = false;
        self.state.poll_attempt = 0;
        self.next_poll_at = None;
        self.pending_poll = None;
    }

    fn on_load_result(&mut self, result: Result<StreamingItem, Error>, now: Instant) -> Vec<Effect> {
        match result {
            Ok(item) => {
                self.load_error = None;
                let server_refreshing = item.refreshing;
                let effects = self.apply_item(item, now);
                // Links are still being discovered server-side: watch for them
                if self.state.selected_link.is_none()
                    && server_refreshing
                    && self.phase != RefreshPhase::Refreshing
                {
                    info!(item_id = self.item_id, "server is discovering links, polling");
                    self.enter_refreshing(now);
                }
                effects
            }
            Err(e) => {
                warn!(item_id = self.item_id, error = %e, "failed to load streaming item");
                self.load_error = Some(e.to_string());
                self.reset_refresh(RefreshPhase::Idle);
                vec![Effect::Notify(
                    Notice::error("Could not load streaming item").with_description(e.to_string()),
                )]
            }
        }
    }

    fn on_poll_result(&mut self, result: Result<StreamingItem, Error>, now: Instant) -> Vec<Effect> {
        if self.phase != RefreshPhase::Refreshing {
            return Vec::new();
        }
        let item = match result {
            Ok(item) => item,
            Err(e) => {
                warn!(error = %e, "poll fetch failed");
                self.reset_refresh(RefreshPhase::Idle);
                return vec![Effect::Notify(
                    Notice::error("Failed to load streaming links").with_description(e.to_string()),
                )];
            }
        };

        let server_refreshing = item.refreshing;
        let first = item.first_eligible().map(|l| l.id);
        self.item = Some(item);

        if let Some(link_id) = first {
            info!(item_id = self.item_id, link_id, attempts = self.state.poll_attempt + 1, "links found");
            self.reset_refresh(RefreshPhase::Settled);
            let mut effects = self.switch_to_id(link_id, now);
            effects.push(Effect::Notify(Notice::info("Streaming links found")));
            return effects;
        }

        // The selection may have disappeared with the new item
        let mut effects = self.drop_missing_selection(now);

        if !server_refreshing {
            info!(item_id = self.item_id, "server finished without links");
            self.settle_without_links();
            effects.push(Effect::Notify(Notice::info("No links found")));
            return effects;
        }

        self.state.poll_attempt += 1;
        if self.state.poll_attempt >= self.settings.max_poll_attempts {
            info!(item_id = self.item_id, attempts = self.state.poll_attempt, "giving up on link discovery");
            self.settle_without_links();
            effects.push(Effect::Notify(
                Notice::info("Still no links").with_description("Try refreshing again in a little while."),
            ));
        } else {
            self.next_poll_at = Some(now + self.settings.poll_interval);
        }
        effects
    }

    fn settle_without_links(&mut self) {
        self.phase = RefreshPhase::Settled;
        self.state.refreshing = false;
        self.next_poll_at = None;
        self.pending_poll = None;
    }

    /// Replace the item wholesale and re-resolve the selection against it.
    fn apply_item(&mut self, item: StreamingItem, now: Instant) -> Vec<Effect> {
        let first = item.first_eligible().map(|l| l.id);
        self.item = Some(item);

        let still_valid = self
            .selected_link()
            .map(|l| l.is_active)
            .unwrap_or(false);
        if still_valid {
            return Vec::new();
        }
        match first {
            Some(link_id) => self.switch_to_id(link_id, now),
            None => self.drop_missing_selection(now),
        }
    }

    fn drop_missing_selection(&mut self, now: Instant) -> Vec<Effect> {
        let valid = self.selected_link().map(|l| l.is_active).unwrap_or(false);
        if valid || self.state.selected_link.is_none() {
            return Vec::new();
        }
        self.switch_to(None, now)
    }

    fn switch_to_id(&mut self, link_id: LinkId, now: Instant) -> Vec<Effect> {
        if self.state.selected_link == Some(link_id) {
            return Vec::new();
        }
        match self.item.as_ref().and_then(|i| i.link(link_id)).cloned() {
            Some(link) => self.switch_to(Some(&link), now),
            None => Vec::new(),
        }
    }

    /// Change the selection: release the old surface, reset the flags, arm
    /// the load timeout when the new strategy needs one, attach the new
    /// surface.
    fn switch_to(&mut self, link: Option<&StreamingLink>, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(old) = self.attached.take() {
            debug!(link_id = old.link_id, "releasing surface");
            effects.push(Effect::Release { link_id: old.link_id });
        }
        self.epoch = next_serial();
        self.load_deadline = None;
        self.state.selected_link = link.map(|l| l.id);
        self.state.loading_video = true;
        self.state.playback_error = false;

        let Some(link) = link else {
            return effects;
        };

        let strategy = classify(&link.source_url, &self.settings.blocked_hosts);
        info!(link_id = link.id, strategy = strategy.label(), "link selected");
        if strategy.uses_load_timeout() {
            self.load_deadline = Some(now + self.settings.load_timeout);
        }
        match SurfacePlan::for_strategy(strategy, self.settings.native_adaptive) {
            Some(plan) => {
                let request = SurfaceRequest {
                    link_id: link.id,
                    epoch: self.epoch,
                    url: link.source_url.clone(),
                    strategy,
                    plan,
                };
                self.attached = Some(request.clone());
                effects.push(Effect::Attach(request));
            }
            // No surface, nothing to wait for
            None => self.state.loading_video = false,
        }
        effects
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
