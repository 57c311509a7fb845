//! Streamflix desktop UI

use std::process::Child;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use eframe::egui;
use tracing::{error, info};

use streamflix::api::{ApiClient, CatalogApi, UserStateApi};
use streamflix::catalog::{self, ALL_GENRES};
use streamflix::config::AppConfig;
use streamflix::error::Error;
use streamflix::ffmpeg_player;
use streamflix::launcher;
use streamflix::library::{Library, LibraryEffect, WriteRequest, WriteTarget};
use streamflix::models::*;
use streamflix::notice::Notice;
use streamflix::resolver::{
    Effect, FetchPurpose, FetchTicket, HostSettings, RefreshPhase, Resolver, ResolverSettings, Strategy,
    SurfaceEvent, SurfaceHost, SurfaceKind,
};

const LANGUAGES: &[(&str, &str)] = &[("en", "English"), ("es", "Español"), ("fr", "Français"), ("de", "Deutsch")];
const SUBTITLES: &[(&str, &str)] = &[("off", "Off"), ("en", "English"), ("es", "Español"), ("fr", "Français")];

const TOAST_SECS: u64 = 4;

/// Get current time as HH:MM:SS (UTC)
fn timestamp_now() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}

/// Background task messages
enum TaskResult {
    MoviesLoaded(Vec<Movie>),
    StatesLoaded(Vec<UserMovieState>),
    StreamingLoaded(Vec<StreamingItem>),
    RecommendationsLoaded { movie_id: MovieId, movies: Vec<Movie> },
    ItemFetched { ticket: FetchTicket, result: Result<StreamingItem, Error> },
    RefreshAck { item_id: MovieId, cycle: u64, result: Result<RefreshAck, Error> },
    StateWritten { request: WriteRequest, result: Result<UserMovieState, Error> },
    HistoryCleared(Result<ClearHistoryResponse, Error>),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Home,
    Streaming,
    Search,
    Favorites,
    MyList,
    History,
    Downloads,
    Settings,
    Console,
}

/// Clicks collected while rendering a movie list, applied afterwards.
enum MovieAction {
    Open(MovieId),
    ToggleFavorite(MovieId),
    ToggleMyList(MovieId),
    ToggleDownloaded(MovieId),
}

struct Toast {
    notice: Notice,
    shown_at: Instant,
}

/// Open streaming item: one resolver per view.
struct WatchView {
    resolver: Resolver,
}

pub struct StreamflixApp {
    ctx: egui::Context,
    config: AppConfig,
    client: Arc<ApiClient>,

    // Background task channel
    task_receiver: Receiver<TaskResult>,
    task_sender: Sender<TaskResult>,

    current_tab: Tab,
    status_message: String,
    loading: bool,

    // Catalog
    movies: Vec<Movie>,
    streaming: Vec<StreamingItem>,
    streaming_filter: Option<ContentType>,
    library: Library,

    // Search
    search_query: String,
    search_genre: String,

    // Movie detail
    selected_movie: Option<MovieId>,
    recommendations: Vec<Movie>,
    progress_input: f32,
    movie_player: Option<Child>,

    // Streaming playback
    watch: Option<WatchView>,
    host: SurfaceHost,

    toasts: Vec<Toast>,
    console_log: Vec<String>,
}

impl StreamflixApp {
    pub fn new(ctx: egui::Context, config: AppConfig) -> Self {
        let (task_sender, task_receiver) = channel();
        let client = Arc::new(Self::build_client(&config));
        let host = SurfaceHost::new(HostSettings::from_config(&config));

        let mut app = Self {
            ctx,
            config,
            client,
            task_receiver,
            task_sender,
            current_tab: Tab::Home,
            status_message: String::new(),
            loading: false,
            movies: Vec::new(),
            streaming: Vec::new(),
            streaming_filter: None,
            library: Library::new(),
            search_query: String::new(),
            search_genre: ALL_GENRES.to_string(),
            selected_movie: None,
            recommendations: Vec::new(),
            progress_input: 0.0,
            movie_player: None,
            watch: None,
            host,
            toasts: Vec::new(),
            console_log: Vec::new(),
        };
        app.log(&format!("[INFO] Streamflix {} | API: {}", env!("CARGO_PKG_VERSION"), app.config.api_base_url));
        if !ffmpeg_player::AVAILABLE && app.config.use_internal_player {
            app.log("[WARN] Internal player requested but not built in, using external player");
        }
        app.load_movies();
        app.load_streaming();
        app
    }

    fn build_client(config: &AppConfig) -> ApiClient {
        ApiClient::new(&config.api_base_url)
            .with_token(&config.auth_token)
            .with_user_agent(&config.user_agent)
    }

    fn log(&mut self, message: &str) {
        self.console_log.push(format!("[{}] {}", timestamp_now(), message));
        // Keep last 500 lines
        if self.console_log.len() > 500 {
            self.console_log.remove(0);
        }
    }

    fn notify(&mut self, notice: Notice) {
        let tag = if notice.is_error() { "[ERROR]" } else { "[INFO]" };
        match notice.description {
            Some(ref d) => self.log(&format!("{} {}: {}", tag, notice.title, d)),
            None => self.log(&format!("{} {}", tag, notice.title)),
        }
        self.toasts.push(Toast { notice, shown_at: Instant::now() });
    }

    /// Run `job` on a worker thread and deliver its result to the UI loop.
    fn spawn_task<F>(&self, job: F)
    where
        F: FnOnce(&ApiClient) -> TaskResult + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        let sender = self.task_sender.clone();
        let ctx = self.ctx.clone();
        thread::spawn(move || {
            let _ = sender.send(job(&client));
            ctx.request_repaint();
        });
    }

    // ---- catalog ----

    fn load_movies(&mut self) {
        self.loading = true;
        self.status_message = "Loading movies...".to_string();
        self.spawn_task(|api| match api.fetch_movies() {
            Ok(movies) => TaskResult::MoviesLoaded(movies),
            Err(e) => TaskResult::Error(format!("Movies: {}", e)),
        });
    }

    fn load_streaming(&mut self) {
        let filter = self.streaming_filter;
        self.spawn_task(move |api| match api.fetch_streaming_items(filter) {
            Ok(items) => TaskResult::StreamingLoaded(items),
            Err(e) => TaskResult::Error(format!("Streaming catalog: {}", e)),
        });
    }

    fn open_movie(&mut self, movie_id: MovieId) {
        self.selected_movie = Some(movie_id);
        self.recommendations.clear();
        self.progress_input = self
            .library
            .state(movie_id)
            .map(|s| s.progress_percent as f32)
            .unwrap_or(0.0);
        self.spawn_task(move |api| match api.fetch_recommendations(movie_id) {
            Ok(movies) => TaskResult::RecommendationsLoaded { movie_id, movies },
            Err(e) => TaskResult::Error(format!("Recommendations: {}", e)),
        });
    }

    fn movie(&self, movie_id: MovieId) -> Option<&Movie> {
        self.movies
            .iter()
            .chain(self.recommendations.iter())
            .find(|m| m.id == movie_id)
    }

    /// Launch the movie's own video URL in the configured player.
    fn play_movie(&mut self, movie_id: MovieId) {
        let Some(movie) = self.movie(movie_id).cloned() else {
            return;
        };
        if movie.video_url.is_empty() {
            self.notify(Notice::error("No video available for this title"));
            return;
        }

        if self.config.single_window_mode {
            if let Some(mut child) = self.movie_player.take() {
                launcher::kill_and_reap(&mut child);
                self.log("[PLAY] Single window mode - closing previous player");
            }
        }

        let player = self.config.player_command();
        let opts = self.host.settings().launch.clone();
        self.log(&format!("[PLAY] {} | Player: {}", movie.title, player));
        self.log(&format!("[PLAY] URL: {}", movie.video_url));

        match launcher::spawn_player(&player, &movie.title, &movie.video_url, &opts) {
            Ok(child) => {
                self.log(&format!("[PLAY] Player launched successfully (PID: {})", child.id()));
                if self.config.single_window_mode {
                    self.movie_player = Some(child);
                } else {
                    launcher::detach(child);
                }
                // Opening a title counts as watching it
                if !self.library.state(movie_id).map(|s| s.has_progress()).unwrap_or(false) {
                    let effects = self.library.set_progress(movie_id, 0, 0, Some(WatchStatus::Watching), chrono::Utc::now());
                    self.run_library_effects(effects);
                }
            }
            Err(e) => {
                error!(%player, error = %e, "failed to launch player");
                self.notify(Notice::error("Failed to launch player").with_description(format!("{}: {}", player, e)));
            }
        }
    }

    fn save_progress(&mut self, movie_id: MovieId, explicit: Option<WatchStatus>) {
        let percent = self.progress_input.round().clamp(0.0, 100.0) as u8;
        let duration_secs = self.movie(movie_id).map(|m| m.duration_minutes * 60).unwrap_or(0);
        let position = duration_secs * percent as u32 / 100;
        let effects = self.library.set_progress(movie_id, percent, position, explicit, chrono::Utc::now());
        self.run_library_effects(effects);
    }

    fn clear_history(&mut self) {
        self.log("[INFO] Clearing watch history");
        self.spawn_task(|api| TaskResult::HistoryCleared(api.clear_history()));
    }

    fn apply_movie_action(&mut self, action: MovieAction) {
        let effects = match action {
            MovieAction::Open(id) => {
                self.open_movie(id);
                return;
            }
            MovieAction::ToggleFavorite(id) => self.library.toggle_favorite(id),
            MovieAction::ToggleMyList(id) => self.library.toggle_my_list(id),
            MovieAction::ToggleDownloaded(id) => self.library.toggle_downloaded(id),
        };
        self.run_library_effects(effects);
    }

    fn run_library_effects(&mut self, effects: Vec<LibraryEffect>) {
        for effect in effects {
            match effect {
                LibraryEffect::Write(request) => self.spawn_task(move |api| {
                    let result = match request.target {
                        WriteTarget::Patch(state_id) => api.patch_user_state(state_id, &request.patch),
                        WriteTarget::Upsert(movie_id) => api.upsert_user_state(movie_id, &request.patch),
                    };
                    TaskResult::StateWritten { request, result }
                }),
                LibraryEffect::Notify(notice) => self.notify(notice),
            }
        }
    }

    // ---- streaming playback ----

    fn open_watch(&mut self, item_id: MovieId, title: &str) {
        self.close_watch();
        self.log(&format!("[PLAY] Opening {} (#{})", title, item_id));
        let settings = ResolverSettings::from_config(&self.config, self.host.settings().native_adaptive());
        let mut resolver = Resolver::new(item_id, settings);
        self.host.set_title(title);
        let effects = resolver.start();
        self.watch = Some(WatchView { resolver });
        self.run_effects(effects);
    }

    fn close_watch(&mut self) {
        if let Some(mut view) = self.watch.take() {
            let effects = view.resolver.teardown();
            self.run_effects(effects);
            self.host.release_all();
        }
    }

    /// Drive the open resolver: `f` gets it and returns the effects to run.
    fn with_resolver<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Resolver, Instant) -> Vec<Effect>,
    {
        let Some(view) = self.watch.as_mut() else {
            return;
        };
        let effects = f(&mut view.resolver, Instant::now());
        self.run_effects(effects);
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        let now = Instant::now();
        for effect in effects {
            if self.host.execute(&effect, now) {
                continue;
            }
            match effect {
                Effect::Fetch(ticket) => self.spawn_task(move |api| {
                    let result = match ticket.purpose {
                        FetchPurpose::Validate => api.validate_links(ticket.item_id),
                        FetchPurpose::Load | FetchPurpose::Poll => api.fetch_streaming_item(ticket.item_id),
                    };
                    TaskResult::ItemFetched { ticket, result }
                }),
                Effect::RequestLinkRefresh { item_id, cycle } => {
                    self.log(&format!("[INFO] Requesting link refresh for #{}", item_id));
                    self.spawn_task(move |api| TaskResult::RefreshAck {
                        item_id,
                        cycle,
                        result: api.request_link_refresh(item_id),
                    });
                }
                Effect::Notify(notice) => self.notify(notice),
                Effect::Attach(_) | Effect::Reload(_) | Effect::Release { .. } => {}
            }
        }
    }

    fn pump_surfaces(&mut self, now: Instant) {
        for event in self.host.pump(now) {
            match event {
                SurfaceEvent::Log(line) => self.log(&line),
                SurfaceEvent::Signal { link_id, epoch, signal } => {
                    self.with_resolver(|r, _| r.on_surface_signal(link_id, epoch, signal));
                }
            }
        }
    }

    fn open_external(&mut self, url: &str) {
        self.log(&format!("[PLAY] Opening in browser: {}", url));
        if let Err(e) = launcher::open_in_browser(url) {
            self.notify(Notice::error("Could not open browser").with_description(e.to_string()));
        }
    }

    fn apply_settings(&mut self) {
        self.client = Arc::new(Self::build_client(&self.config));
        self.close_watch();
        self.host = SurfaceHost::new(HostSettings::from_config(&self.config));
        self.ctx.set_visuals(if self.config.dark_mode { egui::Visuals::dark() } else { egui::Visuals::light() });
        match self.config.save() {
            Ok(()) => self.notify(Notice::info("Settings saved")),
            Err(e) => self.notify(Notice::error("Could not save settings").with_description(e.to_string())),
        }
    }

    fn handle_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::MoviesLoaded(movies) => {
                self.log(&format!("[INFO] Loaded {} movies", movies.len()));
                self.library.absorb_movies(&movies);
                self.movies = movies;
                self.loading = false;
                self.status_message = format!("{} titles", self.movies.len());
                self.spawn_task(|api| match api.fetch_user_states() {
                    Ok(states) => TaskResult::StatesLoaded(states),
                    Err(e) => TaskResult::Error(format!("User states: {}", e)),
                });
            }
            TaskResult::StatesLoaded(states) => {
                self.log(&format!("[INFO] Loaded {} user states", states.len()));
                self.library.absorb_states(&states);
            }
            TaskResult::StreamingLoaded(items) => {
                self.log(&format!("[INFO] Loaded {} streaming items", items.len()));
                self.streaming = items;
            }
            TaskResult::RecommendationsLoaded { movie_id, movies } => {
                if self.selected_movie == Some(movie_id) {
                    self.library.absorb_movies(&movies);
                    self.recommendations = movies;
                }
            }
            TaskResult::ItemFetched { ticket, result } => {
                if let Ok(item) = &result {
                    info!(item_id = item.id, links = item.links.len(), refreshing = item.refreshing, "streaming item fetched");
                }
                self.with_resolver(|r, now| r.on_item_fetched(ticket, result, now));
            }
            TaskResult::RefreshAck { item_id, cycle, result } => {
                if let Ok(ref ack) = result {
                    self.log(&format!("[INFO] Refresh #{}: {}", item_id, ack.message));
                }
                self.with_resolver(|r, _| {
                    if r.item_id() == item_id {
                        r.on_refresh_ack(cycle, result)
                    } else {
                        Vec::new()
                    }
                });
            }
            TaskResult::StateWritten { request, result } => {
                let effects = self.library.on_write_result(&request, result);
                self.run_library_effects(effects);
            }
            TaskResult::HistoryCleared(result) => {
                let effects = self.library.on_history_cleared(result);
                self.run_library_effects(effects);
            }
            TaskResult::Error(msg) => {
                self.loading = false;
                self.status_message = format!("Error: {}", msg);
                self.notify(Notice::error("Request failed").with_description(msg));
            }
        }
    }
}

impl Drop for StreamflixApp {
    fn drop(&mut self) {
        self.close_watch();
        if let Some(mut child) = self.movie_player.take() {
            launcher::kill_and_reap(&mut child);
        }
    }
}

impl eframe::App for StreamflixApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Process background task results (non-blocking)
        while let Ok(result) = self.task_receiver.try_recv() {
            self.handle_task(result);
        }

        let now = Instant::now();
        if self.watch.is_some() {
            self.with_resolver(|r, now| r.tick(now));
            self.pump_surfaces(now);

            // Wake for the next timer, and poll surfaces meanwhile
            let mut wake = Duration::from_millis(250);
            let deadlines = [
                self.watch.as_ref().and_then(|w| w.resolver.next_deadline()),
                self.host.next_wake(),
            ];
            for deadline in deadlines.into_iter().flatten() {
                wake = wake.min(deadline.saturating_duration_since(now));
            }
            ctx.request_repaint_after(wake);
        }

        self.toasts
            .retain(|t| now.duration_since(t.shown_at) < Duration::from_secs(TOAST_SECS));
        if !self.toasts.is_empty() {
            ctx.request_repaint_after(Duration::from_millis(500));
        }

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.add_space(5.0);
            ui.horizontal(|ui| {
                ui.heading("🎬 Streamflix");
                ui.separator();
                let before = self.current_tab;
                ui.selectable_value(&mut self.current_tab, Tab::Home, "🏠 HOME");
                ui.selectable_value(&mut self.current_tab, Tab::Streaming, "📡 STREAMING");
                ui.selectable_value(&mut self.current_tab, Tab::Search, "🔍 SEARCH");
                ui.selectable_value(&mut self.current_tab, Tab::Favorites, "⭐ FAVORITES");
                ui.selectable_value(&mut self.current_tab, Tab::MyList, "📋 MY LIST");
                ui.selectable_value(&mut self.current_tab, Tab::History, "🕐 HISTORY");
                ui.selectable_value(&mut self.current_tab, Tab::Downloads, "⬇ DOWNLOADS");
                ui.selectable_value(&mut self.current_tab, Tab::Settings, "⚙ SETTINGS");
                ui.selectable_value(&mut self.current_tab, Tab::Console, "🖥 CONSOLE");
                if self.current_tab != before {
                    self.selected_movie = None;
                    self.close_watch();
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("🔄 Reload").on_hover_text("Reload the catalog").clicked() {
                        self.load_movies();
                        self.load_streaming();
                    }
                });
            });
            ui.add_space(5.0);
        });

        // Bottom panel - Status
        egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.loading {
                    ui.spinner();
                }
                ui.label(&self.status_message);
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.watch.is_some() {
                self.show_watch_view(ctx, ui);
                return;
            }
            if let Some(movie_id) = self.selected_movie {
                self.show_movie_detail(ui, movie_id);
                return;
            }
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| match self.current_tab {
                    Tab::Home => self.show_home_tab(ui),
                    Tab::Streaming => self.show_streaming_tab(ui),
                    Tab::Search => self.show_search_tab(ui),
                    Tab::Favorites => self.show_library_tab(ui, Tab::Favorites),
                    Tab::MyList => self.show_library_tab(ui, Tab::MyList),
                    Tab::History => self.show_history_tab(ui),
                    Tab::Downloads => self.show_library_tab(ui, Tab::Downloads),
                    Tab::Settings => self.show_settings_tab(ui),
                    Tab::Console => self.show_console_tab(ui),
                });
        });

        self.show_toasts(ctx);
    }
}

impl StreamflixApp {
    fn show_toasts(&self, ctx: &egui::Context) {
        if self.toasts.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -36.0))
            .show(ctx, |ui| {
                for toast in self.toasts.iter().rev().take(4) {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.set_max_width(320.0);
                        let color = if toast.notice.is_error() {
                            egui::Color32::from_rgb(230, 80, 80)
                        } else {
                            egui::Color32::from_rgb(100, 149, 237)
                        };
                        ui.label(egui::RichText::new(&toast.notice.title).strong().color(color));
                        if let Some(ref d) = toast.notice.description {
                            ui.label(egui::RichText::new(d).small());
                        }
                    });
                }
            });
    }

    /// Rows with favorite / list / download toggles. Returns the click, if any.
    fn movie_rows(ui: &mut egui::Ui, movies: &[&Movie], library: &Library) -> Option<MovieAction> {
        let mut action = None;
        for movie in movies {
            ui.horizontal(|ui| {
                let is_fav = library.is_favorite(movie.id);
                let fav_text = if is_fav {
                    egui::RichText::new("★").size(18.0).color(egui::Color32::GOLD)
                } else {
                    egui::RichText::new("☆").size(18.0).color(egui::Color32::GRAY)
                };
                if ui
                    .button(fav_text)
                    .on_hover_text(if is_fav { "Remove from favorites" } else { "Add to favorites" })
                    .clicked()
                {
                    action = Some(MovieAction::ToggleFavorite(movie.id));
                }
                let listed = if library.in_my_list(movie.id) { "✔ List" } else { "➕ List" };
                if ui.button(listed).clicked() {
                    action = Some(MovieAction::ToggleMyList(movie.id));
                }
                let downloaded = if library.is_downloaded(movie.id) { "✔ Saved" } else { "⬇ Save" };
                if ui.button(downloaded).clicked() {
                    action = Some(MovieAction::ToggleDownloaded(movie.id));
                }
                if ui.link(&movie.title).clicked() {
                    action = Some(MovieAction::Open(movie.id));
                }
                let mut meta = format!("{}", movie.year);
                if !movie.genre.is_empty() {
                    meta.push_str(&format!(" • {}", movie.genre.join(", ")));
                }
                if movie.is_new {
                    meta.push_str(" • NEW");
                }
                ui.label(egui::RichText::new(meta).weak());
            });
        }
        if movies.is_empty() {
            ui.label(egui::RichText::new("Nothing here yet").weak());
        }
        action
    }

    fn show_home_tab(&mut self, ui: &mut egui::Ui) {
        let mut action = None;
        let mut browse_genre = None;

        ui.horizontal(|ui| {
            ui.heading("🔥 Trending Now");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🎲 Surprise me").clicked() {
                    if let Some(movie) = catalog::random_pick(&self.movies) {
                        action = Some(MovieAction::Open(movie.id));
                    }
                }
            });
        });
        let trending = catalog::trending(&self.movies);
        if let Some(a) = Self::movie_rows(ui, &trending, &self.library) {
            action = Some(a);
        }

        ui.add_space(12.0);
        ui.heading("🆕 New Releases");
        let fresh = catalog::new_releases(&self.movies);
        if let Some(a) = Self::movie_rows(ui, &fresh, &self.library) {
            action = Some(a);
        }

        ui.add_space(12.0);
        ui.heading("📂 Categories");
        ui.horizontal_wrapped(|ui| {
            for (genre, count) in catalog::genre_counts(&self.movies) {
                if ui.button(format!("{} ({} titles)", genre, count)).clicked() {
                    browse_genre = Some(genre);
                }
            }
        });

        if let Some(genre) = browse_genre {
            self.search_genre = genre;
            self.search_query.clear();
            self.current_tab = Tab::Search;
        }
        if let Some(action) = action {
            self.apply_movie_action(action);
        }
    }

    fn show_search_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("🔍");
            ui.add(
                egui::TextEdit::singleline(&mut self.search_query)
                    .hint_text("Search movies, TV shows, genres...")
                    .desired_width(360.0),
            );
            if !self.search_query.is_empty() && ui.button("✖").clicked() {
                self.search_query.clear();
            }
        });
        ui.horizontal_wrapped(|ui| {
            for genre in catalog::genre_filters(&self.movies) {
                let selected = self.search_genre == genre;
                if ui.selectable_label(selected, &genre).clicked() {
                    self.search_genre = genre;
                }
            }
        });
        ui.separator();

        let results = catalog::search(&self.movies, &self.search_query, &self.search_genre);
        ui.label(egui::RichText::new(format!("{} results", results.len())).weak());
        if let Some(action) = Self::movie_rows(ui, &results, &self.library) {
            self.apply_movie_action(action);
        }
    }

    fn show_library_tab(&mut self, ui: &mut egui::Ui, tab: Tab) {
        let (title, list) = match tab {
            Tab::Favorites => ("⭐ Favorites", self.library.favorites(&self.movies)),
            Tab::MyList => ("📋 My List", self.library.my_list(&self.movies)),
            _ => ("⬇ Downloads", self.library.downloads(&self.movies)),
        };
        ui.heading(title);
        ui.separator();
        if let Some(action) = Self::movie_rows(ui, &list, &self.library) {
            self.apply_movie_action(action);
        }
    }

    fn show_history_tab(&mut self, ui: &mut egui::Ui) {
        let mut clear = false;
        let mut action = None;
        ui.horizontal(|ui| {
            ui.heading("🕐 Watch History");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear All").clicked() {
                    clear = true;
                }
            });
        });
        ui.separator();

        let history = self.library.history(&self.movies);
        if history.is_empty() {
            ui.label(egui::RichText::new("No watch history").weak());
        }
        for movie in history {
            let Some(state) = self.library.state(movie.id) else {
                continue;
            };
            ui.horizontal(|ui| {
                if ui.link(&movie.title).clicked() {
                    action = Some(MovieAction::Open(movie.id));
                }
                ui.add(
                    egui::ProgressBar::new(state.progress_percent as f32 / 100.0)
                        .desired_width(160.0)
                        .text(format!("{}%", state.progress_percent)),
                );
                let status = match state.status {
                    Some(WatchStatus::Watched) => "Watched",
                    Some(WatchStatus::Watching) => "Watching",
                    None => "",
                };
                ui.label(status);
                if let Some(at) = state.last_watched_at {
                    ui.label(egui::RichText::new(at.format("%Y-%m-%d %H:%M").to_string()).weak());
                }
            });
        }

        if clear {
            self.clear_history();
        }
        if let Some(action) = action {
            self.apply_movie_action(action);
        }
    }

    fn show_movie_detail(&mut self, ui: &mut egui::Ui, movie_id: MovieId) {
        let Some(movie) = self.movie(movie_id).cloned() else {
            ui.label("Movie not found");
            if ui.button("⬅ Back").clicked() {
                self.selected_movie = None;
            }
            return;
        };

        let mut back = false;
        let mut play = false;
        let mut save: Option<Option<WatchStatus>> = None;
        let mut action = None;

        ui.horizontal(|ui| {
            if ui.button("⬅ Back").clicked() {
                back = true;
            }
            ui.heading(&movie.title);
        });
        ui.label(
            egui::RichText::new(format!(
                "{} • {} min • {} • {}",
                movie.year,
                movie.duration_minutes,
                movie.rating,
                movie.genre.join(", ")
            ))
            .weak(),
        );
        if movie.match_score > 0 {
            ui.label(egui::RichText::new(format!("{}% match", movie.match_score)).color(egui::Color32::GREEN));
        }
        ui.add_space(6.0);
        ui.label(&movie.description);
        ui.add_space(8.0);

        ui.horizontal(|ui| {
            if ui.button("▶ Play").clicked() {
                play = true;
            }
            let fav = if self.library.is_favorite(movie_id) { "★ Favorite" } else { "☆ Favorite" };
            if ui.button(fav).clicked() {
                action = Some(MovieAction::ToggleFavorite(movie_id));
            }
            let listed = if self.library.in_my_list(movie_id) { "✔ My List" } else { "➕ My List" };
            if ui.button(listed).clicked() {
                action = Some(MovieAction::ToggleMyList(movie_id));
            }
            let saved = if self.library.is_downloaded(movie_id) { "✔ Downloaded" } else { "⬇ Download" };
            if ui.button(saved).clicked() {
                action = Some(MovieAction::ToggleDownloaded(movie_id));
            }
            if self.library.is_pending(movie_id) {
                ui.spinner();
            }
        });

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            ui.label("Progress:");
            ui.add(egui::Slider::new(&mut self.progress_input, 0.0..=100.0).suffix("%"));
            if ui.button("💾 Save Progress").clicked() {
                save = Some(None);
            }
            if ui.button("✔ Mark Watched").clicked() {
                self.progress_input = 100.0;
                save = Some(Some(WatchStatus::Watched));
            }
        });

        ui.add_space(12.0);
        ui.heading("More Like This");
        let recs: Vec<&Movie> = self.recommendations.iter().collect();
        if let Some(a) = Self::movie_rows(ui, &recs, &self.library) {
            action = Some(a);
        }

        if back {
            self.selected_movie = None;
        }
        if play {
            self.play_movie(movie_id);
        }
        if let Some(explicit) = save {
            self.save_progress(movie_id, explicit);
        }
        if let Some(action) = action {
            self.apply_movie_action(action);
        }
    }

    fn show_streaming_tab(&mut self, ui: &mut egui::Ui) {
        let mut open: Option<(MovieId, String)> = None;
        let before = self.streaming_filter;

        ui.horizontal(|ui| {
            ui.heading("📡 Streaming");
            ui.separator();
            ui.selectable_value(&mut self.streaming_filter, None, "All");
            ui.selectable_value(&mut self.streaming_filter, Some(ContentType::Movie), "Movies");
            ui.selectable_value(&mut self.streaming_filter, Some(ContentType::Show), "Shows");
        });
        ui.separator();

        if self.streaming.is_empty() {
            ui.label(egui::RichText::new("No streaming titles").weak());
        }
        for item in &self.streaming {
            ui.horizontal(|ui| {
                if ui.link(&item.title).clicked() {
                    open = Some((item.id, item.title.clone()));
                }
                let year = item.year.map(|y| y.to_string()).unwrap_or_default();
                let active = item.eligible_links().count();
                ui.label(
                    egui::RichText::new(format!(
                        "{} • {} • {}/{} links active",
                        year,
                        item.content_type.as_str(),
                        active,
                        item.links.len()
                    ))
                    .weak(),
                );
                if item.refreshing {
                    ui.label(egui::RichText::new("refreshing").color(egui::Color32::YELLOW));
                }
            });
        }

        if self.streaming_filter != before {
            self.load_streaming();
        }
        if let Some((id, title)) = open {
            self.open_watch(id, &title);
        }
    }

    fn show_watch_view(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let Some(view) = self.watch.as_ref() else {
            return;
        };
        let resolver = &view.resolver;
        let state = resolver.state().clone();
        let strategy = resolver.strategy();
        let selected = resolver.selected_link().cloned();
        let item = resolver.item().cloned();
        let max_polls = resolver.settings().max_poll_attempts;
        let is_loading = resolver.is_loading();
        let load_error = resolver.load_error().map(str::to_string);
        let settled_empty = resolver.phase() == RefreshPhase::Settled && state.selected_link.is_none();
        let internal_video = self.host.shows_internal_player();

        let mut back = false;
        let mut reload = false;
        let mut retry = false;
        let mut refresh = false;
        let mut validate = false;
        let mut pick: Option<LinkId> = None;
        let mut external: Option<String> = None;

        ui.horizontal(|ui| {
            if ui.button("⬅ Back").clicked() {
                back = true;
            }
            match item {
                Some(ref item) => {
                    ui.heading(&item.title);
                    let year = item.year.map(|y| y.to_string()).unwrap_or_default();
                    ui.label(egui::RichText::new(format!("{} • {}", year, item.content_type.as_str())).weak());
                }
                None => {
                    ui.heading("Loading...");
                }
            }
        });
        ui.separator();

        if is_loading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Loading streaming links...");
            });
        }
        if let Some(ref e) = load_error {
            ui.colored_label(egui::Color32::RED, format!("Error: {}", e));
            if ui.button("🔄 Try again").clicked() {
                reload = true;
            }
        }

        // Playback surface
        ui.group(|ui| {
            ui.set_min_height(240.0);
            ui.set_width(ui.available_width());
            match (strategy, selected.as_ref()) {
                (None, _) => {
                    if state.refreshing {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label(format!("Searching for links... ({}/{})", state.poll_attempt, max_polls));
                        });
                    } else if item.is_some() {
                        ui.label("No playable links available.");
                        if settled_empty {
                            ui.label(egui::RichText::new("Still no links. Try refreshing again in a little while.").weak());
                        }
                    }
                }
                (Some(Strategy::ExternalOpen), Some(link)) => {
                    ui.label("This provider does not allow embedded playback.");
                    if ui.button("🌐 Open in browser").clicked() {
                        external = Some(link.source_url.clone());
                    }
                }
                (Some(strategy), Some(link)) => {
                    ui.label(egui::RichText::new(strategy.label()).weak());
                    if state.playback_error {
                        ui.colored_label(egui::Color32::RED, "⚠ Playback failed");
                        ui.label("Retry, or pick another link below.");
                        if ui.button("🔄 Retry").clicked() {
                            retry = true;
                        }
                    } else if state.loading_video {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label(match strategy.surface() {
                                SurfaceKind::Frame => "Loading embedded player...",
                                _ => "Starting playback...",
                            });
                        });
                    }

                    match strategy.surface() {
                        SurfaceKind::Video if internal_video => {
                            self.host.player_window().show(ctx, ui);
                        }
                        SurfaceKind::Video => {
                            if !state.loading_video && !state.playback_error {
                                ui.label("▶ Playing in external player");
                            }
                        }
                        SurfaceKind::Frame => {
                            if !state.loading_video && !state.playback_error {
                                ui.label("Embedded player is ready.");
                            }
                            if ui.button("🌐 Open player").clicked() {
                                external = Some(link.source_url.clone());
                            }
                        }
                        SurfaceKind::None => {}
                    }
                }
                (Some(_), None) => {}
            }
        });

        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let refresh_label = if state.refreshing { "⏳ Refreshing..." } else { "🔄 Refresh links" };
            if ui.add_enabled(!state.refreshing, egui::Button::new(refresh_label)).clicked() {
                refresh = true;
            }
            if ui.button("✅ Validate links").clicked() {
                validate = true;
            }
            if let Some(ref link) = selected {
                if ui.button("🔗 Open source URL").clicked() {
                    external = Some(link.source_url.clone());
                }
            }
        });

        // Link picker
        if let Some(ref item) = item {
            ui.add_space(8.0);
            ui.heading(format!("Links ({})", item.links.len()));
            egui::Grid::new("link_picker").striped(true).num_columns(5).show(ui, |ui| {
                ui.strong("Quality");
                ui.strong("Language");
                ui.strong("Status");
                ui.strong("Last checked");
                ui.label("");
                ui.end_row();
                for link in &item.links {
                    ui.label(&link.quality);
                    ui.label(&link.language);
                    if link.is_active {
                        ui.colored_label(egui::Color32::GREEN, "Active");
                    } else {
                        ui.colored_label(egui::Color32::GRAY, "Inactive");
                    }
                    let checked = link
                        .last_checked
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    ui.label(checked);
                    let is_selected = state.selected_link == Some(link.id);
                    let text = if is_selected { "▶ Playing" } else { "Play" };
                    if ui
                        .add_enabled(link.is_active && !is_selected, egui::Button::new(text))
                        .clicked()
                    {
                        pick = Some(link.id);
                    }
                    ui.end_row();
                }
            });
        }

        if back {
            self.close_watch();
            return;
        }
        if reload {
            self.with_resolver(|r, _| r.start());
        }
        if retry {
            self.log("[PLAY] Retrying playback");
            self.with_resolver(|r, now| r.retry(now));
        }
        if refresh {
            self.with_resolver(|r, now| r.request_refresh(now));
        }
        if validate {
            self.log("[INFO] Validating links");
            self.with_resolver(|r, _| r.validate());
        }
        if let Some(link_id) = pick {
            self.with_resolver(|r, now| r.select_link(link_id, now));
        }
        if let Some(url) = external {
            self.open_external(&url);
        }
    }

    fn show_settings_tab(&mut self, ui: &mut egui::Ui) {
        let mut save = false;
        ui.heading("⚙ Settings");
        ui.separator();

        egui::Grid::new("settings_grid").num_columns(2).spacing([12.0, 8.0]).show(ui, |ui| {
            ui.label("API base URL:");
            ui.text_edit_singleline(&mut self.config.api_base_url);
            ui.end_row();

            ui.label("Auth token:");
            ui.add(egui::TextEdit::singleline(&mut self.config.auth_token).password(true));
            ui.end_row();

            ui.label("External player:");
            ui.add(egui::TextEdit::singleline(&mut self.config.external_player).hint_text("ffplay"))
                .on_hover_text("ffplay, mpv, vlc or a full path");
            ui.end_row();

            ui.label("Internal player:");
            ui.add_enabled(
                ffmpeg_player::AVAILABLE,
                egui::Checkbox::new(&mut self.config.use_internal_player, "Use built-in decoder"),
            )
            .on_disabled_hover_text("Build with --features internal-player");
            ui.end_row();

            ui.label("Hardware acceleration:");
            ui.checkbox(&mut self.config.hw_accel, "");
            ui.end_row();

            ui.label("Buffer:");
            ui.add(egui::Slider::new(&mut self.config.buffer_seconds, 1..=30).suffix(" s"));
            ui.end_row();

            ui.label("Single window mode:");
            ui.checkbox(&mut self.config.single_window_mode, "Close previous player");
            ui.end_row();

            ui.label("User agent:");
            ui.text_edit_singleline(&mut self.config.user_agent);
            ui.end_row();

            ui.label("");
            ui.checkbox(&mut self.config.pass_user_agent_to_player, "Pass user agent to player");
            ui.end_row();

            ui.label("Embed load timeout:");
            ui.add(egui::Slider::new(&mut self.config.load_timeout_secs, 15..=20).suffix(" s"));
            ui.end_row();

            ui.label("Theme:");
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.config.dark_mode, true, "🌙 Dark");
                ui.selectable_value(&mut self.config.dark_mode, false, "☀ Light");
            });
            ui.end_row();

            ui.label("Language:");
            combo(ui, "language", &mut self.config.language, LANGUAGES);
            ui.end_row();

            ui.label("Subtitles:");
            combo(ui, "subtitles", &mut self.config.subtitles, SUBTITLES);
            ui.end_row();
        });

        ui.add_space(10.0);
        if ui.button("💾 Save").clicked() {
            save = true;
        }
        ui.label(egui::RichText::new(AppConfig::config_path().display().to_string()).weak().small());

        if save {
            self.log("[INFO] Applying settings");
            self.apply_settings();
        }
    }

    fn show_console_tab(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Console Log");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.console_log.clear();
                    self.console_log.push(format!("[{}] Console cleared", timestamp_now()));
                }
            });
        });
        ui.separator();

        for line in &self.console_log {
            let color = if line.contains("[ERROR]") {
                egui::Color32::RED
            } else if line.contains("[WARN]") {
                egui::Color32::YELLOW
            } else if line.contains("[INFO]") {
                egui::Color32::LIGHT_BLUE
            } else if line.contains("[PLAY]") {
                egui::Color32::GREEN
            } else {
                egui::Color32::GRAY
            };
            ui.label(egui::RichText::new(line).monospace().color(color));
        }
    }
}

/// Combo box over (code, label) pairs bound to a code string.
fn combo(ui: &mut egui::Ui, id: &str, value: &mut String, choices: &[(&str, &str)]) {
    let current = choices
        .iter()
        .find(|(code, _)| *code == value.as_str())
        .map(|(_, label)| *label)
        .unwrap_or(value.as_str())
        .to_string();
    egui::ComboBox::from_id_salt(id)
        .selected_text(current)
        .show_ui(ui, |ui| {
            for (code, label) in choices {
                ui.selectable_value(value, code.to_string(), *label);
            }
        });
}
