//! Per-movie user state: favorites, My List, downloads and watch progress
//!
//! Local flags are applied optimistically and reconciled with the server one
//! write at a time per movie. Like the resolver this holds no I/O: mutations
//! return [`LibraryEffect`]s and completions are fed back in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Error;
use crate::models::{ClearHistoryResponse, Movie, MovieId, StateId, StatePatch, UserMovieState, WatchStatus};
use crate::notice::Notice;

/// Progress at or above this marks a movie as watched.
pub const WATCHED_THRESHOLD: u8 = 95;

/// Status recorded with a progress update. An explicit status always wins.
pub fn status_for_progress(percent: u8, explicit: Option<WatchStatus>) -> WatchStatus {
    explicit.unwrap_or(if percent >= WATCHED_THRESHOLD {
        WatchStatus::Watched
    } else {
        WatchStatus::Watching
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// Partial update of an existing record.
    Patch(StateId),
    /// Create-or-update keyed by movie.
    Upsert(MovieId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub movie_id: MovieId,
    pub seq: u64,
    pub target: WriteTarget,
    pub patch: StatePatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEffect {
    Write(WriteRequest),
    Notify(Notice),
}

struct InFlight {
    seq: u64,
    /// Patches made while the write was out, sent as one follow-up.
    queued: Option<StatePatch>,
}

#[derive(Default)]
pub struct Library {
    /// Records as last confirmed by the server.
    confirmed: HashMap<MovieId, UserMovieState>,
    /// What the UI shows: confirmed records with pending patches applied.
    shown: HashMap<MovieId, UserMovieState>,
    inflight: HashMap<MovieId, InFlight>,
    /// Owning movie of every record seen so far. The listing endpoint does
    /// not return `movie_id`, so its records are matched through this.
    owners: HashMap<StateId, MovieId>,
    seq: u64,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the state map from the records embedded in movie responses.
    pub fn from_movies(movies: &[Movie]) -> Self {
        let mut library = Self::new();
        library.absorb_movies(movies);
        library
    }

    /// Take fresh server records for every movie without a write in flight.
    pub fn absorb_movies(&mut self, movies: &[Movie]) {
        for movie in movies {
            if self.inflight.contains_key(&movie.id) {
                continue;
            }
            match movie.user_state {
                Some(ref state) => self.confirm(movie.id, state.clone()),
                None => {
                    self.confirmed.remove(&movie.id);
                    self.shown.remove(&movie.id);
                }
            }
        }
    }

    /// Take records from the user-state listing. A record is matched to its
    /// movie by `movie_id` when present, else by a record id seen earlier.
    /// Unmatched records and movies with a write in flight are skipped.
    pub fn absorb_states(&mut self, states: &[UserMovieState]) {
        for state in states {
            let Some(movie_id) = state.movie_id.or_else(|| self.owners.get(&state.id).copied()) else {
                debug!(state_id = state.id, "skipping user state for an unknown movie");
                continue;
            };
            if self.inflight.contains_key(&movie_id) {
                continue;
            }
            self.confirm(movie_id, state.clone());
        }
    }

    /// Store a server record as both confirmed and shown.
    fn confirm(&mut self, movie_id: MovieId, mut state: UserMovieState) {
        state.movie_id = Some(movie_id);
        self.owners.insert(state.id, movie_id);
        self.confirmed.insert(movie_id, state.clone());
        self.shown.insert(movie_id, state);
    }

    pub fn state(&self, movie_id: MovieId) -> Option<&UserMovieState> {
        self.shown.get(&movie_id)
    }

    pub fn is_pending(&self, movie_id: MovieId) -> bool {
        self.inflight.contains_key(&movie_id)
    }

    pub fn is_favorite(&self, movie_id: MovieId) -> bool {
        self.state(movie_id).map(|s| s.is_favorite).unwrap_or(false)
    }

    pub fn in_my_list(&self, movie_id: MovieId) -> bool {
        self.state(movie_id).map(|s| s.in_my_list).unwrap_or(false)
    }

    pub fn is_downloaded(&self, movie_id: MovieId) -> bool {
        self.state(movie_id).map(|s| s.is_downloaded).unwrap_or(false)
    }

    pub fn toggle_favorite(&mut self, movie_id: MovieId) -> Vec<LibraryEffect> {
        let patch = StatePatch { is_favorite: Some(!self.is_favorite(movie_id)), ..Default::default() };
        self.mutate(movie_id, patch)
    }

    pub fn toggle_my_list(&mut self, movie_id: MovieId) -> Vec<LibraryEffect> {
        let patch = StatePatch { in_my_list: Some(!self.in_my_list(movie_id)), ..Default::default() };
        self.mutate(movie_id, patch)
    }

    pub fn toggle_downloaded(&mut self, movie_id: MovieId) -> Vec<LibraryEffect> {
        let patch = StatePatch { is_downloaded: Some(!self.is_downloaded(movie_id)), ..Default::default() };
        self.mutate(movie_id, patch)
    }

    /// Record watch progress. Status follows [`status_for_progress`].
    pub fn set_progress(
        &mut self,
        movie_id: MovieId,
        percent: u8,
        position_seconds: u32,
        explicit_status: Option<WatchStatus>,
        now: DateTime<Utc>,
    ) -> Vec<LibraryEffect> {
        let percent = percent.min(100);
        let patch = StatePatch {
            status: Some(Some(status_for_progress(percent, explicit_status))),
            progress_percent: Some(percent),
            position_seconds: Some(position_seconds),
            ..Default::default()
        };
        let effects = self.mutate(movie_id, patch);
        if let Some(state) = self.shown.get_mut(&movie_id) {
            state.last_watched_at = Some(now);
        }
        effects
    }

    /// Apply `patch` locally and send it, or queue it behind the write
    /// already in flight for this movie.
    pub fn mutate(&mut self, movie_id: MovieId, patch: StatePatch) -> Vec<LibraryEffect> {
        if patch.is_empty() {
            return Vec::new();
        }
        let shown = self.shown.entry(movie_id).or_insert_with(|| blank_state(movie_id));
        patch.apply_to(shown);

        if let Some(inflight) = self.inflight.get_mut(&movie_id) {
            debug!(movie_id, "queueing state patch behind in-flight write");
            match inflight.queued {
                Some(ref mut queued) => queued.merge(patch),
                None => inflight.queued = Some(patch),
            }
            return Vec::new();
        }

        vec![LibraryEffect::Write(self.issue(movie_id, patch))]
    }

    /// A write finished. The server record replaces the local one; queued
    /// patches go out next.
    pub fn on_write_result(
        &mut self,
        request: &WriteRequest,
        result: Result<UserMovieState, Error>,
    ) -> Vec<LibraryEffect> {
        match self.inflight.get(&request.movie_id) {
            Some(inflight) if inflight.seq == request.seq => {}
            _ => {
                debug!(movie_id = request.movie_id, seq = request.seq, "dropping stale write result");
                return Vec::new();
            }
        }
        let queued = self
            .inflight
            .remove(&request.movie_id)
            .and_then(|i| i.queued);

        match result {
            Ok(state) => {
                self.confirm(request.movie_id, state);
                match queued {
                    Some(patch) => {
                        if let Some(shown) = self.shown.get_mut(&request.movie_id) {
                            patch.apply_to(shown);
                        }
                        vec![LibraryEffect::Write(self.issue(request.movie_id, patch))]
                    }
                    None => Vec::new(),
                }
            }
            Err(e) => {
                warn!(movie_id = request.movie_id, error = %e, "user state write failed, rolling back");
                match self.confirmed.get(&request.movie_id) {
                    Some(state) => {
                        self.shown.insert(request.movie_id, state.clone());
                    }
                    None => {
                        self.shown.remove(&request.movie_id);
                    }
                }
                vec![LibraryEffect::Notify(
                    Notice::error("Could not save your changes").with_description(e.to_string()),
                )]
            }
        }
    }

    /// Server cleared history: reset progress on every record that had any.
    pub fn on_history_cleared(&mut self, result: Result<ClearHistoryResponse, Error>) -> Vec<LibraryEffect> {
        match result {
            Ok(response) => {
                for map in [&mut self.confirmed, &mut self.shown] {
                    for state in map.values_mut().filter(|s| s.has_progress()) {
                        state.progress_percent = 0;
                        state.position_seconds = 0;
                        state.status = None;
                    }
                }
                let detail = if response.detail.is_empty() {
                    format!("{} items cleared", response.count)
                } else {
                    response.detail
                };
                vec![LibraryEffect::Notify(Notice::info("History cleared").with_description(detail))]
            }
            Err(e) => vec![LibraryEffect::Notify(
                Notice::error("Could not clear history").with_description(e.to_string()),
            )],
        }
    }

    // ---- derived views ----

    pub fn favorites<'a>(&self, movies: &'a [Movie]) -> Vec<&'a Movie> {
        movies.iter().filter(|m| self.is_favorite(m.id)).collect()
    }

    pub fn my_list<'a>(&self, movies: &'a [Movie]) -> Vec<&'a Movie> {
        movies.iter().filter(|m| self.in_my_list(m.id)).collect()
    }

    pub fn downloads<'a>(&self, movies: &'a [Movie]) -> Vec<&'a Movie> {
        movies.iter().filter(|m| self.is_downloaded(m.id)).collect()
    }

    /// Watched or in-progress movies, most recent first.
    pub fn history<'a>(&self, movies: &'a [Movie]) -> Vec<&'a Movie> {
        let mut entries: Vec<(&Movie, DateTime<Utc>)> = movies
            .iter()
            .filter_map(|m| {
                let state = self.state(m.id)?;
                let watched_at = state.last_watched_at?;
                if state.progress_percent == 0 && state.status.is_none() {
                    return None;
                }
                Some((m, watched_at))
            })
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.into_iter().map(|(m, _)| m).collect()
    }

    fn issue(&mut self, movie_id: MovieId, patch: StatePatch) -> WriteRequest {
        self.seq += 1;
        let target = match self.confirmed.get(&movie_id) {
            Some(state) => WriteTarget::Patch(state.id),
            None => WriteTarget::Upsert(movie_id),
        };
        self.inflight.insert(movie_id, InFlight { seq: self.seq, queued: None });
        WriteRequest { movie_id, seq: self.seq, target, patch }
    }
}

fn blank_state(movie_id: MovieId) -> UserMovieState {
    UserMovieState {
        id: 0,
        movie_id: Some(movie_id),
        status: None,
        progress_percent: 0,
        position_seconds: 0,
        in_my_list: false,
        is_favorite: false,
        is_downloaded: false,
        last_watched_at: None,
    }
}
