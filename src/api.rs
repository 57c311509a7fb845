//! Streamflix REST API client
//!
//! Blocking HTTP over `ureq`; callers run these on worker threads and hand the
//! results back to the UI loop. The two traits are the seams the resolver and
//! the library state are driven through, so tests can swap in fakes.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::*;

/// Catalog collaborator: movie records and streaming items.
pub trait CatalogApi: Send + Sync {
    fn fetch_movies(&self) -> Result<Vec<Movie>>;
    fn fetch_movie(&self, id: MovieId) -> Result<Movie>;
    fn fetch_recommendations(&self, id: MovieId) -> Result<Vec<Movie>>;
    fn fetch_streaming_items(&self, filter: Option<ContentType>) -> Result<Vec<StreamingItem>>;
    fn fetch_streaming_item(&self, id: MovieId) -> Result<StreamingItem>;
    /// Ask the server to discover fresh links. Results show up in later fetches.
    fn request_link_refresh(&self, id: MovieId) -> Result<RefreshAck>;
    /// Re-check link health server-side and return the updated item.
    fn validate_links(&self, id: MovieId) -> Result<StreamingItem>;
}

/// User-state collaborator: per-movie flags and progress.
pub trait UserStateApi: Send + Sync {
    fn fetch_user_states(&self) -> Result<Vec<UserMovieState>>;
    fn upsert_user_state(&self, movie_id: MovieId, patch: &StatePatch) -> Result<UserMovieState>;
    fn patch_user_state(&self, state_id: StateId, patch: &StatePatch) -> Result<UserMovieState>;
    fn clear_history(&self) -> Result<ClearHistoryResponse>;
}

pub struct ApiClient {
    base_url: String,
    token: String,
    user_agent: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: String::new(),
            user_agent: format!("Streamflix/{}", env!("CARGO_PKG_VERSION")),
            agent: Self::create_agent(Duration::from_secs(30)),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.trim().to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = Self::create_agent(timeout);
        self
    }

    fn create_agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .timeout_connect(Some(Duration::from_secs(10)))
            // Non-2xx bodies carry the server's error detail
            .http_status_as_error(false)
            .build()
            .new_agent()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_header(&self) -> Option<String> {
        if self.token.is_empty() {
            None
        } else {
            Some(format!("Token {}", self.token))
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let mut req = self
            .agent
            .get(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let response = req.call()?;
        Self::read_json(response)
    }

    fn send<B: Serialize, T: DeserializeOwned>(&self, method: Method, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let payload = serde_json::to_string(body)?;
        tracing::debug!(%url, method = method.as_str(), "send");
        let mut req = match method {
            Method::Post => self.agent.post(&url),
            Method::Patch => self.agent.patch(&url),
        }
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .header("User-Agent", &self.user_agent);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", &auth);
        }
        let response = req.send(payload.as_bytes())?;
        Self::read_json(response)
    }

    fn read_json<T: DeserializeOwned>(mut response: ureq::http::Response<ureq::Body>) -> Result<T> {
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        parse_response(status, &body)
    }
}

enum Method {
    Post,
    Patch,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// Map a status + body pair to a typed record or an [`Error::Http`].
pub fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    if !(200..300).contains(&status) {
        return Err(Error::http(status, body));
    }
    Ok(serde_json::from_str(body)?)
}

pub fn streaming_list_path(filter: Option<ContentType>) -> String {
    match filter {
        Some(t) => format!("/streaming/movies/?type={}", t.as_str()),
        None => "/streaming/movies/".to_string(),
    }
}

/// Body of `set_state`: the partial fields plus the owning movie id.
pub fn upsert_body(movie_id: MovieId, patch: &StatePatch) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(patch)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("movie_id".to_string(), serde_json::Value::from(movie_id));
    }
    Ok(value)
}

impl CatalogApi for ApiClient {
    fn fetch_movies(&self) -> Result<Vec<Movie>> {
        self.get("/movies/")
    }

    fn fetch_movie(&self, id: MovieId) -> Result<Movie> {
        self.get(&format!("/movies/{}/", id))
    }

    fn fetch_recommendations(&self, id: MovieId) -> Result<Vec<Movie>> {
        self.get(&format!("/movies/{}/recommendations/", id))
    }

    fn fetch_streaming_items(&self, filter: Option<ContentType>) -> Result<Vec<StreamingItem>> {
        self.get(&streaming_list_path(filter))
    }

    fn fetch_streaming_item(&self, id: MovieId) -> Result<StreamingItem> {
        self.get(&format!("/streaming/movies/{}/", id))
    }

    fn request_link_refresh(&self, id: MovieId) -> Result<RefreshAck> {
        self.send(Method::Post, &format!("/streaming/movies/{}/refresh_links/", id), &serde_json::json!({}))
    }

    fn validate_links(&self, id: MovieId) -> Result<StreamingItem> {
        self.get(&format!("/streaming/movies/{}/validate_links/", id))
    }
}

impl UserStateApi for ApiClient {
    fn fetch_user_states(&self) -> Result<Vec<UserMovieState>> {
        self.get("/user-states/")
    }

    fn upsert_user_state(&self, movie_id: MovieId, patch: &StatePatch) -> Result<UserMovieState> {
        let body = upsert_body(movie_id, patch)?;
        self.send(Method::Post, "/user-states/set_state/", &body)
    }

    fn patch_user_state(&self, state_id: StateId, patch: &StatePatch) -> Result<UserMovieState> {
        self.send(Method::Patch, &format!("/user-states/{}/", state_id), patch)
    }

    fn clear_history(&self) -> Result<ClearHistoryResponse> {
        self.send(Method::Post, "/user-states/clear_history/", &serde_json::json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/api/ ");
        assert_eq!(client.url("/movies/"), "http://localhost:8000/api/movies/");
    }

    #[test]
    fn test_auth_header_only_with_token() {
        let client = ApiClient::new("http://x");
        assert_eq!(client.auth_header(), None);
        let client = client.with_token("abc123");
        assert_eq!(client.auth_header().as_deref(), Some("Token abc123"));
    }

    #[test]
    fn test_streaming_list_path() {
        assert_eq!(streaming_list_path(None), "/streaming/movies/");
        assert_eq!(streaming_list_path(Some(ContentType::Show)), "/streaming/movies/?type=show");
    }

    #[test]
    fn test_upsert_body_carries_movie_id() {
        let patch = StatePatch { in_my_list: Some(true), ..Default::default() };
        let body = upsert_body(42, &patch).unwrap();
        assert_eq!(body, serde_json::json!({"in_my_list": true, "movie_id": 42}));
    }

    #[test]
    fn test_parse_response_error_detail() {
        let err = parse_response::<RefreshAck>(400, r#"{"detail": "movie_id is required"}"#).unwrap_err();
        match err {
            Error::Http { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.contains("movie_id is required"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_decodes_clear_history() {
        let resp: ClearHistoryResponse =
            parse_response(200, r#"{"detail": "History cleared", "count": 4}"#).unwrap();
        assert_eq!(resp.count, 4);
    }

    #[test]
    fn test_parse_response_bad_json() {
        let err = parse_response::<RefreshAck>(200, "<html>").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}
