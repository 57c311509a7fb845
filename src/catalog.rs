//! Catalog views over the loaded movie list

use std::collections::BTreeMap;

use crate::models::Movie;

/// Genre filter value that matches every movie.
pub const ALL_GENRES: &str = "All";

/// Case-insensitive substring check without allocation
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() { return true; }
    if needle.len() > haystack.len() { return false; }

    haystack.as_bytes()
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Movies whose title or any genre contains `query`, restricted to `genre`
/// unless it is [`ALL_GENRES`].
pub fn search<'a>(movies: &'a [Movie], query: &str, genre: &str) -> Vec<&'a Movie> {
    let query = query.trim();
    movies
        .iter()
        .filter(|m| {
            contains_ignore_case(&m.title, query) || m.genre.iter().any(|g| contains_ignore_case(g, query))
        })
        .filter(|m| genre == ALL_GENRES || m.genre.iter().any(|g| g == genre))
        .collect()
}

/// Trending movies, ranked ones first by rank, the rest by title.
pub fn trending(movies: &[Movie]) -> Vec<&Movie> {
    let mut list: Vec<&Movie> = movies.iter().filter(|m| m.is_trending).collect();
    list.sort_by(|a, b| {
        let rank = |m: &Movie| m.rank.unwrap_or(u32::MAX);
        rank(a).cmp(&rank(b)).then_with(|| a.title.cmp(&b.title))
    });
    list
}

/// New releases, newest year first.
pub fn new_releases(movies: &[Movie]) -> Vec<&Movie> {
    let mut list: Vec<&Movie> = movies.iter().filter(|m| m.is_new).collect();
    list.sort_by(|a, b| b.year.cmp(&a.year).then_with(|| a.title.cmp(&b.title)));
    list
}

/// Every genre with its number of titles, alphabetically.
pub fn genre_counts(movies: &[Movie]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for genre in movies.iter().flat_map(|m| m.genre.iter()) {
        *counts.entry(genre.as_str()).or_default() += 1;
    }
    counts.into_iter().map(|(g, n)| (g.to_string(), n)).collect()
}

/// Genre filter choices: "All" followed by every genre present.
pub fn genre_filters(movies: &[Movie]) -> Vec<String> {
    std::iter::once(ALL_GENRES.to_string())
        .chain(genre_counts(movies).into_iter().map(|(g, _)| g))
        .collect()
}

pub fn random_pick(movies: &[Movie]) -> Option<&Movie> {
    random_pick_with(movies, &mut fastrand::Rng::new())
}

pub fn random_pick_with<'a>(movies: &'a [Movie], rng: &mut fastrand::Rng) -> Option<&'a Movie> {
    if movies.is_empty() {
        return None;
    }
    movies.get(rng.usize(..movies.len()))
}
