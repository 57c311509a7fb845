//! Tests for stream link classification

#[cfg(test)]
mod tests {
    use crate::resolver::classify::*;

    fn blocked() -> Vec<String> {
        vec!["1flix.to".to_string()]
    }

    #[test]
    fn test_direct_extensions_with_and_without_query() {
        for ext in DIRECT_EXTENSIONS {
            let plain = format!("https://cdn.example.com/movies/film.{}", ext);
            let query = format!("https://cdn.example.com/movies/film.{}?token=abc&exp=1", ext);
            assert_eq!(classify(&plain, &blocked()), Strategy::DirectVideo, "{}", plain);
            assert_eq!(classify(&query, &blocked()), Strategy::DirectVideo, "{}", query);
        }
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert_eq!(classify("https://cdn.example.com/FILM.MP4", &blocked()), Strategy::DirectVideo);
        assert_eq!(classify("https://cdn.example.com/Master.M3U8?x=1", &blocked()), Strategy::AdaptiveStream);
    }

    #[test]
    fn test_manifest_is_adaptive_never_direct_or_frame() {
        let urls = [
            "https://cdn.example.com/hls/master.m3u8",
            "https://cdn.example.com/hls/master.m3u8?sig=1",
            // Marker words in the path must not turn a manifest into an embed
            "https://player.example.com/embed/master.m3u8",
        ];
        for url in urls {
            assert_eq!(classify(url, &blocked()), Strategy::AdaptiveStream, "{}", url);
        }
    }

    #[test]
    fn test_blocked_host_wins_over_extension() {
        assert_eq!(classify("https://1flix.to/movie/file.mp4", &blocked()), Strategy::ExternalOpen);
        assert_eq!(classify("https://1flix.to/hls/master.m3u8", &blocked()), Strategy::ExternalOpen);
        assert_eq!(classify("https://www.1flix.to/embed/123", &blocked()), Strategy::ExternalOpen);
        assert_eq!(classify("https://1flix.to/watch-movie/free-x-123", &blocked()), Strategy::ExternalOpen);
    }

    #[test]
    fn test_blocked_host_needs_real_host_match() {
        // Lookalike host is not the blocked provider
        assert_eq!(classify("https://not1flix.to/embed/1", &blocked()), Strategy::Embed);
        // Blocked domain only appearing in the query is not a host match
        assert_eq!(classify("https://cdn.example.com/a.mp4?ref=1flix.to", &blocked()), Strategy::DirectVideo);
    }

    #[test]
    fn test_empty_block_list_never_blocks() {
        assert_eq!(classify("https://1flix.to/file.mp4", &[]), Strategy::DirectVideo);
    }

    #[test]
    fn test_embed_markers() {
        assert_eq!(classify("https://vidsrc.example/embed/movie/tt0111161", &blocked()), Strategy::Embed);
        assert_eq!(classify("https://host.example/watch?player=2", &blocked()), Strategy::Embed);
    }

    #[test]
    fn test_fallback_for_everything_else() {
        assert_eq!(classify("https://host.example/watch/123", &blocked()), Strategy::Fallback);
        assert_eq!(classify("https://host.example/video.mp4.html", &blocked()), Strategy::Fallback);
        assert_eq!(classify("not a url at all", &blocked()), Strategy::Fallback);
    }

    #[test]
    fn test_unparseable_url_still_classified() {
        assert_eq!(classify("cdn.example.com/film.webm?x=1", &blocked()), Strategy::DirectVideo);
        assert_eq!(classify("1flix.to/film.webm", &blocked()), Strategy::ExternalOpen);
    }

    #[test]
    fn test_surface_and_timeout_mapping() {
        assert_eq!(Strategy::ExternalOpen.surface(), SurfaceKind::None);
        assert_eq!(Strategy::DirectVideo.surface(), SurfaceKind::Video);
        assert_eq!(Strategy::AdaptiveStream.surface(), SurfaceKind::Video);
        assert!(Strategy::Embed.uses_load_timeout());
        assert!(Strategy::Fallback.uses_load_timeout());
        assert!(!Strategy::DirectVideo.uses_load_timeout());
        assert!(!Strategy::AdaptiveStream.uses_load_timeout());
        assert!(!Strategy::ExternalOpen.uses_load_timeout());
    }
}
