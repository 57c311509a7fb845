//! Stream link classification
//!
//! Maps a link's source URL to the playback strategy used for it. Pure: the
//! same URL and host list always give the same answer.

use url::Url;

/// Container extensions played directly by a video surface.
pub const DIRECT_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mkv", "avi", "mov"];

/// Manifest extension of adaptive (HLS) streams.
pub const ADAPTIVE_EXTENSION: &str = "m3u8";

const EMBED_MARKERS: &[&str] = &["embed", "player"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Host refuses embedding; only an "open externally" action is offered.
    ExternalOpen,
    /// Plain media file handed straight to a video surface.
    DirectVideo,
    /// HLS manifest: native if the runtime demuxes it, else via a helper.
    AdaptiveStream,
    /// URL carries an embed/player marker.
    Embed,
    /// Nothing matched; treated like an embed.
    Fallback,
}

/// Which kind of surface a strategy renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    None,
    Video,
    Frame,
}

impl Strategy {
    pub fn surface(&self) -> SurfaceKind {
        match self {
            Strategy::ExternalOpen => SurfaceKind::None,
            Strategy::DirectVideo | Strategy::AdaptiveStream => SurfaceKind::Video,
            Strategy::Embed | Strategy::Fallback => SurfaceKind::Frame,
        }
    }

    /// Frame surfaces have no authoritative readiness signal, so they get a
    /// load timeout. Video surfaces never do.
    pub fn uses_load_timeout(&self) -> bool {
        self.surface() == SurfaceKind::Frame
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::ExternalOpen => "External",
            Strategy::DirectVideo => "Direct video",
            Strategy::AdaptiveStream => "HLS stream",
            Strategy::Embed => "Embedded player",
            Strategy::Fallback => "Web player",
        }
    }
}

/// Classify `source_url`. First match wins:
/// blocked host, direct file, HLS manifest, embed marker, fallback.
pub fn classify(source_url: &str, blocked_hosts: &[String]) -> Strategy {
    let raw = source_url.trim();
    let parsed = Url::parse(raw).ok();

    if is_blocked(raw, parsed.as_ref(), blocked_hosts) {
        return Strategy::ExternalOpen;
    }

    let path = match parsed {
        Some(ref url) => url.path().to_ascii_lowercase(),
        None => strip_query(raw).to_ascii_lowercase(),
    };

    if let Some(ext) = extension(&path) {
        if DIRECT_EXTENSIONS.contains(&ext) {
            return Strategy::DirectVideo;
        }
        if ext == ADAPTIVE_EXTENSION {
            return Strategy::AdaptiveStream;
        }
    }

    let lowered = raw.to_ascii_lowercase();
    if EMBED_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Strategy::Embed;
    }

    Strategy::Fallback
}

/// Host equals a blocked entry or is a subdomain of one. URLs that fail to
/// parse fall back to a substring check.
fn is_blocked(raw: &str, parsed: Option<&Url>, blocked_hosts: &[String]) -> bool {
    let host = parsed.and_then(|u| u.host_str()).map(|h| h.to_ascii_lowercase());
    blocked_hosts.iter().any(|blocked| {
        let blocked = blocked.trim().to_ascii_lowercase();
        if blocked.is_empty() {
            return false;
        }
        match host {
            Some(ref host) => *host == blocked || host.ends_with(&format!(".{}", blocked)),
            None => raw.to_ascii_lowercase().contains(&blocked),
        }
    })
}

fn strip_query(raw: &str) -> &str {
    let end = raw.find(|c: char| c == '?' || c == '#').unwrap_or(raw.len());
    &raw[..end]
}

fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
