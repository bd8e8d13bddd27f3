//! Alternate stream URLs to try when a backend rejects the primary one.
//!
//! IPTV portals usually serve the same stream under several container
//! extensions. Live channels are tried as `.m3u8` then `.m3u`; on-demand
//! items as `.m3u8` then `.ts`. The extension already in use is tried first
//! and not repeated. Scheme, host, and query string are preserved.

/// Whether a URL is a live channel or on-demand item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Live channel.
    Live,
    /// Movie, episode, or other seekable item.
    OnDemand,
}

impl ContentKind {
    /// Guess from the URL path: a `live` path segment means live.
    pub fn infer(url: &str) -> Self {
        let (path, _) = split_path(url);
        if path.split('/').any(|segment| segment.eq_ignore_ascii_case("live")) {
            Self::Live
        } else {
            Self::OnDemand
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Live => &["m3u8", "m3u"],
            Self::OnDemand => &["m3u8", "ts"],
        }
    }
}

/// Candidate URLs in the order they should be tried; the first is always
/// `url` itself.
pub fn fallback_candidates(url: &str, kind: ContentKind) -> Vec<String> {
    let mut candidates = vec![url.to_string()];

    let (path, suffix) = split_path(url);
    let Some((stem, current)) = split_extension(path) else {
        return candidates;
    };

    let prefix = &url[..url.len() - path.len() - suffix.len()];
    for ext in kind.extensions() {
        if ext.eq_ignore_ascii_case(current) {
            continue;
        }
        candidates.push(format!("{prefix}{stem}.{ext}{suffix}"));
    }
    candidates
}

/// Split into (path, query-and-fragment), skipping `scheme://host`.
///
/// The authority ends at the first `/`, `?`, or `#`, so a slash inside a
/// query on a host-only URL is never taken for the path.
fn split_path(url: &str) -> (&str, &str) {
    let path_start = url.find("://").map_or(0, |i| {
        let authority = i + 3;
        url[authority..].find(['/', '?', '#']).map_or(url.len(), |j| authority + j)
    });
    let rest = &url[path_start..];
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    (&rest[..end], &rest[end..])
}

/// Split a path into (everything before the extension dot, extension) when
/// its last segment ends in a short alphanumeric extension.
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let dot = path[segment_start..].rfind('.')? + segment_start;
    let ext = &path[dot + 1..];
    let stem_has_name = dot > segment_start;
    let ext_ok = (1..=5).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric());
    (stem_has_name && ext_ok).then(|| (&path[..dot], ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_ts_fallbacks() {
        assert_eq!(
            fallback_candidates("http://host/live/1234.ts", ContentKind::Live),
            vec![
                "http://host/live/1234.ts",
                "http://host/live/1234.m3u8",
                "http://host/live/1234.m3u",
            ]
        );
    }

    #[test]
    fn test_on_demand_mp4_fallbacks() {
        assert_eq!(
            fallback_candidates("http://host/vod/99.mp4", ContentKind::OnDemand),
            vec![
                "http://host/vod/99.mp4",
                "http://host/vod/99.m3u8",
                "http://host/vod/99.ts",
            ]
        );
    }

    #[test]
    fn test_skips_extension_in_use_and_keeps_query() {
        assert_eq!(
            fallback_candidates("https://h:8080/live/u/p/7.m3u8?token=a.b", ContentKind::Live),
            vec![
                "https://h:8080/live/u/p/7.m3u8?token=a.b",
                "https://h:8080/live/u/p/7.m3u?token=a.b",
            ]
        );
    }

    #[test]
    fn test_no_extension_is_primary_only() {
        assert_eq!(
            fallback_candidates("http://host/live/1234", ContentKind::Live),
            vec!["http://host/live/1234"]
        );
        assert_eq!(
            fallback_candidates("http://host.example.com", ContentKind::OnDemand),
            vec!["http://host.example.com"]
        );
        assert_eq!(
            fallback_candidates("http://host/dir.v2/stream", ContentKind::OnDemand).len(),
            1
        );
    }

    #[test]
    fn test_host_only_url_with_slash_in_query() {
        assert_eq!(
            fallback_candidates("http://host?a=/b.ts", ContentKind::OnDemand),
            vec!["http://host?a=/b.ts"]
        );
        assert_eq!(
            fallback_candidates("http://host#/live/1.ts", ContentKind::Live),
            vec!["http://host#/live/1.ts"]
        );
        assert_eq!(ContentKind::infer("http://host?x=/live/1.ts"), ContentKind::OnDemand);
        assert_eq!(split_path("http://host?a=/b.ts"), ("", "?a=/b.ts"));
        assert_eq!(split_path("http://host/v/1.ts?a=/b"), ("/v/1.ts", "?a=/b"));
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(ContentKind::infer("http://host/live/u/p/1.ts"), ContentKind::Live);
        assert_eq!(ContentKind::infer("http://host/movie/u/p/1.mp4"), ContentKind::OnDemand);
        assert_eq!(ContentKind::infer("http://live.host/vod/1.mp4"), ContentKind::OnDemand);
    }
}
