//! YouTube link detection in free text
//!
//! Pasted text is scanned for anything that looks like a YouTube link, each
//! candidate is parsed with [`url::Url`], classified, and rewritten to a
//! canonical form so that `youtu.be/ID`, `m.youtube.com/watch?v=ID&t=30` and
//! `youtube.com/watch?v=ID` all collapse into a single entry.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// What a detected link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Video,
    Short,
    Playlist,
    Channel,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Video => "video",
            LinkKind::Short => "short",
            LinkKind::Playlist => "playlist",
            LinkKind::Channel => "channel",
        }
    }

    /// Whether yt-dlp should expand the link into several entries
    pub fn is_collection(&self) -> bool {
        matches!(self, LinkKind::Playlist | LinkKind::Channel)
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized link plus its classification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassifiedUrl {
    /// Canonical `https://www.youtube.com/...` form
    pub url: String,
    pub kind: LinkKind,
    /// Video id, playlist id, or channel path (`@handle`, `channel/UC...`)
    pub id: String,
}

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(?:https?://)?(?:(?:www|m|music)\.)?(?:youtube\.com|youtu\.be)/[^\s<>"'()\[\]{}|\\^`]*"#,
        )
        .expect("link pattern is valid")
    })
}

/// Find every YouTube link in `text`.
///
/// The result is ordered by first appearance and contains each normalized
/// URL once. Text without links yields an empty vector.
pub fn extract(text: &str) -> Vec<ClassifiedUrl> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for candidate in candidate_regex().find_iter(text) {
        if let Some(link) = classify(candidate.as_str()) {
            if seen.insert(link.url.clone()) {
                links.push(link);
            }
        }
    }

    links
}

/// Classify and normalize a single link. Returns `None` for anything that is
/// not a recognized YouTube link shape.
pub fn classify(raw: &str) -> Option<ClassifiedUrl> {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"'));

    let with_scheme = if trimmed.to_ascii_lowercase().starts_with("http://")
        || trimmed.to_ascii_lowercase().starts_with("https://")
    {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    if host == "youtu.be" {
        let id = segments.first().filter(|id| is_valid_id(id))?;
        return Some(video(id));
    }

    if !matches!(
        host.as_str(),
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com"
    ) {
        return None;
    }

    let query = |key: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    };

    match segments.first().copied()? {
        "watch" => {
            let id = query("v").filter(|id| is_valid_id(id))?;
            Some(video(&id))
        }
        "live" | "embed" => {
            let id = segments.get(1).filter(|id| is_valid_id(id))?;
            Some(video(id))
        }
        "shorts" => {
            let id = segments.get(1).filter(|id| is_valid_id(id))?;
            Some(ClassifiedUrl {
                url: format!("https://www.youtube.com/shorts/{}", id),
                kind: LinkKind::Short,
                id: id.to_string(),
            })
        }
        "playlist" => {
            let id = query("list").filter(|id| is_valid_id(id))?;
            Some(ClassifiedUrl {
                url: format!("https://www.youtube.com/playlist?list={}", id),
                kind: LinkKind::Playlist,
                id,
            })
        }
        prefix @ ("channel" | "c" | "user") => {
            let name = segments.get(1).filter(|n| is_valid_channel_name(n))?;
            Some(channel(format!("{}/{}", prefix, name)))
        }
        handle if handle.starts_with('@') && is_valid_channel_name(&handle[1..]) => {
            Some(channel(handle.to_string()))
        }
        _ => None,
    }
}

fn video(id: &str) -> ClassifiedUrl {
    ClassifiedUrl {
        url: format!("https://www.youtube.com/watch?v={}", id),
        kind: LinkKind::Video,
        id: id.to_string(),
    }
}

fn channel(path: String) -> ClassifiedUrl {
    ClassifiedUrl {
        url: format!("https://www.youtube.com/{}", path),
        kind: LinkKind::Channel,
        id: path,
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '%'))
}
