//! Object and user ids from Facebook URLs.
//!
//! Every function here is pure: the same URL always yields the same
//! identity, which is what makes `uuid` usable as a cache and entity key.

use crate::record::Identity;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use url::Url;

static EVENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://([^/]+\.)?facebook\.com/events/(?P<id>[0-9]+)").unwrap()
});

/// Scanners for a user or page id embedded in the URL text, in priority
/// order.
static ENTITY_SCANNERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // profile.php?id=100008161175765
        Regex::new(r"/profile\.php\?(?:.*&)?id=([0-9]+)").unwrap(),
        // pages/Meedan/105510962816034
        Regex::new(r"/pages/[^/]+/([0-9]+)").unwrap(),
        // album set a.<album>.<seq>.<owner>, in a path or a query value
        Regex::new(r"[/=]a\.[0-9]+\.[0-9]+\.([0-9]+)").unwrap(),
        // pb.<owner>.-2207520000.1476218412 / vb.<owner>
        Regex::new(r"/(?:pb|vb)\.([0-9]+)").unwrap(),
        // numeric profile segment: facebook.com/513415662050479/...
        Regex::new(r"facebook\.com/(?:pg/)?([0-9]+)(?:[/?]|$)").unwrap(),
        // vanity slug ending in the id: Mariano-Rajoy-Brey-54212446406
        Regex::new(r"facebook\.com/(?:pg/)?[^/?]*-([0-9]+)(?:[/?]|$)").unwrap(),
    ]
});

static LEADING_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

/// Outcome of resolving a Facebook URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    /// The URL with the mobile host rewritten.
    pub url: String,
    pub identity: Identity,
    pub is_event: bool,
}

pub fn normalize_mobile_host(url: &str) -> String {
    url.replacen("://m.facebook.", "://www.facebook.", 1)
}

pub fn is_event_url(url: &str) -> bool {
    EVENT.is_match(url) && !url.contains("/permalink/")
}

/// Resolves the identity of `url`. `original_url` is the pre-redirect input,
/// consulted only for album links that lost their query on the way.
pub fn resolve(url: &str, original_url: &str) -> ResolvedUrl {
    let url = normalize_mobile_host(url);
    let object_id = object_id_from_url(&url, original_url);
    let is_event = is_event_url(&url);

    let identity = if is_event {
        Identity::standalone(object_id)
    } else {
        Identity::new(object_id, user_id_from_url(&url))
    };

    ResolvedUrl {
        url,
        identity,
        is_event,
    }
}

/// Object id from the last path segment, dispatching on known script names.
pub fn object_id_from_url(url: &str, original_url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let params = query_params(&parsed);

    let last_segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or_default();

    let id = match last_segment {
        "photo.php" | "album.php" => params.get("fbid").cloned().unwrap_or_default(),
        "permalink.php" | "story.php" => params.get("story_fbid").cloned().unwrap_or_default(),
        "set" => params
            .get("set")
            .and_then(|set| set.split('.').nth(1))
            .map(str::to_string)
            .unwrap_or_default(),
        "photos" => album_id(&params, original_url),
        "livemap" => String::new(),
        other => other.to_string(),
    };

    strip_share_suffix(&id).to_string()
}

fn album_id(params: &HashMap<String, String>, original_url: &str) -> String {
    if !params.is_empty() {
        return params.get("album_id").cloned().unwrap_or_default();
    }

    let original = normalize_mobile_host(original_url.trim());
    Url::parse(&original)
        .ok()
        .map(|parsed| query_params(&parsed))
        .and_then(|params| params.get("album_id").cloned())
        .unwrap_or_default()
}

/// Some share links append `:0` to the id.
fn strip_share_suffix(id: &str) -> &str {
    id.strip_suffix(":0").unwrap_or(id)
}

/// User id from, in order: an id embedded in the URL text, the trailing
/// component of the `set` parameter, the leading digits of `id`.
pub fn user_id_from_url(url: &str) -> String {
    if let Some(id) = scan_entity_id(url) {
        return id;
    }

    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let params = query_params(&parsed);

    if let Some(owner) = params
        .get("set")
        .and_then(|set| set.rsplit('.').next())
        .filter(|owner| !owner.is_empty())
    {
        return owner.to_string();
    }

    params
        .get("id")
        .and_then(|id| LEADING_DIGITS.find(id))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

pub fn scan_entity_id(url: &str) -> Option<String> {
    ENTITY_SCANNERS.iter().find_map(|scanner| {
        scanner
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

fn query_params(url: &Url) -> HashMap<String, String> {
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Graph image URL for an id. Referenced, never fetched.
pub fn picture_url(id: &str) -> String {
    format!("https://graph.facebook.com/{id}/picture")
}
