//! URL normalization and redirect resolution.
//!
//! [`canonicalize`] is a pure function; [`UrlResolver`] adds the network
//! steps (HTTPS upgrade, bounded redirect following) on top of it.

use crate::fetcher::{Fetcher, Probe};
use crate::MediaError;
use tracing::{debug, instrument, warn};
use url::Url;

/// Normalizes a raw URL.
///
/// Trims whitespace, defaults the scheme to `http`, drops default ports,
/// collapses duplicate slashes, resolves dot segments, drops fragments and
/// empty query strings, and rewrites percent escapes to one canonical form
/// (unreserved characters decoded, everything else upper-case hex).
pub fn canonicalize(raw: &str) -> Result<String, MediaError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MediaError::InvalidUrl("empty URL".to_string()));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    // Old-style AJAX links: http://twitter.com/#!/user/status/1
    let rewritten = with_scheme.replacen("/#!/", "/", 1);

    // Slashes collapse before the parser resolves `..` against them.
    let mut url = Url::parse(&collapse_raw_path(&rewritten))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MediaError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(MediaError::InvalidUrl(format!("no host in {trimmed}")));
    }

    url.set_fragment(None);

    let path = normalize_percent_encoding(&collapse_slashes(url.path()));
    url.set_path(&path);

    match url.query().map(str::to_string) {
        Some(query) if query.is_empty() => url.set_query(None),
        Some(query) => url.set_query(Some(&normalize_percent_encoding(&query))),
        None => {}
    }

    Ok(url.to_string())
}

fn has_scheme(url: &str) -> bool {
    match url.find("://") {
        Some(idx) => url[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        None => false,
    }
}

/// Collapses duplicate slashes in the path part of an unparsed URL.
fn collapse_raw_path(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|idx| idx + 3) else {
        return url.to_string();
    };
    let path_start = match url[scheme_end..].find(['/', '?', '#']) {
        Some(idx) if url.as_bytes()[scheme_end + idx] == b'/' => scheme_end + idx,
        _ => return url.to_string(),
    };
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map_or(url.len(), |idx| path_start + idx);

    format!(
        "{}{}{}",
        &url[..path_start],
        collapse_slashes(&url[path_start..path_end]),
        &url[path_end..]
    )
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }
    collapsed
}

fn normalize_percent_encoding(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut output = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &input[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if value.is_ascii_alphanumeric() || matches!(value, b'-' | b'.' | b'_' | b'~') {
                    output.push(value as char);
                } else {
                    output.push('%');
                    output.push_str(&hex.to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        // Input comes from `Url`, so it is ASCII.
        output.push(bytes[i] as char);
        i += 1;
    }

    output
}

/// The `https://` form of a plain HTTP URL.
fn https_variant(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "http" {
        return None;
    }
    parsed.set_scheme("https").ok()?;
    // The default port of the old scheme does not carry over.
    if parsed.port() == Some(80) {
        parsed.set_port(None).ok()?;
    }
    Some(parsed.to_string())
}

/// Network half of canonicalization: HTTPS upgrade and redirect following.
#[derive(Clone)]
pub struct UrlResolver {
    fetcher: Fetcher,
    max_redirects: usize,
    upgrade_to_https: bool,
}

impl UrlResolver {
    pub fn new(fetcher: Fetcher, max_redirects: usize, upgrade_to_https: bool) -> Self {
        Self {
            fetcher,
            max_redirects,
            upgrade_to_https,
        }
    }

    /// Upgrades and follows redirects. Network failures never fail the
    /// pipeline; the last URL that resolved is returned instead.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, canonical_url: &str) -> String {
        let upgraded = if self.upgrade_to_https {
            self.upgrade_to_https(canonical_url).await
        } else {
            canonical_url.to_string()
        };

        let followed = self.follow_redirects(&upgraded).await;
        canonicalize(&followed).unwrap_or(followed)
    }

    /// Substitutes the `https://` variant of a plain HTTP URL when it answers.
    pub async fn upgrade_to_https(&self, url: &str) -> String {
        let Some(candidate) = https_variant(url) else {
            return url.to_string();
        };
        if self.fetcher.is_reachable(&candidate).await {
            debug!(url = %url, https = %candidate, "Upgraded URL to HTTPS");
            candidate
        } else {
            url.to_string()
        }
    }

    /// Follows at most `max_redirects` hops.
    pub async fn follow_redirects(&self, url: &str) -> String {
        let mut current = url.to_string();

        for hop in 0..self.max_redirects {
            match self.fetcher.probe(&current).await {
                Ok(Probe::Redirect(location)) => {
                    let next = match Url::parse(&current).and_then(|base| base.join(&location)) {
                        Ok(next) => next.to_string(),
                        Err(e) => {
                            warn!(url = %current, location = %location, error = %e, "Invalid redirect location");
                            break;
                        }
                    };
                    if next == current {
                        break;
                    }
                    debug!(hop = hop + 1, from = %current, to = %next, "Following redirect");
                    current = next;
                }
                Ok(Probe::Final(status)) => {
                    debug!(url = %current, status, "Redirect chain resolved");
                    break;
                }
                Err(e) => {
                    warn!(url = %current, error = %e, "Redirect resolution failed, keeping last resolved URL");
                    break;
                }
            }
        }

        current
    }
}
