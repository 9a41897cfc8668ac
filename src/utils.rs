use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use unicode_width::UnicodeWidthChar;

use url::{ParseError, Url};

/// Cuts `s` to at most `max_width` display columns, ending in `...` when
/// anything was dropped. Never splits a character.
pub fn truncate_str(s: &str, max_width: usize) -> String {
    use unicode_width::UnicodeWidthStr;

    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;

    for c in s.chars() {
        let char_width = c.width().unwrap_or(1);

        if current_width + char_width + 3 > max_width {
            break;
        }

        result.push(c);
        current_width += char_width;
    }

    result.push_str("...");
    result
}

/// Scheme and host of `url`, keeping the port only when it is not the
/// scheme default. No trailing slash.
pub fn top_url(url: &str) -> Result<String, ParseError> {
    let parsed_url = Url::parse(url)?;
    let scheme = parsed_url.scheme();
    let host = parsed_url.host_str().ok_or(url::ParseError::EmptyHost)?;

    let port = parsed_url
        .port()
        .map(|x| format!(":{x}"))
        .unwrap_or_default();

    Ok(format!("{scheme}://{host}{port}"))
}

/// Resolves `path` against `base`: blank paths give back `base`,
/// scheme-relative paths borrow the base scheme.
pub fn absolute_url(base: &str, path: Option<&str>) -> String {
    let path = match path.map(str::trim) {
        None | Some("") => return base.to_string(),
        Some(p) => p,
    };

    if let Ok(parsed) = Url::parse(path) {
        return parsed.to_string();
    }

    match Url::parse(base).and_then(|b| b.join(path)) {
        Ok(joined) => joined.to_string(),
        Err(_) => path.to_string(),
    }
}

/// Adds a scheme to scheme-relative URLs (`//host/x`), borrowing it from `base`.
pub fn add_scheme(url: &str, base: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        let scheme = Url::parse(base)
            .map(|b| b.scheme().to_string())
            .unwrap_or_else(|_| "http".to_string());
        return format!("{scheme}://{rest}");
    }
    url.to_string()
}

/// Lower-cases and joins alphanumeric runs with `-` (`https://xkcd.com/1479`
/// -> `https-xkcd-com-1479`).
pub fn parameterize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Parses the timestamp shapes seen across provider APIs and page markup.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    // Graph API: 2015-11-18T12:34:56+0000, Twitter: Wed Jun 15 17:20:00 +0000 2016
    for format in ["%Y-%m-%dT%H:%M:%S%z", "%a %b %d %H:%M:%S %z %Y"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%A, %B %d, %Y at %I:%M%P"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
