//! Graph API access and the reading of Graph objects.

use crate::config::ParserConfig;
use crate::fetcher::{ApiResponse, Fetcher};
use crate::MediaError;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

pub const ITEM_FIELDS: &str = "id,type,message,created_time,from,story,full_picture,link,permalink_url";
pub const EVENT_FIELDS: &str = "id,type,owner,updated_time,description,name";
pub const PROFILE_FIELDS: &str = "id,name,username,about,description,category,link";

const AUTH_INVALID_CODE: i64 = 190;
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];

static ADDED_PHOTOS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"added ([0-9]+) new photos").unwrap());

static GIF_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(media\.)?(giphy\.com|gph\.is)/").unwrap());

/// Fetches a Graph node. `Ok(None)` means "no data": no token, no node id,
/// or an error the markup fallback can work around.
pub async fn fetch_node(
    fetcher: &Fetcher,
    config: &ParserConfig,
    node_id: &str,
    fields: &str,
) -> Result<Option<Value>, MediaError> {
    let Some(token) = config.credentials.facebook_auth_token.as_deref() else {
        debug!("No Facebook token configured, skipping Graph API");
        return Ok(None);
    };
    if node_id.is_empty() {
        return Ok(None);
    }

    let endpoint = Url::parse_with_params(
        &format!("{}/{}", config.endpoints.facebook_graph.trim_end_matches('/'), node_id),
        &[("fields", fields), ("access_token", token)],
    )?;

    let response = fetcher.get_json("facebook", endpoint.as_str(), None).await?;
    classify_response(response)
}

pub fn classify_response(response: ApiResponse) -> Result<Option<Value>, MediaError> {
    let error = response.body.get("error");
    if response.is_success() && error.is_none() && response.body.is_object() {
        return Ok(Some(response.body));
    }

    let code = error.and_then(|e| e.get("code")).and_then(Value::as_i64);
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Graph API returned HTTP {}", response.status));

    match code {
        Some(AUTH_INVALID_CODE) => Err(MediaError::AuthInvalid {
            provider: "facebook".to_string(),
            message,
        }),
        Some(c) if RATE_LIMIT_CODES.contains(&c) => Err(MediaError::RateLimited {
            provider: "facebook".to_string(),
            message,
        }),
        _ if response.status == StatusCode::TOO_MANY_REQUESTS => Err(MediaError::RateLimited {
            provider: "facebook".to_string(),
            message,
        }),
        _ => {
            debug!(code = ?code, message = %message, "Graph API returned no usable object");
            Ok(None)
        }
    }
}

pub fn str_field<'a>(object: &'a Value, path: &[&str]) -> &'a str {
    path.iter()
        .try_fold(object, |value, key| value.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// "added N new photos" in a story or caption.
pub fn media_count_from_text(text: &str) -> Option<u32> {
    ADDED_PHOTOS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// GIF shared from giphy: the image hides in the `url` param of the preview.
fn gif_url(object: &Value) -> Option<String> {
    if str_field(object, &["type"]) != "link" || !GIF_LINK.is_match(str_field(object, &["link"])) {
        return None;
    }
    let preview = Url::parse(str_field(object, &["full_picture"])).ok()?;
    let gif = preview
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned());
    gif
}

/// Photos and media count of a Graph object.
pub fn media_from_object(object: &Value) -> (Vec<String>, Option<u32>) {
    let gif = gif_url(object);

    let default = (str_field(object, &["type"]) == "photo" || gif.is_some()).then_some(1);
    let count = media_count_from_text(str_field(object, &["story"]))
        .or_else(|| media_count_from_text(str_field(object, &["message"])))
        .or(default);

    let picture = gif.unwrap_or_else(|| str_field(object, &["full_picture"]).to_string());
    let photos = if picture.trim().is_empty() {
        Vec::new()
    } else {
        vec![picture]
    };

    (photos, count)
}

/// Canonical URL the object advertises for itself.
pub fn canonical_from_object(object: &Value) -> Option<String> {
    let link = str_field(object, &["link"]);
    let permalink = str_field(object, &["permalink_url"]);

    let candidate = match str_field(object, &["type"]) {
        "video" => link,
        "status" => permalink,
        "photo" if !link.contains("album.php") => permalink,
        _ => "",
    };

    (!candidate.trim().is_empty()).then(|| candidate.to_string())
}
