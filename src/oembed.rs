//! oEmbed-shaped projection of a record, for hosts that embed media.

use crate::fetcher::OEmbedResponse;
use crate::record::{is_blank, EvidenceSource, MediaRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OEmbedProjection {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub title: String,
    pub author_name: String,
    pub author_url: String,
    pub provider_name: String,
    pub provider_url: String,
    pub width: u32,
    pub height: u32,
    pub html: String,
    pub thumbnail_url: String,
}

/// Projects `record` for an embedding host.
///
/// When the provider served an oEmbed document with embed markup, that
/// document is passed through with its own dimensions (0 when absent).
/// Otherwise the record is described from its fields and `html` is an iframe
/// pointing at `viewer_url` with the requested size.
pub fn as_oembed(record: &MediaRecord, viewer_url: &str, width: u32, height: u32) -> OEmbedProjection {
    if let Some(raw) = record.raw.get(EvidenceSource::Oembed) {
        let provided = OEmbedResponse::from_raw(raw);
        if !is_blank(&provided.html) {
            return from_provider(record, raw, provided);
        }
    }

    let fields = &record.fields;
    let author_name = if is_blank(&fields.author_name) {
        fields.username.clone()
    } else {
        fields.author_name.clone()
    };

    OEmbedProjection {
        kind: "rich".to_string(),
        version: "1.0".to_string(),
        title: fields.title.clone(),
        author_name,
        author_url: fields.author_url.clone(),
        provider_name: record.provider.to_string(),
        provider_url: provider_url(record),
        width,
        height,
        html: iframe(viewer_url, width, height),
        thumbnail_url: fields.picture.clone(),
    }
}

fn from_provider(record: &MediaRecord, raw: &Value, provided: OEmbedResponse) -> OEmbedProjection {
    let dimension = |key: &str| {
        raw.get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    };
    let or_field = |value: String, field: &str| {
        if is_blank(&value) {
            field.to_string()
        } else {
            value
        }
    };
    let fields = &record.fields;

    OEmbedProjection {
        kind: raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("rich")
            .to_string(),
        version: "1.0".to_string(),
        title: or_field(provided.title, &fields.title),
        author_name: or_field(provided.author_name, &fields.author_name),
        author_url: or_field(provided.author_url, &fields.author_url),
        provider_name: or_field(provided.provider_name, record.provider.as_str()),
        provider_url: or_field(provided.provider_url, &provider_url(record)),
        width: dimension("width"),
        height: dimension("height"),
        html: provided.html,
        thumbnail_url: or_field(provided.thumbnail_url, &fields.picture),
    }
}

/// `http://{host}` of the URL the record was requested with.
fn provider_url(record: &MediaRecord) -> String {
    [&record.url, &record.canonical_url]
        .into_iter()
        .find_map(|url| Url::parse(url).ok()?.host_str().map(str::to_string))
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

fn iframe(viewer_url: &str, width: u32, height: u32) -> String {
    format!(
        r#"<iframe src="{viewer_url}" width="{width}" height="{height}" scrolling="no" border="0" seamless>Not supported</iframe>"#
    )
}
