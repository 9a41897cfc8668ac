use crate::error::{ErrorKind, MediaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Facebook,
    Twitter,
    Youtube,
    Instagram,
    Dropbox,
    Page,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Facebook => "facebook",
            Provider::Twitter => "twitter",
            Provider::Youtube => "youtube",
            Provider::Instagram => "instagram",
            Provider::Dropbox => "dropbox",
            Provider::Page => "page",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Profile,
    Item,
    Page,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaType::Profile => "profile",
            MediaType::Item => "item",
            MediaType::Page => "page",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    User,
    Page,
    Event,
}

/// Structured id data. `uuid` is always recomputed from the two halves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub object_id: String,
    pub user_uuid: String,
    pub uuid: String,
}

impl Identity {
    pub fn new(object_id: impl Into<String>, user_uuid: impl Into<String>) -> Self {
        let mut identity = Self {
            object_id: object_id.into(),
            user_uuid: user_uuid.into(),
            uuid: String::new(),
        };
        identity.uuid = identity.composed_uuid();
        identity
    }

    /// Identity keyed by the object alone (Facebook events).
    pub fn standalone(object_id: impl Into<String>) -> Self {
        let object_id = object_id.into();
        Self {
            uuid: object_id.clone(),
            object_id,
            user_uuid: String::new(),
        }
    }

    /// `{user_uuid}_{object_id}` with blank halves omitted.
    pub fn composed_uuid(&self) -> String {
        [self.user_uuid.as_str(), self.object_id.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn is_empty(&self) -> bool {
        self.object_id.is_empty() && self.user_uuid.is_empty()
    }
}

/// Semantic attributes of a record. Blank strings mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    pub title: String,
    pub description: String,
    pub text: String,
    pub author_name: String,
    pub author_url: String,
    pub author_picture: String,
    pub picture: String,
    pub username: String,
    pub html: String,
    pub link: String,
    pub photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_count: Option<u32>,
    #[serde(
        default,
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub published_at: Option<DateTime<Utc>>,
}

impl Fields {
    /// Non-blank-wins merge: values from `other` replace ours only when they
    /// carry something.
    pub fn merge_from(&mut self, other: Fields) {
        merge_text(&mut self.title, other.title);
        merge_text(&mut self.description, other.description);
        merge_text(&mut self.text, other.text);
        merge_text(&mut self.author_name, other.author_name);
        merge_text(&mut self.author_url, other.author_url);
        merge_text(&mut self.author_picture, other.author_picture);
        merge_text(&mut self.picture, other.picture);
        merge_text(&mut self.username, other.username);
        merge_text(&mut self.html, other.html);
        merge_text(&mut self.link, other.link);
        if !other.photos.is_empty() {
            self.photos = other.photos;
        }
        if other.media_count.is_some() {
            self.media_count = other.media_count;
        }
        if other.published_at.is_some() {
            self.published_at = other.published_at;
        }
    }
}

fn merge_text(current: &mut String, candidate: String) {
    if !is_blank(&candidate) {
        *current = candidate;
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn serialize_timestamp<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
        None => serializer.serialize_str(""),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceSource {
    Api,
    Oembed,
    Metatags,
    Graphql,
}

/// Raw payloads per source. Entries are only ever appended: a source with a
/// single payload serializes as that payload, several as an array.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvidence(BTreeMap<EvidenceSource, Vec<Value>>);

impl RawEvidence {
    pub fn add(&mut self, source: EvidenceSource, payload: Value) {
        if is_empty_payload(&payload) {
            return;
        }
        self.0.entry(source).or_default().push(payload);
    }

    /// First payload recorded for `source`.
    pub fn get(&self, source: EvidenceSource) -> Option<&Value> {
        self.0.get(&source).and_then(|payloads| payloads.first())
    }

    pub fn all(&self, source: EvidenceSource) -> &[Value] {
        self.0.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, source: EvidenceSource) -> bool {
        self.0.contains_key(&source)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for RawEvidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (source, payloads) in &self.0 {
            match payloads.as_slice() {
                [single] => map.serialize_entry(source, single)?,
                many => map.serialize_entry(source, many)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawEvidence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<EvidenceSource, Value>::deserialize(deserializer)?;
        Ok(Self(
            entries
                .into_iter()
                .map(|(source, payload)| (source, vec![payload]))
                .collect(),
        ))
    }
}

fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MediaError> for RecordError {
    fn from(e: &MediaError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// The output unit of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub url: String,
    pub canonical_url: String,
    pub provider: Provider,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<Subtype>,
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(flatten)]
    pub fields: Fields,
    pub raw: RawEvidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,
}

impl MediaRecord {
    pub fn new(url: &str, canonical_url: &str, provider: Provider, media_type: MediaType) -> Self {
        Self {
            url: url.to_string(),
            canonical_url: canonical_url.to_string(),
            provider,
            media_type,
            subtype: None,
            identity: Identity::default(),
            fields: Fields::default(),
            raw: RawEvidence::default(),
            error: None,
        }
    }

    /// Replaces the canonical URL with a more specific one. Blank candidates
    /// are ignored so an already-resolved URL is never lost.
    pub fn refine_canonical_url(&mut self, candidate: &str) {
        if !is_blank(candidate) {
            self.canonical_url = candidate.trim().to_string();
        }
    }

    /// Keeps the first failure; later ones are usually consequences of it.
    pub fn record_error(&mut self, e: &MediaError) {
        if self.error.is_none() {
            self.error = Some(RecordError::from(e));
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_never_overwrites() {
        let mut fields = Fields {
            title: "Y".into(),
            ..Default::default()
        };
        fields.merge_from(Fields::default());
        assert_eq!(fields.title, "Y");

        fields.merge_from(Fields {
            title: "   ".into(),
            ..Default::default()
        });
        assert_eq!(fields.title, "Y");
    }

    #[test]
    fn test_later_non_blank_wins() {
        let mut fields = Fields {
            title: "".into(),
            description: "X".into(),
            ..Default::default()
        };
        fields.merge_from(Fields {
            title: "Y".into(),
            ..Default::default()
        });
        assert_eq!(fields.title, "Y");
        assert_eq!(fields.description, "X");
    }

    #[test]
    fn test_composed_uuid_skips_blank_halves() {
        assert_eq!(Identity::new("2", "1").uuid, "1_2");
        assert_eq!(Identity::new("2", "").uuid, "2");
        assert_eq!(Identity::new("", "1").uuid, "1");
        assert_eq!(Identity::new("", "").uuid, "");
        assert_eq!(Identity::standalone("99").uuid, "99");
    }

    #[test]
    fn test_raw_evidence_is_additive() {
        let mut raw = RawEvidence::default();
        raw.add(EvidenceSource::Api, json!({}));
        raw.add(EvidenceSource::Oembed, Value::Null);
        assert!(raw.is_empty());

        raw.add(EvidenceSource::Api, json!({"id": "1"}));
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({"api": {"id": "1"}})
        );

        raw.add(EvidenceSource::Api, json!({"id": "2"}));
        assert_eq!(raw.get(EvidenceSource::Api), Some(&json!({"id": "1"})));
        assert_eq!(raw.all(EvidenceSource::Api).len(), 2);
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({"api": [{"id": "1"}, {"id": "2"}]})
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut record = MediaRecord::new(
            "https://example.com",
            "https://example.com/",
            Provider::Page,
            MediaType::Item,
        );
        record.identity = Identity::new("10", "20");
        record.fields.title = "Example".into();
        record.raw.add(EvidenceSource::Oembed, json!({"title": "Example"}));

        let json = record.to_json();
        assert_eq!(json["type"], "item");
        assert_eq!(json["provider"], "page");
        assert_eq!(json["uuid"], "20_10");
        assert_eq!(json["title"], "Example");
        assert_eq!(json["published_at"], "");
        assert_eq!(json["raw"]["oembed"]["title"], "Example");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_canonical_url_refinement_ignores_blank() {
        let mut record = MediaRecord::new(
            "http://bit.ly/x",
            "https://twitter.com/caiosba",
            Provider::Twitter,
            MediaType::Profile,
        );
        record.refine_canonical_url("");
        assert_eq!(record.canonical_url, "https://twitter.com/caiosba");
        record.refine_canonical_url("https://twitter.com/caiosba/");
        assert_eq!(record.canonical_url, "https://twitter.com/caiosba/");
    }
}
