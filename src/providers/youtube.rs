use super::{ExtractionContext, MediaExtractor};
use crate::classifier::PatternRule;
use crate::fetcher::ApiResponse;
use crate::metadata::oembed_fields;
use crate::record::{is_blank, EvidenceSource, Fields, Identity, MediaType, Provider, Subtype};
use crate::utils;
use crate::MediaError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

const QUOTA_REASONS: [&str; 4] = [
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];

#[derive(Default)]
pub struct YoutubeExtractor;

impl YoutubeExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for YoutubeExtractor {
    fn provider(&self) -> Provider {
        Provider::Youtube
    }

    fn rules(&self) -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "youtube_item",
                Provider::Youtube,
                MediaType::Item,
                r"^https?://([^/]+\.)?youtube\.com/watch\?(.*&)?v=(?P<id>[A-Za-z0-9_-]+)",
                "https://www.youtube.com/watch?v=mtLxD7r4BZQ",
            ),
            PatternRule::new(
                "youtube_short_item",
                Provider::Youtube,
                MediaType::Item,
                r"^https?://youtu\.be/(?P<id>[A-Za-z0-9_-]+)",
                "https://youtu.be/mtLxD7r4BZQ",
            ),
            PatternRule::new(
                "youtube_profile",
                Provider::Youtube,
                MediaType::Profile,
                r"^https?://([^/]+\.)?youtube\.com/(?P<kind>user|channel|c)/(?P<name>[^/?]+)/?(\?.*)?$",
                "https://www.youtube.com/user/portadosfundos",
            )
            .with_subtype(Subtype::User),
        ]
    }

    #[instrument(level = "debug", skip(self, ctx), fields(url = %ctx.record.canonical_url))]
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        match ctx.record.media_type {
            MediaType::Profile => self.extract_profile(ctx).await,
            _ => self.extract_item(ctx).await,
        }
    }
}

impl YoutubeExtractor {
    async fn extract_item(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let id = ctx.classification.capture("id").unwrap_or_default().to_string();
        ctx.record.identity = Identity::new(id.as_str(), "");
        ctx.record
            .refine_canonical_url(&format!("https://www.youtube.com/watch?v={id}"));

        let video = self
            .call_api(ctx, "videos", &[("part", "snippet"), ("id", id.as_str())])
            .await?
            .and_then(|body| body.pointer("/items/0").cloned());

        match video {
            Some(video) => {
                ctx.record.raw.add(EvidenceSource::Api, video.clone());
                let snippet = &video["snippet"];
                let channel_id = str_at(snippet, "channelId");
                let channel_title = str_at(snippet, "channelTitle");

                let fields = &mut ctx.record.fields;
                fields.title = str_at(snippet, "title").to_string();
                fields.description = str_at(snippet, "description").to_string();
                fields.author_name = channel_title.to_string();
                fields.username = channel_title.to_string();
                if !is_blank(channel_id) {
                    fields.author_url = format!("https://www.youtube.com/channel/{channel_id}");
                }
                fields.picture = thumbnail(snippet);
                fields.published_at = utils::parse_timestamp(str_at(snippet, "publishedAt"));
                ctx.record.identity = Identity::new(id.as_str(), channel_id);
            }
            None => {
                let endpoint = Url::parse_with_params(
                    &ctx.config.endpoints.youtube_oembed,
                    &[("url", ctx.record.canonical_url.as_str()), ("format", "json")],
                );
                if let Ok(endpoint) = endpoint {
                    if let Some(payload) = ctx.fetch_oembed("youtube", endpoint.as_str()).await {
                        ctx.record.fields.merge_from(oembed_fields(&payload));
                    }
                }
                self.merge_opengraph(ctx).await;
            }
        }

        Ok(())
    }

    async fn extract_profile(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let kind = ctx.classification.capture("kind").unwrap_or_default().to_string();
        let name = ctx.classification.capture("name").unwrap_or_default().to_string();
        ctx.record.identity = Identity::new("", name.as_str());

        let lookup = if kind == "channel" { "id" } else { "forUsername" };
        let channel = self
            .call_api(ctx, "channels", &[("part", "snippet"), (lookup, name.as_str())])
            .await?
            .and_then(|body| body.pointer("/items/0").cloned());

        match channel {
            Some(channel) => {
                ctx.record.raw.add(EvidenceSource::Api, channel.clone());
                let snippet = &channel["snippet"];
                let channel_id = str_at(&channel, "id");

                let fields = &mut ctx.record.fields;
                fields.title = str_at(snippet, "title").to_string();
                fields.author_name = fields.title.clone();
                fields.description = str_at(snippet, "description").to_string();
                fields.username = match str_at(snippet, "customUrl") {
                    "" => name.clone(),
                    custom => custom.to_string(),
                };
                fields.picture = thumbnail(snippet);
                fields.author_picture = fields.picture.clone();
                fields.published_at = utils::parse_timestamp(str_at(snippet, "publishedAt"));
                if !is_blank(channel_id) {
                    fields.author_url = format!("https://www.youtube.com/channel/{channel_id}");
                    ctx.record.identity = Identity::new("", channel_id);
                }
            }
            None => {
                self.merge_opengraph(ctx).await;
                let fields = &mut ctx.record.fields;
                fields.author_name = fields.title.clone();
                fields.author_picture = fields.picture.clone();
                if is_blank(&fields.username) {
                    fields.username = name;
                }
            }
        }

        if is_blank(&ctx.record.fields.author_url) {
            ctx.record.fields.author_url = ctx.record.canonical_url.clone();
        }
        Ok(())
    }

    async fn merge_opengraph(&self, ctx: &mut ExtractionContext<'_>) {
        if let Some((_, metadata)) = ctx.fetch_page_metadata().await {
            let opengraph = Fields {
                username: String::new(),
                ..metadata.opengraph
            };
            ctx.record.fields.merge_from(opengraph);
        }
    }

    async fn call_api(
        &self,
        ctx: &mut ExtractionContext<'_>,
        resource: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<Value>, MediaError> {
        let Some(key) = ctx.config.credentials.youtube_api_key.clone() else {
            debug!("No YouTube API key configured, skipping API");
            return Ok(None);
        };

        let base = format!("{}/{resource}", ctx.config.endpoints.youtube_api.trim_end_matches('/'));
        let endpoint = Url::parse_with_params(
            &base,
            params.iter().copied().chain([("key", key.as_str())]),
        )?;

        let result = ctx
            .fetcher
            .get_json("youtube", endpoint.as_str(), None)
            .await
            .and_then(classify_response);

        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_rate_limited() => {
                e.log();
                Err(e)
            }
            Err(e) => {
                ctx.note_fallback(&e);
                Ok(None)
            }
        }
    }
}

fn classify_response(response: ApiResponse) -> Result<Option<Value>, MediaError> {
    if response.is_success() {
        return Ok(Some(response.body));
    }

    let reason = response
        .body
        .pointer("/error/errors/0/reason")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let message = response
        .body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("YouTube API request failed")
        .to_string();

    if response.status == StatusCode::TOO_MANY_REQUESTS || QUOTA_REASONS.contains(&reason) {
        return Err(MediaError::RateLimited {
            provider: "youtube".to_string(),
            message,
        });
    }
    if matches!(reason, "keyInvalid" | "keyExpired" | "forbidden")
        || response.status == StatusCode::UNAUTHORIZED
    {
        return Err(MediaError::AuthInvalid {
            provider: "youtube".to_string(),
            message,
        });
    }

    debug!(status = %response.status, reason = %reason, "YouTube API returned no data");
    Ok(None)
}

fn str_at<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Largest available thumbnail.
fn thumbnail(snippet: &Value) -> String {
    ["maxres", "high", "medium", "default"]
        .into_iter()
        .find_map(|size| {
            snippet
                .pointer(&format!("/thumbnails/{size}/url"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quota_is_rate_limit() {
        let response = ApiResponse {
            status: StatusCode::FORBIDDEN,
            body: json!({"error": {"errors": [{"reason": "quotaExceeded"}], "message": "quota"}}),
        };
        assert!(classify_response(response).unwrap_err().is_rate_limited());
    }

    #[test]
    fn test_bad_key_is_auth_invalid() {
        let response = ApiResponse {
            status: StatusCode::BAD_REQUEST,
            body: json!({"error": {"errors": [{"reason": "keyInvalid"}], "message": "API key not valid"}}),
        };
        assert!(matches!(
            classify_response(response),
            Err(MediaError::AuthInvalid { .. })
        ));
    }

    #[test]
    fn test_picks_largest_thumbnail() {
        let snippet = json!({"thumbnails": {
            "default": {"url": "https://i.ytimg.com/vi/x/default.jpg"},
            "high": {"url": "https://i.ytimg.com/vi/x/hqdefault.jpg"}
        }});
        assert_eq!(thumbnail(&snippet), "https://i.ytimg.com/vi/x/hqdefault.jpg");
        assert_eq!(thumbnail(&json!({})), "");
    }
}
