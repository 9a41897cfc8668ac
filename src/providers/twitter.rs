use super::{ExtractionContext, MediaExtractor};
use crate::classifier::PatternRule;
use crate::fetcher::ApiResponse;
use crate::record::{is_blank, EvidenceSource, Identity, MediaType, Provider, Subtype};
use crate::utils;
use crate::MediaError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

const HOST: &str = r"^https?://(www\.|mobile\.)?(twitter|x)\.com/";

#[derive(Default)]
pub struct TwitterExtractor;

impl TwitterExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for TwitterExtractor {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    fn rules(&self) -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "twitter_item",
                Provider::Twitter,
                MediaType::Item,
                &format!(r"{HOST}(?P<user>[^/?]+)/status(es)?/(?P<id>[0-9]+)"),
                "https://twitter.com/caiosba/status/742779467521773568",
            ),
            PatternRule::new(
                "twitter_profile",
                Provider::Twitter,
                MediaType::Profile,
                &format!(r"{HOST}(?P<user>[A-Za-z0-9_]+)/?(\?.*)?$"),
                "https://twitter.com/caiosba",
            )
            .with_subtype(Subtype::User),
        ]
    }

    #[instrument(level = "debug", skip(self, ctx), fields(url = %ctx.record.canonical_url))]
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let user = ctx.classification.capture("user").unwrap_or_default().to_string();
        ctx.record.fields.username = format!("@{user}");

        match ctx.record.media_type {
            MediaType::Profile => self.extract_profile(ctx, &user).await,
            _ => {
                let id = ctx.classification.capture("id").unwrap_or_default().to_string();
                self.extract_item(ctx, &user, &id).await
            }
        }
    }
}

impl TwitterExtractor {
    async fn extract_item(
        &self,
        ctx: &mut ExtractionContext<'_>,
        user: &str,
        id: &str,
    ) -> Result<(), MediaError> {
        ctx.record.identity = Identity::new(id, "");
        ctx.record
            .refine_canonical_url(&format!("https://twitter.com/{user}/status/{id}"));

        let endpoint = format!(
            "{}/statuses/show.json?id={id}&tweet_mode=extended",
            ctx.config.endpoints.twitter_api.trim_end_matches('/')
        );

        match self.call_api(ctx, &endpoint).await? {
            Some(tweet) => {
                ctx.record.raw.add(EvidenceSource::Api, tweet.clone());
                let text = str_at(&tweet, &["full_text"])
                    .or_else(|| str_at(&tweet, &["text"]))
                    .unwrap_or_default();
                let screen_name = str_at(&tweet, &["user", "screen_name"]).unwrap_or(user);

                let fields = &mut ctx.record.fields;
                fields.title = text.to_string();
                fields.description = text.to_string();
                fields.text = text.to_string();
                fields.username = format!("@{screen_name}");
                fields.author_name = str_at(&tweet, &["user", "name"]).unwrap_or_default().to_string();
                fields.author_url = format!("https://twitter.com/{}", screen_name.to_lowercase());
                fields.author_picture = str_at(&tweet, &["user", "profile_image_url_https"])
                    .unwrap_or_default()
                    .to_string();
                fields.picture = tweet
                    .pointer("/entities/media/0/media_url_https")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                fields.published_at = str_at(&tweet, &["created_at"]).and_then(utils::parse_timestamp);

                if let Some(user_id) = str_at(&tweet, &["user", "id_str"]) {
                    ctx.record.identity = Identity::new(id, user_id);
                }
                ctx.record.refine_canonical_url(&format!(
                    "https://twitter.com/{screen_name}/status/{id}"
                ));
            }
            None => {
                if let Some(payload) = self.fetch_oembed(ctx).await {
                    let tweet = ctx.metadata.extract_from_oembed(&payload.data.html);
                    let fields = &mut ctx.record.fields;
                    fields.merge_from(tweet);
                    fields.author_name = payload.data.author_name.clone();
                    fields.author_url = payload.data.author_url.clone();
                    fields.html = payload.data.html;
                }
                if is_blank(&ctx.record.fields.author_url) {
                    ctx.record.fields.author_url = format!("https://twitter.com/{}", user.to_lowercase());
                }
            }
        }

        Ok(())
    }

    async fn extract_profile(&self, ctx: &mut ExtractionContext<'_>, user: &str) -> Result<(), MediaError> {
        ctx.record.identity = Identity::new("", user);
        ctx.record.refine_canonical_url(&format!("https://twitter.com/{user}"));

        let endpoint = format!(
            "{}/users/show.json?screen_name={user}",
            ctx.config.endpoints.twitter_api.trim_end_matches('/')
        );

        match self.call_api(ctx, &endpoint).await? {
            Some(profile) => {
                ctx.record.raw.add(EvidenceSource::Api, profile.clone());
                let screen_name = str_at(&profile, &["screen_name"]).unwrap_or(user);
                let picture = str_at(&profile, &["profile_image_url_https"])
                    .unwrap_or_default()
                    .replace("_normal", "");

                let fields = &mut ctx.record.fields;
                fields.title = str_at(&profile, &["name"]).unwrap_or(screen_name).to_string();
                fields.author_name = fields.title.clone();
                fields.username = format!("@{screen_name}");
                fields.description = str_at(&profile, &["description"]).unwrap_or_default().to_string();
                fields.picture = picture.clone();
                fields.author_picture = picture;
                fields.author_url = format!("https://twitter.com/{}", screen_name.to_lowercase());
                fields.published_at = str_at(&profile, &["created_at"]).and_then(utils::parse_timestamp);

                if let Some(user_id) = str_at(&profile, &["id_str"]) {
                    ctx.record.identity = Identity::new("", user_id);
                }
            }
            None => {
                if let Some(payload) = self.fetch_oembed(ctx).await {
                    ctx.record.fields.author_name = payload.data.author_name;
                }
                let fields = &mut ctx.record.fields;
                fields.title = if is_blank(&fields.author_name) {
                    user.to_string()
                } else {
                    fields.author_name.clone()
                };
                fields.author_url = format!("https://twitter.com/{}", user.to_lowercase());
            }
        }

        Ok(())
    }

    /// `Ok(None)` when there is no token or the API had nothing usable.
    async fn call_api(
        &self,
        ctx: &mut ExtractionContext<'_>,
        endpoint: &str,
    ) -> Result<Option<Value>, MediaError> {
        let Some(token) = ctx.config.credentials.twitter_bearer_token.clone() else {
            debug!("No Twitter bearer token configured, skipping API");
            return Ok(None);
        };

        let result = ctx
            .fetcher
            .get_json("twitter", endpoint, Some(&token))
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

    async fn fetch_oembed(&self, ctx: &mut ExtractionContext<'_>) -> Option<crate::fetcher::OEmbedPayload> {
        let endpoint = Url::parse_with_params(
            &ctx.config.endpoints.twitter_oembed,
            &[
                ("url", ctx.record.canonical_url.as_str()),
                ("omit_script", "1"),
                ("lang", "en"),
            ],
        )
        .ok()?;
        ctx.fetch_oembed("twitter", endpoint.as_str()).await
    }
}

fn classify_response(response: ApiResponse) -> Result<Option<Value>, MediaError> {
    let message = response
        .body
        .pointer("/errors/0/message")
        .and_then(Value::as_str)
        .unwrap_or("Twitter API request failed")
        .to_string();

    match response.status {
        status if status.is_success() => Ok(Some(response.body)),
        StatusCode::TOO_MANY_REQUESTS => Err(MediaError::RateLimited {
            provider: "twitter".to_string(),
            message,
        }),
        StatusCode::UNAUTHORIZED => Err(MediaError::AuthInvalid {
            provider: "twitter".to_string(),
            message,
        }),
        status => {
            debug!(status = %status, message = %message, "Twitter API returned no data");
            Ok(None)
        }
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |value, key| value.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_api_status() {
        let limited = ApiResponse {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: json!({"errors": [{"code": 88, "message": "Rate limit exceeded"}]}),
        };
        let err = classify_response(limited).unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("Rate limit exceeded"));

        let expired = ApiResponse {
            status: StatusCode::UNAUTHORIZED,
            body: json!({"errors": [{"code": 89, "message": "Invalid or expired token."}]}),
        };
        assert!(matches!(
            classify_response(expired),
            Err(MediaError::AuthInvalid { .. })
        ));

        let missing = ApiResponse {
            status: StatusCode::NOT_FOUND,
            body: json!({}),
        };
        assert_eq!(classify_response(missing).unwrap(), None);
    }
}
