use super::{ExtractionContext, MediaExtractor};
use crate::classifier::PatternRule;
use crate::fetcher::ApiResponse;
use crate::metadata::oembed_fields;
use crate::record::{is_blank, EvidenceSource, Fields, Identity, MediaType, Provider, Subtype};
use crate::MediaError;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

#[derive(Default)]
pub struct InstagramExtractor;

impl InstagramExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for InstagramExtractor {
    fn provider(&self) -> Provider {
        Provider::Instagram
    }

    fn rules(&self) -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "instagram_item",
                Provider::Instagram,
                MediaType::Item,
                r"^https?://(www\.)?instagram\.com/(p|tv|reel)/(?P<id>[A-Za-z0-9_-]+)",
                "https://www.instagram.com/p/BJwkn34AqtN/",
            ),
            PatternRule::new(
                "instagram_profile",
                Provider::Instagram,
                MediaType::Profile,
                r"^https?://(www\.)?instagram\.com/(?P<username>[A-Za-z0-9_.]+)/?(\?.*)?$",
                "https://www.instagram.com/megadeth",
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

impl InstagramExtractor {
    async fn extract_item(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let id = ctx.classification.capture("id").unwrap_or_default().to_string();
        ctx.record.identity = Identity::new(id.as_str(), "");
        ctx.record
            .refine_canonical_url(&format!("https://www.instagram.com/p/{id}/"));

        let path = format!("p/{id}/");
        let media = self
            .fetch_graphql(ctx, &path)
            .await?
            .and_then(|body| body.pointer("/graphql/shortcode_media").cloned());

        match media {
            Some(media) => {
                ctx.record.raw.add(EvidenceSource::Graphql, media.clone());
                let username = str_at(&media, "/owner/username");
                let caption = str_at(&media, "/edge_media_to_caption/edges/0/node/text");

                let fields = &mut ctx.record.fields;
                fields.title = caption.to_string();
                fields.description = caption.to_string();
                fields.text = caption.to_string();
                fields.username = format!("@{username}");
                fields.author_name = match str_at(&media, "/owner/full_name") {
                    "" => username.to_string(),
                    full_name => full_name.to_string(),
                };
                fields.author_url = format!("https://www.instagram.com/{username}");
                fields.author_picture = str_at(&media, "/owner/profile_pic_url").to_string();
                fields.picture = str_at(&media, "/display_url").to_string();
                fields.published_at = media
                    .pointer("/taken_at_timestamp")
                    .and_then(Value::as_i64)
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

                let owner_id = str_at(&media, "/owner/id");
                ctx.record.identity = Identity::new(id.as_str(), owner_id);
            }
            None => {
                let endpoint = Url::parse_with_params(
                    &ctx.config.endpoints.instagram_oembed,
                    &[("url", ctx.record.canonical_url.as_str())],
                );
                if let Ok(endpoint) = endpoint {
                    if let Some(payload) = ctx.fetch_oembed("instagram", endpoint.as_str()).await {
                        let mut fields = oembed_fields(&payload);
                        if !is_blank(&fields.username) {
                            fields.author_url = format!("https://www.instagram.com/{}", fields.username);
                            fields.username = format!("@{}", fields.username);
                        }
                        fields.description = fields.title.clone();
                        ctx.record.fields.merge_from(fields);
                    }
                }
                self.merge_opengraph(ctx).await;
            }
        }

        Ok(())
    }

    async fn extract_profile(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let username = ctx.classification.capture("username").unwrap_or_default().to_string();
        ctx.record.identity = Identity::new("", username.as_str());
        ctx.record
            .refine_canonical_url(&format!("https://www.instagram.com/{username}"));

        let path = format!("{username}/");
        let user = self
            .fetch_graphql(ctx, &path)
            .await?
            .and_then(|body| body.pointer("/graphql/user").cloned());

        if let Some(user) = user {
            ctx.record.raw.add(EvidenceSource::Graphql, user.clone());
            let fields = &mut ctx.record.fields;
            fields.description = str_at(&user, "/biography").to_string();
            fields.picture = match str_at(&user, "/profile_pic_url_hd") {
                "" => str_at(&user, "/profile_pic_url").to_string(),
                hd => hd.to_string(),
            };
            fields.author_name = str_at(&user, "/full_name").to_string();
            let user_id = str_at(&user, "/id");
            if !is_blank(user_id) {
                ctx.record.identity = Identity::new("", user_id);
            }
        } else {
            self.merge_opengraph(ctx).await;
        }

        let fields = &mut ctx.record.fields;
        fields.title = username.clone();
        fields.username = format!("@{username}");
        if is_blank(&fields.author_name) {
            fields.author_name = username.clone();
        }
        fields.author_picture = fields.picture.clone();
        fields.author_url = format!("https://www.instagram.com/{username}");
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

    /// The `?__a=1` JSON view of a page. Kept whole as API evidence.
    async fn fetch_graphql(
        &self,
        ctx: &mut ExtractionContext<'_>,
        path: &str,
    ) -> Result<Option<Value>, MediaError> {
        let endpoint = format!(
            "{}/{path}?__a=1",
            ctx.config.endpoints.instagram_web.trim_end_matches('/')
        );

        let result = ctx
            .fetcher
            .get_json("instagram", &endpoint, None)
            .await
            .and_then(classify_response);

        match result {
            Ok(Some(body)) => {
                ctx.record.raw.add(EvidenceSource::Api, body.clone());
                Ok(Some(body))
            }
            Ok(None) => Ok(None),
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
    match response.status {
        StatusCode::TOO_MANY_REQUESTS => Err(MediaError::RateLimited {
            provider: "instagram".to_string(),
            message: "Please wait a few minutes before you try again".to_string(),
        }),
        status if status.is_success() && response.body.is_object() => Ok(Some(response.body)),
        status => {
            debug!(status = %status, "Instagram returned no JSON data");
            Ok(None)
        }
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}
