use super::{ExtractionContext, MediaExtractor};
use crate::classifier::PatternRule;
use crate::record::{is_blank, EvidenceSource, Identity, MediaType, Provider};
use crate::MediaError;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use url::Url;

const DESCRIPTION: &str = "Shared with Dropbox";

#[derive(Default)]
pub struct DropboxExtractor;

impl DropboxExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for DropboxExtractor {
    fn provider(&self) -> Provider {
        Provider::Dropbox
    }

    fn rules(&self) -> Vec<PatternRule> {
        vec![
            PatternRule::new(
                "dropbox_item",
                Provider::Dropbox,
                MediaType::Item,
                r"^https?://(www\.|dl\.)?dropbox\.com/(?P<kind>s|sh|scl/fi)/(?P<id>[^/?]+)(/(?P<name>[^/?]+))?",
                "https://www.dropbox.com/s/2k0giv6t1sb0nb0/README.md",
            ),
            PatternRule::new(
                "dropbox_content_item",
                Provider::Dropbox,
                MediaType::Item,
                r"^https?://([^/]+\.)?dropboxusercontent\.com/(?P<kind>[^/]+)/(?P<id>[^/?]+)(/(?P<name>[^/?]+))?",
                "https://dl.dropboxusercontent.com/s/2k0giv6t1sb0nb0/README.md",
            ),
        ]
    }

    #[instrument(level = "debug", skip(self, ctx), fields(url = %ctx.record.canonical_url))]
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        let id = ctx.classification.capture("id").unwrap_or_default().to_string();
        ctx.record.identity = Identity::new(id.as_str(), "");

        let file_name = ctx
            .classification
            .capture("name")
            .map(decode_name)
            .unwrap_or_default();

        let fields = &mut ctx.record.fields;
        fields.title = file_name;
        fields.description = DESCRIPTION.to_string();

        if let Some(metadata) = self.shared_link_metadata(ctx).await? {
            ctx.record.raw.add(EvidenceSource::Api, metadata.clone());
            if let Some(name) = metadata.get("name").and_then(Value::as_str) {
                ctx.record.fields.title = name.to_string();
            }
        }

        if let Some((_, metadata)) = ctx.fetch_page_metadata().await {
            let fields = &mut ctx.record.fields;
            if is_blank(&fields.title) {
                fields.title = metadata.opengraph.title;
            }
            fields.picture = metadata.opengraph.picture;
        }

        let fields = &mut ctx.record.fields;
        if is_blank(&fields.title) {
            fields.title = ctx.record.canonical_url.clone();
        }
        fields.html = String::new();
        Ok(())
    }
}

impl DropboxExtractor {
    async fn shared_link_metadata(
        &self,
        ctx: &mut ExtractionContext<'_>,
    ) -> Result<Option<Value>, MediaError> {
        let Some(token) = ctx.config.credentials.dropbox_access_token.clone() else {
            debug!("No Dropbox token configured, skipping API");
            return Ok(None);
        };

        let endpoint = format!(
            "{}/sharing/get_shared_link_metadata",
            ctx.config.endpoints.dropbox_api.trim_end_matches('/')
        );
        let body = json!({ "url": ctx.record.canonical_url });

        match ctx.fetcher.post_json("dropbox", &endpoint, &body, Some(&token)).await {
            Ok(response) if response.is_success() => Ok(Some(response.body)),
            Ok(response) if response.status.as_u16() == 429 => Err(MediaError::RateLimited {
                provider: "dropbox".to_string(),
                message: "too_many_requests".to_string(),
            }),
            Ok(response) if response.status.as_u16() == 401 => {
                let e = MediaError::AuthInvalid {
                    provider: "dropbox".to_string(),
                    message: response.body.to_string(),
                };
                ctx.note_fallback(&e);
                Ok(None)
            }
            Ok(response) => {
                debug!(status = %response.status, "Dropbox API returned no data");
                Ok(None)
            }
            Err(e) => {
                ctx.note_fallback(&e);
                Ok(None)
            }
        }
    }
}

fn decode_name(raw: &str) -> String {
    let Ok(url) = Url::parse(&format!("http://localhost/?name={raw}")) else {
        return raw.to_string();
    };
    let name = url
        .query_pairs()
        .find(|(k, _)| k == "name")
        .map(|(_, v)| v.into_owned());
    name.unwrap_or_else(|| raw.to_string())
}
