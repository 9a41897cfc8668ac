//! Generic web pages: basic meta tags, oEmbed, OpenGraph and Twitter Card
//! merged in that order, later non-blank values winning.

use super::{ExtractionContext, MediaExtractor};
use crate::canonicalizer::canonicalize;
use crate::classifier::PatternRule;
use crate::metadata::{oembed_fields, PageMetadata};
use crate::record::{is_blank, EvidenceSource, Fields, Provider};
use crate::utils;
use crate::MediaError;
use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

#[derive(Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaExtractor for PageExtractor {
    fn provider(&self) -> Provider {
        Provider::Page
    }

    /// Pages are the fallback classification and need no rules.
    fn rules(&self) -> Vec<PatternRule> {
        Vec::new()
    }

    #[instrument(level = "debug", skip(self, ctx), fields(url = %ctx.record.canonical_url))]
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError> {
        if let Some((page, metadata)) = ctx.fetch_page_metadata().await {
            self.refine_canonical_url(ctx, &page.url, &metadata);

            let oembed = self.fetch_oembed_fields(ctx, &metadata).await;
            let mut fields = merge_dialects([
                metadata.basic,
                oembed.unwrap_or_default(),
                metadata.opengraph,
                metadata.twitter,
            ]);

            if !is_blank(&fields.username) {
                fields.author_name = fields.username.clone();
            }
            if !is_blank(&fields.picture) {
                let picture = utils::add_scheme(&fields.picture, &page.url);
                fields.picture = utils::absolute_url(&page.url, Some(&picture));
            }
            fields.author_picture = fields.picture.clone();

            ctx.record.fields.merge_from(fields);
        }

        let fields = &mut ctx.record.fields;
        if is_blank(&fields.title) {
            fields.title = ctx.record.canonical_url.clone();
        }
        ctx.schedule_screenshot_if_missing();
        Ok(())
    }
}

impl PageExtractor {
    /// A canonical link replaces the URL only when it stays on the same host.
    fn refine_canonical_url(&self, ctx: &mut ExtractionContext<'_>, page_url: &str, metadata: &PageMetadata) {
        let Some(candidate) = metadata.canonical_url.as_deref() else {
            return;
        };
        let same_host = match (Url::parse(page_url), Url::parse(candidate)) {
            (Ok(page), Ok(candidate)) => page.host_str() == candidate.host_str(),
            _ => false,
        };
        if !same_host {
            debug!(candidate = %candidate, "Ignoring off-site canonical link");
            return;
        }
        if let Ok(canonical) = canonicalize(candidate) {
            ctx.record.refine_canonical_url(&canonical);
        }
    }

    /// The discovered oEmbed document. A failing endpoint is recorded on the
    /// record and contributes nothing.
    async fn fetch_oembed_fields(
        &self,
        ctx: &mut ExtractionContext<'_>,
        metadata: &PageMetadata,
    ) -> Option<Fields> {
        let endpoint = metadata.oembed_url.as_deref()?;
        match ctx.fetcher.fetch_oembed("oembed", endpoint).await {
            Ok(payload) => {
                ctx.record.raw.add(EvidenceSource::Oembed, payload.raw.clone());
                Some(oembed_fields(&payload))
            }
            Err(e) => {
                e.log();
                ctx.record.record_error(&e);
                None
            }
        }
    }
}

/// Merges dialects in order; a later non-blank value replaces an earlier one.
pub fn merge_dialects(dialects: impl IntoIterator<Item = Fields>) -> Fields {
    dialects.into_iter().fold(Fields::default(), |mut merged, dialect| {
        merged.merge_from(dialect);
        merged
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_dialect_wins_when_not_blank() {
        let merged = merge_dialects([
            Fields {
                title: "".into(),
                description: "X".into(),
                ..Default::default()
            },
            Fields {
                title: "Y".into(),
                ..Default::default()
            },
        ]);
        assert_eq!(merged.title, "Y");
        assert_eq!(merged.description, "X");
    }

    #[test]
    fn test_blank_dialect_never_overwrites() {
        let merged = merge_dialects([
            Fields {
                title: "Y".into(),
                ..Default::default()
            },
            Fields {
                title: "".into(),
                ..Default::default()
            },
        ]);
        assert_eq!(merged.title, "Y");
    }

    #[test]
    fn test_twitter_card_has_last_word() {
        let merged = merge_dialects([
            Fields {
                title: "basic".into(),
                ..Default::default()
            },
            Fields {
                title: "oembed".into(),
                ..Default::default()
            },
            Fields {
                title: "opengraph".into(),
                picture: "og.png".into(),
                ..Default::default()
            },
            Fields {
                title: "card".into(),
                ..Default::default()
            },
        ]);
        assert_eq!(merged.title, "card");
        assert_eq!(merged.picture, "og.png");
    }
}
