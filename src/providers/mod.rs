//! Per-provider extractors and the ordered registry that classifies URLs.

pub mod dropbox;
pub mod facebook;
pub mod instagram;
pub mod page;
pub mod twitter;
pub mod youtube;

use crate::classifier::{Classification, PatternRule, PatternTable};
use crate::config::ParserConfig;
use crate::fetcher::{FetchedPage, Fetcher, OEmbedPayload};
use crate::metadata::{MetadataExtractor, PageMetadata};
use crate::record::{is_blank, EvidenceSource, MediaRecord, Provider};
use crate::screenshot::{placeholder_url, ScreenshotJob, ScreenshotQueue};
use crate::MediaError;
use async_trait::async_trait;
use tracing::{debug, warn};

/// State shared by the strategies of one extraction.
pub struct ExtractionContext<'a> {
    /// Input URL before canonicalization.
    pub original_url: String,
    pub record: MediaRecord,
    pub classification: Classification,
    pub fetcher: &'a Fetcher,
    pub metadata: &'a MetadataExtractor,
    pub config: &'a ParserConfig,
    pub screenshots: &'a dyn ScreenshotQueue,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(
        original_url: &str,
        canonical_url: &str,
        classification: Classification,
        fetcher: &'a Fetcher,
        metadata: &'a MetadataExtractor,
        config: &'a ParserConfig,
        screenshots: &'a dyn ScreenshotQueue,
    ) -> Self {
        let mut record = MediaRecord::new(
            original_url.trim(),
            canonical_url,
            classification.provider,
            classification.media_type,
        );
        record.subtype = classification.subtype;

        Self {
            original_url: original_url.trim().to_string(),
            record,
            classification,
            fetcher,
            metadata,
            config,
            screenshots,
        }
    }

    /// Fetches the canonical URL. A failure is recorded on the record and
    /// yields `None` so the next strategy can run.
    pub async fn fetch_page(&mut self) -> Option<FetchedPage> {
        let url = self.record.canonical_url.clone();
        match self.fetcher.fetch_html(&url).await {
            Ok(page) => Some(page),
            Err(e) => {
                e.log();
                self.record.record_error(&e);
                None
            }
        }
    }

    /// Fetches the canonical URL and reads its metadata dialects. Meta tags
    /// are kept as raw evidence.
    pub async fn fetch_page_metadata(&mut self) -> Option<(FetchedPage, PageMetadata)> {
        let page = self.fetch_page().await?;
        let metadata = self.metadata.extract(&page.body, &page.url);
        self.record.raw.add(
            EvidenceSource::Metatags,
            serde_json::to_value(&metadata.metatags).unwrap_or_default(),
        );
        Some((page, metadata))
    }

    /// Best-effort oEmbed call whose payload is kept as raw evidence.
    pub async fn fetch_oembed(&mut self, service: &str, endpoint: &str) -> Option<OEmbedPayload> {
        match self.fetcher.fetch_oembed(service, endpoint).await {
            Ok(payload) => {
                self.record.raw.add(EvidenceSource::Oembed, payload.raw.clone());
                Some(payload)
            }
            Err(e) => {
                debug!(service = %service, error = %e, "oEmbed unavailable");
                None
            }
        }
    }

    /// Stores a placeholder picture and schedules the real capture when no
    /// strategy found one.
    pub fn schedule_screenshot_if_missing(&mut self) {
        if !is_blank(&self.record.fields.picture) {
            return;
        }
        let url = self.record.canonical_url.clone();
        let picture = placeholder_url(&self.config.screenshot_base_url, &url);
        self.record.fields.picture = picture.clone();

        if let Err(e) = self.screenshots.enqueue(ScreenshotJob { url, picture }) {
            e.log();
        }
    }

    /// Records a recoverable failure of an authoritative strategy.
    pub fn note_fallback(&mut self, e: &MediaError) {
        warn!(
            url = %self.record.canonical_url,
            provider = %self.record.provider,
            error = %e,
            "Falling back to markup extraction"
        );
        self.record.record_error(e);
    }
}

/// A provider family: contributes classification rules and extracts the
/// records those rules route to it.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    fn provider(&self) -> Provider;

    /// Rules in priority order, most specific first.
    fn rules(&self) -> Vec<PatternRule>;

    /// Populates `ctx.record`. Only errors that must reach the caller
    /// (rate limits) are returned; everything else degrades the record.
    async fn extract(&self, ctx: &mut ExtractionContext<'_>) -> Result<(), MediaError>;
}

/// Extractors in registration order plus the pattern table they build.
pub struct ProviderRegistry {
    extractors: Vec<Box<dyn MediaExtractor>>,
    table: PatternTable,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// All built-in providers. The generic page extractor registers last and
    /// contributes no rules; it receives whatever nothing else claims.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(facebook::FacebookExtractor::new()));
        registry.register(Box::new(twitter::TwitterExtractor::new()));
        registry.register(Box::new(youtube::YoutubeExtractor::new()));
        registry.register(Box::new(instagram::InstagramExtractor::new()));
        registry.register(Box::new(dropbox::DropboxExtractor::new()));
        registry.register(Box::new(page::PageExtractor::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
            table: PatternTable::new(),
        }
    }

    pub fn register(&mut self, extractor: Box<dyn MediaExtractor>) {
        self.table.extend(extractor.rules());
        self.extractors.push(extractor);
    }

    pub fn classify(&self, url: &str) -> Classification {
        self.table.classify(url)
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    pub fn extractor_for(&self, provider: Provider) -> Option<&dyn MediaExtractor> {
        self.extractors
            .iter()
            .find(|extractor| extractor.provider() == provider)
            .map(|extractor| extractor.as_ref())
    }
}
